//! Parquet input for datasets and frame output for derived samples.

use std::{
    fs::File,
    path::{Path, PathBuf},
    sync::Arc,
};

use arrow::{
    array::{
        Array, ArrayRef, BooleanArray, BooleanBuilder, Float64Array, Float64Builder, Int64Array,
        Int64Builder, ListArray, ListBuilder,
    },
    compute::cast,
    datatypes::{DataType, Field, Schema as ArrowSchema},
    record_batch::RecordBatch,
};
use parquet::arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter};
use tracing::debug;

use super::expand_path;
use crate::{
    column::{Column, ColumnKind, Frame},
    graph::{Schema, Source},
    WremError, WremResult,
};

fn column_kind(datatype: &DataType) -> Option<ColumnKind> {
    match datatype {
        DataType::Float16 | DataType::Float32 | DataType::Float64 => Some(ColumnKind::Float),
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => Some(ColumnKind::Int),
        DataType::Boolean => Some(ColumnKind::Bool),
        DataType::List(field) => match column_kind(field.data_type())? {
            ColumnKind::Float => Some(ColumnKind::FloatVec),
            ColumnKind::Int => Some(ColumnKind::IntVec),
            ColumnKind::Bool => Some(ColumnKind::BoolVec),
            _ => None,
        },
        _ => None,
    }
}

fn list_type(inner: DataType) -> DataType {
    DataType::List(Arc::new(Field::new("item", inner, true)))
}

fn downcast<'a, T: 'static>(array: &'a dyn Array, name: &str) -> WremResult<&'a T> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| WremError::InvalidColumnType {
            name: name.to_string(),
            datatype: array.data_type().to_string(),
        })
}

fn list_rows<T, F>(array: &ArrayRef, name: &str, mut read: F) -> WremResult<Vec<Vec<T>>>
where
    F: FnMut(&ArrayRef, usize, usize) -> WremResult<Vec<T>>,
{
    let list = downcast::<ListArray>(array.as_ref(), name)?;
    let offsets = list.value_offsets();
    let values = list.values();
    reject_nulls(values.as_ref(), name)?;
    (0..list.len())
        .map(|row| read(values, offsets[row] as usize, offsets[row + 1] as usize))
        .collect()
}

fn reject_nulls(array: &dyn Array, name: &str) -> WremResult<()> {
    match array.null_count() {
        0 => Ok(()),
        count => Err(WremError::NullValues {
            name: name.to_string(),
            count,
        }),
    }
}

fn array_to_column(array: &ArrayRef, name: &str) -> WremResult<Column> {
    reject_nulls(array.as_ref(), name)?;
    let kind = column_kind(array.data_type()).ok_or_else(|| WremError::InvalidColumnType {
        name: name.to_string(),
        datatype: array.data_type().to_string(),
    })?;
    match kind {
        ColumnKind::Float => {
            let array = cast(array, &DataType::Float64)?;
            Ok(Column::Float(
                downcast::<Float64Array>(array.as_ref(), name)?
                    .values()
                    .to_vec(),
            ))
        }
        ColumnKind::Int => {
            let array = cast(array, &DataType::Int64)?;
            Ok(Column::Int(
                downcast::<Int64Array>(array.as_ref(), name)?
                    .values()
                    .to_vec(),
            ))
        }
        ColumnKind::Bool => {
            let array = downcast::<BooleanArray>(array.as_ref(), name)?;
            Ok(Column::Bool(array.values().iter().collect()))
        }
        ColumnKind::FloatVec => {
            let array = cast(array, &list_type(DataType::Float64))?;
            Ok(Column::FloatVec(list_rows(
                &array,
                name,
                |values, start, end| {
                    Ok(downcast::<Float64Array>(values.as_ref(), name)?.values()[start..end].to_vec())
                },
            )?))
        }
        ColumnKind::IntVec => {
            let array = cast(array, &list_type(DataType::Int64))?;
            Ok(Column::IntVec(list_rows(
                &array,
                name,
                |values, start, end| {
                    Ok(downcast::<Int64Array>(values.as_ref(), name)?.values()[start..end].to_vec())
                },
            )?))
        }
        ColumnKind::BoolVec => Ok(Column::BoolVec(list_rows(
            array,
            name,
            |values, start, end| {
                let values = downcast::<BooleanArray>(values.as_ref(), name)?;
                Ok((start..end).map(|i| values.value(i)).collect())
            },
        )?)),
        ColumnKind::FourVector => Err(WremError::InvalidColumnType {
            name: name.to_string(),
            datatype: array.data_type().to_string(),
        }),
    }
}

/// Read the column names and kinds of a Parquet file without reading its data.
///
/// Columns whose type cannot be represented as a [`Column`] are left out.
pub fn parquet_schema(path: &Path) -> WremResult<Schema> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    Ok(builder
        .schema()
        .fields()
        .iter()
        .filter_map(|field| {
            let kind = column_kind(field.data_type());
            if kind.is_none() {
                debug!(column = %field.name(), datatype = %field.data_type(), "skipping unsupported column");
            }
            kind.map(|kind| (field.name().to_string(), kind))
        })
        .collect())
}

/// Read the named columns of one or more Parquet files into a single [`Frame`].
pub fn read_parquet_frame(paths: &[PathBuf], columns: &[String]) -> WremResult<Frame> {
    let mut frame = Frame::default();
    for path in paths {
        let file = File::open(path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
        for batch in reader {
            let batch = batch?;
            let mut part = Frame::new(batch.num_rows());
            for name in columns {
                let array = batch
                    .column_by_name(name)
                    .ok_or_else(|| WremError::UnknownColumn {
                        name: name.clone(),
                        context: path.display().to_string(),
                    })?;
                part.insert(name.clone(), array_to_column(array, name)?)?;
            }
            frame.append(part)?;
        }
    }
    if frame.n_columns() < columns.len() {
        // no rows at all: keep the columns so downstream steps still resolve
        let schema = match paths.first() {
            Some(path) => parquet_schema(path)?,
            None => Schema::new(),
        };
        let mut empty = Frame::new(0);
        for name in columns {
            let kind = schema.get(name).ok_or_else(|| WremError::UnknownColumn {
                name: name.clone(),
                context: "parquet schema".to_string(),
            })?;
            empty.insert(name.clone(), empty_column(*kind))?;
        }
        return Ok(empty);
    }
    Ok(frame)
}

fn empty_column(kind: ColumnKind) -> Column {
    match kind {
        ColumnKind::Float => Column::Float(Vec::new()),
        ColumnKind::Int => Column::Int(Vec::new()),
        ColumnKind::Bool => Column::Bool(Vec::new()),
        ColumnKind::FloatVec => Column::FloatVec(Vec::new()),
        ColumnKind::IntVec => Column::IntVec(Vec::new()),
        ColumnKind::BoolVec => Column::BoolVec(Vec::new()),
        ColumnKind::FourVector => Column::FourVector(Vec::new()),
    }
}

/// Write a [`Frame`] to a Parquet file. Four-vector columns are not supported.
pub fn write_parquet_frame(frame: &Frame, file_path: &str) -> WremResult<()> {
    let path = expand_path(file_path)?;
    let mut fields = Vec::with_capacity(frame.n_columns());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(frame.n_columns());
    for name in frame.names() {
        let column = frame.column(name)?;
        let (datatype, array): (DataType, ArrayRef) = match column.as_ref() {
            Column::Float(v) => (DataType::Float64, Arc::new(Float64Array::from(v.clone()))),
            Column::Int(v) => (DataType::Int64, Arc::new(Int64Array::from(v.clone()))),
            Column::Bool(v) => (DataType::Boolean, Arc::new(BooleanArray::from(v.clone()))),
            Column::FloatVec(rows) => {
                let mut builder = ListBuilder::new(Float64Builder::new());
                for row in rows {
                    builder.values().append_slice(row);
                    builder.append(true);
                }
                (list_type(DataType::Float64), Arc::new(builder.finish()))
            }
            Column::IntVec(rows) => {
                let mut builder = ListBuilder::new(Int64Builder::new());
                for row in rows {
                    builder.values().append_slice(row);
                    builder.append(true);
                }
                (list_type(DataType::Int64), Arc::new(builder.finish()))
            }
            Column::BoolVec(rows) => {
                let mut builder = ListBuilder::new(BooleanBuilder::new());
                for row in rows {
                    builder.values().append_slice(row);
                    builder.append(true);
                }
                (list_type(DataType::Boolean), Arc::new(builder.finish()))
            }
            Column::FourVector(_) => {
                return Err(WremError::InvalidColumnType {
                    name: name.to_string(),
                    datatype: ColumnKind::FourVector.to_string(),
                })
            }
        };
        fields.push(Field::new(name, datatype, false));
        arrays.push(array);
    }
    let schema = Arc::new(ArrowSchema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), arrays)?;
    let file = File::create(&path)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

/// A [`Source`] reading the files of one dataset.
#[derive(Clone, Debug)]
pub struct ParquetSource {
    name: String,
    files: Vec<PathBuf>,
}

impl ParquetSource {
    pub fn new(name: &str, files: Vec<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            files,
        }
    }
}

impl Source for ParquetSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> WremResult<Schema> {
        let first = self.files.first().ok_or_else(|| {
            WremError::Custom(format!("dataset \"{}\" has no input files", self.name))
        })?;
        parquet_schema(first)
    }

    fn load(&self, columns: &[String]) -> WremResult<Frame> {
        debug!(dataset = %self.name, n_files = self.files.len(), n_columns = columns.len(), "reading columns");
        read_parquet_frame(&self.files, columns)
    }
}
