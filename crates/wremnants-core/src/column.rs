use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub use crate::utils::enums::ColumnKind;
use crate::{utils::vectors::FourVector, WremError, WremResult};

/// A typed vector holding one value per row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Column {
    Float(Vec<f64>),
    Int(Vec<i64>),
    Bool(Vec<bool>),
    FloatVec(Vec<Vec<f64>>),
    IntVec(Vec<Vec<i64>>),
    BoolVec(Vec<Vec<bool>>),
    FourVector(Vec<FourVector>),
}

impl Column {
    pub fn kind(&self) -> ColumnKind {
        match self {
            Column::Float(_) => ColumnKind::Float,
            Column::Int(_) => ColumnKind::Int,
            Column::Bool(_) => ColumnKind::Bool,
            Column::FloatVec(_) => ColumnKind::FloatVec,
            Column::IntVec(_) => ColumnKind::IntVec,
            Column::BoolVec(_) => ColumnKind::BoolVec,
            Column::FourVector(_) => ColumnKind::FourVector,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Float(v) => v.len(),
            Column::Int(v) => v.len(),
            Column::Bool(v) => v.len(),
            Column::FloatVec(v) => v.len(),
            Column::IntVec(v) => v.len(),
            Column::BoolVec(v) => v.len(),
            Column::FourVector(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keep only the given rows, in the given order.
    pub fn take(&self, rows: &[usize]) -> Column {
        fn pick<T: Clone>(values: &[T], rows: &[usize]) -> Vec<T> {
            rows.iter().map(|&i| values[i].clone()).collect()
        }
        match self {
            Column::Float(v) => Column::Float(pick(v, rows)),
            Column::Int(v) => Column::Int(pick(v, rows)),
            Column::Bool(v) => Column::Bool(pick(v, rows)),
            Column::FloatVec(v) => Column::FloatVec(pick(v, rows)),
            Column::IntVec(v) => Column::IntVec(pick(v, rows)),
            Column::BoolVec(v) => Column::BoolVec(pick(v, rows)),
            Column::FourVector(v) => Column::FourVector(pick(v, rows)),
        }
    }

    /// Append the rows of `other`, which must have the same kind.
    pub fn extend(&mut self, other: Column) -> WremResult<()> {
        match (self, other) {
            (Column::Float(a), Column::Float(b)) => a.extend(b),
            (Column::Int(a), Column::Int(b)) => a.extend(b),
            (Column::Bool(a), Column::Bool(b)) => a.extend(b),
            (Column::FloatVec(a), Column::FloatVec(b)) => a.extend(b),
            (Column::IntVec(a), Column::IntVec(b)) => a.extend(b),
            (Column::BoolVec(a), Column::BoolVec(b)) => a.extend(b),
            (Column::FourVector(a), Column::FourVector(b)) => a.extend(b),
            (a, b) => {
                return Err(WremError::Custom(format!(
                    "Cannot append a {} column to a {} column",
                    b.kind(),
                    a.kind()
                )))
            }
        }
        Ok(())
    }

    /// A view of the column as histogram input, or `None` for four-vectors.
    pub fn fill_view(&self) -> Option<FillView<'_>> {
        match self {
            Column::Float(v) => Some(FillView::Float(v)),
            Column::Int(v) => Some(FillView::Int(v)),
            Column::Bool(v) => Some(FillView::Bool(v)),
            Column::FloatVec(v) => Some(FillView::FloatVec(v)),
            Column::IntVec(v) => Some(FillView::IntVec(v)),
            Column::BoolVec(v) => Some(FillView::BoolVec(v)),
            Column::FourVector(_) => None,
        }
    }
}

fn bool_value(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// Borrowed column, read as `f64` for histogram coordinates and weights.
///
/// Scalar columns yield one value per row; vector columns yield one value per element.
#[derive(Copy, Clone, Debug)]
pub enum FillView<'a> {
    Float(&'a [f64]),
    Int(&'a [i64]),
    Bool(&'a [bool]),
    FloatVec(&'a [Vec<f64>]),
    IntVec(&'a [Vec<i64>]),
    BoolVec(&'a [Vec<bool>]),
}

impl FillView<'_> {
    /// The number of elements in `row`, or `None` for scalar columns.
    pub fn row_len(&self, row: usize) -> Option<usize> {
        match self {
            FillView::Float(_) | FillView::Int(_) | FillView::Bool(_) => None,
            FillView::FloatVec(v) => Some(v[row].len()),
            FillView::IntVec(v) => Some(v[row].len()),
            FillView::BoolVec(v) => Some(v[row].len()),
        }
    }

    /// Element `j` of `row`; scalar columns ignore `j`.
    pub fn get(&self, row: usize, j: usize) -> f64 {
        match self {
            FillView::Float(v) => v[row],
            FillView::Int(v) => v[row] as f64,
            FillView::Bool(v) => bool_value(v[row]),
            FillView::FloatVec(v) => v[row][j],
            FillView::IntVec(v) => v[row][j] as f64,
            FillView::BoolVec(v) => bool_value(v[row][j]),
        }
    }
}

/// A value type which can be stored in a [`Column`] and passed to graph kernels.
pub trait ColumnValue: Clone + Send + Sync + 'static {
    /// The [`ColumnKind`] this type is stored as.
    const KIND: ColumnKind;
    /// Wrap a vector of values into a [`Column`].
    fn into_column(values: Vec<Self>) -> Column;
    /// Borrow the values of a [`Column`] of the matching kind.
    fn slice(column: &Column) -> Option<&[Self]>;
}

macro_rules! impl_column_value {
    ($t:ty, $variant:ident) => {
        impl ColumnValue for $t {
            const KIND: ColumnKind = ColumnKind::$variant;
            fn into_column(values: Vec<Self>) -> Column {
                Column::$variant(values)
            }
            fn slice(column: &Column) -> Option<&[Self]> {
                match column {
                    Column::$variant(v) => Some(v.as_slice()),
                    _ => None,
                }
            }
        }
    };
}

impl_column_value!(f64, Float);
impl_column_value!(i64, Int);
impl_column_value!(bool, Bool);
impl_column_value!(Vec<f64>, FloatVec);
impl_column_value!(Vec<i64>, IntVec);
impl_column_value!(Vec<bool>, BoolVec);
impl_column_value!(FourVector, FourVector);

/// A set of named, equally long [`Column`]s.
///
/// Columns are shared behind [`Arc`] so deriving a new frame from an existing one (adding a column
/// or an alias) does not copy data.
#[derive(Clone, Debug, Default)]
pub struct Frame {
    columns: IndexMap<String, Arc<Column>>,
    n_rows: usize,
}

impl Frame {
    /// An empty frame with a fixed number of rows.
    pub fn new(n_rows: usize) -> Self {
        Self {
            columns: IndexMap::new(),
            n_rows,
        }
    }

    /// Build a frame from named columns. All columns must have the same length.
    pub fn from_columns<S: Into<String>>(
        columns: impl IntoIterator<Item = (S, Column)>,
    ) -> WremResult<Self> {
        let mut iter = columns.into_iter().peekable();
        let n_rows = iter.peek().map(|(_, c)| c.len()).unwrap_or(0);
        let mut frame = Self::new(n_rows);
        for (name, column) in iter {
            frame.insert(name, column)?;
        }
        Ok(frame)
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|s| s.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn insert<S: Into<String>>(&mut self, name: S, column: Column) -> WremResult<()> {
        self.insert_shared(name, Arc::new(column))
    }

    pub fn insert_shared<S: Into<String>>(
        &mut self,
        name: S,
        column: Arc<Column>,
    ) -> WremResult<()> {
        let name = name.into();
        if column.len() != self.n_rows {
            return Err(WremError::LengthMismatch {
                context: format!("column \"{name}\""),
                expected: self.n_rows,
                actual: column.len(),
            });
        }
        if self.columns.contains_key(&name) {
            return Err(WremError::DuplicateColumn { name });
        }
        self.columns.insert(name, column);
        Ok(())
    }

    /// Make `target` available under a second name without copying it.
    pub fn alias(&mut self, alias: &str, target: &str) -> WremResult<()> {
        let column = self.column(target)?.clone();
        self.insert_shared(alias, column)
    }

    pub fn column(&self, name: &str) -> WremResult<&Arc<Column>> {
        self.columns
            .get(name)
            .ok_or_else(|| WremError::UnknownColumn {
                name: name.to_string(),
                context: "frame".to_string(),
            })
    }

    /// Borrow a column with a static type.
    pub fn get<T: ColumnValue>(&self, name: &str) -> WremResult<&[T]> {
        let column = self.column(name)?;
        T::slice(column).ok_or_else(|| WremError::ColumnType {
            name: name.to_string(),
            expected: T::KIND.to_string(),
            actual: column.kind().to_string(),
        })
    }

    /// A frame holding only the named columns.
    pub fn select(&self, names: &[String]) -> WremResult<Frame> {
        let mut frame = Frame::new(self.n_rows);
        for name in names {
            frame.insert_shared(name.clone(), self.column(name)?.clone())?;
        }
        Ok(frame)
    }

    /// Keep the rows for which `mask` is `true`.
    pub fn filter(&self, mask: &[bool]) -> WremResult<Frame> {
        if mask.len() != self.n_rows {
            return Err(WremError::LengthMismatch {
                context: "filter mask".to_string(),
                expected: self.n_rows,
                actual: mask.len(),
            });
        }
        let rows: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, keep)| keep.then_some(i))
            .collect();
        let mut frame = Frame::new(rows.len());
        for (name, column) in &self.columns {
            frame
                .columns
                .insert(name.clone(), Arc::new(column.take(&rows)));
        }
        Ok(frame)
    }

    /// Append the rows of another frame with the same column names and kinds.
    pub fn append(&mut self, other: Frame) -> WremResult<()> {
        if self.columns.is_empty() && self.n_rows == 0 {
            *self = other;
            return Ok(());
        }
        if other.columns.len() != self.columns.len() {
            return Err(WremError::LengthMismatch {
                context: "appended frame columns".to_string(),
                expected: self.columns.len(),
                actual: other.columns.len(),
            });
        }
        let n_other = other.n_rows;
        let mut other = other.columns;
        for (name, column) in self.columns.iter_mut() {
            let incoming = other
                .swap_remove(name)
                .ok_or_else(|| WremError::UnknownColumn {
                    name: name.clone(),
                    context: "appended frame".to_string(),
                })?;
            let incoming = Arc::try_unwrap(incoming).unwrap_or_else(|shared| (*shared).clone());
            Arc::make_mut(column).extend(incoming)?;
        }
        self.n_rows += n_other;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_frame() -> Frame {
        Frame::from_columns([
            ("x", Column::Float(vec![1.0, 2.0, 3.0])),
            ("n", Column::Int(vec![1, 0, 2])),
            ("v", Column::FloatVec(vec![vec![1.0], vec![], vec![2.0, 3.0]])),
        ])
        .unwrap()
    }

    #[test]
    fn test_typed_access() {
        let frame = test_frame();
        assert_eq!(frame.get::<f64>("x").unwrap(), &[1.0, 2.0, 3.0]);
        assert_eq!(frame.get::<Vec<f64>>("v").unwrap()[2], vec![2.0, 3.0]);
        assert!(matches!(
            frame.get::<i64>("x"),
            Err(WremError::ColumnType { .. })
        ));
        assert!(matches!(
            frame.get::<f64>("missing"),
            Err(WremError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_insert_checks() {
        let mut frame = test_frame();
        assert!(matches!(
            frame.insert("short", Column::Bool(vec![true])),
            Err(WremError::LengthMismatch { .. })
        ));
        assert!(matches!(
            frame.insert("x", Column::Float(vec![0.0; 3])),
            Err(WremError::DuplicateColumn { .. })
        ));
        frame.alias("y", "x").unwrap();
        assert!(Arc::ptr_eq(
            frame.column("x").unwrap(),
            frame.column("y").unwrap()
        ));
    }

    #[test]
    fn test_filter() {
        let frame = test_frame();
        let filtered = frame.filter(&[true, false, true]).unwrap();
        assert_eq!(filtered.n_rows(), 2);
        assert_eq!(filtered.get::<i64>("n").unwrap(), &[1, 2]);
        assert_eq!(filtered.get::<Vec<f64>>("v").unwrap()[1], vec![2.0, 3.0]);
        assert!(frame.filter(&[true]).is_err());
    }

    #[test]
    fn test_append() {
        let mut frame = test_frame();
        frame.append(test_frame()).unwrap();
        assert_eq!(frame.n_rows(), 6);
        assert_eq!(frame.get::<f64>("x").unwrap()[3], 1.0);
        let mut empty = Frame::default();
        empty.append(test_frame()).unwrap();
        assert_eq!(empty.n_rows(), 3);
    }

    #[test]
    fn test_fill_view() {
        let column = Column::Bool(vec![true, false]);
        let view = column.fill_view().unwrap();
        assert_eq!(view.row_len(0), None);
        assert_eq!(view.get(0, 7), 1.0);
        assert_eq!(view.get(1, 0), 0.0);
        let column = Column::IntVec(vec![vec![1, -1], vec![]]);
        let view = column.fill_view().unwrap();
        assert_eq!(view.row_len(0), Some(2));
        assert_eq!(view.row_len(1), Some(0));
        assert_eq!(view.get(0, 1), -1.0);
        assert!(Column::FourVector(vec![]).fill_view().is_none());
    }
}
