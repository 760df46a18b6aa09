use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    column::{ColumnKind, FillView, Frame},
    data::{Dataset, ParquetSource},
    graph::{CutflowEntry, Executor, Graph, Source},
    hist::{Axis, Hist},
    utils::weighted_sum,
    WremError, WremResult,
};

/// Everything produced for one dataset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetOutput {
    pub dataset: Dataset,
    pub hists: IndexMap<String, Hist>,
    pub counts: IndexMap<String, u64>,
    /// Sum of event weights before any selection.
    pub weightsum: f64,
    /// Number of events before any selection.
    pub event_count: u64,
    pub cutflow: Vec<CutflowEntry>,
    /// The normalisation factor applied by [`scale_to_data`], if any.
    pub scale: Option<f64>,
}

/// Results of a batch, keyed by [`Dataset::output_name`].
pub type ResultDict = IndexMap<String, DatasetOutput>;

enum Action {
    Histo {
        hist: Hist,
        columns: Vec<String>,
        weight: Option<String>,
    },
    HistoTensor {
        hist: Hist,
        columns: Vec<String>,
        weights: String,
    },
    SumAndCount {
        weight: String,
    },
    Count,
}

struct Booking {
    name: String,
    node: Graph,
    action: Action,
}

impl Booking {
    fn reads(&self) -> Vec<String> {
        match &self.action {
            Action::Histo {
                columns, weight, ..
            } => columns.iter().chain(weight.iter()).cloned().collect(),
            Action::HistoTensor {
                columns, weights, ..
            } => columns
                .iter()
                .chain(std::iter::once(weights))
                .cloned()
                .collect(),
            Action::SumAndCount { weight } => vec![weight.clone()],
            Action::Count => Vec::new(),
        }
    }
}

/// The results requested from one dataset's graph.
///
/// A dataset's build callback receives its own `Bookings` and registers every histogram and counter
/// on it. Nothing is computed until the batch runs.
pub struct Bookings {
    dataset: String,
    entries: Vec<Booking>,
    names: IndexSet<String>,
    has_weightsum: bool,
}

impl Bookings {
    pub fn new(dataset: &str) -> Self {
        Self {
            dataset: dataset.to_string(),
            entries: Vec::new(),
            names: IndexSet::new(),
            has_weightsum: false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    fn register(&mut self, name: &str) -> WremResult<()> {
        if !self.names.insert(name.to_string()) {
            return Err(WremError::DuplicateName {
                category: "histogram".to_string(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn check_scalar(node: &Graph, column: &str, context: &str) -> WremResult<()> {
        let kind = node.column_kind(column, context)?;
        if !kind.is_scalar() {
            return Err(WremError::ColumnType {
                name: column.to_string(),
                expected: "a scalar column".to_string(),
                actual: kind.to_string(),
            });
        }
        Ok(())
    }

    fn check_fillable(node: &Graph, column: &str, context: &str) -> WremResult<()> {
        let kind = node.column_kind(column, context)?;
        if kind == ColumnKind::FourVector {
            return Err(WremError::ColumnType {
                name: column.to_string(),
                expected: "a scalar or vector column".to_string(),
                actual: kind.to_string(),
            });
        }
        Ok(())
    }

    fn check_columns(node: &Graph, name: &str, n_axes: usize, columns: &[&str]) -> WremResult<()> {
        if columns.len() != n_axes {
            return Err(WremError::LengthMismatch {
                context: format!("columns of histogram \"{name}\""),
                expected: n_axes,
                actual: columns.len(),
            });
        }
        for column in columns {
            Self::check_scalar(node, column, name)?;
        }
        Ok(())
    }

    /// Book a histogram of `columns` (one per axis), optionally weighted by a `weight` column.
    ///
    /// Vector columns fill one entry per element and must agree in length within a row; scalar
    /// columns are repeated for every element.
    pub fn histo(
        &mut self,
        name: &str,
        node: &Graph,
        axes: Vec<Axis>,
        columns: &[&str],
        weight: Option<&str>,
    ) -> WremResult<()> {
        if columns.len() != axes.len() {
            return Err(WremError::LengthMismatch {
                context: format!("columns of histogram \"{name}\""),
                expected: axes.len(),
                actual: columns.len(),
            });
        }
        for column in columns.iter().chain(weight.iter()) {
            Self::check_fillable(node, column, name)?;
        }
        let hist = Hist::new(name, axes)?;
        self.register(name)?;
        self.entries.push(Booking {
            name: name.to_string(),
            node: node.clone(),
            action: Action::Histo {
                hist,
                columns: columns.iter().map(|s| s.to_string()).collect(),
                weight: weight.map(|s| s.to_string()),
            },
        });
        Ok(())
    }

    /// Book a histogram with trailing `tensor_axes` filled from a per-row weight vector.
    ///
    /// Each row of `weights` must hold one entry per bin of the tensor axes (row-major).
    pub fn histo_tensor(
        &mut self,
        name: &str,
        node: &Graph,
        axes: Vec<Axis>,
        columns: &[&str],
        weights: &str,
        tensor_axes: Vec<Axis>,
    ) -> WremResult<()> {
        Self::check_columns(node, name, axes.len(), columns)?;
        let kind = node.column_kind(weights, name)?;
        if kind != ColumnKind::FloatVec {
            return Err(WremError::ColumnType {
                name: weights.to_string(),
                expected: ColumnKind::FloatVec.to_string(),
                actual: kind.to_string(),
            });
        }
        if tensor_axes.is_empty() {
            return Err(WremError::InvalidAxis {
                name: name.to_string(),
                reason: "a tensor histogram needs at least one tensor axis".to_string(),
            });
        }
        let hist = Hist::new(name, axes.into_iter().chain(tensor_axes).collect())?;
        self.register(name)?;
        self.entries.push(Booking {
            name: name.to_string(),
            node: node.clone(),
            action: Action::HistoTensor {
                hist,
                columns: columns.iter().map(|s| s.to_string()).collect(),
                weights: weights.to_string(),
            },
        });
        Ok(())
    }

    /// Book the weight sum and raw event count used to normalise the dataset.
    pub fn sum_and_count(&mut self, node: &Graph, weight: &str) -> WremResult<()> {
        Self::check_scalar(node, weight, "weightsum")?;
        if self.has_weightsum {
            return Err(WremError::DuplicateName {
                category: "weight sum".to_string(),
                name: weight.to_string(),
            });
        }
        self.has_weightsum = true;
        self.entries.push(Booking {
            name: "weightsum".to_string(),
            node: node.clone(),
            action: Action::SumAndCount {
                weight: weight.to_string(),
            },
        });
        Ok(())
    }

    /// Book a raw row count at `node`.
    pub fn count(&mut self, name: &str, node: &Graph) -> WremResult<()> {
        self.register(name)?;
        self.entries.push(Booking {
            name: name.to_string(),
            node: node.clone(),
            action: Action::Count,
        });
        Ok(())
    }
}

struct Plan {
    dataset: Dataset,
    source: Arc<dyn Source>,
    bookings: Bookings,
}

fn fill_view<'a>(frame: &'a Frame, name: &str) -> WremResult<FillView<'a>> {
    let column = frame.column(name)?;
    column.fill_view().ok_or_else(|| WremError::ColumnType {
        name: name.to_string(),
        expected: "a scalar or vector column".to_string(),
        actual: column.kind().to_string(),
    })
}

/// The number of entries `row` contributes: the common length of all vector views, or one.
fn row_entries(hist: &str, views: &[FillView], row: usize) -> WremResult<usize> {
    let mut entries: Option<usize> = None;
    for view in views {
        if let Some(len) = view.row_len(row) {
            match entries {
                None => entries = Some(len),
                Some(expected) if expected != len => {
                    return Err(WremError::LengthMismatch {
                        context: format!("vector columns of \"{hist}\" in row {row}"),
                        expected,
                        actual: len,
                    })
                }
                Some(_) => {}
            }
        }
    }
    Ok(entries.unwrap_or(1))
}

impl Plan {
    fn execute(self) -> WremResult<DatasetOutput> {
        let Plan {
            dataset,
            source,
            bookings,
        } = self;
        let mut needed = IndexSet::new();
        for booking in &bookings.entries {
            booking.node.source_columns(&booking.reads(), &mut needed);
        }
        let needed: Vec<String> = needed.into_iter().collect();
        let base = source.load(&needed)?;
        info!(
            dataset = %dataset.name,
            rows = base.n_rows(),
            columns = needed.len(),
            bookings = bookings.entries.len(),
            "executing graph"
        );
        let mut executor = Executor::new(base);
        let mut output = DatasetOutput {
            dataset,
            hists: IndexMap::new(),
            counts: IndexMap::new(),
            weightsum: 0.0,
            event_count: 0,
            cutflow: Vec::new(),
            scale: None,
        };
        for booking in bookings.entries {
            let frame = executor.frame(&booking.node)?;
            match booking.action {
                Action::Histo {
                    mut hist,
                    columns,
                    weight,
                } => {
                    let mut views: Vec<FillView> = columns
                        .iter()
                        .map(|c| fill_view(&frame, c))
                        .collect::<WremResult<_>>()?;
                    let n_axes = views.len();
                    if let Some(weight) = &weight {
                        views.push(fill_view(&frame, weight)?);
                    }
                    let mut coords = vec![0.0; n_axes];
                    for row in 0..frame.n_rows() {
                        for j in 0..row_entries(&booking.name, &views, row)? {
                            for (coord, view) in coords.iter_mut().zip(&views) {
                                *coord = view.get(row, j);
                            }
                            let w = views.get(n_axes).map(|w| w.get(row, j)).unwrap_or(1.0);
                            hist.fill(&coords, w)?;
                        }
                    }
                    output.hists.insert(booking.name, hist);
                }
                Action::HistoTensor {
                    mut hist,
                    columns,
                    weights,
                } => {
                    let views: Vec<FillView> = columns
                        .iter()
                        .map(|c| fill_view(&frame, c))
                        .collect::<WremResult<_>>()?;
                    let weights = frame.get::<Vec<f64>>(&weights)?;
                    let mut coords = vec![0.0; views.len()];
                    for (row, row_weights) in weights.iter().enumerate() {
                        for (coord, view) in coords.iter_mut().zip(&views) {
                            *coord = view.get(row, 0);
                        }
                        hist.fill_tensor(&coords, row_weights)?;
                    }
                    output.hists.insert(booking.name, hist);
                }
                Action::SumAndCount { weight } => {
                    let weights: Vec<f64> = {
                        let view = fill_view(&frame, &weight)?;
                        (0..frame.n_rows()).map(|row| view.get(row, 0)).collect()
                    };
                    output.weightsum = weighted_sum(&weights);
                    output.event_count = frame.n_rows() as u64;
                }
                Action::Count => {
                    output.counts.insert(booking.name, frame.n_rows() as u64);
                }
            }
        }
        output.cutflow = executor.into_cutflow();
        Ok(output)
    }
}

/// Build every dataset's graph, then execute all of them as one batch.
///
/// Graphs are built sequentially so that configuration errors surface before any data is read.
/// Execution runs in parallel across datasets when the `rayon` feature is enabled; the first
/// failure aborts the batch.
pub fn build_and_run<F>(datasets: &[Dataset], build: F) -> WremResult<ResultDict>
where
    F: Fn(&Dataset, Graph, &mut Bookings) -> WremResult<()>,
{
    build_and_run_with(
        datasets,
        |dataset| {
            Ok(Arc::new(ParquetSource::new(
                &dataset.output_name(),
                dataset.files.clone(),
            )))
        },
        build,
    )
}

/// [`build_and_run`] with a custom source for each dataset.
pub fn build_and_run_with<S, F>(
    datasets: &[Dataset],
    make_source: S,
    build: F,
) -> WremResult<ResultDict>
where
    S: Fn(&Dataset) -> WremResult<Arc<dyn Source>>,
    F: Fn(&Dataset, Graph, &mut Bookings) -> WremResult<()>,
{
    let mut plans = Vec::with_capacity(datasets.len());
    let mut seen = IndexSet::new();
    for dataset in datasets {
        let output_name = dataset.output_name();
        if !seen.insert(output_name.clone()) {
            return Err(WremError::DuplicateName {
                category: "dataset".to_string(),
                name: output_name,
            });
        }
        info!(dataset = %output_name, "building graph");
        let source = make_source(dataset)?;
        let graph = Graph::from_shared_source(source.clone())?;
        let mut bookings = Bookings::new(&output_name);
        build(dataset, graph, &mut bookings)?;
        debug!(dataset = %bookings.dataset, bookings = bookings.len(), "graph built");
        plans.push(Plan {
            dataset: dataset.clone(),
            source,
            bookings,
        });
    }
    #[cfg(feature = "rayon")]
    let outputs: Vec<DatasetOutput> = plans
        .into_par_iter()
        .map(Plan::execute)
        .collect::<WremResult<_>>()?;
    #[cfg(not(feature = "rayon"))]
    let outputs: Vec<DatasetOutput> = plans
        .into_iter()
        .map(Plan::execute)
        .collect::<WremResult<_>>()?;
    Ok(outputs
        .into_iter()
        .map(|output| (output.dataset.output_name(), output))
        .collect())
}

/// Normalise every simulated dataset to the luminosity of the data in `results`.
///
/// The factor is `lumi · xsec / Σw`, with `lumi` the summed luminosity (pb⁻¹) of all data
/// datasets and `xsec` in pb. Returns the luminosity used.
pub fn scale_to_data(results: &mut ResultDict) -> WremResult<f64> {
    let lumi: f64 = results
        .values()
        .filter(|r| r.dataset.is_data())
        .filter_map(|r| r.dataset.lumi)
        .sum();
    info!(lumi, "scaling simulation to data");
    for (name, result) in results.iter_mut() {
        if result.dataset.is_data() {
            continue;
        }
        let xsec = result.dataset.xsec.ok_or_else(|| {
            WremError::Custom(format!("simulated dataset \"{name}\" has no cross section"))
        })?;
        let scale = if result.weightsum != 0.0 {
            lumi * xsec / result.weightsum
        } else {
            0.0
        };
        debug!(dataset = %name, scale, "scaled");
        result.hists.values_mut().for_each(|h| h.scale(scale));
        result.scale = Some(scale);
    }
    Ok(lumi)
}

/// Merge the results of all datasets belonging to each of `groups` into one entry named after the
/// group. Datasets of other groups are left untouched.
pub fn aggregate_groups(results: &mut ResultDict, groups: &[&str]) -> WremResult<()> {
    for &group in groups {
        let members: Vec<String> = results
            .iter()
            .filter(|(_, r)| r.dataset.group == group)
            .map(|(name, _)| name.clone())
            .collect();
        if members.is_empty() {
            continue;
        }
        if members.len() == 1 && members[0] == group {
            continue;
        }
        let mut merged: Option<DatasetOutput> = None;
        for member in &members {
            let Some(result) = results.shift_remove(member) else {
                continue;
            };
            match merged.as_mut() {
                None => {
                    let mut first = result;
                    first.dataset.name = group.to_string();
                    first.dataset.files.clear();
                    first.cutflow.clear();
                    merged = Some(first);
                }
                Some(acc) => {
                    for (name, hist) in result.hists {
                        match acc.hists.get_mut(&name) {
                            Some(existing) => existing.add(&hist)?,
                            None => {
                                acc.hists.insert(name, hist);
                            }
                        }
                    }
                    for (name, count) in result.counts {
                        *acc.counts.entry(name).or_insert(0) += count;
                    }
                    acc.weightsum += result.weightsum;
                    acc.event_count += result.event_count;
                    acc.scale = None;
                    acc.dataset.xsec = match (acc.dataset.xsec, result.dataset.xsec) {
                        (Some(a), Some(b)) => Some(a + b),
                        _ => None,
                    };
                    acc.dataset.lumi = match (acc.dataset.lumi, result.dataset.lumi) {
                        (Some(a), Some(b)) => Some(a + b),
                        (a, b) => a.or(b),
                    };
                }
            }
        }
        if let Some(merged) = merged {
            info!(group, members = members.len(), "aggregated group");
            results.insert(group.to_string(), merged);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::{
        column::{Column, Frame},
        graph::FrameSource,
        SampleKind,
    };

    fn events(n: i64) -> Frame {
        Frame::from_columns([
            ("event", Column::Int((0..n).collect())),
            ("genWeight", Column::Float((0..n).map(|_| 2.0).collect())),
        ])
        .unwrap()
    }

    fn in_memory(dataset: &Dataset) -> WremResult<Arc<dyn Source>> {
        Ok(Arc::new(FrameSource::new(&dataset.name, events(10))))
    }

    fn charge_axis() -> Axis {
        Axis::regular("charge", 2, -2.0, 2.0).unwrap().without_flow()
    }

    #[test]
    fn test_charge_split_end_to_end() {
        let datasets = vec![Dataset::new("data", SampleKind::Data).lumi(1.0)];
        let results = build_and_run_with(&datasets, in_memory, |_, df, bookings| {
            let df = df.define("charge", &["event"], |e: &i64| if *e < 6 { 1i64 } else { -1 })?;
            let df = df.define_constant("weight", 1.0)?;
            bookings.sum_and_count(&df, "weight")?;
            bookings.histo("charge", &df, vec![charge_axis()], &["charge"], Some("weight"))
        })
        .unwrap();
        let hist = &results["data"].hists["charge"];
        assert_eq!(hist.values(), &[4.0, 6.0]);
        assert_eq!(results["data"].event_count, 10);
    }

    #[test]
    fn test_vector_columns_fill_per_element() {
        let datasets = vec![Dataset::new("data", SampleKind::Data)];
        let results = build_and_run_with(&datasets, in_memory, |_, df, bookings| {
            let df = df.define("Lep_charge", &["event"], |e: &i64| {
                if *e < 3 {
                    vec![1i64, -1]
                } else {
                    vec![1i64]
                }
            })?;
            let df = df.define_constant("weight", 0.5)?;
            bookings.histo("charge", &df, vec![charge_axis()], &["Lep_charge"], Some("weight"))
        })
        .unwrap();
        // 3 rows with two entries, 7 rows with one
        assert_eq!(results["data"].hists["charge"].values(), &[1.5, 5.0]);

        let result = build_and_run_with(&datasets, in_memory, |_, df, bookings| {
            let df = df.define("a", &["event"], |e: &i64| vec![*e as f64; 2])?;
            let df = df.define("b", &["event"], |e: &i64| vec![*e as f64; 3])?;
            let axes = vec![charge_axis(), charge_axis()];
            bookings.histo("ab", &df, axes, &["a", "b"], None)
        });
        assert!(matches!(result, Err(WremError::LengthMismatch { .. })));
    }

    #[test]
    fn test_booking_errors() {
        let datasets = vec![Dataset::new("data", SampleKind::Data)];
        let result = build_and_run_with(&datasets, in_memory, |_, df, bookings| {
            bookings.histo("h", &df, vec![charge_axis()], &["charge"], None)
        });
        assert!(matches!(result, Err(WremError::UnknownColumn { .. })));
        let result = build_and_run_with(&datasets, in_memory, |_, df, bookings| {
            bookings.histo("h", &df, vec![charge_axis()], &["event"], None)?;
            bookings.histo("h", &df, vec![charge_axis()], &["event"], None)
        });
        assert!(matches!(result, Err(WremError::DuplicateName { .. })));
        let result = build_and_run_with(&datasets, in_memory, |_, df, bookings| {
            bookings.histo("h", &df, vec![charge_axis()], &["event", "genWeight"], None)
        });
        assert!(matches!(result, Err(WremError::LengthMismatch { .. })));
    }

    #[test]
    fn test_failure_aborts_batch() {
        let datasets = vec![
            Dataset::new("a", SampleKind::Data),
            Dataset::new("b", SampleKind::Data),
        ];
        let result = build_and_run_with(&datasets, in_memory, |dataset, df, bookings| {
            let df = df.define("w", &["genWeight"], |w: &f64| vec![*w; 2])?;
            let n = if dataset.name == "b" { 3 } else { 2 };
            let tensor = Axis::integer("var", 0, n).unwrap().without_flow();
            bookings.histo_tensor("h", &df, vec![charge_axis()], &["event"], "w", vec![tensor])
        });
        assert!(matches!(result, Err(WremError::LengthMismatch { .. })));
    }

    #[test]
    fn test_scale_and_aggregate() {
        let datasets = vec![
            Dataset::new("data", SampleKind::Data).lumi(100.0),
            Dataset::new("WW", SampleKind::Simulation)
                .xsec(10.0)
                .group("Diboson"),
            Dataset::new("ZZ", SampleKind::Simulation)
                .xsec(5.0)
                .group("Diboson"),
        ];
        let mut results = build_and_run_with(&datasets, in_memory, |dataset, df, bookings| {
            let df = if dataset.is_data() {
                df.define_constant("weight", 1.0)?
            } else {
                df.define("weight", &["genWeight"], |w: &f64| w.signum())?
            };
            bookings.sum_and_count(&df, "weight")?;
            let df = df.filter("even", &["event"], |e: &i64| e % 2 == 0)?;
            bookings.count("selected", &df)?;
            let axis = Axis::regular("event", 10, 0.0, 10.0)?;
            bookings.histo("n", &df, vec![axis], &["event"], Some("weight"))
        })
        .unwrap();
        assert_eq!(results["WW"].cutflow.len(), 1);
        assert_eq!(results["WW"].counts["selected"], 5);
        let lumi = scale_to_data(&mut results).unwrap();
        assert_relative_eq!(lumi, 100.0);
        // 10 events of weight 1: scale = 100 * 10 / 10
        assert_relative_eq!(results["WW"].scale.unwrap(), 100.0);
        assert_relative_eq!(results["WW"].hists["n"].sum(true), 500.0);
        assert!(results["data"].scale.is_none());

        aggregate_groups(&mut results, &["Diboson"]).unwrap();
        assert_eq!(results.len(), 2);
        let diboson = &results["Diboson"];
        assert_relative_eq!(diboson.hists["n"].sum(true), 750.0);
        assert_eq!(diboson.counts["selected"], 10);
        assert_relative_eq!(diboson.dataset.xsec.unwrap(), 15.0);
    }
}
