use std::{
    collections::HashMap,
    fmt::Debug,
    marker::PhantomData,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    column::{Column, ColumnKind, ColumnValue, Frame},
    WremError, WremResult,
};

/// The column names and kinds available at a point in a [`Graph`].
pub type Schema = IndexMap<String, ColumnKind>;

/// Something that can provide the initial columns of a [`Graph`].
pub trait Source: Send + Sync {
    /// A label used in log messages.
    fn name(&self) -> &str;
    /// The columns this source can provide. Must not read event data.
    fn schema(&self) -> WremResult<Schema>;
    /// Read the requested columns.
    fn load(&self, columns: &[String]) -> WremResult<Frame>;
}

/// An in-memory [`Source`], mostly useful for tests and small derived samples.
#[derive(Clone, Debug)]
pub struct FrameSource {
    name: String,
    frame: Frame,
}

impl FrameSource {
    pub fn new<S: Into<String>>(name: S, frame: Frame) -> Self {
        Self {
            name: name.into(),
            frame,
        }
    }
}

impl Source for FrameSource {
    fn name(&self) -> &str {
        &self.name
    }
    fn schema(&self) -> WremResult<Schema> {
        self.frame
            .names()
            .map(|name| {
                self.frame
                    .column(name)
                    .map(|column| (name.to_string(), column.kind()))
            })
            .collect()
    }
    fn load(&self, columns: &[String]) -> WremResult<Frame> {
        self.frame.select(columns)
    }
}

/// A strongly-typed per-row function of one to six columns.
///
/// This is implemented for every closure `Fn(&A, &B, ...) -> O` whose arguments and output are
/// [`ColumnValue`]s, so kernels are written as ordinary Rust closures:
/// ```ignore
/// let df = df.define("absYll", &["yll"], |y: &f64| y.abs())?;
/// ```
pub trait Kernel<Args, O>: Send + Sync + 'static {
    /// The kinds of the input columns, in argument order.
    fn input_kinds() -> Vec<ColumnKind>;
    /// Evaluate the kernel on every row of `frame`.
    fn eval(&self, frame: &Frame, inputs: &[String]) -> WremResult<Vec<O>>;
}

fn next_input<'a>(names: &mut std::slice::Iter<'a, String>) -> WremResult<&'a str> {
    names
        .next()
        .map(|s| s.as_str())
        .ok_or_else(|| WremError::Custom("kernel called with too few inputs".to_string()))
}

macro_rules! impl_kernel {
    ($($arg:ident),+) => {
        impl<F, O, $($arg,)+> Kernel<($($arg,)+), O> for F
        where
            F: Fn($(&$arg),+) -> O + Send + Sync + 'static,
            O: ColumnValue,
            $($arg: ColumnValue,)+
        {
            fn input_kinds() -> Vec<ColumnKind> {
                vec![$($arg::KIND),+]
            }

            #[allow(non_snake_case)]
            fn eval(&self, frame: &Frame, inputs: &[String]) -> WremResult<Vec<O>> {
                let mut names = inputs.iter();
                $(let $arg: &[$arg] = frame.get::<$arg>(next_input(&mut names)?)?;)+
                Ok((0..frame.n_rows()).map(|i| self($(&$arg[i]),+)).collect())
            }
        }
    };
}

impl_kernel!(A1);
impl_kernel!(A1, A2);
impl_kernel!(A1, A2, A3);
impl_kernel!(A1, A2, A3, A4);
impl_kernel!(A1, A2, A3, A4, A5);
impl_kernel!(A1, A2, A3, A4, A5, A6);

trait ErasedKernel: Send + Sync {
    fn eval_column(&self, frame: &Frame, inputs: &[String]) -> WremResult<Column>;
    fn eval_mask(&self, frame: &Frame, inputs: &[String]) -> WremResult<Vec<bool>>;
}

struct KernelBox<K, Args, O> {
    kernel: K,
    _marker: PhantomData<fn() -> (Args, O)>,
}

impl<K, Args, O> ErasedKernel for KernelBox<K, Args, O>
where
    K: Kernel<Args, O>,
    Args: 'static,
    O: ColumnValue,
{
    fn eval_column(&self, frame: &Frame, inputs: &[String]) -> WremResult<Column> {
        Ok(O::into_column(self.kernel.eval(frame, inputs)?))
    }
    fn eval_mask(&self, frame: &Frame, inputs: &[String]) -> WremResult<Vec<bool>> {
        let column = self.eval_column(frame, inputs)?;
        match column {
            Column::Bool(mask) => Ok(mask),
            other => Err(WremError::ColumnType {
                name: "filter".to_string(),
                expected: ColumnKind::Bool.to_string(),
                actual: other.kind().to_string(),
            }),
        }
    }
}

type ConstantFn = Arc<dyn Fn(usize) -> Column + Send + Sync>;

enum Step {
    Source,
    Define {
        name: String,
        inputs: Vec<String>,
        kernel: Arc<dyn ErasedKernel>,
    },
    Constant {
        name: String,
        make: ConstantFn,
    },
    Alias {
        alias: String,
        target: String,
    },
    Filter {
        label: String,
        inputs: Vec<String>,
        kernel: Arc<dyn ErasedKernel>,
    },
}

impl Step {
    fn reads(&self) -> &[String] {
        match self {
            Step::Define { inputs, .. } | Step::Filter { inputs, .. } => inputs,
            Step::Alias { target, .. } => std::slice::from_ref(target),
            Step::Source | Step::Constant { .. } => &[],
        }
    }
}

static NEXT_NODE_ID: AtomicUsize = AtomicUsize::new(0);

struct Node {
    id: usize,
    parent: Option<Arc<Node>>,
    step: Step,
    schema: Arc<Schema>,
    source: Arc<dyn Source>,
}

/// A handle on one node of an append-only, lazily evaluated column graph.
///
/// Every transformation returns a new handle whose node points back at the node it was derived
/// from; existing handles are never modified. Column references and types are checked when a step
/// is appended, so a misspelled column fails while the graph is being built rather than during
/// execution.
#[derive(Clone)]
pub struct Graph {
    node: Arc<Node>,
}

impl Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("source", &self.node.source.name())
            .field("node", &self.node.id)
            .field("columns", &self.node.schema.len())
            .finish()
    }
}

impl Graph {
    /// Start a graph from a [`Source`], reading its schema.
    pub fn from_source<S: Source + 'static>(source: S) -> WremResult<Self> {
        Self::from_shared_source(Arc::new(source))
    }

    pub fn from_shared_source(source: Arc<dyn Source>) -> WremResult<Self> {
        let schema = source.schema()?;
        Ok(Self {
            node: Arc::new(Node {
                id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
                parent: None,
                step: Step::Source,
                schema: Arc::new(schema),
                source,
            }),
        })
    }

    fn append(&self, step: Step, schema: Schema) -> Self {
        Self {
            node: Arc::new(Node {
                id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
                parent: Some(self.node.clone()),
                step,
                schema: Arc::new(schema),
                source: self.node.source.clone(),
            }),
        }
    }

    pub(crate) fn id(&self) -> usize {
        self.node.id
    }

    pub fn source_name(&self) -> &str {
        self.node.source.name()
    }

    pub fn schema(&self) -> &Schema {
        &self.node.schema
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.node.schema.contains_key(name)
    }

    /// Look up the kind of a column, failing with [`WremError::UnknownColumn`].
    pub fn column_kind(&self, name: &str, context: &str) -> WremResult<ColumnKind> {
        self.node
            .schema
            .get(name)
            .copied()
            .ok_or_else(|| WremError::UnknownColumn {
                name: name.to_string(),
                context: context.to_string(),
            })
    }

    fn check_new_name(&self, name: &str) -> WremResult<()> {
        if self.has_column(name) {
            return Err(WremError::DuplicateColumn {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn check_inputs(&self, context: &str, inputs: &[&str], kinds: &[ColumnKind]) -> WremResult<()> {
        if inputs.len() != kinds.len() {
            return Err(WremError::LengthMismatch {
                context: format!("inputs of \"{context}\""),
                expected: kinds.len(),
                actual: inputs.len(),
            });
        }
        for (input, expected) in inputs.iter().zip(kinds) {
            let actual = self.column_kind(input, context)?;
            if actual != *expected {
                return Err(WremError::ColumnType {
                    name: input.to_string(),
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Define a new column computed row by row from existing ones.
    pub fn define<K, Args, O>(&self, name: &str, inputs: &[&str], kernel: K) -> WremResult<Self>
    where
        K: Kernel<Args, O>,
        Args: 'static,
        O: ColumnValue,
    {
        self.check_new_name(name)?;
        self.check_inputs(name, inputs, &K::input_kinds())?;
        let mut schema = (*self.node.schema).clone();
        schema.insert(name.to_string(), O::KIND);
        Ok(self.append(
            Step::Define {
                name: name.to_string(),
                inputs: inputs.iter().map(|s| s.to_string()).collect(),
                kernel: Arc::new(KernelBox::<K, Args, O> {
                    kernel,
                    _marker: PhantomData,
                }),
            },
            schema,
        ))
    }

    /// Define a column holding the same value for every row.
    pub fn define_constant<T: ColumnValue>(&self, name: &str, value: T) -> WremResult<Self> {
        self.check_new_name(name)?;
        let mut schema = (*self.node.schema).clone();
        schema.insert(name.to_string(), T::KIND);
        Ok(self.append(
            Step::Constant {
                name: name.to_string(),
                make: Arc::new(move |n| T::into_column(vec![value.clone(); n])),
            },
            schema,
        ))
    }

    /// Make an existing column available under another name.
    pub fn alias(&self, alias: &str, target: &str) -> WremResult<Self> {
        self.check_new_name(alias)?;
        let kind = self.column_kind(target, alias)?;
        let mut schema = (*self.node.schema).clone();
        schema.insert(alias.to_string(), kind);
        Ok(self.append(
            Step::Alias {
                alias: alias.to_string(),
                target: target.to_string(),
            },
            schema,
        ))
    }

    /// Keep only the rows for which `kernel` returns `true`.
    pub fn filter<K, Args>(&self, label: &str, inputs: &[&str], kernel: K) -> WremResult<Self>
    where
        K: Kernel<Args, bool>,
        Args: 'static,
    {
        self.check_inputs(label, inputs, &K::input_kinds())?;
        Ok(self.append(
            Step::Filter {
                label: label.to_string(),
                inputs: inputs.iter().map(|s| s.to_string()).collect(),
                kernel: Arc::new(KernelBox::<K, Args, bool> {
                    kernel,
                    _marker: PhantomData,
                }),
            },
            (*self.node.schema).clone(),
        ))
    }

    /// Filter on a boolean column.
    pub fn filter_column(&self, column: &str) -> WremResult<Self> {
        self.filter(column, &[column], |pass: &bool| *pass)
    }

    /// The number of filters between this node and the source.
    pub fn n_filters(&self) -> usize {
        self.chain()
            .iter()
            .filter(|node| matches!(node.step, Step::Filter { .. }))
            .count()
    }

    fn chain(&self) -> Vec<Arc<Node>> {
        let mut chain = vec![self.node.clone()];
        let mut current = self.node.clone();
        while let Some(parent) = current.parent.clone() {
            chain.push(parent.clone());
            current = parent;
        }
        chain.reverse();
        chain
    }

    /// Source columns read anywhere along this chain, plus `extra` columns read by actions.
    pub(crate) fn source_columns(&self, extra: &[String], out: &mut IndexSet<String>) {
        let chain = self.chain();
        let source_schema = &chain[0].schema;
        let reads = chain
            .iter()
            .flat_map(|node| node.step.reads().iter())
            .chain(extra.iter());
        for name in reads {
            if source_schema.contains_key(name) {
                out.insert(name.clone());
            }
        }
    }

    pub(crate) fn source(&self) -> Arc<dyn Source> {
        self.node.source.clone()
    }

    /// Load every source column and materialize this node.
    pub fn collect(&self) -> WremResult<Frame> {
        let chain = self.chain();
        let columns: Vec<String> = chain[0].schema.keys().cloned().collect();
        let base = self.source().load(&columns)?;
        let frame = Executor::new(base).frame(self)?;
        Ok((*frame).clone())
    }
}

/// Rows before and after one filter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CutflowEntry {
    pub label: String,
    pub before: usize,
    pub after: usize,
}

/// Materializes graph nodes, computing every node at most once.
pub(crate) struct Executor {
    cache: HashMap<usize, Arc<Frame>>,
    base: Arc<Frame>,
    cutflow: Vec<CutflowEntry>,
}

impl Executor {
    pub(crate) fn new(base: Frame) -> Self {
        Self {
            cache: HashMap::new(),
            base: Arc::new(base),
            cutflow: Vec::new(),
        }
    }

    pub(crate) fn frame(&mut self, graph: &Graph) -> WremResult<Arc<Frame>> {
        if let Some(frame) = self.cache.get(&graph.id()) {
            return Ok(frame.clone());
        }
        let chain = graph.chain();
        let start = chain
            .iter()
            .rposition(|node| self.cache.contains_key(&node.id))
            .unwrap_or(0);
        let mut frame = match self.cache.get(&chain[start].id) {
            Some(frame) => frame.clone(),
            None => self.base.clone(),
        };
        for node in &chain[start..] {
            if self.cache.contains_key(&node.id) {
                continue;
            }
            frame = self.apply(&node.step, &frame)?;
            self.cache.insert(node.id, frame.clone());
        }
        Ok(frame)
    }

    fn apply(&mut self, step: &Step, frame: &Arc<Frame>) -> WremResult<Arc<Frame>> {
        match step {
            Step::Source => Ok(frame.clone()),
            Step::Define {
                name,
                inputs,
                kernel,
            } => {
                let column = kernel.eval_column(frame, inputs)?;
                let mut next = (**frame).clone();
                next.insert(name.clone(), column)?;
                Ok(Arc::new(next))
            }
            Step::Constant { name, make } => {
                let mut next = (**frame).clone();
                next.insert(name.clone(), make(frame.n_rows()))?;
                Ok(Arc::new(next))
            }
            Step::Alias { alias, target } => {
                let mut next = (**frame).clone();
                next.alias(alias, target)?;
                Ok(Arc::new(next))
            }
            Step::Filter {
                label,
                inputs,
                kernel,
            } => {
                let mask = kernel.eval_mask(frame, inputs)?;
                let next = frame.filter(&mask)?;
                debug!(
                    filter = %label,
                    before = frame.n_rows(),
                    after = next.n_rows(),
                    "applied filter"
                );
                self.cutflow.push(CutflowEntry {
                    label: label.clone(),
                    before: frame.n_rows(),
                    after: next.n_rows(),
                });
                Ok(Arc::new(next))
            }
        }
    }

    pub(crate) fn into_cutflow(self) -> Vec<CutflowEntry> {
        self.cutflow
    }
}
