//! # wremnants-core
//!
//! This is an internal crate used by `wremnants`. It provides the typed lazy column graph that
//! histogram producers are written against, the weighted histograms they fill, and the
//! containers their results are scaled, merged and serialized in.
#![warn(clippy::perf, clippy::style)]
#![allow(clippy::excessive_precision)]

use thiserror::Error;

/// Typed per-row column storage and the [`Frame`](crate::column::Frame) that groups columns.
pub mod column;
/// Dataset descriptions, discovery on disk, and Parquet readers/writers.
pub mod data;
/// The append-only lazy computation graph.
pub mod graph;
/// Weighted N-dimensional histograms and their axes.
pub mod hist;
/// Serialization of the per-process histogram container.
pub mod output;
/// Per-dataset bookings, batched execution, scaling and aggregation of results.
pub mod results;
/// Utility functions, enums, and four-vectors
pub mod utils;

pub use column::{Column, ColumnKind, ColumnValue, Frame};
pub use data::{Dataset, DiscoveryOptions, SampleKind, SampleSpec};
pub use graph::{Graph, Kernel, Source};
pub use hist::{Axis, Hist};
pub use results::{build_and_run, Bookings, DatasetOutput, ResultDict};
pub use utils::vectors::FourVector;

/// The error type used by all `wremnants` internal methods
#[derive(Error, Debug)]
pub enum WremError {
    /// An alias for [`std::io::Error`].
    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),
    /// An alias for [`parquet::errors::ParquetError`].
    #[error("Parquet Error: {0}")]
    ParquetError(#[from] parquet::errors::ParquetError),
    /// An alias for [`arrow::error::ArrowError`].
    #[error("Arrow Error: {0}")]
    ArrowError(#[from] arrow::error::ArrowError),
    /// An alias for [`shellexpand::LookupError`].
    #[error("Failed to expand path: {0}")]
    LookupError(#[from] shellexpand::LookupError<std::env::VarError>),
    /// A step or booking referenced a column which is not defined upstream.
    #[error("Unknown column \"{name}\" (referenced by \"{context}\")")]
    UnknownColumn {
        /// Name of the missing column
        name: String,
        /// The step or booking which referenced it
        context: String,
    },
    /// A step tried to define a column which already exists on the node.
    #[error("Column \"{name}\" is already defined")]
    DuplicateColumn {
        /// Name of the column
        name: String,
    },
    /// A column was read with a different type than the one it was defined with.
    #[error("Column \"{name}\" has type {actual}, but {expected} was expected")]
    ColumnType {
        /// Name of the column
        name: String,
        /// The type required by the reader
        expected: String,
        /// The type the column was defined with
        actual: String,
    },
    /// Two sequences which must share a length did not.
    #[error("Length mismatch in {context}: expected {expected}, found {actual}")]
    LengthMismatch {
        /// Where the mismatch was detected
        context: String,
        /// The expected length
        expected: usize,
        /// The length actually found
        actual: usize,
    },
    /// An on-disk column had a type this crate cannot read.
    #[error("Column \"{name}\" has unsupported data type {datatype}")]
    InvalidColumnType {
        /// Name of the column
        name: String,
        /// The Arrow datatype
        datatype: String,
    },
    /// An on-disk column held missing entries, which have no value in a [`Column`].
    #[error("Column \"{name}\" has {count} null entries")]
    NullValues {
        /// Name of the column
        name: String,
        /// The number of null entries
        count: usize,
    },
    /// A histogram axis was constructed with invalid parameters.
    #[error("Invalid axis \"{name}\": {reason}")]
    InvalidAxis {
        /// Name of the axis
        name: String,
        /// What was wrong with it
        reason: String,
    },
    /// Two histograms which must share a binning did not.
    #[error("Histograms \"{left}\" and \"{right}\" have incompatible axes")]
    IncompatibleHistograms {
        /// The left-hand histogram
        left: String,
        /// The right-hand histogram
        right: String,
    },
    /// A name which must be unique within a `category` was registered twice.
    #[error("A {category} named \"{name}\" is already registered")]
    DuplicateName {
        /// The kind of object being registered
        category: String,
        /// The duplicated name
        name: String,
    },
    /// A process name was not known to the datagroups in use.
    #[error("Unknown process \"{name}\"")]
    UnknownProcess {
        /// Name of the process
        name: String,
    },
    /// A histogram was requested which was never produced.
    #[error("No histogram \"{name}\" for process \"{process}\"")]
    UnknownHistogram {
        /// Name of the histogram
        name: String,
        /// The process it was looked up for
        process: String,
    },
    /// An axis name did not match any axis of the histogram.
    #[error("Histogram \"{hist}\" has no axis \"{axis}\"")]
    UnknownAxis {
        /// Name of the histogram
        hist: String,
        /// Name of the missing axis
        axis: String,
    },
    /// The number of variation names did not match the systematic's tensor shape.
    #[error("Systematic \"{name}\" declares {expected} variations but {actual} names were given")]
    VariationCountMismatch {
        /// Name of the systematic
        name: String,
        /// Product of the axis extents (doubled when mirrored)
        expected: usize,
        /// The number of output names
        actual: usize,
    },
    /// A systematic was registered without any process to act on.
    #[error("Systematic \"{name}\" does not apply to any process")]
    EmptyProcessList {
        /// Name of the systematic
        name: String,
    },
    /// A systematic was registered on a process which does not enter the fit, such as data.
    #[error("Process \"{name}\" of systematic \"{systematic}\" does not enter the fit")]
    NotFitProcess {
        /// Name of the process
        name: String,
        /// Name of the systematic
        systematic: String,
    },
    /// An error which occurs when the user tries to parse an invalid string of text, typically
    /// into an enum variant.
    #[error("Failed to parse string: \"{name}\" does not correspond to a valid \"{object}\"!")]
    ParseError {
        /// The string which was parsed
        name: String,
        /// The name of the object it failed to parse into
        object: String,
    },
    /// An error returned by the Rust encoder
    #[error("Encoder error: {0}")]
    EncodeError(#[from] bincode::error::EncodeError),
    /// An error returned by the Rust decoder
    #[error("Decoder error: {0}")]
    DecodeError(#[from] bincode::error::DecodeError),
    /// An error type for [`rayon`] thread pools
    #[cfg(feature = "rayon")]
    #[error("Error building thread pool: {0}")]
    ThreadPoolError(#[from] rayon::ThreadPoolBuildError),
    /// A custom fallback error for errors too complex or too infrequent to warrant their own error
    /// category.
    #[error("{0}")]
    Custom(String),
}

/// A [`Result`] type alias for [`WremError`]s.
pub type WremResult<T> = Result<T, WremError>;
