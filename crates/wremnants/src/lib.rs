//! `wremnants` produces the histograms of W-mass and W-like Z measurements from columnar event
//! data and turns them into the inputs of a binned likelihood fit.
//!
//! # Overview
//! An analysis is written as a function which receives a [`Graph`] over one dataset and books
//! histograms on a [`Bookings`] accumulator. Columns are defined with typed closures, so a column
//! which does not exist or has the wrong type is reported when the graph is built rather than
//! while the data is read:
//!
//! ```rust,no_run
//! use wremnants::{hist::Axis, Bookings, Dataset, Graph, WremResult};
//!
//! fn build(_dataset: &Dataset, df: Graph, bookings: &mut Bookings) -> WremResult<()> {
//!     let df = df
//!         .filter("twoMuons", &["nMuon"], |n: &i64| *n == 2)?
//!         .define("absEta", &["Muon_eta"], |eta: &Vec<f64>| -> Vec<f64> {
//!             eta.iter().map(|e| e.abs()).collect()
//!         })?;
//!     bookings.histo("absEta", &df, vec![Axis::regular("absEta", 24, 0.0, 2.4)?], &["absEta"], None)
//! }
//! ```
//!
//! All datasets are built first and then executed as one batch with [`build_and_run`], in
//! parallel across datasets when the `rayon` feature is enabled. The results can be normalised to
//! the data luminosity ([`results::scale_to_data`]), merged into process groups
//! ([`results::aggregate_groups`]) and written with [`output::write_analysis_output`].
//!
//! The producers of the analyses live in [`histmakers`]; [`combine`] reads their output back,
//! registers systematic variations and writes the card and shape file of the fit.
//!
//! # Binaries
//! * `mz_lowpu` runs the low-pileup Z → ℓℓ W-like producer over the Parquet datasets found under
//!   `--data-path`.
//! * `setup_combine_wmass` writes the W-mass card from a producer's output.
//!
//! Both accept `--log-level` to set the verbosity of the `tracing` output.

pub mod data {
    pub use wremnants_core::data::{
        discover, expand_path, io, Dataset, DiscoveryOptions, SampleKind, SampleSpec,
    };
}

pub mod graph {
    pub use wremnants_core::graph::*;
}

pub mod hist {
    pub use wremnants_core::hist::*;
}

pub mod output {
    pub use wremnants_core::output::*;
}

pub mod results {
    pub use wremnants_core::results::*;
}

pub mod utils {
    pub use wremnants_core::utils::*;
}

pub mod histmakers {
    pub use wremnants_histmakers::*;
}

pub mod combine {
    pub use wremnants_combine::*;
}

pub use wremnants_core::{
    build_and_run, Bookings, Column, ColumnKind, Dataset, DatasetOutput, FourVector, Frame, Graph,
    Hist, ResultDict, SampleKind, WremError, WremResult,
};
pub use wremnants_histmakers::{Flavor, MzLowPu, MzLowPuConfig};
pub use wremnants_combine::{CardTool, Datagroups, Systematic};
