//! # wremnants-combine
//!
//! This is an internal crate used by `wremnants`. It turns the histograms written by the
//! producers into the inputs of a binned likelihood fit: datasets are merged into the processes
//! of the fit, systematic variations are registered and validated against the histograms, and a
//! text card is written together with a binary file holding every referenced histogram.
#![warn(clippy::perf, clippy::style)]

/// The [`CardTool`](crate::card_tool::CardTool) and its shape file.
pub mod card_tool;
/// Process groups over a histogram producer's output.
pub mod datagroups;
/// Naming helpers for systematic variations.
pub mod names;
/// Shape and log-normal systematic entries.
pub mod systematic;
/// The systematics of the W-mass fit.
pub mod wmass;

pub use card_tool::{CardTool, ShapeFile};
pub use datagroups::{Datagroups, Group, GroupKind};
pub use systematic::{LnNSystematic, Systematic};
pub use wmass::{add_wmass_systematics, WMassCardOptions};
