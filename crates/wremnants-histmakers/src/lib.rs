//! # wremnants-histmakers
//!
//! This is an internal crate used by `wremnants`. It holds the histogram producers of the
//! low-pileup analyses together with the pieces they are assembled from: the dataset catalogue,
//! lepton selections, efficiency corrections, the recoil stage, theory and experimental
//! systematics, and the generator-level selection used for unfolding.
#![warn(clippy::perf, clippy::style)]

/// Histogram axes shared by the producers.
pub mod axes;
/// Lepton efficiency scale factors and the prefiring weight.
pub mod corrections;
/// The low-pileup dataset catalogue.
pub mod datasets;
/// Transverse-plane kinematics.
pub mod kinematics;
/// The Z → ℓℓ W-like producer.
pub mod mz_lowpu;
/// Hadronic recoil corrections applied to the missing transverse momentum.
pub mod recoil;
/// Dilepton selections for each lepton flavor.
pub mod selection;
/// Theory and experimental systematic variations.
pub mod syst;
/// Generator-level definitions and fiducial selection.
pub mod unfolding;

pub use corrections::{BinnedScaleFactors, Corrections, NominalCorrections};
pub use datasets::{datasets_lowpu, LUMI_LOWPU};
pub use mz_lowpu::{MzLowPu, MzLowPuConfig};
pub use recoil::{LeptonRecoil, NoRecoil, QtReweighting, RecoilStage};
pub use selection::{Flavor, LeptonSelection};
pub use syst::PdfSet;
