use std::sync::Arc;

use tracing::debug;
use wremnants_core::{hist::Axis, Bookings, Graph, WremResult};

use crate::{
    axes::{down_up_axis, tensor_axis},
    corrections::{Corrections, PrefireObjects, SfSource},
};

/// Z boson mass and width in GeV, as used in the generator.
pub const MZ_GEN: f64 = 91.1535;
pub const GAMMAZ_GEN: f64 = 2.4932;
/// W boson mass and width in GeV, as used in the generator.
pub const MW_GEN: f64 = 80.351812;
pub const GAMMAW_GEN: f64 = 2.090431;

/// Number of mass hypotheses: ±100 MeV in steps of 10 MeV.
pub const N_MASS_WEIGHTS: usize = 21;
/// Index of the unshifted hypothesis.
pub const MASS_WEIGHT_CENTRAL: usize = 10;
const MASS_STEP: f64 = 0.010;

/// Ratio of fixed-width Breit–Wigner line shapes at `mass` for a pole shifted by `offset`.
pub fn breit_wigner_weight(mass: f64, pole: f64, width: f64, offset: f64) -> f64 {
    let target = pole + offset;
    let s = mass * mass;
    let offshell = s - pole * pole;
    let offshell_target = s - target * target;
    (offshell * offshell + width * width * pole * pole)
        / (offshell_target * offshell_target + width * width * target * target)
}

/// Weights for every mass hypothesis. Events without a valid generator mass keep unit weights.
pub fn mass_weights(mass: f64, pole: f64, width: f64) -> Vec<f64> {
    (0..N_MASS_WEIGHTS)
        .map(|i| {
            if !mass.is_finite() || mass <= 0.0 {
                return 1.0;
            }
            let offset = (i as f64 - MASS_WEIGHT_CENTRAL as f64) * MASS_STEP;
            breit_wigner_weight(mass, pole, width, offset)
        })
        .collect()
}

/// Pole mass and width of the boson simulated in `process`, by the process naming convention.
pub fn boson_parameters(process: &str) -> (f64, f64) {
    if process.starts_with('W') {
        (MW_GEN, GAMMAW_GEN)
    } else {
        (MZ_GEN, GAMMAZ_GEN)
    }
}

/// Define `massWeight_tensor` from the generator boson mass `massVgen`.
pub fn define_mass_weights(df: &Graph, process: &str) -> WremResult<Graph> {
    let (pole, width) = boson_parameters(process);
    df.define(
        "massWeight_tensor",
        &["nominal_weight", "massVgen"],
        move |w: &f64, mass: &f64| -> Vec<f64> {
            mass_weights(*mass, pole, width)
                .into_iter()
                .map(|mw| w * mw)
                .collect()
        },
    )
}

/// Book `<base_name>_massWeight` over `axes`.
pub fn add_massweights_hist(
    df: &Graph,
    bookings: &mut Bookings,
    axes: &[Axis],
    cols: &[&str],
    base_name: &str,
) -> WremResult<()> {
    bookings.histo_tensor(
        &format!("{base_name}_massWeight"),
        df,
        axes.to_vec(),
        cols,
        "massWeight_tensor",
        vec![tensor_axis(N_MASS_WEIGHTS)?],
    )
}

/// A PDF set whose replicas are stored in `LHEPdfWeight`.
#[derive(Clone, Debug, PartialEq)]
pub struct PdfSet {
    pub name: String,
    /// Number of members, central one included.
    pub members: usize,
}

impl PdfSet {
    pub fn nnpdf31() -> Self {
        Self {
            name: "NNPDF31".to_string(),
            members: 103,
        }
    }
}

impl Default for PdfSet {
    fn default() -> Self {
        Self::nnpdf31()
    }
}

/// The μR × μF scale axes (0.5, 1, 2), without flow.
pub fn qcd_scale_axes() -> WremResult<Vec<Axis>> {
    let edges = [0.25, 0.75, 1.25, 2.75];
    Ok(vec![
        Axis::variable("muRfact", &edges)?.without_flow(),
        Axis::variable("muFfact", &edges)?.without_flow(),
    ])
}

/// The nine μR × μF weights (μR major) from `LHEScaleWeight`. Samples storing eight weights omit
/// the central one.
pub fn qcd_scale_weights(lhe: &[f64]) -> [f64; 9] {
    let mut weights = [1.0; 9];
    match lhe.len() {
        9 => weights.copy_from_slice(lhe),
        8 => {
            weights[..4].copy_from_slice(&lhe[..4]);
            weights[5..].copy_from_slice(&lhe[4..]);
        }
        _ => {}
    }
    weights
}

/// Define the QCD scale and PDF weight tensors of a vector-boson sample.
///
/// PDF weights are taken relative to the central member; missing members are unit.
pub fn define_theory_weights(df: &Graph, pdf: &PdfSet) -> WremResult<Graph> {
    let df = df.define(
        "qcdScale_tensor",
        &["nominal_weight", "LHEScaleWeight"],
        |w: &f64, lhe: &Vec<f64>| -> Vec<f64> {
            qcd_scale_weights(lhe).iter().map(|s| w * s).collect()
        },
    )?;
    let members = pdf.members;
    df.define(
        &format!("pdf{}_tensor", pdf.name),
        &["nominal_weight", "LHEPdfWeight"],
        move |w: &f64, lhe: &Vec<f64>| -> Vec<f64> {
            let central = lhe.first().copied().filter(|c| *c != 0.0).unwrap_or(1.0);
            (0..members)
                .map(|i| w * lhe.get(i).map(|p| p / central).unwrap_or(1.0))
                .collect()
        },
    )
}

/// Book `<base_name>_qcdScale` and `<base_name>_pdf<NAME>` over `axes`.
pub fn add_theory_hists(
    df: &Graph,
    bookings: &mut Bookings,
    axes: &[Axis],
    cols: &[&str],
    base_name: &str,
    pdf: &PdfSet,
) -> WremResult<()> {
    bookings.histo_tensor(
        &format!("{base_name}_qcdScale"),
        df,
        axes.to_vec(),
        cols,
        "qcdScale_tensor",
        qcd_scale_axes()?,
    )?;
    bookings.histo_tensor(
        &format!("{base_name}_pdf{}", pdf.name),
        df,
        axes.to_vec(),
        cols,
        &format!("pdf{}_tensor", pdf.name),
        vec![tensor_axis(pdf.members)?],
    )
}

/// Book one `nominal_<source>` tensor histogram per lepton scale-factor source.
pub fn add_lepsf_hists(
    df: &Graph,
    bookings: &mut Bookings,
    corrections: &Arc<dyn Corrections>,
    axes: &[Axis],
    cols: &[&str],
) -> WremResult<Graph> {
    let mut df = df.clone();
    for source in SfSource::ALL {
        let column = format!("{}_tensor", source.name());
        let corrections = corrections.clone();
        df = df.define(
            &column,
            &["nominal_weight", "Lep_pt", "Lep_eta", "Lep_charge"],
            move |w: &f64, pt: &Vec<f64>, eta: &Vec<f64>, q: &Vec<i64>| -> Vec<f64> {
                corrections
                    .sf_variations(source, pt, eta, q)
                    .into_iter()
                    .map(|v| w * v)
                    .collect()
            },
        )?;
        bookings.histo_tensor(
            &format!("nominal_{}", source.name()),
            &df,
            axes.to_vec(),
            cols,
            &column,
            vec![tensor_axis(source.size())?],
        )?;
        debug!(source = source.name(), size = source.size(), "booked scale-factor variations");
    }
    Ok(df)
}

/// Book `nominal_prefireCorr`, the prefiring weight varied down and up relative to its nominal.
pub fn add_prefire_hist(
    df: &Graph,
    bookings: &mut Bookings,
    corrections: &Arc<dyn Corrections>,
    axes: &[Axis],
    cols: &[&str],
) -> WremResult<Graph> {
    let corrections = corrections.clone();
    let df = df.define(
        "prefireCorr_syst",
        &["Jet_pt", "Jet_eta", "Photon_pt", "Photon_eta", "Lep_pt", "Lep_eta"],
        move |jet_pt: &Vec<f64>,
              jet_eta: &Vec<f64>,
              photon_pt: &Vec<f64>,
              photon_eta: &Vec<f64>,
              lepton_pt: &Vec<f64>,
              lepton_eta: &Vec<f64>|
              -> Vec<f64> {
            let weight = corrections.prefire(&PrefireObjects {
                jet_pt,
                jet_eta,
                photon_pt,
                photon_eta,
                lepton_pt,
                lepton_eta,
            });
            if weight.nominal > 0.0 {
                vec![weight.down / weight.nominal, weight.up / weight.nominal]
            } else {
                vec![1.0, 1.0]
            }
        },
    )?;
    let df = df.define(
        "prefireCorr_syst_tensor",
        &["nominal_weight", "prefireCorr_syst"],
        |w: &f64, syst: &Vec<f64>| -> Vec<f64> { syst.iter().map(|s| w * s).collect() },
    )?;
    bookings.histo_tensor(
        "nominal_prefireCorr",
        &df,
        axes.to_vec(),
        cols,
        "prefireCorr_syst_tensor",
        vec![down_up_axis()?],
    )?;
    Ok(df)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_breit_wigner_weight() {
        assert_relative_eq!(breit_wigner_weight(91.0, MZ_GEN, GAMMAZ_GEN, 0.0), 1.0);
        // a heavier pole favours events above the current one
        assert!(breit_wigner_weight(93.0, MZ_GEN, GAMMAZ_GEN, 0.1) > 1.0);
        assert!(breit_wigner_weight(89.0, MZ_GEN, GAMMAZ_GEN, 0.1) < 1.0);
    }

    #[test]
    fn test_mass_weights() {
        let weights = mass_weights(92.0, MZ_GEN, GAMMAZ_GEN);
        assert_eq!(weights.len(), N_MASS_WEIGHTS);
        assert_relative_eq!(weights[MASS_WEIGHT_CENTRAL], 1.0);
        assert!(weights.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(mass_weights(f64::NAN, MZ_GEN, GAMMAZ_GEN), vec![1.0; N_MASS_WEIGHTS]);
        assert_eq!(boson_parameters("Wplusmunu"), (MW_GEN, GAMMAW_GEN));
        assert_eq!(boson_parameters("Zmumu"), (MZ_GEN, GAMMAZ_GEN));
    }

    #[test]
    fn test_qcd_scale_weights() {
        let nine: Vec<f64> = (0..9).map(|i| i as f64).collect();
        assert_eq!(qcd_scale_weights(&nine)[4], 4.0);
        let eight = [0.5, 0.6, 0.7, 0.8, 1.2, 1.3, 1.4, 1.5];
        let weights = qcd_scale_weights(&eight);
        assert_eq!(weights[4], 1.0);
        assert_eq!(weights[3], 0.8);
        assert_eq!(weights[5], 1.2);
        assert_eq!(qcd_scale_weights(&[]), [1.0; 9]);
        let axes = qcd_scale_axes().unwrap();
        assert_eq!(axes[0].index(0.5), Some(0));
        assert_eq!(axes[1].index(2.0), Some(2));
    }
}
