use std::fmt::Debug;

use dyn_clone::DynClone;
use tracing::debug;
use wremnants_core::{hist::Axis, Bookings, Dataset, FourVector, Graph, WremError, WremResult};

use crate::{
    axes::axis_mt,
    kinematics::{mt_wlike, polar, transverse},
};

/// Corrects the missing transverse momentum of an event.
///
/// Every stage defines `MET_corr_rec_pt`, `MET_corr_rec_phi` and `nominal_weight_qTrw` from the
/// `MET_*`, `Lep_*`, `ll_mom4` and `nominal_weight` columns.
pub trait RecoilStage: DynClone + Send + Sync + Debug {
    fn apply(&self, df: &Graph, dataset: &Dataset) -> WremResult<Graph>;

    /// Book the uncertainty histograms of this stage. `df` must hold the W-like lepton columns.
    fn add_uncertainties(
        &self,
        _df: &Graph,
        _bookings: &mut Bookings,
        _dataset: &Dataset,
    ) -> WremResult<()> {
        Ok(())
    }
}

dyn_clone::clone_trait_object!(RecoilStage);

/// Use the reconstructed MET as is.
#[derive(Clone, Debug, Default)]
pub struct NoRecoil;

impl NoRecoil {
    pub fn new() -> Box<Self> {
        Self.into()
    }
}

impl RecoilStage for NoRecoil {
    fn apply(&self, df: &Graph, _dataset: &Dataset) -> WremResult<Graph> {
        df.alias("MET_corr_rec_pt", "MET_pt")?
            .alias("MET_corr_rec_phi", "MET_phi")?
            .alias("nominal_weight_qTrw", "nominal_weight")
    }
}

/// A weight per bin of dilepton transverse momentum.
#[derive(Clone, Debug, PartialEq)]
pub struct QtReweighting {
    edges: Vec<f64>,
    weights: Vec<f64>,
}

impl QtReweighting {
    pub fn new(edges: &[f64], weights: &[f64]) -> WremResult<Self> {
        if edges.len() != weights.len() + 1 {
            return Err(WremError::LengthMismatch {
                context: "qT reweighting bins".to_string(),
                expected: edges.len().saturating_sub(1),
                actual: weights.len(),
            });
        }
        // validates the edges
        Axis::variable("qT", edges)?;
        Ok(Self {
            edges: edges.to_vec(),
            weights: weights.to_vec(),
        })
    }

    /// The weight of the bin holding `qt`; unit outside the binned range.
    pub fn weight(&self, qt: f64) -> f64 {
        self.edges
            .windows(2)
            .position(|w| qt >= w[0] && qt < w[1])
            .map(|i| self.weights[i])
            .unwrap_or(1.0)
    }
}

/// Propagates the lepton momentum calibration to the MET, then scales the hadronic recoil of
/// simulated boson events by a response factor.
///
/// The hadronic recoil is `U = -(MET + ptll)`. Its scale uncertainty is booked as
/// `transverseMass_recoilScaleDown/Up`, with the recoil scaled by `1 ∓ scale_unc`.
#[derive(Clone, Debug)]
pub struct LeptonRecoil {
    processes: Vec<String>,
    response: f64,
    scale_unc: f64,
    qt_reweighting: Option<QtReweighting>,
}

impl LeptonRecoil {
    /// Correct the recoil of the simulated `processes`.
    pub fn new<S: AsRef<str>>(processes: &[S]) -> Box<Self> {
        Self {
            processes: processes.iter().map(|p| p.as_ref().to_string()).collect(),
            response: 1.0,
            scale_unc: 0.01,
            qt_reweighting: None,
        }
        .into()
    }

    pub fn with_response(mut self: Box<Self>, response: f64) -> Box<Self> {
        self.response = response;
        self
    }

    pub fn with_qt_reweighting(mut self: Box<Self>, qt_reweighting: QtReweighting) -> Box<Self> {
        self.qt_reweighting = Some(qt_reweighting);
        self
    }

    fn corrects(&self, dataset: &Dataset) -> bool {
        !dataset.is_data() && self.processes.iter().any(|p| *p == dataset.name)
    }
}

/// MET after scaling the hadronic recoil against `ll` by `factor`.
fn scale_recoil(met: &FourVector, ll: &FourVector, factor: f64) -> (f64, f64) {
    let ux = -(met.px() + ll.px());
    let uy = -(met.py() + ll.py());
    polar(-(factor * ux + ll.px()), -(factor * uy + ll.py()))
}

impl RecoilStage for LeptonRecoil {
    fn apply(&self, df: &Graph, dataset: &Dataset) -> WremResult<Graph> {
        let df = df.define(
            "MET_corr_lep",
            &["MET_pt", "MET_phi", "Lep_pt", "Lep_pt_uncorr", "Lep_phi"],
            |met: &f64, met_phi: &f64, pt: &Vec<f64>, uncorr: &Vec<f64>, phi: &Vec<f64>| {
                let mut x = met * met_phi.cos();
                let mut y = met * met_phi.sin();
                for ((pt, uncorr), phi) in pt.iter().zip(uncorr).zip(phi) {
                    x -= (pt - uncorr) * phi.cos();
                    y -= (pt - uncorr) * phi.sin();
                }
                let (pt, phi) = polar(x, y);
                transverse(pt, phi)
            },
        )?;
        let df = if self.corrects(dataset) {
            debug!(dataset = %dataset.name, response = self.response, "correcting recoil");
            let response = self.response;
            df.define(
                "MET_corr_rec",
                &["MET_corr_lep", "ll_mom4"],
                move |met: &FourVector, ll: &FourVector| {
                    let (pt, phi) = scale_recoil(met, ll, response);
                    transverse(pt, phi)
                },
            )?
        } else {
            df.alias("MET_corr_rec", "MET_corr_lep")?
        };
        let df = df
            .define("MET_corr_rec_pt", &["MET_corr_rec"], |met: &FourVector| met.pt)?
            .define("MET_corr_rec_phi", &["MET_corr_rec"], |met: &FourVector| met.phi)?;
        match (&self.qt_reweighting, dataset.is_data()) {
            (Some(qt), false) => {
                let qt = qt.clone();
                df.define(
                    "nominal_weight_qTrw",
                    &["nominal_weight", "ptll"],
                    move |w: &f64, ptll: &f64| w * qt.weight(*ptll),
                )
            }
            _ => df.alias("nominal_weight_qTrw", "nominal_weight"),
        }
    }

    fn add_uncertainties(
        &self,
        df: &Graph,
        bookings: &mut Bookings,
        dataset: &Dataset,
    ) -> WremResult<()> {
        if !self.corrects(dataset) {
            return Ok(());
        }
        for (label, factor) in [("Down", 1.0 - self.scale_unc), ("Up", 1.0 + self.scale_unc)] {
            let column = format!("transverseMass_recoilScale{label}");
            let df = df.define(
                &column,
                &[
                    "TrigMuon_pt",
                    "TrigMuon_phi",
                    "NonTrigMuon_pt",
                    "NonTrigMuon_phi",
                    "MET_corr_rec",
                    "ll_mom4",
                ],
                move |pt: &f64,
                      phi: &f64,
                      nt_pt: &f64,
                      nt_phi: &f64,
                      met: &FourVector,
                      ll: &FourVector| {
                    let (met_pt, met_phi) = scale_recoil(met, ll, factor);
                    mt_wlike(*pt, *phi, *nt_pt, *nt_phi, met_pt, met_phi)
                },
            )?;
            bookings.histo(
                &column,
                &df,
                vec![axis_mt()?],
                &[column.as_str()],
                Some("nominal_weight"),
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use approx::assert_relative_eq;
    use wremnants_core::{graph::FrameSource, Column, Frame, SampleKind};

    use super::*;

    fn frame() -> Frame {
        Frame::from_columns([
            ("MET_pt", Column::Float(vec![10.0])),
            ("MET_phi", Column::Float(vec![0.0])),
            ("Lep_pt", Column::FloatVec(vec![vec![42.0, 30.0]])),
            ("Lep_pt_uncorr", Column::FloatVec(vec![vec![40.0, 30.0]])),
            ("Lep_phi", Column::FloatVec(vec![vec![PI, 0.5]])),
            (
                "ll_mom4",
                Column::FourVector(vec![FourVector::new(20.0, 0.0, PI, 91.0)]),
            ),
            ("ptll", Column::Float(vec![20.0])),
            ("nominal_weight", Column::Float(vec![2.0])),
        ])
        .unwrap()
    }

    fn graph() -> Graph {
        Graph::from_source(FrameSource::new("test", frame())).unwrap()
    }

    #[test]
    fn test_no_recoil_aliases() {
        let dataset = Dataset::new("Zmumu", SampleKind::Simulation);
        let out = NoRecoil::new().apply(&graph(), &dataset).unwrap().collect().unwrap();
        assert_eq!(out.get::<f64>("MET_corr_rec_pt").unwrap(), &[10.0]);
        assert_eq!(out.get::<f64>("nominal_weight_qTrw").unwrap(), &[2.0]);
    }

    #[test]
    fn test_lepton_recoil_propagates_correction() {
        let dataset = Dataset::new("data", SampleKind::Data);
        let out = LeptonRecoil::new(&["Zmumu"])
            .apply(&graph(), &dataset)
            .unwrap()
            .collect()
            .unwrap();
        // the leading lepton gained 2 GeV along -x, so MET gains 2 GeV along +x
        let met_pt = out.get::<f64>("MET_corr_rec_pt").unwrap()[0];
        let met_phi = out.get::<f64>("MET_corr_rec_phi").unwrap()[0];
        assert_relative_eq!(met_pt, 12.0, epsilon = 1e-9);
        assert_relative_eq!(met_phi, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_recoil_response_and_qt_weights() {
        let dataset = Dataset::new("Zmumu", SampleKind::Simulation);
        let qt = QtReweighting::new(&[0.0, 10.0, 30.0], &[0.5, 1.5]).unwrap();
        let stage = LeptonRecoil::new(&["Zmumu"])
            .with_response(2.0)
            .with_qt_reweighting(qt);
        let out = stage.apply(&graph(), &dataset).unwrap().collect().unwrap();
        // U = -(12 - 20) = 8 along +x, doubled: MET = -(16 - 20) = 4
        let met_pt = out.get::<f64>("MET_corr_rec_pt").unwrap()[0];
        assert_relative_eq!(met_pt, 4.0, epsilon = 1e-9);
        assert_relative_eq!(out.get::<f64>("nominal_weight_qTrw").unwrap()[0], 3.0);
    }

    #[test]
    fn test_qt_reweighting_validation() {
        assert!(QtReweighting::new(&[0.0, 10.0], &[1.0, 2.0]).is_err());
        assert!(QtReweighting::new(&[10.0, 0.0], &[1.0]).is_err());
        let qt = QtReweighting::new(&[0.0, 10.0], &[2.0]).unwrap();
        assert_eq!(qt.weight(5.0), 2.0);
        assert_eq!(qt.weight(50.0), 1.0);
    }
}
