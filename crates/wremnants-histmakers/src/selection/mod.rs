use std::{fmt::Debug, fmt::Display, str::FromStr, sync::Arc};

use dyn_clone::DynClone;
use wremnants_core::{utils::vectors::delta_r, Graph, WremError, WremResult};

use crate::corrections::{event_sf, event_trigger_sf, Corrections, PrefireObjects, SfKind};

pub mod electron;
pub mod muon;

pub use electron::DielectronSelection;
pub use muon::DimuonSelection;

/// The lepton flavor of the dilepton final state.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Flavor {
    Mumu,
    Ee,
}

impl Flavor {
    /// The signal process of this final state.
    pub fn signal(&self) -> &'static str {
        match self {
            Flavor::Mumu => "Zmumu",
            Flavor::Ee => "Zee",
        }
    }

    /// The selection strategy for this flavor with its default triggers.
    pub fn selection(&self, pt_min: f64) -> Box<dyn LeptonSelection> {
        match self {
            Flavor::Mumu => DimuonSelection::new(pt_min),
            Flavor::Ee => DielectronSelection::new(),
        }
    }
}

impl Display for Flavor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Flavor::Mumu => write!(f, "mumu"),
            Flavor::Ee => write!(f, "ee"),
        }
    }
}

impl FromStr for Flavor {
    type Err = WremError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mumu" => Ok(Self::Mumu),
            "ee" => Ok(Self::Ee),
            _ => Err(WremError::ParseError {
                name: s.to_string(),
                object: "Flavor".to_string(),
            }),
        }
    }
}

/// Selects exactly two opposite-charge, trigger-matched leptons of one flavor.
///
/// Every implementation defines the same columns on the returned node, so that everything
/// downstream is flavor agnostic:
///
/// * `Lep_pt`, `Lep_pt_uncorr`, `Lep_eta`, `Lep_phi`, `Lep_mass` (`Vec<f64>` of length two)
/// * `Lep_charge` (`Vec<i64>`)
/// * `trigMatch`, `nonTrigMatch` (`Vec<bool>`)
/// * `SFMC`, the product of the lepton scale factors and the prefiring weight (unit in data)
pub trait LeptonSelection: DynClone + Send + Sync + Debug {
    fn flavor(&self) -> Flavor;

    fn select(
        &self,
        df: &Graph,
        is_data: bool,
        corrections: &Arc<dyn Corrections>,
    ) -> WremResult<Graph>;
}

dyn_clone::clone_trait_object!(LeptonSelection);

/// Requirements on the trigger objects a lepton can be matched to.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TriggerObjectCuts {
    /// Absolute PDG id of the object.
    pub id: i64,
    pub min_pt: f64,
    /// Bit of `TrigObj_filterBits` which must be set.
    pub filter_bit: u32,
    /// Maximum ΔR between lepton and object.
    pub max_delta_r: f64,
}

/// Elements of `values` whose `mask` entry is set.
pub fn masked<T: Clone>(values: &[T], mask: &[bool]) -> Vec<T> {
    values
        .iter()
        .zip(mask)
        .filter(|(_, keep)| **keep)
        .map(|(v, _)| v.clone())
        .collect()
}

/// The number of set entries of `mask`.
pub fn count(mask: &[bool]) -> usize {
    mask.iter().filter(|m| **m).count()
}

/// For each lepton, whether any of the candidate objects lies within `max_delta_r`.
pub fn trigger_match(
    eta: &[f64],
    phi: &[f64],
    obj_eta: &[f64],
    obj_phi: &[f64],
    max_delta_r: f64,
) -> Vec<bool> {
    eta.iter()
        .zip(phi)
        .map(|(eta, phi)| {
            obj_eta
                .iter()
                .zip(obj_phi)
                .any(|(oeta, ophi)| delta_r(*eta, *phi, *oeta, *ophi) < max_delta_r)
        })
        .collect()
}

/// Select the two good leptons of collection `prefix` (whose momenta are in `pt_column`), require
/// opposite charge and a trigger match, and define the common `Lep_*` columns.
pub(crate) fn select_pair(
    df: &Graph,
    prefix: &str,
    pt_column: &str,
    trigger_objects: TriggerObjectCuts,
) -> WremResult<Graph> {
    let charge = format!("{prefix}_charge");
    let eta = format!("{prefix}_eta");
    let phi = format!("{prefix}_phi");
    let mass = format!("{prefix}_mass");
    let df = df.filter("twoGoodLeptons", &["goodLeptons"], |good: &Vec<bool>| {
        count(good) == 2
    })?;
    let df = df.filter(
        "oppositeCharge",
        &[charge.as_str(), "goodLeptons"],
        |q: &Vec<i64>, good: &Vec<bool>| {
            let q = masked(q, good);
            q.len() == 2 && q[0] + q[1] == 0
        },
    )?;
    let cuts = trigger_objects;
    let df = df.define(
        "goodTrigObjs",
        &["TrigObj_id", "TrigObj_pt", "TrigObj_filterBits"],
        move |id: &Vec<i64>, pt: &Vec<f64>, bits: &Vec<i64>| -> Vec<bool> {
            id.iter()
                .zip(pt)
                .zip(bits)
                .map(|((id, pt), bits)| {
                    id.abs() == cuts.id && *pt >= cuts.min_pt && (bits >> cuts.filter_bit) & 1 == 1
                })
                .collect()
        },
    )?;
    let df = df.define(
        "trigMatch",
        &["goodLeptons", eta.as_str(), phi.as_str(), "goodTrigObjs", "TrigObj_eta", "TrigObj_phi"],
        move |good: &Vec<bool>,
              eta: &Vec<f64>,
              phi: &Vec<f64>,
              good_obj: &Vec<bool>,
              obj_eta: &Vec<f64>,
              obj_phi: &Vec<f64>| {
            trigger_match(
                &masked(eta, good),
                &masked(phi, good),
                &masked(obj_eta, good_obj),
                &masked(obj_phi, good_obj),
                cuts.max_delta_r,
            )
        },
    )?;
    let df = df.define("nonTrigMatch", &["trigMatch"], |m: &Vec<bool>| -> Vec<bool> {
        m.iter().map(|m| !m).collect()
    })?;
    let df = df.filter("triggerMatched", &["trigMatch"], |m: &Vec<bool>| count(m) > 0)?;
    let df = df.define("Lep_pt", &[pt_column, "goodLeptons"], |v: &Vec<f64>, m: &Vec<bool>| {
        masked(v, m)
    })?;
    let df = df.define("Lep_eta", &[eta.as_str(), "goodLeptons"], |v: &Vec<f64>, m: &Vec<bool>| {
        masked(v, m)
    })?;
    let df = df.define("Lep_phi", &[phi.as_str(), "goodLeptons"], |v: &Vec<f64>, m: &Vec<bool>| {
        masked(v, m)
    })?;
    let df = df.define("Lep_charge", &[charge.as_str(), "goodLeptons"], |v: &Vec<i64>, m: &Vec<bool>| {
        masked(v, m)
    })?;
    df.define("Lep_mass", &[mass.as_str(), "goodLeptons"], |v: &Vec<f64>, m: &Vec<bool>| {
        masked(v, m)
    })
}

/// Define `lepSF_<name>` as the event scale factor of `kind`.
pub(crate) fn define_lepton_sf(
    df: &Graph,
    name: &str,
    kind: SfKind,
    corrections: &Arc<dyn Corrections>,
) -> WremResult<Graph> {
    let corrections = corrections.clone();
    df.define(
        &format!("lepSF_{name}"),
        &["Lep_pt", "Lep_eta", "Lep_charge"],
        move |pt: &Vec<f64>, eta: &Vec<f64>, q: &Vec<i64>| {
            event_sf(corrections.as_ref(), kind, pt, eta, q)
        },
    )
}

/// Define `lepSF_HLT` and `prefireCorr` from the selected leptons.
pub(crate) fn define_trigger_and_prefire(
    df: &Graph,
    corrections: &Arc<dyn Corrections>,
) -> WremResult<Graph> {
    let trigger = corrections.clone();
    let df = df.define(
        "lepSF_HLT",
        &["Lep_pt", "Lep_eta", "Lep_charge"],
        move |pt: &Vec<f64>, eta: &Vec<f64>, q: &Vec<i64>| {
            event_trigger_sf(trigger.as_ref(), pt, eta, q)
        },
    )?;
    let prefire = corrections.clone();
    df.define(
        "prefireCorr",
        &["Jet_pt", "Jet_eta", "Photon_pt", "Photon_eta", "Lep_pt", "Lep_eta"],
        move |jet_pt: &Vec<f64>,
              jet_eta: &Vec<f64>,
              photon_pt: &Vec<f64>,
              photon_eta: &Vec<f64>,
              lepton_pt: &Vec<f64>,
              lepton_eta: &Vec<f64>| {
            prefire
                .prefire(&PrefireObjects {
                    jet_pt,
                    jet_eta,
                    photon_pt,
                    photon_eta,
                    lepton_pt,
                    lepton_eta,
                })
                .nominal
        },
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use wremnants_core::{graph::FrameSource, Column, Frame};

    use super::*;

    #[test]
    fn test_masked_and_count() {
        let mask = [true, false, true];
        assert_eq!(masked(&[1.0, 2.0, 3.0], &mask), vec![1.0, 3.0]);
        assert_eq!(count(&mask), 2);
        assert_eq!(count(&[]), 0);
    }

    #[test]
    fn test_trigger_match() {
        let matched = trigger_match(&[0.0, 1.0], &[0.0, 3.0], &[0.1, 1.0], &[0.1, -3.0], 0.3);
        assert_eq!(matched, vec![true, false]);
        let matched = trigger_match(&[0.0, 1.0], &[0.0, 3.1], &[], &[], 0.3);
        assert_eq!(matched, vec![false, false]);
    }

    #[test]
    fn test_flavor_from_str() {
        assert_eq!("mumu".parse::<Flavor>().unwrap(), Flavor::Mumu);
        assert_eq!("EE".parse::<Flavor>().unwrap(), Flavor::Ee);
        assert!("emu".parse::<Flavor>().is_err());
        assert_eq!(Flavor::Ee.to_string(), "ee");
        assert_eq!(Flavor::Mumu.signal(), "Zmumu");
    }

    /// One event with the given muons (pt, eta, phi, charge), all passing identification.
    pub(crate) fn muon_event(muons: &[(f64, f64, f64, i64)], trigger_phi: f64) -> Frame {
        let n = muons.len();
        let fv = |f: &dyn Fn(&(f64, f64, f64, i64)) -> f64| -> Column {
            Column::FloatVec(vec![muons.iter().map(f).collect()])
        };
        Frame::from_columns([
            ("event", Column::Int(vec![1])),
            ("genWeight", Column::Float(vec![1.0])),
            ("HLT_Mu17", Column::Bool(vec![true])),
            ("HLT_HIMu17", Column::Bool(vec![true])),
            ("Muon_pt", fv(&|m| m.0)),
            ("Muon_eta", fv(&|m| m.1)),
            ("Muon_phi", fv(&|m| m.2)),
            ("Muon_mass", fv(&|_| 0.105658)),
            ("Muon_charge", Column::IntVec(vec![muons.iter().map(|m| m.3).collect()])),
            ("Muon_looseId", Column::BoolVec(vec![vec![true; n]])),
            ("Muon_mediumId", Column::BoolVec(vec![vec![true; n]])),
            ("Muon_dxybs", fv(&|_| 0.001)),
            ("Muon_dz", fv(&|_| 0.01)),
            ("Muon_pfRelIso04_all", fv(&|_| 0.02)),
            ("Electron_pt", Column::FloatVec(vec![vec![]])),
            ("Electron_eta", Column::FloatVec(vec![vec![]])),
            ("Electron_cutBased", Column::IntVec(vec![vec![]])),
            ("TrigObj_id", Column::IntVec(vec![vec![13]])),
            ("TrigObj_pt", Column::FloatVec(vec![vec![30.0]])),
            ("TrigObj_eta", Column::FloatVec(vec![vec![muons[0].1]])),
            ("TrigObj_phi", Column::FloatVec(vec![vec![trigger_phi]])),
            ("TrigObj_filterBits", Column::IntVec(vec![vec![0b1000]])),
            ("Jet_pt", Column::FloatVec(vec![vec![]])),
            ("Jet_eta", Column::FloatVec(vec![vec![]])),
            ("Photon_pt", Column::FloatVec(vec![vec![]])),
            ("Photon_eta", Column::FloatVec(vec![vec![]])),
        ])
        .unwrap()
    }

    pub(crate) fn run_selection(selection: &dyn LeptonSelection, frame: Frame) -> Frame {
        let df = Graph::from_source(FrameSource::new("test", frame)).unwrap();
        let corrections: Arc<dyn Corrections> = Arc::new(crate::corrections::NominalCorrections);
        selection.select(&df, false, &corrections).unwrap().collect().unwrap()
    }
}
