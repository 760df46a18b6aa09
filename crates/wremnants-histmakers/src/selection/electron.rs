use std::sync::Arc;

use wremnants_core::{Graph, WremResult};

use super::{
    count, define_lepton_sf, define_trigger_and_prefire, masked, select_pair, Flavor,
    LeptonSelection, TriggerObjectCuts,
};
use crate::corrections::{Corrections, SfKind};

/// Number of cuts packed into `Electron_vidNestedWPBitmap`.
const VID_CUTS: u32 = 10;

/// Whether every cut of the cut-based identification passes at least `level` (0: fail, 1: veto,
/// 2: loose, 3: medium, 4: tight). Each cut occupies three bits of the bitmap.
pub fn pass_cutbased(bitmap: i64, level: i64) -> bool {
    (0..VID_CUTS).all(|cut| (bitmap >> (3 * cut)) & 0b111 >= level)
}

/// Two medium-identified electrons from the single-electron trigger, with a muon veto.
#[derive(Clone, Debug)]
pub struct DielectronSelection {
    trigger_mc: String,
    trigger_data: String,
    trigger_objects: TriggerObjectCuts,
}

impl DielectronSelection {
    pub fn new() -> Box<Self> {
        Self {
            trigger_mc: "HLT_Ele20_WPLoose_Gsf".to_string(),
            trigger_data: "HLT_HIEle20_WPLoose_Gsf".to_string(),
            trigger_objects: TriggerObjectCuts {
                id: 11,
                min_pt: 20.0,
                filter_bit: 1,
                max_delta_r: 0.3,
            },
        }
        .into()
    }
}

impl LeptonSelection for DielectronSelection {
    fn flavor(&self) -> Flavor {
        Flavor::Ee
    }

    fn select(
        &self,
        df: &Graph,
        is_data: bool,
        corrections: &Arc<dyn Corrections>,
    ) -> WremResult<Graph> {
        let corr = corrections.clone();
        let df = df.define(
            "Electron_pt_corr",
            &["Electron_pt", "Electron_eta"],
            move |pt: &Vec<f64>, eta: &Vec<f64>| -> Vec<f64> {
                pt.iter()
                    .zip(eta)
                    .map(|(pt, eta)| corr.electron_pt(is_data, *pt, *eta))
                    .collect()
            },
        )?;
        let trigger = if is_data {
            &self.trigger_data
        } else {
            &self.trigger_mc
        };
        let df = df.filter_column(trigger)?;
        let df = df.define(
            "vetoElectrons",
            &["Electron_pt_corr", "Electron_cutBased", "Electron_eta"],
            |pt: &Vec<f64>, cut_based: &Vec<i64>, eta: &Vec<f64>| -> Vec<bool> {
                pt.iter()
                    .zip(cut_based)
                    .zip(eta)
                    .map(|((pt, id), eta)| *pt > 10.0 && *id > 0 && eta.abs() < 2.4)
                    .collect()
            },
        )?;
        let df = df.filter("twoVetoElectrons", &["vetoElectrons"], |m: &Vec<bool>| {
            count(m) == 2
        })?;
        let df = df.define(
            "vetoMuons",
            &["Muon_pt", "Muon_looseId", "Muon_eta", "Muon_dxybs", "Muon_dz"],
            |pt: &Vec<f64>, loose: &Vec<bool>, eta: &Vec<f64>, dxy: &Vec<f64>, dz: &Vec<f64>| {
                pt.iter()
                    .zip(loose)
                    .zip(eta)
                    .zip(dxy)
                    .zip(dz)
                    .map(|((((pt, loose), eta), dxy), dz)| {
                        *pt > 10.0 && *loose && eta.abs() < 2.4 && dxy.abs() < 0.05 && dz.abs() < 0.2
                    })
                    .collect::<Vec<bool>>()
            },
        )?;
        let df = df.filter("noVetoMuons", &["vetoMuons"], |m: &Vec<bool>| count(m) == 0)?;
        let df = df.define(
            "Electron_MediumID",
            &["Electron_vidNestedWPBitmap"],
            |bitmap: &Vec<i64>| -> Vec<bool> { bitmap.iter().map(|b| pass_cutbased(*b, 3)).collect() },
        )?;
        let df = df.alias("goodLeptons", "Electron_MediumID")?;
        let df = select_pair(&df, "Electron", "Electron_pt_corr", self.trigger_objects)?;
        let corr = corrections.clone();
        let df = df.define(
            "Lep_pt_uncorr",
            &["Electron_pt", "Electron_eta", "Electron_ecalCorr", "goodLeptons"],
            move |pt: &Vec<f64>, eta: &Vec<f64>, ecal: &Vec<f64>, good: &Vec<bool>| -> Vec<f64> {
                pt.iter()
                    .zip(eta)
                    .zip(ecal)
                    .map(|((pt, eta), ecal)| corr.undo_electron_correction(*pt, *eta, *ecal))
                    .zip(good)
                    .filter(|(_, keep)| **keep)
                    .map(|(pt, _)| pt)
                    .collect()
            },
        )?;
        if is_data {
            return df.define_constant("SFMC", 1.0);
        }
        let df = define_lepton_sf(&df, "IDISO", SfKind::IdIso, corrections)?;
        let df = define_trigger_and_prefire(&df, corrections)?;
        df.define(
            "SFMC",
            &["lepSF_IDISO", "lepSF_HLT", "prefireCorr"],
            |idiso: &f64, hlt: &f64, prefire: &f64| idiso * hlt * prefire,
        )
    }
}

#[cfg(test)]
mod tests {
    use wremnants_core::{Column, Frame};

    use super::*;
    use crate::selection::tests::run_selection;

    const MEDIUM: i64 = 0o3333333333;

    fn electron_event(bitmaps: [i64; 2], charges: [i64; 2]) -> Frame {
        Frame::from_columns([
            ("event", Column::Int(vec![2])),
            ("HLT_Ele20_WPLoose_Gsf", Column::Bool(vec![true])),
            ("HLT_HIEle20_WPLoose_Gsf", Column::Bool(vec![false])),
            ("Electron_pt", Column::FloatVec(vec![vec![45.0, 30.0]])),
            ("Electron_eta", Column::FloatVec(vec![vec![0.2, 1.1]])),
            ("Electron_phi", Column::FloatVec(vec![vec![0.5, -2.0]])),
            ("Electron_mass", Column::FloatVec(vec![vec![0.0, 0.0]])),
            ("Electron_charge", Column::IntVec(vec![charges.to_vec()])),
            ("Electron_cutBased", Column::IntVec(vec![vec![3, 3]])),
            ("Electron_vidNestedWPBitmap", Column::IntVec(vec![bitmaps.to_vec()])),
            ("Electron_ecalCorr", Column::FloatVec(vec![vec![1.0, 0.5]])),
            ("Muon_pt", Column::FloatVec(vec![vec![5.0]])),
            ("Muon_eta", Column::FloatVec(vec![vec![0.0]])),
            ("Muon_looseId", Column::BoolVec(vec![vec![true]])),
            ("Muon_dxybs", Column::FloatVec(vec![vec![0.0]])),
            ("Muon_dz", Column::FloatVec(vec![vec![0.0]])),
            ("TrigObj_id", Column::IntVec(vec![vec![11, 13]])),
            ("TrigObj_pt", Column::FloatVec(vec![vec![44.0, 30.0]])),
            ("TrigObj_eta", Column::FloatVec(vec![vec![0.25, 1.1]])),
            ("TrigObj_phi", Column::FloatVec(vec![vec![0.45, -2.0]])),
            ("TrigObj_filterBits", Column::IntVec(vec![vec![0b10, 0b1000]])),
            ("Jet_pt", Column::FloatVec(vec![vec![]])),
            ("Jet_eta", Column::FloatVec(vec![vec![]])),
            ("Photon_pt", Column::FloatVec(vec![vec![]])),
            ("Photon_eta", Column::FloatVec(vec![vec![]])),
        ])
        .unwrap()
    }

    #[test]
    fn test_pass_cutbased() {
        assert!(pass_cutbased(MEDIUM, 3));
        assert!(!pass_cutbased(MEDIUM, 4));
        // one cut at loose
        assert!(!pass_cutbased(MEDIUM - 0o1000, 3));
        assert!(!pass_cutbased(0, 1));
    }

    #[test]
    fn test_dielectron_selection() {
        let frame = electron_event([MEDIUM, MEDIUM], [-1, 1]);
        let selected = run_selection(DielectronSelection::new().as_ref(), frame);
        assert_eq!(selected.n_rows(), 1);
        assert_eq!(selected.get::<Vec<f64>>("Lep_pt_uncorr").unwrap()[0], vec![45.0, 60.0]);
        // the muon trigger object at the second electron does not count
        assert_eq!(selected.get::<Vec<bool>>("trigMatch").unwrap()[0], vec![true, false]);

        let loose = electron_event([MEDIUM, 0o2222222222], [-1, 1]);
        assert_eq!(run_selection(DielectronSelection::new().as_ref(), loose).n_rows(), 0);
        let same_sign = electron_event([MEDIUM, MEDIUM], [1, 1]);
        assert_eq!(run_selection(DielectronSelection::new().as_ref(), same_sign).n_rows(), 0);
    }
}
