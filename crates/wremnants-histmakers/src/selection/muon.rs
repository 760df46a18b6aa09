use std::sync::Arc;

use wremnants_core::{Graph, WremResult};

use super::{
    count, define_lepton_sf, define_trigger_and_prefire, masked, select_pair, Flavor,
    LeptonSelection, TriggerObjectCuts,
};
use crate::corrections::{Corrections, SfKind};

/// Two medium, isolated muons from the single-muon trigger, with an electron veto.
#[derive(Clone, Debug)]
pub struct DimuonSelection {
    pt_min: f64,
    trigger_mc: String,
    trigger_data: String,
    trigger_objects: TriggerObjectCuts,
}

impl DimuonSelection {
    /// Select muons above `pt_min` using the low-pileup `Mu17` triggers.
    pub fn new(pt_min: f64) -> Box<Self> {
        Self {
            pt_min,
            trigger_mc: "HLT_Mu17".to_string(),
            trigger_data: "HLT_HIMu17".to_string(),
            trigger_objects: TriggerObjectCuts {
                id: 13,
                min_pt: 17.0,
                filter_bit: 3,
                max_delta_r: 0.3,
            },
        }
        .into()
    }
}

impl LeptonSelection for DimuonSelection {
    fn flavor(&self) -> Flavor {
        Flavor::Mumu
    }

    fn select(
        &self,
        df: &Graph,
        is_data: bool,
        corrections: &Arc<dyn Corrections>,
    ) -> WremResult<Graph> {
        let corr = corrections.clone();
        let df = df.define(
            "Muon_pt_corr",
            &["Muon_pt", "Muon_eta", "Muon_phi", "Muon_charge"],
            move |pt: &Vec<f64>, eta: &Vec<f64>, phi: &Vec<f64>, q: &Vec<i64>| -> Vec<f64> {
                pt.iter()
                    .zip(eta)
                    .zip(phi)
                    .zip(q)
                    .map(|(((pt, eta), phi), q)| corr.muon_pt(is_data, *pt, *eta, *phi, *q))
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
            "vetoMuons",
            &["Muon_pt_corr", "Muon_looseId", "Muon_eta", "Muon_dxybs"],
            |pt: &Vec<f64>, loose: &Vec<bool>, eta: &Vec<f64>, dxy: &Vec<f64>| -> Vec<bool> {
                pt.iter()
                    .zip(loose)
                    .zip(eta)
                    .zip(dxy)
                    .map(|(((pt, loose), eta), dxy)| {
                        *pt > 10.0 && *loose && eta.abs() < 2.4 && dxy.abs() < 0.05
                    })
                    .collect()
            },
        )?;
        let df = df.filter("twoVetoMuons", &["vetoMuons"], |m: &Vec<bool>| count(m) == 2)?;
        let df = df.define(
            "vetoElectrons",
            &["Electron_pt", "Electron_cutBased", "Electron_eta"],
            |pt: &Vec<f64>, cut_based: &Vec<i64>, eta: &Vec<f64>| -> Vec<bool> {
                pt.iter()
                    .zip(cut_based)
                    .zip(eta)
                    .map(|((pt, id), eta)| *pt > 10.0 && *id > 0 && eta.abs() < 2.4)
                    .collect()
            },
        )?;
        let df = df.filter("noVetoElectrons", &["vetoElectrons"], |m: &Vec<bool>| {
            count(m) == 0
        })?;
        let pt_min = self.pt_min;
        let df = df.define(
            "goodLeptons",
            &["vetoMuons", "Muon_pt_corr", "Muon_mediumId", "Muon_pfRelIso04_all"],
            move |veto: &Vec<bool>,
                  pt: &Vec<f64>,
                  medium: &Vec<bool>,
                  iso: &Vec<f64>|
                  -> Vec<bool> {
                veto.iter()
                    .zip(pt)
                    .zip(medium)
                    .zip(iso)
                    .map(|(((veto, pt), medium), iso)| {
                        *veto && *pt > pt_min && *medium && *iso < 0.15
                    })
                    .collect()
            },
        )?;
        let df = select_pair(&df, "Muon", "Muon_pt_corr", self.trigger_objects)?;
        let df = df.define(
            "Lep_pt_uncorr",
            &["Muon_pt", "goodLeptons"],
            |v: &Vec<f64>, m: &Vec<bool>| masked(v, m),
        )?;
        if is_data {
            return df.define_constant("SFMC", 1.0);
        }
        let df = define_lepton_sf(&df, "ISO", SfKind::Iso, corrections)?;
        let df = define_lepton_sf(&df, "IDIP", SfKind::IdIp, corrections)?;
        let df = define_trigger_and_prefire(&df, corrections)?;
        df.define(
            "SFMC",
            &["lepSF_IDIP", "lepSF_ISO", "lepSF_HLT", "prefireCorr"],
            |idip: &f64, iso: &f64, hlt: &f64, prefire: &f64| idip * iso * hlt * prefire,
        )
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::selection::tests::{muon_event, run_selection};

    #[test]
    fn test_dimuon_pair_selected() {
        let frame = muon_event(&[(40.0, 0.5, 0.1, 1), (35.0, -0.3, 2.9, -1)], 0.1);
        let selected = run_selection(DimuonSelection::new(26.0).as_ref(), frame);
        assert_eq!(selected.n_rows(), 1);
        assert_eq!(selected.get::<Vec<f64>>("Lep_pt").unwrap()[0], vec![40.0, 35.0]);
        assert_eq!(selected.get::<Vec<i64>>("Lep_charge").unwrap()[0], vec![1, -1]);
        assert_eq!(selected.get::<Vec<bool>>("trigMatch").unwrap()[0], vec![true, false]);
        assert_eq!(selected.get::<Vec<bool>>("nonTrigMatch").unwrap()[0], vec![false, true]);
        assert_relative_eq!(selected.get::<f64>("SFMC").unwrap()[0], 1.0);
    }

    #[test]
    fn test_dimuon_rejections() {
        let same_sign = muon_event(&[(40.0, 0.5, 0.1, 1), (35.0, -0.3, 2.9, 1)], 0.1);
        assert_eq!(run_selection(DimuonSelection::new(26.0).as_ref(), same_sign).n_rows(), 0);
        let unmatched = muon_event(&[(40.0, 0.5, 0.1, 1), (35.0, -0.3, 2.9, -1)], -1.5);
        assert_eq!(run_selection(DimuonSelection::new(26.0).as_ref(), unmatched).n_rows(), 0);
        let soft = muon_event(&[(40.0, 0.5, 0.1, 1), (20.0, -0.3, 2.9, -1)], 0.1);
        assert_eq!(run_selection(DimuonSelection::new(26.0).as_ref(), soft).n_rows(), 0);
        let three = muon_event(
            &[(40.0, 0.5, 0.1, 1), (35.0, -0.3, 2.9, -1), (15.0, 1.0, 1.0, 1)],
            0.1,
        );
        assert_eq!(run_selection(DimuonSelection::new(26.0).as_ref(), three).n_rows(), 0);
    }
}
