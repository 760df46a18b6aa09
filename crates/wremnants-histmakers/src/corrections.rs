use std::{
    fmt::Debug,
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use wremnants_core::{WremError, WremResult};

/// The scale-factor tables a lepton can be looked up in.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SfKind {
    /// Muon isolation.
    Iso,
    /// Muon identification and impact parameter.
    IdIp,
    /// Combined electron identification and isolation.
    IdIso,
    /// Single-lepton trigger efficiency in data.
    TriggerData,
    /// Single-lepton trigger efficiency in simulation.
    TriggerMc,
}

/// Which uncertainty of a table a variation shifts.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SfError {
    Stat,
    DataSyst,
    McSyst,
}

/// A source of scale-factor uncertainty, booked as one tensor histogram with one entry per
/// table bin.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SfSource {
    HltDataStat,
    HltDataSyst,
    HltMcStat,
    HltMcSyst,
    IsoStat,
    IsoDataSyst,
    IsoMcSyst,
    IdIpStat,
    IdIpDataSyst,
    IdIpMcSyst,
}

impl SfSource {
    pub const ALL: [SfSource; 10] = [
        SfSource::HltDataStat,
        SfSource::HltDataSyst,
        SfSource::HltMcStat,
        SfSource::HltMcSyst,
        SfSource::IsoStat,
        SfSource::IsoDataSyst,
        SfSource::IsoMcSyst,
        SfSource::IdIpStat,
        SfSource::IdIpDataSyst,
        SfSource::IdIpMcSyst,
    ];

    /// The histogram suffix this source is booked under.
    pub fn name(&self) -> &'static str {
        match self {
            SfSource::HltDataStat => "lepSF_HLT_DATA_stat",
            SfSource::HltDataSyst => "lepSF_HLT_DATA_syst",
            SfSource::HltMcStat => "lepSF_HLT_MC_stat",
            SfSource::HltMcSyst => "lepSF_HLT_MC_syst",
            SfSource::IsoStat => "lepSF_ISO_stat",
            SfSource::IsoDataSyst => "lepSF_ISO_DATA_syst",
            SfSource::IsoMcSyst => "lepSF_ISO_MC_syst",
            SfSource::IdIpStat => "lepSF_IDIP_stat",
            SfSource::IdIpDataSyst => "lepSF_IDIP_DATA_syst",
            SfSource::IdIpMcSyst => "lepSF_IDIP_MC_syst",
        }
    }

    /// The number of variations: trigger tables are split by charge.
    pub fn size(&self) -> usize {
        match self.kind() {
            SfKind::TriggerData | SfKind::TriggerMc => 120,
            _ => 36,
        }
    }

    pub fn kind(&self) -> SfKind {
        match self {
            SfSource::HltDataStat | SfSource::HltDataSyst => SfKind::TriggerData,
            SfSource::HltMcStat | SfSource::HltMcSyst => SfKind::TriggerMc,
            SfSource::IsoStat | SfSource::IsoDataSyst | SfSource::IsoMcSyst => SfKind::Iso,
            SfSource::IdIpStat | SfSource::IdIpDataSyst | SfSource::IdIpMcSyst => SfKind::IdIp,
        }
    }

    pub fn error(&self) -> SfError {
        match self {
            SfSource::HltDataStat | SfSource::HltMcStat => SfError::Stat,
            SfSource::IsoStat | SfSource::IdIpStat => SfError::Stat,
            SfSource::HltDataSyst | SfSource::IsoDataSyst | SfSource::IdIpDataSyst => {
                SfError::DataSyst
            }
            SfSource::HltMcSyst | SfSource::IsoMcSyst | SfSource::IdIpMcSyst => SfError::McSyst,
        }
    }
}

/// Reconstructed objects entering the L1 prefiring probability.
#[derive(Copy, Clone, Debug)]
pub struct PrefireObjects<'a> {
    pub jet_pt: &'a [f64],
    pub jet_eta: &'a [f64],
    pub photon_pt: &'a [f64],
    pub photon_eta: &'a [f64],
    pub lepton_pt: &'a [f64],
    pub lepton_eta: &'a [f64],
}

/// The prefiring weight with its down and up variations.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PrefireWeight {
    pub nominal: f64,
    pub down: f64,
    pub up: f64,
}

impl Default for PrefireWeight {
    fn default() -> Self {
        Self {
            nominal: 1.0,
            down: 1.0,
            up: 1.0,
        }
    }
}

/// Calibrations applied to reconstructed leptons and events.
///
/// Every method has a neutral default, so an implementor only overrides what it provides.
/// Implementors are shared behind an `Arc` by the kernels of all datasets.
pub trait Corrections: Send + Sync + Debug {
    /// The calibrated transverse momentum of a muon.
    fn muon_pt(&self, _is_data: bool, pt: f64, _eta: f64, _phi: f64, _charge: i64) -> f64 {
        pt
    }

    /// The calibrated transverse momentum of an electron.
    fn electron_pt(&self, _is_data: bool, pt: f64, _eta: f64) -> f64 {
        pt
    }

    /// Remove the energy correction applied upstream to an electron.
    fn undo_electron_correction(&self, pt: f64, _eta: f64, ecal_corr: f64) -> f64 {
        if ecal_corr > 0.0 {
            pt / ecal_corr
        } else {
            pt
        }
    }

    /// The scale factor (or efficiency, for trigger tables) of a single lepton.
    fn scale_factor(&self, _kind: SfKind, _pt: f64, _eta: f64, _charge: i64) -> f64 {
        1.0
    }

    /// Per-event ratios of varied to nominal scale factors, one per variation of `source`.
    fn sf_variations(
        &self,
        source: SfSource,
        _pt: &[f64],
        _eta: &[f64],
        _charge: &[i64],
    ) -> Vec<f64> {
        vec![1.0; source.size()]
    }

    fn prefire(&self, _objects: &PrefireObjects) -> PrefireWeight {
        PrefireWeight::default()
    }
}

/// The trigger scale factor of an event where at least one of the leptons must fire the trigger:
/// `(1 - Π(1 - ε_data)) / (1 - Π(1 - ε_mc))`.
pub fn dilepton_trigger_sf(eff_data: &[f64], eff_mc: &[f64]) -> f64 {
    let data = 1.0 - eff_data.iter().map(|e| 1.0 - e).product::<f64>();
    let mc = 1.0 - eff_mc.iter().map(|e| 1.0 - e).product::<f64>();
    if mc > 0.0 {
        data / mc
    } else {
        1.0
    }
}

/// Event trigger scale factor of `leptons` from the per-lepton efficiencies of `corrections`.
pub fn event_trigger_sf(
    corrections: &dyn Corrections,
    pt: &[f64],
    eta: &[f64],
    charge: &[i64],
) -> f64 {
    let eff = |kind| -> Vec<f64> {
        pt.iter()
            .zip(eta)
            .zip(charge)
            .map(|((pt, eta), q)| corrections.scale_factor(kind, *pt, *eta, *q))
            .collect()
    };
    dilepton_trigger_sf(&eff(SfKind::TriggerData), &eff(SfKind::TriggerMc))
}

/// Product of the per-lepton scale factors of `kind`.
pub fn event_sf(
    corrections: &dyn Corrections,
    kind: SfKind,
    pt: &[f64],
    eta: &[f64],
    charge: &[i64],
) -> f64 {
    pt.iter()
        .zip(eta)
        .zip(charge)
        .map(|((pt, eta), q)| corrections.scale_factor(kind, *pt, *eta, *q))
        .product()
}

/// Unit scale factors, uncalibrated momenta and no prefiring.
#[derive(Clone, Debug, Default)]
pub struct NominalCorrections;

impl Corrections for NominalCorrections {}

/// A scale-factor table binned in η × pT, optionally split by charge (negative first).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SfTable {
    eta_edges: Vec<f64>,
    pt_edges: Vec<f64>,
    by_charge: bool,
    values: Vec<f64>,
    stat: Vec<f64>,
    data_syst: Vec<f64>,
    mc_syst: Vec<f64>,
}

impl SfTable {
    /// A table with every value set to `value` and no uncertainties.
    pub fn uniform(
        eta_edges: &[f64],
        pt_edges: &[f64],
        by_charge: bool,
        value: f64,
    ) -> WremResult<Self> {
        for (name, edges) in [("eta", eta_edges), ("pt", pt_edges)] {
            if edges.len() < 2 || !edges.windows(2).all(|w| w[0] < w[1]) {
                return Err(WremError::InvalidAxis {
                    name: name.to_string(),
                    reason: "scale-factor edges must be strictly increasing".to_string(),
                });
            }
        }
        let n = (eta_edges.len() - 1) * (pt_edges.len() - 1) * if by_charge { 2 } else { 1 };
        Ok(Self {
            eta_edges: eta_edges.to_vec(),
            pt_edges: pt_edges.to_vec(),
            by_charge,
            values: vec![value; n],
            stat: vec![0.0; n],
            data_syst: vec![0.0; n],
            mc_syst: vec![0.0; n],
        })
    }

    pub fn n_bins(&self) -> usize {
        self.values.len()
    }

    /// Set the value and uncertainties of bin `index`.
    pub fn set(
        &mut self,
        index: usize,
        value: f64,
        stat: f64,
        data_syst: f64,
        mc_syst: f64,
    ) -> WremResult<()> {
        if index >= self.n_bins() {
            return Err(WremError::LengthMismatch {
                context: "scale-factor table".to_string(),
                expected: self.n_bins(),
                actual: index + 1,
            });
        }
        self.values[index] = value;
        self.stat[index] = stat;
        self.data_syst[index] = data_syst;
        self.mc_syst[index] = mc_syst;
        Ok(())
    }

    /// The bin holding a lepton. Values beyond the table edges are clamped into the outer bins.
    pub fn bin(&self, pt: f64, eta: f64, charge: i64) -> usize {
        let clamp = |edges: &[f64], value: f64| -> usize {
            let n = edges.len() - 1;
            let lo = edges[0];
            let hi = edges[n];
            if value < lo {
                0
            } else if value >= hi {
                n - 1
            } else {
                edges
                    .windows(2)
                    .position(|w| value >= w[0] && value < w[1])
                    .unwrap_or(n - 1)
            }
        };
        let n_pt = self.pt_edges.len() - 1;
        let n_eta = self.eta_edges.len() - 1;
        let index = clamp(&self.eta_edges, eta) * n_pt + clamp(&self.pt_edges, pt);
        if self.by_charge && charge > 0 {
            index + n_eta * n_pt
        } else {
            index
        }
    }

    fn value(&self, bin: usize, shift: Option<(SfError, usize)>) -> f64 {
        match shift {
            Some((error, shifted)) if shifted == bin => {
                let delta = match error {
                    SfError::Stat => self.stat[bin],
                    SfError::DataSyst => self.data_syst[bin],
                    SfError::McSyst => self.mc_syst[bin],
                };
                self.values[bin] + delta
            }
            _ => self.values[bin],
        }
    }
}

/// Scale factors and trigger efficiencies looked up in [`SfTable`]s.
///
/// Kinds without a table are unit. Each bin of a table is one variation of the sources built on
/// it, shifted up by the corresponding uncertainty.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BinnedScaleFactors {
    tables: IndexMap<SfKind, SfTable>,
}

impl BinnedScaleFactors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the table for `kind`. Tables that back variation sources must have as many bins as the
    /// source has variations.
    pub fn with_table(mut self, kind: SfKind, table: SfTable) -> WremResult<Self> {
        let expected = SfSource::ALL
            .iter()
            .find(|source| source.kind() == kind)
            .map(|source| source.size());
        if let Some(expected) = expected {
            if table.n_bins() != expected {
                return Err(WremError::VariationCountMismatch {
                    name: format!("{kind:?}"),
                    expected,
                    actual: table.n_bins(),
                });
            }
        }
        self.tables.insert(kind, table);
        Ok(self)
    }

    pub fn table(&self, kind: SfKind) -> Option<&SfTable> {
        self.tables.get(&kind)
    }

    /// Read tables written by [`BinnedScaleFactors::save`].
    pub fn from_file<P: AsRef<Path>>(path: P) -> WremResult<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        Ok(bincode::serde::decode_from_std_read(
            &mut reader,
            bincode::config::standard(),
        )?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> WremResult<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())?;
        writer.flush()?;
        Ok(())
    }

    fn lookup(
        &self,
        kind: SfKind,
        pt: f64,
        eta: f64,
        charge: i64,
        shift: Option<(SfError, usize)>,
    ) -> f64 {
        match self.tables.get(&kind) {
            Some(table) => table.value(table.bin(pt, eta, charge), shift),
            None => 1.0,
        }
    }

    fn event_factor(
        &self,
        source: SfSource,
        pt: &[f64],
        eta: &[f64],
        charge: &[i64],
        shift: Option<(SfError, usize)>,
    ) -> f64 {
        let leptons = || pt.iter().zip(eta).zip(charge);
        let per_lepton = |kind, shift| -> Vec<f64> {
            leptons()
                .map(|((pt, eta), q)| self.lookup(kind, *pt, *eta, *q, shift))
                .collect()
        };
        match source.kind() {
            SfKind::TriggerData => dilepton_trigger_sf(
                &per_lepton(SfKind::TriggerData, shift),
                &per_lepton(SfKind::TriggerMc, None),
            ),
            SfKind::TriggerMc => dilepton_trigger_sf(
                &per_lepton(SfKind::TriggerData, None),
                &per_lepton(SfKind::TriggerMc, shift),
            ),
            kind => per_lepton(kind, shift).iter().product(),
        }
    }
}

impl Corrections for BinnedScaleFactors {
    fn scale_factor(&self, kind: SfKind, pt: f64, eta: f64, charge: i64) -> f64 {
        self.lookup(kind, pt, eta, charge, None)
    }

    fn sf_variations(
        &self,
        source: SfSource,
        pt: &[f64],
        eta: &[f64],
        charge: &[i64],
    ) -> Vec<f64> {
        if !self.tables.contains_key(&source.kind()) {
            return vec![1.0; source.size()];
        }
        let nominal = self.event_factor(source, pt, eta, charge, None);
        (0..source.size())
            .map(|bin| {
                let shift = Some((source.error(), bin));
                let varied = self.event_factor(source, pt, eta, charge, shift);
                if nominal != 0.0 {
                    varied / nominal
                } else {
                    1.0
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::env;

    use approx::assert_relative_eq;

    use super::*;

    const ETA_12: [f64; 13] = [
        -2.4, -2.0, -1.6, -1.2, -0.8, -0.4, 0.0, 0.4, 0.8, 1.2, 1.6, 2.0, 2.4,
    ];

    fn iso_table() -> SfTable {
        let mut table =
            SfTable::uniform(&ETA_12, &[25.0, 35.0, 45.0, 60.0], false, 0.98).unwrap();
        // eta in [0.4, 0.8), pt in [35, 45)
        table.set(7 * 3 + 1, 0.95, 0.01, 0.02, 0.03).unwrap();
        table
    }

    #[test]
    fn test_nominal_corrections() {
        let corrections = NominalCorrections;
        assert_eq!(corrections.muon_pt(false, 40.0, 0.1, 0.2, 1), 40.0);
        assert_eq!(corrections.scale_factor(SfKind::Iso, 40.0, 0.1, 1), 1.0);
        assert_relative_eq!(corrections.undo_electron_correction(40.0, 0.0, 1.25), 32.0);
        let variations = corrections.sf_variations(SfSource::HltDataStat, &[40.0], &[0.1], &[1]);
        assert_eq!(variations.len(), 120);
        let objects = PrefireObjects {
            jet_pt: &[],
            jet_eta: &[],
            photon_pt: &[],
            photon_eta: &[],
            lepton_pt: &[],
            lepton_eta: &[],
        };
        assert_eq!(corrections.prefire(&objects), PrefireWeight::default());
    }

    #[test]
    fn test_trigger_sf() {
        assert_relative_eq!(dilepton_trigger_sf(&[1.0, 1.0], &[1.0, 1.0]), 1.0);
        // (1 - 0.2 * 0.2) / (1 - 0.1 * 0.1)
        assert_relative_eq!(
            dilepton_trigger_sf(&[0.8, 0.8], &[0.9, 0.9]),
            0.96 / 0.99,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_table_lookup() {
        let sf = BinnedScaleFactors::new().with_table(SfKind::Iso, iso_table()).unwrap();
        assert_relative_eq!(sf.scale_factor(SfKind::Iso, 40.0, 0.5, -1), 0.95);
        assert_relative_eq!(sf.scale_factor(SfKind::Iso, 400.0, 0.5, -1), 0.98);
        assert_relative_eq!(sf.scale_factor(SfKind::Iso, 40.0, 3.0, -1), 0.98);
        assert_relative_eq!(sf.scale_factor(SfKind::IdIp, 40.0, 0.5, -1), 1.0);
        let event = event_sf(&sf, SfKind::Iso, &[40.0, 30.0], &[0.5, 0.5], &[-1, 1]);
        assert_relative_eq!(event, 0.95 * 0.98);
    }

    #[test]
    fn test_table_size_checked() {
        let table = SfTable::uniform(&[-2.4, 2.4], &[25.0, 60.0], false, 1.0).unwrap();
        let result = BinnedScaleFactors::new().with_table(SfKind::IdIp, table);
        assert!(matches!(result, Err(WremError::VariationCountMismatch { expected: 36, .. })));
    }

    #[test]
    fn test_variations_shift_one_bin() {
        let sf = BinnedScaleFactors::new().with_table(SfKind::Iso, iso_table()).unwrap();
        let variations =
            sf.sf_variations(SfSource::IsoMcSyst, &[40.0, 30.0], &[0.5, -2.2], &[-1, 1]);
        assert_eq!(variations.len(), 36);
        assert_relative_eq!(variations[22], 0.98 / 0.95, epsilon = 1e-12);
        assert!(variations
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != 22)
            .all(|(_, v)| *v == 1.0));
        assert!(sf
            .sf_variations(SfSource::IdIpStat, &[40.0], &[0.5], &[-1])
            .iter()
            .all(|v| *v == 1.0));
    }

    #[test]
    fn test_save_and_load() {
        let sf = BinnedScaleFactors::new().with_table(SfKind::Iso, iso_table()).unwrap();
        let path = env::temp_dir().join(format!("wremnants_test_{}.bin", fastrand::u64(..)));
        sf.save(&path).unwrap();
        assert_eq!(BinnedScaleFactors::from_file(&path).unwrap(), sf);
        std::fs::remove_file(path).unwrap();
    }
}
