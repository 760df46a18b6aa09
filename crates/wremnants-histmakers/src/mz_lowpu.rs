use std::sync::Arc;

use tracing::{debug, info};
use wremnants_core::{
    hist::Axis,
    results::{aggregate_groups, build_and_run, scale_to_data},
    Bookings, Dataset, FourVector, Graph, ResultDict,
    WremResult,
};

use crate::{
    axes::{
        axis_etal, axis_lin, axis_mll, axis_mt, axis_pt, axis_ptl, axis_ptll, axis_yll,
        nominal_axes, NOMINAL_COLUMNS,
    },
    corrections::{Corrections, NominalCorrections},
    datasets::is_vproc,
    kinematics::mt_wlike,
    recoil::{NoRecoil, RecoilStage},
    selection::{masked, Flavor, LeptonSelection},
    syst::{
        add_lepsf_hists, add_massweights_hist, add_prefire_hist, add_theory_hists,
        define_mass_weights, define_theory_weights, PdfSet,
    },
    unfolding::{
        add_out_of_acceptance, add_xnorm_histograms, define_gen_level, select_fiducial_space,
        unfolding_axes, FiducialCuts,
    },
};

/// Noise and beam-halo filters every event must pass.
pub const MET_FILTERS: [&str; 6] = [
    "Flag_globalSuperTightHalo2016Filter",
    "Flag_EcalDeadCellTriggerPrimitiveFilter",
    "Flag_goodVertices",
    "Flag_HBHENoiseIsoFilter",
    "Flag_HBHENoiseFilter",
    "Flag_BadPFMuonFilter",
];

/// Options of the low-pileup Z → ℓℓ W-like histogram producer.
#[derive(Clone, Debug)]
pub struct MzLowPuConfig {
    flavor: Flavor,
    pt_bins: usize,
    pt_min: f64,
    pt_max: f64,
    mass_min: f64,
    mass_max: f64,
    mtw_min: f64,
    unfolding: bool,
    gen_vars: Vec<String>,
    only_main_histograms: bool,
    pdf: PdfSet,
    selection: Box<dyn LeptonSelection>,
    corrections: Arc<dyn Corrections>,
    recoil: Box<dyn RecoilStage>,
}

impl MzLowPuConfig {
    /// Defaults: lepton pt in (26, 60) GeV in 34 bins, mll in (60, 120) GeV, W-like mT ≥ 45 GeV,
    /// no unfolding, no recoil correction and unit corrections.
    pub fn new(flavor: Flavor) -> Self {
        Self {
            flavor,
            pt_bins: 34,
            pt_min: 26.0,
            pt_max: 60.0,
            mass_min: 60.0,
            mass_max: 120.0,
            mtw_min: 45.0,
            unfolding: false,
            gen_vars: vec!["ptVGen".to_string()],
            only_main_histograms: false,
            pdf: PdfSet::default(),
            selection: flavor.selection(26.0),
            corrections: Arc::new(NominalCorrections),
            recoil: NoRecoil::new(),
        }
    }

    /// Binning and acceptance of the lepton transverse momentum.
    pub fn pt(mut self, bins: usize, min: f64, max: f64) -> Self {
        self.pt_bins = bins;
        self.pt_min = min;
        self.pt_max = max;
        self.selection = self.flavor.selection(min);
        self
    }

    /// Restrict the signal to the fiducial region and add the generator-level `gen_vars` axes.
    pub fn unfolding<S: AsRef<str>>(mut self, gen_vars: &[S]) -> Self {
        self.unfolding = true;
        self.gen_vars = gen_vars.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    pub fn only_main_histograms(mut self, only_main: bool) -> Self {
        self.only_main_histograms = only_main;
        self
    }

    pub fn pdf(mut self, pdf: PdfSet) -> Self {
        self.pdf = pdf;
        self
    }

    pub fn corrections(mut self, corrections: Arc<dyn Corrections>) -> Self {
        self.corrections = corrections;
        self
    }

    pub fn recoil(mut self, recoil: Box<dyn RecoilStage>) -> Self {
        self.recoil = recoil;
        self
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }
}

/// The low-pileup Z → ℓℓ W-like histogram producer.
#[derive(Clone, Debug)]
pub struct MzLowPu {
    config: MzLowPuConfig,
    nominal_axes: Vec<Axis>,
    unfolding_axes: Vec<Axis>,
    unfolding_cols: Vec<String>,
}

/// Normalise the simulation to the data luminosity, then merge the datasets of each of
/// `groups`. Unnormalised results keep one entry per dataset. Returns the luminosity when
/// scaling.
pub fn scale_and_aggregate(
    results: &mut ResultDict,
    scale: bool,
    groups: &[&str],
) -> WremResult<Option<f64>> {
    if !scale {
        return Ok(None);
    }
    let lumi = scale_to_data(results)?;
    aggregate_groups(results, groups)?;
    Ok(Some(lumi))
}

fn lepton(i: usize, pt: &[f64], eta: &[f64], phi: &[f64], mass: &[f64]) -> FourVector {
    let at = |v: &[f64]| v.get(i).copied().unwrap_or(f64::NAN);
    FourVector::new(at(pt), at(eta), at(phi), at(mass))
}

fn first_or_nan(values: &[f64]) -> f64 {
    values.first().copied().unwrap_or(f64::NAN)
}

impl MzLowPu {
    pub fn new(config: MzLowPuConfig) -> WremResult<Self> {
        let (unfolding_axes, unfolding_cols) = if config.unfolding {
            unfolding_axes(&config.gen_vars)?
        } else {
            (Vec::new(), Vec::new())
        };
        Ok(Self {
            nominal_axes: nominal_axes()?,
            unfolding_axes,
            unfolding_cols,
            config,
        })
    }

    pub fn config(&self) -> &MzLowPuConfig {
        &self.config
    }

    /// The default output file name, `mz_lowPU_<flavor>.bin`.
    pub fn output_filename(&self) -> String {
        format!("mz_lowPU_{}.bin", self.config.flavor)
    }

    /// The datasets to run over: with unfolding, the signal gets an out-of-acceptance copy.
    pub fn prepare_datasets(&self, datasets: Vec<Dataset>) -> Vec<Dataset> {
        for dataset in &datasets {
            info!(dataset = %dataset.name, "dataset");
        }
        if self.config.unfolding {
            add_out_of_acceptance(datasets, self.config.flavor.signal())
        } else {
            datasets
        }
    }

    /// Build and run the graphs of every dataset.
    pub fn run(&self, datasets: &[Dataset]) -> WremResult<ResultDict> {
        build_and_run(datasets, |dataset, df, bookings| {
            self.build_graph(dataset, df, bookings)
        })
    }

    fn fiducial_cuts(&self) -> FiducialCuts {
        FiducialCuts {
            pt_min: self.config.pt_min,
            pt_max: self.config.pt_max,
            mass_min: self.config.mass_min,
            mass_max: self.config.mass_max,
            mtw_min: 0.0,
        }
    }

    /// Register every histogram of `dataset` on `bookings`.
    pub fn build_graph(&self, dataset: &Dataset, df: Graph, bookings: &mut Bookings) -> WremResult<()> {
        info!(dataset = %dataset.name, "build graph");
        let config = &self.config;
        let is_data = dataset.is_data();
        let is_signal = !is_data && dataset.name == config.flavor.signal();

        let df = if is_data {
            df.define_constant("weight", 1.0)?
        } else {
            df.define("weight", &["genWeight"], |w: &f64| 1.0_f64.copysign(*w))?
        };
        bookings.sum_and_count(&df, "weight")?;
        // W-like charge
        let mut df = df.define("TrigMuon_charge", &["event"], |e: &i64| {
            if e % 2 == 0 {
                -1i64
            } else {
                1
            }
        })?;

        let mut axes = self.nominal_axes.clone();
        let mut cols: Vec<String> = NOMINAL_COLUMNS.iter().map(|s| s.to_string()).collect();
        if is_signal {
            df = define_gen_level(&df, config.flavor)?;
        }
        if config.unfolding && is_signal {
            if dataset.out_of_acceptance {
                debug!("Reject events in fiducial phase space");
                df = select_fiducial_space(&df, self.fiducial_cuts(), false)?;
            } else {
                debug!("Select events in fiducial phase space");
                df = select_fiducial_space(&df, self.fiducial_cuts(), true)?;
                let unfolding_cols: Vec<&str> =
                    self.unfolding_cols.iter().map(String::as_str).collect();
                add_xnorm_histograms(&df, bookings, &self.unfolding_axes, &unfolding_cols)?;
                axes.extend(self.unfolding_axes.iter().cloned());
                cols.extend(self.unfolding_cols.iter().cloned());
            }
        }
        let cols: Vec<&str> = cols.iter().map(String::as_str).collect();

        let df = config.selection.select(&df, is_data, &config.corrections)?;
        let (pt_min, pt_max) = (config.pt_min, config.pt_max);
        let df = df.filter("leptonPt", &["Lep_pt"], move |pt: &Vec<f64>| {
            pt.len() >= 2 && pt[..2].iter().all(|pt| *pt > pt_min && *pt < pt_max)
        })?;
        let df = df.filter(
            "metFilters",
            &MET_FILTERS,
            |a: &bool, b: &bool, c: &bool, d: &bool, e: &bool, f: &bool| {
                *a && *b && *c && *d && *e && *f
            },
        )?;

        let lep_p4 = ["Lep_pt", "Lep_eta", "Lep_phi", "Lep_mass"];
        let df = df
            .define(
                "Lep1_mom4",
                &lep_p4,
                |pt: &Vec<f64>, eta: &Vec<f64>, phi: &Vec<f64>, m: &Vec<f64>| {
                    lepton(0, pt, eta, phi, m)
                },
            )?
            .define(
                "Lep2_mom4",
                &lep_p4,
                |pt: &Vec<f64>, eta: &Vec<f64>, phi: &Vec<f64>, m: &Vec<f64>| {
                    lepton(1, pt, eta, phi, m)
                },
            )?
            .define(
                "ll_mom4",
                &["Lep1_mom4", "Lep2_mom4"],
                |a: &FourVector, b: &FourVector| a + b,
            )?
            .define("mll", &["ll_mom4"], |ll: &FourVector| ll.mass)?;
        let (mass_min, mass_max) = (config.mass_min, config.mass_max);
        let df = df
            .filter("mll", &["mll"], move |m: &f64| *m > mass_min && *m < mass_max)?
            .define("ptll", &["ll_mom4"], |ll: &FourVector| ll.pt)?
            .define("yll", &["ll_mom4"], |ll: &FourVector| ll.rapidity())?
            .define("absYll", &["yll"], |y: &f64| y.abs())?;

        let df = if is_data {
            df.define_constant("nominal_weight", 1.0)?
        } else {
            df.alias("exp_weight", "SFMC")?.define(
                "nominal_weight",
                &["weight", "exp_weight"],
                |w: &f64, exp: &f64| w * exp,
            )?
        };

        let df = self.book_lepton_kinematics(&df, bookings)?;
        let df = Self::define_wlike(&df)?;

        let df = config.recoil.apply(&df, dataset)?;
        bookings.histo("mll", &df, vec![axis_mll()?], &["mll"], Some("nominal_weight"))?;
        bookings.histo("yll", &df, vec![axis_yll()?], &["yll"], Some("nominal_weight"))?;
        bookings.histo("ptll", &df, vec![axis_ptll()?], &["ptll"], Some("nominal_weight"))?;

        let df = df.define(
            "transverseMass",
            &[
                "TrigMuon_pt",
                "TrigMuon_phi",
                "NonTrigMuon_pt",
                "NonTrigMuon_phi",
                "MET_corr_rec_pt",
                "MET_corr_rec_phi",
            ],
            |pt: &f64, phi: &f64, nt_pt: &f64, nt_phi: &f64, met: &f64, met_phi: &f64| {
                mt_wlike(*pt, *phi, *nt_pt, *nt_phi, *met, *met_phi)
            },
        )?;
        let axes_mt = vec![axis_mt()?];
        let cols_mt = ["transverseMass"];
        bookings.histo("transverseMass", &df, axes_mt.clone(), &cols_mt, Some("nominal_weight"))?;
        let df = if config.mtw_min > 0.0 {
            let mtw_min = config.mtw_min;
            df.filter("transverseMass", &["transverseMass"], move |mt: &f64| *mt >= mtw_min)?
        } else {
            df
        };

        let axis_pt = axis_pt(config.pt_bins, config.pt_min, config.pt_max)?;
        bookings.histo("lep_pT", &df, vec![axis_pt.clone()], &["TrigMuon_pt"], Some("nominal_weight"))?;
        bookings.histo("lep_pT_qTrw", &df, vec![axis_pt], &["TrigMuon_pt"], Some("nominal_weight_qTrw"))?;

        let df = if !is_data && is_vproc(&dataset.name) {
            let df = define_theory_weights(&df, &config.pdf)?;
            add_theory_hists(&df, bookings, &axes, &cols, "nominal", &config.pdf)?;
            add_theory_hists(&df, bookings, &axes_mt, &cols_mt, "transverseMass", &config.pdf)?;
            df
        } else {
            df
        };

        bookings.histo("nominal", &df, axes.clone(), &cols, Some("nominal_weight"))?;

        let df = add_lepsf_hists(&df, bookings, &config.corrections, &axes, &cols)?;
        let df = add_prefire_hist(&df, bookings, &config.corrections, &axes, &cols)?;

        if is_signal {
            let df = define_mass_weights(&df, &dataset.name)?;
            add_massweights_hist(&df, bookings, &axes, &cols, "nominal")?;
            add_massweights_hist(&df, bookings, &axes_mt, &cols_mt, "transverseMass")?;
            add_massweights_hist(&df, bookings, &[axis_mll()?], &["mll"], "mll")?;
        }

        if !config.only_main_histograms {
            config.recoil.add_uncertainties(&df, bookings, dataset)?;
        }
        debug!(dataset = %dataset.output_name(), histograms = bookings.len(), "booked");
        Ok(())
    }

    /// Leading, subleading, charge-split and trigger-split lepton kinematics.
    fn book_lepton_kinematics(&self, df: &Graph, bookings: &mut Bookings) -> WremResult<Graph> {
        let mut df = df.clone();
        for var in ["pt", "eta"] {
            let column = format!("Lep_{var}");
            let inputs = [column.as_str(), "Lep_pt", "Lep_charge"];
            df = df
                .define(
                    &format!("{column}_leading"),
                    &inputs,
                    |v: &Vec<f64>, pt: &Vec<f64>, _: &Vec<i64>| {
                        if pt[0] > pt[1] {
                            v[0]
                        } else {
                            v[1]
                        }
                    },
                )?
                .define(
                    &format!("{column}_subleading"),
                    &inputs,
                    |v: &Vec<f64>, pt: &Vec<f64>, _: &Vec<i64>| {
                        if pt[0] > pt[1] {
                            v[1]
                        } else {
                            v[0]
                        }
                    },
                )?
                .define(
                    &format!("{column}_plus"),
                    &inputs,
                    |v: &Vec<f64>, _: &Vec<f64>, q: &Vec<i64>| if q[0] > 0 { v[0] } else { v[1] },
                )?
                .define(
                    &format!("{column}_minus"),
                    &inputs,
                    |v: &Vec<f64>, _: &Vec<f64>, q: &Vec<i64>| if q[0] > 0 { v[1] } else { v[0] },
                )?
                .define(
                    &format!("{column}_trg"),
                    &[column.as_str(), "trigMatch"],
                    |v: &Vec<f64>, m: &Vec<bool>| masked(v, m),
                )?
                .define(
                    &format!("{column}_nontrg"),
                    &[column.as_str(), "nonTrigMatch"],
                    |v: &Vec<f64>, m: &Vec<bool>| masked(v, m),
                )?;
            let axis = if var == "pt" { axis_ptl()? } else { axis_etal()? };
            for suffix in ["", "_leading", "_subleading", "_plus", "_minus", "_trg", "_nontrg"] {
                let input = format!("{column}{suffix}");
                bookings.histo(
                    &format!("lep_{var}{suffix}"),
                    &df,
                    vec![axis.clone()],
                    &[input.as_str()],
                    Some("nominal_weight"),
                )?;
            }
        }
        let df = df.define("noTrigMatch", &["trigMatch"], |m: &Vec<bool>| {
            m.iter().filter(|m| **m).count() as i64
        })?;
        bookings.histo("noTrigMatch", &df, vec![axis_lin()?], &["noTrigMatch"], Some("nominal_weight"))?;
        Ok(df)
    }

    /// Split the pair into the triggering lepton, whose charge is fixed by the event number, and
    /// the one treated as the neutrino.
    fn define_wlike(df: &Graph) -> WremResult<Graph> {
        let mut df = df
            .define("NonTrigMuon_charge", &["TrigMuon_charge"], |q: &i64| -q)?
            .define(
                "trigMuons",
                &["Lep_charge", "TrigMuon_charge"],
                |lq: &Vec<i64>, q: &i64| -> Vec<bool> { lq.iter().map(|l| l == q).collect() },
            )?
            .define(
                "nonTrigMuons",
                &["Lep_charge", "NonTrigMuon_charge"],
                |lq: &Vec<i64>, q: &i64| -> Vec<bool> { lq.iter().map(|l| l == q).collect() },
            )?;
        for (prefix, mask) in [("TrigMuon", "trigMuons"), ("NonTrigMuon", "nonTrigMuons")] {
            for var in ["pt", "eta", "phi"] {
                let input = format!("Lep_{var}");
                df = df.define(
                    &format!("{prefix}_{var}"),
                    &[input.as_str(), mask],
                    |v: &Vec<f64>, m: &Vec<bool>| first_or_nan(&masked(v, m)),
                )?;
            }
        }
        Ok(df)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use wremnants_core::{graph::FrameSource, results::build_and_run_with, Column, Frame, SampleKind};

    use super::*;
    use crate::{selection::tests::muon_event, syst::MASS_WEIGHT_CENTRAL};

    /// `n` Z → μμ events passing the full selection, the last one with a same-sign pair.
    fn zmumu_events(n: usize) -> Frame {
        let mut frame = Frame::new(0);
        for i in 0..n {
            let charge = if i + 1 == n { 1 } else { -1 };
            let event = muon_event(&[(40.0, 0.5, 0.1, 1), (38.0, -0.3, 3.1, charge)], 0.1);
            let names: Vec<String> = event
                .names()
                .filter(|name| *name != "event")
                .map(String::from)
                .collect();
            let mut event = event.select(&names).unwrap();
            event.insert("event", Column::Int(vec![i as i64])).unwrap();
            for flag in MET_FILTERS {
                event.insert(flag, Column::Bool(vec![true])).unwrap();
            }
            event.insert("MET_pt", Column::Float(vec![0.0])).unwrap();
            event.insert("MET_phi", Column::Float(vec![0.0])).unwrap();
            event
                .insert("LHEScaleWeight", Column::FloatVec(vec![vec![1.0; 9]]))
                .unwrap();
            event
                .insert("LHEPdfWeight", Column::FloatVec(vec![vec![1.0; 103]]))
                .unwrap();
            let gen = [
                ("GenDressedLepton_pt", vec![40.0, 38.0]),
                ("GenDressedLepton_eta", vec![0.5, -0.3]),
                ("GenDressedLepton_phi", vec![0.1, 3.1]),
                ("GenDressedLepton_mass", vec![0.0, 0.0]),
            ];
            for (name, values) in gen {
                event.insert(name, Column::FloatVec(vec![values])).unwrap();
            }
            event
                .insert("GenDressedLepton_pdgId", Column::IntVec(vec![vec![-13, 13]]))
                .unwrap();
            frame.append(event).unwrap();
        }
        frame
    }

    fn run(producer: &MzLowPu, datasets: &[Dataset], n: usize) -> ResultDict {
        let frame = zmumu_events(n);
        build_and_run_with(
            datasets,
            |dataset| {
                Ok(Arc::new(FrameSource::new(dataset.output_name(), frame.clone()))
                    as Arc<dyn wremnants_core::Source>)
            },
            |dataset, df, bookings| producer.build_graph(dataset, df, bookings),
        )
        .unwrap()
    }

    fn datasets() -> Vec<Dataset> {
        vec![
            Dataset::new("singlemuon", SampleKind::Data).lumi(200.0),
            Dataset::new("Zmumu", SampleKind::Simulation).xsec(2000.0),
        ]
    }

    #[test]
    fn test_mumu_histograms() {
        let producer = MzLowPu::new(MzLowPuConfig::new(Flavor::Mumu)).unwrap();
        assert_eq!(producer.output_filename(), "mz_lowPU_mumu.bin");
        let results = run(&producer, &datasets(), 10);

        let zmumu = &results["Zmumu"];
        assert_relative_eq!(zmumu.weightsum, 10.0);
        let nominal = &zmumu.hists["nominal"];
        assert_eq!(nominal.axis_names(), vec!["ptll", "yll", "charge"]);
        assert_relative_eq!(nominal.sum(true), 9.0);
        // even events trigger on the negative lepton
        let charge = nominal.project(&["charge"]).unwrap();
        assert_eq!(charge.unrolled(false), vec![5.0, 4.0]);
        for name in [
            "transverseMass",
            "mll",
            "lep_pT",
            "lep_pt_trg",
            "lep_eta_subleading",
            "noTrigMatch",
            "nominal_qcdScale",
            "transverseMass_pdfNNPDF31",
            "nominal_lepSF_HLT_DATA_stat",
            "nominal_prefireCorr",
            "nominal_massWeight",
            "mll_massWeight",
        ] {
            assert!(zmumu.hists.contains_key(name), "missing {name}");
        }
        assert_relative_eq!(zmumu.hists["lep_pt"].sum(true), 18.0);
        assert_relative_eq!(zmumu.hists["lep_pt_trg"].sum(true), 9.0);
        let mass_weights = &zmumu.hists["nominal_massWeight"];
        let central = mass_weights
            .slice(&[("tensor_axis_0", MASS_WEIGHT_CENTRAL)])
            .unwrap();
        assert_relative_eq!(central.sum(true), 9.0, epsilon = 1e-9);

        let data = &results["singlemuon"];
        assert_relative_eq!(data.hists["nominal"].sum(true), 9.0);
        assert!(data.hists.contains_key("nominal_prefireCorr"));
        assert!(data.hists.contains_key("nominal_lepSF_ISO_stat"));
        assert!(!data.hists.contains_key("nominal_massWeight"));
        assert!(!data.hists.contains_key("nominal_qcdScale"));
        assert!(!data.hists.contains_key("xnorm"));
    }

    #[test]
    fn test_unfolding_splits_signal() {
        let config = MzLowPuConfig::new(Flavor::Mumu).unfolding(&["ptVGen", "absYVGen"]);
        let producer = MzLowPu::new(config).unwrap();
        let datasets = producer.prepare_datasets(datasets());
        assert_eq!(datasets.len(), 3);
        let results = run(&producer, &datasets, 10);

        let xnorm = &results["Zmumu"].hists["xnorm"];
        assert_eq!(xnorm.axis_names(), vec!["ptVGen", "absYVGen"]);
        assert_relative_eq!(xnorm.sum(true), 10.0);
        let nominal = &results["Zmumu"].hists["nominal"];
        assert_eq!(
            nominal.axis_names(),
            vec!["ptll", "yll", "charge", "ptVGen", "absYVGen"]
        );
        assert_relative_eq!(nominal.sum(true), 9.0);
        let background = &results["BkgZmumu"];
        assert_relative_eq!(background.hists["nominal"].sum(true), 0.0);
        assert!(!background.hists.contains_key("xnorm"));
    }

    #[test]
    fn test_pt_window_rejects_events() {
        let config = MzLowPuConfig::new(Flavor::Mumu).pt(10, 26.0, 39.0);
        let producer = MzLowPu::new(config).unwrap();
        let results = run(&producer, &datasets(), 4);
        assert_relative_eq!(results["Zmumu"].hists["nominal"].sum(true), 0.0);
        assert_eq!(results["Zmumu"].hists["lep_pT"].axes()[0].n_bins(), 10);
    }

    #[test]
    fn test_aggregation_follows_scaling() {
        let producer = MzLowPu::new(MzLowPuConfig::new(Flavor::Mumu)).unwrap();
        let datasets = vec![
            Dataset::new("singlemuon", SampleKind::Data).lumi(200.0),
            Dataset::new("TTLeptonic", SampleKind::Simulation).xsec(10.0).group("Top"),
            Dataset::new("TTSemileptonic", SampleKind::Simulation).xsec(30.0).group("Top"),
        ];
        let results = run(&producer, &datasets, 4);

        let mut unscaled = results.clone();
        assert_eq!(scale_and_aggregate(&mut unscaled, false, &["Top"]).unwrap(), None);
        assert_eq!(unscaled.len(), 3);
        assert!(unscaled.contains_key("TTLeptonic"));
        assert_relative_eq!(unscaled["TTLeptonic"].hists["nominal"].sum(true), 3.0);

        let mut scaled = results;
        let lumi = scale_and_aggregate(&mut scaled, true, &["Top"]).unwrap();
        assert_eq!(lumi, Some(200.0));
        assert_eq!(scaled.len(), 2);
        assert!(!scaled.contains_key("TTLeptonic"));
        // 3 of 4 events pass, each sample normalised to lumi * xsec
        assert_relative_eq!(
            scaled["Top"].hists["nominal"].sum(true),
            0.75 * 200.0 * (10.0 + 30.0),
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_unknown_gen_variable() {
        let config = MzLowPuConfig::new(Flavor::Mumu).unfolding(&["ptVGen", "qT"]);
        assert!(MzLowPu::new(config).is_err());
    }
}
