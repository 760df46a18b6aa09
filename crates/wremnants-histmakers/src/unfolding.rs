use tracing::debug;
use wremnants_core::{
    hist::Axis, utils::vectors::FourVector, Bookings, Dataset, Graph, WremError, WremResult,
};

use crate::{axes::gen_axis, kinematics::mt_wlike, selection::Flavor};

/// Generator-level axes and the columns filling them, for the requested unfolding variables.
pub fn unfolding_axes<S: AsRef<str>>(gen_vars: &[S]) -> WremResult<(Vec<Axis>, Vec<String>)> {
    let mut axes = Vec::with_capacity(gen_vars.len());
    let mut cols = Vec::with_capacity(gen_vars.len());
    for var in gen_vars {
        let var = var.as_ref();
        let axis = gen_axis(var).ok_or_else(|| WremError::UnknownAxis {
            hist: "unfolding".to_string(),
            axis: var.to_string(),
        })??;
        axes.push(axis);
        cols.push(var.to_string());
    }
    Ok((axes, cols))
}

/// Append an out-of-acceptance copy of every dataset in `group`.
pub fn add_out_of_acceptance(datasets: Vec<Dataset>, group: &str) -> Vec<Dataset> {
    let copies: Vec<Dataset> = datasets
        .iter()
        .filter(|d| d.group == group && !d.out_of_acceptance)
        .map(Dataset::out_of_acceptance_copy)
        .collect();
    datasets.into_iter().chain(copies).collect()
}

/// The leading dressed lepton of `flavor` with the given charge sign, or a zero vector.
fn leading_gen_lepton(
    pdg_id: i64,
    pt: &[f64],
    eta: &[f64],
    phi: &[f64],
    mass: &[f64],
    ids: &[i64],
) -> FourVector {
    pt.iter()
        .zip(eta)
        .zip(phi)
        .zip(mass)
        .zip(ids)
        .filter(|(_, id)| **id == pdg_id)
        .map(|((((pt, eta), phi), mass), _)| FourVector::new(*pt, *eta, *phi, *mass))
        .fold(FourVector::default(), |best, l| if l.pt > best.pt { l } else { best })
}

/// Define the generator-level dilepton system from dressed leptons: `genlep_plus`,
/// `genlep_minus`, `genV`, `massVgen`, `ptVGen`, `yVGen`, `absYVGen` and `genValid`.
pub fn define_gen_level(df: &Graph, flavor: Flavor) -> WremResult<Graph> {
    let id = match flavor {
        Flavor::Mumu => 13,
        Flavor::Ee => 11,
    };
    let inputs = [
        "GenDressedLepton_pt",
        "GenDressedLepton_eta",
        "GenDressedLepton_phi",
        "GenDressedLepton_mass",
        "GenDressedLepton_pdgId",
    ];
    let mut df = df.clone();
    // negative PDG ids are the positively charged leptons
    for (name, pdg_id) in [("genlep_plus", -id), ("genlep_minus", id)] {
        df = df.define(
            name,
            &inputs,
            move |pt: &Vec<f64>,
                  eta: &Vec<f64>,
                  phi: &Vec<f64>,
                  mass: &Vec<f64>,
                  ids: &Vec<i64>| {
                leading_gen_lepton(pdg_id, pt, eta, phi, mass, ids)
            },
        )?;
    }
    let pair = ["genlep_plus", "genlep_minus"];
    df.define("genValid", &pair, |p: &FourVector, m: &FourVector| {
        p.pt > 0.0 && m.pt > 0.0
    })?
    .define("genV", &pair, |p: &FourVector, m: &FourVector| p + m)?
    .define("massVgen", &["genV", "genValid"], |v: &FourVector, valid: &bool| {
        if *valid {
            v.mass
        } else {
            f64::NAN
        }
    })?
    .define("ptVGen", &["genV"], |v: &FourVector| v.pt)?
    .define("yVGen", &["genV"], |v: &FourVector| v.rapidity())?
    .define("absYVGen", &["yVGen"], |y: &f64| y.abs())
}

/// Generator-level fiducial phase space of the W-like measurement.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FiducialCuts {
    pub pt_min: f64,
    pub pt_max: f64,
    pub mass_min: f64,
    pub mass_max: f64,
    /// Disabled when not positive.
    pub mtw_min: f64,
}

impl FiducialCuts {
    fn lepton_passes(&self, lepton: &FourVector) -> bool {
        lepton.eta.abs() < 2.4 && lepton.pt > self.pt_min && lepton.pt < self.pt_max
    }

    /// Whether the event is inside the fiducial region. The triggering lepton carries
    /// `trig_charge`; the other one is treated as the neutrino.
    pub fn passes(
        &self,
        plus: &FourVector,
        minus: &FourVector,
        mass: f64,
        trig_charge: i64,
    ) -> bool {
        if !(self.lepton_passes(plus) && self.lepton_passes(minus)) {
            return false;
        }
        if !(mass > self.mass_min && mass < self.mass_max) {
            return false;
        }
        if self.mtw_min > 0.0 {
            let (trig, nontrig) = if trig_charge > 0 {
                (plus, minus)
            } else {
                (minus, plus)
            };
            let mt = mt_wlike(trig.pt, trig.phi, nontrig.pt, nontrig.phi, 0.0, 0.0);
            return mt >= self.mtw_min;
        }
        true
    }
}

/// Keep events inside (`accept`) or outside the fiducial region.
pub fn select_fiducial_space(df: &Graph, cuts: FiducialCuts, accept: bool) -> WremResult<Graph> {
    debug!(?cuts, accept, "selecting fiducial phase space");
    let label = if accept { "fiducial" } else { "outOfAcceptance" };
    df.filter(
        label,
        &["genlep_plus", "genlep_minus", "massVgen", "TrigMuon_charge"],
        move |plus: &FourVector, minus: &FourVector, mass: &f64, q: &i64| {
            cuts.passes(plus, minus, *mass, *q) == accept
        },
    )
}

/// Book the generator-level `xnorm` histogram used to normalise the unfolded cross sections.
pub fn add_xnorm_histograms(
    df: &Graph,
    bookings: &mut Bookings,
    axes: &[Axis],
    cols: &[&str],
) -> WremResult<()> {
    bookings.histo("xnorm", df, axes.to_vec(), cols, Some("weight"))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use wremnants_core::{graph::FrameSource, Column, Frame, SampleKind};

    use super::*;

    const CUTS: FiducialCuts = FiducialCuts {
        pt_min: 26.0,
        pt_max: 60.0,
        mass_min: 60.0,
        mass_max: 120.0,
        mtw_min: 0.0,
    };

    #[test]
    fn test_unfolding_axes() {
        let (axes, cols) = unfolding_axes(&["ptVGen", "absYVGen"]).unwrap();
        assert_eq!(axes.len(), 2);
        assert_eq!(cols, vec!["ptVGen", "absYVGen"]);
        assert!(matches!(
            unfolding_axes(&["qGen"]),
            Err(WremError::UnknownAxis { .. })
        ));
    }

    #[test]
    fn test_out_of_acceptance() {
        let datasets = vec![
            Dataset::new("Zmumu", SampleKind::Simulation).group("Zmumu"),
            Dataset::new("Ztautau", SampleKind::Simulation).group("Ztautau"),
        ];
        let datasets = add_out_of_acceptance(datasets, "Zmumu");
        assert_eq!(datasets.len(), 3);
        assert!(datasets[2].out_of_acceptance);
        assert_eq!(datasets[2].output_name(), "BkgZmumu");
        assert_eq!(datasets[2].group, "BkgZmumu");
    }

    #[test]
    fn test_gen_level_and_fiducial() {
        let floats = |a: Vec<f64>, b: Vec<f64>| Column::FloatVec(vec![a, b]);
        let frame = Frame::from_columns([
            ("event", Column::Int(vec![0, 1])),
            ("TrigMuon_charge", Column::Int(vec![-1, 1])),
            ("GenDressedLepton_pt", floats(vec![40.0, 38.0, 5.0], vec![40.0, 10.0])),
            ("GenDressedLepton_eta", floats(vec![0.3, -0.2, 0.0], vec![0.3, 0.1])),
            ("GenDressedLepton_phi", floats(vec![0.0, 3.0, 1.0], vec![0.0, 3.0])),
            ("GenDressedLepton_mass", floats(vec![0.0; 3], vec![0.0; 2])),
            (
                "GenDressedLepton_pdgId",
                Column::IntVec(vec![vec![13, -13, -13], vec![13, -13]]),
            ),
        ])
        .unwrap();
        let df = Graph::from_source(FrameSource::new("gen", frame)).unwrap();
        let df = define_gen_level(&df, Flavor::Mumu).unwrap();
        let all = df.collect().unwrap();
        let plus = all.get::<FourVector>("genlep_plus").unwrap();
        assert_eq!(plus[0].pt, 38.0);
        assert!(all.get::<bool>("genValid").unwrap().iter().all(|v| *v));
        let mass = all.get::<f64>("massVgen").unwrap()[0];
        assert!(mass > 60.0 && mass < 120.0);
        let y = all.get::<f64>("yVGen").unwrap()[0];
        assert_relative_eq!(all.get::<f64>("absYVGen").unwrap()[0], y.abs());

        let fiducial = select_fiducial_space(&df, CUTS, true).unwrap().collect().unwrap();
        assert_eq!(fiducial.get::<i64>("event").unwrap(), &[0]);
        let rejected = select_fiducial_space(&df, CUTS, false).unwrap().collect().unwrap();
        assert_eq!(rejected.get::<i64>("event").unwrap(), &[1]);
    }

    #[test]
    fn test_fiducial_mtw() {
        let plus = FourVector::new(40.0, 0.0, 0.0, 0.0);
        let minus = FourVector::new(40.0, 0.0, std::f64::consts::PI, 0.0);
        let cuts = FiducialCuts { mtw_min: 45.0, ..CUTS };
        assert!(cuts.passes(&plus, &minus, 80.0, 1));
        let collinear = FourVector::new(40.0, 0.0, 0.1, 0.0);
        assert!(!cuts.passes(&plus, &collinear, 80.0, -1));
        assert!(!cuts.passes(&plus, &minus, f64::NAN, 1));
    }
}
