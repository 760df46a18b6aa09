use tracing::info;
use wremnants_core::{
    data::{discover, DiscoveryOptions, SampleSpec},
    Dataset, SampleKind, WremResult,
};

use crate::selection::Flavor;

/// Integrated luminosity of the 2017 low-pileup run, in pb⁻¹.
pub const LUMI_LOWPU: f64 = 199.269742;

const fn data(name: &'static str, path: &'static str) -> SampleSpec {
    SampleSpec {
        name,
        path,
        kind: SampleKind::Data,
        xsec: None,
        lumi: Some(LUMI_LOWPU),
        group: "Data",
    }
}

const fn mc(name: &'static str, path: &'static str, xsec: f64, group: &'static str) -> SampleSpec {
    SampleSpec {
        name,
        path,
        kind: SampleKind::Simulation,
        xsec: Some(xsec),
        lumi: None,
        group,
    }
}

/// Every low-pileup sample, with cross sections in pb.
pub const SAMPLES_LOWPU: [SampleSpec; 17] = [
    data("singlemuon", "NanoAOD_v2/SingleMuon"),
    data("singleelectron", "NanoAOD_v2/HighEGJet"),
    mc(
        "Zmumu",
        "DYJetsToMuMu_M-50_TuneCP5_13TeV-powhegMiNNLO-pythia8-photos",
        2025.74,
        "Zmumu",
    ),
    mc(
        "Zee",
        "DYJetsToEE_M-50_TuneCP5_13TeV-powhegMiNNLO-pythia8-photos",
        2025.74,
        "Zee",
    ),
    mc(
        "Ztautau",
        "DYJetsToTauTau_M-50_AtLeastOneEorMuDecay_TuneCP5_13TeV-powhegMiNNLO-pythia8-photos",
        2025.74 * 0.3482,
        "Ztautau",
    ),
    mc(
        "Wplusmunu",
        "WplusJetsToMuNu_TuneCP5_13TeV-powhegMiNNLO-pythia8-photos",
        11765.9,
        "Wmunu",
    ),
    mc(
        "Wminusmunu",
        "WminusJetsToMuNu_TuneCP5_13TeV-powhegMiNNLO-pythia8-photos",
        8703.87,
        "Wmunu",
    ),
    mc(
        "Wplusenu",
        "WplusJetsToENu_TuneCP5_13TeV-powhegMiNNLO-pythia8-photos",
        11765.9,
        "Wenu",
    ),
    mc(
        "Wminusenu",
        "WminusJetsToENu_TuneCP5_13TeV-powhegMiNNLO-pythia8-photos",
        8703.87,
        "Wenu",
    ),
    mc(
        "Wplustaunu",
        "WplusJetsToTauNu_TauToMuorE_TuneCP5_13TeV-powhegMiNNLO-pythia8-photos",
        11765.9 * 0.3482,
        "Wtaunu",
    ),
    mc(
        "Wminustaunu",
        "WminusJetsToTauNu_TauToMuorE_TuneCP5_13TeV-powhegMiNNLO-pythia8-photos",
        8703.87 * 0.3482,
        "Wtaunu",
    ),
    mc(
        "TTTo2L2Nu",
        "TTTo2L2Nu_TuneCP5_13TeV-powheg-pythia8",
        87.31483776,
        "Top",
    ),
    mc(
        "TTToSemiLeptonic",
        "TTToSemiLeptonic_TuneCP5_13TeV-powheg-pythia8",
        364.35,
        "Top",
    ),
    mc(
        "TTToHadronic",
        "TTToHadronic_TuneCP5_13TeV-powheg-pythia8",
        380.11,
        "Top",
    ),
    mc(
        "WWTo2L2Nu",
        "WWTo2L2Nu_TuneCP5_13TeV-powheg-pythia8",
        12.6,
        "Diboson",
    ),
    mc(
        "WZTo3LNu",
        "WZTo3LNu_TuneCP5_13TeV-amcatnloFXFX-pythia8",
        4.430,
        "Diboson",
    ),
    mc(
        "ZZ",
        "ZZ_TuneCP5_13TeV-pythia8",
        16.523,
        "Diboson",
    ),
];

pub const ZPROCS_LOWPU: [&str; 3] = ["Zmumu", "Zee", "Ztautau"];

pub const WPROCS_LOWPU: [&str; 6] = [
    "Wplusmunu",
    "Wminusmunu",
    "Wplusenu",
    "Wminusenu",
    "Wplustaunu",
    "Wminustaunu",
];

/// Whether `name` is a single vector-boson sample, which carries generator weights for
/// theory variations.
pub fn is_vproc(name: &str) -> bool {
    ZPROCS_LOWPU.contains(&name) || WPROCS_LOWPU.contains(&name)
}

/// The data sample recorded with the other flavor's trigger.
fn other_flavor_data(flavor: Flavor) -> &'static str {
    match flavor {
        Flavor::Mumu => "singleelectron",
        Flavor::Ee => "singlemuon",
    }
}

/// Discover the low-pileup datasets for `flavor` under `base_path`.
pub fn datasets_lowpu(
    base_path: &str,
    flavor: Flavor,
    options: &DiscoveryOptions,
) -> WremResult<Vec<Dataset>> {
    let specs: Vec<SampleSpec> = SAMPLES_LOWPU
        .iter()
        .filter(|spec| spec.name != other_flavor_data(flavor))
        .copied()
        .collect();
    let datasets = discover(base_path, &specs, options)?;
    for dataset in &datasets {
        info!(dataset = %dataset.name, files = dataset.files.len(), "found dataset");
    }
    Ok(datasets)
}

#[cfg(test)]
mod tests {
    use std::{env, fs};

    use super::*;

    #[test]
    fn test_catalogue() {
        assert!(SAMPLES_LOWPU
            .iter()
            .all(|s| s.kind.is_data() == s.xsec.is_none()));
        assert!(is_vproc("Zmumu"));
        assert!(is_vproc("Wminustaunu"));
        assert!(!is_vproc("TTTo2L2Nu"));
    }

    #[test]
    fn test_datasets_per_flavor() {
        let dir = env::temp_dir().join(format!("wremnants_test_{}", fastrand::u64(..)));
        for spec in [&SAMPLES_LOWPU[0], &SAMPLES_LOWPU[1], &SAMPLES_LOWPU[2]] {
            let sample = dir.join(spec.path);
            fs::create_dir_all(&sample).unwrap();
            fs::write(sample.join("nano_1.parquet"), b"").unwrap();
        }
        let base = dir.to_str().unwrap();
        let names = |flavor| -> Vec<String> {
            datasets_lowpu(base, flavor, &DiscoveryOptions::new())
                .unwrap()
                .into_iter()
                .map(|d| d.name)
                .collect()
        };
        assert_eq!(names(Flavor::Mumu), vec!["singlemuon", "Zmumu"]);
        assert_eq!(names(Flavor::Ee), vec!["singleelectron", "Zmumu"]);
        fs::remove_dir_all(dir).unwrap();
    }
}
