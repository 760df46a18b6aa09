use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use crate::utils::enums::SampleKind;
use crate::{WremError, WremResult};

/// Parquet readers and writers for [`Frame`](crate::column::Frame)s.
pub mod io;

pub use io::ParquetSource;

/// One physics sample: its files and the numbers needed to normalise it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    pub kind: SampleKind,
    pub files: Vec<PathBuf>,
    /// Cross section in pb (simulation only).
    pub xsec: Option<f64>,
    /// Integrated luminosity in pb⁻¹ (data only).
    pub lumi: Option<f64>,
    /// The process group this sample is merged into.
    pub group: String,
    /// Whether this is the out-of-acceptance copy of a signal sample.
    pub out_of_acceptance: bool,
}

impl Dataset {
    pub fn new(name: &str, kind: SampleKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            files: Vec::new(),
            xsec: None,
            lumi: None,
            group: name.to_string(),
            out_of_acceptance: false,
        }
    }

    pub fn files(mut self, files: Vec<PathBuf>) -> Self {
        self.files = files;
        self
    }

    pub fn xsec(mut self, xsec: f64) -> Self {
        self.xsec = Some(xsec);
        self
    }

    pub fn lumi(mut self, lumi: f64) -> Self {
        self.lumi = Some(lumi);
        self
    }

    pub fn group(mut self, group: &str) -> Self {
        self.group = group.to_string();
        self
    }

    pub fn is_data(&self) -> bool {
        self.kind.is_data()
    }

    /// The key this dataset's results are stored under. Out-of-acceptance copies are renamed to a
    /// background label so they never merge into the signal process.
    pub fn output_name(&self) -> String {
        if self.out_of_acceptance {
            format!("Bkg{}", self.name)
        } else {
            self.name.clone()
        }
    }

    /// A copy of this dataset flagged as out of acceptance.
    pub fn out_of_acceptance_copy(&self) -> Self {
        let mut copy = self.clone();
        copy.out_of_acceptance = true;
        copy.group = format!("Bkg{}", self.group);
        copy
    }
}

/// A static catalogue entry from which a [`Dataset`] is discovered.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SampleSpec {
    pub name: &'static str,
    /// Directory holding the sample's Parquet files, relative to the data path.
    pub path: &'static str,
    pub kind: SampleKind,
    pub xsec: Option<f64>,
    pub lumi: Option<f64>,
    pub group: &'static str,
}

/// Options controlling [`discover`].
#[derive(Clone, Debug, Default)]
pub struct DiscoveryOptions {
    pub max_files: Option<usize>,
    /// If non-empty, keep only samples whose name or group is listed.
    pub filter: Vec<String>,
    /// Drop samples whose name or group is listed.
    pub exclude: Vec<String>,
}

impl DiscoveryOptions {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn max_files(mut self, max_files: usize) -> Self {
        self.max_files = Some(max_files);
        self
    }
    pub fn filter<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.filter = names.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }
    pub fn exclude<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.exclude = names.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    fn selects(&self, spec: &SampleSpec) -> bool {
        let listed = |list: &[String]| list.iter().any(|s| s == spec.name || s == spec.group);
        (self.filter.is_empty() || listed(&self.filter)) && !listed(&self.exclude)
    }
}

/// Expand `~` and environment variables in `path`.
pub fn expand_path(path: &str) -> WremResult<PathBuf> {
    Ok(PathBuf::from(&*shellexpand::full(path)?))
}

fn list_parquet_files(dir: &Path) -> WremResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "parquet") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Find the files of every selected sample under `base_path`.
///
/// Samples whose directory is missing or empty are skipped with a warning.
pub fn discover(
    base_path: &str,
    specs: &[SampleSpec],
    options: &DiscoveryOptions,
) -> WremResult<Vec<Dataset>> {
    let base = expand_path(base_path)?;
    let mut datasets = Vec::new();
    for spec in specs.iter().filter(|spec| options.selects(spec)) {
        let dir = base.join(spec.path);
        let mut files = if dir.is_dir() {
            list_parquet_files(&dir)?
        } else {
            Vec::new()
        };
        if files.is_empty() {
            warn!(sample = spec.name, path = %dir.display(), "no input files found, skipping");
            continue;
        }
        if let Some(max_files) = options.max_files {
            files.truncate(max_files);
        }
        debug!(sample = spec.name, n_files = files.len(), "discovered sample");
        let mut dataset = Dataset::new(spec.name, spec.kind)
            .files(files)
            .group(spec.group);
        dataset.xsec = spec.xsec;
        dataset.lumi = spec.lumi;
        if !dataset.is_data() && dataset.xsec.is_none() {
            return Err(WremError::Custom(format!(
                "simulated sample \"{}\" has no cross section",
                spec.name
            )));
        }
        datasets.push(dataset);
    }
    Ok(datasets)
}
