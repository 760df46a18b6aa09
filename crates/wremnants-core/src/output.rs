use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{data::expand_path, results::ResultDict, WremError, WremResult};

/// Provenance stored next to the results.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaInfo {
    /// The command line that produced the output.
    pub command: String,
    pub version: String,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    /// Resolved options, rendered as strings.
    pub options: IndexMap<String, String>,
}

impl MetaInfo {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            options: IndexMap::new(),
        }
    }

    pub fn option<S: ToString>(mut self, key: &str, value: S) -> Self {
        self.options.insert(key.to_string(), value.to_string());
        self
    }
}

/// The histogram container written by histogram producers and read by the card tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutput {
    pub meta: MetaInfo,
    pub results: ResultDict,
}

#[derive(Serialize)]
struct AnalysisOutputRef<'a> {
    meta: &'a MetaInfo,
    results: &'a ResultDict,
}

/// Append `postfix` to the stem of `filename`, keeping its extension.
pub fn output_filename(filename: &str, postfix: Option<&str>) -> String {
    match postfix.filter(|p| !p.is_empty()) {
        None => filename.to_string(),
        Some(postfix) => match filename.rsplit_once('.') {
            Some((stem, ext)) => format!("{stem}_{postfix}.{ext}"),
            None => format!("{filename}_{postfix}"),
        },
    }
}

/// Serialize `results` into `outfolder/filename`, creating the folder if needed.
pub fn write_analysis_output(
    results: &ResultDict,
    outfolder: &str,
    filename: &str,
    meta: MetaInfo,
) -> WremResult<PathBuf> {
    let folder = expand_path(outfolder)?;
    fs::create_dir_all(&folder)?;
    let path = folder.join(filename);
    let output = AnalysisOutputRef {
        meta: &meta,
        results,
    };
    let mut writer = BufWriter::new(File::create(&path)?);
    bincode::serde::encode_into_std_write(&output, &mut writer, bincode::config::standard())?;
    writer.flush()?;
    info!(path = %path.display(), datasets = results.len(), "wrote analysis output");
    Ok(path)
}

/// Read a container written by [`write_analysis_output`].
pub fn read_analysis_output<P: AsRef<Path>>(path: P) -> WremResult<AnalysisOutput> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|err| {
        WremError::Custom(format!("cannot open \"{}\": {err}", path.display()))
    })?;
    let mut reader = BufReader::new(file);
    Ok(bincode::serde::decode_from_std_read(
        &mut reader,
        bincode::config::standard(),
    )?)
}
