use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use wremnants_core::{Hist, WremError, WremResult};

use crate::{
    datagroups::{Datagroups, GroupKind},
    names::split_direction,
    systematic::{LnNSystematic, Systematic},
};

/// The card template used when none is set with [`CardTool::nominal_template`].
pub const DEFAULT_TEMPLATE: &str = include_str!("../templates/WMass/main.txt");

const NAME_WIDTH: usize = 40;

/// The histograms referenced by a card: `x_<process>` for the nominal prediction, `x_data_obs`
/// for the data and `x_<process>_<variation>` for every written variation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShapeFile {
    pub channel: String,
    pub hists: IndexMap<String, Hist>,
}

impl ShapeFile {
    pub fn read<P: AsRef<Path>>(path: P) -> WremResult<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        Ok(bincode::serde::decode_from_std_read(
            &mut reader,
            bincode::config::standard(),
        )?)
    }

    fn write(&self, path: &Path) -> WremResult<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())?;
        writer.flush()?;
        Ok(())
    }
}

/// Collects systematics over a set of [`Datagroups`] and writes the fit inputs.
#[derive(Debug)]
pub struct CardTool {
    card_path: PathBuf,
    shape_path: PathBuf,
    template: Option<PathBuf>,
    channel: String,
    nominal_name: String,
    datagroups: Datagroups,
    systematics: Vec<Systematic>,
    lnn_systematics: Vec<LnNSystematic>,
}

impl CardTool {
    /// A card written to `card_path`, with the shapes next to it under the same stem.
    pub fn new<P: Into<PathBuf>>(card_path: P, datagroups: Datagroups) -> Self {
        let card_path = card_path.into();
        let shape_path = card_path.with_extension("bin");
        Self {
            card_path,
            shape_path,
            template: None,
            channel: "ch0".to_string(),
            nominal_name: "nominal".to_string(),
            datagroups,
            systematics: Vec::new(),
            lnn_systematics: Vec::new(),
        }
    }

    pub fn nominal_template<P: Into<PathBuf>>(mut self, template: P) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn outfile<P: Into<PathBuf>>(mut self, shape_path: P) -> Self {
        self.shape_path = shape_path.into();
        self
    }

    pub fn channel(mut self, channel: &str) -> Self {
        self.channel = channel.to_string();
        self
    }

    /// Name of the nominal histogram; systematic `X` is read from `<nominal>_X`.
    pub fn nominal_name(mut self, nominal_name: &str) -> Self {
        self.nominal_name = nominal_name.to_string();
        self
    }

    pub fn datagroups(&self) -> &Datagroups {
        &self.datagroups
    }

    pub fn systematics(&self) -> &[Systematic] {
        &self.systematics
    }

    pub fn lnn_systematics(&self) -> &[LnNSystematic] {
        &self.lnn_systematics
    }

    /// The known processes, data included, for which `filter` holds.
    pub fn filtered_processes<F: Fn(&str) -> bool>(&self, filter: F) -> Vec<String> {
        self.datagroups
            .processes()
            .into_iter()
            .filter(|p| filter(p))
            .map(String::from)
            .collect()
    }

    /// The processes entering the fit, in group order.
    pub fn fit_processes(&self) -> Vec<&str> {
        self.datagroups
            .processes()
            .into_iter()
            .filter(|p| {
                self.datagroups
                    .group(p)
                    .is_ok_and(|g| g.kind != GroupKind::Data)
            })
            .collect()
    }

    fn hist_name(&self, name: &str) -> String {
        format!("{}_{name}", self.nominal_name)
    }

    /// Whether `process` has the histogram of systematic `name`.
    pub fn has_systematic_histogram(&self, process: &str, name: &str) -> WremResult<bool> {
        self.datagroups.has_histogram(process, &self.hist_name(name))
    }

    fn check_new_name(&self, name: &str) -> WremResult<()> {
        if self.systematics.iter().any(|s| s.name == name)
            || self.lnn_systematics.iter().any(|s| s.name == name)
        {
            return Err(WremError::DuplicateName {
                category: "systematic".to_string(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn check_processes(&self, name: &str, processes: &[String]) -> WremResult<()> {
        if processes.is_empty() {
            return Err(WremError::EmptyProcessList {
                name: name.to_string(),
            });
        }
        for process in processes {
            if self.datagroups.group(process)?.kind == GroupKind::Data {
                return Err(WremError::NotFitProcess {
                    name: process.clone(),
                    systematic: name.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Register a shape systematic.
    ///
    /// Fails if the name is taken, a process is unknown, is data or lacks the histogram, a
    /// systematic axis does not exist, the remaining axes differ from the nominal ones, or the
    /// number of output names does not match the variations.
    pub fn add_systematic(&mut self, systematic: Systematic) -> WremResult<()> {
        self.check_new_name(&systematic.name)?;
        self.check_processes(&systematic.name, &systematic.processes)?;
        let hist_name = self.hist_name(&systematic.name);
        for process in &systematic.processes {
            if !self.datagroups.has_histogram(process, &hist_name)? {
                return Err(WremError::UnknownHistogram {
                    name: hist_name,
                    process: process.clone(),
                });
            }
        }
        for process in &systematic.processes {
            let hist = self
                .datagroups
                .histogram(process, &hist_name, &self.nominal_name)?;
            let nominal = self
                .datagroups
                .histogram(process, &self.nominal_name, &self.nominal_name)?;
            for axis in &systematic.syst_axes {
                hist.axis(axis)?;
            }
            let remaining = hist
                .axes()
                .iter()
                .filter(|a| !systematic.syst_axes.iter().any(|s| s == a.name()));
            if !remaining.eq(nominal.axes()) {
                return Err(WremError::IncompatibleHistograms {
                    left: format!("{hist_name} ({process})"),
                    right: format!("{} ({process})", self.nominal_name),
                });
            }
        }
        let hist =
            self.datagroups
                .histogram(&systematic.processes[0], &hist_name, &self.nominal_name)?;
        let size = systematic
            .syst_axes
            .iter()
            .map(|axis| hist.axis(axis).map(|a| a.n_bins()))
            .product::<WremResult<usize>>()?;
        let expected = if systematic.mirror { 2 * size } else { size };
        if systematic.out_names.len() != expected {
            return Err(WremError::VariationCountMismatch {
                name: systematic.name.clone(),
                expected,
                actual: systematic.out_names.len(),
            });
        }
        info!(
            systematic = %systematic.name,
            processes = ?systematic.processes,
            variations = expected,
            "added systematic"
        );
        self.systematics.push(systematic);
        Ok(())
    }

    /// Register a log-normal nuisance of constant `size`.
    pub fn add_lnn_systematic<S: AsRef<str>>(
        &mut self,
        name: &str,
        processes: &[S],
        size: f64,
    ) -> WremResult<()> {
        self.check_new_name(name)?;
        let processes: Vec<String> = processes.iter().map(|p| p.as_ref().to_string()).collect();
        self.check_processes(name, &processes)?;
        info!(systematic = name, ?processes, size, "added lnN systematic");
        self.lnn_systematics.push(LnNSystematic {
            name: name.to_string(),
            processes,
            size,
        });
        Ok(())
    }

    /// The nuisances of `systematic`: written output names without their direction.
    fn nuisances(systematic: &Systematic) -> Vec<String> {
        let mut directions: IndexMap<&str, Vec<&str>> = IndexMap::new();
        for name in systematic.out_names.iter().filter(|n| !n.is_empty()) {
            let (nuisance, direction) = split_direction(name).unwrap_or((name, ""));
            directions.entry(nuisance).or_default().push(direction);
        }
        for (nuisance, found) in &directions {
            if !(found.contains(&"Up") && found.contains(&"Down")) {
                warn!(systematic = %systematic.name, nuisance, "variation without a partner");
            }
        }
        directions.keys().map(|n| n.to_string()).collect()
    }

    fn process_cells<F: Fn(&str) -> String>(&self, processes: &[&str], cell: F) -> Vec<String> {
        processes.iter().map(|p| cell(p)).collect()
    }

    fn row(cells: &[String], width: usize) -> String {
        cells
            .iter()
            .map(|c| format!("{c:<width$}"))
            .collect::<String>()
            .trim_end()
            .to_string()
    }

    /// The card text. Identical inputs give identical text.
    pub fn card_text(&self) -> WremResult<String> {
        let template = match &self.template {
            Some(path) => fs::read_to_string(path).map_err(|err| {
                WremError::Custom(format!("cannot read template \"{}\": {err}", path.display()))
            })?,
            None => DEFAULT_TEMPLATE.to_string(),
        };
        let processes = self.fit_processes();
        let width = processes.iter().map(|p| p.len()).max().unwrap_or(0).max(8) + 2;
        let mut signal_index = 0i64;
        let mut background_index = 0i64;
        let indices: Vec<String> = processes
            .iter()
            .map(|p| {
                if self.datagroups.is_signal(p) {
                    signal_index -= 1;
                    (signal_index + 1).to_string()
                } else {
                    background_index += 1;
                    background_index.to_string()
                }
            })
            .collect();
        let shape_file = self
            .shape_path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut card = template
            .replace("OUTPUTFILE", &shape_file)
            .replace("PROCINDICES", &Self::row(&indices, width))
            .replace(
                "PROCESSES",
                &Self::row(&self.process_cells(&processes, |p| p.to_string()), width),
            )
            .replace(
                "RATES",
                &Self::row(&self.process_cells(&processes, |_| "-1".to_string()), width),
            )
            .replace(
                "BINS",
                &Self::row(&self.process_cells(&processes, |_| self.channel.clone()), width),
            )
            .replace("CHANNEL", &self.channel);
        if !card.ends_with('\n') {
            card.push('\n');
        }

        let mut groups: IndexMap<String, IndexSet<String>> = IndexMap::new();
        for systematic in &self.systematics {
            let cells = self.process_cells(&processes, |p| {
                if systematic.processes.iter().any(|s| s == p) {
                    systematic.scale.to_string()
                } else {
                    "-".to_string()
                }
            });
            let cells = Self::row(&cells, width);
            for nuisance in Self::nuisances(systematic) {
                card.push_str(&format!("{nuisance:<NAME_WIDTH$} {:<6} {cells}\n", "shape"));
                if let Some(group) = &systematic.group {
                    if systematic.in_group(&nuisance) {
                        groups.entry(group.clone()).or_default().insert(nuisance);
                    }
                }
            }
        }
        for lnn in &self.lnn_systematics {
            let cells = self.process_cells(&processes, |p| {
                if lnn.processes.iter().any(|s| s == p) {
                    lnn.size.to_string()
                } else {
                    "-".to_string()
                }
            });
            card.push_str(&format!(
                "{:<NAME_WIDTH$} {:<6} {}\n",
                lnn.name,
                "lnN",
                Self::row(&cells, width)
            ));
        }
        for (group, members) in &groups {
            let members: Vec<&str> = members.iter().map(String::as_str).collect();
            card.push_str(&format!("{group} group = {}\n", members.join(" ")));
        }
        Ok(card)
    }

    /// Every histogram referenced by the card.
    pub fn shapes(&self) -> WremResult<ShapeFile> {
        let nominal = &self.nominal_name;
        let mut hists = IndexMap::new();
        if let Some(data) = self.datagroups.data_group() {
            let hist = self.datagroups.histogram(&data.name, nominal, nominal)?;
            hists.insert("x_data_obs".to_string(), hist.renamed("x_data_obs"));
        }
        let mut nominals = IndexMap::new();
        for process in self.fit_processes() {
            let name = format!("x_{process}");
            let hist = self.datagroups.histogram(process, nominal, nominal)?;
            nominals.insert(process.to_string(), hist.clone());
            hists.insert(name.clone(), hist.renamed(&name));
        }
        for systematic in &self.systematics {
            let hist_name = self.hist_name(&systematic.name);
            let axes: Vec<&str> = systematic.syst_axes.iter().map(String::as_str).collect();
            for process in &systematic.processes {
                let Some(nominal_hist) = nominals.get(process) else {
                    continue;
                };
                let hist = self.datagroups.histogram(process, &hist_name, nominal)?;
                let variations = if axes.is_empty() {
                    vec![hist]
                } else {
                    hist.split_axes(&axes)?.into_iter().map(|(_, h)| h).collect()
                };
                let step = if systematic.mirror { 2 } else { 1 };
                for (k, variation) in variations.into_iter().enumerate() {
                    let mut written = vec![(k * step, variation.clone())];
                    if systematic.mirror {
                        written.push((k * step + 1, variation.mirror(nominal_hist)?));
                    }
                    for (i, hist) in written {
                        let out = &systematic.out_names[i];
                        if out.is_empty() {
                            continue;
                        }
                        let name = format!("x_{process}_{out}");
                        hists.insert(name.clone(), hist.renamed(&name));
                    }
                }
                debug!(systematic = %systematic.name, process, "wrote variations");
            }
        }
        Ok(ShapeFile {
            channel: self.channel.clone(),
            hists,
        })
    }

    /// Write the card and its shape file, replacing any previous output.
    pub fn write_output(&self) -> WremResult<()> {
        for path in [&self.card_path, &self.shape_path] {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
        }
        let shapes = self.shapes()?;
        shapes.write(&self.shape_path)?;
        fs::write(&self.card_path, self.card_text()?)?;
        info!(
            card = %self.card_path.display(),
            shapes = %self.shape_path.display(),
            histograms = shapes.hists.len(),
            "wrote card"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::env;

    use approx::assert_relative_eq;
    use wremnants_core::hist::Axis;

    use super::*;
    use crate::{datagroups::tests::results, names::pdf_names};

    fn card_tool(dir: &Path) -> CardTool {
        let groups = Datagroups::wmass_2016(results()).unwrap();
        CardTool::new(dir.join("Wmass.txt"), groups).outfile(dir.join("WMassCombineInput.bin"))
    }

    fn pdf_systematic(card: &CardTool) -> Systematic {
        Systematic::new("pdfTEST")
            .processes(&card.filtered_processes(|p| p.starts_with('W') || p == "Fake"))
            .out_names(pdf_names("TEST", 3))
            .syst_axes(&["tensor_axis_0"])
            .mirror(true)
            .group("pdfTEST")
    }

    /// The test datagroups with a `nominal_<name>` histogram for every W sample, built from its
    /// PDF tensor by `transform`.
    fn with_w_histogram<F: Fn(Hist) -> Hist>(name: &str, transform: F) -> Datagroups {
        let mut results = results();
        for (_, output) in results.iter_mut().filter(|(k, _)| k.starts_with('W')) {
            let hist = output.hists["nominal_pdfTEST"]
                .clone()
                .renamed(&format!("nominal_{name}"));
            let hist = transform(hist);
            output.hists.insert(hist.name().to_string(), hist);
        }
        Datagroups::wmass_2016(results).unwrap()
    }

    fn temp_dir() -> PathBuf {
        env::temp_dir().join(format!("wremnants_test_{}", fastrand::u64(..)))
    }

    #[test]
    fn test_filtered_processes() {
        let card = card_tool(&temp_dir());
        assert_eq!(card.filtered_processes(|p| p == "Fake"), vec!["Fake"]);
        assert_eq!(
            card.filtered_processes(|p| p != "Data"),
            vec!["Wmunu", "Top", "Fake"]
        );
        assert_eq!(card.fit_processes(), vec!["Wmunu", "Top", "Fake"]);
    }

    #[test]
    fn test_add_systematic_validation() {
        let mut card = card_tool(&temp_dir());
        let err = card
            .add_systematic(pdf_systematic(&card).out_names(pdf_names("TEST", 2)))
            .unwrap_err();
        assert!(matches!(
            err,
            WremError::VariationCountMismatch {
                expected: 6,
                actual: 4,
                ..
            }
        ));
        assert!(matches!(
            card.add_systematic(pdf_systematic(&card).processes(&["Zmumu"])),
            Err(WremError::UnknownProcess { .. })
        ));
        assert!(matches!(
            card.add_systematic(pdf_systematic(&card).processes::<&str>(&[])),
            Err(WremError::EmptyProcessList { .. })
        ));
        assert!(matches!(
            card.add_systematic(pdf_systematic(&card).processes(&["Top"])),
            Err(WremError::UnknownHistogram { .. })
        ));
        assert!(matches!(
            card.add_systematic(pdf_systematic(&card).syst_axes(&["pdfMember"])),
            Err(WremError::UnknownAxis { .. })
        ));
        assert!(card.systematics().is_empty());
        card.add_systematic(pdf_systematic(&card)).unwrap();
        assert!(matches!(
            card.add_systematic(pdf_systematic(&card)),
            Err(WremError::DuplicateName { .. })
        ));
        assert!(matches!(
            card.add_lnn_systematic("pdfTEST", &["Top"], 1.06),
            Err(WremError::DuplicateName { .. })
        ));
        assert_eq!(card.systematics().len(), 1);
    }

    #[test]
    fn test_data_is_not_a_fit_process() {
        let mut card = card_tool(&temp_dir());
        assert!(matches!(
            card.add_systematic(pdf_systematic(&card).processes(&["Wmunu", "Data"])),
            Err(WremError::NotFitProcess { .. })
        ));
        assert!(matches!(
            card.add_lnn_systematic("CMS_lumi", &["Data"], 1.02),
            Err(WremError::NotFitProcess { .. })
        ));
        assert!(card.systematics().is_empty());
        assert!(card.lnn_systematics().is_empty());
    }

    #[test]
    fn test_variation_axes_must_match_nominal() {
        let groups = with_w_histogram("etaTEST", |hist| {
            let mut axes = hist.axes().to_vec();
            axes.push(Axis::regular("eta", 2, -2.4, 2.4).unwrap());
            Hist::new(hist.name(), axes).unwrap()
        });
        let mut card = CardTool::new(temp_dir().join("Wmass.txt"), groups);
        let systematic = |mirror: bool| {
            Systematic::new("etaTEST")
                .processes(&["Wmunu"])
                .out_names(pdf_names("TEST", 3))
                .syst_axes(&["tensor_axis_0"])
                .mirror(mirror)
        };
        for mirror in [true, false] {
            let names = if mirror {
                pdf_names("TEST", 3)
            } else {
                pdf_names("TEST", 3).into_iter().step_by(2).collect()
            };
            assert!(matches!(
                card.add_systematic(systematic(mirror).out_names(names)),
                Err(WremError::IncompatibleHistograms { .. })
            ));
        }
        // the extra axis is accepted once it is a systematic axis
        card.add_systematic(
            systematic(true)
                .syst_axes(&["tensor_axis_0", "eta"])
                .out_names(vec![String::new(); 12]),
        )
        .unwrap();
    }

    #[test]
    fn test_groups_accumulate_across_systematics() {
        let groups = with_w_histogram("massTEST", |hist| hist);
        let mut card = CardTool::new(temp_dir().join("Wmass.txt"), groups);
        card.add_systematic(
            Systematic::new("pdfTEST")
                .processes(&["Wmunu"])
                .out_names(pdf_names("TEST", 3))
                .syst_axes(&["tensor_axis_0"])
                .mirror(true)
                .group("massScale")
                .group_filter(|nuisance| nuisance != "pdf2TEST"),
        )
        .unwrap();
        let mass_names = ["", "massShift10MeVUp", "massShift10MeVDown"];
        card.add_systematic(
            Systematic::new("massTEST")
                .processes(&["Wmunu"])
                .out_names(mass_names.iter().map(|n| n.to_string()).collect())
                .syst_axes(&["tensor_axis_0"])
                .group("massScale"),
        )
        .unwrap();

        let text = card.card_text().unwrap();
        let group_lines: Vec<&str> = text.lines().filter(|l| l.contains(" group = ")).collect();
        assert_eq!(group_lines, vec!["massScale group = pdf1TEST massShift10MeV"]);
        // filtered out of the group, but still a nuisance of the card
        assert!(text.lines().any(|l| l.starts_with("pdf2TEST ")));
    }

    #[test]
    fn test_write_output() {
        let dir = temp_dir();
        let mut card = card_tool(&dir);
        card.add_systematic(pdf_systematic(&card)).unwrap();
        let fakes = card.filtered_processes(|p| p == "Fake");
        card.add_lnn_systematic("CMS_Fakes", &fakes, 1.05).unwrap();
        card.add_lnn_systematic("CMS_Top", &["Top"], 1.06).unwrap();
        card.write_output().unwrap();

        let text = fs::read_to_string(dir.join("Wmass.txt")).unwrap();
        assert!(text.contains("shapes * * WMassCombineInput.bin x_$PROCESS x_$PROCESS_$SYSTEMATIC"));
        assert!(text.contains("process      Wmunu     Top       Fake\n"));
        assert!(text.contains("process      0         1         2\n"));
        assert!(text.contains("rate         -1        -1        -1\n"));
        let pdf1 = text.lines().find(|l| l.starts_with("pdf1TEST ")).unwrap();
        assert!(pdf1.ends_with("shape  1         -         1"));
        assert!(!text.contains("pdf0TEST"));
        let fakes = text.lines().find(|l| l.starts_with("CMS_Fakes")).unwrap();
        assert!(fakes.ends_with("lnN    -         -         1.05"));
        assert!(text.contains("pdfTEST group = pdf1TEST pdf2TEST\n"));

        let shapes = ShapeFile::read(dir.join("WMassCombineInput.bin")).unwrap();
        assert_eq!(shapes.hists["x_data_obs"].unrolled(false), vec![100.0, 80.0]);
        assert_eq!(shapes.hists["x_Wmunu"].unrolled(false), vec![60.0, 50.0]);
        assert!(!shapes.hists.contains_key("x_Wmunu_pdf0TESTUp"));
        let up = shapes.hists["x_Wmunu_pdf1TESTUp"].unrolled(false);
        let down = shapes.hists["x_Wmunu_pdf1TESTDown"].unrolled(false);
        assert_relative_eq!(up[0], 66.0, epsilon = 1e-9);
        assert_relative_eq!(up[1], 55.0, epsilon = 1e-9);
        // the mirrored variation is the negated deviation from the nominal
        assert_relative_eq!(down[0] - 60.0, -(up[0] - 60.0), epsilon = 1e-9);
        assert_relative_eq!(down[1] - 50.0, -(up[1] - 50.0), epsilon = 1e-9);
        let fake_up = shapes.hists["x_Fake_pdf2TESTUp"].unrolled(false);
        assert_relative_eq!(fake_up[0], 100.0 - 10.0 - 48.0, epsilon = 1e-9);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_write_output_is_reproducible() {
        let dir = temp_dir();
        let mut card = card_tool(&dir);
        card.add_systematic(pdf_systematic(&card)).unwrap();
        card.add_lnn_systematic("CMS_Top", &["Top"], 1.06).unwrap();
        card.write_output().unwrap();
        let first = fs::read(dir.join("Wmass.txt")).unwrap();
        let first_shapes = fs::read(dir.join("WMassCombineInput.bin")).unwrap();
        card.write_output().unwrap();
        assert_eq!(fs::read(dir.join("Wmass.txt")).unwrap(), first);
        assert_eq!(fs::read(dir.join("WMassCombineInput.bin")).unwrap(), first_shapes);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_custom_template() {
        let dir = temp_dir();
        fs::create_dir_all(&dir).unwrap();
        let template = dir.join("main.txt");
        fs::write(&template, "bin CHANNEL\nprocess PROCESSES").unwrap();
        let card = card_tool(&dir).nominal_template(&template).channel("lowPU");
        let text = card.card_text().unwrap();
        assert!(text.starts_with("bin lowPU\nprocess Wmunu     Top       Fake\n"));
        fs::remove_dir_all(dir).unwrap();
    }
}
