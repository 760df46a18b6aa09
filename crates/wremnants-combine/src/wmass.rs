use tracing::{info, warn};
use wremnants_core::WremResult;

use crate::{
    card_tool::CardTool,
    names::{mass_weight_names, mirror_names, pdf_names, qcd_scale_names, NNPDF31_MEMBERS},
    systematic::Systematic,
};

/// Options of the W-mass card.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct WMassCardOptions {
    /// Split the QCD scale uncertainty into helicity components. Not available yet; the flag is
    /// carried so the card records what was requested.
    pub qcd_by_helicity: bool,
    /// Add the plain μR × μF scale block.
    pub qcd_scale: bool,
}

impl Default for WMassCardOptions {
    fn default() -> Self {
        Self {
            qcd_by_helicity: true,
            qcd_scale: false,
        }
    }
}

/// Keep the processes which have the histogram of `systematic`. Returns `None`, with a warning,
/// if there are none.
fn with_histogram(
    card: &CardTool,
    systematic: &str,
    processes: Vec<String>,
) -> WremResult<Option<Vec<String>>> {
    let mut kept = Vec::with_capacity(processes.len());
    for process in processes {
        if card.has_systematic_histogram(&process, systematic)? {
            kept.push(process);
        } else {
            warn!(systematic, process = %process, "no histogram, process skipped");
        }
    }
    if kept.is_empty() {
        warn!(systematic, "no process has this systematic, skipped");
        return Ok(None);
    }
    Ok(Some(kept))
}

fn is_w(process: &str) -> bool {
    process.starts_with('W')
}

fn is_w_muon(process: &str) -> bool {
    is_w(process) && process.contains("mu")
}

/// Register the systematics of the W-mass fit.
///
/// Shape systematics whose histograms were not produced for any process are skipped with a
/// warning; the constant-size nuisances are always added when their process exists.
pub fn add_wmass_systematics(card: &mut CardTool, options: WMassCardOptions) -> WremResult<()> {
    let processes = card.filtered_processes(|p| is_w(p) || p == "Fake");
    if let Some(processes) = with_histogram(card, "pdfNNPDF31", processes)? {
        card.add_systematic(
            Systematic::new("pdfNNPDF31")
                .processes(&processes)
                .out_names(pdf_names("NNPDF31", NNPDF31_MEMBERS))
                .mirror(true)
                .group("pdfNNPDF31")
                .syst_axes(&["tensor_axis_0"]),
        )?;
    }
    for (name, size) in [("effSystIsoTnP", 2), ("effStatTnP", 624 * 4)] {
        let axes: &[&str] = if size == 2 {
            &["idiptrig-iso"]
        } else {
            &["SF eta", "SF pt", "SF charge", "idiptrig-iso"]
        };
        let processes = card.filtered_processes(|p| p != "Data");
        if let Some(processes) = with_histogram(card, name, processes)? {
            card.add_systematic(
                Systematic::new(name)
                    .processes(&processes)
                    .out_names(mirror_names(&format!("{name}{{i}}"), size))
                    .mirror(true)
                    .group(name)
                    .syst_axes(axes),
            )?;
        }
    }
    if options.qcd_by_helicity {
        info!("QCD scale split by helicity is not available");
    }
    if options.qcd_scale {
        let processes = card.filtered_processes(|p| is_w(p) || p.starts_with("DY"));
        if let Some(processes) = with_histogram(card, "qcdScale", processes)? {
            card.add_systematic(
                Systematic::new("qcdScale")
                    .processes(&processes)
                    .out_names(qcd_scale_names())
                    .group("QCDscale")
                    .syst_axes(&["muRfact", "muFfact"]),
            )?;
        }
    }
    let processes = card.filtered_processes(is_w_muon);
    if let Some(processes) = with_histogram(card, "muonScaleSyst", processes)? {
        // The names run slice-major (b0Up, b0Down, b1Up, ...) while the split is row-major over
        // downUpVar, so e.g. the up variation of slice 1 is written as b0Down. Kept until the
        // axes are reordered to ["scaleEtaSlice", "downUpVar"] in the producer.
        card.add_systematic(
            Systematic::new("muonScaleSyst")
                .processes(&processes)
                .out_names(mirror_names("muonScale4Bins1em4", 4))
                .group("massScale")
                .syst_axes(&["downUpVar", "scaleEtaSlice"])
                .scale(0.5),
        )?;
    }
    let processes = card.filtered_processes(is_w_muon);
    if let Some(processes) = with_histogram(card, "massWeight", processes)? {
        card.add_systematic(
            Systematic::new("massWeight")
                .processes(&processes)
                .out_names(mass_weight_names(&["massShift100MeV"]))
                .group("massShift")
                .group_filter(|n| n == "massShift100MeV")
                .syst_axes(&["tensor_axis_0"]),
        )?;
    }
    for (name, process, size) in [
        ("CMS_Fakes", "Fake", 1.05),
        ("CMS_Top", "Top", 1.06),
        ("CMS_VV", "Diboson", 1.16),
    ] {
        let processes = card.filtered_processes(|p| p == process);
        if processes.is_empty() {
            warn!(systematic = name, process, "process not present, skipped");
            continue;
        }
        card.add_lnn_systematic(name, &processes, size)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::env;

    use indexmap::IndexMap;
    use wremnants_core::{hist::Axis, Dataset, DatasetOutput, Hist, ResultDict, SampleKind};

    use super::*;
    use crate::datagroups::Datagroups;

    fn hist(name: &str, tensor: Option<usize>) -> Hist {
        let mut axes = vec![Axis::regular("charge", 2, -2.0, 2.0).unwrap().without_flow()];
        if let Some(n) = tensor {
            axes.push(
                Axis::integer("tensor_axis_0", 0, n as i64)
                    .unwrap()
                    .without_flow(),
            );
        }
        let mut hist = Hist::new(name, axes).unwrap();
        let weights = vec![1.0; tensor.unwrap_or(1)];
        hist.fill_tensor(&[1.0], &weights).unwrap();
        hist
    }

    fn output(dataset: Dataset, hists: Vec<Hist>) -> DatasetOutput {
        DatasetOutput {
            dataset,
            hists: hists
                .into_iter()
                .map(|h| (h.name().to_string(), h))
                .collect(),
            counts: IndexMap::new(),
            weightsum: 1.0,
            event_count: 1,
            cutflow: Vec::new(),
            scale: None,
        }
    }

    #[test]
    fn test_wmass_systematics() {
        let mut results = ResultDict::new();
        results.insert(
            "singlemuon".to_string(),
            output(
                Dataset::new("singlemuon", SampleKind::Data),
                vec![hist("nominal", None)],
            ),
        );
        results.insert(
            "Wmunu".to_string(),
            output(
                Dataset::new("Wmunu", SampleKind::Simulation),
                vec![
                    hist("nominal", None),
                    hist("nominal_pdfNNPDF31", Some(NNPDF31_MEMBERS)),
                    hist("nominal_massWeight", Some(21)),
                ],
            ),
        );
        results.insert(
            "Top".to_string(),
            output(
                Dataset::new("Top", SampleKind::Simulation),
                vec![hist("nominal", None)],
            ),
        );
        let groups = Datagroups::wmass_2016(results).unwrap();
        let dir = env::temp_dir().join(format!("wremnants_test_{}", fastrand::u64(..)));
        let mut card = CardTool::new(dir.join("Wmass.txt"), groups);
        add_wmass_systematics(&mut card, WMassCardOptions::default()).unwrap();

        let names: Vec<&str> = card.systematics().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["pdfNNPDF31", "massWeight"]);
        assert_eq!(card.systematics()[0].processes, vec!["Wmunu", "Fake"]);
        let lnn: Vec<&str> = card
            .lnn_systematics()
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(lnn, vec!["CMS_Fakes", "CMS_Top"]);
        assert_eq!(card.lnn_systematics()[0].processes, vec!["Fake"]);

        let text = card.card_text().unwrap();
        assert!(text.contains("massShift group = massShift100MeV\n"));
        assert!(!text.contains("massShift50MeV"));
        assert!(text.lines().any(|l| l.starts_with("pdf102NNPDF31 ")));
    }
}
