/// Number of members of the NNPDF3.1 set stored in the histograms, central one included.
pub const NNPDF31_MEMBERS: usize = 103;

const MASS_WEIGHT_CENTRAL: usize = 10;
const N_MASS_WEIGHTS: usize = 21;

fn indexed(base: &str, i: usize) -> String {
    if base.contains("{i}") {
        base.replace("{i}", &i.to_string())
    } else {
        format!("{base}{i}")
    }
}

/// `Up`/`Down` names for `size` variations which are mirrored about the nominal.
///
/// `base` may contain an `{i}` placeholder for the variation index; otherwise the index is
/// appended. Each variation is followed by its reflection, matching the order in which mirrored
/// histograms are written.
pub fn mirror_names(base: &str, size: usize) -> Vec<String> {
    (0..size)
        .flat_map(|i| {
            let name = indexed(base, i);
            [format!("{name}Up"), format!("{name}Down")]
        })
        .collect()
}

/// Mirrored names for the members of a PDF set. The central member is not written.
pub fn pdf_names(pdf: &str, members: usize) -> Vec<String> {
    let mut names = mirror_names(&format!("pdf{{i}}{pdf}"), members);
    names.iter_mut().take(2).for_each(String::clear);
    names
}

/// Names of the 21 Breit–Wigner mass shifts, ±100 MeV in 10 MeV steps.
///
/// With a non-empty `matches`, only names containing one of them are kept; the others are left
/// empty so they are not written.
pub fn mass_weight_names<S: AsRef<str>>(matches: &[S]) -> Vec<String> {
    (0..N_MASS_WEIGHTS)
        .map(|i| {
            let shift = i.abs_diff(MASS_WEIGHT_CENTRAL) * 10;
            let direction = if i < MASS_WEIGHT_CENTRAL { "Down" } else { "Up" };
            format!("massShift{shift}MeV{direction}")
        })
        .map(|name| {
            if matches.is_empty() || matches.iter().any(|m| name.contains(m.as_ref())) {
                name
            } else {
                String::new()
            }
        })
        .collect()
}

/// Names of the μR × μF grid (μR major). The central point and the anti-correlated corners are
/// not written.
pub fn qcd_scale_names() -> Vec<String> {
    [
        "muRmuFDown",
        "muRDown",
        "",
        "muFDown",
        "",
        "muFUp",
        "",
        "muRUp",
        "muRmuFUp",
    ]
    .iter()
    .map(|s| {
        if s.is_empty() {
            String::new()
        } else {
            format!("QCDscale_{s}")
        }
    })
    .collect()
}

/// Split a variation name into its nuisance and direction.
pub fn split_direction(name: &str) -> Option<(&str, &str)> {
    name.strip_suffix("Up")
        .map(|base| (base, "Up"))
        .or_else(|| name.strip_suffix("Down").map(|base| (base, "Down")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirror_names() {
        assert_eq!(
            mirror_names("effSystIsoTnP{i}", 2),
            vec![
                "effSystIsoTnP0Up",
                "effSystIsoTnP0Down",
                "effSystIsoTnP1Up",
                "effSystIsoTnP1Down"
            ]
        );
        assert_eq!(mirror_names("muonScale", 1), vec!["muonScale0Up", "muonScale0Down"]);
        assert_eq!(mirror_names("X", 0).len(), 0);
    }

    #[test]
    fn test_pdf_names_skip_central() {
        let names = pdf_names("NNPDF31", NNPDF31_MEMBERS);
        assert_eq!(names.len(), 2 * NNPDF31_MEMBERS);
        assert_eq!(names[0], "");
        assert_eq!(names[1], "");
        assert_eq!(names[2], "pdf1NNPDF31Up");
        assert_eq!(names[205], "pdf102NNPDF31Down");
    }

    #[test]
    fn test_mass_weight_names() {
        let names = mass_weight_names::<&str>(&[]);
        assert_eq!(names.len(), 21);
        assert_eq!(names[0], "massShift100MeVDown");
        assert_eq!(names[10], "massShift0MeVUp");
        assert_eq!(names[20], "massShift100MeVUp");
        let names = mass_weight_names(&["massShift100MeV"]);
        let kept: Vec<&String> = names.iter().filter(|n| !n.is_empty()).collect();
        assert_eq!(kept, vec!["massShift100MeVDown", "massShift100MeVUp"]);
    }

    #[test]
    fn test_qcd_scale_names() {
        let names = qcd_scale_names();
        assert_eq!(names.len(), 9);
        assert_eq!(names[0], "QCDscale_muRmuFDown");
        assert!(names[4].is_empty());
    }

    #[test]
    fn test_split_direction() {
        assert_eq!(split_direction("pdf1NNPDF31Up"), Some(("pdf1NNPDF31", "Up")));
        assert_eq!(split_direction("massShift100MeVDown"), Some(("massShift100MeV", "Down")));
        assert_eq!(split_direction("lumi"), None);
    }
}
