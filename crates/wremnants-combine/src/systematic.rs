use std::{
    fmt::{self, Debug},
    sync::Arc,
};

/// Predicate selecting which nuisances of a systematic enter its group.
pub type GroupFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// A shape systematic read from the `<nominal>_<name>` histograms of its processes.
///
/// Every bin combination of the `syst_axes` is one variation, written under the matching entry of
/// `out_names` (row-major over the axes). With `mirror`, each variation is followed by its
/// reflection about the nominal, so twice as many names are needed. Empty names are skipped.
#[derive(Clone)]
pub struct Systematic {
    pub name: String,
    pub processes: Vec<String>,
    pub out_names: Vec<String>,
    pub syst_axes: Vec<String>,
    pub group: Option<String>,
    pub group_filter: Option<GroupFilter>,
    pub mirror: bool,
    pub scale: f64,
}

impl Debug for Systematic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Systematic")
            .field("name", &self.name)
            .field("processes", &self.processes)
            .field("out_names", &self.out_names.len())
            .field("syst_axes", &self.syst_axes)
            .field("group", &self.group)
            .field("group_filter", &self.group_filter.is_some())
            .field("mirror", &self.mirror)
            .field("scale", &self.scale)
            .finish()
    }
}

impl Systematic {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            processes: Vec::new(),
            out_names: Vec::new(),
            syst_axes: Vec::new(),
            group: None,
            group_filter: None,
            mirror: false,
            scale: 1.0,
        }
    }

    pub fn processes<S: AsRef<str>>(mut self, processes: &[S]) -> Self {
        self.processes = processes.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    pub fn out_names(mut self, out_names: Vec<String>) -> Self {
        self.out_names = out_names;
        self
    }

    pub fn syst_axes<S: AsRef<str>>(mut self, syst_axes: &[S]) -> Self {
        self.syst_axes = syst_axes.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    pub fn group(mut self, group: &str) -> Self {
        self.group = Some(group.to_string());
        self
    }

    pub fn group_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.group_filter = Some(Arc::new(filter));
        self
    }

    pub fn mirror(mut self, mirror: bool) -> Self {
        self.mirror = mirror;
        self
    }

    /// Scale of the nuisance written in the card.
    pub fn scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Whether `nuisance` is listed in this systematic's group.
    pub fn in_group(&self, nuisance: &str) -> bool {
        self.group_filter.as_ref().map_or(true, |f| f(nuisance))
    }
}

/// A log-normal nuisance of constant size.
#[derive(Clone, Debug, PartialEq)]
pub struct LnNSystematic {
    pub name: String,
    pub processes: Vec<String>,
    pub size: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let syst = Systematic::new("massWeight")
            .processes(&["Wmunu"])
            .syst_axes(&["tensor_axis_0"])
            .group("massShift")
            .group_filter(|n| n == "massShift100MeV")
            .scale(0.5);
        assert_eq!(syst.processes, vec!["Wmunu"]);
        assert_eq!(syst.group.as_deref(), Some("massShift"));
        assert!(!syst.mirror);
        assert!(syst.in_group("massShift100MeV"));
        assert!(!syst.in_group("massShift50MeV"));
        assert!(Systematic::new("pdf").in_group("anything"));
        assert!(format!("{syst:?}").contains("group_filter: true"));
    }
}
