use std::path::Path;

use indexmap::IndexMap;
use tracing::{debug, info};
use wremnants_core::{output::read_analysis_output, Hist, ResultDict, WremError, WremResult};

/// How the histograms of a group are obtained.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GroupKind {
    /// Collision data.
    Data,
    /// Simulated prompt-lepton processes.
    Prompt,
    /// Nonprompt background estimated as data minus the prompt processes.
    Fake,
}

/// A process of the fit and the result entries merged into it.
#[derive(Clone, Debug, PartialEq)]
pub struct Group {
    pub name: String,
    pub kind: GroupKind,
    pub members: Vec<String>,
}

/// Process groups over the per-dataset results of a histogram producer.
#[derive(Clone, Debug)]
pub struct Datagroups {
    results: ResultDict,
    groups: IndexMap<String, Group>,
    signal: Vec<String>,
}

impl Datagroups {
    pub fn new(results: ResultDict) -> Self {
        Self {
            results,
            groups: IndexMap::new(),
            signal: Vec::new(),
        }
    }

    /// The groups of the 2016 W-mass analysis over the output stored in `path`.
    pub fn wmass_2016_from_file<P: AsRef<Path>>(path: P) -> WremResult<Self> {
        Self::wmass_2016(read_analysis_output(path)?.results)
    }

    /// The groups of the 2016 W-mass analysis. Groups without any matching result are left out.
    pub fn wmass_2016(results: ResultDict) -> WremResult<Self> {
        let mut groups = Self::new(results);
        groups.add_data_group("Data")?;
        groups.add_group("Wmunu", &["Wmunu", "WplusJetsToMuNu", "WminusJetsToMuNu"])?;
        groups.add_group("Wtaunu", &["Wtaunu", "WplusJetsToTauNu", "WminusJetsToTauNu"])?;
        groups.add_group("Zmumu", &["Zmumu", "DYJetsToMuMu"])?;
        groups.add_group("Ztautau", &["Ztautau", "DYJetsToTauTau"])?;
        groups.add_group("Top", &["Top"])?;
        groups.add_group("Diboson", &["Diboson"])?;
        groups.add_fake_group("Fake")?;
        groups.set_signal(&["Wmunu"]);
        info!(processes = ?groups.processes(), "datagroups");
        Ok(groups)
    }

    fn insert(&mut self, group: Group) -> WremResult<()> {
        if self.groups.contains_key(&group.name) {
            return Err(WremError::DuplicateName {
                category: "process group".to_string(),
                name: group.name,
            });
        }
        self.groups.insert(group.name.clone(), group);
        Ok(())
    }

    /// Add a group of every data entry.
    pub fn add_data_group(&mut self, name: &str) -> WremResult<&mut Self> {
        let members: Vec<String> = self
            .results
            .iter()
            .filter(|(_, r)| r.dataset.is_data())
            .map(|(key, _)| key.clone())
            .collect();
        if members.is_empty() {
            debug!(group = name, "no data entries");
            return Ok(self);
        }
        self.insert(Group {
            name: name.to_string(),
            kind: GroupKind::Data,
            members,
        })?;
        Ok(self)
    }

    /// Add a group of the simulated entries whose name or dataset group is one of `labels`.
    pub fn add_group<S: AsRef<str>>(&mut self, name: &str, labels: &[S]) -> WremResult<&mut Self> {
        let members: Vec<String> = self
            .results
            .iter()
            .filter(|(key, r)| {
                !r.dataset.is_data()
                    && labels
                        .iter()
                        .any(|l| l.as_ref() == key.as_str() || l.as_ref() == r.dataset.group)
            })
            .map(|(key, _)| key.clone())
            .collect();
        if members.is_empty() {
            debug!(group = name, "no matching entries");
            return Ok(self);
        }
        self.insert(Group {
            name: name.to_string(),
            kind: GroupKind::Prompt,
            members,
        })?;
        Ok(self)
    }

    /// Add the data-driven nonprompt group, if there is data to derive it from.
    pub fn add_fake_group(&mut self, name: &str) -> WremResult<&mut Self> {
        if !self.groups.values().any(|g| g.kind == GroupKind::Data) {
            debug!(group = name, "no data to estimate the nonprompt background from");
            return Ok(self);
        }
        self.insert(Group {
            name: name.to_string(),
            kind: GroupKind::Fake,
            members: Vec::new(),
        })?;
        Ok(self)
    }

    pub fn set_signal<S: AsRef<str>>(&mut self, signal: &[S]) {
        self.signal = signal.iter().map(|s| s.as_ref().to_string()).collect();
    }

    pub fn is_signal(&self, process: &str) -> bool {
        self.signal.iter().any(|s| s == process)
    }

    /// Every group name, data included, in registration order.
    pub fn processes(&self) -> Vec<&str> {
        self.groups.keys().map(String::as_str).collect()
    }

    pub fn group(&self, process: &str) -> WremResult<&Group> {
        self.groups
            .get(process)
            .ok_or_else(|| WremError::UnknownProcess {
                name: process.to_string(),
            })
    }

    /// The group holding collision data, if any.
    pub fn data_group(&self) -> Option<&Group> {
        self.groups.values().find(|g| g.kind == GroupKind::Data)
    }

    /// Sum of the members' `name` histograms; `None` if no member has one.
    fn member_sum(&self, group: &Group, name: &str) -> WremResult<Option<Hist>> {
        let mut sum: Option<Hist> = None;
        for hist in group
            .members
            .iter()
            .filter_map(|m| self.results.get(m))
            .filter_map(|r| r.hists.get(name))
        {
            match sum.as_mut() {
                None => sum = Some(hist.clone()),
                Some(acc) => acc.add(hist)?,
            }
        }
        Ok(sum)
    }

    fn prompt_groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values().filter(|g| g.kind == GroupKind::Prompt)
    }

    pub fn has_histogram(&self, process: &str, name: &str) -> WremResult<bool> {
        let group = self.group(process)?;
        Ok(match group.kind {
            GroupKind::Fake => self.prompt_groups().any(|g| {
                g.members
                    .iter()
                    .filter_map(|m| self.results.get(m))
                    .any(|r| r.hists.contains_key(name))
            }),
            _ => group
                .members
                .iter()
                .filter_map(|m| self.results.get(m))
                .any(|r| r.hists.contains_key(name)),
        })
    }

    /// The `name` histogram of `process`.
    ///
    /// For the nonprompt group this is the `nominal` data histogram minus every prompt group's
    /// `name` histogram, falling back to its nominal one when a group lacks the variation. Lower
    /// dimensional histograms are broadcast along the variation axes.
    pub fn histogram(&self, process: &str, name: &str, nominal: &str) -> WremResult<Hist> {
        let group = self.group(process)?;
        let missing = || WremError::UnknownHistogram {
            name: name.to_string(),
            process: process.to_string(),
        };
        if group.kind != GroupKind::Fake {
            return self.member_sum(group, name)?.ok_or_else(missing);
        }
        let data = self
            .data_group()
            .map(|g| self.member_sum(g, nominal))
            .transpose()?
            .flatten()
            .ok_or_else(missing)?;
        let mut prompt = Vec::new();
        for g in self.prompt_groups() {
            let hist = match self.member_sum(g, name)? {
                Some(hist) => hist,
                None => self.member_sum(g, nominal)?.ok_or_else(missing)?,
            };
            prompt.push(hist);
        }
        let shape = prompt
            .iter()
            .max_by_key(|h| h.axes().len())
            .cloned()
            .unwrap_or_else(|| data.clone());
        let mut fake = conform(&data, &shape)?.renamed(name);
        for hist in &prompt {
            fake.subtract(&conform(hist, &shape)?)?;
        }
        Ok(fake)
    }
}

fn conform(hist: &Hist, shape: &Hist) -> WremResult<Hist> {
    if hist.axes().len() == shape.axes().len() {
        Ok(hist.clone())
    } else {
        hist.broadcast_like(shape)
    }
}
