//! Input datasets of one plot evaluation.

use std::sync::Arc;

use ps_core::{Histogram, Kind, Result};
use serde::{Deserialize, Serialize};

use crate::systematics::{ShapeLookup, SystematicSet, SystematicSource};

/// Cross-section normalisation of a simulated process.
///
/// The rescale factor is `cross_section * branching_ratio / generated_events`,
/// times the era luminosity and the process scale unless the plot policy
/// disables them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Normalization {
    /// Cross-section (pb).
    pub cross_section: f64,
    /// Branching ratio.
    pub branching_ratio: f64,
    /// Sum of generated event weights.
    pub generated_events: f64,
    /// Extra per-process scale.
    pub scale: f64,
    /// Data-taking era selecting the luminosity; `None` uses the default era.
    pub era: Option<String>,
}

impl Default for Normalization {
    fn default() -> Self {
        Self { cross_section: 1.0, branching_ratio: 1.0, generated_events: 1.0, scale: 1.0, era: None }
    }
}

/// One input dataset.
#[derive(Debug, Clone)]
pub struct Process {
    /// Stable identifier, unique within an evaluation.
    pub id: usize,
    /// Display name.
    pub name: String,
    /// Role in the plot.
    pub kind: Kind,
    /// Background processes sharing an index are stacked together.
    pub stack_index: i64,
    /// Legend group; members are merged into one stack entry.
    pub group: Option<String>,
    /// Origin path matched by systematic selectors.
    pub origin: String,
    /// Nominal histogram, mutated in place during the evaluation.
    pub histogram: Histogram,
    /// Systematic sets bound to this process (always empty for observed data).
    pub systematics: Vec<SystematicSet>,
    /// Cross-section normalisation; `None` when the histogram is already normalised.
    pub normalization: Option<Normalization>,
}

impl Process {
    /// Create a process with stack index 0, no group and no systematics.
    pub fn new(id: usize, name: impl Into<String>, kind: Kind, histogram: Histogram) -> Self {
        let name = name.into();
        Self {
            id,
            origin: name.clone(),
            name,
            kind,
            stack_index: 0,
            group: None,
            histogram,
            systematics: Vec::new(),
            normalization: None,
        }
    }

    /// Set the stack index.
    pub fn with_stack_index(mut self, index: i64) -> Self {
        self.stack_index = index;
        self
    }

    /// Set the legend group. An empty name means "no group".
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        let group = group.into();
        self.group = if group.is_empty() { None } else { Some(group) };
        self
    }

    /// Set the origin path.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Set the cross-section normalisation.
    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = Some(normalization);
        self
    }

    /// Attach an already built systematic set.
    pub fn with_systematic(mut self, set: SystematicSet) -> Self {
        self.systematics.push(set);
        self
    }

    /// Legend group, if any.
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// Bind every source whose selector matches the origin path.
    ///
    /// Observed data never carries systematics.
    pub fn attach_systematics(
        &mut self,
        sources: &[Arc<SystematicSource>],
        lookup: &dyn ShapeLookup,
    ) {
        if self.kind == Kind::Observed {
            return;
        }
        for source in sources.iter().filter(|s| s.matches(&self.origin)) {
            self.systematics.push(source.new_set(&self.histogram, lookup));
        }
    }

    /// Scale the histogram and rebuild + scale every systematic set.
    pub fn rescale(&mut self, factor: f64) {
        self.histogram.scale(factor);
        for set in &mut self.systematics {
            set.update();
            set.scale(factor);
        }
    }

    /// Rebin the histogram and every systematic shape.
    pub fn rebin(&mut self, factor: usize) -> Result<()> {
        self.histogram.rebin(factor)?;
        for set in &mut self.systematics {
            set.rebin(factor)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systematics::SystematicKind;
    use approx::assert_relative_eq;

    fn hist() -> Histogram {
        Histogram::from_contents("h", vec![0.0, 1.0, 2.0, 3.0, 4.0], vec![1.0, 2.0, 3.0, 4.0], None)
            .unwrap()
    }

    #[test]
    fn test_empty_group_is_no_group() {
        let p = Process::new(0, "ttbar", Kind::Background, hist()).with_group("");
        assert_eq!(p.group(), None);
        let p = p.with_group("top");
        assert_eq!(p.group(), Some("top"));
    }

    #[test]
    fn test_attach_systematics_by_origin() {
        let sources = vec![
            Arc::new(SystematicSource::new("lumi", SystematicKind::Constant { value: 1.02 })),
            Arc::new(
                SystematicSource::new("xs_dy", SystematicKind::Constant { value: 1.1 })
                    .with_selector("DY")
                    .unwrap(),
            ),
        ];
        let mut tt =
            Process::new(0, "ttbar", Kind::Background, hist()).with_origin("files/TTJets.root");
        tt.attach_systematics(&sources, &());
        assert_eq!(tt.systematics.len(), 1);
        assert_eq!(tt.systematics[0].name(), "lumi");

        let mut data = Process::new(1, "data", Kind::Observed, hist()).with_origin("files/DY.root");
        data.attach_systematics(&sources, &());
        assert!(data.systematics.is_empty());
    }

    #[test]
    fn test_rescale_and_rebin_follow_systematics() {
        let sources =
            vec![Arc::new(SystematicSource::new("lumi", SystematicKind::Constant { value: 1.1 }))];
        let mut p = Process::new(0, "ttbar", Kind::Background, hist());
        p.attach_systematics(&sources, &());
        p.rescale(2.0);
        p.rebin(2).unwrap();
        assert_eq!(p.histogram.contents(), &[6.0, 14.0]);
        let (nom, up, down) = p.systematics[0].triplet().unwrap();
        assert_eq!(nom.contents(), &[6.0, 14.0]);
        assert_relative_eq!(up.content(1), 15.4, epsilon = 1e-12);
        assert_relative_eq!(down.content(0), 5.4, epsilon = 1e-12);
    }
}
