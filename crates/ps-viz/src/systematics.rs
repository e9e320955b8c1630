//! Systematic sources and the per-process (nominal, up, down) sets they produce.
//!
//! A [`SystematicSource`] is declared once per run. For every process whose
//! origin path matches the source selector, [`SystematicSource::new_set`]
//! creates a [`SystematicSet`] holding pristine copies of the shapes; the
//! working shapes are rebuilt from those copies by [`SystematicSet::update`]
//! and then follow every rescale/rebin/fold applied to the owning histogram.

use std::collections::HashMap;
use std::sync::Arc;

use ps_core::{Error, Histogram, Result};
use regex::Regex;

/// Direction of a systematic variation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variation {
    /// +1 sigma.
    Up,
    /// -1 sigma.
    Down,
}

/// How a source turns a nominal shape into its up/down variations.
#[derive(Debug, Clone, PartialEq)]
pub enum SystematicKind {
    /// Flat rate variation: `up = nominal * value`, `down = nominal * (2 - value)`.
    Constant {
        /// Up scale factor (e.g. 1.05 for 5%).
        value: f64,
    },
    /// Log-normal rate variation, optionally constrained by a fit.
    LogNormal {
        /// Prior scale factor `kappa`.
        prior: f64,
        /// Post-fit pull of the nuisance parameter.
        post_fit: f64,
        /// Post-fit upper error of the nuisance parameter.
        post_fit_error_up: f64,
        /// Post-fit lower error of the nuisance parameter.
        post_fit_error_down: f64,
    },
    /// Alternate shapes supplied by a [`ShapeLookup`].
    Shape,
}

impl SystematicKind {
    /// Log-normal variation with the default pre-fit constraint.
    pub fn log_normal(prior: f64) -> Self {
        SystematicKind::LogNormal {
            prior,
            post_fit: 0.0,
            post_fit_error_up: 1.0,
            post_fit_error_down: 1.0,
        }
    }

    /// Multiplicative `(up, down)` factors for rate-only kinds.
    pub fn scale_factors(&self) -> Option<(f64, f64)> {
        match *self {
            SystematicKind::Constant { value } => Some((value, 2.0 - value)),
            SystematicKind::LogNormal {
                prior,
                post_fit,
                post_fit_error_up,
                post_fit_error_down,
            } => {
                let ln_prior = prior.ln();
                Some((
                    ((post_fit + post_fit_error_up) * ln_prior).exp(),
                    ((post_fit - post_fit_error_down) * ln_prior).exp(),
                ))
            }
            SystematicKind::Shape => None,
        }
    }
}

/// External collaborator resolving alternate shapes for [`SystematicKind::Shape`] sources.
pub trait ShapeLookup {
    /// Varied histogram for `source`, or `None` when it does not exist.
    fn variation(&self, source: &SystematicSource, variation: Variation) -> Option<Histogram>;
}

/// No alternate shapes at all.
impl ShapeLookup for () {
    fn variation(&self, _source: &SystematicSource, _variation: Variation) -> Option<Histogram> {
        None
    }
}

/// In-memory alternate shapes of one process, keyed by source name.
#[derive(Debug, Clone, Default)]
pub struct ShapeCatalog {
    shapes: HashMap<(String, Variation), Histogram>,
}

impl ShapeCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one varied shape.
    pub fn insert(&mut self, source: impl Into<String>, variation: Variation, shape: Histogram) {
        self.shapes.insert((source.into(), variation), shape);
    }

    /// Builder form of [`ShapeCatalog::insert`].
    pub fn with(mut self, source: impl Into<String>, variation: Variation, shape: Histogram) -> Self {
        self.insert(source, variation, shape);
        self
    }

    /// Number of registered shapes.
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    /// `true` when no shape is registered.
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

impl ShapeLookup for ShapeCatalog {
    fn variation(&self, source: &SystematicSource, variation: Variation) -> Option<Histogram> {
        self.shapes.get(&(source.name.clone(), variation)).cloned()
    }
}

/// A named source of correlated up/down variation.
#[derive(Debug, Clone)]
pub struct SystematicSource {
    /// Source name. Sets with the same name are one nuisance across processes.
    pub name: String,
    /// Display name used in summaries.
    pub pretty_name: String,
    /// Variation model.
    pub kind: SystematicKind,
    /// Origin-path selector; `None` applies to every process.
    on: Option<Regex>,
}

impl SystematicSource {
    /// Create a source applying to every process.
    pub fn new(name: impl Into<String>, kind: SystematicKind) -> Self {
        let name = name.into();
        Self { pretty_name: name.clone(), name, kind, on: None }
    }

    /// Restrict the source to processes whose origin matches `pattern`.
    pub fn with_selector(mut self, pattern: &str) -> Result<Self> {
        let re = Regex::new(pattern).map_err(|e| {
            Error::Validation(format!("invalid selector for systematic '{}': {e}", self.name))
        })?;
        self.on = Some(re);
        Ok(self)
    }

    /// Set the display name.
    pub fn with_pretty_name(mut self, pretty_name: impl Into<String>) -> Self {
        self.pretty_name = pretty_name.into();
        self
    }

    /// `true` when the selector finds a match anywhere in `origin`.
    pub fn matches(&self, origin: &str) -> bool {
        self.on.as_ref().is_none_or(|re| re.is_match(origin))
    }

    /// Create the set binding this source to one nominal histogram.
    ///
    /// Rate-only kinds start from copies of the nominal; shape kinds ask
    /// `lookup` for the varied histograms and keep `None` for missing sides.
    pub fn new_set(self: &Arc<Self>, nominal: &Histogram, lookup: &dyn ShapeLookup) -> SystematicSet {
        let (true_up, true_down) = match self.kind {
            SystematicKind::Shape => {
                let up = lookup.variation(self, Variation::Up);
                let down = lookup.variation(self, Variation::Down);
                if up.is_none() || down.is_none() {
                    log::debug!(
                        "systematic '{}': missing {} shape for '{}'",
                        self.name,
                        if up.is_none() { "up" } else { "down" },
                        nominal.name
                    );
                }
                (up, down)
            }
            _ => (Some(nominal.clone()), Some(nominal.clone())),
        };
        let mut set = SystematicSet {
            source: Arc::clone(self),
            true_nominal: nominal.clone(),
            true_up,
            true_down,
            nominal: nominal.clone(),
            up: None,
            down: None,
        };
        set.update();
        set
    }
}

/// The (nominal, up, down) triplet of one (process, source) pair.
#[derive(Debug, Clone)]
pub struct SystematicSet {
    source: Arc<SystematicSource>,
    true_nominal: Histogram,
    true_up: Option<Histogram>,
    true_down: Option<Histogram>,
    nominal: Histogram,
    up: Option<Histogram>,
    down: Option<Histogram>,
}

impl SystematicSet {
    /// Source this set was created from.
    pub fn source(&self) -> &SystematicSource {
        &self.source
    }

    /// Source name.
    pub fn name(&self) -> &str {
        &self.source.name
    }

    /// Source display name.
    pub fn pretty_name(&self) -> &str {
        &self.source.pretty_name
    }

    /// Working nominal shape.
    pub fn nominal(&self) -> &Histogram {
        &self.nominal
    }

    /// Working up shape, if available.
    pub fn up(&self) -> Option<&Histogram> {
        self.up.as_ref()
    }

    /// Working down shape, if available.
    pub fn down(&self) -> Option<&Histogram> {
        self.down.as_ref()
    }

    /// Complete triplet, or `None` when a variation is missing.
    pub fn triplet(&self) -> Option<(&Histogram, &Histogram, &Histogram)> {
        Some((&self.nominal, self.up.as_ref()?, self.down.as_ref()?))
    }

    /// Rebuild the working shapes from the pristine copies.
    pub fn update(&mut self) {
        self.nominal = self.true_nominal.clone();
        self.up = self.true_up.clone();
        self.down = self.true_down.clone();
        if let Some((f_up, f_down)) = self.source.kind.scale_factors() {
            if let Some(up) = &mut self.up {
                up.scale(f_up);
            }
            if let Some(down) = &mut self.down {
                down.scale(f_down);
            }
        }
    }

    /// Every working shape, nominal first.
    pub fn shapes_mut(&mut self) -> impl Iterator<Item = &mut Histogram> {
        std::iter::once(&mut self.nominal).chain(self.up.as_mut()).chain(self.down.as_mut())
    }

    /// Scale every working shape.
    pub fn scale(&mut self, factor: f64) {
        self.shapes_mut().for_each(|h| h.scale(factor));
    }

    /// Rebin every working shape.
    pub fn rebin(&mut self, factor: usize) -> Result<()> {
        for h in self.shapes_mut() {
            h.rebin(factor)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn nominal() -> Histogram {
        Histogram::from_contents("nom", vec![0.0, 1.0, 2.0], vec![10.0, 20.0], None).unwrap()
    }

    #[test]
    fn test_constant_source() {
        let src = Arc::new(SystematicSource::new("lumi", SystematicKind::Constant { value: 1.1 }));
        let set = src.new_set(&nominal(), &());
        let (nom, up, down) = set.triplet().unwrap();
        assert_eq!(nom.contents(), &[10.0, 20.0]);
        assert_relative_eq!(up.content(1), 22.0);
        assert_relative_eq!(down.content(0), 9.0);
    }

    #[test]
    fn test_log_normal_factors() {
        let (up, down) = SystematicKind::log_normal(1.2).scale_factors().unwrap();
        assert_relative_eq!(up, 1.2, epsilon = 1e-12);
        assert_relative_eq!(down, 1.0 / 1.2, epsilon = 1e-12);

        let post = SystematicKind::LogNormal {
            prior: 1.2,
            post_fit: 0.5,
            post_fit_error_up: 0.5,
            post_fit_error_down: 0.5,
        };
        let (up, down) = post.scale_factors().unwrap();
        assert_relative_eq!(up, 1.2, epsilon = 1e-12);
        assert_relative_eq!(down, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_shape_source_lookup() {
        let src = Arc::new(SystematicSource::new("jes", SystematicKind::Shape));
        let up = Histogram::from_contents("up", vec![0.0, 1.0, 2.0], vec![12.0, 21.0], None).unwrap();
        let catalog = ShapeCatalog::new().with("jes", Variation::Up, up);
        let set = src.new_set(&nominal(), &catalog);
        assert!(set.up().is_some());
        assert!(set.down().is_none());
        assert!(set.triplet().is_none());
    }

    #[test]
    fn test_update_restores_pristine_shapes() {
        let src = Arc::new(SystematicSource::new("lumi", SystematicKind::Constant { value: 1.1 }));
        let mut set = src.new_set(&nominal(), &());
        set.scale(2.0);
        assert_relative_eq!(set.nominal().content(0), 20.0);
        assert_relative_eq!(set.up().unwrap().content(0), 22.0);
        set.update();
        assert_relative_eq!(set.nominal().content(0), 10.0);
        assert_relative_eq!(set.up().unwrap().content(0), 11.0);
    }

    #[test]
    fn test_selector() {
        let src = SystematicSource::new("ttbar_xs", SystematicKind::Constant { value: 1.05 })
            .with_selector("TT.*")
            .unwrap();
        assert!(src.matches("/data/TTJets.root"));
        assert!(!src.matches("/data/DY.root"));
        assert!(SystematicSource::new("x", SystematicKind::Shape).matches("anything"));
        assert!(
            SystematicSource::new("x", SystematicKind::Shape).with_selector("(").is_err()
        );
    }
}
