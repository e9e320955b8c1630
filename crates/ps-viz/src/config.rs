//! Serde-facing plot policy and request types.
//!
//! A [`PlotRequest`] is the JSON shape accepted by the CLI: one plot policy,
//! the declared systematic sources and the processes with their histograms
//! and alternate shapes.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use ps_core::{Error, ErrorModel, Histogram, Kind, Range, Result};
use serde::{Deserialize, Serialize};

use crate::flows::FlowMode;
use crate::process::{Normalization, Process};
use crate::ratio::RatioMode;
use crate::systematics::{ShapeCatalog, SystematicKind, SystematicSource, Variation};

/// Policy flags of one plot evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotPolicy {
    /// Order stack entries by ascending integral.
    pub sort_by_yields: bool,
    /// Combine systematic sources into the stack bands.
    pub combine_systematics: bool,
    /// Rebin factor (1 = unchanged).
    pub rebin: usize,
    /// Out-of-range content handling.
    pub flow_mode: FlowMode,
    /// Displayed x range.
    pub x_range: Option<Range>,
    /// Ratio error propagation.
    pub ratio_mode: RatioMode,
    /// Relative ratio band shows systematics only instead of stat + syst.
    pub ratio_syst_only: bool,
    /// Scale every distribution to unit area.
    pub normalized: bool,
    /// Data bins inside this range are zeroed unless `unblind` is set.
    pub blinded_range: Option<Range>,
    /// Ignore `blinded_range`.
    pub unblind: bool,
    /// Drop observed data from the plot.
    pub no_data: bool,
    /// Error model of the merged data histogram.
    pub data_error_model: ErrorModel,
    /// Global scale applied to every normalised process.
    pub scale: f64,
    /// Ignore per-process and global scales.
    pub ignore_scales: bool,
    /// Do not multiply by the era luminosity.
    pub no_lumi_rescaling: bool,
    /// Default luminosity (pb^-1).
    pub luminosity: f64,
    /// Luminosity per data-taking era.
    pub luminosity_by_era: BTreeMap<String, f64>,
}

impl Default for PlotPolicy {
    fn default() -> Self {
        Self {
            sort_by_yields: false,
            combine_systematics: true,
            rebin: 1,
            flow_mode: FlowMode::None,
            x_range: None,
            ratio_mode: RatioMode::NumeratorOnly,
            ratio_syst_only: false,
            normalized: false,
            blinded_range: None,
            unblind: false,
            no_data: false,
            data_error_model: ErrorModel::Poisson,
            scale: 1.0,
            ignore_scales: false,
            no_lumi_rescaling: false,
            luminosity: 1.0,
            luminosity_by_era: BTreeMap::new(),
        }
    }
}

impl PlotPolicy {
    /// Set `sort_by_yields`.
    pub fn sort_by_yields(mut self, on: bool) -> Self {
        self.sort_by_yields = on;
        self
    }

    /// Set `combine_systematics`.
    pub fn combine_systematics(mut self, on: bool) -> Self {
        self.combine_systematics = on;
        self
    }

    /// Set the rebin factor.
    pub fn rebin(mut self, factor: usize) -> Self {
        self.rebin = factor;
        self
    }

    /// Set the flow mode.
    pub fn flow_mode(mut self, mode: FlowMode) -> Self {
        self.flow_mode = mode;
        self
    }

    /// Set the displayed x range.
    pub fn x_range(mut self, range: Range) -> Self {
        self.x_range = Some(range);
        self
    }

    /// Set the ratio mode.
    pub fn ratio_mode(mut self, mode: RatioMode) -> Self {
        self.ratio_mode = mode;
        self
    }

    /// Set `normalized`.
    pub fn normalized(mut self, on: bool) -> Self {
        self.normalized = on;
        self
    }

    /// Blind data inside `range`.
    pub fn blinded_range(mut self, range: Range) -> Self {
        self.blinded_range = Some(range);
        self
    }

    /// Set `no_data`.
    pub fn no_data(mut self, on: bool) -> Self {
        self.no_data = on;
        self
    }

    /// Set the default luminosity.
    pub fn luminosity(mut self, lumi: f64) -> Self {
        self.luminosity = lumi;
        self
    }

    /// Add an era luminosity.
    pub fn era_luminosity(mut self, era: impl Into<String>, lumi: f64) -> Self {
        self.luminosity_by_era.insert(era.into(), lumi);
        self
    }

    /// Luminosity of `era`, or the default one for `None`.
    pub fn luminosity_for(&self, era: Option<&str>) -> Result<f64> {
        match era {
            None => Ok(self.luminosity),
            Some(era) => self
                .luminosity_by_era
                .get(era)
                .copied()
                .ok_or_else(|| Error::Validation(format!("no luminosity for era '{era}'"))),
        }
    }

    /// Reject inconsistent settings.
    pub fn validate(&self) -> Result<()> {
        if self.rebin == 0 {
            return Err(Error::Validation("rebin factor must be >= 1".to_string()));
        }
        if !self.scale.is_finite() {
            return Err(Error::Validation(format!("global scale must be finite, got {}", self.scale)));
        }
        if !(self.luminosity.is_finite() && self.luminosity > 0.0) {
            return Err(Error::Validation(format!(
                "luminosity must be finite and > 0, got {}",
                self.luminosity
            )));
        }
        for (era, lumi) in &self.luminosity_by_era {
            if !(lumi.is_finite() && *lumi > 0.0) {
                return Err(Error::Validation(format!("luminosity of era '{era}' must be > 0")));
            }
        }
        for (what, range) in [("x_range", self.x_range), ("blinded_range", self.blinded_range)] {
            if let Some(r) = range
                && !r.is_valid()
            {
                return Err(Error::Validation(format!(
                    "{what} must satisfy start < end, got [{}, {}]",
                    r.start, r.end
                )));
            }
        }
        Ok(())
    }
}

/// Declaration of one systematic source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystematicConfig {
    /// Source name.
    pub name: String,
    /// `const`, `lognormal` (or `ln`) or `shape` (case-insensitive).
    #[serde(rename = "type")]
    pub kind: String,
    /// Scale factor of `const` sources.
    #[serde(default)]
    pub value: Option<f64>,
    /// Prior of `lognormal` sources.
    #[serde(default)]
    pub prior: Option<f64>,
    /// Post-fit pull of `lognormal` sources.
    #[serde(default)]
    pub post_fit: Option<f64>,
    /// Symmetric post-fit error; overridden by the one-sided fields.
    #[serde(default)]
    pub post_fit_error: Option<f64>,
    /// Post-fit upper error.
    #[serde(default)]
    pub post_fit_error_up: Option<f64>,
    /// Post-fit lower error.
    #[serde(default)]
    pub post_fit_error_down: Option<f64>,
    /// Origin-path selector regex.
    #[serde(default)]
    pub on: Option<String>,
    /// Display name.
    #[serde(default)]
    pub pretty_name: Option<String>,
}

impl SystematicConfig {
    /// Build the source described by this declaration.
    pub fn build(&self) -> Result<SystematicSource> {
        let missing = |field: &str| {
            Error::Validation(format!("systematic '{}' requires '{field}'", self.name))
        };
        let kind = match self.kind.to_lowercase().as_str() {
            "const" | "constant" => {
                SystematicKind::Constant { value: self.value.ok_or_else(|| missing("value"))? }
            }
            "lognormal" | "ln" => {
                let prior = self.prior.ok_or_else(|| missing("prior"))?;
                if !(prior.is_finite() && prior > 0.0) {
                    return Err(Error::Validation(format!(
                        "systematic '{}': prior must be > 0, got {prior}",
                        self.name
                    )));
                }
                let err = self.post_fit_error.unwrap_or(1.0);
                SystematicKind::LogNormal {
                    prior,
                    post_fit: self.post_fit.unwrap_or(0.0),
                    post_fit_error_up: self.post_fit_error_up.unwrap_or(err),
                    post_fit_error_down: self.post_fit_error_down.unwrap_or(err),
                }
            }
            "shape" => SystematicKind::Shape,
            other => {
                return Err(Error::Validation(format!(
                    "systematic '{}': unknown type '{other}'",
                    self.name
                )));
            }
        };
        let mut source = SystematicSource::new(self.name.clone(), kind);
        if let Some(on) = &self.on {
            source = source.with_selector(on)?;
        }
        if let Some(pretty) = &self.pretty_name {
            source = source.with_pretty_name(pretty.clone());
        }
        Ok(source)
    }
}

/// Binned histogram as plain arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramConfig {
    /// Bin edges (N + 1).
    pub bin_edges: Vec<f64>,
    /// Bin contents (N).
    pub contents: Vec<f64>,
    /// Sum of squared weights; defaults to `|content|`.
    #[serde(default)]
    pub sumw2: Option<Vec<f64>>,
    /// Underflow content.
    #[serde(default)]
    pub underflow: f64,
    /// Overflow content.
    #[serde(default)]
    pub overflow: f64,
    /// Underflow sum of squared weights.
    #[serde(default)]
    pub underflow_sumw2: f64,
    /// Overflow sum of squared weights.
    #[serde(default)]
    pub overflow_sumw2: f64,
    /// Number of filled entries; defaults to the summed absolute contents.
    #[serde(default)]
    pub entries: Option<f64>,
}

impl HistogramConfig {
    /// Build a named histogram.
    pub fn build(&self, name: impl Into<String>) -> Result<Histogram> {
        let mut h = Histogram::from_contents(
            name,
            self.bin_edges.clone(),
            self.contents.clone(),
            self.sumw2.clone(),
        )?
        .with_flows(self.underflow, self.overflow, self.underflow_sumw2, self.overflow_sumw2);
        if let Some(entries) = self.entries {
            h = h.with_entries(entries);
        }
        Ok(h)
    }
}

/// Alternate shapes of one systematic source for one process.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ShapeConfig {
    /// Up variation.
    #[serde(default)]
    pub up: Option<HistogramConfig>,
    /// Down variation.
    #[serde(default)]
    pub down: Option<HistogramConfig>,
}

/// One input process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Display name.
    pub name: String,
    /// Role in the plot.
    pub kind: Kind,
    /// Nominal histogram.
    pub histogram: HistogramConfig,
    /// Stack index of background processes.
    #[serde(default)]
    pub stack_index: i64,
    /// Legend group.
    #[serde(default)]
    pub group: Option<String>,
    /// Origin path; defaults to the name.
    #[serde(default)]
    pub origin: Option<String>,
    /// Cross-section normalisation.
    #[serde(default)]
    pub normalization: Option<Normalization>,
    /// Alternate shapes keyed by systematic name.
    #[serde(default)]
    pub shapes: BTreeMap<String, ShapeConfig>,
}

impl ProcessConfig {
    fn shape_catalog(&self) -> Result<ShapeCatalog> {
        let mut catalog = ShapeCatalog::new();
        for (syst, shape) in &self.shapes {
            for (variation, h) in [(Variation::Up, &shape.up), (Variation::Down, &shape.down)] {
                if let Some(h) = h {
                    let suffix = if variation == Variation::Up { "up" } else { "down" };
                    let hist = h.build(format!("{}_{syst}_{suffix}", self.name))?;
                    catalog.insert(syst.clone(), variation, hist);
                }
            }
        }
        Ok(catalog)
    }

    /// Build the process `id` and bind the matching sources.
    pub fn build(&self, id: usize, sources: &[Arc<SystematicSource>]) -> Result<Process> {
        let mut p =
            Process::new(id, self.name.clone(), self.kind, self.histogram.build(self.name.clone())?)
                .with_stack_index(self.stack_index);
        if let Some(group) = &self.group {
            p = p.with_group(group.clone());
        }
        if let Some(origin) = &self.origin {
            p = p.with_origin(origin.clone());
        }
        if let Some(norm) = &self.normalization {
            p = p.with_normalization(norm.clone());
        }
        p.attach_systematics(sources, &self.shape_catalog()?);
        Ok(p)
    }
}

/// A complete plot evaluation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotRequest {
    /// Plot name.
    pub name: String,
    /// Evaluation policy.
    #[serde(default)]
    pub policy: PlotPolicy,
    /// Declared systematic sources.
    #[serde(default)]
    pub systematics: Vec<SystematicConfig>,
    /// Input processes; identifiers follow declaration order.
    pub processes: Vec<ProcessConfig>,
}

impl PlotRequest {
    /// Parse a request from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Build the systematic sources; duplicate names are rejected.
    pub fn sources(&self) -> Result<Vec<Arc<SystematicSource>>> {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(self.systematics.len());
        for s in &self.systematics {
            if !seen.insert(s.name.as_str()) {
                return Err(Error::Validation(format!("duplicate systematic '{}'", s.name)));
            }
            out.push(Arc::new(s.build()?));
        }
        Ok(out)
    }

    /// Build every process with its systematic sets.
    pub fn processes(&self) -> Result<Vec<Process>> {
        let sources = self.sources()?;
        self.processes.iter().enumerate().map(|(id, p)| p.build(id, &sources)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const REQUEST: &str = r#"{
        "name": "m_ll",
        "policy": { "sort_by_yields": true, "luminosity_by_era": { "2018": 59.7 } },
        "systematics": [
            { "name": "lumi", "type": "const", "value": 1.025 },
            { "name": "jes", "type": "Shape", "on": "ttbar" }
        ],
        "processes": [
            {
                "name": "ttbar", "kind": "background", "group": "top",
                "origin": "/mc/ttbar.root",
                "histogram": { "bin_edges": [0, 1, 2], "contents": [10, 20] },
                "shapes": {
                    "jes": {
                        "up": { "bin_edges": [0, 1, 2], "contents": [11, 22] },
                        "down": { "bin_edges": [0, 1, 2], "contents": [9, 18] }
                    }
                }
            },
            {
                "name": "data", "kind": "data",
                "histogram": { "bin_edges": [0, 1, 2], "contents": [12, 19] }
            }
        ]
    }"#;

    #[test]
    fn test_policy_defaults() {
        let p: PlotPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(p, PlotPolicy::default());
        assert!(p.combine_systematics);
        assert_eq!(p.rebin, 1);
        assert_eq!(p.ratio_mode, RatioMode::NumeratorOnly);
        assert_eq!(p.data_error_model, ErrorModel::Poisson);
        p.validate().unwrap();
    }

    #[test]
    fn test_policy_builders_and_validation() {
        let p = PlotPolicy::default().sort_by_yields(true).rebin(2).era_luminosity("2017", 41.5);
        assert!(p.sort_by_yields);
        assert_relative_eq!(p.luminosity_for(Some("2017")).unwrap(), 41.5);
        assert_relative_eq!(p.luminosity_for(None).unwrap(), 1.0);
        assert!(p.luminosity_for(Some("2016")).is_err());

        assert!(PlotPolicy::default().rebin(0).validate().is_err());
        assert!(PlotPolicy::default().x_range(Range::new(2.0, 1.0)).validate().is_err());
        assert!(PlotPolicy::default().luminosity(0.0).validate().is_err());
    }

    #[test]
    fn test_systematic_config_kinds() {
        let parse = |json: &str| serde_json::from_str::<SystematicConfig>(json).unwrap().build();

        let c = parse(r#"{"name": "xs", "type": "CONST", "value": 1.1}"#).unwrap();
        assert_eq!(c.kind, SystematicKind::Constant { value: 1.1 });

        let l = parse(r#"{"name": "l", "type": "lognormal", "prior": 1.2, "post_fit_error": 0.5}"#)
            .unwrap();
        assert_eq!(
            l.kind,
            SystematicKind::LogNormal {
                prior: 1.2,
                post_fit: 0.0,
                post_fit_error_up: 0.5,
                post_fit_error_down: 0.5,
            }
        );

        let ln = parse(r#"{"name": "l", "type": "LN", "prior": 1.2}"#).unwrap();
        assert_eq!(ln.kind, SystematicKind::log_normal(1.2));

        assert!(parse(r#"{"name": "x", "type": "const"}"#).is_err());
        assert!(parse(r#"{"name": "x", "type": "lognormal", "prior": -1}"#).is_err());
        assert!(parse(r#"{"name": "x", "type": "weird"}"#).is_err());
        assert!(parse(r#"{"name": "x", "type": "shape", "on": "("}"#).is_err());
    }

    #[test]
    fn test_request_builds_processes() {
        let req = PlotRequest::from_json(REQUEST).unwrap();
        assert!(req.policy.sort_by_yields);
        let processes = req.processes().unwrap();
        assert_eq!(processes.len(), 2);

        let tt = &processes[0];
        assert_eq!(tt.id, 0);
        assert_eq!(tt.group(), Some("top"));
        assert_eq!(tt.systematics.len(), 2);
        let jes = tt.systematics.iter().find(|s| s.name() == "jes").unwrap();
        assert_eq!(jes.up().unwrap().contents(), &[11.0, 22.0]);

        let data = &processes[1];
        assert_eq!(data.kind, Kind::Observed);
        assert!(data.systematics.is_empty());
    }

    #[test]
    fn test_duplicate_systematic_rejected() {
        let mut req = PlotRequest::from_json(REQUEST).unwrap();
        req.systematics[1].name = "lumi".to_string();
        assert!(req.processes().is_err());
    }
}
