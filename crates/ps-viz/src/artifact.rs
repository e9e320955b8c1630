//! Stacked-plot artifact (numbers-first).

#![allow(missing_docs)]

use std::time::{SystemTime, UNIX_EPOCH};

use ps_core::{AsymmetricBand, ErrorModel, Histogram, Kind, Result};
use serde::Serialize;

use crate::combiner::SourceBand;
use crate::evaluation::PlotOutcome;
use crate::ratio::RatioPoint;
use crate::stack::Stack;
use crate::summary::{SummaryItem, SummaryTotals};

/// Artifact schema identifier.
pub const SCHEMA_VERSION: &str = "plotstack_stacked_v0";

#[derive(Debug, Clone, Serialize)]
pub struct StackedPlotArtifact {
    pub schema_version: String,
    pub meta: ArtifactMeta,
    pub plot: String,
    pub bin_edges: Vec<f64>,
    pub stacks: Vec<StackArtifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<DataArtifact>,
    pub signals: Vec<SeriesArtifact>,
    pub ratio: Vec<RatioPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ratio_stat_band: Option<BandEnvelope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ratio_syst_band: Option<BandEnvelope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extent: Option<ExtentArtifact>,
    pub summary: SummaryArtifact,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactMeta {
    pub tool: String,
    pub tool_version: String,
    pub created_unix_ms: u128,
    pub parity_mode: ParityMode,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParityMode {
    pub threads: usize,
    pub stable_ordering: bool,
}

/// Absolute lower/upper edges of a band.
#[derive(Debug, Clone, Serialize)]
pub struct BandEnvelope {
    pub lo: Vec<f64>,
    pub hi: Vec<f64>,
}

impl BandEnvelope {
    pub fn from_band(band: &AsymmetricBand) -> Self {
        Self {
            lo: (0..band.len()).map(|i| band.lower(i)).collect(),
            hi: (0..band.len()).map(|i| band.upper(i)).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SeriesArtifact {
    pub name: String,
    pub process_ids: Vec<usize>,
    pub y: Vec<f64>,
    pub yerr: Vec<f64>,
}

impl SeriesArtifact {
    fn new(name: &str, process_ids: Vec<usize>, h: &Histogram) -> Self {
        Self {
            name: name.to_string(),
            process_ids,
            y: h.contents().to_vec(),
            yerr: (0..h.n_bins()).map(|i| h.error(i)).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StackArtifact {
    pub index: i64,
    pub entries: Vec<SeriesArtifact>,
    pub total_y: Vec<f64>,
    pub stat_err: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub syst_err: Option<Vec<f64>>,
    pub stat_syst_err: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub band_syst: Option<BandEnvelope>,
    pub band_stat_syst: BandEnvelope,
    pub systematics: Vec<SourceBand>,
}

impl StackArtifact {
    fn new(stack: &Stack, systematics: Vec<SourceBand>) -> Self {
        let errors = |h: &Histogram| (0..h.n_bins()).map(|i| h.error(i)).collect::<Vec<f64>>();
        Self {
            index: stack.index,
            entries: stack
                .entries
                .iter()
                .map(|e| SeriesArtifact::new(&e.label, e.process_ids.clone(), &e.histogram))
                .collect(),
            total_y: stack.stat_only.contents().to_vec(),
            stat_err: errors(&stack.stat_only),
            syst_err: stack.syst_only.as_ref().map(errors),
            stat_syst_err: errors(&stack.stat_and_syst),
            band_syst: stack.syst_only_asym.as_ref().map(BandEnvelope::from_band),
            band_stat_syst: BandEnvelope::from_band(&stack.stat_and_syst_asym),
            systematics,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DataArtifact {
    pub y: Vec<f64>,
    pub yerr_lo: Vec<f64>,
    pub yerr_hi: Vec<f64>,
    pub error_model: ErrorModel,
    pub is_blinded: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtentArtifact {
    pub minimum: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub positive_minimum: Option<f64>,
    pub maximum: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryKindArtifact {
    pub kind: Kind,
    pub items: Vec<SummaryItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub totals: Option<SummaryTotals>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummarySystematicsArtifact {
    pub kind: Kind,
    pub process_id: usize,
    pub items: Vec<SummaryItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryArtifact {
    pub nominal: Vec<SummaryKindArtifact>,
    pub systematics: Vec<SummarySystematicsArtifact>,
}

fn now_unix_ms() -> Result<u128> {
    let d = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| ps_core::Error::Computation(format!("system time error: {}", e)))?;
    Ok(d.as_millis())
}

impl StackedPlotArtifact {
    /// Build the artifact of one evaluated plot.
    pub fn from_outcome(outcome: &PlotOutcome, threads: usize) -> Result<Self> {
        let bin_edges = outcome
            .stacks
            .first()
            .map(|s| &s.stat_only)
            .or(outcome.data.as_ref())
            .or(outcome.signals.first().map(|s| &s.histogram))
            .map(|h| h.bin_edges().to_vec())
            .unwrap_or_default();

        let stacks = outcome
            .stacks
            .iter()
            .map(|s| {
                let systematics = outcome
                    .breakdown
                    .iter()
                    .find(|b| b.index == s.index)
                    .map(|b| b.sources.clone())
                    .unwrap_or_default();
                StackArtifact::new(s, systematics)
            })
            .collect();

        let data = outcome.data.as_ref().map(|d| DataArtifact {
            y: d.contents().to_vec(),
            yerr_lo: (0..d.n_bins()).map(|i| d.error_low(i)).collect(),
            yerr_hi: (0..d.n_bins()).map(|i| d.error_up(i)).collect(),
            error_model: d.error_model(),
            is_blinded: outcome.data_blinded,
        });

        let signals = outcome
            .signals
            .iter()
            .map(|s| SeriesArtifact::new(&s.name, vec![s.process_id], &s.histogram))
            .collect();

        let summary = SummaryArtifact {
            nominal: outcome
                .summary
                .kinds()
                .map(|kind| SummaryKindArtifact {
                    kind,
                    items: outcome.summary.get(kind).to_vec(),
                    totals: outcome.summary.totals(kind),
                })
                .collect(),
            systematics: outcome
                .summary
                .systematic_groups()
                .map(|(kind, process_id, items)| SummarySystematicsArtifact {
                    kind,
                    process_id,
                    items: items.to_vec(),
                })
                .collect(),
        };

        Ok(Self {
            schema_version: SCHEMA_VERSION.to_string(),
            meta: ArtifactMeta {
                tool: "plotstack".to_string(),
                tool_version: ps_core::VERSION.to_string(),
                created_unix_ms: now_unix_ms()?,
                parity_mode: ParityMode { threads: threads.max(1), stable_ordering: true },
            },
            plot: outcome.name.clone(),
            bin_edges,
            stacks,
            data,
            signals,
            ratio: outcome.ratio.clone(),
            ratio_stat_band: outcome.ratio_stat_band.as_ref().map(BandEnvelope::from_band),
            ratio_syst_band: outcome.ratio_syst_band.as_ref().map(BandEnvelope::from_band),
            extent: outcome.extent.map(|e| ExtentArtifact {
                minimum: e.minimum,
                positive_minimum: e.positive_minimum,
                maximum: e.maximum,
            }),
            summary,
        })
    }
}
