//! # ps-viz
//!
//! Stacked-plot aggregation engine for plotstack.
//!
//! Per plot evaluation this crate merges grouped background histograms into
//! stacks, combines systematic variations with the statistical uncertainty
//! (asymmetric up/down propagation included), computes the data/prediction
//! ratio and collects integrated yields. Outputs are plain numbers; drawing
//! belongs to the consumers of [`StackedPlotArtifact`].

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Stacked-plot JSON artifact.
pub mod artifact;
/// Systematic combination and sidedness resolution.
pub mod combiner;
/// Plot policy and request configuration.
pub mod config;
/// Per-plot evaluation pipeline.
pub mod evaluation;
/// Under/overflow folding.
pub mod flows;
/// Input processes and normalisation.
pub mod process;
/// Data / prediction ratio.
pub mod ratio;
/// Grouping and stack assembly.
pub mod stack;
/// Yield summary collector.
pub mod summary;
/// Systematic sources and sets.
pub mod systematics;

pub use artifact::StackedPlotArtifact;
pub use combiner::{CombinedSystematics, Sidedness, SourceBand, combine_systematics, resolve_sidedness};
pub use config::{PlotPolicy, PlotRequest, ProcessConfig, SystematicConfig};
pub use evaluation::{PlotEvaluation, PlotExtent, PlotOutcome, evaluate_plots};
pub use flows::{FlowMode, fold_flows};
pub use process::{Normalization, Process};
pub use ratio::{RatioMode, RatioPoint, ratio};
pub use stack::{Stack, StackEntry, build_stack, build_stacks};
pub use summary::{Summary, SummaryItem, SummaryTotals};
pub use systematics::{
    ShapeCatalog, ShapeLookup, SystematicKind, SystematicSet, SystematicSource, Variation,
};
