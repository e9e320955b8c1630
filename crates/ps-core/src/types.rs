//! Common data types for plotstack

use serde::{Deserialize, Serialize};

/// Role of an input dataset in a plot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// Simulated background, stacked.
    #[serde(alias = "mc")]
    Background,
    /// Simulated signal, drawn on top of the stacks and never stacked.
    Signal,
    /// Observed data.
    #[serde(alias = "data")]
    Observed,
}

impl Kind {
    /// Human readable label used in summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Kind::Background => "MC",
            Kind::Signal => "Signal",
            Kind::Observed => "Data",
        }
    }
}

/// How per-bin upper/lower errors are derived from a histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorModel {
    /// Symmetric `sqrt(sumw2)` errors.
    #[default]
    Normal,
    /// Garwood 68% central interval of a Poisson count (content as the count).
    Poisson,
}
