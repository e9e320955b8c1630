//! Integrated yields and uncertainties collected during one plot evaluation.
//!
//! The collector is append-only: nominal items are keyed by [`Kind`],
//! systematic items by `(Kind, process_id)`. Lookups of absent keys yield an
//! empty slice. Printing and tabulation belong to the consumers.

use std::collections::BTreeMap;

use ps_core::Kind;
use serde::Serialize;

use crate::combiner::Sidedness;

/// Integrated yield of one process, or one systematic contribution to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryItem {
    /// Process or systematic display name.
    pub name: String,
    /// Process identifier.
    pub process_id: usize,
    /// Integrated yield.
    pub events: f64,
    /// Symmetric uncertainty on `events`.
    pub events_uncertainty: f64,
    /// Upward uncertainty on `events`.
    pub events_uncertainty_up: f64,
    /// Downward uncertainty on `events` (signed for systematics).
    pub events_uncertainty_down: f64,
}

impl SummaryItem {
    /// Nominal yield with a symmetric uncertainty.
    pub fn nominal(name: impl Into<String>, process_id: usize, events: f64, uncertainty: f64) -> Self {
        Self {
            name: name.into(),
            process_id,
            events,
            events_uncertainty: uncertainty,
            events_uncertainty_up: uncertainty,
            events_uncertainty_down: uncertainty,
        }
    }

    /// Systematic contribution with resolved sidedness.
    pub fn systematic(
        name: impl Into<String>,
        process_id: usize,
        events: f64,
        sidedness: Sidedness,
    ) -> Self {
        Self {
            name: name.into(),
            process_id,
            events,
            events_uncertainty: sidedness.symmetric(),
            events_uncertainty_up: sidedness.err_up,
            events_uncertainty_down: sidedness.err_down,
        }
    }
}

/// Aggregated numbers for one [`Kind`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryTotals {
    /// Kind the totals refer to.
    pub kind: Kind,
    /// Sum of nominal yields.
    pub events: f64,
    /// Statistical uncertainty (quadrature over processes).
    pub stat_uncertainty: f64,
    /// Per-source uncertainty, summed linearly over processes.
    pub systematics: BTreeMap<String, f64>,
    /// Systematic uncertainty (quadrature over sources).
    pub syst_uncertainty: f64,
    /// Statistical and systematic uncertainty in quadrature.
    pub total_uncertainty: f64,
}

/// Append-only collector of [`SummaryItem`]s.
#[derive(Debug, Clone, Default)]
pub struct Summary {
    items: BTreeMap<Kind, Vec<SummaryItem>>,
    systematics: BTreeMap<(Kind, usize), Vec<SummaryItem>>,
}

impl Summary {
    /// Empty summary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a nominal item.
    pub fn add(&mut self, kind: Kind, item: SummaryItem) {
        self.items.entry(kind).or_default().push(item);
    }

    /// Record a systematic item for one process.
    pub fn add_systematics(&mut self, kind: Kind, process_id: usize, item: SummaryItem) {
        self.systematics.entry((kind, process_id)).or_default().push(item);
    }

    /// Nominal items of `kind`, in insertion order.
    pub fn get(&self, kind: Kind) -> &[SummaryItem] {
        self.items.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Systematic items of one process, in insertion order.
    pub fn get_systematics(&self, kind: Kind, process_id: usize) -> &[SummaryItem] {
        self.systematics.get(&(kind, process_id)).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Kinds with at least one nominal item.
    pub fn kinds(&self) -> impl Iterator<Item = Kind> + '_ {
        self.items.keys().copied()
    }

    /// Every `(kind, process_id, items)` systematic group.
    pub fn systematic_groups(&self) -> impl Iterator<Item = (Kind, usize, &[SummaryItem])> {
        self.systematics.iter().map(|((k, id), items)| (*k, *id, items.as_slice()))
    }

    /// `true` when nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.systematics.is_empty()
    }

    /// Totals for `kind`, or `None` when no nominal item exists.
    ///
    /// Systematics with the same name are correlated between processes, so
    /// their uncertainties are summed linearly before the quadrature sum.
    pub fn totals(&self, kind: Kind) -> Option<SummaryTotals> {
        let nominal = self.get(kind);
        if nominal.is_empty() {
            return None;
        }
        let mut events = 0.0;
        let mut stat_sq = 0.0;
        let mut systematics: BTreeMap<String, f64> = BTreeMap::new();
        for n in nominal {
            events += n.events;
            stat_sq += n.events_uncertainty * n.events_uncertainty;
            for s in self.get_systematics(kind, n.process_id) {
                *systematics.entry(s.name.clone()).or_insert(0.0) += s.events_uncertainty;
            }
        }
        let syst_sq: f64 = systematics.values().map(|v| v * v).sum();
        Some(SummaryTotals {
            kind,
            events,
            stat_uncertainty: stat_sq.sqrt(),
            systematics,
            syst_uncertainty: syst_sq.sqrt(),
            total_uncertainty: (stat_sq + syst_sq).sqrt(),
        })
    }
}
