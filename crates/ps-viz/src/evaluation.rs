//! One plot evaluation: normalisation, folding, stacking, systematics, ratio.
//!
//! ```text
//! processes ──► rescale ──► rebin ──► fold flows ──► merge data
//!                                                     │
//!   stacks ◄── build_stacks ◄─────────────────────────┘
//!     │
//!     ├─► normalise / blind
//!     ├─► combine_systematics (per stack)
//!     └─► ratio + relative bands (single stack only)
//! ```
//!
//! The evaluation owns every process for its duration; derived histograms
//! live in the returned [`PlotOutcome`] and nothing is retained across plots.

use std::collections::HashSet;

use ps_core::{AsymmetricBand, Error, Histogram, Kind, Plottable, Result};
use rayon::prelude::*;

use crate::combiner::{SourceBand, combine_systematics};
use crate::config::PlotPolicy;
use crate::flows::fold_flows;
use crate::process::Process;
use crate::ratio::{RatioPoint, ratio, relative_stat_band, relative_syst_band};
use crate::stack::{Stack, build_stacks};
use crate::summary::{Summary, SummaryItem};

/// A signal curve drawn on top of the stacks.
#[derive(Debug, Clone)]
pub struct SignalCurve {
    /// Source process.
    pub process_id: usize,
    /// Display name.
    pub name: String,
    /// Histogram after rescaling and folding.
    pub histogram: Histogram,
}

/// Per-source systematic contributions of one stack.
#[derive(Debug, Clone)]
pub struct StackBreakdown {
    /// Stack index.
    pub index: i64,
    /// Per-source bands, ordered by source name.
    pub sources: Vec<SourceBand>,
}

/// Vertical extent of everything drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotExtent {
    /// Smallest drawn value.
    pub minimum: f64,
    /// Smallest strictly positive value (log-scale floor).
    pub positive_minimum: Option<f64>,
    /// Largest drawn value including uncertainty bands.
    pub maximum: f64,
}

/// Numeric result of one plot evaluation.
#[derive(Debug, Clone)]
pub struct PlotOutcome {
    /// Plot name.
    pub name: String,
    /// Background stacks in index order.
    pub stacks: Vec<Stack>,
    /// Merged observed data.
    pub data: Option<Histogram>,
    /// `true` when data bins were zeroed by blinding.
    pub data_blinded: bool,
    /// Signal curves in process order.
    pub signals: Vec<SignalCurve>,
    /// Per-stack systematic breakdown (empty when not combined).
    pub breakdown: Vec<StackBreakdown>,
    /// Data / prediction points.
    pub ratio: Vec<RatioPoint>,
    /// Relative MC statistical band of the ratio pad.
    pub ratio_stat_band: Option<AsymmetricBand>,
    /// Relative systematic (or stat + syst) band of the ratio pad.
    pub ratio_syst_band: Option<AsymmetricBand>,
    /// Yields and uncertainties.
    pub summary: Summary,
    /// Vertical extent, `None` when nothing is drawn.
    pub extent: Option<PlotExtent>,
}

/// Evaluation context of one plot.
#[derive(Debug, Clone)]
pub struct PlotEvaluation {
    name: String,
    policy: PlotPolicy,
}

impl PlotEvaluation {
    /// Create an evaluation; the policy is validated up front.
    pub fn new(name: impl Into<String>, policy: PlotPolicy) -> Result<Self> {
        policy.validate()?;
        Ok(Self { name: name.into(), policy })
    }

    /// Plot name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluation policy.
    pub fn policy(&self) -> &PlotPolicy {
        &self.policy
    }

    fn rescale_factor(&self, p: &Process) -> Result<Option<f64>> {
        let Some(norm) = &p.normalization else { return Ok(None) };
        if norm.generated_events == 0.0 {
            return Err(Error::Validation(format!(
                "process '{}': generated_events must be non-zero",
                p.name
            )));
        }
        let mut factor = norm.cross_section * norm.branching_ratio / norm.generated_events;
        if !self.policy.no_lumi_rescaling {
            factor *= self.policy.luminosity_for(norm.era.as_deref())?;
        }
        if !self.policy.ignore_scales {
            factor *= self.policy.scale * norm.scale;
        }
        Ok(Some(factor))
    }

    fn merge_data(&self, processes: &[Process]) -> Result<Option<Histogram>> {
        let mut observed = processes.iter().filter(|p| p.kind == Kind::Observed);
        let Some(first) = observed.next() else { return Ok(None) };
        let mut data = first.histogram.clone();
        data.name = format!("data_{}", self.name);
        for p in observed {
            data.add(&p.histogram)?;
        }
        data.set_error_model(self.policy.data_error_model);
        if self.policy.no_data {
            return Ok(None);
        }
        if data.sum_of_weights() == 0.0 {
            log::debug!("plot '{}': data histogram is empty, dropped", self.name);
            return Ok(None);
        }
        Ok(Some(data))
    }

    fn blind(&self, data: &mut Histogram) -> bool {
        let Some(range) = self.policy.blinded_range.filter(|_| !self.policy.unblind) else {
            return false;
        };
        let axis = data.x_range();
        if range.end < axis.start || range.start >= axis.end {
            return false;
        }
        // Every bin touched by the range is hidden, including partial overlaps.
        let last_bin = data.n_bins() - 1;
        let first = data.find_bin(range.start).unwrap_or(0);
        let last = data.find_bin(range.end).unwrap_or(last_bin);
        for i in first..=last {
            data.set_content(i, 0.0);
            data.set_error(i, 0.0);
        }
        true
    }

    /// Run the evaluation over `processes`.
    ///
    /// Process identifiers must be unique. Shape mismatches and missing era
    /// luminosities abort the evaluation.
    pub fn evaluate(&self, mut processes: Vec<Process>) -> Result<PlotOutcome> {
        let mut ids = HashSet::with_capacity(processes.len());
        if let Some(dup) = processes.iter().find(|p| !ids.insert(p.id)) {
            return Err(Error::Validation(format!("duplicate process id {}", dup.id)));
        }
        let policy = &self.policy;

        let mut summary = Summary::new();
        for p in &mut processes {
            if p.kind != Kind::Observed
                && let Some(factor) = self.rescale_factor(p)?
            {
                p.rescale(factor);
            }
            let item = if p.kind == Kind::Observed {
                let events = p.histogram.integral();
                SummaryItem::nominal(p.name.clone(), p.id, events, events.max(0.0).sqrt())
            } else {
                let (events, err) = p.histogram.integral_and_error();
                SummaryItem::nominal(p.name.clone(), p.id, events, err)
            };
            summary.add(p.kind, item);

            if policy.rebin > 1 {
                p.rebin(policy.rebin)?;
            }
            fold_flows(&mut p.histogram, policy.flow_mode, policy.x_range, p.kind);
            for set in &mut p.systematics {
                for shape in set.shapes_mut() {
                    fold_flows(shape, policy.flow_mode, policy.x_range, p.kind);
                }
            }
        }

        let mut data = self.merge_data(&processes)?;
        let mut stacks = build_stacks(&processes, policy.sort_by_yields)?;
        let mut signals: Vec<SignalCurve> = processes
            .iter()
            .filter(|p| p.kind == Kind::Signal)
            .map(|p| SignalCurve {
                process_id: p.id,
                name: p.name.clone(),
                histogram: p.histogram.clone(),
            })
            .collect();

        if policy.normalized {
            if let Some(d) = &mut data {
                let total = d.integral();
                if total != 0.0 {
                    d.set_error_model(ps_core::ErrorModel::Normal);
                    d.scale(1.0 / total);
                }
            }
            for s in &mut signals {
                let total = s.histogram.integral();
                if total != 0.0 {
                    s.histogram.scale(1.0 / total);
                }
            }
            for stack in &mut stacks {
                let total = stack.integral();
                if total != 0.0 {
                    stack.scale(1.0 / total);
                }
            }
        }

        let data_blinded = data.as_mut().is_some_and(|d| self.blind(d));

        let mut breakdown = Vec::new();
        if policy.combine_systematics && !policy.normalized {
            let mut reported: HashSet<(usize, String)> = HashSet::new();
            for stack in &mut stacks {
                let combined = combine_systematics(stack, &processes)?;
                for r in combined.reports {
                    // Signals are visited once per stack.
                    if r.kind == Kind::Signal && !reported.insert((r.process_id, r.item.name.clone()))
                    {
                        continue;
                    }
                    summary.add_systematics(r.kind, r.process_id, r.item);
                }
                breakdown.push(StackBreakdown { index: stack.index, sources: combined.sources });
            }
        }

        let mut ratio_points = Vec::new();
        let mut ratio_stat_band = None;
        let mut ratio_syst_band = None;
        if let Some(d) = &data {
            match stacks.as_slice() {
                [stack] => {
                    ratio_points = ratio(d, &stack.stat_only, policy.ratio_mode)?;
                    ratio_stat_band = Some(relative_stat_band(stack));
                    ratio_syst_band = relative_syst_band(stack, policy.ratio_syst_only);
                }
                [] => log::debug!("plot '{}': no background, ratio disabled", self.name),
                _ => log::warn!(
                    "plot '{}': ratio needs exactly one stack, found {}",
                    self.name,
                    stacks.len()
                ),
            }
        }

        let extent = plot_extent(data.as_ref(), &stacks, &signals);
        log::debug!(
            "plot '{}': {} stack(s), {} signal(s), data={}",
            self.name,
            stacks.len(),
            signals.len(),
            data.is_some()
        );
        Ok(PlotOutcome {
            name: self.name.clone(),
            stacks,
            data,
            data_blinded,
            signals,
            breakdown,
            ratio: ratio_points,
            ratio_stat_band,
            ratio_syst_band,
            summary,
            extent,
        })
    }
}

/// Vertical extent over data, stacks and signals.
pub fn plot_extent(
    data: Option<&Histogram>,
    stacks: &[Stack],
    signals: &[SignalCurve],
) -> Option<PlotExtent> {
    let mut drawn: Vec<&dyn Plottable> = Vec::new();
    drawn.extend(data.map(|d| d as &dyn Plottable));
    drawn.extend(stacks.iter().map(|s| s as &dyn Plottable));
    drawn.extend(signals.iter().map(|s| &s.histogram as &dyn Plottable));
    if drawn.is_empty() {
        return None;
    }

    let minimum = drawn.iter().map(|p| p.minimum()).fold(f64::INFINITY, f64::min);
    let positive_minimum = drawn.iter().filter_map(|p| p.positive_minimum()).reduce(f64::min);
    let mut maximum = drawn.iter().map(|p| p.maximum()).fold(f64::NEG_INFINITY, f64::max);
    for s in stacks {
        maximum = maximum.max(s.maximum_with_errors());
    }
    if let Some(d) = data {
        for i in 0..d.n_bins() {
            maximum = maximum.max(d.content(i) + d.error_up(i));
        }
    }
    Some(PlotExtent { minimum, positive_minimum, maximum })
}

/// Evaluate independent plots in parallel, one plot per task.
pub fn evaluate_plots(jobs: Vec<(PlotEvaluation, Vec<Process>)>) -> Vec<Result<PlotOutcome>> {
    jobs.into_par_iter().map(|(evaluation, processes)| evaluation.evaluate(processes)).collect()
}
