//! Grouping of background processes and assembly of stacks.
//!
//! Background processes sharing a `stack_index` form one [`Stack`]. Members
//! of a legend group are merged into a single entry that takes the place of
//! the first group member encountered; other members are dropped from the
//! entry list. Processes without entries and without group are skipped.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use ps_core::{AsymmetricBand, Histogram, Kind, Plottable, Range, Result};

use crate::process::Process;

/// One drawn layer of a stack.
#[derive(Debug, Clone)]
pub struct StackEntry {
    /// Legend label: group name for merged entries, process name otherwise.
    pub label: String,
    /// Group name for merged entries.
    pub group: Option<String>,
    /// Processes summed into this entry.
    pub process_ids: Vec<usize>,
    /// Entry histogram (owned copy, never aliasing process data).
    pub histogram: Histogram,
}

/// Ordered sum of background histograms plus the derived uncertainty bands.
///
/// Invariant once systematics are combined:
/// `stat_and_syst.error(i)^2 == stat_only.error(i)^2 + syst_only.error(i)^2`.
#[derive(Debug, Clone)]
pub struct Stack {
    /// Stack index shared by every member process.
    pub index: i64,
    /// Entries in drawing order (bottom first).
    pub entries: Vec<StackEntry>,
    /// Total with statistical errors only.
    pub stat_only: Histogram,
    /// Total with combined systematic errors only.
    pub syst_only: Option<Histogram>,
    /// Total with statistical and systematic errors in quadrature.
    pub stat_and_syst: Histogram,
    /// Asymmetric systematic-only band.
    pub syst_only_asym: Option<AsymmetricBand>,
    /// Asymmetric statistical + systematic band.
    pub stat_and_syst_asym: AsymmetricBand,
}

struct GroupAccumulator {
    name: String,
    histogram: Histogram,
    process_ids: Vec<usize>,
}

fn in_stack(p: &Process, index: i64) -> bool {
    p.kind == Kind::Background && p.stack_index == index
}

fn by_yield(a: &StackEntry, b: &StackEntry) -> Ordering {
    a.histogram.integral().partial_cmp(&b.histogram.integral()).unwrap_or(Ordering::Equal)
}

/// Build the stack of background processes with `stack_index == index`.
///
/// Returns `Ok(None)` when nothing contributes ("no background" is a valid
/// state). Group members with different binning are a [`ps_core::Error::ShapeMismatch`].
pub fn build_stack(processes: &[Process], index: i64, sort_by_yields: bool) -> Result<Option<Stack>> {
    let stack_name = format!("mc_stack_{index}");

    let mut groups: Vec<GroupAccumulator> = Vec::new();
    for p in processes.iter().filter(|p| in_stack(p, index) && !p.histogram.is_empty()) {
        let Some(group) = p.group() else { continue };
        match groups.iter_mut().find(|g| g.name == group) {
            Some(g) => {
                g.histogram.add(&p.histogram)?;
                g.process_ids.push(p.id);
            }
            None => {
                let mut histogram = p.histogram.clone();
                histogram.name = format!("group_histo_{group}_{stack_name}");
                groups.push(GroupAccumulator {
                    name: group.to_string(),
                    histogram,
                    process_ids: vec![p.id],
                });
            }
        }
    }

    let mut entries: Vec<StackEntry> = Vec::new();
    for p in processes
        .iter()
        .filter(|p| in_stack(p, index) && !(p.histogram.is_empty() && p.group().is_none()))
    {
        match p.group() {
            Some(group) => {
                // Only the first member encountered carries the merged histogram.
                let Some(pos) = groups.iter().position(|g| g.name == group) else { continue };
                let g = groups.remove(pos);
                entries.push(StackEntry {
                    label: g.name.clone(),
                    group: Some(g.name),
                    process_ids: g.process_ids,
                    histogram: g.histogram,
                });
            }
            None => entries.push(StackEntry {
                label: p.name.clone(),
                group: None,
                process_ids: vec![p.id],
                histogram: p.histogram.clone(),
            }),
        }
    }

    if sort_by_yields {
        entries.sort_by(by_yield);
    }

    let Some((first, rest)) = entries.split_first() else {
        log::debug!("stack {index}: no background contribution");
        return Ok(None);
    };
    let mut stat_only = first.histogram.clone();
    stat_only.name = format!("mc_stat_only_{stack_name}");
    for e in rest {
        stat_only.add(&e.histogram)?;
    }

    let stat_and_syst_asym = AsymmetricBand::from_histogram_errors(&stat_only);
    Ok(Some(Stack {
        index,
        entries,
        stat_and_syst: stat_only.clone(),
        stat_only,
        syst_only: None,
        syst_only_asym: None,
        stat_and_syst_asym,
    }))
}

/// Build one stack per distinct background stack index, in index order.
pub fn build_stacks(processes: &[Process], sort_by_yields: bool) -> Result<Vec<Stack>> {
    let indices: BTreeSet<i64> = processes
        .iter()
        .filter(|p| p.kind == Kind::Background)
        .map(|p| p.stack_index)
        .collect();
    let mut stacks = Vec::with_capacity(indices.len());
    for index in indices {
        if let Some(stack) = build_stack(processes, index, sort_by_yields)? {
            stacks.push(stack);
        }
    }
    Ok(stacks)
}

impl Stack {
    /// Reset the systematic histograms to "no systematic error".
    pub fn prepare_systematics(&mut self) {
        let mut syst_only = self.stat_only.clone();
        syst_only.name = format!("mc_syst_only_mc_stack_{}", self.index);
        syst_only.reset_errors();
        self.syst_only_asym = Some(AsymmetricBand::from_histogram(&syst_only));
        self.syst_only = Some(syst_only);
        self.stat_and_syst = self.stat_only.clone();
        self.stat_and_syst_asym = AsymmetricBand::from_histogram_errors(&self.stat_only);
    }

    /// Scale every entry and the totals; systematic bands are dropped.
    pub fn scale(&mut self, factor: f64) {
        for e in &mut self.entries {
            e.histogram.scale(factor);
        }
        self.stat_only.scale(factor);
        self.stat_and_syst = self.stat_only.clone();
        self.stat_and_syst_asym = AsymmetricBand::from_histogram_errors(&self.stat_only);
        self.syst_only = None;
        self.syst_only_asym = None;
    }

    /// Number of bins of the stack total.
    pub fn n_bins(&self) -> usize {
        self.stat_only.n_bins()
    }

    /// Per-bin cumulative sums, one vector per entry (bottom first).
    pub fn cumulative(&self) -> Vec<Vec<f64>> {
        let mut running = vec![0.0; self.n_bins()];
        self.entries
            .iter()
            .map(|e| {
                for (acc, c) in running.iter_mut().zip(e.histogram.contents()) {
                    *acc += c;
                }
                running.clone()
            })
            .collect()
    }

    /// Largest upper edge of the stat + syst band.
    pub fn maximum_with_errors(&self) -> f64 {
        (0..self.stat_and_syst_asym.len())
            .map(|i| self.stat_and_syst_asym.upper(i))
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

impl Plottable for Stack {
    fn integral(&self) -> f64 {
        self.stat_only.integral()
    }

    fn maximum(&self) -> f64 {
        self.stat_only.maximum()
    }

    fn minimum(&self) -> f64 {
        self.cumulative().iter().flatten().copied().fold(f64::INFINITY, f64::min)
    }

    fn positive_minimum(&self) -> Option<f64> {
        self.cumulative().iter().flatten().copied().filter(|c| *c > 0.0).reduce(f64::min)
    }

    fn bin_range(&self) -> Range {
        self.stat_only.x_range()
    }
}
