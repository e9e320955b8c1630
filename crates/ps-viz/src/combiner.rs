//! Combination of systematic sources into per-bin uncertainty bands.
//!
//! Bins of one source are fully correlated, so per-bin deltas of processes
//! sharing a source are summed linearly. Distinct sources are uncorrelated
//! and are combined in quadrature. Only background contributions enter the
//! stack band; signal contributions are still reported per process.

use std::collections::BTreeMap;

use ps_core::{Error, Kind, Result};
use serde::Serialize;

use crate::process::Process;
use crate::stack::Stack;
use crate::summary::SummaryItem;

/// Signed `(up, down)` contribution of one source after resolving sidedness.
///
/// `err_up >= 0` and `err_down <= 0` whenever the deltas point in opposite
/// directions; a one-sided variation leaves the other side at exactly zero.
/// A pure upward shift (`delta_up > 0`, `delta_down == 0`) is the exception:
/// it takes the swap branch and ends up as a positive `err_down`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sidedness {
    /// Upward error.
    pub err_up: f64,
    /// Downward error (signed).
    pub err_down: f64,
}

impl Sidedness {
    /// Symmetrised error `max(|err_up|, |err_down|)`.
    pub fn symmetric(&self) -> f64 {
        self.err_up.abs().max(self.err_down.abs())
    }
}

/// Turn raw `up - nominal` / `down - nominal` deltas into up/down errors.
///
/// - double-sided (`delta_up >= 0 > delta_down`): kept as is;
/// - inverted double-sided: swapped, which also covers `delta_down == 0` with
///   `delta_up > 0` (giving `err_up = 0`, `err_down = delta_up`);
/// - one-sided positive: `err_up = max(deltas)`, `err_down = 0`;
/// - one-sided negative: `err_up = 0`, `err_down = max(deltas)`, i.e. the
///   smaller-magnitude delta.
pub fn resolve_sidedness(delta_up: f64, delta_down: f64) -> Sidedness {
    if delta_up * delta_down <= 0.0 {
        if delta_up >= 0.0 && delta_down < 0.0 {
            Sidedness { err_up: delta_up, err_down: delta_down }
        } else {
            Sidedness { err_up: delta_down, err_down: delta_up }
        }
    } else if delta_up > 0.0 {
        Sidedness { err_up: delta_up.max(delta_down), err_down: 0.0 }
    } else {
        Sidedness { err_up: 0.0, err_down: delta_up.max(delta_down) }
    }
}

/// Per-bin linear sums of one source over every background process.
#[derive(Debug, Clone, Serialize)]
pub struct SourceBand {
    /// Source name.
    pub name: String,
    /// Source display name.
    pub pretty_name: String,
    /// Symmetrised error per bin.
    pub symmetric: Vec<f64>,
    /// Upward error per bin.
    pub up: Vec<f64>,
    /// Downward error per bin (signed).
    pub down: Vec<f64>,
}

impl SourceBand {
    fn new(name: &str, pretty_name: &str, n_bins: usize) -> Self {
        Self {
            name: name.to_string(),
            pretty_name: pretty_name.to_string(),
            symmetric: vec![0.0; n_bins],
            up: vec![0.0; n_bins],
            down: vec![0.0; n_bins],
        }
    }
}

/// Integrated systematic contribution of one (process, source) pair.
#[derive(Debug, Clone)]
pub struct SystematicReport {
    /// Kind of the process.
    pub kind: Kind,
    /// Process identifier.
    pub process_id: usize,
    /// Yield-level uncertainty.
    pub item: SummaryItem,
}

/// Output of [`combine_systematics`] besides the stack bands.
#[derive(Debug, Clone, Default)]
pub struct CombinedSystematics {
    /// Per-source bands, ordered by source name.
    pub sources: Vec<SourceBand>,
    /// Per-(process, source) integrated reports.
    pub reports: Vec<SystematicReport>,
}

fn quadrature(values: impl Iterator<Item = f64>) -> f64 {
    values.map(|v| v * v).sum::<f64>().sqrt()
}

fn contributes(p: &Process, index: i64) -> bool {
    match p.kind {
        Kind::Observed => false,
        Kind::Background => p.stack_index == index && !p.systematics.is_empty(),
        Kind::Signal => !p.systematics.is_empty(),
    }
}

/// Fill the systematic histograms and bands of `stack`.
///
/// Every background process of the stack index and every signal process is
/// visited; sets missing an up or down shape are skipped. Shapes whose
/// binning differs from the stack are a [`Error::ShapeMismatch`].
pub fn combine_systematics(stack: &mut Stack, processes: &[Process]) -> Result<CombinedSystematics> {
    let n_bins = stack.n_bins();
    let mut per_source: BTreeMap<String, SourceBand> = BTreeMap::new();
    let mut reports = Vec::new();

    for p in processes.iter().filter(|p| contributes(p, stack.index)) {
        for set in &p.systematics {
            let Some((nominal, up, down)) = set.triplet() else {
                log::debug!("systematic '{}' incomplete for '{}', skipped", set.name(), p.name);
                continue;
            };
            for shape in [nominal, up, down] {
                stack.stat_only.ensure_same_binning(shape, "systematic combination")?;
            }

            let nominal_yield = nominal.integral();
            let total =
                resolve_sidedness(up.integral() - nominal_yield, down.integral() - nominal_yield);
            reports.push(SystematicReport {
                kind: p.kind,
                process_id: p.id,
                item: SummaryItem::systematic(set.pretty_name(), p.id, nominal_yield, total),
            });

            if p.kind != Kind::Background {
                continue;
            }
            let band = per_source
                .entry(set.name().to_string())
                .or_insert_with(|| SourceBand::new(set.name(), set.pretty_name(), n_bins));
            for i in 0..n_bins {
                let s = resolve_sidedness(
                    up.content(i) - nominal.content(i),
                    down.content(i) - nominal.content(i),
                );
                band.symmetric[i] += s.symmetric();
                band.up[i] += s.err_up;
                band.down[i] += s.err_down;
            }
        }
    }

    stack.prepare_systematics();
    let (Some(syst_only), Some(syst_only_asym)) = (&mut stack.syst_only, &mut stack.syst_only_asym)
    else {
        return Err(Error::Computation("stack systematics were not prepared".to_string()));
    };

    for i in 0..n_bins {
        let syst = quadrature(per_source.values().map(|b| b.symmetric[i]));
        let syst_up = quadrature(per_source.values().map(|b| b.up[i]));
        let syst_down = quadrature(per_source.values().map(|b| b.down[i]));
        let stat = stack.stat_only.error(i);

        syst_only.set_error(i, syst);
        syst_only_asym.err_up[i] = syst_up;
        syst_only_asym.err_low[i] = syst_down;

        stack.stat_and_syst.set_error(i, stat.hypot(syst));
        stack.stat_and_syst_asym.err_up[i] = stat.hypot(syst_up);
        stack.stat_and_syst_asym.err_low[i] = stat.hypot(syst_down);
    }

    log::debug!("stack {}: combined {} systematic sources", stack.index, per_source.len());
    Ok(CombinedSystematics { sources: per_source.into_values().collect(), reports })
}
