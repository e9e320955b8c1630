//! Folding of out-of-range content into the edge bins.

use ps_core::{Histogram, Kind, Range};
use serde::{Deserialize, Serialize};

/// What to do with content outside the displayed range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowMode {
    /// Leave under/overflow untouched.
    #[default]
    None,
    /// Fold underflow into the first bin and overflow into the last bin.
    Fold,
    /// Fold only the overflow into the last bin.
    OverflowOnly,
}

/// First and last bin covered by `range`, following axis-zoom semantics:
/// a range ending exactly on a bin's low edge excludes that bin.
pub fn bin_span(h: &Histogram, range: Option<Range>) -> (usize, usize) {
    let n = h.n_bins();
    let Some(r) = range.filter(|r| r.is_valid()) else {
        return (0, n - 1);
    };
    let first = match h.find_bin(r.start) {
        Some(i) if i + 1 < n && h.low_edge(i + 1) <= r.start => i + 1,
        Some(i) => i,
        None if r.start < h.low_edge(0) => 0,
        None => n - 1,
    };
    let last = match h.find_bin(r.end) {
        Some(i) if i > 0 && h.low_edge(i) >= r.end => i - 1,
        Some(i) => i,
        None if r.end < h.low_edge(0) => 0,
        None => n - 1,
    };
    (first, last.max(first))
}

/// Fold out-of-range content of `h` into its first/last displayed bins.
///
/// Errors are combined in quadrature except for observed data, whose
/// errors derive from the content. Histograms without entries are untouched.
pub fn fold_flows(h: &mut Histogram, mode: FlowMode, x_range: Option<Range>, kind: Kind) {
    if mode == FlowMode::None || h.is_empty() {
        return;
    }
    let n = h.n_bins();
    let (first, last) = bin_span(h, x_range);
    let first = if mode == FlowMode::OverflowOnly { 0 } else { first };

    let mut underflow = 0.0;
    let mut underflow_sumw2 = 0.0;
    if mode == FlowMode::Fold {
        underflow = h.underflow();
        underflow_sumw2 = h.underflow_sumw2();
        for i in 0..first {
            underflow += h.content(i);
            underflow_sumw2 += h.sumw2()[i];
        }
    }

    let mut overflow = h.overflow();
    let mut overflow_sumw2 = h.overflow_sumw2();
    for i in last + 1..n {
        overflow += h.content(i);
        overflow_sumw2 += h.sumw2()[i];
    }

    for i in (0..first).chain(last + 1..n) {
        h.set_content(i, 0.0);
        h.set_error(i, 0.0);
    }
    h.clear_flows();

    if mode == FlowMode::Fold {
        let w2 = h.sumw2()[first];
        h.set_content(first, h.content(first) + underflow);
        if kind != Kind::Observed {
            h.set_error(first, (underflow_sumw2 + w2).sqrt());
        }
    }

    let w2 = h.sumw2()[last];
    h.set_content(last, h.content(last) + overflow);
    if kind != Kind::Observed {
        h.set_error(last, (overflow_sumw2 + w2).sqrt());
    }
}
