//! Binned one-dimensional histogram.
//!
//! A [`Histogram`] owns its bin edges, per-bin contents and per-bin sum of
//! weights squared (`sumw2`), plus explicit underflow/overflow slots. Every
//! mutating operation works in place; callers clone before mutating when the
//! original per-process data must survive.

use statrs::distribution::{ChiSquared, ContinuousCDF};

use crate::band::Range;
use crate::types::ErrorModel;
use crate::{Error, Result};

/// Relative tolerance used when comparing bin edges of two histograms.
const EDGE_TOLERANCE: f64 = 1e-9;

/// Central 68.27% interval -> alpha = 1 - CL.
const POISSON_ALPHA: f64 = 0.317_310_507_862_914_4;

/// A 1D binned histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// Histogram name.
    pub name: String,
    bin_edges: Vec<f64>,
    bin_content: Vec<f64>,
    sumw2: Vec<f64>,
    underflow: f64,
    overflow: f64,
    underflow_sumw2: f64,
    overflow_sumw2: f64,
    entries: f64,
    error_model: ErrorModel,
    /// Explicit `(up, low)` errors, independent of `sumw2`.
    asymmetric: Option<(Vec<f64>, Vec<f64>)>,
}

fn validate_edges(edges: &[f64]) -> Result<()> {
    if edges.len() < 2 {
        return Err(Error::Validation(format!(
            "histogram needs at least 2 bin edges, got {}",
            edges.len()
        )));
    }
    if edges.iter().any(|e| !e.is_finite()) {
        return Err(Error::Validation("bin edges must be finite".to_string()));
    }
    if edges.windows(2).any(|w| w[1] <= w[0]) {
        return Err(Error::Validation("bin edges must be strictly increasing".to_string()));
    }
    Ok(())
}

fn is_near_integer_nonneg(x: f64) -> Option<u64> {
    if !(x.is_finite() && x >= 0.0) {
        return None;
    }
    let r = x.round();
    // `as u64` saturates from 2^64 on.
    if r >= u64::MAX as f64 {
        return None;
    }
    if (x - r).abs() <= 1e-9 { Some(r as u64) } else { None }
}

/// Garwood central interval `(lo, hi)` half-widths for an observed count `n`.
///
/// `lo = n - 0.5 * chi2_{alpha/2, 2n}` and `hi = 0.5 * chi2_{1-alpha/2, 2(n+1)} - n`.
pub fn garwood_interval(n: u64) -> (f64, f64) {
    let Some(n_next) = n.checked_add(1) else {
        let e = (n as f64).sqrt();
        return (e, e);
    };
    let lo = if n == 0 {
        0.0
    } else {
        ChiSquared::new(2.0 * (n as f64))
            .map(|d| (n as f64) - 0.5 * d.inverse_cdf(POISSON_ALPHA / 2.0))
            .unwrap_or(0.0)
    };
    let hi = ChiSquared::new(2.0 * (n_next as f64))
        .map(|d| 0.5 * d.inverse_cdf(1.0 - POISSON_ALPHA / 2.0) - (n as f64))
        .unwrap_or(0.0);
    (lo, hi)
}

impl Histogram {
    /// Create an empty histogram with the given bin edges.
    pub fn new(name: impl Into<String>, bin_edges: Vec<f64>) -> Result<Self> {
        validate_edges(&bin_edges)?;
        let n = bin_edges.len() - 1;
        Ok(Self {
            name: name.into(),
            bin_edges,
            bin_content: vec![0.0; n],
            sumw2: vec![0.0; n],
            underflow: 0.0,
            overflow: 0.0,
            underflow_sumw2: 0.0,
            overflow_sumw2: 0.0,
            entries: 0.0,
            error_model: ErrorModel::Normal,
            asymmetric: None,
        })
    }

    /// Create an empty histogram with `n_bins` equal-width bins on `[x_min, x_max)`.
    pub fn uniform(name: impl Into<String>, n_bins: usize, x_min: f64, x_max: f64) -> Result<Self> {
        if n_bins == 0 {
            return Err(Error::Validation("histogram needs at least one bin".to_string()));
        }
        let width = (x_max - x_min) / n_bins as f64;
        let edges = (0..=n_bins).map(|i| x_min + width * i as f64).collect();
        Self::new(name, edges)
    }

    /// Build a histogram from bin contents.
    ///
    /// When `sumw2` is `None` the errors follow unweighted counting
    /// (`sumw2 = |content|`). Entries default to the total absolute content.
    pub fn from_contents(
        name: impl Into<String>,
        bin_edges: Vec<f64>,
        bin_content: Vec<f64>,
        sumw2: Option<Vec<f64>>,
    ) -> Result<Self> {
        let mut h = Self::new(name, bin_edges)?;
        if bin_content.len() != h.n_bins() {
            return Err(Error::shape_mismatch("histogram contents", h.n_bins(), bin_content.len()));
        }
        let sumw2 = match sumw2 {
            Some(w) => {
                if w.len() != h.n_bins() {
                    return Err(Error::shape_mismatch("histogram sumw2", h.n_bins(), w.len()));
                }
                w
            }
            None => bin_content.iter().map(|c| c.abs()).collect(),
        };
        h.entries = bin_content.iter().map(|c| c.abs()).sum();
        h.bin_content = bin_content;
        h.sumw2 = sumw2;
        Ok(h)
    }

    /// Set underflow/overflow contents and their sumw2.
    pub fn with_flows(
        mut self,
        underflow: f64,
        overflow: f64,
        underflow_sumw2: f64,
        overflow_sumw2: f64,
    ) -> Self {
        self.entries += underflow.abs() + overflow.abs();
        self.underflow = underflow;
        self.overflow = overflow;
        self.underflow_sumw2 = underflow_sumw2;
        self.overflow_sumw2 = overflow_sumw2;
        self
    }

    /// Override the number of entries.
    pub fn with_entries(mut self, entries: f64) -> Self {
        self.entries = entries;
        self
    }

    /// Select how upper/lower errors are derived.
    pub fn with_error_model(mut self, model: ErrorModel) -> Self {
        self.error_model = model;
        self
    }

    /// Attach explicit asymmetric `(up, low)` errors.
    pub fn with_asymmetric_errors(mut self, up: Vec<f64>, low: Vec<f64>) -> Result<Self> {
        let n = self.n_bins();
        if up.len() != n {
            return Err(Error::shape_mismatch("asymmetric errors (up)", n, up.len()));
        }
        if low.len() != n {
            return Err(Error::shape_mismatch("asymmetric errors (low)", n, low.len()));
        }
        self.asymmetric = Some((up, low));
        Ok(self)
    }

    /// Number of bins (excluding under/overflow).
    pub fn n_bins(&self) -> usize {
        self.bin_content.len()
    }

    /// Bin edges (length = n_bins + 1).
    pub fn bin_edges(&self) -> &[f64] {
        &self.bin_edges
    }

    /// Bin contents (length = n_bins).
    pub fn contents(&self) -> &[f64] {
        &self.bin_content
    }

    /// Sum of weights squared per bin.
    pub fn sumw2(&self) -> &[f64] {
        &self.sumw2
    }

    /// Lower edge of bin `i`.
    pub fn low_edge(&self, i: usize) -> f64 {
        self.bin_edges[i]
    }

    /// Center of bin `i`.
    pub fn center(&self, i: usize) -> f64 {
        0.5 * (self.bin_edges[i] + self.bin_edges[i + 1])
    }

    /// Width of bin `i`.
    pub fn width(&self, i: usize) -> f64 {
        self.bin_edges[i + 1] - self.bin_edges[i]
    }

    /// Content of bin `i`.
    pub fn content(&self, i: usize) -> f64 {
        self.bin_content[i]
    }

    /// Set the content of bin `i`.
    pub fn set_content(&mut self, i: usize, value: f64) {
        self.bin_content[i] = value;
    }

    /// Symmetric error of bin `i`: `sqrt(sumw2)`.
    pub fn error(&self, i: usize) -> f64 {
        self.sumw2[i].max(0.0).sqrt()
    }

    /// Set the symmetric error of bin `i`.
    pub fn set_error(&mut self, i: usize, error: f64) {
        self.sumw2[i] = error * error;
    }

    /// Set every symmetric error to zero.
    pub fn reset_errors(&mut self) {
        self.sumw2.iter_mut().for_each(|w| *w = 0.0);
        self.asymmetric = None;
    }

    /// Error model used by [`Histogram::error_up`] and [`Histogram::error_low`].
    pub fn error_model(&self) -> ErrorModel {
        self.error_model
    }

    /// Change the error model in place.
    pub fn set_error_model(&mut self, model: ErrorModel) {
        self.error_model = model;
    }

    fn poisson_errors(&self, i: usize) -> (f64, f64) {
        let c = self.bin_content[i];
        match is_near_integer_nonneg(c) {
            Some(n) => garwood_interval(n),
            None => {
                let e = if c.is_finite() && c > 0.0 { c.sqrt() } else { 0.0 };
                (e, e)
            }
        }
    }

    /// Upper error of bin `i`.
    pub fn error_up(&self, i: usize) -> f64 {
        if let Some((up, _)) = &self.asymmetric {
            return up[i];
        }
        match self.error_model {
            ErrorModel::Normal => self.error(i),
            ErrorModel::Poisson => self.poisson_errors(i).1,
        }
    }

    /// Lower error of bin `i`.
    pub fn error_low(&self, i: usize) -> f64 {
        if let Some((_, low)) = &self.asymmetric {
            return low[i];
        }
        match self.error_model {
            ErrorModel::Normal => self.error(i),
            ErrorModel::Poisson => self.poisson_errors(i).0,
        }
    }

    /// Underflow content.
    pub fn underflow(&self) -> f64 {
        self.underflow
    }

    /// Overflow content.
    pub fn overflow(&self) -> f64 {
        self.overflow
    }

    /// Underflow sum of weights squared.
    pub fn underflow_sumw2(&self) -> f64 {
        self.underflow_sumw2
    }

    /// Overflow sum of weights squared.
    pub fn overflow_sumw2(&self) -> f64 {
        self.overflow_sumw2
    }

    /// Zero the underflow and overflow slots.
    pub fn clear_flows(&mut self) {
        self.underflow = 0.0;
        self.overflow = 0.0;
        self.underflow_sumw2 = 0.0;
        self.overflow_sumw2 = 0.0;
    }

    /// Number of entries the histogram was filled with.
    pub fn entries(&self) -> f64 {
        self.entries
    }

    /// `true` when the histogram was never filled.
    pub fn is_empty(&self) -> bool {
        self.entries == 0.0
    }

    /// Sum of in-range bin contents.
    pub fn integral(&self) -> f64 {
        self.bin_content.iter().sum()
    }

    /// Sum of in-range bin contents, alias kept for normalisation code.
    pub fn sum_of_weights(&self) -> f64 {
        self.integral()
    }

    /// Integral including under/overflow, and its statistical error.
    pub fn integral_and_error(&self) -> (f64, f64) {
        let sum = self.underflow + self.integral() + self.overflow;
        let w2: f64 = self.underflow_sumw2 + self.sumw2.iter().sum::<f64>() + self.overflow_sumw2;
        (sum, w2.max(0.0).sqrt())
    }

    /// Largest bin content.
    pub fn maximum(&self) -> f64 {
        self.bin_content.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Smallest bin content.
    pub fn minimum(&self) -> f64 {
        self.bin_content.iter().copied().fold(f64::INFINITY, f64::min)
    }

    /// Smallest strictly positive bin content, if any.
    pub fn positive_minimum(&self) -> Option<f64> {
        self.bin_content.iter().copied().filter(|c| *c > 0.0).reduce(f64::min)
    }

    /// Axis range covered by the bins.
    pub fn x_range(&self) -> Range {
        Range::new(self.bin_edges[0], self.bin_edges[self.n_bins()])
    }

    /// Index of the bin containing `x`, `None` when `x` falls outside the axis.
    pub fn find_bin(&self, x: f64) -> Option<usize> {
        if !x.is_finite() || x < self.bin_edges[0] || x >= self.bin_edges[self.n_bins()] {
            return None;
        }
        // Edges are strictly increasing.
        let idx = self.bin_edges.partition_point(|e| *e <= x);
        Some(idx - 1)
    }

    /// `true` when both histograms share the same bin edges.
    pub fn same_binning(&self, other: &Histogram) -> bool {
        self.bin_edges.len() == other.bin_edges.len()
            && self.bin_edges.iter().zip(other.bin_edges.iter()).all(|(a, b)| {
                (a - b).abs() <= EDGE_TOLERANCE * a.abs().max(b.abs()).max(1.0)
            })
    }

    /// Fail with [`Error::ShapeMismatch`] unless both histograms share binning.
    pub fn ensure_same_binning(&self, other: &Histogram, context: &str) -> Result<()> {
        if self.same_binning(other) {
            Ok(())
        } else {
            Err(Error::shape_mismatch(
                format!("{context} ({} vs {})", self.name, other.name),
                self.n_bins(),
                other.n_bins(),
            ))
        }
    }

    /// Bin-wise sum `self += other`.
    pub fn add(&mut self, other: &Histogram) -> Result<()> {
        self.ensure_same_binning(other, "histogram add")?;
        for i in 0..self.n_bins() {
            self.bin_content[i] += other.bin_content[i];
            self.sumw2[i] += other.sumw2[i];
        }
        self.underflow += other.underflow;
        self.overflow += other.overflow;
        self.underflow_sumw2 += other.underflow_sumw2;
        self.overflow_sumw2 += other.overflow_sumw2;
        self.entries += other.entries;
        self.asymmetric = match (self.asymmetric.take(), &other.asymmetric) {
            (Some((up, low)), Some((o_up, o_low))) => Some((
                up.iter().zip(o_up).map(|(a, b)| a.hypot(*b)).collect(),
                low.iter().zip(o_low).map(|(a, b)| a.hypot(*b)).collect(),
            )),
            _ => None,
        };
        Ok(())
    }

    /// Multiply contents by `factor` (errors by `|factor|`).
    pub fn scale(&mut self, factor: f64) {
        let f2 = factor * factor;
        for i in 0..self.n_bins() {
            self.bin_content[i] *= factor;
            self.sumw2[i] *= f2;
        }
        self.underflow *= factor;
        self.overflow *= factor;
        self.underflow_sumw2 *= f2;
        self.overflow_sumw2 *= f2;
        if let Some((up, low)) = &mut self.asymmetric {
            up.iter_mut().chain(low.iter_mut()).for_each(|e| *e *= factor.abs());
        }
    }

    /// Merge groups of `factor` consecutive bins.
    pub fn rebin(&mut self, factor: usize) -> Result<()> {
        if factor == 0 {
            return Err(Error::Validation("rebin factor must be positive".to_string()));
        }
        if factor == 1 {
            return Ok(());
        }
        let n = self.n_bins();
        if n % factor != 0 {
            return Err(Error::Validation(format!(
                "rebin factor {factor} does not divide {n} bins of '{}'",
                self.name
            )));
        }
        let merge = |xs: &[f64]| -> Vec<f64> { xs.chunks(factor).map(|c| c.iter().sum()).collect() };
        let merge_quad = |xs: &[f64]| -> Vec<f64> {
            xs.chunks(factor).map(|c| c.iter().map(|e| e * e).sum::<f64>().sqrt()).collect()
        };
        self.bin_edges = self.bin_edges.iter().step_by(factor).copied().collect();
        self.bin_content = merge(&self.bin_content);
        self.sumw2 = merge(&self.sumw2);
        if let Some((up, low)) = self.asymmetric.take() {
            self.asymmetric = Some((merge_quad(&up), merge_quad(&low)));
        }
        Ok(())
    }
}
