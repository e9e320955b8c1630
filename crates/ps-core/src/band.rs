//! Axis ranges and asymmetric error bands.

use serde::{Deserialize, Serialize};

use crate::histogram::Histogram;

/// A closed interval on an axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    /// Lower bound.
    pub start: f64,
    /// Upper bound.
    pub end: f64,
}

impl Range {
    /// Create a range.
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// `true` for a finite, non-empty interval.
    pub fn is_valid(&self) -> bool {
        self.start.is_finite() && self.end.is_finite() && self.start < self.end
    }

    /// `true` when `x` lies in `[start, end]`.
    pub fn contains(&self, x: f64) -> bool {
        x >= self.start && x <= self.end
    }
}

/// Per-bin band with independent upper and lower errors.
///
/// Errors are stored as non-negative magnitudes: the band spans
/// `[y - err_low, y + err_up]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AsymmetricBand {
    /// Bin centers.
    pub x: Vec<f64>,
    /// Half bin widths.
    pub x_half_width: Vec<f64>,
    /// Central values.
    pub y: Vec<f64>,
    /// Lower errors.
    pub err_low: Vec<f64>,
    /// Upper errors.
    pub err_up: Vec<f64>,
}

impl AsymmetricBand {
    /// Band centred on the histogram contents with zero errors.
    pub fn from_histogram(h: &Histogram) -> Self {
        let n = h.n_bins();
        Self {
            x: (0..n).map(|i| h.center(i)).collect(),
            x_half_width: (0..n).map(|i| h.width(i) / 2.0).collect(),
            y: h.contents().to_vec(),
            err_low: vec![0.0; n],
            err_up: vec![0.0; n],
        }
    }

    /// Band centred on the histogram contents with its symmetric errors.
    pub fn from_histogram_errors(h: &Histogram) -> Self {
        let mut band = Self::from_histogram(h);
        for i in 0..h.n_bins() {
            band.err_low[i] = h.error(i);
            band.err_up[i] = h.error(i);
        }
        band
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.y.len()
    }

    /// `true` for a band without points.
    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// Upper edge of point `i`.
    pub fn upper(&self, i: usize) -> f64 {
        self.y[i] + self.err_up[i]
    }

    /// Lower edge of point `i`.
    pub fn lower(&self, i: usize) -> f64 {
        self.y[i] - self.err_low[i]
    }
}
