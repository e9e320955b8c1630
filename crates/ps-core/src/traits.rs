//! Capability trait shared by everything that can be drawn on a plot.
//!
//! Axis-range decisions (maximum, minimum, log-scale floor) only need these
//! numbers, so plain histograms and stacked composites both implement
//! [`Plottable`] and are handled uniformly as `&dyn Plottable`.

use crate::band::Range;
use crate::histogram::Histogram;

/// Extent queries used for axis ranges.
pub trait Plottable {
    /// Total in-range content.
    fn integral(&self) -> f64;

    /// Largest drawn value.
    fn maximum(&self) -> f64;

    /// Smallest drawn value.
    fn minimum(&self) -> f64;

    /// Smallest strictly positive drawn value (log-scale floor).
    fn positive_minimum(&self) -> Option<f64>;

    /// Axis range covered by the bins.
    fn bin_range(&self) -> Range;
}

impl Plottable for Histogram {
    fn integral(&self) -> f64 {
        Histogram::integral(self)
    }

    fn maximum(&self) -> f64 {
        Histogram::maximum(self)
    }

    fn minimum(&self) -> f64 {
        Histogram::minimum(self)
    }

    fn positive_minimum(&self) -> Option<f64> {
        Histogram::positive_minimum(self)
    }

    fn bin_range(&self) -> Range {
        self.x_range()
    }
}
