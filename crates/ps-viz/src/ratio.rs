//! Data / prediction ratio with asymmetric errors.

use ps_core::{AsymmetricBand, Histogram, Result};
use serde::{Deserialize, Serialize};

use crate::stack::Stack;

/// Error propagation strategy for the ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatioMode {
    /// Quotient-rule propagation of both numerator and denominator errors.
    FullPropagation,
    /// Numerator errors only; the prediction uncertainty is drawn as a band.
    #[default]
    NumeratorOnly,
}

impl RatioMode {
    /// Upward or downward error of `num / den` given the matching-side errors.
    pub fn propagate(&self, num: f64, num_err: f64, den: f64, den_err: f64) -> f64 {
        match self {
            RatioMode::FullPropagation => {
                let den_sq = den * den;
                ((num_err * num_err * den_sq + den_err * den_err * num * num) / (den_sq * den_sq))
                    .sqrt()
            }
            RatioMode::NumeratorOnly => (num_err / den).abs(),
        }
    }
}

/// One point of the ratio sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RatioPoint {
    /// Source bin index.
    pub bin: usize,
    /// Bin center.
    pub x: f64,
    /// `observed / reference`.
    pub y: f64,
    /// Lower error.
    pub err_low: f64,
    /// Upper error.
    pub err_up: f64,
}

/// Per-bin `observed / reference`.
///
/// Bins where either value is exactly zero are omitted, so the output may be
/// shorter than the bin count. Unequal binning is a
/// [`ps_core::Error::ShapeMismatch`].
pub fn ratio(observed: &Histogram, reference: &Histogram, mode: RatioMode) -> Result<Vec<RatioPoint>> {
    observed.ensure_same_binning(reference, "ratio")?;
    let mut points = Vec::with_capacity(observed.n_bins());
    for i in 0..observed.n_bins() {
        let num = observed.content(i);
        let den = reference.content(i);
        if num == 0.0 || den == 0.0 {
            continue;
        }
        points.push(RatioPoint {
            bin: i,
            x: observed.center(i),
            y: num / den,
            err_low: mode.propagate(num, observed.error_low(i), den, reference.error_low(i)),
            err_up: mode.propagate(num, observed.error_up(i), den, reference.error_up(i)),
        });
    }
    Ok(points)
}

/// Relative statistical band `1 ± stat / content` of the stack total.
///
/// Bins with zero content or zero error stay at `y = 0` without errors.
pub fn relative_stat_band(stack: &Stack) -> AsymmetricBand {
    let total = &stack.stat_only;
    let mut band = AsymmetricBand::from_histogram(total);
    for i in 0..total.n_bins() {
        let (c, e) = (total.content(i), total.error(i));
        if c == 0.0 || e == 0.0 {
            band.y[i] = 0.0;
            continue;
        }
        band.y[i] = 1.0;
        band.err_low[i] = e / c;
        band.err_up[i] = e / c;
    }
    band
}

/// Relative systematic band around 1.
///
/// With `syst_only` the band uses the systematic-only errors, otherwise the
/// statistical + systematic ones. `None` when the stack carries no
/// systematic error at all.
pub fn relative_syst_band(stack: &Stack, syst_only: bool) -> Option<AsymmetricBand> {
    let (Some(syst), Some(syst_asym)) = (&stack.syst_only, &stack.syst_only_asym) else {
        return None;
    };
    let source = if syst_only { syst_asym } else { &stack.stat_and_syst_asym };
    let mut band = AsymmetricBand::from_histogram(syst);
    let mut has_syst = false;
    for i in 0..syst.n_bins() {
        let c = syst.content(i);
        band.y[i] = 1.0;
        if c == 0.0 || (syst_asym.err_up[i] == 0.0 && syst_asym.err_low[i] == 0.0) {
            continue;
        }
        band.err_up[i] = source.err_up[i] / c;
        band.err_low[i] = source.err_low[i] / c;
        has_syst = true;
    }
    has_syst.then_some(band)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ps_core::{ErrorModel, Kind};

    use crate::process::Process;
    use crate::stack::build_stack;

    fn hist(contents: &[f64]) -> Histogram {
        let edges = (0..=contents.len()).map(|i| i as f64).collect();
        Histogram::from_contents("h", edges, contents.to_vec(), None).unwrap()
    }

    #[test]
    fn test_skips_zero_bins() {
        let obs = hist(&[5.0, 0.0, 7.0]);
        let reference = hist(&[1.0, 0.0, 2.0]);
        let points = ratio(&obs, &reference, RatioMode::FullPropagation).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].bin, 0);
        assert_eq!(points[1].bin, 2);
        assert_relative_eq!(points[0].y, 5.0);
        assert_relative_eq!(points[1].y, 3.5);
        assert_relative_eq!(points[1].x, 2.5);
    }

    #[test]
    fn test_skips_when_only_observed_is_zero() {
        let points =
            ratio(&hist(&[0.0, 4.0]), &hist(&[3.0, 2.0]), RatioMode::NumeratorOnly).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].bin, 1);
    }

    #[test]
    fn test_full_propagation() {
        // sumw2 = content: obs err = 2, ref err = 1.
        let points = ratio(&hist(&[4.0]), &hist(&[1.0]), RatioMode::FullPropagation).unwrap();
        let want = ((4.0 * 1.0 + 1.0 * 16.0) / 1.0_f64).sqrt();
        assert_relative_eq!(points[0].err_up, want);
        assert_relative_eq!(points[0].err_low, want);
    }

    #[test]
    fn test_numerator_only() {
        let points = ratio(&hist(&[4.0]), &hist(&[2.0]), RatioMode::NumeratorOnly).unwrap();
        assert_relative_eq!(points[0].y, 2.0);
        assert_relative_eq!(points[0].err_up, 1.0);
    }

    #[test]
    fn test_asymmetric_numerator() {
        let obs = hist(&[1.0]).with_error_model(ErrorModel::Poisson);
        let points = ratio(&obs, &hist(&[2.0]), RatioMode::NumeratorOnly).unwrap();
        assert!(points[0].err_up > points[0].err_low);
        assert_relative_eq!(points[0].err_up, obs.error_up(0) / 2.0);
    }

    #[test]
    fn test_shape_mismatch() {
        assert!(ratio(&hist(&[1.0]), &hist(&[1.0, 2.0]), RatioMode::NumeratorOnly).is_err());
    }

    #[test]
    fn test_relative_bands() {
        let processes = vec![Process::new(0, "bkg", Kind::Background, hist(&[4.0, 0.0]))];
        let mut stack = build_stack(&processes, 0, false).unwrap().unwrap();
        let stat = relative_stat_band(&stack);
        assert_eq!(stat.y, vec![1.0, 0.0]);
        assert_relative_eq!(stat.err_up[0], 0.5);

        assert!(relative_syst_band(&stack, true).is_none());
        stack.prepare_systematics();
        assert!(relative_syst_band(&stack, true).is_none());
        if let Some(asym) = &mut stack.syst_only_asym {
            asym.err_up[0] = 1.0;
            asym.err_low[0] = 2.0;
        }
        let band = relative_syst_band(&stack, true).unwrap();
        assert_relative_eq!(band.err_up[0], 0.25);
        assert_relative_eq!(band.err_low[0], 0.5);
    }
}
