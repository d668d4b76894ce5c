//! Accuracy and uncertainty-calibration metrics for a set of predictions.

use serde::{Deserialize, Serialize};

/// Point-prediction accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub rmse: f64,
    pub mae: f64,
    /// Coefficient of determination; 0 when the observations are constant
    pub r2: f64,
    pub n: usize,
}

impl Metrics {
    pub fn compute(observed: &[f64], predicted: &[f64]) -> Self {
        let n = observed.len().min(predicted.len());
        if n == 0 {
            return Self {
                rmse: 0.0,
                mae: 0.0,
                r2: 0.0,
                n: 0,
            };
        }
        let nf = n as f64;
        let (mut sse, mut sae) = (0.0, 0.0);
        for (y, p) in observed.iter().zip(predicted) {
            sse += (y - p).powi(2);
            sae += (y - p).abs();
        }
        let mean = observed[..n].iter().sum::<f64>() / nf;
        let sst: f64 = observed[..n].iter().map(|y| (y - mean).powi(2)).sum();
        Self {
            rmse: (sse / nf).sqrt(),
            mae: sae / nf,
            r2: if sst > 0.0 { 1.0 - sse / sst } else { 0.0 },
            n,
        }
    }
}

/// One point of a calibration curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub expected: f64,
    pub observed: f64,
}

/// `(y − μ) / σ`. Zero standard deviations give infinite residuals of the
/// residual's sign (0 when the residual is 0 too).
pub fn normalised_residuals(observed: &[f64], means: &[f64], std_devs: &[f64]) -> Vec<f64> {
    observed
        .iter()
        .zip(means)
        .zip(std_devs)
        .map(|((y, m), s)| {
            let r = y - m;
            if *s > 0.0 {
                r / s
            } else if r == 0.0 {
                0.0
            } else {
                r.signum() * f64::INFINITY
            }
        })
        .collect()
}

/// Expected vs observed cumulative probability: for each `p` on an even grid
/// over [0, 1], the fraction of normalised residuals with `Φ(r) ≤ p`.
/// A calibrated model lies on the diagonal.
pub fn calibration_curve(normalised: &[f64], points: usize) -> Vec<CalibrationPoint> {
    if points < 2 {
        return Vec::new();
    }
    let cdfs: Vec<f64> = normalised.iter().map(|r| normal_cdf(*r)).collect();
    let n = cdfs.len().max(1) as f64;
    (0..points)
        .map(|i| {
            let expected = i as f64 / (points - 1) as f64;
            let below = cdfs.iter().filter(|c| **c <= expected).count() as f64;
            CalibrationPoint {
                expected,
                observed: if cdfs.is_empty() { 0.0 } else { below / n },
            }
        })
        .collect()
}

/// Mean absolute gap between the calibration curve and the diagonal.
pub fn miscalibration_area(curve: &[CalibrationPoint]) -> f64 {
    if curve.is_empty() {
        return 0.0;
    }
    curve.iter().map(|p| (p.observed - p.expected).abs()).sum::<f64>() / curve.len() as f64
}

/// Fraction of observations above the upper one-sided `level` bound,
/// i.e. with `Φ(r) > level`.
pub fn fraction_above_ci(normalised: &[f64], level: f64) -> f64 {
    if normalised.is_empty() {
        return 0.0;
    }
    normalised.iter().filter(|r| normal_cdf(**r) > level).count() as f64 / normalised.len() as f64
}

/// Standard normal CDF.
pub fn normal_cdf(x: f64) -> f64 {
    if x == f64::INFINITY {
        return 1.0;
    }
    if x == f64::NEG_INFINITY {
        return 0.0;
    }
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

// Abramowitz & Stegun 7.1.26, |error| < 1.5e-7
fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();
    sign * y
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_perfect_and_offset() {
        let y = [1.0, 2.0, 3.0, 4.0];
        let perfect = Metrics::compute(&y, &y);
        assert_eq!(perfect.rmse, 0.0);
        assert_eq!(perfect.r2, 1.0);

        let shifted: Vec<f64> = y.iter().map(|v| v + 0.5).collect();
        let m = Metrics::compute(&y, &shifted);
        assert!((m.rmse - 0.5).abs() < 1e-12);
        assert!((m.mae - 0.5).abs() < 1e-12);
        assert!((m.r2 - 0.8).abs() < 1e-12);
        assert_eq!(m.n, 4);
    }

    #[test]
    fn test_normal_cdf_reference_values() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-7);
        assert!((normal_cdf(1.959964) - 0.975).abs() < 1e-6);
        assert!((normal_cdf(-1.0) - 0.158655).abs() < 1e-6);
        assert_eq!(normal_cdf(f64::INFINITY), 1.0);
    }

    #[test]
    fn test_calibration_curve_is_monotone_and_anchored() {
        let resid: Vec<f64> = (0..200).map(|i| ((i as f64) * 0.37).sin() * 2.0).collect();
        let curve = calibration_curve(&resid, 21);
        assert_eq!(curve.len(), 21);
        assert_eq!(curve[0].expected, 0.0);
        assert_eq!(curve[20].observed, 1.0);
        for w in curve.windows(2) {
            assert!(w[1].observed >= w[0].observed);
        }
    }

    #[test]
    fn test_overconfident_model_is_miscalibrated() {
        // residuals far larger than the reported spread
        let observed: Vec<f64> = (0..100).map(|i| (i as f64 - 50.0) / 10.0).collect();
        let means = vec![0.0; 100];
        let tight = normalised_residuals(&observed, &means, &vec![0.1; 100]);
        let honest = normalised_residuals(&observed, &means, &vec![3.0; 100]);
        let a = miscalibration_area(&calibration_curve(&tight, 51));
        let b = miscalibration_area(&calibration_curve(&honest, 51));
        assert!(a > b);
        assert!(fraction_above_ci(&tight, 0.95) > fraction_above_ci(&honest, 0.95));
    }

    #[test]
    fn test_zero_std_dev() {
        let r = normalised_residuals(&[1.0, 0.0, -1.0], &[0.0, 0.0, 0.0], &[0.0, 0.0, 0.0]);
        assert_eq!(r, vec![f64::INFINITY, 0.0, f64::NEG_INFINITY]);
        assert_eq!(fraction_above_ci(&r, 0.95), 1.0 / 3.0);
    }
}
