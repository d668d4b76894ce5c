//! Log-marginal-likelihood objective and its Adam ascent.
//!
//! Parameters live in log space: `[log σ_f², log ℓ_1 … log ℓ_m, log σ_n²]`.
//! Gradients use `∂L/∂θ = ½ tr((ααᵀ − K⁻¹) ∂K/∂θ)`.

use std::f64::consts::PI;

use camcann_common::{CamcannError, LatentVector, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cholesky::{stable_cholesky, StableCholesky};
use crate::{GpConfig, Kernel, KernelFamily};

const SIGNAL_BOUNDS: (f64, f64) = (1e-6, 1e6);

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const EPSILON: f64 = 1e-8;

/// What the optimiser did.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptimisationTrace {
    /// Objective value at each evaluated iterate
    pub history: Vec<f64>,
    pub iterations: usize,
    pub converged: bool,
}

impl OptimisationTrace {
    pub fn initial(&self) -> Option<f64> {
        self.history.first().copied()
    }

    pub fn best(&self) -> Option<f64> {
        self.history.iter().copied().reduce(f64::max)
    }
}

/// Factorised `K + σ²I` at one parameter setting.
pub(crate) struct Factorised {
    pub kernel: Kernel,
    pub noise_variance: f64,
    pub chol: StableCholesky,
    pub alpha: DVector<f64>,
    pub log_likelihood: f64,
}

pub(crate) struct Objective<'a> {
    pub family: KernelFamily,
    pub n_length_scales: usize,
    pub points: &'a [LatentVector],
    /// Targets minus the constant mean
    pub centred: DVector<f64>,
    pub jitter_start: f64,
    pub max_jitter: f64,
}

impl<'a> Objective<'a> {
    pub fn kernel(&self, theta: &[f64]) -> Kernel {
        Kernel::from_log_params(self.family, theta[0], &theta[1..=self.n_length_scales])
    }

    pub fn noise(&self, theta: &[f64]) -> f64 {
        theta[self.n_length_scales + 1].exp()
    }

    fn covariance(&self, kernel: &Kernel, noise: f64) -> (DMatrix<f64>, DMatrix<f64>) {
        let kf = kernel.gram(self.points);
        let mut ky = kf.clone();
        for i in 0..ky.nrows() {
            ky[(i, i)] += noise;
        }
        (kf, ky)
    }

    pub fn factorise(&self, theta: &[f64]) -> Result<Factorised> {
        let kernel = self.kernel(theta);
        let noise_variance = self.noise(theta);
        let (_, ky) = self.covariance(&kernel, noise_variance);
        self.finish(kernel, noise_variance, &ky)
    }

    fn finish(&self, kernel: Kernel, noise_variance: f64, ky: &DMatrix<f64>) -> Result<Factorised> {
        let chol = stable_cholesky(ky, self.jitter_start, self.max_jitter)?;
        let alpha = chol.factor.solve(&self.centred);
        let n = self.centred.len() as f64;
        let log_det_half: f64 = chol.factor.l_dirty().diagonal().iter().map(|d| d.ln()).sum();
        let log_likelihood = -0.5 * self.centred.dot(&alpha) - log_det_half - 0.5 * n * (2.0 * PI).ln();
        Ok(Factorised {
            kernel,
            noise_variance,
            chol,
            alpha,
            log_likelihood,
        })
    }

    /// Objective value and gradient with respect to `theta`.
    pub fn evaluate(&self, theta: &[f64]) -> Result<(f64, Vec<f64>)> {
        let kernel = self.kernel(theta);
        let noise = self.noise(theta);
        let (kf, ky) = self.covariance(&kernel, noise);
        let fact = self.finish(kernel, noise, &ky)?;

        let kinv = fact.chol.factor.inverse();
        let w = &fact.alpha * fact.alpha.transpose() - kinv;

        let mut grad = vec![0.0; self.n_length_scales + 2];
        grad[0] = 0.5 * w.component_mul(&kf).sum();

        let mut dk = vec![0.0; self.n_length_scales];
        for i in 0..self.points.len() {
            for j in 0..i {
                fact.kernel.length_scale_gradients(
                    self.points[i].as_slice(),
                    self.points[j].as_slice(),
                    &mut dk,
                );
                // symmetric pair counted once, the ½ cancels
                for (g, d) in grad[1..=self.n_length_scales].iter_mut().zip(&dk) {
                    *g += w[(i, j)] * d;
                }
            }
        }
        grad[self.n_length_scales + 1] = 0.5 * noise * w.trace();

        Ok((fact.log_likelihood, grad))
    }

    /// Per-parameter bounds in log space.
    pub fn bounds(&self, config: &GpConfig) -> Vec<(f64, f64)> {
        let mut bounds = Vec::with_capacity(self.n_length_scales + 2);
        bounds.push((SIGNAL_BOUNDS.0.ln(), SIGNAL_BOUNDS.1.ln()));
        for _ in 0..self.n_length_scales {
            bounds.push((config.min_length_scale.ln(), config.max_length_scale.ln()));
        }
        bounds.push((config.min_noise.ln(), config.max_noise.ln()));
        bounds
    }
}

/// Adam ascent from `theta`, clamped to `bounds`. Returns the best iterate
/// seen and the trace.
pub(crate) fn maximise(
    objective: &Objective<'_>,
    mut theta: Vec<f64>,
    config: &GpConfig,
) -> Result<(Vec<f64>, OptimisationTrace)> {
    let bounds = objective.bounds(config);
    clamp(&mut theta, &bounds);

    let p = theta.len();
    let mut m = vec![0.0; p];
    let mut v = vec![0.0; p];
    let mut trace = OptimisationTrace::default();
    let mut best = (f64::NEG_INFINITY, theta.clone());

    for t in 1..=config.max_iterations {
        let (value, grad) = match objective.evaluate(&theta) {
            Ok(r) => r,
            Err(CamcannError::NumericalInstability { jitter }) if t > 1 => {
                warn!(iteration = t, jitter, "Stopping hyperparameter search at unstable point");
                break;
            }
            Err(e) => return Err(e),
        };
        trace.history.push(value);
        trace.iterations = t;
        if value > best.0 {
            best = (value, theta.clone());
        }

        // components pressing against an active bound cannot move
        let effective: Vec<f64> = grad
            .iter()
            .zip(&theta)
            .zip(&bounds)
            .map(|((g, th), (lo, hi))| {
                if (*th <= *lo && *g < 0.0) || (*th >= *hi && *g > 0.0) {
                    0.0
                } else {
                    *g
                }
            })
            .collect();
        let max_grad = effective.iter().fold(0.0f64, |acc, g| acc.max(g.abs()));
        if t % 25 == 0 {
            debug!(iteration = t, log_likelihood = value, max_grad, "hyperparameter search");
        }
        if max_grad < config.gradient_tolerance {
            trace.converged = true;
            break;
        }

        let bc1 = 1.0 - BETA1.powi(t as i32);
        let bc2 = 1.0 - BETA2.powi(t as i32);
        for i in 0..p {
            m[i] = BETA1 * m[i] + (1.0 - BETA1) * effective[i];
            v[i] = BETA2 * v[i] + (1.0 - BETA2) * effective[i] * effective[i];
            theta[i] += config.learning_rate * (m[i] / bc1) / ((v[i] / bc2).sqrt() + EPSILON);
        }
        clamp(&mut theta, &bounds);
    }

    Ok((best.1, trace))
}

fn clamp(theta: &mut [f64], bounds: &[(f64, f64)]) {
    for (th, (lo, hi)) in theta.iter_mut().zip(bounds) {
        *th = th.clamp(*lo, *hi);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camcann_test_utils::{latent_cluster, smooth_target};

    fn objective(points: &[LatentVector], family: KernelFamily, ard: bool) -> Objective<'_> {
        let y: Vec<f64> = points.iter().map(smooth_target).collect();
        let mean = y.iter().sum::<f64>() / y.len() as f64;
        Objective {
            family,
            n_length_scales: if ard { points[0].dim() } else { 1 },
            points,
            centred: DVector::from_iterator(y.len(), y.iter().map(|v| v - mean)),
            jitter_start: 1e-10,
            max_jitter: 1e-2,
        }
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let points = latent_cluster(&[0.0, 0.0], 2.0, 12, 3);
        for (family, ard) in [
            (KernelFamily::SquaredExponential, false),
            (KernelFamily::Matern52, true),
            (KernelFamily::Matern32, true),
        ] {
            let obj = objective(&points, family, ard);
            let mut theta = vec![0.2];
            theta.extend(std::iter::repeat(0.1).take(obj.n_length_scales));
            theta.push((0.05f64).ln());

            let (_, grad) = obj.evaluate(&theta).unwrap();
            let h = 1e-5;
            for i in 0..theta.len() {
                let mut up = theta.clone();
                up[i] += h;
                let mut down = theta.clone();
                down[i] -= h;
                let fd = (obj.evaluate(&up).unwrap().0 - obj.evaluate(&down).unwrap().0) / (2.0 * h);
                assert!(
                    (fd - grad[i]).abs() < 1e-4 * (1.0 + fd.abs()),
                    "{family:?} param {i}: analytic {} vs numeric {fd}",
                    grad[i]
                );
            }
        }
    }

    #[test]
    fn test_ascent_improves_objective() {
        let points = latent_cluster(&[0.0, 0.0], 2.0, 20, 9);
        let obj = objective(&points, KernelFamily::Matern52, false);
        // deliberately poor start: tiny length scale, large noise
        let start = vec![0.0, (0.01f64).ln(), (1.0f64).ln()];
        let config = GpConfig {
            max_iterations: 150,
            ..GpConfig::default()
        };
        let (best, trace) = maximise(&obj, start, &config).unwrap();
        let first = trace.initial().unwrap();
        let top = trace.best().unwrap();
        assert!(top > first + 1.0, "{first} -> {top}");
        assert!((obj.evaluate(&best).unwrap().0 - top).abs() < 1e-9);
    }

    #[test]
    fn test_noise_stays_within_bounds() {
        let points = latent_cluster(&[1.0, -1.0], 1.0, 10, 4);
        let obj = objective(&points, KernelFamily::SquaredExponential, false);
        let config = GpConfig {
            min_noise: 1e-2,
            max_noise: 0.5,
            max_iterations: 50,
            ..GpConfig::default()
        };
        let (best, _) = maximise(&obj, vec![0.0, 0.0, (1e-6f64).ln()], &config).unwrap();
        let noise = obj.noise(&best);
        assert!(noise >= 1e-2 * (1.0 - 1e-9) && noise <= 0.5 * (1.0 + 1e-9));
    }
}
