//! Exact GP regression over a fixed set of support latents.

use camcann_common::{CamcannError, LatentVector, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::cholesky::StableCholesky;
use crate::optimise::{maximise, Objective, OptimisationTrace};
use crate::{GpConfig, Hyperparameters, Kernel};

/// Posterior predictive at one query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub mean: f64,
    pub variance: f64,
}

impl Prediction {
    pub fn std_dev(&self) -> f64 {
        self.variance.sqrt()
    }
}

/// Entry point for fitting.
pub struct GaussianProcess;

impl GaussianProcess {
    /// Fit a constant-mean GP to `(support, targets)`, optimising the
    /// hyperparameters unless the config fixes them.
    #[instrument(skip_all, fields(n = support.len(), family = ?config.family, ard = config.ard))]
    pub fn fit(config: &GpConfig, support: Vec<LatentVector>, targets: &[f64]) -> Result<TrainedGp> {
        config.validate()?;
        let dim = check_inputs(&support, targets)?;

        let n = targets.len() as f64;
        let mean = targets.iter().sum::<f64>() / n;
        let target_var = targets.iter().map(|y| (y - mean).powi(2)).sum::<f64>() / n;
        let target_var = if target_var > 1e-12 { target_var } else { 1.0 };

        let n_length_scales = if config.ard { dim } else { 1 };
        let theta0 = match &config.initial {
            Some(h) => {
                if h.length_scales.len() != n_length_scales {
                    return Err(CamcannError::DimensionMismatch {
                        expected: n_length_scales,
                        found: h.length_scales.len(),
                    });
                }
                let mut theta = vec![h.signal_variance.ln()];
                theta.extend(h.length_scales.iter().map(|l| l.ln()));
                theta.push(h.noise_variance.ln());
                theta
            }
            None => {
                let ls = median_pairwise_distance(&support).unwrap_or(1.0);
                let mut theta = vec![target_var.ln()];
                theta.extend(std::iter::repeat(ls.ln()).take(n_length_scales));
                theta.push((config.initial_noise_fraction * target_var).ln());
                theta
            }
        };

        let objective = Objective {
            family: config.family,
            n_length_scales,
            points: &support,
            centred: DVector::from_iterator(targets.len(), targets.iter().map(|y| y - mean)),
            jitter_start: config.jitter_start,
            max_jitter: config.max_jitter,
        };

        let (theta, optimisation) = if config.optimize && support.len() > 1 {
            maximise(&objective, theta0, config)?
        } else {
            (theta0, OptimisationTrace::default())
        };

        let fitted = objective.factorise(&theta)?;
        info!(
            "GP fitted on {} points: log ML {:.3}, signal {:.3}, noise {:.4}, {} optimiser steps",
            support.len(),
            fitted.log_likelihood,
            fitted.kernel.signal_variance(),
            fitted.noise_variance,
            optimisation.iterations
        );
        debug!(length_scales = ?fitted.kernel.length_scales(), jitter = fitted.chol.jitter, "fitted kernel");

        Ok(TrainedGp {
            kernel: fitted.kernel,
            noise_variance: fitted.noise_variance,
            mean,
            support,
            targets: targets.to_vec(),
            chol: fitted.chol,
            alpha: fitted.alpha,
            log_likelihood: fitted.log_likelihood,
            optimisation,
        })
    }
}

fn check_inputs(support: &[LatentVector], targets: &[f64]) -> Result<usize> {
    let first = support
        .first()
        .ok_or_else(|| CamcannError::InvalidInput("GP support set is empty".to_string()))?;
    if support.len() != targets.len() {
        return Err(CamcannError::DimensionMismatch {
            expected: support.len(),
            found: targets.len(),
        });
    }
    let dim = first.dim();
    if dim == 0 {
        return Err(CamcannError::InvalidInput("latent vectors are empty".to_string()));
    }
    if let Some(bad) = support.iter().find(|z| z.dim() != dim) {
        return Err(CamcannError::DimensionMismatch {
            expected: dim,
            found: bad.dim(),
        });
    }
    if support.iter().any(|z| z.as_slice().iter().any(|v| !v.is_finite())) {
        return Err(CamcannError::InvalidInput("non-finite latent coordinate".to_string()));
    }
    if targets.iter().any(|y| !y.is_finite()) {
        return Err(CamcannError::InvalidInput("non-finite target".to_string()));
    }
    Ok(dim)
}

/// Median Euclidean distance over distinct pairs; `None` when all pairs coincide.
fn median_pairwise_distance(points: &[LatentVector]) -> Option<f64> {
    let mut d: Vec<f64> = Vec::with_capacity(points.len() * points.len().saturating_sub(1) / 2);
    for i in 0..points.len() {
        for j in 0..i {
            d.push(points[i].squared_distance(&points[j]).sqrt());
        }
    }
    d.retain(|v| *v > 0.0);
    if d.is_empty() {
        return None;
    }
    d.sort_by(|a, b| a.total_cmp(b));
    Some(d[d.len() / 2])
}

/// A fitted GP. Immutable; refit to change the support set.
pub struct TrainedGp {
    kernel: Kernel,
    noise_variance: f64,
    mean: f64,
    support: Vec<LatentVector>,
    targets: Vec<f64>,
    chol: StableCholesky,
    alpha: DVector<f64>,
    log_likelihood: f64,
    optimisation: OptimisationTrace,
}

impl TrainedGp {
    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn noise_variance(&self) -> f64 {
        self.noise_variance
    }

    /// Constant prior mean (the training-target mean).
    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn support(&self) -> &[LatentVector] {
        &self.support
    }

    pub fn targets(&self) -> &[f64] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.support.len()
    }

    pub fn is_empty(&self) -> bool {
        self.support.is_empty()
    }

    pub fn latent_dim(&self) -> usize {
        self.support.first().map(|z| z.dim()).unwrap_or(0)
    }

    pub fn log_marginal_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    /// Diagonal jitter the final factorisation needed.
    pub fn jitter(&self) -> f64 {
        self.chol.jitter
    }

    pub fn optimisation(&self) -> &OptimisationTrace {
        &self.optimisation
    }

    pub fn hyperparameters(&self) -> Hyperparameters {
        Hyperparameters {
            signal_variance: self.kernel.signal_variance(),
            length_scales: self.kernel.length_scales().to_vec(),
            noise_variance: self.noise_variance,
        }
    }

    fn check_dim(&self, z: &LatentVector) -> Result<()> {
        if z.dim() != self.latent_dim() {
            return Err(CamcannError::DimensionMismatch {
                expected: self.latent_dim(),
                found: z.dim(),
            });
        }
        Ok(())
    }

    fn k_star(&self, z: &LatentVector) -> DVector<f64> {
        DVector::from_iterator(
            self.support.len(),
            self.support.iter().map(|s| self.kernel.eval(z.as_slice(), s.as_slice())),
        )
    }

    /// Latent-function posterior at `z`. Never rejects out-of-domain queries;
    /// their variance approaches the signal variance instead.
    pub fn predict(&self, z: &LatentVector) -> Result<Prediction> {
        self.check_dim(z)?;
        let k_star = self.k_star(z);
        let mean = self.mean + k_star.dot(&self.alpha);
        let v = self
            .chol
            .factor
            .l_dirty()
            .solve_lower_triangular(&k_star)
            .ok_or(CamcannError::NumericalInstability {
                jitter: self.chol.jitter,
            })?;
        let variance = (self.kernel.diag() - v.dot(&v)).max(0.0);
        Ok(Prediction { mean, variance })
    }

    /// Predictive for a new noisy observation: latent variance plus σ².
    pub fn predict_observed(&self, z: &LatentVector) -> Result<Prediction> {
        let p = self.predict(z)?;
        Ok(Prediction {
            mean: p.mean,
            variance: p.variance + self.noise_variance,
        })
    }

    pub fn predict_batch(&self, queries: &[LatentVector]) -> Result<Vec<Prediction>> {
        queries.iter().map(|z| self.predict(z)).collect()
    }

    /// Leave-one-out predictive for every support point, in closed form.
    /// Variances are for observations (noise included).
    pub fn loo_predictions(&self) -> Vec<Prediction> {
        let kinv = self.chol.factor.inverse();
        (0..self.support.len())
            .map(|i| {
                let precision = kinv[(i, i)];
                Prediction {
                    mean: self.targets[i] - self.alpha[i] / precision,
                    variance: 1.0 / precision,
                }
            })
            .collect()
    }

    /// Kernel distance from `z` to its nearest support point.
    pub fn support_distance(&self, z: &LatentVector) -> Result<f64> {
        self.check_dim(z)?;
        Ok(self
            .support
            .iter()
            .map(|s| self.kernel.distance(z.as_slice(), s.as_slice()))
            .fold(f64::INFINITY, f64::min))
    }

    /// Fitted kernel's Gram matrix over `points` (no noise term).
    pub fn gram(&self, points: &[LatentVector]) -> Result<DMatrix<f64>> {
        if let Some(bad) = points.iter().find(|z| z.dim() != self.latent_dim()) {
            return Err(CamcannError::DimensionMismatch {
                expected: self.latent_dim(),
                found: bad.dim(),
            });
        }
        Ok(self.kernel.gram(points))
    }
}
