//! Stationary covariance functions over latent vectors.
//!
//! All kernels are functions of the scaled distance
//! `r² = Σ_d (a_d − b_d)² / ℓ_d²`, so `k(z, z) = σ_f²` everywhere.

use camcann_common::{CamcannError, LatentVector, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

const SQRT_3: f64 = 1.732_050_807_568_877_2;
const SQRT_5: f64 = 2.236_067_977_499_79;

/// Correlation model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KernelFamily {
    /// `σ² exp(−r²/2)`
    SquaredExponential,
    /// `σ² (1 + √5 r + 5r²/3) exp(−√5 r)`
    #[default]
    Matern52,
    /// `σ² (1 + √3 r) exp(−√3 r)`
    Matern32,
}

impl KernelFamily {
    /// Covariance at scaled distance `r` for unit signal variance.
    fn correlation(&self, r2: f64) -> f64 {
        match self {
            KernelFamily::SquaredExponential => (-0.5 * r2).exp(),
            KernelFamily::Matern52 => {
                let r = r2.sqrt();
                (1.0 + SQRT_5 * r + 5.0 * r2 / 3.0) * (-SQRT_5 * r).exp()
            }
            KernelFamily::Matern32 => {
                let r = r2.sqrt();
                (1.0 + SQRT_3 * r) * (-SQRT_3 * r).exp()
            }
        }
    }

    /// `g(r)` such that `∂k/∂log ℓ_d = σ² g(r) (Δ_d/ℓ_d)²`.
    fn length_scale_factor(&self, r2: f64) -> f64 {
        match self {
            KernelFamily::SquaredExponential => (-0.5 * r2).exp(),
            KernelFamily::Matern52 => {
                let r = r2.sqrt();
                (5.0 / 3.0) * (1.0 + SQRT_5 * r) * (-SQRT_5 * r).exp()
            }
            KernelFamily::Matern32 => 3.0 * (-SQRT_3 * r2.sqrt()).exp(),
        }
    }
}

/// A parameterised kernel: family, signal variance and either one shared
/// length scale or one per latent dimension (ARD).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kernel {
    family: KernelFamily,
    signal_variance: f64,
    length_scales: Vec<f64>,
}

impl Kernel {
    /// Signal variance and every length scale must be finite and positive;
    /// at least one length scale is required.
    pub fn new(family: KernelFamily, signal_variance: f64, length_scales: Vec<f64>) -> Result<Self> {
        if length_scales.is_empty() {
            return Err(CamcannError::InvalidInput("kernel needs at least one length scale".into()));
        }
        if !(signal_variance.is_finite() && signal_variance > 0.0) {
            return Err(CamcannError::InvalidInput(format!(
                "signal variance must be positive, got {signal_variance}"
            )));
        }
        if let Some(bad) = length_scales.iter().find(|l| !(l.is_finite() && **l > 0.0)) {
            return Err(CamcannError::InvalidInput(format!("length scale must be positive, got {bad}")));
        }
        Ok(Self {
            family,
            signal_variance,
            length_scales,
        })
    }

    pub fn isotropic(family: KernelFamily, signal_variance: f64, length_scale: f64) -> Result<Self> {
        Self::new(family, signal_variance, vec![length_scale])
    }

    /// Build from log-space parameters. `log_scales` must be non-empty and
    /// everything finite, which the optimiser's bounds guarantee.
    pub(crate) fn from_log_params(family: KernelFamily, log_signal: f64, log_scales: &[f64]) -> Self {
        Self {
            family,
            signal_variance: log_signal.exp(),
            length_scales: log_scales.iter().map(|t| t.exp()).collect(),
        }
    }

    pub fn family(&self) -> KernelFamily {
        self.family
    }

    pub fn signal_variance(&self) -> f64 {
        self.signal_variance
    }

    pub fn length_scales(&self) -> &[f64] {
        &self.length_scales
    }

    pub fn is_ard(&self) -> bool {
        self.length_scales.len() > 1
    }

    fn length_scale(&self, d: usize) -> f64 {
        if self.is_ard() {
            self.length_scales[d]
        } else {
            self.length_scales[0]
        }
    }

    /// Per-dimension squared scaled differences `(Δ_d/ℓ_d)²`.
    pub(crate) fn scaled_terms<'a>(&'a self, a: &'a [f64], b: &'a [f64]) -> impl Iterator<Item = f64> + 'a {
        a.iter().zip(b).enumerate().map(move |(d, (x, y))| {
            let s = (x - y) / self.length_scale(d);
            s * s
        })
    }

    pub(crate) fn scaled_sq_dist(&self, a: &[f64], b: &[f64]) -> f64 {
        self.scaled_terms(a, b).sum()
    }

    pub fn eval(&self, a: &[f64], b: &[f64]) -> f64 {
        self.signal_variance * self.family.correlation(self.scaled_sq_dist(a, b))
    }

    /// `k(z, z)`; constant for stationary kernels.
    pub fn diag(&self) -> f64 {
        self.signal_variance
    }

    /// Kernel-induced distance `sqrt(k(a,a) + k(b,b) − 2k(a,b))`.
    pub fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        (2.0 * self.diag() - 2.0 * self.eval(a, b)).max(0.0).sqrt()
    }

    /// Symmetric Gram matrix over `points`.
    pub fn gram(&self, points: &[LatentVector]) -> DMatrix<f64> {
        let n = points.len();
        let mut k = DMatrix::zeros(n, n);
        for i in 0..n {
            k[(i, i)] = self.diag();
            for j in 0..i {
                let v = self.eval(points[i].as_slice(), points[j].as_slice());
                k[(i, j)] = v;
                k[(j, i)] = v;
            }
        }
        k
    }

    /// Cross-covariance, rows = `queries`, columns = `support`.
    pub fn cross(&self, queries: &[LatentVector], support: &[LatentVector]) -> DMatrix<f64> {
        DMatrix::from_fn(queries.len(), support.len(), |i, j| {
            self.eval(queries[i].as_slice(), support[j].as_slice())
        })
    }

    /// `∂k(a,b)/∂log ℓ`, one entry per length-scale parameter.
    pub(crate) fn length_scale_gradients(&self, a: &[f64], b: &[f64], out: &mut [f64]) {
        let r2 = self.scaled_sq_dist(a, b);
        let g = self.signal_variance * self.family.length_scale_factor(r2);
        if self.is_ard() {
            for (slot, s) in out.iter_mut().zip(self.scaled_terms(a, b)) {
                *slot = g * s;
            }
        } else {
            out[0] = g * r2;
        }
    }
}
