//! GP regressor configuration.

use camcann_common::{CamcannError, Result};
use serde::{Deserialize, Serialize};

use crate::KernelFamily;

fn default_true() -> bool {
    true
}

fn default_max_iterations() -> usize {
    200
}

fn default_learning_rate() -> f64 {
    0.05
}

fn default_gradient_tolerance() -> f64 {
    1e-4
}

fn default_initial_noise_fraction() -> f64 {
    0.1
}

fn default_min_noise() -> f64 {
    1e-6
}

fn default_max_noise() -> f64 {
    10.0
}

fn default_min_length_scale() -> f64 {
    1e-3
}

fn default_max_length_scale() -> f64 {
    1e3
}

fn default_jitter_start() -> f64 {
    1e-10
}

fn default_max_jitter() -> f64 {
    1e-2
}

/// Hyperparameters in natural (not log) units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub signal_variance: f64,
    /// One entry (isotropic) or one per latent dimension (ARD)
    pub length_scales: Vec<f64>,
    pub noise_variance: f64,
}

/// Gaussian-process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpConfig {
    #[serde(default)]
    pub family: KernelFamily,

    /// One length scale per latent dimension instead of a shared one
    #[serde(default)]
    pub ard: bool,

    /// Run marginal-likelihood optimisation; otherwise keep the initial values
    #[serde(default = "default_true")]
    pub optimize: bool,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Adam step size in log-parameter space
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    /// Stop when the largest absolute gradient component falls below this
    #[serde(default = "default_gradient_tolerance")]
    pub gradient_tolerance: f64,

    /// Initial noise variance as a fraction of the target variance
    #[serde(default = "default_initial_noise_fraction")]
    pub initial_noise_fraction: f64,

    #[serde(default = "default_min_noise")]
    pub min_noise: f64,

    #[serde(default = "default_max_noise")]
    pub max_noise: f64,

    #[serde(default = "default_min_length_scale")]
    pub min_length_scale: f64,

    #[serde(default = "default_max_length_scale")]
    pub max_length_scale: f64,

    /// First jitter tried, relative to the mean diagonal of `K + σ²I`
    #[serde(default = "default_jitter_start")]
    pub jitter_start: f64,

    /// Largest relative jitter before giving up
    #[serde(default = "default_max_jitter")]
    pub max_jitter: f64,

    /// Starting point for optimisation, or the final values when
    /// `optimize` is false. Heuristics are used when absent.
    #[serde(default)]
    pub initial: Option<Hyperparameters>,
}

impl Default for GpConfig {
    fn default() -> Self {
        Self {
            family: KernelFamily::default(),
            ard: false,
            optimize: default_true(),
            max_iterations: default_max_iterations(),
            learning_rate: default_learning_rate(),
            gradient_tolerance: default_gradient_tolerance(),
            initial_noise_fraction: default_initial_noise_fraction(),
            min_noise: default_min_noise(),
            max_noise: default_max_noise(),
            min_length_scale: default_min_length_scale(),
            max_length_scale: default_max_length_scale(),
            jitter_start: default_jitter_start(),
            max_jitter: default_max_jitter(),
            initial: None,
        }
    }
}

impl GpConfig {
    pub fn with_family(mut self, family: KernelFamily) -> Self {
        self.family = family;
        self
    }

    pub fn with_ard(mut self, ard: bool) -> Self {
        self.ard = ard;
        self
    }

    /// Freeze hyperparameters at `hyper`.
    pub fn fixed(mut self, hyper: Hyperparameters) -> Self {
        self.initial = Some(hyper);
        self.optimize = false;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("learning_rate", self.learning_rate),
            ("min_noise", self.min_noise),
            ("min_length_scale", self.min_length_scale),
            ("jitter_start", self.jitter_start),
            ("initial_noise_fraction", self.initial_noise_fraction),
        ];
        for (name, value) in positive {
            if !(value > 0.0 && value.is_finite()) {
                return Err(CamcannError::Config(format!("gp.{name} must be positive, got {value}")));
            }
        }
        if self.max_noise < self.min_noise {
            return Err(CamcannError::Config("gp.max_noise is below gp.min_noise".to_string()));
        }
        if self.max_length_scale < self.min_length_scale {
            return Err(CamcannError::Config(
                "gp.max_length_scale is below gp.min_length_scale".to_string(),
            ));
        }
        if self.max_jitter < self.jitter_start {
            return Err(CamcannError::Config("gp.max_jitter is below gp.jitter_start".to_string()));
        }
        if let Some(h) = &self.initial {
            let all_positive = h.signal_variance > 0.0
                && h.noise_variance > 0.0
                && !h.length_scales.is_empty()
                && h.length_scales.iter().all(|l| *l > 0.0);
            if !all_positive {
                return Err(CamcannError::Config(
                    "gp.initial hyperparameters must all be positive".to_string(),
                ));
            }
        }
        Ok(())
    }
}
