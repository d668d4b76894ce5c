//! Cartogram settings.

use camcann_common::{CamcannError, Result};
use serde::{Deserialize, Serialize};

/// Starting configuration for stress majorisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LayoutInit {
    /// Uniform on the unit square, seeded
    Random,
    /// Top two eigenvectors of the double-centred squared distances
    #[default]
    ClassicalMds,
}

fn default_max_iterations() -> usize {
    300
}

fn default_tolerance() -> f64 {
    1e-6
}

fn default_seed() -> u64 {
    42
}

fn default_neighbours() -> usize {
    5
}

fn default_disagreement_threshold() -> f64 {
    0.5
}

fn default_triplet_samples() -> usize {
    2_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartogramConfig {
    #[serde(default)]
    pub init: LayoutInit,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Stop once the relative stress decrease falls below this
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Neighbourhood size used for diagnostics
    #[serde(default = "default_neighbours")]
    pub neighbours: usize,

    /// Disagreement above which a molecule is flagged
    #[serde(default = "default_disagreement_threshold")]
    pub disagreement_threshold: f64,

    /// Triples sampled for the ordering-agreement metric
    #[serde(default = "default_triplet_samples")]
    pub triplet_samples: usize,
}

impl Default for CartogramConfig {
    fn default() -> Self {
        Self {
            init: LayoutInit::default(),
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
            seed: default_seed(),
            neighbours: default_neighbours(),
            disagreement_threshold: default_disagreement_threshold(),
            triplet_samples: default_triplet_samples(),
        }
    }
}

impl CartogramConfig {
    pub fn with_init(mut self, init: LayoutInit) -> Self {
        self.init = init;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(CamcannError::Config("cartogram.max_iterations must be positive".to_string()));
        }
        if !(self.tolerance >= 0.0) {
            return Err(CamcannError::Config("cartogram.tolerance must be non-negative".to_string()));
        }
        if self.neighbours == 0 {
            return Err(CamcannError::Config("cartogram.neighbours must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.disagreement_threshold) {
            return Err(CamcannError::Config(format!(
                "cartogram.disagreement_threshold must be in [0, 1], got {}",
                self.disagreement_threshold
            )));
        }
        Ok(())
    }
}
