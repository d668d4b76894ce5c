//! Configuration for the GNN encoder and its pretraining.

use serde::{Deserialize, Serialize};

/// Non-linearity applied after every graph convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Relu,
    Silu,
    Tanh,
}

/// Architecture and training settings for the encoder.
///
/// Architecture values (`latent_dim`, `hidden_dim`, `depth`) come from an
/// external hyperparameter search and are treated as plain configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Dimension D of the latent vector handed to the GP (default: 32)
    #[serde(default = "default_latent_dim")]
    pub latent_dim: usize,

    /// Width of the graph convolutions (default: 64)
    #[serde(default = "default_hidden_dim")]
    pub hidden_dim: usize,

    /// Number of graph convolutions (default: 3)
    #[serde(default = "default_depth")]
    pub depth: usize,

    /// Readout over atoms (default: mean)
    #[serde(default)]
    pub pooling: super::PoolingStrategy,

    #[serde(default)]
    pub activation: Activation,

    /// L2-normalize latent vectors (default: false)
    #[serde(default)]
    pub normalize: bool,

    /// Epoch budget for pretraining (default: 200)
    #[serde(default = "default_epochs")]
    pub epochs: usize,

    /// Mini-batch size (default: 32)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    #[serde(default = "default_weight_decay")]
    pub weight_decay: f64,

    /// Stop once the epoch loss (standardised targets) drops below this
    #[serde(default = "default_loss_tolerance")]
    pub loss_tolerance: f64,

    /// Seed for weight initialisation and batch shuffling
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Use GPU if available (default: false)
    #[serde(default)]
    pub use_gpu: bool,

    /// Maximum cached latent vectors per frozen encoder (0 disables)
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
}

fn default_latent_dim() -> usize { 32 }
fn default_hidden_dim() -> usize { 64 }
fn default_depth() -> usize { 3 }
fn default_epochs() -> usize { 200 }
fn default_batch_size() -> usize { 32 }
fn default_learning_rate() -> f64 { 1e-3 }
fn default_weight_decay() -> f64 { 1e-4 }
fn default_loss_tolerance() -> f64 { 1e-4 }
fn default_seed() -> u64 { 42 }
fn default_cache_size() -> usize { 10_000 }

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            latent_dim: default_latent_dim(),
            hidden_dim: default_hidden_dim(),
            depth: default_depth(),
            pooling: super::PoolingStrategy::Mean,
            activation: Activation::Relu,
            normalize: false,
            epochs: default_epochs(),
            batch_size: default_batch_size(),
            learning_rate: default_learning_rate(),
            weight_decay: default_weight_decay(),
            loss_tolerance: default_loss_tolerance(),
            seed: default_seed(),
            use_gpu: false,
            cache_size: default_cache_size(),
        }
    }
}

impl EncoderConfig {
    /// Create config for CPU-only training.
    pub fn cpu() -> Self {
        Self {
            use_gpu: false,
            ..Default::default()
        }
    }

    /// Set the latent dimension.
    pub fn with_latent_dim(mut self, dim: usize) -> Self {
        self.latent_dim = dim;
        self
    }

    /// Set width and depth of the convolution stack.
    pub fn with_architecture(mut self, hidden_dim: usize, depth: usize) -> Self {
        self.hidden_dim = hidden_dim;
        self.depth = depth;
        self
    }

    /// Set the epoch budget.
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.latent_dim == 0 || self.hidden_dim == 0 || self.depth == 0 {
            return Err(crate::EncoderError::InvalidInput(
                "latent_dim, hidden_dim and depth must be positive".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(crate::EncoderError::InvalidInput("batch_size must be positive".to_string()));
        }
        if !(self.learning_rate > 0.0) {
            return Err(crate::EncoderError::InvalidInput("learning_rate must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EncoderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.latent_dim, 32);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: EncoderConfig = serde_json::from_str(r#"{"latent_dim": 8, "pooling": "max"}"#).unwrap();
        assert_eq!(config.latent_dim, 8);
        assert_eq!(config.pooling, crate::PoolingStrategy::Max);
        assert_eq!(config.depth, 3);
    }

    #[test]
    fn test_zero_depth_rejected() {
        let config = EncoderConfig::default().with_architecture(16, 0);
        assert!(config.validate().is_err());
    }
}
