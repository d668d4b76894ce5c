//! CamCann Encoder
//!
//! Graph neural network encoder for surfactant molecules, written against
//! Candle (Hugging Face). Training happens in two phases:
//!
//! 1. [`CmcRegressor`] trains the encoder jointly with a linear head on
//!    log-CMC (mean-squared error).
//! 2. [`CmcRegressor::freeze`] drops the head and returns a [`FrozenEncoder`],
//!    a pure `Molecule -> LatentVector` function that feeds the GP.
//!
//! # Example
//! ```rust,ignore
//! use camcann_encoder::{CmcRegressor, EncoderConfig, LatentEncoder};
//!
//! let mut regressor = CmcRegressor::new(EncoderConfig::default(), atom_dim)?;
//! let report = regressor.train(&train_set)?;
//! let encoder = regressor.freeze()?;
//! let latent = encoder.encode(&molecule)?;
//! println!("Latent dimension: {}", latent.dim());
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod frozen;
pub mod graph;
pub mod model;
pub mod pooling;
pub mod training;

use camcann_common::{LatentVector, Molecule};

pub use config::{Activation, EncoderConfig};
pub use error::{EncoderError, Result};
pub use fingerprint::FingerprintEncoder;
pub use frozen::FrozenEncoder;
pub use pooling::PoolingStrategy;
pub use training::{CmcRegressor, TrainingReport};

/// A frozen feature extractor: molecule in, fixed-dimension latent vector out.
///
/// This is the only interface between the encoder and the GP stage.
pub trait LatentEncoder {
    /// Dimension of every vector this encoder produces.
    fn dim(&self) -> usize;

    fn encode(&self, molecule: &Molecule) -> camcann_common::Result<LatentVector>;

    fn encode_batch(&self, molecules: &[&Molecule]) -> camcann_common::Result<Vec<LatentVector>> {
        molecules.iter().map(|m| self.encode(m)).collect()
    }
}
