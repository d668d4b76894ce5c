//! Gaussian-process regression on frozen latent representations.
//!
//! The GP sees molecules only through [`camcann_common::LatentVector`]s;
//! it has no knowledge of the encoder that produced them.

pub mod cholesky;
pub mod config;
pub mod gp;
pub mod kernel;
pub mod optimise;

pub use cholesky::{stable_cholesky, StableCholesky};
pub use config::{GpConfig, Hyperparameters};
pub use gp::{GaussianProcess, Prediction, TrainedGp};
pub use kernel::{Kernel, KernelFamily};
pub use optimise::OptimisationTrace;
