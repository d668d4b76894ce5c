use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CamcannError {
    #[error("Numerical instability: Gram matrix not positive definite even with jitter {jitter:e}")]
    NumericalInstability { jitter: f64 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Unknown molecule: {0}")]
    UnknownMolecule(Uuid),

    #[error("Encoder error: {0}")]
    Encoder(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CamcannError>;
