//! Error types for the encoder.

use camcann_common::CamcannError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EncoderError>;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Tensor error: {0}")]
    Tensor(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Atom feature dimension mismatch: encoder expects {expected}, molecule has {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<candle_core::Error> for EncoderError {
    fn from(e: candle_core::Error) -> Self {
        EncoderError::Tensor(e.to_string())
    }
}

impl From<EncoderError> for CamcannError {
    fn from(e: EncoderError) -> Self {
        match e {
            EncoderError::DimensionMismatch { expected, found } => {
                CamcannError::DimensionMismatch { expected, found }
            }
            EncoderError::InvalidInput(msg) => CamcannError::InvalidInput(msg),
            EncoderError::Io(e) => CamcannError::Io(e),
            EncoderError::Json(e) => CamcannError::Serialization(e),
            other => CamcannError::Encoder(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_keeps_shared_variants() {
        let e: CamcannError = EncoderError::DimensionMismatch { expected: 6, found: 4 }.into();
        assert!(matches!(e, CamcannError::DimensionMismatch { expected: 6, found: 4 }));

        let e: CamcannError = EncoderError::from(candle_core::Error::Msg("shape".to_string())).into();
        match e {
            CamcannError::Encoder(msg) => assert!(msg.contains("shape")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
