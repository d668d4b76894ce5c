//! Pass-through encoder over precomputed ECFP vectors.
//!
//! Lets the GP stage run on fingerprints without a trained GNN.

use camcann_common::{CamcannError, LatentVector, Molecule};

use crate::LatentEncoder;

#[derive(Debug, Clone)]
pub struct FingerprintEncoder {
    dim: usize,
}

impl FingerprintEncoder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl LatentEncoder for FingerprintEncoder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn encode(&self, molecule: &Molecule) -> camcann_common::Result<LatentVector> {
        let fp = molecule.fingerprint().ok_or_else(|| {
            CamcannError::InvalidInput(format!("{} has no fingerprint", molecule.name()))
        })?;
        if fp.len() != self.dim {
            return Err(CamcannError::DimensionMismatch {
                expected: self.dim,
                found: fp.len(),
            });
        }
        Ok(LatentVector::new(
            molecule.id(),
            fp.iter().map(|&b| b as f64).collect(),
        ))
    }
}
