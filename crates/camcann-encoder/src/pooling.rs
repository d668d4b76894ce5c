//! Readout strategies turning per-atom embeddings into one molecule embedding.

use candle_core::Tensor;
use serde::{Deserialize, Serialize};

/// Pooling strategy over the atoms of one molecule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PoolingStrategy {
    /// Mean over atoms; size-invariant
    #[default]
    Mean,

    /// Sum over atoms; grows with chain length
    Sum,

    /// Element-wise max over atoms
    Max,
}

impl PoolingStrategy {
    /// Apply pooling to atom embeddings.
    ///
    /// # Arguments
    /// * `atoms` - Tensor of shape (num_atoms, hidden_dim)
    ///
    /// # Returns
    /// Tensor of shape (1, hidden_dim)
    pub fn apply(&self, atoms: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            PoolingStrategy::Mean => atoms.mean_keepdim(0),
            PoolingStrategy::Sum => atoms.sum_keepdim(0),
            PoolingStrategy::Max => atoms.max_keepdim(0),
        }
    }
}

/// L2 normalize embeddings row-wise.
pub fn l2_normalize(embeddings: &Tensor) -> candle_core::Result<Tensor> {
    // embeddings: (batch, dim)
    let norms = embeddings.sqr()?.sum_keepdim(1)?.sqrt()?;
    let norms_clamped = norms.clamp(1e-9f32, f32::MAX)?;
    embeddings.broadcast_div(&norms_clamped)
}
