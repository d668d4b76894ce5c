//! Conversion of molecular graphs into Candle tensors.

use candle_core::{Device, Tensor};
use camcann_common::MolecularGraph;

use crate::{EncoderError, Result};

/// Dense tensors for one molecule.
#[derive(Debug, Clone)]
pub struct GraphTensors {
    /// (num_atoms, atom_dim)
    pub atoms: Tensor,
    /// Normalised adjacency with self-loops, (num_atoms, num_atoms)
    pub adjacency: Tensor,
}

impl GraphTensors {
    pub fn from_graph(graph: &MolecularGraph, expected_atom_dim: usize, device: &Device) -> Result<Self> {
        let n = graph.num_atoms();
        let atom_dim = graph.atom_feature_dim();
        if n == 0 {
            return Err(EncoderError::InvalidInput("molecule has no atoms".to_string()));
        }
        if atom_dim != expected_atom_dim {
            return Err(EncoderError::DimensionMismatch {
                expected: expected_atom_dim,
                found: atom_dim,
            });
        }

        let flat: Vec<f32> = graph.atom_features().iter().flatten().copied().collect();
        let atoms = Tensor::from_vec(flat, (n, atom_dim), device)?;
        let adjacency = Tensor::from_vec(graph.normalised_adjacency(), (n, n), device)?;
        Ok(Self { atoms, adjacency })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camcann_common::Bond;

    #[test]
    fn test_shapes() {
        let graph = MolecularGraph::new(
            vec![vec![1.0, 0.0, 0.0]; 4],
            vec![Bond::single(0, 1), Bond::single(1, 2), Bond::single(2, 3)],
        )
        .unwrap();
        let t = GraphTensors::from_graph(&graph, 3, &Device::Cpu).unwrap();
        assert_eq!(t.atoms.dims(), &[4, 3]);
        assert_eq!(t.adjacency.dims(), &[4, 4]);
    }

    #[test]
    fn test_wrong_atom_dim() {
        let graph = MolecularGraph::new(vec![vec![1.0, 0.0]], vec![]).unwrap();
        let err = GraphTensors::from_graph(&graph, 3, &Device::Cpu).unwrap_err();
        assert!(matches!(err, EncoderError::DimensionMismatch { expected: 3, found: 2 }));
    }
}
