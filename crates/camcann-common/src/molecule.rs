/// Core molecule types consumed by the encoder, the GP and the cartographer.
/// Featurisation (SMILES parsing, ECFP hashing) happens upstream; these types
/// only carry its output.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CamcannError, Result};
use crate::surfactant::SurfactantClass;

// ---------------------------------------------------------------------------
// Molecular graph
// ---------------------------------------------------------------------------

/// A covalent bond between two atoms. `order` (1.0 single, 1.5 aromatic,
/// 2.0 double, 3.0 triple) weights the adjacency matrix; `features` is the
/// featuriser's bond attribute vector, same width for every bond in a graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bond {
    pub begin: usize,
    pub end: usize,
    pub order: f32,
    #[serde(default)]
    pub features: Vec<f32>,
}

impl Bond {
    pub fn new(begin: usize, end: usize, order: f32) -> Self {
        Self { begin, end, order, features: Vec::new() }
    }

    pub fn single(begin: usize, end: usize) -> Self {
        Self::new(begin, end, 1.0)
    }

    pub fn with_features(mut self, features: Vec<f32>) -> Self {
        self.features = features;
        self
    }
}

/// Atoms carry a fixed-width attribute vector (element one-hot, charge,
/// hydrogen count, ...); the width must be the same for every atom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MolecularGraph {
    atom_features: Vec<Vec<f32>>,
    bonds: Vec<Bond>,
}

impl MolecularGraph {
    pub fn new(atom_features: Vec<Vec<f32>>, bonds: Vec<Bond>) -> Result<Self> {
        let graph = Self { atom_features, bonds };
        graph.validate()?;
        Ok(graph)
    }

    /// Check the invariants that deserialisation cannot enforce.
    pub fn validate(&self) -> Result<()> {
        let width = match self.atom_features.first() {
            Some(first) if !first.is_empty() => first.len(),
            Some(_) => return Err(CamcannError::InvalidInput("atoms have no features".into())),
            None => return Err(CamcannError::InvalidInput("graph has no atoms".into())),
        };
        if let Some(bad) = self.atom_features.iter().find(|a| a.len() != width) {
            return Err(CamcannError::DimensionMismatch { expected: width, found: bad.len() });
        }
        if self.atom_features.iter().flatten().any(|v| !v.is_finite()) {
            return Err(CamcannError::InvalidInput("non-finite atom feature".into()));
        }
        let bond_width = self.bond_feature_dim();
        if let Some(bad) = self.bonds.iter().find(|b| b.features.len() != bond_width) {
            return Err(CamcannError::DimensionMismatch { expected: bond_width, found: bad.features.len() });
        }
        let n = self.atom_features.len();
        for bond in &self.bonds {
            if !(bond.order.is_finite() && bond.order > 0.0) || bond.features.iter().any(|v| !v.is_finite()) {
                return Err(CamcannError::InvalidInput(format!(
                    "bond {}-{} has a non-finite or non-positive attribute",
                    bond.begin, bond.end
                )));
            }
            if bond.begin >= n || bond.end >= n {
                return Err(CamcannError::InvalidInput(format!(
                    "bond {}-{} references an atom outside 0..{}",
                    bond.begin, bond.end, n
                )));
            }
            if bond.begin == bond.end {
                return Err(CamcannError::InvalidInput(format!("self-bond on atom {}", bond.begin)));
            }
        }
        Ok(())
    }

    pub fn num_atoms(&self) -> usize {
        self.atom_features.len()
    }

    pub fn num_bonds(&self) -> usize {
        self.bonds.len()
    }

    pub fn atom_feature_dim(&self) -> usize {
        self.atom_features.first().map(Vec::len).unwrap_or(0)
    }

    /// Width of the bond attribute vectors (0 when bonds carry none).
    pub fn bond_feature_dim(&self) -> usize {
        self.bonds.first().map(|b| b.features.len()).unwrap_or(0)
    }

    pub fn atom_features(&self) -> &[Vec<f32>] {
        &self.atom_features
    }

    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    /// Symmetric normalised adjacency with self-loops,
    /// `D^-1/2 (A + I) D^-1/2`, flattened row-major (n × n).
    pub fn normalised_adjacency(&self) -> Vec<f32> {
        let n = self.num_atoms();
        let mut adj = vec![0.0f32; n * n];
        for i in 0..n {
            adj[i * n + i] = 1.0;
        }
        for bond in &self.bonds {
            adj[bond.begin * n + bond.end] = bond.order;
            adj[bond.end * n + bond.begin] = bond.order;
        }

        let inv_sqrt_degree: Vec<f32> = (0..n)
            .map(|i| {
                let degree: f32 = adj[i * n..(i + 1) * n].iter().sum();
                1.0 / degree.max(1e-6).sqrt()
            })
            .collect();

        for i in 0..n {
            for j in 0..n {
                adj[i * n + j] *= inv_sqrt_degree[i] * inv_sqrt_degree[j];
            }
        }
        adj
    }
}

// ---------------------------------------------------------------------------
// Molecule
// ---------------------------------------------------------------------------

/// A surfactant molecule. Immutable once built: the `with_*` methods consume
/// the value and are only meant for construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Molecule {
    id: Uuid,
    name: String,
    smiles: String,
    graph: MolecularGraph,
    fingerprint: Option<Vec<f32>>,
    class: SurfactantClass,
}

impl Molecule {
    /// Create a molecule; the surfactant class is inferred from the SMILES.
    pub fn new(name: impl Into<String>, smiles: impl Into<String>, graph: MolecularGraph) -> Self {
        let smiles = smiles.into();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            class: SurfactantClass::from_smiles(&smiles),
            smiles,
            graph,
            fingerprint: None,
        }
    }

    /// Attach the ECFP vector computed by the external featuriser.
    pub fn with_fingerprint(mut self, fingerprint: Vec<f32>) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    /// Override the inferred class (curated labels win over heuristics).
    pub fn with_class(mut self, class: SurfactantClass) -> Self {
        self.class = class;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn smiles(&self) -> &str {
        &self.smiles
    }

    pub fn graph(&self) -> &MolecularGraph {
        &self.graph
    }

    pub fn fingerprint(&self) -> Option<&[f32]> {
        self.fingerprint.as_deref()
    }

    pub fn class(&self) -> SurfactantClass {
        self.class
    }
}

// ---------------------------------------------------------------------------
// Latent vector
// ---------------------------------------------------------------------------

/// Output of a frozen encoder for one molecule. Only valid for the encoder
/// that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatentVector {
    molecule_id: Uuid,
    values: Vec<f64>,
}

impl LatentVector {
    pub fn new(molecule_id: Uuid, values: Vec<f64>) -> Self {
        Self { molecule_id, values }
    }

    pub fn molecule_id(&self) -> Uuid {
        self.molecule_id
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn squared_distance(&self, other: &LatentVector) -> f64 {
        self.values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| (a - b) * (a - b))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ethanol_like() -> MolecularGraph {
        MolecularGraph::new(
            vec![vec![1.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0]],
            vec![Bond::single(0, 1), Bond::single(1, 2)],
        )
        .unwrap()
    }

    #[test]
    fn test_graph_rejects_out_of_range_bond() {
        let err = MolecularGraph::new(vec![vec![1.0]], vec![Bond::single(0, 3)]).unwrap_err();
        assert!(matches!(err, CamcannError::InvalidInput(_)));
    }

    #[test]
    fn test_graph_rejects_ragged_bond_features() {
        let atoms = vec![vec![1.0]; 3];
        let bonds = vec![
            Bond::single(0, 1).with_features(vec![1.0, 0.0]),
            Bond::single(1, 2).with_features(vec![1.0]),
        ];
        assert!(matches!(
            MolecularGraph::new(atoms.clone(), bonds),
            Err(CamcannError::DimensionMismatch { expected: 2, found: 1 })
        ));

        let bonds = vec![
            Bond::single(0, 1).with_features(vec![1.0, 0.0]),
            Bond::new(1, 2, 2.0).with_features(vec![0.0, 1.0]),
        ];
        let graph = MolecularGraph::new(atoms, bonds).unwrap();
        assert_eq!(graph.bond_feature_dim(), 2);
    }

    #[test]
    fn test_graph_rejects_ragged_features() {
        let err = MolecularGraph::new(vec![vec![1.0, 0.0], vec![1.0]], vec![]).unwrap_err();
        assert!(matches!(err, CamcannError::DimensionMismatch { expected: 2, found: 1 }));
    }

    #[test]
    fn test_normalised_adjacency_is_symmetric() {
        let adj = ethanol_like().normalised_adjacency();
        let n = 3;
        for i in 0..n {
            for j in 0..n {
                assert!((adj[i * n + j] - adj[j * n + i]).abs() < 1e-6);
            }
        }
        // Terminal atom: degree 2 (self + one neighbour) → 1/2
        assert!((adj[0] - 0.5).abs() < 1e-6);
        // No bond between the two terminal atoms
        assert_eq!(adj[2], 0.0);
    }

    #[test]
    fn test_molecule_infers_class() {
        let mol = Molecule::new("SDS", "CCCCCCCCCCCCOS(=O)(=O)[O-].[Na+]", ethanol_like());
        assert_eq!(mol.class(), SurfactantClass::Anionic);
        assert!(mol.fingerprint().is_none());
    }

    #[test]
    fn test_latent_squared_distance() {
        let id = Uuid::new_v4();
        let a = LatentVector::new(id, vec![0.0, 0.0]);
        let b = LatentVector::new(id, vec![3.0, 4.0]);
        assert!((a.squared_distance(&b) - 25.0).abs() < 1e-12);
    }
}
