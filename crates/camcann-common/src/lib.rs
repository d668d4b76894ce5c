//! camcann-common — Molecule, dataset and error types shared by every CamCann crate.

pub mod error;
pub mod molecule;
pub mod surfactant;
pub mod dataset;

// Re-export commonly used types
pub use error::{CamcannError, Result};
pub use molecule::{Bond, LatentVector, MolecularGraph, Molecule};
pub use surfactant::SurfactantClass;
pub use dataset::{Dataset, DatasetKind, Record};
