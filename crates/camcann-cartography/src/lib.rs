//! Cartographic views of the learned kernel space.
//!
//! A [`Cartographer`] turns the fitted GP kernel over a set of molecules into
//! kernel distances, lays them out in the plane by stress majorisation and
//! answers neighbourhood queries against the result.

pub mod cartogram;
pub mod config;
pub mod distances;
pub mod smacof;

pub use cartogram::{Cartogram, Cartographer, MapEntry, MapPoint, Neighbour, NeighbourhoodDiagnostic};
pub use config::{CartogramConfig, LayoutInit};
pub use distances::KernelDistances;
pub use smacof::{classical_mds, normalised_stress, raw_stress, smacof, Layout};
