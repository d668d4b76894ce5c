//! Two-dimensional maps of the fitted kernel space and their diagnostics.

use std::collections::HashMap;

use camcann_common::{CamcannError, LatentVector, Result};
use camcann_gp::TrainedGp;
use nalgebra::DMatrix;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::distances::{nearest_by, KernelDistances};
use crate::smacof::smacof;
use crate::CartogramConfig;

/// A molecule to place on the map.
#[derive(Debug, Clone)]
pub struct MapEntry {
    pub id: Uuid,
    pub name: String,
    pub latent: LatentVector,
}

impl MapEntry {
    pub fn new(name: impl Into<String>, latent: LatentVector) -> Self {
        Self {
            id: latent.molecule_id(),
            name: name.into(),
            latent,
        }
    }
}

/// A placed molecule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapPoint {
    pub id: Uuid,
    pub name: String,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbour {
    pub id: Uuid,
    pub name: String,
    pub layout_distance: f64,
    pub kernel_distance: f64,
}

/// How faithfully the map represents one molecule's neighbourhood.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighbourhoodDiagnostic {
    pub id: Uuid,
    pub name: String,
    /// Nearest molecules on the map
    pub neighbours: Vec<Neighbour>,
    /// Mean normalised kernel similarity to the map neighbours
    pub mean_similarity: f64,
    /// Fraction of map neighbours that are also kernel-space nearest neighbours
    pub kernel_overlap: f64,
    /// `1 − mean_similarity`, clamped to [0, 1]
    pub disagreement: f64,
    pub poorly_represented: bool,
}

/// Builds cartograms.
#[derive(Debug, Clone, Default)]
pub struct Cartographer {
    config: CartogramConfig,
}

impl Cartographer {
    pub fn new(config: CartogramConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CartogramConfig {
        &self.config
    }

    /// Lay out `entries` using the GP's fitted kernel.
    pub fn embed(&self, gp: &TrainedGp, entries: Vec<MapEntry>) -> Result<Cartogram> {
        let latents: Vec<LatentVector> = entries.iter().map(|e| e.latent.clone()).collect();
        let gram = gp.gram(&latents)?;
        self.embed_gram(entries.into_iter().map(|e| (e.id, e.name)).collect(), gram)
    }

    /// Lay out items whose pairwise kernel values are already known.
    #[instrument(skip_all, fields(n = items.len()))]
    pub fn embed_gram(&self, items: Vec<(Uuid, String)>, gram: DMatrix<f64>) -> Result<Cartogram> {
        if gram.nrows() != items.len() {
            return Err(CamcannError::DimensionMismatch {
                expected: items.len(),
                found: gram.nrows(),
            });
        }
        let mut index = HashMap::with_capacity(items.len());
        for (i, (id, _)) in items.iter().enumerate() {
            if index.insert(*id, i).is_some() {
                return Err(CamcannError::InvalidInput(format!("molecule {id} appears twice")));
            }
        }

        let distances = KernelDistances::from_gram(gram)?;
        let layout = smacof(
            distances.matrix(),
            self.config.init,
            self.config.seed,
            self.config.max_iterations,
            self.config.tolerance,
        );
        if !layout.converged {
            warn!(iterations = layout.iterations, "Stress majorisation hit its iteration budget");
        }
        info!(
            "Cartogram of {} molecules: stress-1 {:.4} after {} iterations",
            items.len(),
            layout.stress,
            layout.iterations
        );

        Ok(Cartogram {
            items,
            index,
            coords: layout.coords,
            distances,
            stress: layout.stress,
            iterations: layout.iterations,
            converged: layout.converged,
            threshold: self.config.disagreement_threshold,
        })
    }
}

/// Molecule id → 2-D coordinate, plus the kernel distances it approximates.
#[derive(Debug, Clone)]
pub struct Cartogram {
    items: Vec<(Uuid, String)>,
    index: HashMap<Uuid, usize>,
    coords: DMatrix<f64>,
    distances: KernelDistances,
    stress: f64,
    iterations: usize,
    converged: bool,
    threshold: f64,
}

impl Cartogram {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Normalised stress (stress-1) of the final layout.
    pub fn stress(&self) -> f64 {
        self.stress
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn kernel_distances(&self) -> &KernelDistances {
        &self.distances
    }

    fn position(&self, id: &Uuid) -> Result<usize> {
        self.index.get(id).copied().ok_or(CamcannError::UnknownMolecule(*id))
    }

    pub fn coordinates(&self, id: &Uuid) -> Result<(f64, f64)> {
        let i = self.position(id)?;
        Ok((self.coords[(i, 0)], self.coords[(i, 1)]))
    }

    pub fn points(&self) -> Vec<MapPoint> {
        self.items
            .iter()
            .enumerate()
            .map(|(i, (id, name))| MapPoint {
                id: *id,
                name: name.clone(),
                x: self.coords[(i, 0)],
                y: self.coords[(i, 1)],
            })
            .collect()
    }

    fn layout_distance(&self, i: usize, j: usize) -> f64 {
        ((self.coords[(i, 0)] - self.coords[(j, 0)]).powi(2)
            + (self.coords[(i, 1)] - self.coords[(j, 1)]).powi(2))
        .sqrt()
    }

    /// Map distance between two molecules.
    pub fn distance(&self, a: &Uuid, b: &Uuid) -> Result<f64> {
        Ok(self.layout_distance(self.position(a)?, self.position(b)?))
    }

    fn layout_nearest(&self, i: usize, k: usize) -> Vec<usize> {
        nearest_by(self.len(), i, k, |j| self.layout_distance(i, j))
    }

    /// The `k` molecules closest to `id` on the map, closest first.
    pub fn neighbours(&self, id: &Uuid, k: usize) -> Result<Vec<Neighbour>> {
        let i = self.position(id)?;
        Ok(self
            .layout_nearest(i, k)
            .into_iter()
            .map(|j| Neighbour {
                id: self.items[j].0,
                name: self.items[j].1.clone(),
                layout_distance: self.layout_distance(i, j),
                kernel_distance: self.distances.get(i, j),
            })
            .collect())
    }

    pub fn diagnose(&self, id: &Uuid, k: usize) -> Result<NeighbourhoodDiagnostic> {
        let i = self.position(id)?;
        Ok(self.diagnose_index(i, k))
    }

    fn diagnose_index(&self, i: usize, k: usize) -> NeighbourhoodDiagnostic {
        let on_map = self.layout_nearest(i, k);
        let in_kernel = self.distances.nearest(i, k);

        let (mean_similarity, kernel_overlap) = if on_map.is_empty() {
            (1.0, 1.0)
        } else {
            let m = on_map.len() as f64;
            let sim = on_map.iter().map(|&j| self.distances.similarity(i, j)).sum::<f64>() / m;
            let shared = on_map.iter().filter(|j| in_kernel.contains(j)).count() as f64;
            (sim, shared / m)
        };
        let disagreement = (1.0 - mean_similarity).clamp(0.0, 1.0);

        let neighbours = on_map
            .iter()
            .map(|&j| Neighbour {
                id: self.items[j].0,
                name: self.items[j].1.clone(),
                layout_distance: self.layout_distance(i, j),
                kernel_distance: self.distances.get(i, j),
            })
            .collect();

        NeighbourhoodDiagnostic {
            id: self.items[i].0,
            name: self.items[i].1.clone(),
            neighbours,
            mean_similarity,
            kernel_overlap,
            disagreement,
            poorly_represented: disagreement > self.threshold,
        }
    }

    /// Diagnostics for every flagged molecule, worst first.
    pub fn poorly_represented(&self, k: usize) -> Vec<NeighbourhoodDiagnostic> {
        let mut flagged: Vec<NeighbourhoodDiagnostic> = (0..self.len())
            .map(|i| self.diagnose_index(i, k))
            .filter(|d| d.poorly_represented)
            .collect();
        flagged.sort_by(|a, b| b.disagreement.total_cmp(&a.disagreement));
        flagged
    }

    /// Fraction of `samples` random triples `(i, j, l)` for which the map
    /// orders `d(i,j)` vs `d(i,l)` the same way the kernel does. Triples
    /// the kernel cannot order are skipped; a tie in the map where the
    /// kernel has an order counts against it.
    pub fn triplet_agreement(&self, samples: usize, seed: u64) -> f64 {
        let n = self.len();
        if n < 3 || samples == 0 {
            return 1.0;
        }
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut agree = 0usize;
        let mut counted = 0usize;
        for _ in 0..samples {
            let i = rng.gen_range(0..n);
            let j = rng.gen_range(0..n);
            let l = rng.gen_range(0..n);
            if i == j || i == l || j == l {
                continue;
            }
            let kernel = self.distances.get(i, j) - self.distances.get(i, l);
            if kernel.abs() < 1e-12 {
                continue;
            }
            let layout = self.layout_distance(i, j) - self.layout_distance(i, l);
            counted += 1;
            if layout != 0.0 && kernel.signum() == layout.signum() {
                agree += 1;
            }
        }
        if counted == 0 {
            1.0
        } else {
            agree as f64 / counted as f64
        }
    }
}
