//! Kernel-induced distances between molecules.

use camcann_common::{CamcannError, Result};
use nalgebra::DMatrix;

/// Pairwise `d(i,j) = sqrt(max(0, k(i,i) + k(j,j) − 2k(i,j)))`, together with
/// the Gram matrix it came from.
#[derive(Debug, Clone)]
pub struct KernelDistances {
    gram: DMatrix<f64>,
    distances: DMatrix<f64>,
}

impl KernelDistances {
    pub fn from_gram(gram: DMatrix<f64>) -> Result<Self> {
        if gram.nrows() != gram.ncols() {
            return Err(CamcannError::DimensionMismatch {
                expected: gram.nrows(),
                found: gram.ncols(),
            });
        }
        if gram.iter().any(|v| !v.is_finite()) {
            return Err(CamcannError::InvalidInput("Gram matrix has non-finite entries".to_string()));
        }

        let n = gram.nrows();
        let mut distances = DMatrix::zeros(n, n);
        for i in 0..n {
            for j in 0..i {
                // average both triangles so d is symmetric even if the Gram is not quite
                let kij = 0.5 * (gram[(i, j)] + gram[(j, i)]);
                let d = (gram[(i, i)] + gram[(j, j)] - 2.0 * kij).max(0.0).sqrt();
                distances[(i, j)] = d;
                distances[(j, i)] = d;
            }
        }
        Ok(Self { gram, distances })
    }

    pub fn len(&self) -> usize {
        self.distances.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.distances[(i, j)]
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.distances
    }

    pub fn gram(&self) -> &DMatrix<f64> {
        &self.gram
    }

    /// Normalised kernel similarity `k(i,j) / sqrt(k(i,i) k(j,j))` in [-1, 1].
    pub fn similarity(&self, i: usize, j: usize) -> f64 {
        let denom = (self.gram[(i, i)] * self.gram[(j, j)]).sqrt();
        if denom > 0.0 {
            (self.gram[(i, j)] / denom).clamp(-1.0, 1.0)
        } else {
            0.0
        }
    }

    /// The `k` nearest other items to `i` in kernel space, closest first.
    pub fn nearest(&self, i: usize, k: usize) -> Vec<usize> {
        nearest_by(self.len(), i, k, |j| self.get(i, j))
    }
}

/// Indices `j != i` sorted by `dist(j)`, ties broken by index, truncated to `k`.
pub(crate) fn nearest_by(n: usize, i: usize, k: usize, dist: impl Fn(usize) -> f64) -> Vec<usize> {
    let mut others: Vec<(usize, f64)> = (0..n).filter(|&j| j != i).map(|j| (j, dist(j))).collect();
    others.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    others.into_iter().take(k).map(|(j, _)| j).collect()
}
