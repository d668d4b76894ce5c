//! SMACOF stress majorisation in two dimensions.
//!
//! Minimises raw stress `σ(X) = Σ_{i<j} (d_ij − ‖x_i − x_j‖)²` with unit
//! weights by repeated Guttman transforms `X ← n⁻¹ B(X) X`.

use nalgebra::{DMatrix, SymmetricEigen};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::LayoutInit;

pub const DIMS: usize = 2;

/// Result of one stress-majorisation run.
#[derive(Debug, Clone)]
pub struct Layout {
    /// `n × 2` coordinates
    pub coords: DMatrix<f64>,
    /// Normalised stress (stress-1)
    pub stress: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Uniform positions on the unit square.
pub fn random_layout(n: usize, seed: u64) -> DMatrix<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut coords = DMatrix::zeros(n, DIMS);
    for i in 0..n {
        for d in 0..DIMS {
            coords[(i, d)] = rng.gen::<f64>();
        }
    }
    coords
}

/// Classical (Torgerson) MDS: top-2 eigenpairs of `−½ J D² J`.
pub fn classical_mds(distances: &DMatrix<f64>) -> DMatrix<f64> {
    let n = distances.nrows();
    let mut coords = DMatrix::zeros(n, DIMS);
    if n < 2 {
        return coords;
    }

    let sq = distances.map(|d| d * d);
    let row_means: Vec<f64> = (0..n).map(|i| sq.row(i).sum() / n as f64).collect();
    let grand = row_means.iter().sum::<f64>() / n as f64;
    let b = DMatrix::from_fn(n, n, |i, j| -0.5 * (sq[(i, j)] - row_means[i] - row_means[j] + grand));

    let eigen = SymmetricEigen::new(b);
    // nalgebra doesn't order eigenvalues
    let mut order: Vec<(usize, f64)> = eigen.eigenvalues.iter().copied().enumerate().collect();
    order.sort_by(|a, b| b.1.total_cmp(&a.1));

    for (d, (idx, value)) in order.into_iter().take(DIMS).enumerate() {
        let scale = value.max(0.0).sqrt();
        for i in 0..n {
            coords[(i, d)] = eigen.eigenvectors[(i, idx)] * scale;
        }
    }
    coords
}

fn euclidean(coords: &DMatrix<f64>, i: usize, j: usize) -> f64 {
    (0..coords.ncols())
        .map(|d| (coords[(i, d)] - coords[(j, d)]).powi(2))
        .sum::<f64>()
        .sqrt()
}

pub fn raw_stress(distances: &DMatrix<f64>, coords: &DMatrix<f64>) -> f64 {
    let n = distances.nrows();
    let mut s = 0.0;
    for i in 0..n {
        for j in 0..i {
            s += (distances[(i, j)] - euclidean(coords, i, j)).powi(2);
        }
    }
    s
}

/// `sqrt(σ / Σ d_ij²)`; zero when every target distance is zero.
pub fn normalised_stress(distances: &DMatrix<f64>, coords: &DMatrix<f64>) -> f64 {
    let n = distances.nrows();
    let mut total = 0.0;
    for i in 0..n {
        for j in 0..i {
            total += distances[(i, j)].powi(2);
        }
    }
    if total > 0.0 {
        (raw_stress(distances, coords) / total).sqrt()
    } else {
        0.0
    }
}

fn guttman(distances: &DMatrix<f64>, coords: &DMatrix<f64>) -> DMatrix<f64> {
    let n = distances.nrows();
    let mut b = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in 0..i {
            let current = euclidean(coords, i, j);
            let v = if current > 1e-12 { -distances[(i, j)] / current } else { 0.0 };
            b[(i, j)] = v;
            b[(j, i)] = v;
        }
    }
    for i in 0..n {
        b[(i, i)] = -b.row(i).sum();
    }
    (b * coords) / n as f64
}

/// Run SMACOF on a symmetric distance matrix.
pub fn smacof(
    distances: &DMatrix<f64>,
    init: LayoutInit,
    seed: u64,
    max_iterations: usize,
    tolerance: f64,
) -> Layout {
    let n = distances.nrows();
    let mut coords = match init {
        LayoutInit::Random => random_layout(n, seed),
        LayoutInit::ClassicalMds => classical_mds(distances),
    };
    // all-coincident MDS start would leave B(X) = 0
    if n > 1 && (1..n).all(|i| euclidean(&coords, 0, i) < 1e-12) {
        coords = random_layout(n, seed);
    }

    let mut stress = raw_stress(distances, &coords);
    let mut iterations = 0;
    let mut converged = n < 3;

    while !converged && iterations < max_iterations {
        let next = guttman(distances, &coords);
        let next_stress = raw_stress(distances, &next);
        iterations += 1;

        let relative = if stress > 0.0 { (stress - next_stress) / stress } else { 0.0 };
        coords = next;
        stress = next_stress;
        if relative < tolerance {
            converged = true;
        }
    }

    if n == 2 {
        // exact: place the pair on the x axis at their distance
        coords = DMatrix::zeros(2, DIMS);
        coords[(1, 0)] = distances[(0, 1)];
    }

    let stress = normalised_stress(distances, &coords);
    debug!(n, iterations, converged, stress, "stress majorisation finished");
    Layout {
        coords,
        stress,
        iterations,
        converged,
    }
}
