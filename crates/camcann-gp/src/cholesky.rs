//! Jitter-stabilised Cholesky factorisation.

use camcann_common::{CamcannError, Result};
use nalgebra::{Cholesky, DMatrix, Dyn};
use tracing::{debug, warn};

/// A successful factorisation and the diagonal jitter it needed.
pub struct StableCholesky {
    pub factor: Cholesky<f64, Dyn>,
    /// Absolute jitter added to the diagonal (0 when none was needed)
    pub jitter: f64,
}

/// Factorise `matrix`, retrying with jitter `start·s, 10·start·s, …` up to
/// `max·s`, where `s` is the mean diagonal magnitude.
pub fn stable_cholesky(matrix: &DMatrix<f64>, start: f64, max: f64) -> Result<StableCholesky> {
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(CamcannError::NumericalInstability { jitter: 0.0 });
    }
    if let Some(factor) = Cholesky::new(matrix.clone()) {
        return Ok(StableCholesky { factor, jitter: 0.0 });
    }

    let n = matrix.nrows();
    let scale = if n == 0 {
        1.0
    } else {
        (matrix.diagonal().iter().map(|v| v.abs()).sum::<f64>() / n as f64).max(f64::MIN_POSITIVE)
    };
    let limit = max * scale;
    let mut jitter = start * scale;
    let mut last = jitter;

    while jitter <= limit {
        let mut shifted = matrix.clone();
        for i in 0..n {
            shifted[(i, i)] += jitter;
        }
        if let Some(factor) = Cholesky::new(shifted) {
            if jitter > 1e-6 * scale {
                warn!(jitter, "Covariance needed large diagonal jitter");
            } else {
                debug!(jitter, "Covariance stabilised with jitter");
            }
            return Ok(StableCholesky { factor, jitter });
        }
        last = jitter;
        jitter *= 10.0;
    }

    Err(CamcannError::NumericalInstability { jitter: last })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_definite_needs_no_jitter() {
        let m = DMatrix::from_row_slice(2, 2, &[2.0, 0.5, 0.5, 1.0]);
        let chol = stable_cholesky(&m, 1e-10, 1e-2).unwrap();
        assert_eq!(chol.jitter, 0.0);
        let l = chol.factor.l();
        let back = &l * l.transpose();
        assert!((back - m).abs().max() < 1e-12);
    }

    #[test]
    fn test_singular_matrix_is_rescued_by_jitter() {
        // duplicated point with no noise
        let m = DMatrix::from_element(3, 3, 1.0);
        let chol = stable_cholesky(&m, 1e-10, 1e-2).unwrap();
        assert!(chol.jitter > 0.0);
        assert!(chol.jitter <= 1e-2);
    }

    #[test]
    fn test_indefinite_matrix_fails() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        match stable_cholesky(&m, 1e-10, 1e-2) {
            Err(CamcannError::NumericalInstability { jitter }) => assert!(jitter > 0.0),
            other => panic!("expected NumericalInstability, got {:?}", other.map(|c| c.jitter)),
        }
    }

    #[test]
    fn test_non_finite_entries_fail() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, f64::NAN, f64::NAN, 1.0]);
        assert!(matches!(
            stable_cholesky(&m, 1e-10, 1e-2),
            Err(CamcannError::NumericalInstability { .. })
        ));
    }
}
