//! Dense LU decomposition for the coarsest level
//!
//! By the time agglomeration stops, a level holds a handful of unknowns;
//! a dense factorization with partial pivoting solves it exactly and
//! cheaply. Cyclic couplings fold into the dense matrix, so the coarsest
//! level of a periodic case is still solved exactly.

use fvm_matrix::Scalar;
use ndarray::{Array1, Array2};
use thiserror::Error;

/// Errors from the dense factorization
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LuError {
    #[error("matrix is singular or nearly singular")]
    SingularMatrix,
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// LU factors with partial pivoting.
///
/// L is unit lower triangular and stored below the diagonal of `lu`;
/// U occupies the diagonal and above.
#[derive(Debug, Clone)]
pub struct LuFactors<T: Scalar> {
    lu: Array2<T>,
    pivots: Vec<usize>,
    n: usize,
}

/// Factorize a square dense matrix.
pub fn factorize<T: Scalar>(a: &Array2<T>) -> Result<LuFactors<T>, LuError> {
    let n = a.nrows();
    if a.ncols() != n {
        return Err(LuError::DimensionMismatch {
            expected: n,
            got: a.ncols(),
        });
    }

    let tiny = T::from_f64(1e-30).unwrap();
    let mut lu = a.clone();
    let mut pivots = vec![0usize; n];

    for k in 0..n {
        // partial pivoting: largest magnitude in column k at or below row k
        let mut pivot = k;
        let mut max = lu[[k, k]].abs();
        for i in k + 1..n {
            let mag = lu[[i, k]].abs();
            if mag > max {
                max = mag;
                pivot = i;
            }
        }
        pivots[k] = pivot;
        if max < tiny {
            return Err(LuError::SingularMatrix);
        }
        if pivot != k {
            for j in 0..n {
                let tmp = lu[[k, j]];
                lu[[k, j]] = lu[[pivot, j]];
                lu[[pivot, j]] = tmp;
            }
        }

        let d = lu[[k, k]];
        for i in k + 1..n {
            let l = lu[[i, k]] / d;
            lu[[i, k]] = l;
            for j in k + 1..n {
                let u = lu[[k, j]];
                lu[[i, j]] = lu[[i, j]] - l * u;
            }
        }
    }

    Ok(LuFactors { lu, pivots, n })
}

impl<T: Scalar> LuFactors<T> {
    /// Solve `A x = b` with the stored factors.
    pub fn solve(&self, b: &Array1<T>) -> Result<Array1<T>, LuError> {
        if b.len() != self.n {
            return Err(LuError::DimensionMismatch {
                expected: self.n,
                got: b.len(),
            });
        }

        let mut x = b.clone();

        // apply the row permutation
        for i in 0..self.n {
            let pivot = self.pivots[i];
            if pivot != i {
                x.swap(i, pivot);
            }
        }

        // forward substitution: L y = P b
        for i in 0..self.n {
            for j in 0..i {
                let l = self.lu[[i, j]];
                x[i] = x[i] - l * x[j];
            }
        }

        // backward substitution: U x = y
        for i in (0..self.n).rev() {
            for j in i + 1..self.n {
                let u = self.lu[[i, j]];
                x[i] = x[i] - u * x[j];
            }
            x[i] = x[i] / self.lu[[i, i]];
        }

        Ok(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn solves_a_known_system() {
        let a = array![[4.0, -1.0, 0.0], [-1.0, 4.0, -1.0], [0.0, -1.0, 4.0]];
        let b = array![1.0, 2.0, 3.0];

        let factors = factorize(&a).unwrap();
        let x = factors.solve(&b).unwrap();

        // verify by substitution
        for i in 0..3 {
            let mut ax = 0.0;
            for j in 0..3 {
                ax += a[[i, j]] * x[j];
            }
            assert_relative_eq!(ax, b[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn pivoting_handles_zero_leading_entry() {
        let a = array![[0.0, 1.0], [1.0, 0.0]];
        let b = array![3.0, 5.0];
        let x = factorize(&a).unwrap().solve(&b).unwrap();
        assert_relative_eq!(x[0], 5.0);
        assert_relative_eq!(x[1], 3.0);
    }

    #[test]
    fn singular_matrix_is_reported() {
        let a = array![[1.0, 2.0], [2.0, 4.0]];
        assert_eq!(factorize(&a).err(), Some(LuError::SingularMatrix));
    }

    #[test]
    fn dimension_mismatch_is_reported() {
        let a = array![[1.0, 0.0], [0.0, 1.0]];
        let factors = factorize(&a).unwrap();
        let b = array![1.0, 2.0, 3.0];
        assert_eq!(
            factors.solve(&b).err(),
            Some(LuError::DimensionMismatch {
                expected: 2,
                got: 3
            })
        );
    }
}
