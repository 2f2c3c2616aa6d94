//! Face-addressed sparse matrix for one solver level
//!
//! The matrix stores:
//! - `diag`: one coefficient per cell
//! - `owner`/`neighbour`: the two cell indices of each internal face
//! - `off_diag`: one coefficient per internal face, standing for both
//!   `a(owner, neighbour)` and `a(neighbour, owner)` (symmetric systems)
//!
//! Couplings across partition or periodic boundaries are not part of this
//! struct; they live in [`crate::interface::CoupledMatrix`].

use crate::error::MatrixError;
use crate::traits::Scalar;
use ndarray::Array1;

/// Sparse matrix in owner/neighbour face addressing.
#[derive(Debug, Clone)]
pub struct LduMatrix<T: Scalar> {
    /// Diagonal coefficient per cell
    pub diag: Vec<T>,
    /// Owner cell of each internal face
    pub owner: Vec<usize>,
    /// Neighbour cell of each internal face
    pub neighbour: Vec<usize>,
    /// Symmetric off-diagonal coefficient per internal face
    pub off_diag: Vec<T>,
}

impl<T: Scalar> LduMatrix<T> {
    pub fn new(diag: Vec<T>, owner: Vec<usize>, neighbour: Vec<usize>, off_diag: Vec<T>) -> Self {
        Self {
            diag,
            owner,
            neighbour,
            off_diag,
        }
    }

    /// Diagonal-only matrix with no internal faces.
    pub fn diagonal(diag: Vec<T>) -> Self {
        Self::new(diag, Vec::new(), Vec::new(), Vec::new())
    }

    /// Number of cells (local unknowns) on this level.
    pub fn n_cells(&self) -> usize {
        self.diag.len()
    }

    /// Number of internal faces.
    pub fn n_faces(&self) -> usize {
        self.off_diag.len()
    }

    /// Check the addressing for consistency.
    ///
    /// An inconsistent description is a fatal configuration error; nothing
    /// downstream recovers from it.
    pub fn validate(&self) -> Result<(), MatrixError> {
        let n = self.n_cells();
        if n == 0 {
            return Err(MatrixError::Empty);
        }
        if self.owner.len() != self.off_diag.len() || self.neighbour.len() != self.off_diag.len() {
            return Err(MatrixError::FaceArrayMismatch {
                owners: self.owner.len(),
                neighbours: self.neighbour.len(),
                coeffs: self.off_diag.len(),
            });
        }
        for f in 0..self.n_faces() {
            for cell in [self.owner[f], self.neighbour[f]] {
                if cell >= n {
                    return Err(MatrixError::CellOutOfRange {
                        face: f,
                        cell,
                        n_cells: n,
                    });
                }
            }
        }
        Ok(())
    }

    /// Matrix-vector product of the local part: `y = A_local * x`.
    ///
    /// Overwrites `y`. Coupling terms across interfaces are added separately
    /// by [`crate::interface::CoupledMatrix::matvec`].
    pub fn matvec_into(&self, x: &Array1<T>, y: &mut Array1<T>) {
        for i in 0..self.n_cells() {
            y[i] = self.diag[i] * x[i];
        }
        for f in 0..self.n_faces() {
            let (o, n) = (self.owner[f], self.neighbour[f]);
            let c = self.off_diag[f];
            y[o] += c * x[n];
            y[n] += c * x[o];
        }
    }

    /// Total coefficient mass of the local part.
    ///
    /// Each face coefficient stands for two matrix entries, so it counts
    /// twice. Agglomeration conserves this sum level to level.
    pub fn coefficient_mass(&self) -> T {
        let two = T::one() + T::one();
        let d: T = self.diag.iter().copied().sum();
        let f: T = self.off_diag.iter().copied().sum();
        d + two * f
    }
}

/// Sum of squares of a vector, used for residual norms.
pub fn sum_sqr<T: Scalar>(v: &Array1<T>) -> T {
    #[cfg(feature = "rayon")]
    {
        if v.len() >= 4096 {
            if let Some(s) = v.as_slice() {
                use rayon::prelude::*;
                return s.par_iter().map(|&a| a * a).sum();
            }
        }
    }

    v.iter().map(|&a| a * a).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn chain(n: usize) -> LduMatrix<f64> {
        // 1D Poisson-like chain: diag 2, off-diagonal -1 between neighbours
        let owner: Vec<usize> = (0..n - 1).collect();
        let neighbour: Vec<usize> = (1..n).collect();
        LduMatrix::new(vec![2.0; n], owner, neighbour, vec![-1.0; n - 1])
    }

    #[test]
    fn matvec_matches_dense() {
        let m = chain(4);
        let x = array![1.0, 2.0, 3.0, 4.0];
        let mut y = Array1::from_elem(4, 0.0);
        m.matvec_into(&x, &mut y);

        // [2 -1 0 0; -1 2 -1 0; 0 -1 2 -1; 0 0 -1 2] * x
        assert_relative_eq!(y[0], 0.0);
        assert_relative_eq!(y[1], 0.0);
        assert_relative_eq!(y[2], 0.0);
        assert_relative_eq!(y[3], 5.0);
    }

    #[test]
    fn coefficient_mass_counts_faces_twice() {
        let m = chain(4);
        assert_relative_eq!(m.coefficient_mass(), 4.0 * 2.0 + 2.0 * 3.0 * (-1.0));
    }

    #[test]
    fn validate_rejects_bad_addressing() {
        let m = LduMatrix::new(vec![1.0, 1.0], vec![0], vec![5], vec![-1.0]);
        assert_eq!(
            m.validate(),
            Err(MatrixError::CellOutOfRange {
                face: 0,
                cell: 5,
                n_cells: 2
            })
        );

        let m = LduMatrix::new(vec![1.0], vec![0, 0], vec![0], vec![-1.0]);
        assert!(matches!(
            m.validate(),
            Err(MatrixError::FaceArrayMismatch { .. })
        ));

        let m = LduMatrix::<f64>::diagonal(Vec::new());
        assert_eq!(m.validate(), Err(MatrixError::Empty));
    }

    #[test]
    fn sum_sqr_of_known_vector() {
        let v = array![1.0, -2.0, 2.0];
        assert_relative_eq!(sum_sqr(&v), 9.0);
    }
}
