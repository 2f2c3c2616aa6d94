//! Solver-level error type

use crate::lu::LuError;
use fvm_matrix::{MatrixError, TransportError};
use thiserror::Error;

/// Fatal failures of a multigrid build or solve.
///
/// Failing to converge is not an error; the solver reports it through
/// [`crate::solver::SolveReport::converged`].
#[derive(Debug, Error)]
pub enum MultigridError {
    #[error("invalid matrix description: {0}")]
    Matrix(#[from] MatrixError),

    #[error("interface exchange failed: {0}")]
    Transport(#[from] TransportError),

    #[error("coarsest-level solve failed: {0}")]
    CoarseSolve(#[from] LuError),

    #[error("dimension mismatch: matrix has {cells} cells, vector has {len}")]
    DimensionMismatch { cells: usize, len: usize },
}
