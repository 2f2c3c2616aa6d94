//! Errors for inconsistent matrix and interface descriptions
//!
//! Everything here is a fatal configuration error: the caller supplied a
//! matrix/interface description that does not describe a consistent
//! partitioned system. There is no retry path.

use thiserror::Error;

/// Errors raised while validating a matrix or its coupled interfaces
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatrixError {
    #[error("matrix has no cells")]
    Empty,

    #[error("off-diagonal arrays disagree: {owners} owners, {neighbours} neighbours, {coeffs} coefficients")]
    FaceArrayMismatch {
        owners: usize,
        neighbours: usize,
        coeffs: usize,
    },

    #[error("face {face}: cell index {cell} out of range for {n_cells} cells")]
    CellOutOfRange {
        face: usize,
        cell: usize,
        n_cells: usize,
    },

    #[error("interface {interface}: {faces} faces but {coeffs} coefficients")]
    InterfaceArrayMismatch {
        interface: usize,
        faces: usize,
        coeffs: usize,
    },

    #[error("interface {interface}: cell index {cell} out of range for {n_cells} cells")]
    InterfaceCellOutOfRange {
        interface: usize,
        cell: usize,
        n_cells: usize,
    },

    #[error("cyclic interface {interface}: partner index {partner} is invalid")]
    BrokenCyclicPair { interface: usize, partner: usize },

    #[error("cyclic pair {interface}/{partner}: sides have {own} and {other} faces")]
    CyclicSizeMismatch {
        interface: usize,
        partner: usize,
        own: usize,
        other: usize,
    },

    #[error("cyclic pair {interface}/{partner}: exactly one side must own the pair")]
    CyclicOwnershipConflict { interface: usize, partner: usize },

    #[error("cyclic pair {interface}/{partner}: transforms are not mutual inverses")]
    CyclicTransformMismatch { interface: usize, partner: usize },
}
