//! Coupled interfaces between mesh partitions and periodic patches
//!
//! Each boundary patch of a partitioned mesh that couples to unknowns
//! outside the local cell range is described by an [`Interface`]: the local
//! cells touching the patch, one coupling coefficient per face, and the
//! coupling variant. Two variants exist:
//!
//! - [`Coupling::Processor`]: the partner patch lives on another rank and
//!   values cross through the transport layer
//! - [`Coupling::Cyclic`]: the partner patch is another interface of the
//!   same matrix (periodic boundary), no communication involved
//!
//! The variant set is closed, so dispatch is by enum rather than trait
//! object.

use crate::error::MatrixError;
use crate::ldu::LduMatrix;
use crate::traits::Scalar;
use crate::transform::Transform;
use crate::transport::{Communicator, PatchExchange, TransportError};
use ndarray::Array1;

/// Coupling variant of an interface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Coupling<T: Scalar> {
    /// Partner patch on another rank.
    Processor {
        /// Rank holding the partner patch
        peer: usize,
        /// Message tag; unique per (peer, level) among this rank's interfaces
        tag: u32,
        /// Geometric transform applied to received values
        transform: Transform<T>,
    },
    /// Periodic partner patch within the same matrix.
    Cyclic {
        /// Index of the paired interface in the owning matrix
        partner: usize,
        /// Exactly one side of a pair owns it
        owner: bool,
        /// Geometric transform applied to the partner's values
        transform: Transform<T>,
    },
}

/// One coupled boundary patch of a matrix level.
#[derive(Debug, Clone)]
pub struct Interface<T: Scalar> {
    /// Local cells touching this patch, one per face
    pub face_cells: Vec<usize>,
    /// Coupling coefficient per face
    pub coeffs: Vec<T>,
    /// Coupling variant
    pub coupling: Coupling<T>,
}

impl<T: Scalar> Interface<T> {
    /// Processor interface with an untransformed coupling.
    pub fn processor(face_cells: Vec<usize>, coeffs: Vec<T>, peer: usize, tag: u32) -> Self {
        Self::processor_transformed(face_cells, coeffs, peer, tag, Transform::Identity)
    }

    /// Processor interface with a geometric transform (e.g. a periodic
    /// wedge split across ranks).
    pub fn processor_transformed(
        face_cells: Vec<usize>,
        coeffs: Vec<T>,
        peer: usize,
        tag: u32,
        transform: Transform<T>,
    ) -> Self {
        Self {
            face_cells,
            coeffs,
            coupling: Coupling::Processor {
                peer,
                tag,
                transform,
            },
        }
    }

    /// One side of a cyclic pair.
    pub fn cyclic(
        face_cells: Vec<usize>,
        coeffs: Vec<T>,
        partner: usize,
        owner: bool,
        transform: Transform<T>,
    ) -> Self {
        Self {
            face_cells,
            coeffs,
            coupling: Coupling::Cyclic {
                partner,
                owner,
                transform,
            },
        }
    }

    /// Number of faces on this patch.
    pub fn len(&self) -> usize {
        self.face_cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.face_cells.is_empty()
    }

    pub fn transform(&self) -> &Transform<T> {
        match &self.coupling {
            Coupling::Processor { transform, .. } | Coupling::Cyclic { transform, .. } => transform,
        }
    }

    /// Gather the local boundary values of `x` at this patch into `buf`.
    pub fn gather(&self, x: &Array1<T>, buf: &mut Vec<T>) {
        buf.clear();
        buf.extend(self.face_cells.iter().map(|&cell| x[cell]));
    }

    /// Add this interface's coupling term to a matrix-vector product:
    /// `result[face_cells[f]] += coeffs[f] * peer_values[f]`.
    pub fn add_coupling(&self, peer_values: &[T], result: &mut Array1<T>) {
        for (f, &cell) in self.face_cells.iter().enumerate() {
            result[cell] += self.coeffs[f] * peer_values[f];
        }
    }
}

/// One solver level: the local matrix plus its coupled interfaces.
#[derive(Debug, Clone)]
pub struct CoupledMatrix<T: Scalar> {
    pub ldu: LduMatrix<T>,
    pub interfaces: Vec<Interface<T>>,
}

impl<T: Scalar> CoupledMatrix<T> {
    pub fn new(ldu: LduMatrix<T>, interfaces: Vec<Interface<T>>) -> Self {
        Self { ldu, interfaces }
    }

    /// Matrix without couplings, e.g. an unpartitioned serial case.
    pub fn uncoupled(ldu: LduMatrix<T>) -> Self {
        Self::new(ldu, Vec::new())
    }

    pub fn n_cells(&self) -> usize {
        self.ldu.n_cells()
    }

    /// Whether this level couples to another rank through a non-empty
    /// processor interface.
    pub fn has_processor_coupling(&self) -> bool {
        self.interfaces
            .iter()
            .any(|i| matches!(i.coupling, Coupling::Processor { .. }) && !i.is_empty())
    }

    /// Total coefficient mass including interface coefficients.
    pub fn coefficient_mass(&self) -> T {
        let boundary: T = self
            .interfaces
            .iter()
            .flat_map(|i| i.coeffs.iter().copied())
            .sum();
        self.ldu.coefficient_mass() + boundary
    }

    /// Check the whole level description for consistency.
    ///
    /// Covers the local addressing, per-interface array lengths and cell
    /// ranges, and the pairing invariants of cyclic interfaces (mutual
    /// partner indices, one owner per pair, equal lengths, mutually inverse
    /// transforms). Any failure is a fatal configuration error.
    pub fn validate(&self) -> Result<(), MatrixError> {
        self.ldu.validate()?;
        let n = self.n_cells();
        let tol = T::from_f64(1e-6).unwrap();

        for (idx, iface) in self.interfaces.iter().enumerate() {
            if iface.coeffs.len() != iface.face_cells.len() {
                return Err(MatrixError::InterfaceArrayMismatch {
                    interface: idx,
                    faces: iface.face_cells.len(),
                    coeffs: iface.coeffs.len(),
                });
            }
            for &cell in &iface.face_cells {
                if cell >= n {
                    return Err(MatrixError::InterfaceCellOutOfRange {
                        interface: idx,
                        cell,
                        n_cells: n,
                    });
                }
            }

            if let Coupling::Cyclic {
                partner,
                owner,
                transform,
            } = &iface.coupling
            {
                let other = self
                    .interfaces
                    .get(*partner)
                    .filter(|_| *partner != idx)
                    .ok_or(MatrixError::BrokenCyclicPair {
                        interface: idx,
                        partner: *partner,
                    })?;
                let Coupling::Cyclic {
                    partner: back,
                    owner: other_owner,
                    transform: other_transform,
                } = &other.coupling
                else {
                    return Err(MatrixError::BrokenCyclicPair {
                        interface: idx,
                        partner: *partner,
                    });
                };
                if *back != idx {
                    return Err(MatrixError::BrokenCyclicPair {
                        interface: idx,
                        partner: *partner,
                    });
                }
                if other.len() != iface.len() {
                    return Err(MatrixError::CyclicSizeMismatch {
                        interface: idx,
                        partner: *partner,
                        own: iface.len(),
                        other: other.len(),
                    });
                }
                if *owner == *other_owner {
                    return Err(MatrixError::CyclicOwnershipConflict {
                        interface: idx,
                        partner: *partner,
                    });
                }
                if !transform.is_inverse_of(other_transform, tol) {
                    return Err(MatrixError::CyclicTransformMismatch {
                        interface: idx,
                        partner: *partner,
                    });
                }
            }
        }
        Ok(())
    }

    /// Coupling-aware matrix-vector product: `y = A x` including all
    /// interface terms.
    ///
    /// Every processor interface is posted before any interface is
    /// completed, so the exchange overlaps and two ranks waiting on each
    /// other cannot deadlock.
    pub fn matvec<C: Communicator<T>>(
        &self,
        x: &Array1<T>,
        exchange: &mut PatchExchange<T>,
        comm: &mut C,
    ) -> Result<Array1<T>, TransportError> {
        let mut y = Array1::from_elem(self.n_cells(), T::zero());
        self.ldu.matvec_into(x, &mut y);

        exchange.post_all(self, x, comm)?;
        for idx in 0..self.interfaces.len() {
            let peer_values = exchange.complete(self, idx, x, comm)?;
            self.interfaces[idx].add_coupling(peer_values, &mut y);
        }
        Ok(y)
    }

    /// Coupling-aware residual: `r = b - A x`.
    pub fn residual<C: Communicator<T>>(
        &self,
        x: &Array1<T>,
        b: &Array1<T>,
        exchange: &mut PatchExchange<T>,
        comm: &mut C,
    ) -> Result<Array1<T>, TransportError> {
        let ax = self.matvec(x, exchange, comm)?;
        Ok(b - &ax)
    }
}
