//! Pairwise agglomeration of a level into a coarser level
//!
//! Coarsening happens in two steps. [`cluster_cells`] greedily pairs each
//! cell with its strongest unclustered neighbour, which is purely local.
//! [`build_coarse_level`] then assembles the coarse matrix by summation
//! (Galerkin coarsening with piecewise-constant transfer) and agglomerates
//! every coupled interface onto the coarse cells, exchanging cluster ids
//! with peer ranks where the coupling crosses a processor boundary.
//!
//! Summation conserves the total coefficient mass of a level exactly, and
//! with it the action of the matrix on a constant vector; both are checked
//! by the tests here.

use crate::error::MultigridError;
use fvm_matrix::{Communicator, CoupledMatrix, Coupling, Interface, LduMatrix, Scalar, TransportError};
use std::collections::HashMap;

/// Tag offset applied to processor interfaces on each coarser level, so
/// envelope matching stays unambiguous between levels.
pub const LEVEL_TAG_STRIDE: u32 = 1024;

#[cfg(feature = "rayon")]
const PAR_FACE_THRESHOLD: usize = 4096;

/// Where a fine face went during one coarsening step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceTarget {
    /// The face survives as (part of) the coarse face with this index.
    Kept(usize),
    /// Both endpoints agglomerated into the same coarse cell; the face
    /// coefficient folded into that cell's coarse diagonal.
    Folded(usize),
}

/// The fine-to-coarse mapping of one coarsening step.
#[derive(Debug, Clone)]
pub struct RestrictMap {
    /// Coarse cell of each fine cell (total, many-to-one)
    pub fine_to_coarse: Vec<usize>,
    /// Number of coarse cells
    pub n_coarse: usize,
    /// Destination of each fine internal face
    pub face_restrict: Vec<FaceTarget>,
    /// Destination of each fine interface face, per interface
    pub interface_face_restrict: Vec<Vec<FaceTarget>>,
}

/// Strength of connection per internal face.
///
/// Coefficient magnitude normalized by the endpoint diagonals; the exact
/// metric only affects how fast the hierarchy converges, not whether the
/// coarsening is correct.
fn face_weights<T: Scalar>(ldu: &LduMatrix<T>) -> Vec<T> {
    let weight = |f: usize| {
        let c = ldu.off_diag[f].abs();
        let d = (ldu.diag[ldu.owner[f]] * ldu.diag[ldu.neighbour[f]]).abs();
        if d > T::from_f64(1e-30).unwrap() {
            c / d.sqrt()
        } else {
            c
        }
    };

    #[cfg(feature = "rayon")]
    {
        if ldu.n_faces() >= PAR_FACE_THRESHOLD {
            use rayon::prelude::*;
            return (0..ldu.n_faces()).into_par_iter().map(weight).collect();
        }
    }

    (0..ldu.n_faces()).map(weight).collect()
}

/// Greedily cluster cells into pairs by strength of connection.
///
/// Cells are visited in ascending index order; each unclustered cell grabs
/// its strongest still-unclustered neighbour, with ties broken towards the
/// lowest neighbour index so the clustering is deterministic. Cells whose
/// neighbours are all taken become singletons. Returns the cluster id per
/// cell and the number of clusters; cluster ids are assigned in creation
/// order.
pub fn cluster_cells<T: Scalar>(ldu: &LduMatrix<T>) -> (Vec<usize>, usize) {
    let n = ldu.n_cells();
    let mut cell_faces: Vec<Vec<usize>> = vec![Vec::new(); n];
    for f in 0..ldu.n_faces() {
        cell_faces[ldu.owner[f]].push(f);
        cell_faces[ldu.neighbour[f]].push(f);
    }

    let weights = face_weights(ldu);
    let unset = usize::MAX;
    let mut cluster = vec![unset; n];
    let mut n_coarse = 0;

    for cell in 0..n {
        if cluster[cell] != unset {
            continue;
        }
        let mut best: Option<(T, usize)> = None;
        for &f in &cell_faces[cell] {
            let other = if ldu.owner[f] == cell {
                ldu.neighbour[f]
            } else {
                ldu.owner[f]
            };
            if cluster[other] != unset {
                continue;
            }
            let w = weights[f];
            let better = match best {
                None => true,
                Some((bw, bo)) => w > bw || (w == bw && other < bo),
            };
            if better {
                best = Some((w, other));
            }
        }

        cluster[cell] = n_coarse;
        if let Some((_, mate)) = best {
            cluster[mate] = n_coarse;
        }
        n_coarse += 1;
    }

    (cluster, n_coarse)
}

/// Assemble the coarse level for a given clustering.
///
/// Every coefficient is summed into exactly one coarse destination:
/// - fine diagonals into the cluster's coarse diagonal;
/// - fine faces internal to a cluster into that coarse diagonal (twice,
///   since one symmetric coefficient stands for two matrix entries);
/// - surviving fine faces into the coarse face of their cluster pair,
///   created in first-appearance order so both sides of any coupling
///   derive the same coarse face numbering;
/// - interface faces likewise, onto a coarse interface with the same
///   variant, peer identity and transform.
///
/// Processor interfaces exchange the cluster ids of their boundary cells
/// with the peer rank; all sends go out before any receive is awaited.
pub fn build_coarse_level<T: Scalar, C: Communicator<T>>(
    fine: &CoupledMatrix<T>,
    fine_to_coarse: &[usize],
    n_coarse: usize,
    comm: &mut C,
) -> Result<(RestrictMap, CoupledMatrix<T>), MultigridError> {
    let ldu = &fine.ldu;
    let two = T::one() + T::one();

    let mut diag = vec![T::zero(); n_coarse];
    for (cell, &c) in fine_to_coarse.iter().enumerate() {
        diag[c] += ldu.diag[cell];
    }

    // internal faces
    let mut face_restrict = Vec::with_capacity(ldu.n_faces());
    let mut owner = Vec::new();
    let mut neighbour = Vec::new();
    let mut off_diag: Vec<T> = Vec::new();
    let mut face_of_pair: HashMap<(usize, usize), usize> = HashMap::new();

    for f in 0..ldu.n_faces() {
        let i = fine_to_coarse[ldu.owner[f]];
        let j = fine_to_coarse[ldu.neighbour[f]];
        if i == j {
            diag[i] += two * ldu.off_diag[f];
            face_restrict.push(FaceTarget::Folded(i));
        } else {
            let key = (i.min(j), i.max(j));
            let idx = *face_of_pair.entry(key).or_insert_with(|| {
                owner.push(key.0);
                neighbour.push(key.1);
                off_diag.push(T::zero());
                off_diag.len() - 1
            });
            off_diag[idx] += ldu.off_diag[f];
            face_restrict.push(FaceTarget::Kept(idx));
        }
    }

    // post cluster ids for every processor interface before receiving any
    for iface in &fine.interfaces {
        if let Coupling::Processor { peer, tag, .. } = iface.coupling {
            let ids: Vec<usize> = iface.face_cells.iter().map(|&c| fine_to_coarse[c]).collect();
            comm.send_indices(peer, tag, &ids)?;
        }
    }

    let n_interfaces = fine.interfaces.len();
    let mut coarse_interfaces: Vec<Option<Interface<T>>> = (0..n_interfaces).map(|_| None).collect();
    let mut interface_face_restrict: Vec<Vec<FaceTarget>> = vec![Vec::new(); n_interfaces];

    for idx in 0..n_interfaces {
        let iface = &fine.interfaces[idx];
        match &iface.coupling {
            Coupling::Processor {
                peer,
                tag,
                transform,
            } => {
                let peer_ids = comm.recv_indices(*peer, *tag)?;
                if peer_ids.len() != iface.len() {
                    return Err(TransportError::SizeMismatch {
                        peer: *peer,
                        expected: iface.len(),
                        got: peer_ids.len(),
                    }
                    .into());
                }

                // group by (local cluster, peer cluster); both ranks scan
                // the same fine face order, so the groups line up
                let mut group_of: HashMap<(usize, usize), usize> = HashMap::new();
                let mut face_cells = Vec::new();
                let mut coeffs: Vec<T> = Vec::new();
                let mut restrict = Vec::with_capacity(iface.len());

                for f in 0..iface.len() {
                    let mine = fine_to_coarse[iface.face_cells[f]];
                    let theirs = peer_ids[f];
                    let g = *group_of.entry((mine, theirs)).or_insert_with(|| {
                        face_cells.push(mine);
                        coeffs.push(T::zero());
                        coeffs.len() - 1
                    });
                    coeffs[g] += iface.coeffs[f];
                    restrict.push(FaceTarget::Kept(g));
                }

                coarse_interfaces[idx] = Some(Interface::processor_transformed(
                    face_cells,
                    coeffs,
                    *peer,
                    tag + LEVEL_TAG_STRIDE,
                    *transform,
                ));
                interface_face_restrict[idx] = restrict;
            }
            Coupling::Cyclic {
                partner,
                owner: true,
                transform,
            } => {
                // the owner side drives both halves of the pair so their
                // coarse face numbering is identical
                let other = &fine.interfaces[*partner];
                let other_transform = *other.transform();

                let mut group_of: HashMap<(usize, usize), usize> = HashMap::new();
                let mut own_cells = Vec::new();
                let mut own_coeffs: Vec<T> = Vec::new();
                let mut other_cells = Vec::new();
                let mut other_coeffs: Vec<T> = Vec::new();
                let mut own_restrict = Vec::with_capacity(iface.len());
                let mut other_restrict = Vec::with_capacity(iface.len());

                for f in 0..iface.len() {
                    let i = fine_to_coarse[iface.face_cells[f]];
                    let j = fine_to_coarse[other.face_cells[f]];
                    if i == j {
                        // the pair closed on itself: both sides' coupling
                        // coefficients become diagonal mass of the cluster
                        diag[i] += iface.coeffs[f] + other.coeffs[f];
                        own_restrict.push(FaceTarget::Folded(i));
                        other_restrict.push(FaceTarget::Folded(j));
                    } else {
                        let g = *group_of.entry((i, j)).or_insert_with(|| {
                            own_cells.push(i);
                            other_cells.push(j);
                            own_coeffs.push(T::zero());
                            other_coeffs.push(T::zero());
                            own_coeffs.len() - 1
                        });
                        own_coeffs[g] += iface.coeffs[f];
                        other_coeffs[g] += other.coeffs[f];
                        own_restrict.push(FaceTarget::Kept(g));
                        other_restrict.push(FaceTarget::Kept(g));
                    }
                }

                coarse_interfaces[idx] = Some(Interface::cyclic(
                    own_cells,
                    own_coeffs,
                    *partner,
                    true,
                    *transform,
                ));
                coarse_interfaces[*partner] = Some(Interface::cyclic(
                    other_cells,
                    other_coeffs,
                    idx,
                    false,
                    other_transform,
                ));
                interface_face_restrict[idx] = own_restrict;
                interface_face_restrict[*partner] = other_restrict;
            }
            // filled in by the owning side of the pair
            Coupling::Cyclic { owner: false, .. } => {}
        }
    }

    let coarse_interfaces: Vec<Interface<T>> = coarse_interfaces
        .into_iter()
        .map(|i| i.expect("every interface agglomerated"))
        .collect();

    let map = RestrictMap {
        fine_to_coarse: fine_to_coarse.to_vec(),
        n_coarse,
        face_restrict,
        interface_face_restrict,
    };
    let coarse = CoupledMatrix::new(
        LduMatrix::new(diag, owner, neighbour, off_diag),
        coarse_interfaces,
    );
    Ok((map, coarse))
}
