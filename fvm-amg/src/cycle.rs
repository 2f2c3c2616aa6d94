//! Multigrid cycles
//!
//! The recursive descent over the hierarchy: pre-smooth, restrict the
//! residual, correct from the coarser level (once for a V-cycle, twice for
//! a W-cycle), prolongate, post-smooth. The coarsest level is solved
//! either exactly by dense LU, when it is small and has no processor
//! coupling, or by aggressive smoothing otherwise.

use crate::error::MultigridError;
use crate::hierarchy::Hierarchy;
use crate::lu;
use crate::smoother::Smoother;
use crate::solver::MultigridControls;
use crate::transfer::{prolongate_from_coarse, restrict_to_coarse};
use fvm_matrix::{Communicator, CoupledMatrix, Coupling, PatchExchange, Scalar};
use ndarray::{Array1, Array2};

/// Cycle shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    /// One coarse-level correction per level visit
    V,
    /// Two coarse-level corrections per level visit
    W,
}

/// One cycle starting at `level`; `exchanges[0]` belongs to that level.
pub(crate) fn cycle_level<T, C, S>(
    hierarchy: &Hierarchy<T>,
    fine: &CoupledMatrix<T>,
    level: usize,
    x: &mut Array1<T>,
    b: &Array1<T>,
    controls: &MultigridControls<T>,
    smoother: &S,
    exchanges: &mut [PatchExchange<T>],
    comm: &mut C,
) -> Result<(), MultigridError>
where
    T: Scalar,
    C: Communicator<T>,
    S: Smoother<T, C>,
{
    let matrix = hierarchy.matrix_at(level, fine);
    let (exchange, deeper) = exchanges
        .split_first_mut()
        .expect("one exchange state per level");

    if level == hierarchy.n_levels() - 1 {
        return solve_coarsest(matrix, x, b, controls, smoother, exchange, comm);
    }

    smoother.smooth(matrix, b, x, controls.n_pre_sweeps, exchange, comm)?;

    let residual = matrix.residual(x, b, exchange, comm)?;
    let map = hierarchy.map_at(level);
    let coarse_residual = restrict_to_coarse(map, &residual);

    let mut correction = Array1::from_elem(map.n_coarse, T::zero());
    let visits = match controls.cycle {
        CycleKind::V => 1,
        CycleKind::W => 2,
    };
    for _ in 0..visits {
        cycle_level(
            hierarchy,
            fine,
            level + 1,
            &mut correction,
            &coarse_residual,
            controls,
            smoother,
            deeper,
            comm,
        )?;
    }

    prolongate_from_coarse(map, &correction, x);
    smoother.smooth(matrix, b, x, controls.n_post_sweeps, exchange, comm)?;
    Ok(())
}

/// Solve the coarsest level.
fn solve_coarsest<T, C, S>(
    matrix: &CoupledMatrix<T>,
    x: &mut Array1<T>,
    b: &Array1<T>,
    controls: &MultigridControls<T>,
    smoother: &S,
    exchange: &mut PatchExchange<T>,
    comm: &mut C,
) -> Result<(), MultigridError>
where
    T: Scalar,
    C: Communicator<T>,
    S: Smoother<T, C>,
{
    let n = matrix.n_cells();
    if !matrix.has_processor_coupling() && n <= controls.direct_solve_level_size {
        let dense = dense_local(matrix);
        let solution = lu::factorize(&dense)?.solve(b)?;
        x.assign(&solution);
        Ok(())
    } else {
        smoother.smooth(matrix, b, x, controls.coarsest_sweeps, exchange, comm)
    }
}

/// Densify the local level including cyclic couplings, which connect local
/// cells and therefore fold into the dense matrix exactly.
fn dense_local<T: Scalar>(matrix: &CoupledMatrix<T>) -> Array2<T> {
    let n = matrix.n_cells();
    let ldu = &matrix.ldu;
    let mut dense = Array2::from_elem((n, n), T::zero());

    for i in 0..n {
        dense[[i, i]] = ldu.diag[i];
    }
    for f in 0..ldu.n_faces() {
        let (o, nb, c) = (ldu.owner[f], ldu.neighbour[f], ldu.off_diag[f]);
        dense[[o, nb]] += c;
        dense[[nb, o]] += c;
    }
    for iface in &matrix.interfaces {
        if let Coupling::Cyclic { partner, .. } = iface.coupling {
            let other = &matrix.interfaces[partner];
            for (f, &cell) in iface.face_cells.iter().enumerate() {
                dense[[cell, other.face_cells[f]]] += iface.coeffs[f];
            }
        }
    }
    dense
}
