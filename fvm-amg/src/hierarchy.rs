//! Multigrid level hierarchy
//!
//! A [`Hierarchy`] owns the coarse levels and the restrict maps between
//! them; the finest level stays owned by the caller (the discretization)
//! and is passed by reference wherever a level is needed.
//!
//! Every rank of a partitioned case builds its hierarchy in lockstep: the
//! decision to coarsen another level is taken from globally reduced cell
//! counts, so all ranks agree on the number of levels and the exchanges
//! inside each coarsening step pair up.
//!
//! A hierarchy may be reused across solves as long as the sparsity pattern
//! of the fine matrix is unchanged; coefficient updates require rebuilding
//! the coarse levels, a sparsity change invalidates the hierarchy
//! entirely.

use crate::agglomerate::{build_coarse_level, cluster_cells, RestrictMap};
use crate::error::MultigridError;
use crate::solver::MultigridControls;
use fvm_matrix::{Communicator, CoupledMatrix, Scalar};

/// Levels of one multigrid hierarchy, finest first.
#[derive(Debug)]
pub struct Hierarchy<T: Scalar> {
    coarse: Vec<CoupledMatrix<T>>,
    maps: Vec<RestrictMap>,
}

/// Size summary of a built hierarchy.
#[derive(Debug, Clone)]
pub struct HierarchyStats {
    /// Local cells per level, finest first
    pub cells: Vec<usize>,
    /// Local internal faces per level
    pub faces: Vec<usize>,
    /// Total cells over all levels divided by fine cells
    pub grid_complexity: f64,
}

impl<T: Scalar> Hierarchy<T> {
    /// Build the hierarchy for `fine` by repeated pairwise agglomeration.
    ///
    /// Coarsening stops when the globally summed cell count reaches
    /// `direct_solve_level_size`, when a step fails to shrink the global
    /// count below `stall_fraction` of the previous level (stalled
    /// agglomeration, e.g. a disconnected graph), or at `max_levels`.
    pub fn build<C: Communicator<T>>(
        fine: &CoupledMatrix<T>,
        controls: &MultigridControls<T>,
        comm: &mut C,
    ) -> Result<Self, MultigridError> {
        fine.validate()?;

        let stall = T::from_f64(controls.stall_fraction).unwrap();
        let target = T::from_usize(controls.direct_solve_level_size).unwrap();

        let mut coarse: Vec<CoupledMatrix<T>> = Vec::new();
        let mut maps: Vec<RestrictMap> = Vec::new();
        let mut global_cells = comm.sum_all(T::from_usize(fine.n_cells()).unwrap())?;

        loop {
            if coarse.len() + 2 > controls.max_levels || global_cells <= target {
                break;
            }

            let current = coarse.last().unwrap_or(fine);
            let (clusters, n_coarse) = cluster_cells(&current.ldu);
            let global_coarse = comm.sum_all(T::from_usize(n_coarse).unwrap())?;
            if global_coarse > stall * global_cells {
                log::debug!(
                    "agglomeration stalled at {:?} global cells, keeping {} levels",
                    global_cells,
                    coarse.len() + 1
                );
                break;
            }

            let (map, next) = build_coarse_level(current, &clusters, n_coarse, comm)?;
            log::debug!(
                "level {}: {} -> {} local cells ({:?} -> {:?} global)",
                coarse.len() + 1,
                current.n_cells(),
                next.n_cells(),
                global_cells,
                global_coarse
            );
            maps.push(map);
            coarse.push(next);
            global_cells = global_coarse;
        }

        log::info!(
            "multigrid hierarchy: {} levels, coarsest {:?} global cells",
            coarse.len() + 1,
            global_cells
        );
        Ok(Self { coarse, maps })
    }

    /// Number of levels including the finest.
    pub fn n_levels(&self) -> usize {
        self.coarse.len() + 1
    }

    /// The matrix of a level; level 0 is the caller's fine matrix.
    pub fn matrix_at<'a>(
        &'a self,
        level: usize,
        fine: &'a CoupledMatrix<T>,
    ) -> &'a CoupledMatrix<T> {
        if level == 0 {
            fine
        } else {
            &self.coarse[level - 1]
        }
    }

    /// The restrict map from `level` down to `level + 1`.
    pub fn map_at(&self, level: usize) -> &RestrictMap {
        &self.maps[level]
    }

    /// Size summary over all levels.
    pub fn stats(&self, fine: &CoupledMatrix<T>) -> HierarchyStats {
        let mut cells = vec![fine.n_cells()];
        let mut faces = vec![fine.ldu.n_faces()];
        for level in &self.coarse {
            cells.push(level.n_cells());
            faces.push(level.ldu.n_faces());
        }
        let total: usize = cells.iter().sum();
        HierarchyStats {
            grid_complexity: total as f64 / cells[0] as f64,
            cells,
            faces,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::MultigridControls;
    use fvm_matrix::{ChannelComm, LduMatrix};

    fn chain(n: usize) -> CoupledMatrix<f64> {
        let owner: Vec<usize> = (0..n - 1).collect();
        let neighbour: Vec<usize> = (1..n).collect();
        CoupledMatrix::uncoupled(LduMatrix::new(
            vec![2.0; n],
            owner,
            neighbour,
            vec![-1.0; n - 1],
        ))
    }

    #[test]
    fn chain_coarsens_to_the_target_size() {
        let fine = chain(8);
        let controls = MultigridControls {
            direct_solve_level_size: 2,
            ..MultigridControls::default()
        };
        let mut comm = ChannelComm::single();
        let hierarchy = Hierarchy::build(&fine, &controls, &mut comm).unwrap();

        let stats = hierarchy.stats(&fine);
        assert_eq!(stats.cells, vec![8, 4, 2]);
        assert_eq!(stats.faces, vec![7, 3, 1]);
        assert!(stats.grid_complexity > 1.0);
        assert_eq!(hierarchy.n_levels(), 3);
        assert_eq!(hierarchy.matrix_at(2, &fine).n_cells(), 2);
    }

    #[test]
    fn disconnected_matrix_stalls_immediately() {
        let fine = CoupledMatrix::uncoupled(LduMatrix::diagonal(vec![1.0; 16]));
        let controls = MultigridControls::default();
        let mut comm = ChannelComm::single();
        let hierarchy = Hierarchy::build(&fine, &controls, &mut comm).unwrap();
        // singleton clusters cannot shrink the level, so the fine level is
        // also the coarsest
        assert_eq!(hierarchy.n_levels(), 1);
    }

    #[test]
    fn max_levels_caps_the_hierarchy() {
        let fine = chain(64);
        let controls = MultigridControls {
            direct_solve_level_size: 1,
            max_levels: 3,
            ..MultigridControls::default()
        };
        let mut comm = ChannelComm::single();
        let hierarchy = Hierarchy::build(&fine, &controls, &mut comm).unwrap();
        assert_eq!(hierarchy.n_levels(), 3);
        assert_eq!(hierarchy.stats(&fine).cells, vec![64, 32, 16]);
    }

    #[test]
    fn empty_fine_matrix_is_a_config_error() {
        let fine = CoupledMatrix::<f64>::uncoupled(LduMatrix::diagonal(Vec::new()));
        let mut comm = ChannelComm::single();
        assert!(matches!(
            Hierarchy::build(&fine, &MultigridControls::default(), &mut comm),
            Err(MultigridError::Matrix(_))
        ));
    }
}
