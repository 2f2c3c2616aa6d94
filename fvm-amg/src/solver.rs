//! Outer multigrid solver
//!
//! The public entry point: builds (or reuses) a hierarchy and iterates
//! cycles until the globally reduced residual norm meets the tolerance.
//! The corrected solution stays in the caller's vector; the report carries
//! one residual norm per outer iteration for convergence diagnostics.

use crate::cycle::{cycle_level, CycleKind};
use crate::error::MultigridError;
use crate::hierarchy::Hierarchy;
use crate::smoother::{GaussSeidel, Smoother};
use fvm_matrix::{sum_sqr, Communicator, CoupledMatrix, PatchExchange, Scalar, TransportError};
use ndarray::Array1;

/// Solver and hierarchy controls.
#[derive(Debug, Clone)]
pub struct MultigridControls<T: Scalar> {
    /// Stop once the residual drops below this fraction of the initial one
    pub relative_tolerance: T,
    /// Stop once the residual drops below this absolute value
    pub absolute_tolerance: T,
    /// Run at least this many cycles before testing the tolerance
    pub min_iterations: usize,
    /// Give up (without error) after this many cycles
    pub max_iterations: usize,
    /// Smoother sweeps before descending a level
    pub n_pre_sweeps: usize,
    /// Smoother sweeps after ascending back to a level
    pub n_post_sweeps: usize,
    /// Stop coarsening once the global cell count is at or below this;
    /// also the largest level the dense direct solve accepts
    pub direct_solve_level_size: usize,
    /// Sweeps on a coarsest level that cannot be solved directly
    pub coarsest_sweeps: usize,
    /// Hard cap on the number of levels
    pub max_levels: usize,
    /// Coarsening stalls when a step keeps more than this fraction of the
    /// global cells
    pub stall_fraction: f64,
    /// Cycle shape
    pub cycle: CycleKind,
}

impl<T: Scalar> Default for MultigridControls<T> {
    fn default() -> Self {
        Self {
            relative_tolerance: T::from_f64(1e-6).unwrap(),
            absolute_tolerance: T::from_f64(1e-12).unwrap(),
            min_iterations: 1,
            max_iterations: 50,
            n_pre_sweeps: 1,
            n_post_sweeps: 2,
            direct_solve_level_size: 10,
            coarsest_sweeps: 20,
            max_levels: 25,
            stall_fraction: 0.9,
            cycle: CycleKind::V,
        }
    }
}

/// Outcome of one solve.
#[derive(Debug, Clone)]
pub struct SolveReport<T: Scalar> {
    /// Cycles performed
    pub iterations: usize,
    /// Global residual norm before the first cycle
    pub initial_residual: T,
    /// Global residual norm after the last cycle
    pub final_residual: T,
    /// Global residual norm after each cycle
    pub residual_history: Vec<T>,
    /// Whether the tolerance was met; a `false` here is not an error, the
    /// best available solution is still in the caller's vector
    pub converged: bool,
}

/// Agglomerated algebraic multigrid solver.
///
/// Generic over the smoother so alternative relaxation schemes can be
/// plugged in; defaults to [`GaussSeidel`].
#[derive(Debug, Clone)]
pub struct MultigridSolver<T: Scalar, S = GaussSeidel> {
    pub controls: MultigridControls<T>,
    pub smoother: S,
}

impl<T: Scalar> MultigridSolver<T, GaussSeidel> {
    pub fn new(controls: MultigridControls<T>) -> Self {
        Self {
            controls,
            smoother: GaussSeidel::default(),
        }
    }
}

impl<T: Scalar, S> MultigridSolver<T, S> {
    pub fn with_smoother(controls: MultigridControls<T>, smoother: S) -> Self {
        Self { controls, smoother }
    }

    /// Build a hierarchy for `fine` and solve `A x = b`, correcting `x` in
    /// place.
    ///
    /// Rebuilds the hierarchy every call. To amortize the build over many
    /// solves with an unchanged sparsity pattern, build once with
    /// [`Hierarchy::build`] and call
    /// [`MultigridSolver::solve_with_hierarchy`].
    pub fn solve<C>(
        &self,
        fine: &CoupledMatrix<T>,
        b: &Array1<T>,
        x: &mut Array1<T>,
        comm: &mut C,
    ) -> Result<SolveReport<T>, MultigridError>
    where
        C: Communicator<T>,
        S: Smoother<T, C>,
    {
        let hierarchy = Hierarchy::build(fine, &self.controls, comm)?;
        self.solve_with_hierarchy(&hierarchy, fine, b, x, comm)
    }

    /// Solve with a previously built hierarchy.
    pub fn solve_with_hierarchy<C>(
        &self,
        hierarchy: &Hierarchy<T>,
        fine: &CoupledMatrix<T>,
        b: &Array1<T>,
        x: &mut Array1<T>,
        comm: &mut C,
    ) -> Result<SolveReport<T>, MultigridError>
    where
        C: Communicator<T>,
        S: Smoother<T, C>,
    {
        if b.len() != fine.n_cells() {
            return Err(MultigridError::DimensionMismatch {
                cells: fine.n_cells(),
                len: b.len(),
            });
        }
        if x.len() != fine.n_cells() {
            return Err(MultigridError::DimensionMismatch {
                cells: fine.n_cells(),
                len: x.len(),
            });
        }

        let controls = &self.controls;
        let mut exchanges: Vec<PatchExchange<T>> = (0..hierarchy.n_levels())
            .map(|level| PatchExchange::for_matrix(hierarchy.matrix_at(level, fine)))
            .collect();

        let initial_residual =
            global_norm(&fine.residual(x, b, &mut exchanges[0], comm)?, comm)?;
        let target = controls
            .absolute_tolerance
            .max(controls.relative_tolerance * initial_residual);

        let mut residual_history = Vec::new();
        let mut residual = initial_residual;
        let mut iterations = 0;

        while iterations < controls.max_iterations
            && !(iterations >= controls.min_iterations && residual <= target)
        {
            cycle_level(
                hierarchy,
                fine,
                0,
                x,
                b,
                controls,
                &self.smoother,
                &mut exchanges,
                comm,
            )?;
            iterations += 1;

            residual = global_norm(&fine.residual(x, b, &mut exchanges[0], comm)?, comm)?;
            residual_history.push(residual);
            log::debug!("cycle {iterations}: residual {residual:?}");
        }

        let converged = residual <= target;
        log::info!(
            "multigrid solve: {} cycles, residual {:?} -> {:?}, converged: {}",
            iterations,
            initial_residual,
            residual,
            converged
        );
        Ok(SolveReport {
            iterations,
            initial_residual,
            final_residual: residual,
            residual_history,
            converged,
        })
    }
}

/// Globally reduced L2 norm of a distributed vector.
fn global_norm<T: Scalar, C: Communicator<T>>(
    local: &Array1<T>,
    comm: &mut C,
) -> Result<T, TransportError> {
    Ok(comm.sum_all(sum_sqr(local))?.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
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
    fn serial_chain_converges_to_the_direct_solution() {
        let n = 32;
        let fine = chain(n);
        let b = Array1::from_elem(n, 1.0);
        let mut x = Array1::from_elem(n, 0.0);
        let mut comm = ChannelComm::single();

        let controls = MultigridControls {
            relative_tolerance: 1e-10,
            direct_solve_level_size: 4,
            max_iterations: 200,
            ..MultigridControls::default()
        };
        let report = MultigridSolver::new(controls)
            .solve(&fine, &b, &mut x, &mut comm)
            .unwrap();

        assert!(report.converged, "report: {report:?}");
        assert_eq!(report.iterations, report.residual_history.len());

        // exact solution of the open chain with unit load:
        // x_i = (i+1) * (n - i) / 2
        for i in 0..n {
            let exact = ((i + 1) * (n - i)) as f64 / 2.0;
            assert_relative_eq!(x[i], exact, max_relative = 1e-7);
        }
    }

    #[test]
    fn residual_history_is_monotone() {
        let n = 16;
        let fine = chain(n);
        let b = Array1::from_shape_fn(n, |i| (i as f64 * 0.3).sin());
        let mut x = Array1::from_elem(n, 0.0);
        let mut comm = ChannelComm::single();

        let controls = MultigridControls {
            n_pre_sweeps: 2,
            n_post_sweeps: 2,
            direct_solve_level_size: 4,
            ..MultigridControls::default()
        };
        let report = MultigridSolver::new(controls)
            .solve(&fine, &b, &mut x, &mut comm)
            .unwrap();

        assert!(report.converged);
        assert!(report.iterations <= 20, "took {} cycles", report.iterations);
        let mut previous = report.initial_residual;
        for &r in &report.residual_history {
            assert!(
                r <= previous + 1e-14,
                "residual increased: {previous} -> {r}"
            );
            previous = r;
        }
    }

    #[test]
    fn w_cycle_with_symmetric_smoother_converges() {
        use crate::cycle::CycleKind;
        use crate::smoother::GaussSeidel;

        let n = 32;
        let fine = chain(n);
        let b = Array1::from_elem(n, 1.0);
        let mut x = Array1::from_elem(n, 0.0);
        let mut comm = ChannelComm::single();

        let controls = MultigridControls {
            relative_tolerance: 1e-10,
            direct_solve_level_size: 4,
            max_iterations: 100,
            cycle: CycleKind::W,
            ..MultigridControls::default()
        };
        let solver = MultigridSolver::with_smoother(controls, GaussSeidel { symmetric: true });
        let report = solver.solve(&fine, &b, &mut x, &mut comm).unwrap();

        assert!(report.converged, "{report:?}");
        for i in 0..n {
            let exact = ((i + 1) * (n - i)) as f64 / 2.0;
            assert_relative_eq!(x[i], exact, max_relative = 1e-7);
        }
    }

    #[test]
    fn zero_rhs_converges_immediately() {
        let fine = chain(8);
        let b = Array1::from_elem(8, 0.0);
        let mut x = Array1::from_elem(8, 0.0);
        let mut comm = ChannelComm::single();

        let report = MultigridSolver::new(MultigridControls::default())
            .solve(&fine, &b, &mut x, &mut comm)
            .unwrap();

        assert!(report.converged);
        // min_iterations still forces one cycle
        assert_eq!(report.iterations, 1);
    }

    #[test]
    fn non_convergence_is_reported_not_raised() {
        let n = 64;
        let fine = chain(n);
        let b = Array1::from_elem(n, 1.0);
        let mut x = Array1::from_elem(n, 0.0);
        let mut comm = ChannelComm::single();

        let controls = MultigridControls {
            relative_tolerance: 1e-14,
            absolute_tolerance: 0.0,
            max_iterations: 1,
            n_pre_sweeps: 0,
            n_post_sweeps: 1,
            ..MultigridControls::default()
        };
        let report = MultigridSolver::new(controls)
            .solve(&fine, &b, &mut x, &mut comm)
            .unwrap();

        assert!(!report.converged);
        assert_eq!(report.iterations, 1);
        assert!(report.final_residual > 0.0);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let fine = chain(8);
        let b = Array1::from_elem(4, 1.0);
        let mut x = Array1::from_elem(8, 0.0);
        let mut comm = ChannelComm::single();

        assert!(matches!(
            MultigridSolver::new(MultigridControls::default()).solve(
                &fine,
                &b,
                &mut x,
                &mut comm
            ),
            Err(MultigridError::DimensionMismatch { cells: 8, len: 4 })
        ));
    }
}
