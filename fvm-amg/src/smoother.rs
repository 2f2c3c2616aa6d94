//! Relaxation smoothers for the multigrid cycle
//!
//! The cycle only needs the [`Smoother`] contract: given a level's matrix,
//! right-hand side and current estimate, relax the estimate in place for a
//! fixed number of sweeps, with interface couplings taken into account.
//! [`GaussSeidel`] is the reference implementation; alternative smoothers
//! plug in through the trait.

use crate::error::MultigridError;
use fvm_matrix::{Communicator, CoupledMatrix, PatchExchange, Scalar};
use ndarray::Array1;

/// Contract between the cycle and a relaxation smoother.
///
/// Implementations must be coupling-aware: boundary values of `x` have to
/// be exchanged through `exchange` so the interface terms enter the sweep.
pub trait Smoother<T: Scalar, C: Communicator<T>> {
    fn smooth(
        &self,
        matrix: &CoupledMatrix<T>,
        b: &Array1<T>,
        x: &mut Array1<T>,
        sweeps: usize,
        exchange: &mut PatchExchange<T>,
        comm: &mut C,
    ) -> Result<(), MultigridError>;
}

/// Gauss-Seidel relaxation.
///
/// Each sweep first exchanges the current boundary values and moves the
/// interface contributions to the right-hand side, then relaxes the local
/// cells in place. The symmetric variant follows every forward sweep with
/// a backward one.
#[derive(Debug, Clone, Copy, Default)]
pub struct GaussSeidel {
    pub symmetric: bool,
}

impl<T: Scalar, C: Communicator<T>> Smoother<T, C> for GaussSeidel {
    fn smooth(
        &self,
        matrix: &CoupledMatrix<T>,
        b: &Array1<T>,
        x: &mut Array1<T>,
        sweeps: usize,
        exchange: &mut PatchExchange<T>,
        comm: &mut C,
    ) -> Result<(), MultigridError> {
        let n = matrix.n_cells();
        let tiny = T::from_f64(1e-30).unwrap();

        // row adjacency of the off-diagonal terms, built once per call
        let ldu = &matrix.ldu;
        let mut rows: Vec<Vec<(usize, T)>> = vec![Vec::new(); n];
        for f in 0..ldu.n_faces() {
            let (o, nb, c) = (ldu.owner[f], ldu.neighbour[f], ldu.off_diag[f]);
            rows[o].push((nb, c));
            rows[nb].push((o, c));
        }

        for _ in 0..sweeps {
            // interface terms become explicit right-hand-side contributions
            // for this sweep, evaluated at the pre-sweep boundary values
            let mut rhs = b.clone();
            exchange.post_all(matrix, x, comm)?;
            for idx in 0..matrix.interfaces.len() {
                let peer_values = exchange.complete(matrix, idx, x, comm)?;
                let iface = &matrix.interfaces[idx];
                for (f, &cell) in iface.face_cells.iter().enumerate() {
                    rhs[cell] -= iface.coeffs[f] * peer_values[f];
                }
            }

            relax(&rows, ldu, &rhs, x, false, tiny);
            if self.symmetric {
                relax(&rows, ldu, &rhs, x, true, tiny);
            }
        }
        Ok(())
    }
}

fn relax<T: Scalar>(
    rows: &[Vec<(usize, T)>],
    ldu: &fvm_matrix::LduMatrix<T>,
    rhs: &Array1<T>,
    x: &mut Array1<T>,
    backward: bool,
    tiny: T,
) {
    let n = ldu.n_cells();
    let order: Box<dyn Iterator<Item = usize>> = if backward {
        Box::new((0..n).rev())
    } else {
        Box::new(0..n)
    };

    for i in order {
        let d = ldu.diag[i];
        if d.abs() < tiny {
            continue;
        }
        let mut sigma = T::zero();
        for &(j, c) in &rows[i] {
            sigma += c * x[j];
        }
        x[i] = (rhs[i] - sigma) / d;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fvm_matrix::{sum_sqr, ChannelComm, Interface, LduMatrix, Transform};
    use ndarray::Array1;

    fn residual_norm(
        m: &CoupledMatrix<f64>,
        x: &Array1<f64>,
        b: &Array1<f64>,
        comm: &mut ChannelComm<f64>,
    ) -> f64 {
        let mut exchange = PatchExchange::for_matrix(m);
        let r = m.residual(x, b, &mut exchange, comm).unwrap();
        sum_sqr(&r).sqrt()
    }

    #[test]
    fn sweeps_reduce_the_residual() {
        let n = 8;
        let owner: Vec<usize> = (0..n - 1).collect();
        let neighbour: Vec<usize> = (1..n).collect();
        let m = CoupledMatrix::uncoupled(LduMatrix::new(
            vec![2.0; n],
            owner,
            neighbour,
            vec![-1.0; n - 1],
        ));
        let b = Array1::from_elem(n, 1.0);
        let mut x = Array1::from_elem(n, 0.0);
        let mut comm = ChannelComm::single();

        let before = residual_norm(&m, &x, &b, &mut comm);
        let mut exchange = PatchExchange::for_matrix(&m);
        GaussSeidel::default()
            .smooth(&m, &b, &mut x, 5, &mut exchange, &mut comm)
            .unwrap();
        let after = residual_norm(&m, &x, &b, &mut comm);

        assert!(after < before, "residual should decrease: {before} -> {after}");
    }

    #[test]
    fn symmetric_sweeps_also_converge() {
        let m = CoupledMatrix::uncoupled(LduMatrix::new(
            vec![3.0; 4],
            vec![0, 1, 2],
            vec![1, 2, 3],
            vec![-1.0; 3],
        ));
        let b = Array1::from_elem(4, 2.0);
        let mut x = Array1::from_elem(4, 0.0);
        let mut comm = ChannelComm::single();

        let mut exchange = PatchExchange::for_matrix(&m);
        GaussSeidel { symmetric: true }
            .smooth(&m, &b, &mut x, 30, &mut exchange, &mut comm)
            .unwrap();

        assert!(residual_norm(&m, &x, &b, &mut comm) < 1e-10);
    }

    #[test]
    fn cyclic_coupling_enters_the_sweep() {
        // 4-cell periodic ring, diagonally dominant
        let ldu = LduMatrix::new(vec![2.5; 4], vec![0, 1, 2], vec![1, 2, 3], vec![-1.0; 3]);
        let m = CoupledMatrix::new(
            ldu,
            vec![
                Interface::cyclic(vec![3], vec![-1.0], 1, true, Transform::Identity),
                Interface::cyclic(vec![0], vec![-1.0], 0, false, Transform::Identity),
            ],
        );
        let b = Array1::from_elem(4, 1.0);
        let mut x = Array1::from_elem(4, 0.0_f64);
        let mut comm = ChannelComm::single();

        let mut exchange = PatchExchange::for_matrix(&m);
        GaussSeidel::default()
            .smooth(&m, &b, &mut x, 120, &mut exchange, &mut comm)
            .unwrap();

        // the ring is circulant, so the converged solution is constant:
        // (2.5 - 2) * x = 1
        for i in 0..4 {
            assert!((x[i] - 2.0).abs() < 1e-6, "x[{i}] = {}", x[i]);
        }
    }
}
