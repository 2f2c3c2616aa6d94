//! Agglomerated algebraic multigrid for partitioned finite-volume systems
//!
//! This crate builds a multigrid hierarchy from a fine-level
//! [`fvm_matrix::CoupledMatrix`] by pairwise agglomeration and solves the
//! system with V- or W-cycles. Couplings across process partitions and
//! periodic boundary pairs are carried down every level of the hierarchy,
//! so the same solver runs unchanged on a serial case, a periodic case, or
//! a mesh split across many ranks.
//!
//! # Features
//!
//! - **Pairwise agglomeration**: deterministic strength-based clustering
//!   with exact coefficient conservation per coarsening step
//! - **Coupled coarse levels**: processor and cyclic interfaces
//!   agglomerated alongside the matrix, peer identities and transforms
//!   preserved
//! - **V- and W-cycles** with a pluggable smoother (Gauss-Seidel provided)
//! - **Coarsest-level solve**: dense LU when local, aggressive smoothing
//!   when still coupled across ranks
//!
//! # Example
//!
//! ```ignore
//! use fvm_amg::{MultigridControls, MultigridSolver};
//! use fvm_matrix::ChannelComm;
//!
//! let solver = MultigridSolver::new(MultigridControls::default());
//! let mut comm = ChannelComm::single();
//! let report = solver.solve(&matrix, &b, &mut x, &mut comm)?;
//! assert!(report.converged);
//! ```

pub mod agglomerate;
pub mod cycle;
pub mod error;
pub mod hierarchy;
pub mod lu;
pub mod smoother;
pub mod solver;
pub mod transfer;

pub use agglomerate::{build_coarse_level, cluster_cells, FaceTarget, RestrictMap};
pub use cycle::CycleKind;
pub use error::MultigridError;
pub use hierarchy::{Hierarchy, HierarchyStats};
pub use lu::{factorize, LuError, LuFactors};
pub use smoother::{GaussSeidel, Smoother};
pub use solver::{MultigridControls, MultigridSolver, SolveReport};
pub use transfer::{prolongate_from_coarse, restrict_to_coarse};
