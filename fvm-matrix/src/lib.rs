//! Face-addressed sparse matrices for partitioned finite-volume meshes
//!
//! This crate provides the matrix layer of a distributed multigrid solver:
//!
//! - **LDU matrices**: diagonal plus one symmetric coefficient per
//!   owner/neighbour face pair, the natural storage for finite-volume
//!   discretizations
//! - **Coupled interfaces**: `Processor` couplings to a mesh partition on
//!   another rank and `Cyclic` couplings across periodic boundary pairs,
//!   including rotation/reflection transforms
//! - **Transport**: a nonblocking rank-to-rank exchange engine with
//!   per-interface buffers, plus a channel-backed communicator for
//!   in-process simulated ranks
//!
//! # Example
//!
//! ```ignore
//! use fvm_matrix::{ChannelComm, CoupledMatrix, LduMatrix, PatchExchange};
//!
//! let matrix = CoupledMatrix::new(ldu, interfaces);
//! matrix.validate()?;
//!
//! let mut comm = ChannelComm::single();
//! let mut exchange = PatchExchange::for_matrix(&matrix);
//! let y = matrix.matvec(&x, &mut exchange, &mut comm)?;
//! ```

pub mod error;
pub mod interface;
pub mod ldu;
pub mod traits;
pub mod transform;
pub mod transport;

pub use error::MatrixError;
pub use interface::{CoupledMatrix, Coupling, Interface};
pub use ldu::{sum_sqr, LduMatrix};
pub use traits::Scalar;
pub use transform::{Tensor3, Transform};
pub use transport::{ChannelComm, Communicator, PatchExchange, TransportError};
