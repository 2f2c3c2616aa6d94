//! Scalar seam for the solver kernels
//!
//! Finite-volume systems solved here are real-valued, so the scalar trait
//! abstracts over the real floating-point types only.

use num_traits::{Float, FromPrimitive, NumAssign, ToPrimitive};
use std::fmt::Debug;
use std::iter::Sum;

/// Trait for scalar types usable in matrix coefficients and field values.
///
/// Implemented for `f64` (the default for pressure-style systems) and `f32`
/// (for memory-constrained cases).
pub trait Scalar:
    Float + NumAssign + FromPrimitive + ToPrimitive + Sum + Send + Sync + Debug + 'static
{
}

impl Scalar for f64 {}
impl Scalar for f32 {}
