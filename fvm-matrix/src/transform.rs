//! Geometric transforms for periodic boundary couplings
//!
//! A cyclic (periodic) boundary pair may relate its two patches through a
//! rotation (e.g. a wedge sector) or a reflection. The two sides of a pair
//! carry mutually inverse transforms; this is checked when a coupled matrix
//! is validated.
//!
//! Scalar face fields are invariant under these orthogonal transforms, so
//! the scalar exchange path passes values through unchanged. Vector-coupled
//! fields rotate component triples with [`Transform::apply_vector`].

use crate::traits::Scalar;

/// A 3x3 tensor stored row-major.
pub type Tensor3<T> = [[T; 3]; 3];

/// Orthogonal transform attached to one side of a coupled interface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform<T: Scalar> {
    /// Geometrically aligned patches, no transformation.
    Identity,
    /// Proper rotation (determinant +1).
    Rotation(Tensor3<T>),
    /// Reflection (determinant -1), e.g. a mirror-symmetry pair.
    Reflection(Tensor3<T>),
}

impl<T: Scalar> Transform<T> {
    /// Rotation about the z axis by `angle` radians.
    pub fn rotation_z(angle: T) -> Self {
        let (s, c) = angle.sin_cos();
        let z = T::zero();
        let o = T::one();
        Transform::Rotation([[c, -s, z], [s, c, z], [z, z, o]])
    }

    /// Householder reflection through the plane with unit normal `n`.
    pub fn reflection(n: [T; 3]) -> Self {
        let two = T::one() + T::one();
        let mut h = identity_tensor::<T>();
        for (i, row) in h.iter_mut().enumerate() {
            for (j, entry) in row.iter_mut().enumerate() {
                *entry = *entry - two * n[i] * n[j];
            }
        }
        Transform::Reflection(h)
    }

    /// The transform as an explicit tensor.
    pub fn tensor(&self) -> Tensor3<T> {
        match self {
            Transform::Identity => identity_tensor(),
            Transform::Rotation(t) | Transform::Reflection(t) => *t,
        }
    }

    /// Apply the transform to a vector triple.
    pub fn apply_vector(&self, v: [T; 3]) -> [T; 3] {
        match self {
            Transform::Identity => v,
            Transform::Rotation(t) | Transform::Reflection(t) => {
                let mut out = [T::zero(); 3];
                for (i, row) in t.iter().enumerate() {
                    for (j, &entry) in row.iter().enumerate() {
                        out[i] += entry * v[j];
                    }
                }
                out
            }
        }
    }

    /// Transform a scalar face field in place.
    ///
    /// Scalars are invariant under orthogonal patch transforms, so the
    /// values are left untouched; vector-coupled fields instead go through
    /// [`Transform::apply_vector`] per component triple.
    pub fn apply_scalar_field(&self, _values: &mut [T]) {}

    /// The inverse transform. Orthogonal tensors invert by transposition.
    pub fn inverse(&self) -> Self {
        match self {
            Transform::Identity => Transform::Identity,
            Transform::Rotation(t) => Transform::Rotation(transpose(t)),
            Transform::Reflection(t) => Transform::Reflection(transpose(t)),
        }
    }

    /// Tensor of the composition `self . other` (apply `other` first).
    pub fn compose(&self, other: &Self) -> Tensor3<T> {
        let a = self.tensor();
        let b = other.tensor();
        let mut out = [[T::zero(); 3]; 3];
        for i in 0..3 {
            for j in 0..3 {
                for (k, bk) in b.iter().enumerate() {
                    out[i][j] += a[i][k] * bk[j];
                }
            }
        }
        out
    }

    /// Whether composing with `other` yields the identity to within `tol`.
    ///
    /// The two sides of a cyclic pair must satisfy this.
    pub fn is_inverse_of(&self, other: &Self, tol: T) -> bool {
        let m = self.compose(other);
        let id = identity_tensor::<T>();
        for i in 0..3 {
            for j in 0..3 {
                if (m[i][j] - id[i][j]).abs() > tol {
                    return false;
                }
            }
        }
        true
    }
}

fn identity_tensor<T: Scalar>() -> Tensor3<T> {
    let z = T::zero();
    let o = T::one();
    [[o, z, z], [z, o, z], [z, z, o]]
}

fn transpose<T: Scalar>(t: &Tensor3<T>) -> Tensor3<T> {
    let mut out = [[T::zero(); 3]; 3];
    for (i, row) in t.iter().enumerate() {
        for (j, &entry) in row.iter().enumerate() {
            out[j][i] = entry;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rotation_rotates_unit_vector() {
        let t = Transform::rotation_z(std::f64::consts::FRAC_PI_2);
        let v = t.apply_vector([1.0, 0.0, 0.0]);
        assert_relative_eq!(v[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(v[1], 1.0, epsilon = 1e-12);
        assert_relative_eq!(v[2], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn rotation_pair_is_mutually_inverse() {
        let theta = 0.37_f64;
        let fwd = Transform::rotation_z(theta);
        let back = Transform::rotation_z(-theta);
        assert!(fwd.is_inverse_of(&back, 1e-12));
        assert!(fwd.is_inverse_of(&fwd.inverse(), 1e-12));
    }

    #[test]
    fn reflection_is_an_involution() {
        let n = [0.0, 1.0, 0.0];
        let t = Transform::<f64>::reflection(n);
        assert!(t.is_inverse_of(&t, 1e-12));

        let v = [0.5, -2.0, 1.0];
        let w = t.apply_vector(t.apply_vector(v));
        for k in 0..3 {
            assert_relative_eq!(w[k], v[k], epsilon = 1e-12);
        }
    }

    #[test]
    fn identity_composes_to_identity() {
        let id = Transform::<f64>::Identity;
        assert!(id.is_inverse_of(&id, 1e-12));
        assert_eq!(id.apply_vector([1.0, 2.0, 3.0]), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn rotation_is_not_inverse_of_wrong_angle() {
        let fwd = Transform::rotation_z(0.8_f64);
        let wrong = Transform::rotation_z(0.5_f64);
        assert!(!fwd.is_inverse_of(&wrong, 1e-9));
    }
}
