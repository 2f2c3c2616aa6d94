//! Transfer operators between hierarchy levels
//!
//! Restriction sums fine values over each cluster; prolongation hands each
//! fine cell its cluster's coarse value unchanged. The two are adjoint,
//! which together with coarsening-by-summation keeps the coarse problem a
//! Galerkin projection of the fine one.

use crate::agglomerate::RestrictMap;
use fvm_matrix::Scalar;
use ndarray::Array1;

/// Restrict a fine residual to the coarse level: each coarse cell receives
/// the sum of its cluster members.
pub fn restrict_to_coarse<T: Scalar>(map: &RestrictMap, fine: &Array1<T>) -> Array1<T> {
    let mut coarse = Array1::from_elem(map.n_coarse, T::zero());
    for (cell, &c) in map.fine_to_coarse.iter().enumerate() {
        coarse[c] += fine[cell];
    }
    coarse
}

/// Prolongate a coarse correction and add it to the fine field:
/// `fine[i] += coarse[cluster(i)]` (piecewise-constant interpolation).
pub fn prolongate_from_coarse<T: Scalar>(
    map: &RestrictMap,
    coarse: &Array1<T>,
    fine: &mut Array1<T>,
) {
    for (cell, &c) in map.fine_to_coarse.iter().enumerate() {
        fine[cell] += coarse[c];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn map() -> RestrictMap {
        RestrictMap {
            fine_to_coarse: vec![0, 0, 1, 1, 2],
            n_coarse: 3,
            face_restrict: Vec::new(),
            interface_face_restrict: Vec::new(),
        }
    }

    #[test]
    fn restriction_sums_clusters() {
        let fine = array![1.0, 2.0, 3.0, 4.0, 5.0];
        let coarse = restrict_to_coarse(&map(), &fine);
        assert_relative_eq!(coarse[0], 3.0);
        assert_relative_eq!(coarse[1], 7.0);
        assert_relative_eq!(coarse[2], 5.0);
    }

    #[test]
    fn prolongation_adds_cluster_values() {
        let coarse = array![10.0, 20.0, 30.0];
        let mut fine = array![1.0, 1.0, 1.0, 1.0, 1.0];
        prolongate_from_coarse(&map(), &coarse, &mut fine);
        assert_relative_eq!(fine[0], 11.0);
        assert_relative_eq!(fine[1], 11.0);
        assert_relative_eq!(fine[2], 21.0);
        assert_relative_eq!(fine[4], 31.0);
    }
}
