//! Matrix norm computations.
//!
//! All accumulations propagate NaN immediately: the first NaN observed is
//! returned as the result, regardless of the other entries.

use crate::{ComplexField, MatRef, RealField, Uplo};

/// Selects the norm computed by [`norm`] and [`triangular_norm`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Norm {
    /// Maximum absolute value over all elements. Not a consistent matrix norm.
    Max,
    /// Maximum absolute column sum.
    One,
    /// Maximum absolute row sum.
    Inf,
}

/// Whether a triangular matrix has an implicit unit diagonal.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Diag {
    /// The diagonal is stored.
    NonUnit,
    /// The diagonal is an implicit identity; stored diagonal entries are not
    /// accessed.
    Unit,
}

#[inline]
fn fold_max<T: RealField>(acc: &mut T, value: T) -> Option<T> {
    if value > *acc {
        *acc = value;
    } else if value.is_nan() {
        return Some(value);
    }
    None
}

/// Computes the selected norm of a general matrix.
///
/// Returns zero for a matrix with no elements. If a NaN entry is encountered,
/// it is returned immediately.
pub fn norm<T: ComplexField>(norm_type: Norm, mat: MatRef<'_, T>) -> T::Real {
    let m = mat.nrows();
    let n = mat.ncols();

    if m == 0 || n == 0 {
        return T::Real::zero();
    }

    let mut result = T::Real::zero();
    match norm_type {
        Norm::Max => {
            for j in 0..n {
                for i in 0..m {
                    let temp = unsafe { *mat.get_unchecked(i, j) }.abs();
                    if let Some(nan) = fold_max(&mut result, temp) {
                        return nan;
                    }
                }
            }
        }
        Norm::One => {
            for j in 0..n {
                let mut sum = T::Real::zero();
                for i in 0..m {
                    sum = sum + unsafe { *mat.get_unchecked(i, j) }.abs();
                }
                if let Some(nan) = fold_max(&mut result, sum) {
                    return nan;
                }
            }
        }
        Norm::Inf => {
            for i in 0..m {
                let mut sum = T::Real::zero();
                for j in 0..n {
                    sum = sum + unsafe { *mat.get_unchecked(i, j) }.abs();
                }
                if let Some(nan) = fold_max(&mut result, sum) {
                    return nan;
                }
            }
        }
    }
    result
}

/// Computes the selected norm of the triangular (or trapezoidal) part of a
/// matrix. Elements outside the selected half are treated as zero; with
/// [`Diag::Unit`], the diagonal contributes exactly one and its stored
/// entries are not accessed.
///
/// Returns zero for a matrix with no elements. If a NaN entry is encountered,
/// it is returned immediately.
pub fn triangular_norm<T: ComplexField>(
    norm_type: Norm,
    uplo: Uplo,
    diag: Diag,
    mat: MatRef<'_, T>,
) -> T::Real {
    let m = mat.nrows();
    let n = mat.ncols();

    if m == 0 || n == 0 {
        return T::Real::zero();
    }

    // row range of column j that lies inside the selected half, diagonal
    // excluded for the unit case
    let col_range = |j: usize| -> (usize, usize) {
        match (uplo, diag) {
            (Uplo::Lower, Diag::NonUnit) => (j.min(m), m),
            (Uplo::Lower, Diag::Unit) => ((j + 1).min(m), m),
            (Uplo::Upper, Diag::NonUnit) => (0, (j + 1).min(m)),
            (Uplo::Upper, Diag::Unit) => (0, j.min(m)),
        }
    };
    let unit_diag_hits_col = |j: usize| diag == Diag::Unit && j < m;

    let mut result = T::Real::zero();
    match norm_type {
        Norm::Max => {
            for j in 0..n {
                let (start, end) = col_range(j);
                for i in start..end {
                    let temp = unsafe { *mat.get_unchecked(i, j) }.abs();
                    if let Some(nan) = fold_max(&mut result, temp) {
                        return nan;
                    }
                }
            }
            if diag == Diag::Unit && result < T::Real::one() {
                result = T::Real::one();
            }
        }
        Norm::One => {
            for j in 0..n {
                let mut sum = T::Real::zero();
                let (start, end) = col_range(j);
                for i in start..end {
                    sum = sum + unsafe { *mat.get_unchecked(i, j) }.abs();
                }
                if unit_diag_hits_col(j) {
                    sum = sum + T::Real::one();
                }
                if let Some(nan) = fold_max(&mut result, sum) {
                    return nan;
                }
            }
        }
        Norm::Inf => {
            for i in 0..m {
                let mut sum = T::Real::zero();
                for j in 0..n {
                    let (start, end) = col_range(j);
                    if i >= start && i < end {
                        sum = sum + unsafe { *mat.get_unchecked(i, j) }.abs();
                    }
                }
                if diag == Diag::Unit && i < n {
                    sum = sum + T::Real::one();
                }
                if let Some(nan) = fold_max(&mut result, sum) {
                    return nan;
                }
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Mat;

    #[test]
    fn test_general_norms() {
        let mat = Mat::from_fn(3, 2, |i, j| if (i, j) == (2, 1) { -5.0 } else { 1.0 });

        assert_eq!(norm(Norm::Max, mat.as_ref()), 5.0);
        assert_eq!(norm(Norm::One, mat.as_ref()), 7.0);
        assert_eq!(norm(Norm::Inf, mat.as_ref()), 6.0);
    }

    #[test]
    fn test_zero_and_empty() {
        let empty = Mat::<f64>::zeros(0, 4);
        assert_eq!(norm(Norm::Max, empty.as_ref()), 0.0);
        assert_eq!(norm(Norm::Inf, empty.as_ref()), 0.0);

        let zero = Mat::<f64>::zeros(4, 4);
        assert_eq!(norm(Norm::Max, zero.as_ref()), 0.0);
        assert_eq!(norm(Norm::One, zero.as_ref()), 0.0);
        assert_eq!(
            triangular_norm(Norm::Max, Uplo::Lower, Diag::NonUnit, zero.as_ref()),
            0.0
        );
        // the implicit unit diagonal dominates an all-zero matrix
        assert_eq!(
            triangular_norm(Norm::Max, Uplo::Lower, Diag::Unit, zero.as_ref()),
            1.0
        );
        assert_eq!(
            triangular_norm(Norm::One, Uplo::Upper, Diag::Unit, zero.as_ref()),
            1.0
        );
    }

    #[test]
    fn test_nan_poison() {
        let mut mat = Mat::from_fn(4, 4, |i, j| (i * 4 + j) as f64);
        mat[(1, 2)] = f64::NAN;

        assert!(norm(Norm::Max, mat.as_ref()).is_nan());
        assert!(norm(Norm::One, mat.as_ref()).is_nan());
        assert!(norm(Norm::Inf, mat.as_ref()).is_nan());
        assert!(
            triangular_norm(Norm::Max, Uplo::Upper, Diag::NonUnit, mat.as_ref()).is_nan()
        );
        // the NaN lies strictly above the diagonal, so the lower triangular
        // norm never observes it
        assert!(
            !triangular_norm(Norm::Max, Uplo::Lower, Diag::NonUnit, mat.as_ref()).is_nan()
        );
    }

    #[test]
    fn test_triangular_halves() {
        let mat = Mat::from_fn(3, 3, |i, j| {
            if i > j {
                100.0
            } else if i == j {
                10.0
            } else {
                1.0
            }
        });

        assert_eq!(
            triangular_norm(Norm::Max, Uplo::Upper, Diag::NonUnit, mat.as_ref()),
            10.0
        );
        assert_eq!(
            triangular_norm(Norm::Max, Uplo::Upper, Diag::Unit, mat.as_ref()),
            1.0
        );
        assert_eq!(
            triangular_norm(Norm::One, Uplo::Lower, Diag::NonUnit, mat.as_ref()),
            210.0
        );
        assert_eq!(
            triangular_norm(Norm::Inf, Uplo::Lower, Diag::Unit, mat.as_ref()),
            201.0
        );
    }
}
