//! Row and column interchange primitives.

use crate::MatMut;
use assert2::assert as fancy_assert;
use reborrow::*;

/// Swaps the rows at indices `a` and `b` of the matrix, over every column.
///
/// # Panics
///
/// Panics if `a` or `b` is out of bounds.
#[track_caller]
pub fn swap_rows<T>(mat: MatMut<'_, T>, a: usize, b: usize) {
    fancy_assert!(a < mat.nrows());
    fancy_assert!(b < mat.nrows());

    if a == b {
        return;
    }

    let mut mat = mat;
    let n = mat.ncols();
    for j in 0..n {
        unsafe {
            let pa = mat.rb_mut().ptr_at(a, j);
            let pb = mat.rb_mut().ptr_at(b, j);
            core::ptr::swap(pa, pb);
        }
    }
}

/// Swaps the columns at indices `a` and `b` of the matrix, over every row.
///
/// # Panics
///
/// Panics if `a` or `b` is out of bounds.
#[track_caller]
pub fn swap_cols<T>(mat: MatMut<'_, T>, a: usize, b: usize) {
    swap_rows(mat.transpose(), a, b);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Mat;

    #[test]
    fn test_swap_rows() {
        let mut mat = Mat::from_fn(4, 3, |i, j| (10 * i + j) as f64);
        swap_rows(mat.as_mut(), 0, 2);
        assert_eq!(mat[(0, 1)], 21.0);
        assert_eq!(mat[(2, 1)], 1.0);
        assert_eq!(mat[(1, 1)], 11.0);

        // swapping a row with itself is a no-op
        swap_rows(mat.as_mut(), 3, 3);
        assert_eq!(mat[(3, 2)], 32.0);
    }

    #[test]
    fn test_swap_cols() {
        let mut mat = Mat::from_fn(3, 3, |i, j| (10 * i + j) as f64);
        swap_cols(mat.as_mut(), 1, 2);
        assert_eq!(mat[(0, 1)], 2.0);
        assert_eq!(mat[(0, 2)], 1.0);
    }
}
