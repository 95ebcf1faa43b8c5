use assert2::assert as fancy_assert;
use faktor_core::{
    mul::{
        matmul,
        triangular::{self, BlockStructure},
    },
    permutation::swap_rows,
    ComplexField, Conj, MatMut, MatRef, Parallelism,
};
use reborrow::*;

/// Reconstructs `A = P·L·U` from the packed factorization computed by
/// [`lu_in_place`](super::compute::lu_in_place), storing the result in `dst`.
///
/// # Panics
///
/// - Panics if `dst` does not have the same shape as `lu_factors`.
/// - Panics if `pivots` has fewer than `min(nrows, ncols)` elements.
#[track_caller]
pub fn reconstruct<T: ComplexField>(
    dst: MatMut<'_, T>,
    lu_factors: MatRef<'_, T>,
    pivots: &[usize],
    parallelism: Parallelism,
) {
    let m = lu_factors.nrows();
    let n = lu_factors.ncols();
    let size = m.min(n);

    fancy_assert!((dst.nrows(), dst.ncols()) == (m, n));
    fancy_assert!(pivots.len() >= size);

    let mut dst = dst;

    // dst = L·U, by quadrants around the (size, size) corner
    {
        let (l_top, l_bot) = lu_factors.submatrix(0, 0, m, size).split_at_row(size);
        let (u_left, u_right) = lu_factors.submatrix(0, 0, size, n).split_at_col(size);
        let (dst_top_left, dst_top_right, dst_bot_left, dst_bot_right) =
            dst.rb_mut().split_at(size, size);

        triangular::matmul(
            dst_top_left,
            BlockStructure::Rectangular,
            l_top,
            BlockStructure::UnitTriangularLower,
            Conj::No,
            u_left,
            BlockStructure::TriangularUpper,
            Conj::No,
            None,
            T::one(),
            parallelism,
        );
        triangular::matmul(
            dst_top_right,
            BlockStructure::Rectangular,
            l_top,
            BlockStructure::UnitTriangularLower,
            Conj::No,
            u_right,
            BlockStructure::Rectangular,
            Conj::No,
            None,
            T::one(),
            parallelism,
        );
        triangular::matmul(
            dst_bot_left,
            BlockStructure::Rectangular,
            l_bot,
            BlockStructure::Rectangular,
            Conj::No,
            u_left,
            BlockStructure::TriangularUpper,
            Conj::No,
            None,
            T::one(),
            parallelism,
        );
        matmul(
            dst_bot_right,
            l_bot,
            u_right,
            None,
            T::one(),
            parallelism,
        );
    }

    // replaying the interchanges backwards applies the permutation P
    for i in (0..size).rev() {
        swap_rows(dst.rb_mut(), i, pivots[i]);
    }
}
