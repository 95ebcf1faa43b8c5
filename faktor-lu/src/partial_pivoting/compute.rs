use assert2::assert as fancy_assert;
use dyn_stack::{DynStack, SizeOverflow, StackReq};
use faktor_core::{
    mul::matmul, permutation::swap_rows, solve::solve_unit_lower_triangular_in_place, ComplexField,
    Conj, MatMut, Parallelism,
};
use reborrow::*;

/// Error signaling that an exactly zero pivot was encountered during the
/// factorization, leaving the matrix singular at that step.
///
/// Columns before the failing step remain fully factored, and the pivot
/// entries recorded for them stay valid; the failing column and everything
/// after it are untouched below the diagonal.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ZeroPivot {
    /// 1-based index of the step at which the zero pivot was found.
    pub index: usize,
}

/// Options for the blocked LU factorization.
#[derive(Copy, Clone, Debug)]
pub struct LuParams {
    /// Width of the panels factored by the unblocked kernel before the
    /// trailing submatrix is updated with level-3 work.
    pub blocksize: usize,
}

impl Default for LuParams {
    #[inline]
    fn default() -> Self {
        Self { blocksize: 32 }
    }
}

/// Unblocked panel kernel over `ncols` columns starting at `col_start`.
///
/// `matrix` spans the full width of the factored matrix so that row
/// interchanges apply to entire rows; the recorded pivots and the reported
/// failure index are relative to the first row of `matrix`.
fn lu_in_place_unblocked<T: ComplexField>(
    matrix: MatMut<'_, T>,
    col_start: usize,
    ncols: usize,
    pivots: &mut [usize],
) -> Result<usize, ZeroPivot> {
    let mut matrix = matrix;
    let m = matrix.nrows();
    let mut n_transpositions = 0;

    for j in 0..ncols {
        // partial pivoting: largest magnitude in the active column, ties
        // broken by the lowest row index
        let mut max = T::Real::zero();
        let mut imax = j;
        for i in j..m {
            let score = unsafe { *matrix.rb().get_unchecked(i, col_start + j) }.score();
            if score > max {
                imax = i;
                max = score;
            }
        }
        pivots[j] = imax;

        if max == T::Real::zero() {
            return Err(ZeroPivot { index: j + 1 });
        }

        if imax != j {
            n_transpositions += 1;
            swap_rows(matrix.rb_mut(), j, imax);
        }

        let inv = unsafe { *matrix.rb().get_unchecked(j, col_start + j) }.inv();
        for i in j + 1..m {
            let e = unsafe { matrix.rb_mut().get_unchecked(i, col_start + j) };
            *e = *e * inv;
        }

        // rank-1 update of the remainder of the panel
        let panel = matrix.rb_mut().submatrix(0, col_start, m, ncols);
        let (_, top_right, bottom_left, bottom_right) = panel.split_at(j + 1, j + 1);
        matmul(
            bottom_right,
            bottom_left.rb().col(j).as_2d(),
            top_right.rb().row(j).as_2d(),
            Some(T::one()),
            -T::one(),
            Parallelism::None,
        );
    }

    Ok(n_transpositions)
}

/// Computes the workspace requirement of [`lu_in_place`], without allocating.
///
/// The driver performs its updates in place, so the requirement is currently
/// empty; it is kept as part of the workspace protocol shared by the
/// factorization drivers.
pub fn lu_in_place_req<T: 'static>(
    nrows: usize,
    ncols: usize,
    params: LuParams,
) -> Result<StackReq, SizeOverflow> {
    let _ = (nrows, ncols, params);
    Ok(StackReq::default())
}

/// Computes the blocked LU factorization with partial pivoting of `matrix` in
/// place.
///
/// On exit, the elements on and above the diagonal hold the upper trapezoidal
/// factor `U`; the unit lower trapezoidal factor `L` is stored below the
/// diagonal, its unit diagonal implicit. `pivots[i]` records the row that was
/// swapped into position `i`, with `i <= pivots[i] < nrows`; `Ok` carries the
/// number of transpositions performed.
///
/// If a pivot candidate is exactly zero, the factorization stops and reports
/// the 1-based failing step through [`ZeroPivot`]; the leading columns remain
/// factored.
///
/// # Panics
///
/// - Panics if `pivots` has fewer than `min(nrows, ncols)` elements.
/// - Panics if `params.blocksize` is zero.
#[track_caller]
pub fn lu_in_place<T: ComplexField>(
    matrix: MatMut<'_, T>,
    pivots: &mut [usize],
    parallelism: Parallelism,
    stack: DynStack<'_>,
    params: LuParams,
) -> Result<usize, ZeroPivot> {
    let m = matrix.nrows();
    let n = matrix.ncols();
    let size = m.min(n);

    fancy_assert!(params.blocksize >= 1);
    fancy_assert!(pivots.len() >= size);

    // no scratch storage is carved; the stack participates in the shared
    // workspace protocol and may be empty
    let _ = stack;

    if size == 0 {
        return Ok(0);
    }

    let mut matrix = matrix;
    let nb = params.blocksize;
    let mut n_transpositions = 0;

    let mut j = 0;
    while j < size {
        let ib = nb.min(size - j);

        // the panel kernel sees every column so that its interchanges apply
        // to full rows, already-factored columns included
        let panel_rows = matrix.rb_mut().subrows(j, m - j);
        match lu_in_place_unblocked(panel_rows, j, ib, &mut pivots[j..j + ib]) {
            Ok(count) => n_transpositions += count,
            Err(err) => {
                for p in &mut pivots[j..j + err.index] {
                    *p += j;
                }
                return Err(ZeroPivot {
                    index: j + err.index,
                });
            }
        }
        for p in &mut pivots[j..j + ib] {
            *p += j;
        }

        if j + ib < n {
            // level-3 trailing update: U12 = L11⁻¹·A12, A22 -= L21·U12
            let (_, _, _, rest) = matrix.rb_mut().split_at(j, j);
            let (left, trailing) = rest.split_at_col(ib);
            let (l11, l21) = left.split_at_row(ib);
            let (mut a12, mut a22) = trailing.split_at_row(ib);

            solve_unit_lower_triangular_in_place(
                l11.rb(),
                Conj::No,
                a12.rb_mut(),
                parallelism,
            );
            matmul(
                a22.rb_mut(),
                l21.rb(),
                a12.rb(),
                Some(T::one()),
                -T::one(),
                parallelism,
            );
        }

        j += ib;
    }

    Ok(n_transpositions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partial_pivoting::reconstruct::reconstruct;
    use faktor_core::{
        norm::{norm, Norm},
        Mat,
    };
    use rand::prelude::*;
    use std::cell::RefCell;

    thread_local! {
        static RNG: RefCell<StdRng> = RefCell::new(StdRng::seed_from_u64(0));
    }

    fn random_value() -> f64 {
        RNG.with(|rng| rng.borrow_mut().gen())
    }

    fn roundtrip_error(mat_orig: &Mat<f64>, lu: &Mat<f64>, pivots: &[usize]) -> f64 {
        let m = mat_orig.nrows();
        let n = mat_orig.ncols();

        let mut reconstructed = Mat::zeros(m, n);
        reconstruct(
            reconstructed.as_mut(),
            lu.as_ref(),
            pivots,
            Parallelism::None,
        );

        let diff = Mat::from_fn(m, n, |i, j| reconstructed[(i, j)] - mat_orig[(i, j)]);
        norm(Norm::Max, diff.as_ref()) / norm(Norm::Max, mat_orig.as_ref())
    }

    #[test]
    fn test_blocked_roundtrip() {
        for (m, n) in [
            (2, 2),
            (4, 4),
            (2, 4),
            (4, 2),
            (20, 20),
            (40, 20),
            (20, 40),
            (60, 60),
            (100, 100),
        ] {
            let size = m.min(n);
            for blocksize in [1, 8, 32, 101] {
                let params = LuParams { blocksize };
                let mat_orig = Mat::from_fn(m, n, |_, _| random_value() - 0.5);
                let mut lu = mat_orig.clone();
                let mut pivots = vec![0usize; size];

                let n_transpositions = lu_in_place(
                    lu.as_mut(),
                    &mut pivots,
                    Parallelism::None,
                    DynStack::new(&mut []),
                    params,
                )
                .unwrap();
                assert!(n_transpositions <= size);

                for (i, &p) in pivots.iter().enumerate() {
                    assert!(i <= p && p < m);
                }

                let tol = 200.0 * (size as f64) * f64::EPSILON;
                let err = roundtrip_error(&mat_orig, &lu, &pivots);
                assert!(err <= tol, "m={m} n={n} nb={blocksize} err={err:e}");
            }
        }
    }

    #[test]
    fn test_zero_pivot_reports_step() {
        let n = 12;
        let params = LuParams { blocksize: 4 };

        // an all-zero column stays zero through every elimination step, so
        // the pivot search at that column finds an exactly zero candidate
        let failing_col = 5;
        let mat = Mat::from_fn(n, n, |i, j| {
            if j == failing_col {
                0.0
            } else {
                random_value() + if i == j { 10.0 } else { 0.0 }
            }
        });

        let mut lu = mat.clone();
        let mut pivots = vec![usize::MAX; n];
        let err = lu_in_place(
            lu.as_mut(),
            &mut pivots,
            Parallelism::None,
            DynStack::new(&mut []),
            params,
        )
        .unwrap_err();

        assert_eq!(err.index, failing_col + 1);
        // pivots of the completed steps were recorded and made absolute
        for (i, &p) in pivots[..failing_col].iter().enumerate() {
            assert!(i <= p && p < n);
        }

        // the leading columns match the factorization of the same matrix
        // with the failing columns removed
        let mut leading = Mat::from_fn(n, failing_col, |i, j| mat[(i, j)]);
        let mut leading_pivots = vec![0usize; failing_col];
        lu_in_place(
            leading.as_mut(),
            &mut leading_pivots,
            Parallelism::None,
            DynStack::new(&mut []),
            params,
        )
        .unwrap();
        for (i, &p) in leading_pivots.iter().enumerate() {
            assert_eq!(p, pivots[i]);
        }
        for j in 0..failing_col {
            for i in 0..n {
                let diff = (lu[(i, j)] - leading[(i, j)]).abs();
                assert!(diff <= 1e-12, "i={i} j={j} diff={diff:e}");
            }
        }
    }

    #[test]
    fn test_quick_return() {
        for (m, n) in [(0, 0), (0, 4), (4, 0)] {
            let mut mat = Mat::<f64>::zeros(m, n);
            let mut pivots: [usize; 0] = [];
            let n_transpositions = lu_in_place(
                mat.as_mut(),
                &mut pivots,
                Parallelism::None,
                DynStack::new(&mut []),
                LuParams::default(),
            )
            .unwrap();
            assert_eq!(n_transpositions, 0);
        }
    }

    #[test]
    fn test_blocked_matches_unblocked() {
        let (m, n) = (48, 36);
        let mat_orig = Mat::from_fn(m, n, |_, _| random_value() - 0.5);

        let mut lu_unblocked = mat_orig.clone();
        let mut pivots_unblocked = vec![0usize; n];
        lu_in_place(
            lu_unblocked.as_mut(),
            &mut pivots_unblocked,
            Parallelism::None,
            DynStack::new(&mut []),
            LuParams { blocksize: 48 },
        )
        .unwrap();

        let mut lu_blocked = mat_orig.clone();
        let mut pivots_blocked = vec![0usize; n];
        lu_in_place(
            lu_blocked.as_mut(),
            &mut pivots_blocked,
            Parallelism::None,
            DynStack::new(&mut []),
            LuParams { blocksize: 8 },
        )
        .unwrap();

        // identical pivot choices, near-identical factors
        assert_eq!(pivots_unblocked, pivots_blocked);
        for i in 0..m {
            for j in 0..n {
                let diff = (lu_unblocked[(i, j)] - lu_blocked[(i, j)]).abs();
                assert!(diff <= 1e-12, "i={i} j={j} diff={diff:e}");
            }
        }
    }
}
