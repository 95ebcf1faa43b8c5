//! Triangular solve module.
//!
//! All solves are in place over the right-hand side. Right-side solves
//! (`X·op(A) = B`) are obtained by transposing the views on both sides of the
//! equation.

use crate::{mul::matmul_with_conj, ComplexField, Conj, MatMut, MatRef, Parallelism};
use assert2::assert as fancy_assert;
use reborrow::*;

const BASE_DIM: usize = 16;

#[inline(always)]
fn maybe_conj<T: ComplexField>(e: T, conj: Conj) -> T {
    match conj {
        Conj::Yes => e.conj(),
        Conj::No => e,
    }
}

fn solve_lower_scalar<T: ComplexField>(
    tril: MatRef<'_, T>,
    conj_lhs: Conj,
    unit: bool,
    mut rhs: MatMut<'_, T>,
) {
    let n = tril.nrows();
    let k = rhs.ncols();
    for i in 0..n {
        for j in 0..k {
            let mut acc = unsafe { *rhs.rb().get_unchecked(i, j) };
            for depth in 0..i {
                let l = maybe_conj(unsafe { *tril.get_unchecked(i, depth) }, conj_lhs);
                acc = acc - l * unsafe { *rhs.rb().get_unchecked(depth, j) };
            }
            if !unit {
                acc = acc * maybe_conj(unsafe { *tril.get_unchecked(i, i) }, conj_lhs).inv();
            }
            unsafe { *rhs.rb_mut().get_unchecked(i, j) = acc };
        }
    }
}

fn solve_upper_scalar<T: ComplexField>(
    triu: MatRef<'_, T>,
    conj_lhs: Conj,
    unit: bool,
    mut rhs: MatMut<'_, T>,
) {
    let n = triu.nrows();
    let k = rhs.ncols();
    for i in (0..n).rev() {
        for j in 0..k {
            let mut acc = unsafe { *rhs.rb().get_unchecked(i, j) };
            for depth in i + 1..n {
                let u = maybe_conj(unsafe { *triu.get_unchecked(i, depth) }, conj_lhs);
                acc = acc - u * unsafe { *rhs.rb().get_unchecked(depth, j) };
            }
            if !unit {
                acc = acc * maybe_conj(unsafe { *triu.get_unchecked(i, i) }, conj_lhs).inv();
            }
            unsafe { *rhs.rb_mut().get_unchecked(i, j) = acc };
        }
    }
}

fn solve_lower_impl<T: ComplexField>(
    tril: MatRef<'_, T>,
    conj_lhs: Conj,
    unit: bool,
    rhs: MatMut<'_, T>,
    parallelism: Parallelism,
) {
    let n = tril.nrows();
    if n <= BASE_DIM {
        return solve_lower_scalar(tril, conj_lhs, unit, rhs);
    }

    let bs = n / 2;
    let (l00, _, l10, l11) = tril.split_at(bs, bs);
    let (mut rhs_top, mut rhs_bot) = rhs.split_at_row(bs);

    solve_lower_impl(l00, conj_lhs, unit, rhs_top.rb_mut(), parallelism);
    matmul_with_conj(
        rhs_bot.rb_mut(),
        l10,
        conj_lhs,
        rhs_top.rb(),
        Conj::No,
        Some(T::one()),
        -T::one(),
        parallelism,
    );
    solve_lower_impl(l11, conj_lhs, unit, rhs_bot, parallelism);
}

fn solve_upper_impl<T: ComplexField>(
    triu: MatRef<'_, T>,
    conj_lhs: Conj,
    unit: bool,
    rhs: MatMut<'_, T>,
    parallelism: Parallelism,
) {
    let n = triu.nrows();
    if n <= BASE_DIM {
        return solve_upper_scalar(triu, conj_lhs, unit, rhs);
    }

    let bs = n / 2;
    let (u00, u01, _, u11) = triu.split_at(bs, bs);
    let (mut rhs_top, mut rhs_bot) = rhs.split_at_row(bs);

    solve_upper_impl(u11, conj_lhs, unit, rhs_bot.rb_mut(), parallelism);
    matmul_with_conj(
        rhs_top.rb_mut(),
        u01,
        conj_lhs,
        rhs_bot.rb(),
        Conj::No,
        Some(T::one()),
        -T::one(),
        parallelism,
    );
    solve_upper_impl(u00, conj_lhs, unit, rhs_top, parallelism);
}

/// Solves `op(L)·X = B` in place, where `L` is the lower triangular part of
/// the first operand (including its diagonal), and `B` is overwritten with
/// `X`. `op` conjugates `L` when `conj_lhs` is [`Conj::Yes`].
///
/// # Panics
///
/// Panics if `triangular_lower` is not square, or if its dimension does not
/// match `rhs.nrows()`.
#[track_caller]
pub fn solve_lower_triangular_in_place<T: ComplexField>(
    triangular_lower: MatRef<'_, T>,
    conj_lhs: Conj,
    rhs: MatMut<'_, T>,
    parallelism: Parallelism,
) {
    fancy_assert!(triangular_lower.nrows() == triangular_lower.ncols());
    fancy_assert!(rhs.nrows() == triangular_lower.ncols());
    solve_lower_impl(triangular_lower, conj_lhs, false, rhs, parallelism);
}

/// Solves `op(L)·X = B` in place, where `L` is the strictly lower triangular
/// part of the first operand with an implicit unit diagonal.
///
/// # Panics
///
/// See [`solve_lower_triangular_in_place`].
#[track_caller]
pub fn solve_unit_lower_triangular_in_place<T: ComplexField>(
    triangular_lower: MatRef<'_, T>,
    conj_lhs: Conj,
    rhs: MatMut<'_, T>,
    parallelism: Parallelism,
) {
    fancy_assert!(triangular_lower.nrows() == triangular_lower.ncols());
    fancy_assert!(rhs.nrows() == triangular_lower.ncols());
    solve_lower_impl(triangular_lower, conj_lhs, true, rhs, parallelism);
}

/// Solves `op(U)·X = B` in place, where `U` is the upper triangular part of
/// the first operand (including its diagonal), and `B` is overwritten with
/// `X`. `op` conjugates `U` when `conj_lhs` is [`Conj::Yes`].
///
/// # Panics
///
/// Panics if `triangular_upper` is not square, or if its dimension does not
/// match `rhs.nrows()`.
#[track_caller]
pub fn solve_upper_triangular_in_place<T: ComplexField>(
    triangular_upper: MatRef<'_, T>,
    conj_lhs: Conj,
    rhs: MatMut<'_, T>,
    parallelism: Parallelism,
) {
    fancy_assert!(triangular_upper.nrows() == triangular_upper.ncols());
    fancy_assert!(rhs.nrows() == triangular_upper.ncols());
    solve_upper_impl(triangular_upper, conj_lhs, false, rhs, parallelism);
}

/// Solves `op(U)·X = B` in place, where `U` is the strictly upper triangular
/// part of the first operand with an implicit unit diagonal.
///
/// # Panics
///
/// See [`solve_upper_triangular_in_place`].
#[track_caller]
pub fn solve_unit_upper_triangular_in_place<T: ComplexField>(
    triangular_upper: MatRef<'_, T>,
    conj_lhs: Conj,
    rhs: MatMut<'_, T>,
    parallelism: Parallelism,
) {
    fancy_assert!(triangular_upper.nrows() == triangular_upper.ncols());
    fancy_assert!(rhs.nrows() == triangular_upper.ncols());
    solve_upper_impl(triangular_upper, conj_lhs, true, rhs, parallelism);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mul::matmul, Mat};
    use assert_approx_eq::assert_approx_eq;
    use rand::prelude::*;
    use std::cell::RefCell;

    thread_local! {
        static RNG: RefCell<StdRng> = RefCell::new(StdRng::seed_from_u64(0));
    }

    fn random_value() -> f64 {
        RNG.with(|rng| rng.borrow_mut().gen())
    }

    fn well_conditioned_tri(n: usize) -> Mat<f64> {
        Mat::from_fn(n, n, |i, j| {
            if i == j {
                4.0 + random_value()
            } else {
                random_value() - 0.5
            }
        })
    }

    #[test]
    fn test_solve_lower() {
        for n in [1, 2, 7, 16, 35, 64] {
            let tri = well_conditioned_tri(n);
            let rhs = Mat::from_fn(n, 3, |_, _| random_value());
            let mut x = rhs.clone();

            solve_lower_triangular_in_place(
                tri.as_ref(),
                Conj::No,
                x.as_mut(),
                Parallelism::None,
            );

            let tri_masked = Mat::from_fn(n, n, |i, j| if i >= j { tri[(i, j)] } else { 0.0 });
            let mut product = Mat::zeros(n, 3);
            matmul(
                product.as_mut(),
                tri_masked.as_ref(),
                x.as_ref(),
                None,
                1.0,
                Parallelism::None,
            );
            for i in 0..n {
                for j in 0..3 {
                    assert_approx_eq!(product[(i, j)], rhs[(i, j)]);
                }
            }
        }
    }

    #[test]
    fn test_solve_unit_upper() {
        for n in [3, 17, 40] {
            let tri = well_conditioned_tri(n);
            let rhs = Mat::from_fn(n, 2, |_, _| random_value());
            let mut x = rhs.clone();

            solve_unit_upper_triangular_in_place(
                tri.as_ref(),
                Conj::No,
                x.as_mut(),
                Parallelism::None,
            );

            let tri_masked =
                Mat::from_fn(
                    n,
                    n,
                    |i, j| {
                        if i < j {
                            tri[(i, j)]
                        } else if i == j {
                            1.0
                        } else {
                            0.0
                        }
                    },
                );
            let mut product = Mat::zeros(n, 2);
            matmul(
                product.as_mut(),
                tri_masked.as_ref(),
                x.as_ref(),
                None,
                1.0,
                Parallelism::None,
            );
            for i in 0..n {
                for j in 0..2 {
                    assert_approx_eq!(product[(i, j)], rhs[(i, j)]);
                }
            }
        }
    }

    #[test]
    fn test_right_side_solve_via_transpose() {
        // X·U = B is solved as op(U)ᵀ·Xᵀ = Bᵀ
        let n = 20;
        let k = 4;
        let tri = well_conditioned_tri(n);
        let rhs = Mat::from_fn(k, n, |_, _| random_value());
        let mut x = rhs.clone();

        solve_lower_triangular_in_place(
            tri.as_ref().transpose(),
            Conj::No,
            x.as_mut().transpose(),
            Parallelism::None,
        );

        let tri_masked = Mat::from_fn(n, n, |i, j| if i <= j { tri[(i, j)] } else { 0.0 });
        let mut product = Mat::zeros(k, n);
        matmul(
            product.as_mut(),
            x.as_ref(),
            tri_masked.as_ref(),
            None,
            1.0,
            Parallelism::None,
        );
        for i in 0..k {
            for j in 0..n {
                assert_approx_eq!(product[(i, j)], rhs[(i, j)]);
            }
        }
    }
}
