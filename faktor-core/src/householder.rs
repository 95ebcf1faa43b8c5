//! Householder reflector helpers.
//!
//! A reflector is stored in the factored-matrix convention: the essential
//! part `v[1..]` lives below the diagonal of the factored panel, `v[0] = 1`
//! is implicit, and the scale factor `tau` lives in a separate vector.
//!
//! With `H(k) = I − tau[k]·v(k)·v(k)ᴴ`, the product `H(0)·H(1)·…·H(ib−1)` of a
//! panel's reflectors is captured by an upper triangular factor `T` such that
//! the product equals `I − V·T·Vᴴ`, which lets a whole panel be applied with a
//! single level-3 call.

use crate::{
    mul::{
        matmul_with_conj,
        triangular::{self, BlockStructure},
    },
    temp_mat_zeroed, ColMut, ColRef, ComplexField, Conj, MatMut, MatRef, Parallelism,
};
use assert2::assert as fancy_assert;
use dyn_stack::DynStack;
use reborrow::*;

/// Generates the Householder reflector that annihilates the tail of the
/// column `[head, essential]`, writing the essential part in place, and
/// returns `(tau, beta)` where `beta` is the resulting leading coefficient.
///
/// A column that is entirely zero yields `tau = 0`, making the reflector the
/// identity.
pub fn make_householder_in_place<T: ComplexField>(
    essential: ColMut<'_, T>,
    head: T,
    tail_squared_norm: T::Real,
) -> (T, T) {
    let head_squared_norm = (head * head.conj()).real();
    let norm = (head_squared_norm + tail_squared_norm).sqrt();
    if norm == T::Real::zero() {
        return (T::zero(), T::zero());
    }

    let sign = if head_squared_norm > T::Real::zero() {
        head.scale(head_squared_norm.sqrt().inv())
    } else {
        T::one()
    };

    let signed_norm = sign * T::from_real(norm);
    let head_with_beta = head + signed_norm;
    let inv = head_with_beta.inv();
    essential.cwise().for_each(|e| *e = *e * inv);

    let two = T::Real::one() + T::Real::one();
    let tau = two / (T::Real::one() + tail_squared_norm * (inv * inv.conj()).real());
    (T::from_real(tau), -signed_norm)
}

/// Applies `I − tau'·v·vᴴ` to the given matrix from the left, in place, where
/// `v = [1, essential]` and `tau'` is `householder_coeff`, conjugated when
/// `conj_householder` is [`Conj::Yes`].
///
/// # Panics
///
/// Panics if `matrix.nrows() != essential.nrows() + 1`.
#[track_caller]
pub fn apply_householder_on_the_left<T: ComplexField>(
    matrix: MatMut<'_, T>,
    essential: ColRef<'_, T>,
    householder_coeff: T,
    conj_householder: Conj,
    stack: DynStack<'_>,
) {
    fancy_assert!(matrix.nrows() == 1 + essential.nrows());
    let m = matrix.nrows();
    let n = matrix.ncols();
    let tau = match conj_householder {
        Conj::Yes => householder_coeff.conj(),
        Conj::No => householder_coeff,
    };

    if m == 1 {
        let factor = T::one() - tau;
        matrix.cwise().for_each(|e| *e = *e * factor);
    } else {
        let (first_row, last_rows) = matrix.split_at_row(1);
        let mut first_row = first_row.row(0);
        let mut last_rows = last_rows;

        let (tmp, _) = temp_mat_zeroed::<T>(1, n, stack);
        let mut tmp = tmp;

        // tmp = vᴴ M
        tmp.rb_mut()
            .row(0)
            .cwise()
            .zip(first_row.rb())
            .for_each(|a, b| *a = *b);
        matmul_with_conj(
            tmp.rb_mut(),
            essential.transpose().as_2d(),
            Conj::Yes,
            last_rows.rb(),
            Conj::No,
            Some(T::one()),
            T::one(),
            Parallelism::None,
        );

        // M -= tau·v·tmp
        first_row
            .rb_mut()
            .cwise()
            .zip(tmp.rb().row(0))
            .for_each(|a, b| *a = *a - tau * *b);
        matmul_with_conj(
            last_rows,
            essential.as_2d(),
            Conj::No,
            tmp.rb(),
            Conj::No,
            Some(T::one()),
            -tau,
            Parallelism::None,
        );
    }
}

/// Builds the upper triangular factor `T` of a panel of reflectors, such that
/// `H(0)·H(1)·…·H(size−1) == I − V·T·Vᴴ`, where `V` is the unit lower
/// trapezoidal matrix of reflectors stored in `basis` and the diagonal of `T`
/// is `tau`.
///
/// The construction is a triangular recurrence: row `i` of `T` is derived
/// from reflector `i` combined with the already-built trailing block of `T`.
///
/// # Panics
///
/// - Panics if `t_factor` is not square with dimension `basis.ncols()`.
/// - Panics if `tau` does not have `basis.ncols()` elements.
/// - Panics if `basis` has fewer rows than columns.
#[track_caller]
pub fn make_householder_factor<T: ComplexField>(
    t_factor: MatMut<'_, T>,
    basis: MatRef<'_, T>,
    tau: ColRef<'_, T>,
    stack: DynStack<'_>,
) {
    let m = basis.nrows();
    let size = basis.ncols();
    fancy_assert!(m >= size);
    fancy_assert!((t_factor.nrows(), t_factor.ncols()) == (size, size));
    fancy_assert!(tau.nrows() == size);

    let mut t_factor = t_factor;
    let mut stack = stack;

    for i in 0..size {
        *t_factor.rb_mut().get(i, i) = *tau.get(i);
    }

    for i in (0..size).rev() {
        let rs = m - i - 1;
        let rt = size - i - 1;
        if rt == 0 {
            continue;
        }

        let factor = -*t_factor.rb().get(i, i);

        let essential = basis.col(i).split_at(i + 1).1;
        let (ess_top, ess_bot) = essential.split_at(rt);
        let v_next = basis.submatrix(i + 1, i + 1, rs, rt);
        let (v_next_top, v_next_bot) = v_next.split_at_row(rt);

        // T[i, i+1..] = −tau[i]·v(i)ᴴ·V[.., i+1..]
        triangular::matmul(
            t_factor.rb_mut().submatrix(i, i + 1, 1, rt),
            BlockStructure::Rectangular,
            ess_top.transpose().as_2d(),
            BlockStructure::Rectangular,
            Conj::Yes,
            v_next_top,
            BlockStructure::UnitTriangularLower,
            Conj::No,
            None,
            factor,
            Parallelism::None,
        );
        matmul_with_conj(
            t_factor.rb_mut().submatrix(i, i + 1, 1, rt),
            ess_bot.transpose().as_2d(),
            Conj::Yes,
            v_next_bot,
            Conj::No,
            Some(T::one()),
            factor,
            Parallelism::None,
        );

        // T[i, i+1..] ← T[i, i+1..]·T[i+1.., i+1..]
        let (tmp, _) = temp_mat_zeroed::<T>(rt, 1, stack.rb_mut());
        let mut tmp = tmp;
        triangular::matmul(
            tmp.rb_mut().transpose(),
            BlockStructure::Rectangular,
            t_factor.rb().submatrix(i, i + 1, 1, rt),
            BlockStructure::Rectangular,
            Conj::No,
            t_factor.rb().submatrix(i + 1, i + 1, rt, rt),
            BlockStructure::TriangularUpper,
            Conj::No,
            None,
            T::one(),
            Parallelism::None,
        );
        t_factor
            .rb_mut()
            .submatrix(i, i + 1, 1, rt)
            .row(0)
            .cwise()
            .zip(tmp.rb().transpose().row(0))
            .for_each(|a, b| *a = *b);
    }
}

/// Applies the block reflector `I − V·T·Vᴴ` (when `conj_t` is [`Conj::No`]),
/// or its adjoint `I − V·Tᴴ·Vᴴ` (when `conj_t` is [`Conj::Yes`]), to the
/// given matrix from the left, in place.
///
/// `basis` holds the unit lower trapezoidal reflector matrix `V` as stored in
/// the factored panel; `t_factor` is the upper triangular factor built by
/// [`make_householder_factor`].
///
/// # Panics
///
/// - Panics if `matrix.nrows() != basis.nrows()`.
/// - Panics if `t_factor` is not square with dimension `basis.ncols()`.
/// - Panics if the provided workspace is too small to carve two
///   `basis.ncols()×matrix.ncols()` temporaries out of.
#[track_caller]
pub fn apply_block_householder_on_the_left<T: ComplexField>(
    matrix: MatMut<'_, T>,
    basis: MatRef<'_, T>,
    t_factor: MatRef<'_, T>,
    conj_t: Conj,
    parallelism: Parallelism,
    stack: DynStack<'_>,
) {
    fancy_assert!(matrix.nrows() == basis.nrows());
    let size = basis.ncols();
    fancy_assert!(basis.nrows() >= size);
    fancy_assert!((t_factor.nrows(), t_factor.ncols()) == (size, size));

    let m = matrix.nrows();
    let n = matrix.ncols();
    let mut matrix = matrix;

    let (basis_tri, basis_bot) = basis.split_at_row(size);

    let (tmp0, stack) = temp_mat_zeroed::<T>(size, n, stack);
    let (tmp1, _) = temp_mat_zeroed::<T>(size, n, stack);
    let mut tmp0 = tmp0;
    let mut tmp1 = tmp1;

    // tmp0 = Vᴴ·M
    triangular::matmul(
        tmp0.rb_mut(),
        BlockStructure::Rectangular,
        basis_tri.transpose(),
        BlockStructure::UnitTriangularUpper,
        Conj::Yes,
        matrix.rb().submatrix(0, 0, size, n),
        BlockStructure::Rectangular,
        Conj::No,
        None,
        T::one(),
        parallelism,
    );
    matmul_with_conj(
        tmp0.rb_mut(),
        basis_bot.transpose(),
        Conj::Yes,
        matrix.rb().submatrix(size, 0, m - size, n),
        Conj::No,
        Some(T::one()),
        T::one(),
        parallelism,
    );

    // tmp1 = op(T)·tmp0
    match conj_t {
        Conj::No => triangular::matmul(
            tmp1.rb_mut(),
            BlockStructure::Rectangular,
            t_factor,
            BlockStructure::TriangularUpper,
            Conj::No,
            tmp0.rb(),
            BlockStructure::Rectangular,
            Conj::No,
            None,
            T::one(),
            parallelism,
        ),
        Conj::Yes => triangular::matmul(
            tmp1.rb_mut(),
            BlockStructure::Rectangular,
            t_factor.transpose(),
            BlockStructure::TriangularLower,
            Conj::Yes,
            tmp0.rb(),
            BlockStructure::Rectangular,
            Conj::No,
            None,
            T::one(),
            parallelism,
        ),
    }

    // M -= V·tmp1
    let (matrix_top, matrix_bot) = matrix.split_at_row(size);
    triangular::matmul(
        matrix_top,
        BlockStructure::Rectangular,
        basis_tri,
        BlockStructure::UnitTriangularLower,
        Conj::No,
        tmp1.rb(),
        BlockStructure::Rectangular,
        Conj::No,
        Some(T::one()),
        -T::one(),
        parallelism,
    );
    matmul_with_conj(
        matrix_bot,
        basis_bot,
        Conj::No,
        tmp1.rb(),
        Conj::No,
        Some(T::one()),
        -T::one(),
        parallelism,
    );
}
