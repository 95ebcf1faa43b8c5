use assert2::assert as fancy_assert;
use dyn_stack::{DynStack, SizeOverflow, StackReq};
use faktor_core::{
    mul::{
        matmul_with_conj,
        triangular::{self, BlockStructure},
    },
    solve::solve_lower_triangular_in_place,
    ComplexField, Conj, MatMut, Parallelism, Uplo,
};
use reborrow::*;

/// Error signaling that the input matrix is not positive definite.
///
/// The matrix is left partially factored: every step before the failing one
/// holds valid factor entries.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CholeskyError {
    /// 1-based index of the step whose diagonal pivot was not positive.
    pub index: usize,
}

/// Algorithmic strategy used by [`cholesky_in_place`].
///
/// Every variant computes the same factorization and detects
/// non-positive-definite inputs at the same step; they only differ in the
/// order in which the updates are applied.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CholeskyVariant {
    /// Blocked left-looking loop: each diagonal block absorbs the updates
    /// from all previously factored panels just before it is factored.
    Blocked,
    /// Blocked right-looking loop: each factored panel immediately updates
    /// the entire remaining trailing matrix.
    RightLooking,
    /// Divide and conquer: splits at half the dimension, factors the leading
    /// block, propagates through a triangular solve and a rank-k update, and
    /// recurses on the trailing block. The block size option is ignored.
    Recursive,
    /// Pure unblocked level-2 algorithm, one column (or row) per step. The
    /// block size option is ignored, and no workspace is used.
    Level2,
}

/// Options for [`cholesky_in_place`].
#[derive(Copy, Clone, Debug)]
pub struct CholeskyParams {
    /// Strategy to dispatch to.
    pub variant: CholeskyVariant,
    /// Panel width for the blocked variants.
    pub blocksize: usize,
}

impl Default for CholeskyParams {
    #[inline]
    fn default() -> Self {
        Self {
            variant: CholeskyVariant::Blocked,
            blocksize: 32,
        }
    }
}

/// Unblocked kernel, also used by the blocked variants to factor diagonal
/// blocks. The reported failure index is relative to the given block.
fn cholesky_in_place_level2<T: ComplexField>(
    uplo: Uplo,
    matrix: MatMut<'_, T>,
) -> Result<(), CholeskyError> {
    let mut matrix = matrix;
    let n = matrix.nrows();

    for j in 0..n {
        let mut diag = unsafe { *matrix.rb().get_unchecked(j, j) }.real();
        for l in 0..j {
            let e = match uplo {
                Uplo::Lower => unsafe { *matrix.rb().get_unchecked(j, l) },
                Uplo::Upper => unsafe { *matrix.rb().get_unchecked(l, j) },
            };
            diag = diag - (e * e.conj()).real();
        }

        if !(diag > T::Real::zero()) {
            return Err(CholeskyError { index: j + 1 });
        }
        let diag_sqrt = diag.sqrt();
        unsafe { *matrix.rb_mut().get_unchecked(j, j) = T::from_real(diag_sqrt) };
        let inv = T::from_real(diag_sqrt.inv());

        match uplo {
            Uplo::Lower => {
                for i in j + 1..n {
                    let mut acc = unsafe { *matrix.rb().get_unchecked(i, j) };
                    for l in 0..j {
                        let a = unsafe { *matrix.rb().get_unchecked(i, l) };
                        let b = unsafe { *matrix.rb().get_unchecked(j, l) };
                        acc = acc - a * b.conj();
                    }
                    unsafe { *matrix.rb_mut().get_unchecked(i, j) = acc * inv };
                }
            }
            Uplo::Upper => {
                for i in j + 1..n {
                    let mut acc = unsafe { *matrix.rb().get_unchecked(j, i) };
                    for l in 0..j {
                        let a = unsafe { *matrix.rb().get_unchecked(l, j) };
                        let b = unsafe { *matrix.rb().get_unchecked(l, i) };
                        acc = acc - a.conj() * b;
                    }
                    unsafe { *matrix.rb_mut().get_unchecked(j, i) = acc * inv };
                }
            }
        }
    }

    Ok(())
}

fn cholesky_in_place_left_looking<T: ComplexField>(
    uplo: Uplo,
    matrix: MatMut<'_, T>,
    blocksize: usize,
    parallelism: Parallelism,
) -> Result<(), CholeskyError> {
    let mut matrix = matrix;
    let n = matrix.nrows();

    let mut idx = 0;
    while idx < n {
        let bs = blocksize.min(n - idx);

        match uplo {
            Uplo::Lower => {
                let (_, _, below_left, bottom_right) = matrix.rb_mut().split_at(idx, idx);
                let (l10, l20) = below_left.into_const().split_at_row(bs);
                let (mut a11, _, mut a21, _) = bottom_right.split_at(bs, bs);

                // A11 -= L10·L10ᴴ
                triangular::matmul(
                    a11.rb_mut(),
                    BlockStructure::TriangularLower,
                    l10,
                    BlockStructure::Rectangular,
                    Conj::No,
                    l10.transpose(),
                    BlockStructure::Rectangular,
                    Conj::Yes,
                    Some(T::one()),
                    -T::one(),
                    parallelism,
                );

                cholesky_in_place_level2(uplo, a11.rb_mut())
                    .map_err(|e| CholeskyError { index: idx + e.index })?;

                if idx + bs < n {
                    // A21 -= L20·L10ᴴ, then L21 = A21·L11⁻ᴴ
                    matmul_with_conj(
                        a21.rb_mut(),
                        l20,
                        Conj::No,
                        l10.transpose(),
                        Conj::Yes,
                        Some(T::one()),
                        -T::one(),
                        parallelism,
                    );
                    solve_lower_triangular_in_place(
                        a11.rb(),
                        Conj::Yes,
                        a21.rb_mut().transpose(),
                        parallelism,
                    );
                }
            }
            Uplo::Upper => {
                let (_, above_right, _, bottom_right) = matrix.rb_mut().split_at(idx, idx);
                let (u01, u02) = above_right.into_const().split_at_col(bs);
                let (mut a11, mut a12, _, _) = bottom_right.split_at(bs, bs);

                // A11 -= U01ᴴ·U01
                triangular::matmul(
                    a11.rb_mut(),
                    BlockStructure::TriangularUpper,
                    u01.transpose(),
                    BlockStructure::Rectangular,
                    Conj::Yes,
                    u01,
                    BlockStructure::Rectangular,
                    Conj::No,
                    Some(T::one()),
                    -T::one(),
                    parallelism,
                );

                cholesky_in_place_level2(uplo, a11.rb_mut())
                    .map_err(|e| CholeskyError { index: idx + e.index })?;

                if idx + bs < n {
                    // A12 -= U01ᴴ·U02, then U12 = U11⁻ᴴ·A12
                    matmul_with_conj(
                        a12.rb_mut(),
                        u01.transpose(),
                        Conj::Yes,
                        u02,
                        Conj::No,
                        Some(T::one()),
                        -T::one(),
                        parallelism,
                    );
                    solve_lower_triangular_in_place(
                        a11.rb().transpose(),
                        Conj::Yes,
                        a12.rb_mut(),
                        parallelism,
                    );
                }
            }
        }

        idx += bs;
    }

    Ok(())
}

fn cholesky_in_place_right_looking<T: ComplexField>(
    uplo: Uplo,
    matrix: MatMut<'_, T>,
    blocksize: usize,
    parallelism: Parallelism,
) -> Result<(), CholeskyError> {
    let mut matrix = matrix;
    let n = matrix.nrows();

    let mut idx = 0;
    while idx < n {
        let bs = blocksize.min(n - idx);

        let (_, _, _, bottom_right) = matrix.rb_mut().split_at(idx, idx);
        let (mut a11, mut a12, mut a21, mut a22) = bottom_right.split_at(bs, bs);

        cholesky_in_place_level2(uplo, a11.rb_mut())
            .map_err(|e| CholeskyError { index: idx + e.index })?;

        if idx + bs < n {
            match uplo {
                Uplo::Lower => {
                    // L21 = A21·L11⁻ᴴ, then A22 -= L21·L21ᴴ over the whole
                    // trailing matrix
                    solve_lower_triangular_in_place(
                        a11.rb(),
                        Conj::Yes,
                        a21.rb_mut().transpose(),
                        parallelism,
                    );
                    triangular::matmul(
                        a22.rb_mut(),
                        BlockStructure::TriangularLower,
                        a21.rb(),
                        BlockStructure::Rectangular,
                        Conj::No,
                        a21.rb().transpose(),
                        BlockStructure::Rectangular,
                        Conj::Yes,
                        Some(T::one()),
                        -T::one(),
                        parallelism,
                    );
                }
                Uplo::Upper => {
                    // U12 = U11⁻ᴴ·A12, then A22 -= U12ᴴ·U12 over the whole
                    // trailing matrix
                    solve_lower_triangular_in_place(
                        a11.rb().transpose(),
                        Conj::Yes,
                        a12.rb_mut(),
                        parallelism,
                    );
                    triangular::matmul(
                        a22.rb_mut(),
                        BlockStructure::TriangularUpper,
                        a12.rb().transpose(),
                        BlockStructure::Rectangular,
                        Conj::Yes,
                        a12.rb(),
                        BlockStructure::Rectangular,
                        Conj::No,
                        Some(T::one()),
                        -T::one(),
                        parallelism,
                    );
                }
            }
        }

        idx += bs;
    }

    Ok(())
}

fn recursion_threshold() -> usize {
    16
}

fn cholesky_in_place_recursive<T: ComplexField>(
    uplo: Uplo,
    matrix: MatMut<'_, T>,
    parallelism: Parallelism,
) -> Result<(), CholeskyError> {
    let mut matrix = matrix;
    let n = matrix.nrows();

    if n <= recursion_threshold() {
        return cholesky_in_place_level2(uplo, matrix);
    }

    let bs = n / 2;
    let (mut a00, mut a01, mut a10, mut a11) = matrix.rb_mut().split_at(bs, bs);

    // the three updates are ordered by a true data dependency: the leading
    // factor feeds the triangular solve, whose output feeds the rank-k update
    cholesky_in_place_recursive(uplo, a00.rb_mut(), parallelism)?;

    match uplo {
        Uplo::Lower => {
            solve_lower_triangular_in_place(
                a00.rb(),
                Conj::Yes,
                a10.rb_mut().transpose(),
                parallelism,
            );
            triangular::matmul(
                a11.rb_mut(),
                BlockStructure::TriangularLower,
                a10.rb(),
                BlockStructure::Rectangular,
                Conj::No,
                a10.rb().transpose(),
                BlockStructure::Rectangular,
                Conj::Yes,
                Some(T::one()),
                -T::one(),
                parallelism,
            );
        }
        Uplo::Upper => {
            solve_lower_triangular_in_place(
                a00.rb().transpose(),
                Conj::Yes,
                a01.rb_mut(),
                parallelism,
            );
            triangular::matmul(
                a11.rb_mut(),
                BlockStructure::TriangularUpper,
                a01.rb().transpose(),
                BlockStructure::Rectangular,
                Conj::Yes,
                a01.rb(),
                BlockStructure::Rectangular,
                Conj::No,
                Some(T::one()),
                -T::one(),
                parallelism,
            );
        }
    }

    cholesky_in_place_recursive(uplo, a11, parallelism)
        .map_err(|e| CholeskyError { index: bs + e.index })
}

/// Computes the workspace requirement of [`cholesky_in_place`], without
/// allocating.
///
/// Every variant performs its updates in place, so the requirement is
/// currently empty; it is kept as part of the workspace protocol shared by
/// the factorization drivers, and grows monotonically should a variant start
/// carving scratch storage.
pub fn cholesky_in_place_req<T: 'static>(
    dim: usize,
    parallelism: Parallelism,
    params: CholeskyParams,
) -> Result<StackReq, SizeOverflow> {
    let _ = (dim, parallelism, params);
    Ok(StackReq::default())
}

/// Computes the Cholesky factorization of `matrix` in place, reading and
/// writing only the half selected by `uplo`: the factor `L` with
/// `A = L·Lᴴ` for [`Uplo::Lower`], or `U` with `A = Uᴴ·U` for
/// [`Uplo::Upper`]. The other half is never accessed.
///
/// The strategy is selected by `params.variant`; every variant produces the
/// same factor up to rounding and reports a non-positive-definite input
/// through [`CholeskyError`] at the same 1-based step, leaving the matrix
/// partially factored.
///
/// The `stack` parameter participates in the shared workspace protocol and
/// may be empty (see [`cholesky_in_place_req`]).
///
/// # Panics
///
/// - Panics if the matrix is not square.
/// - Panics if `params.blocksize` is zero.
#[track_caller]
pub fn cholesky_in_place<T: ComplexField>(
    uplo: Uplo,
    matrix: MatMut<'_, T>,
    parallelism: Parallelism,
    stack: DynStack<'_>,
    params: CholeskyParams,
) -> Result<(), CholeskyError> {
    fancy_assert!(matrix.nrows() == matrix.ncols());
    fancy_assert!(params.blocksize >= 1);

    let _ = stack;

    if matrix.nrows() == 0 {
        return Ok(());
    }

    match params.variant {
        CholeskyVariant::Blocked => {
            cholesky_in_place_left_looking(uplo, matrix, params.blocksize, parallelism)
        }
        CholeskyVariant::RightLooking => {
            cholesky_in_place_right_looking(uplo, matrix, params.blocksize, parallelism)
        }
        CholeskyVariant::Recursive => cholesky_in_place_recursive(uplo, matrix, parallelism),
        CholeskyVariant::Level2 => cholesky_in_place_level2(uplo, matrix),
    }
}
