use assert2::assert as fancy_assert;
use faktor_core::{
    mul::triangular::{self, BlockStructure},
    ComplexField, Conj, MatMut, MatRef, Parallelism, Uplo,
};

/// Reconstructs the factored matrix from its Cholesky factor, storing
/// `L·Lᴴ` (lower) or `Uᴴ·U` (upper) into the corresponding half of `dst`.
/// The other half of `dst` is left untouched.
///
/// # Panics
///
/// Panics if `dst` and `cholesky_factor` are not square matrices of the same
/// dimension.
#[track_caller]
pub fn reconstruct<T: ComplexField>(
    uplo: Uplo,
    dst: MatMut<'_, T>,
    cholesky_factor: MatRef<'_, T>,
    parallelism: Parallelism,
) {
    let n = cholesky_factor.nrows();
    fancy_assert!(cholesky_factor.ncols() == n);
    fancy_assert!((dst.nrows(), dst.ncols()) == (n, n));

    match uplo {
        Uplo::Lower => triangular::matmul(
            dst,
            BlockStructure::TriangularLower,
            cholesky_factor,
            BlockStructure::TriangularLower,
            Conj::No,
            cholesky_factor.transpose(),
            BlockStructure::TriangularUpper,
            Conj::Yes,
            None,
            T::one(),
            parallelism,
        ),
        Uplo::Upper => triangular::matmul(
            dst,
            BlockStructure::TriangularUpper,
            cholesky_factor.transpose(),
            BlockStructure::TriangularLower,
            Conj::Yes,
            cholesky_factor,
            BlockStructure::TriangularUpper,
            Conj::No,
            None,
            T::one(),
            parallelism,
        ),
    }
}
