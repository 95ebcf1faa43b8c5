//! Matrix multiplication module.
//!
//! The inner kernel for the native floating point types is delegated to the
//! `gemm` crate. Structured products (triangular operands, triangular
//! destinations) are decomposed recursively into rectangular blocks so that
//! the bulk of the work still goes through the rectangular kernel.

use crate::{join_raw, ComplexField, Conj, MatMut, MatRef, Parallelism};
use assert2::assert as fancy_assert;
use core::any::TypeId;
use core::mem::transmute_copy;
use reborrow::*;

#[inline]
fn gemm_parallelism(parallelism: Parallelism) -> gemm::Parallelism {
    match parallelism {
        Parallelism::None => gemm::Parallelism::None,
        Parallelism::Rayon(0) => gemm::Parallelism::Rayon(rayon::current_num_threads()),
        Parallelism::Rayon(n_threads) => gemm::Parallelism::Rayon(n_threads),
    }
}

macro_rules! gemm_call {
    ($ty: ty, $dst: expr, $lhs: expr, $conj_lhs: expr, $rhs: expr, $conj_rhs: expr, $alpha: expr, $beta: expr, $parallelism: expr $(,)?) => {{
        let mut dst: MatMut<'_, $ty> = transmute_copy(&$dst);
        let lhs: MatRef<'_, $ty> = transmute_copy(&$lhs);
        let rhs: MatRef<'_, $ty> = transmute_copy(&$rhs);
        let alpha: Option<$ty> = transmute_copy(&$alpha);
        let beta: $ty = transmute_copy(&$beta);

        gemm::gemm(
            dst.nrows(),
            dst.ncols(),
            lhs.ncols(),
            dst.rb_mut().as_ptr(),
            dst.col_stride(),
            dst.row_stride(),
            alpha.is_some(),
            lhs.as_ptr(),
            lhs.col_stride(),
            lhs.row_stride(),
            rhs.as_ptr(),
            rhs.col_stride(),
            rhs.row_stride(),
            alpha.unwrap_or(<$ty as ComplexField>::zero()),
            beta,
            false,
            $conj_lhs == Conj::Yes,
            $conj_rhs == Conj::Yes,
            gemm_parallelism($parallelism),
        );
    }};
}

/// Dispatches to the `gemm` crate when `T` is one of the native types.
/// Returns `false` when the caller must fall back to the generic kernel.
unsafe fn gemm_dispatch<T: ComplexField>(
    dst: MatMut<'_, T>,
    lhs: MatRef<'_, T>,
    conj_lhs: Conj,
    rhs: MatRef<'_, T>,
    conj_rhs: Conj,
    alpha: Option<T>,
    beta: T,
    parallelism: Parallelism,
) -> bool {
    if TypeId::of::<T>() == TypeId::of::<f32>() {
        gemm_call!(f32, dst, lhs, conj_lhs, rhs, conj_rhs, alpha, beta, parallelism);
        return true;
    }
    if TypeId::of::<T>() == TypeId::of::<f64>() {
        gemm_call!(f64, dst, lhs, conj_lhs, rhs, conj_rhs, alpha, beta, parallelism);
        return true;
    }
    if TypeId::of::<T>() == TypeId::of::<crate::c32>() {
        gemm_call!(crate::c32, dst, lhs, conj_lhs, rhs, conj_rhs, alpha, beta, parallelism);
        return true;
    }
    if TypeId::of::<T>() == TypeId::of::<crate::c64>() {
        gemm_call!(crate::c64, dst, lhs, conj_lhs, rhs, conj_rhs, alpha, beta, parallelism);
        return true;
    }
    false
}

fn matmul_fallback<T: ComplexField>(
    mut dst: MatMut<'_, T>,
    lhs: MatRef<'_, T>,
    conj_lhs: Conj,
    rhs: MatRef<'_, T>,
    conj_rhs: Conj,
    alpha: Option<T>,
    beta: T,
) {
    let m = dst.nrows();
    let n = dst.ncols();
    let k = lhs.ncols();

    for j in 0..n {
        for i in 0..m {
            let mut acc = T::zero();
            for depth in 0..k {
                let a = unsafe { *lhs.get_unchecked(i, depth) };
                let a = match conj_lhs {
                    Conj::Yes => a.conj(),
                    Conj::No => a,
                };
                let b = unsafe { *rhs.get_unchecked(depth, j) };
                let b = match conj_rhs {
                    Conj::Yes => b.conj(),
                    Conj::No => b,
                };
                acc = acc + a * b;
            }
            let dst_ij = unsafe { dst.rb_mut().get_unchecked(i, j) };
            *dst_ij = match alpha {
                Some(alpha) => alpha * *dst_ij + beta * acc,
                None => beta * acc,
            };
        }
    }
}

/// Computes the matrix product `[alpha * dst] + beta * op(lhs) * op(rhs)` and
/// stores the result in `dst`, where `op` conjugates its operand when the
/// corresponding [`Conj`] flag is `Yes`.
///
/// If `alpha` is `None` the preexisting values in `dst` are not read.
///
/// # Panics
///
/// Panics if the matrix dimensions are not compatible for matrix
/// multiplication, i.e.
///  - `dst.nrows() == lhs.nrows()`
///  - `dst.ncols() == rhs.ncols()`
///  - `lhs.ncols() == rhs.nrows()`
#[track_caller]
pub fn matmul_with_conj<T: ComplexField>(
    dst: MatMut<'_, T>,
    lhs: MatRef<'_, T>,
    conj_lhs: Conj,
    rhs: MatRef<'_, T>,
    conj_rhs: Conj,
    alpha: Option<T>,
    beta: T,
    parallelism: Parallelism,
) {
    fancy_assert!(dst.nrows() == lhs.nrows());
    fancy_assert!(dst.ncols() == rhs.ncols());
    fancy_assert!(lhs.ncols() == rhs.nrows());

    let mut dst = dst;
    if dst.nrows() == 0 || dst.ncols() == 0 {
        return;
    }
    if lhs.ncols() == 0 {
        match alpha {
            Some(alpha) => dst.cwise().for_each(|x| *x = alpha * *x),
            None => dst.cwise().for_each(|x| *x = T::zero()),
        }
        return;
    }

    if unsafe {
        gemm_dispatch(
            dst.rb_mut(),
            lhs,
            conj_lhs,
            rhs,
            conj_rhs,
            alpha,
            beta,
            parallelism,
        )
    } {
        return;
    }
    matmul_fallback(dst, lhs, conj_lhs, rhs, conj_rhs, alpha, beta);
}

/// Computes the matrix product `[alpha * dst] + beta * lhs * rhs` and stores
/// the result in `dst`.
///
/// If `alpha` is `None` the preexisting values in `dst` are not read.
///
/// # Panics
///
/// See [`matmul_with_conj`].
#[track_caller]
#[inline]
pub fn matmul<T: ComplexField>(
    dst: MatMut<'_, T>,
    lhs: MatRef<'_, T>,
    rhs: MatRef<'_, T>,
    alpha: Option<T>,
    beta: T,
    parallelism: Parallelism,
) {
    matmul_with_conj(dst, lhs, Conj::No, rhs, Conj::No, alpha, beta, parallelism);
}

/// Structured matrix multiplication.
pub mod triangular {
    use super::*;

    /// Size below which structured products are computed by the scalar kernel
    /// instead of being decomposed further.
    const BASE_DIM: usize = 16;

    /// Describes the shape of the relevant part of a matrix operand.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub enum BlockStructure {
        /// A dense rectangular block.
        Rectangular,
        /// A lower triangular block, including the diagonal.
        TriangularLower,
        /// A lower triangular block, excluding the diagonal.
        StrictTriangularLower,
        /// A lower triangular block, with an implicit unit diagonal.
        UnitTriangularLower,
        /// An upper triangular block, including the diagonal.
        TriangularUpper,
        /// An upper triangular block, excluding the diagonal.
        StrictTriangularUpper,
        /// An upper triangular block, with an implicit unit diagonal.
        UnitTriangularUpper,
    }

    impl BlockStructure {
        /// Returns `true` if the block is dense.
        #[inline]
        pub fn is_dense(self) -> bool {
            matches!(self, BlockStructure::Rectangular)
        }

        /// Returns `true` if the block is lower triangular (in any variant).
        #[inline]
        pub fn is_lower(self) -> bool {
            matches!(
                self,
                BlockStructure::TriangularLower
                    | BlockStructure::StrictTriangularLower
                    | BlockStructure::UnitTriangularLower
            )
        }

        /// Returns `true` if the block is upper triangular (in any variant).
        #[inline]
        pub fn is_upper(self) -> bool {
            matches!(
                self,
                BlockStructure::TriangularUpper
                    | BlockStructure::StrictTriangularUpper
                    | BlockStructure::UnitTriangularUpper
            )
        }

        /// Returns the structure of the transposed block.
        #[inline]
        pub fn transpose(self) -> Self {
            use BlockStructure::*;
            match self {
                Rectangular => Rectangular,
                TriangularLower => TriangularUpper,
                StrictTriangularLower => StrictTriangularUpper,
                UnitTriangularLower => UnitTriangularUpper,
                TriangularUpper => TriangularLower,
                StrictTriangularUpper => StrictTriangularLower,
                UnitTriangularUpper => UnitTriangularLower,
            }
        }
    }

    /// Structure of the (`di`, `dj`) quadrant after splitting a structured
    /// block at its diagonal. `None` stands for an implicitly zero quadrant.
    #[inline]
    fn sub_structure(bs: BlockStructure, di: usize, dj: usize) -> Option<BlockStructure> {
        use BlockStructure::*;
        if bs.is_dense() {
            return Some(Rectangular);
        }
        match (di, dj) {
            (0, 0) | (1, 1) => Some(bs),
            (1, 0) => {
                if bs.is_lower() {
                    Some(Rectangular)
                } else {
                    None
                }
            }
            (0, 1) => {
                if bs.is_upper() {
                    Some(Rectangular)
                } else {
                    None
                }
            }
            _ => unreachable!(),
        }
    }

    #[inline]
    fn is_stored(bs: BlockStructure, i: usize, j: usize) -> bool {
        use BlockStructure::*;
        match bs {
            Rectangular => true,
            TriangularLower => i >= j,
            StrictTriangularLower | UnitTriangularLower => i > j,
            TriangularUpper => i <= j,
            StrictTriangularUpper | UnitTriangularUpper => i < j,
        }
    }

    #[inline]
    unsafe fn read_structured<T: ComplexField>(
        mat: MatRef<'_, T>,
        bs: BlockStructure,
        conj: Conj,
        i: usize,
        j: usize,
    ) -> T {
        use BlockStructure::*;
        if is_stored(bs, i, j) {
            let e = *mat.get_unchecked(i, j);
            match conj {
                Conj::Yes => e.conj(),
                Conj::No => e,
            }
        } else if matches!(bs, UnitTriangularLower | UnitTriangularUpper) && i == j {
            T::one()
        } else {
            T::zero()
        }
    }

    fn matmul_scalar<T: ComplexField>(
        mut dst: MatMut<'_, T>,
        dst_structure: BlockStructure,
        lhs: MatRef<'_, T>,
        lhs_structure: BlockStructure,
        conj_lhs: Conj,
        rhs: MatRef<'_, T>,
        rhs_structure: BlockStructure,
        conj_rhs: Conj,
        alpha: Option<T>,
        beta: T,
    ) {
        let m = dst.nrows();
        let n = dst.ncols();
        let k = lhs.ncols();

        for j in 0..n {
            for i in 0..m {
                if !is_stored(dst_structure, i, j) {
                    continue;
                }
                let mut acc = T::zero();
                for depth in 0..k {
                    let a = unsafe { read_structured(lhs, lhs_structure, conj_lhs, i, depth) };
                    let b = unsafe { read_structured(rhs, rhs_structure, conj_rhs, depth, j) };
                    acc = acc + a * b;
                }
                let dst_ij = unsafe { dst.rb_mut().get_unchecked(i, j) };
                *dst_ij = match alpha {
                    Some(alpha) => alpha * *dst_ij + beta * acc,
                    None => beta * acc,
                };
            }
        }
    }

    /// Writes `dst ← alpha·dst` over the stored part of `dst`, used for
    /// destination quadrants whose product contribution is implicitly zero.
    fn scale_structured<T: ComplexField>(
        mut dst: MatMut<'_, T>,
        dst_structure: BlockStructure,
        alpha: Option<T>,
    ) {
        let m = dst.nrows();
        let n = dst.ncols();
        for j in 0..n {
            for i in 0..m {
                if !is_stored(dst_structure, i, j) {
                    continue;
                }
                let dst_ij = unsafe { dst.rb_mut().get_unchecked(i, j) };
                *dst_ij = match alpha {
                    Some(alpha) => alpha * *dst_ij,
                    None => T::zero(),
                };
            }
        }
    }

    type Term<'s, T> = Option<(MatRef<'s, T>, BlockStructure, MatRef<'s, T>, BlockStructure)>;

    #[inline]
    fn make_term<'s, T>(
        lhs_structure: BlockStructure,
        rhs_structure: BlockStructure,
        lhs_block: MatRef<'s, T>,
        i: usize,
        l: usize,
        rhs_block: MatRef<'s, T>,
        j: usize,
    ) -> Term<'s, T> {
        match (
            sub_structure(lhs_structure, i, l),
            sub_structure(rhs_structure, l, j),
        ) {
            (Some(a), Some(b)) => Some((lhs_block, a, rhs_block, b)),
            _ => None,
        }
    }

    fn quadrant<T: ComplexField>(
        mut dst: MatMut<'_, T>,
        dst_structure: Option<BlockStructure>,
        terms: [Term<'_, T>; 2],
        conj_lhs: Conj,
        conj_rhs: Conj,
        alpha: Option<T>,
        beta: T,
        parallelism: Parallelism,
    ) {
        let Some(dst_structure) = dst_structure else {
            return;
        };
        if dst.nrows() == 0 || dst.ncols() == 0 {
            return;
        }

        let mut alpha = alpha;
        let mut contributed = false;
        for term in terms {
            if let Some((lhs, lhs_structure, rhs, rhs_structure)) = term {
                if lhs.ncols() > 0 {
                    matmul_impl(
                        dst.rb_mut(),
                        dst_structure,
                        lhs,
                        lhs_structure,
                        conj_lhs,
                        rhs,
                        rhs_structure,
                        conj_rhs,
                        alpha,
                        beta,
                        parallelism,
                    );
                    alpha = Some(T::one());
                    contributed = true;
                }
            }
        }
        if !contributed {
            scale_structured(dst, dst_structure, alpha);
        }
    }

    fn matmul_impl<T: ComplexField>(
        dst: MatMut<'_, T>,
        dst_structure: BlockStructure,
        lhs: MatRef<'_, T>,
        lhs_structure: BlockStructure,
        conj_lhs: Conj,
        rhs: MatRef<'_, T>,
        rhs_structure: BlockStructure,
        conj_rhs: Conj,
        alpha: Option<T>,
        beta: T,
        parallelism: Parallelism,
    ) {
        let m = dst.nrows();
        let n = dst.ncols();
        let k = lhs.ncols();

        if dst_structure.is_dense() && lhs_structure.is_dense() && rhs_structure.is_dense() {
            return matmul_with_conj(dst, lhs, conj_lhs, rhs, conj_rhs, alpha, beta, parallelism);
        }
        if m.max(n).max(k) <= BASE_DIM {
            return matmul_scalar(
                dst,
                dst_structure,
                lhs,
                lhs_structure,
                conj_lhs,
                rhs,
                rhs_structure,
                conj_rhs,
                alpha,
                beta,
            );
        }

        // triangular operands are square, so splitting every dimension at its
        // half keeps tied dimensions in agreement
        let sm = m / 2;
        let sn = n / 2;
        let sk = k / 2;

        let (d00, d01, d10, d11) = dst.split_at(sm, sn);
        let (l00, l01, l10, l11) = lhs.split_at(sm, sk);
        let (r00, r01, r10, r11) = rhs.split_at(sk, sn);

        let t00 = [
            make_term(lhs_structure, rhs_structure, l00, 0, 0, r00, 0),
            make_term(lhs_structure, rhs_structure, l01, 0, 1, r10, 0),
        ];
        let t01 = [
            make_term(lhs_structure, rhs_structure, l00, 0, 0, r01, 1),
            make_term(lhs_structure, rhs_structure, l01, 0, 1, r11, 1),
        ];
        let t10 = [
            make_term(lhs_structure, rhs_structure, l10, 1, 0, r00, 0),
            make_term(lhs_structure, rhs_structure, l11, 1, 1, r10, 0),
        ];
        let t11 = [
            make_term(lhs_structure, rhs_structure, l10, 1, 0, r01, 1),
            make_term(lhs_structure, rhs_structure, l11, 1, 1, r11, 1),
        ];

        join_raw(
            |parallelism| {
                quadrant(
                    d00,
                    sub_structure(dst_structure, 0, 0),
                    t00,
                    conj_lhs,
                    conj_rhs,
                    alpha,
                    beta,
                    parallelism,
                );
                quadrant(
                    d01,
                    sub_structure(dst_structure, 0, 1),
                    t01,
                    conj_lhs,
                    conj_rhs,
                    alpha,
                    beta,
                    parallelism,
                );
            },
            |parallelism| {
                quadrant(
                    d10,
                    sub_structure(dst_structure, 1, 0),
                    t10,
                    conj_lhs,
                    conj_rhs,
                    alpha,
                    beta,
                    parallelism,
                );
                quadrant(
                    d11,
                    sub_structure(dst_structure, 1, 1),
                    t11,
                    conj_lhs,
                    conj_rhs,
                    alpha,
                    beta,
                    parallelism,
                );
            },
            parallelism,
        );
    }

    /// Computes the matrix product `[alpha * dst] + beta * op(lhs) * op(rhs)`
    /// over the stored part of `dst`, where each operand reads only the part
    /// described by its [`BlockStructure`].
    ///
    /// Parts of the operands outside their structure are treated as zero (or
    /// as an implicit unit diagonal for the `Unit` variants) and are never
    /// accessed; parts of `dst` outside its structure are never written.
    ///
    /// # Panics
    ///
    /// Panics if the dimensions are not compatible for matrix multiplication,
    /// or if an operand with a triangular structure is not square.
    #[track_caller]
    pub fn matmul<T: ComplexField>(
        dst: MatMut<'_, T>,
        dst_structure: BlockStructure,
        lhs: MatRef<'_, T>,
        lhs_structure: BlockStructure,
        conj_lhs: Conj,
        rhs: MatRef<'_, T>,
        rhs_structure: BlockStructure,
        conj_rhs: Conj,
        alpha: Option<T>,
        beta: T,
        parallelism: Parallelism,
    ) {
        fancy_assert!(dst.nrows() == lhs.nrows());
        fancy_assert!(dst.ncols() == rhs.ncols());
        fancy_assert!(lhs.ncols() == rhs.nrows());
        if !dst_structure.is_dense() {
            fancy_assert!(dst.nrows() == dst.ncols());
        }
        if !lhs_structure.is_dense() {
            fancy_assert!(lhs.nrows() == lhs.ncols());
        }
        if !rhs_structure.is_dense() {
            fancy_assert!(rhs.nrows() == rhs.ncols());
        }

        if dst.nrows() == 0 || dst.ncols() == 0 {
            return;
        }

        matmul_impl(
            dst,
            dst_structure,
            lhs,
            lhs_structure,
            conj_lhs,
            rhs,
            rhs_structure,
            conj_rhs,
            alpha,
            beta,
            parallelism,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::triangular::BlockStructure;
    use super::*;
    use crate::Mat;
    use assert_approx_eq::assert_approx_eq;
    use rand::prelude::*;
    use std::cell::RefCell;

    thread_local! {
        static RNG: RefCell<StdRng> = RefCell::new(StdRng::seed_from_u64(0));
    }

    fn random_value() -> f64 {
        RNG.with(|rng| rng.borrow_mut().gen())
    }

    fn matmul_reference(
        dst: &mut Mat<f64>,
        lhs: &Mat<f64>,
        rhs: &Mat<f64>,
        alpha: Option<f64>,
        beta: f64,
    ) {
        let m = dst.nrows();
        let n = dst.ncols();
        let k = lhs.ncols();
        for i in 0..m {
            for j in 0..n {
                let mut acc = 0.0;
                for depth in 0..k {
                    acc += lhs[(i, depth)] * rhs[(depth, j)];
                }
                dst[(i, j)] = alpha.unwrap_or(0.0) * dst[(i, j)] + beta * acc;
            }
        }
    }

    #[test]
    fn test_matmul() {
        for (m, n, k) in [(1, 1, 1), (4, 3, 2), (17, 8, 23), (40, 40, 40)] {
            let lhs = Mat::from_fn(m, k, |_, _| random_value());
            let rhs = Mat::from_fn(k, n, |_, _| random_value());
            let mut dst = Mat::from_fn(m, n, |_, _| random_value());
            let mut expected = dst.clone();

            matmul(
                dst.as_mut(),
                lhs.as_ref(),
                rhs.as_ref(),
                Some(0.5),
                2.0,
                Parallelism::None,
            );
            matmul_reference(&mut expected, &lhs, &rhs, Some(0.5), 2.0);

            for i in 0..m {
                for j in 0..n {
                    assert_approx_eq!(dst[(i, j)], expected[(i, j)]);
                }
            }
        }
    }

    #[test]
    fn test_matmul_zero_inner_dim() {
        let lhs = Mat::zeros(3, 0);
        let rhs = Mat::zeros(0, 2);
        let mut dst = Mat::from_fn(3, 2, |_, _| random_value());

        matmul(
            dst.as_mut(),
            lhs.as_ref(),
            rhs.as_ref(),
            None,
            1.0,
            Parallelism::None,
        );
        for i in 0..3 {
            for j in 0..2 {
                assert_eq!(dst[(i, j)], 0.0);
            }
        }
    }

    #[test]
    fn test_triangular_operand() {
        for n in [3, 16, 35, 64] {
            let tri = Mat::from_fn(n, n, |_, _| random_value());
            let rhs = Mat::from_fn(n, n, |_, _| random_value());
            let mut dst = Mat::zeros(n, n);

            triangular::matmul(
                dst.as_mut(),
                BlockStructure::Rectangular,
                tri.as_ref(),
                BlockStructure::UnitTriangularLower,
                Conj::No,
                rhs.as_ref(),
                BlockStructure::Rectangular,
                Conj::No,
                None,
                1.0,
                Parallelism::None,
            );

            let masked = Mat::from_fn(n, n, |i, j| {
                if i > j {
                    tri[(i, j)]
                } else if i == j {
                    1.0
                } else {
                    0.0
                }
            });
            let mut expected = Mat::zeros(n, n);
            matmul_reference(&mut expected, &masked, &rhs, None, 1.0);

            for i in 0..n {
                for j in 0..n {
                    assert_approx_eq!(dst[(i, j)], expected[(i, j)]);
                }
            }
        }
    }

    #[test]
    fn test_triangular_dst() {
        for n in [4, 19, 40] {
            let lhs = Mat::from_fn(n, n, |_, _| random_value());
            let rhs = Mat::from_fn(n, n, |_, _| random_value());
            let mut dst = Mat::from_fn(n, n, |_, _| random_value());
            let dst_orig = dst.clone();

            triangular::matmul(
                dst.as_mut(),
                BlockStructure::TriangularLower,
                lhs.as_ref(),
                BlockStructure::Rectangular,
                Conj::No,
                rhs.as_ref(),
                BlockStructure::Rectangular,
                Conj::No,
                Some(1.0),
                -1.0,
                Parallelism::None,
            );

            let mut expected = dst_orig.clone();
            matmul_reference(&mut expected, &lhs, &rhs, Some(1.0), -1.0);

            for i in 0..n {
                for j in 0..n {
                    if i >= j {
                        assert_approx_eq!(dst[(i, j)], expected[(i, j)]);
                    } else {
                        assert_eq!(dst[(i, j)], dst_orig[(i, j)]);
                    }
                }
            }
        }
    }

    #[test]
    fn test_triangular_both_operands() {
        // product of a lower and an upper triangular factor, as used by the
        // factor reconstruction oracles
        for n in [5, 24, 50] {
            let l = Mat::from_fn(n, n, |_, _| random_value());
            let u = Mat::from_fn(n, n, |_, _| random_value());
            let mut dst = Mat::zeros(n, n);

            triangular::matmul(
                dst.as_mut(),
                BlockStructure::Rectangular,
                l.as_ref(),
                BlockStructure::UnitTriangularLower,
                Conj::No,
                u.as_ref(),
                BlockStructure::TriangularUpper,
                Conj::No,
                None,
                1.0,
                Parallelism::None,
            );

            let l_masked = Mat::from_fn(n, n, |i, j| {
                if i > j {
                    l[(i, j)]
                } else if i == j {
                    1.0
                } else {
                    0.0
                }
            });
            let u_masked = Mat::from_fn(n, n, |i, j| if i <= j { u[(i, j)] } else { 0.0 });
            let mut expected = Mat::zeros(n, n);
            matmul_reference(&mut expected, &l_masked, &u_masked, None, 1.0);

            for i in 0..n {
                for j in 0..n {
                    assert_approx_eq!(dst[(i, j)], expected[(i, j)]);
                }
            }
        }
    }

    #[test]
    fn test_lower_times_lower_rect_dst() {
        // the upper part of the product is implicitly zero and must be
        // written as such when alpha is None
        let n = 24;
        let a = Mat::from_fn(n, n, |_, _| random_value());
        let b = Mat::from_fn(n, n, |_, _| random_value());
        let mut dst = Mat::from_fn(n, n, |_, _| random_value());

        triangular::matmul(
            dst.as_mut(),
            BlockStructure::Rectangular,
            a.as_ref(),
            BlockStructure::TriangularLower,
            Conj::No,
            b.as_ref(),
            BlockStructure::TriangularLower,
            Conj::No,
            None,
            1.0,
            Parallelism::None,
        );

        let a_masked = Mat::from_fn(n, n, |i, j| if i >= j { a[(i, j)] } else { 0.0 });
        let b_masked = Mat::from_fn(n, n, |i, j| if i >= j { b[(i, j)] } else { 0.0 });
        let mut expected = Mat::zeros(n, n);
        matmul_reference(&mut expected, &a_masked, &b_masked, None, 1.0);

        for i in 0..n {
            for j in 0..n {
                assert_approx_eq!(dst[(i, j)], expected[(i, j)]);
            }
        }
    }
}
