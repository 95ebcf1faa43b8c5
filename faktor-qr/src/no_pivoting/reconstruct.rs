use assert2::assert as fancy_assert;
use dyn_stack::{DynStack, GlobalMemBuffer, SizeOverflow, StackReq};
use faktor_core::{
    householder::{apply_block_householder_on_the_left, make_householder_factor},
    temp_mat_req, temp_mat_zeroed,
    zip::Diag,
    ColRef, ComplexField, Conj, MatMut, MatRef, Parallelism,
};
use reborrow::*;

use super::compute::QrParams;

/// Computes the workspace requirement of [`reconstruct`], without allocating.
pub fn reconstruct_req<T: 'static>(
    nrows: usize,
    ncols: usize,
    params: QrParams,
) -> Result<StackReq, SizeOverflow> {
    let size = nrows.min(ncols);
    let nb = params.blocksize.min(size).max(1);

    StackReq::try_all_of([
        temp_mat_req::<T>(nb, nb)?,
        StackReq::try_any_of([
            temp_mat_req::<T>(nb, 1)?,
            StackReq::try_all_of([temp_mat_req::<T>(nb, ncols)?, temp_mat_req::<T>(nb, ncols)?])?,
        ])?,
    ])
}

fn apply_q_impl<T: ComplexField>(
    dst: MatMut<'_, T>,
    qr_factors: MatRef<'_, T>,
    tau: ColRef<'_, T>,
    parallelism: Parallelism,
    stack: DynStack<'_>,
    params: QrParams,
) {
    let mut dst = dst;

    let m = qr_factors.nrows();
    let n = qr_factors.ncols();
    let size = m.min(n);
    let nb = params.blocksize.min(size);

    let (t_storage, stack) = temp_mat_zeroed::<T>(nb, nb, stack);
    let mut t_storage = t_storage;
    let mut stack = stack;

    // Q is the product of the per-panel block reflectors in panel order, so
    // applying it to R replays the blocks in reverse order
    let n_panels = (size + nb - 1) / nb;
    for panel_idx in (0..n_panels).rev() {
        let j = panel_idx * nb;
        let ib = nb.min(size - j);

        let panel = qr_factors.submatrix(j, j, m - j, ib);
        let tau_panel = tau.split_at(j).1.split_at(ib).0;

        let mut t_block = t_storage.rb_mut().submatrix(0, 0, ib, ib);
        make_householder_factor(t_block.rb_mut(), panel, tau_panel, stack.rb_mut());

        apply_block_householder_on_the_left(
            dst.rb_mut().subrows(j, m - j),
            panel,
            t_block.rb(),
            Conj::No,
            parallelism,
            stack.rb_mut(),
        );
    }
}

/// Reconstructs `A = Q·R` from the packed factorization computed by
/// [`qr_in_place`](super::compute::qr_in_place), storing the result in `dst`.
///
/// The per-panel triangular factors are re-derived from the stored reflectors
/// and `tau`; the panel partition does not need to match the one used during
/// the factorization.
///
/// If `stack` cannot hold the requirement reported by [`reconstruct_req`], a
/// buffer of the required size is allocated internally instead.
///
/// # Panics
///
/// - Panics if `dst` does not have the same shape as `qr_factors`.
/// - Panics if `tau` has fewer than `min(nrows, ncols)` elements.
/// - Panics if `params.blocksize` is zero.
#[track_caller]
pub fn reconstruct<T: ComplexField>(
    dst: MatMut<'_, T>,
    qr_factors: MatRef<'_, T>,
    tau: ColRef<'_, T>,
    parallelism: Parallelism,
    stack: DynStack<'_>,
    params: QrParams,
) {
    let m = qr_factors.nrows();
    let n = qr_factors.ncols();
    let size = m.min(n);

    fancy_assert!((dst.nrows(), dst.ncols()) == (m, n));
    fancy_assert!(tau.nrows() >= size);
    fancy_assert!(params.blocksize >= 1);

    let mut dst = dst;

    // dst = R
    dst.rb_mut()
        .cwise()
        .zip(qr_factors)
        .for_each_triangular_upper(Diag::Include, |a, b| *a = *b);
    dst.rb_mut()
        .cwise()
        .for_each_triangular_lower(Diag::Skip, |a| *a = T::zero());

    if size == 0 {
        return;
    }

    let req = reconstruct_req::<T>(m, n, params).unwrap();
    if stack.can_hold(req) {
        apply_q_impl(dst, qr_factors, tau, parallelism, stack, params);
    } else {
        let mut mem = GlobalMemBuffer::new(req);
        apply_q_impl(
            dst,
            qr_factors,
            tau,
            parallelism,
            DynStack::new(&mut mem),
            params,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::no_pivoting::compute::{qr_in_place, qr_in_place_req};
    use assert_approx_eq::assert_approx_eq;
    use faktor_core::{mul::matmul, Mat};
    use rand::prelude::*;
    use std::cell::RefCell;

    macro_rules! make_stack {
        ($req: expr) => {
            DynStack::new(&mut GlobalMemBuffer::new($req.unwrap()))
        };
    }

    thread_local! {
        static RNG: RefCell<StdRng> = RefCell::new(StdRng::seed_from_u64(0));
    }

    fn random_value() -> f64 {
        RNG.with(|rng| rng.borrow_mut().gen())
    }

    #[test]
    fn test_reconstruction_partition_independent() {
        // the factorization and the reconstruction may use different panel
        // widths
        let n = 40;
        let mat = Mat::from_fn(n, n, |_, _| random_value() - 0.5);

        let factor_params = QrParams { blocksize: 16 };
        let mut qr = mat.clone();
        let mut tau = Mat::zeros(n, 1);
        qr_in_place(
            qr.as_mut(),
            tau.as_mut().col(0),
            None,
            Parallelism::None,
            make_stack!(qr_in_place_req::<f64>(n, n, false, factor_params)),
            factor_params,
        );

        for blocksize in [1, 7, 64] {
            let params = QrParams { blocksize };
            let mut reconstructed = Mat::zeros(n, n);
            reconstruct(
                reconstructed.as_mut(),
                qr.as_ref(),
                tau.as_ref().col(0),
                Parallelism::None,
                make_stack!(reconstruct_req::<f64>(n, n, params)),
                params,
            );

            for i in 0..n {
                for j in 0..n {
                    assert_approx_eq!(reconstructed[(i, j)], mat[(i, j)], 1e-10);
                }
            }
        }
    }

    #[test]
    fn test_orthogonality() {
        // Q built by applying the reconstruction to the identity must satisfy
        // QᴴQ = I
        let m = 24;
        let mat = Mat::from_fn(m, m, |_, _| random_value() - 0.5);
        let params = QrParams { blocksize: 8 };

        let mut qr = mat.clone();
        let mut tau = Mat::zeros(m, 1);
        qr_in_place(
            qr.as_mut(),
            tau.as_mut().col(0),
            None,
            Parallelism::None,
            make_stack!(qr_in_place_req::<f64>(m, m, false, params)),
            params,
        );

        let mut q = Mat::zeros(m, m);
        for i in 0..m {
            q[(i, i)] = 1.0;
        }
        super::apply_q_impl(
            q.as_mut(),
            qr.as_ref(),
            tau.as_ref().col(0),
            Parallelism::None,
            make_stack!(reconstruct_req::<f64>(m, m, params)),
            params,
        );

        let mut qtq = Mat::zeros(m, m);
        matmul(
            qtq.as_mut(),
            q.as_ref().transpose(),
            q.as_ref(),
            None,
            1.0,
            Parallelism::None,
        );
        for i in 0..m {
            for j in 0..m {
                let target = if i == j { 1.0 } else { 0.0 };
                assert_approx_eq!(qtq[(i, j)], target, 1e-12);
            }
        }
    }
}
