use assert2::assert as fancy_assert;
use dyn_stack::{DynStack, GlobalMemBuffer, SizeOverflow, StackReq};
use faktor_core::{
    householder::{
        apply_block_householder_on_the_left, apply_householder_on_the_left,
        make_householder_factor, make_householder_in_place,
    },
    temp_mat_req, temp_mat_zeroed, ColMut, ComplexField, Conj, MatMut, Parallelism,
};
use reborrow::*;

/// Options for the blocked QR factorization.
#[derive(Copy, Clone, Debug)]
pub struct QrParams {
    /// Width of the panels factored by the unblocked kernel before their
    /// accumulated transformation is applied to the trailing submatrix.
    pub blocksize: usize,
}

impl Default for QrParams {
    #[inline]
    fn default() -> Self {
        Self { blocksize: 32 }
    }
}

fn qr_in_place_unblocked_req<T: 'static>(
    nrows: usize,
    ncols: usize,
) -> Result<StackReq, SizeOverflow> {
    let _ = nrows;
    temp_mat_req::<T>(1, ncols)
}

/// Unblocked panel kernel: factors a narrow panel one reflector at a time,
/// applying each reflector to the columns on its right with level-2 work.
fn qr_in_place_unblocked<T: ComplexField>(
    matrix: MatMut<'_, T>,
    tau: ColMut<'_, T>,
    stack: DynStack<'_>,
) {
    let mut matrix = matrix;
    let mut tau = tau;
    let mut stack = stack;

    let m = matrix.nrows();
    let n = matrix.ncols();
    let size = m.min(n);

    for k in 0..size {
        let mat_rem = matrix.rb_mut().submatrix(k, k, m - k, n - k);
        let (_, _, first_col, last_cols) = mat_rem.split_at(0, 1);
        let (first_col_head, first_col_tail) = first_col.col(0).split_at(1);
        let mut first_col_head = first_col_head;
        let mut first_col_tail = first_col_tail;

        let mut tail_squared_norm = T::Real::zero();
        for i in 0..first_col_tail.nrows() {
            let e = unsafe { *first_col_tail.rb().get_unchecked(i) };
            tail_squared_norm = tail_squared_norm + (e * e.conj()).real();
        }

        let (tau_k, beta) = make_householder_in_place(
            first_col_tail.rb_mut(),
            *first_col_head.rb().get(0),
            tail_squared_norm,
        );
        *tau.rb_mut().get(k) = tau_k;
        *first_col_head.rb_mut().get(0) = beta;

        if last_cols.ncols() > 0 {
            apply_householder_on_the_left(
                last_cols,
                first_col_tail.rb(),
                tau_k,
                Conj::Yes,
                stack.rb_mut(),
            );
        }
    }
}

/// Computes the workspace requirement of [`qr_in_place`], without allocating.
///
/// `with_block_factor` must match whether a persistent block factor will be
/// passed to the factorization; when it is `false`, room for a transient
/// `blocksize×blocksize` triangular factor is included in the requirement.
///
/// The requirement is non-decreasing in `nrows` and `ncols` at a fixed block
/// size, so a single query can size a buffer for repeated calls on smaller
/// matrices.
pub fn qr_in_place_req<T: 'static>(
    nrows: usize,
    ncols: usize,
    with_block_factor: bool,
    params: QrParams,
) -> Result<StackReq, SizeOverflow> {
    let size = nrows.min(ncols);
    let nb = params.blocksize.min(size).max(1);

    let per_panel = StackReq::try_any_of([
        qr_in_place_unblocked_req::<T>(nrows, nb)?,
        temp_mat_req::<T>(nb, 1)?,
        StackReq::try_all_of([temp_mat_req::<T>(nb, ncols)?, temp_mat_req::<T>(nb, ncols)?])?,
    ])?;

    if with_block_factor {
        Ok(per_panel)
    } else {
        StackReq::try_all_of([temp_mat_req::<T>(nb, nb)?, per_panel])
    }
}

fn qr_in_place_impl<T: ComplexField>(
    matrix: MatMut<'_, T>,
    tau: ColMut<'_, T>,
    block_factor: Option<MatMut<'_, T>>,
    parallelism: Parallelism,
    stack: DynStack<'_>,
    params: QrParams,
) {
    let mut matrix = matrix;
    let mut tau = tau;

    let m = matrix.nrows();
    let n = matrix.ncols();
    let size = m.min(n);
    let nb = params.blocksize.min(size);

    match block_factor {
        Some(block_factor) => {
            let mut block_factor = block_factor;
            let mut stack = stack;
            fancy_assert!(block_factor.nrows() >= size);
            fancy_assert!(block_factor.ncols() >= nb);

            let mut j = 0;
            while j < size {
                let ib = nb.min(size - j);
                let (_, _, _, panel_and_right) = matrix.rb_mut().split_at(j, j);
                let (mut panel, mut trailing) = panel_and_right.split_at_col(ib);
                let mut tau_panel = tau.rb_mut().split_at(j).1.split_at(ib).0;

                qr_in_place_unblocked(panel.rb_mut(), tau_panel.rb_mut(), stack.rb_mut());

                // the persistent factor is accumulated for every panel, last
                // one included, so the caller can replay the transformations
                // after the factorization returns
                let mut t_block = block_factor.rb_mut().submatrix(j, 0, ib, ib);
                make_householder_factor(
                    t_block.rb_mut(),
                    panel.rb(),
                    tau_panel.rb(),
                    stack.rb_mut(),
                );

                if trailing.ncols() > 0 {
                    apply_block_householder_on_the_left(
                        trailing.rb_mut(),
                        panel.rb(),
                        t_block.rb(),
                        Conj::Yes,
                        parallelism,
                        stack.rb_mut(),
                    );
                }

                j += ib;
            }
        }
        None => {
            // the transient factor lives in the workspace and is only valid
            // for one panel iteration
            let (t_storage, stack) = temp_mat_zeroed::<T>(nb, nb, stack);
            let mut t_storage = t_storage;
            let mut stack = stack;

            let mut j = 0;
            while j < size {
                let ib = nb.min(size - j);
                let (_, _, _, panel_and_right) = matrix.rb_mut().split_at(j, j);
                let (mut panel, mut trailing) = panel_and_right.split_at_col(ib);
                let mut tau_panel = tau.rb_mut().split_at(j).1.split_at(ib).0;

                qr_in_place_unblocked(panel.rb_mut(), tau_panel.rb_mut(), stack.rb_mut());

                if trailing.ncols() > 0 {
                    let mut t_block = t_storage.rb_mut().submatrix(0, 0, ib, ib);
                    make_householder_factor(
                        t_block.rb_mut(),
                        panel.rb(),
                        tau_panel.rb(),
                        stack.rb_mut(),
                    );
                    apply_block_householder_on_the_left(
                        trailing.rb_mut(),
                        panel.rb(),
                        t_block.rb(),
                        Conj::Yes,
                        parallelism,
                        stack.rb_mut(),
                    );
                }

                j += ib;
            }
        }
    }
}

/// Computes the blocked QR factorization of `matrix` in place.
///
/// On exit, the elements on and above the diagonal hold the triangular factor
/// `R`, while the reflectors making up `Q` are stored below the diagonal with
/// an implicit unit leading coefficient; their scale factors are written to
/// the leading `min(nrows, ncols)` elements of `tau`.
///
/// If `block_factor` is provided, it must have at least `min(nrows, ncols)`
/// rows and `blocksize` columns; the `ib×ib` triangular factor of the panel
/// starting at row `j` is written at position `(j, 0)` and remains valid
/// after the call. Without it, a transient factor is carved from the
/// workspace and recomputed for each panel.
///
/// If `stack` cannot hold the requirement reported by [`qr_in_place_req`],
/// a buffer of the required size is allocated internally instead; the
/// undersized stack is not an error.
///
/// # Panics
///
/// - Panics if `tau` has fewer than `min(nrows, ncols)` elements.
/// - Panics if `params.blocksize` is zero.
/// - Panics if `block_factor` is provided and is too small.
#[track_caller]
pub fn qr_in_place<T: ComplexField>(
    matrix: MatMut<'_, T>,
    tau: ColMut<'_, T>,
    block_factor: Option<MatMut<'_, T>>,
    parallelism: Parallelism,
    stack: DynStack<'_>,
    params: QrParams,
) {
    let m = matrix.nrows();
    let n = matrix.ncols();
    let size = m.min(n);

    fancy_assert!(params.blocksize >= 1);
    fancy_assert!(tau.nrows() >= size);

    if size == 0 {
        return;
    }

    let req = qr_in_place_req::<T>(m, n, block_factor.is_some(), params).unwrap();
    if stack.can_hold(req) {
        qr_in_place_impl(matrix, tau, block_factor, parallelism, stack, params);
    } else {
        let mut mem = GlobalMemBuffer::new(req);
        qr_in_place_impl(
            matrix,
            tau,
            block_factor,
            parallelism,
            DynStack::new(&mut mem),
            params,
        );
    }
}
