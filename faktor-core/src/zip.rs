//! Element-wise kernels over one or two matching views.

use crate::{ColMut, ColRef, MatMut, MatRef, RowMut, RowRef};
use assert2::assert as fancy_assert;
use reborrow::*;

/// Whether the diagonal is included in a triangular traversal.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Diag {
    /// The diagonal is traversed.
    Include,
    /// The diagonal is skipped.
    Skip,
}

/// Element-wise kernel builder over a single mutable matrix view.
pub struct CwiseMat<'a, T> {
    pub(crate) mat: MatMut<'a, T>,
}

/// Element-wise kernel builder over a mutable matrix view and a matching
/// read-only view.
pub struct CwiseMat2<'a, 'b, T> {
    dst: MatMut<'a, T>,
    src: MatRef<'b, T>,
}

/// Element-wise kernel builder over a single mutable column view.
pub struct CwiseCol<'a, T> {
    pub(crate) col: ColMut<'a, T>,
}

/// Element-wise kernel builder over a mutable column view and a matching
/// read-only view.
pub struct CwiseCol2<'a, 'b, T> {
    dst: ColMut<'a, T>,
    src: ColRef<'b, T>,
}

/// Element-wise kernel builder over a single mutable row view.
pub struct CwiseRow<'a, T> {
    pub(crate) row: RowMut<'a, T>,
}

/// Element-wise kernel builder over a mutable row view and a matching
/// read-only view.
pub struct CwiseRow2<'a, 'b, T> {
    dst: RowMut<'a, T>,
    src: RowRef<'b, T>,
}

impl<'a, T> CwiseMat<'a, T> {
    /// Pairs the destination with a read-only view of the same shape.
    #[track_caller]
    pub fn zip<'b>(self, src: MatRef<'b, T>) -> CwiseMat2<'a, 'b, T> {
        fancy_assert!((self.mat.nrows(), self.mat.ncols()) == (src.nrows(), src.ncols()));
        CwiseMat2 { dst: self.mat, src }
    }

    /// Applies `f` to every element.
    pub fn for_each(self, mut f: impl FnMut(&mut T)) {
        let mut dst = self.mat;
        let m = dst.nrows();
        let n = dst.ncols();
        for j in 0..n {
            for i in 0..m {
                f(unsafe { dst.rb_mut().get_unchecked(i, j) });
            }
        }
    }

    /// Applies `f` to every element of the lower triangular half.
    pub fn for_each_triangular_lower(self, diag: Diag, mut f: impl FnMut(&mut T)) {
        let mut dst = self.mat;
        let m = dst.nrows();
        let n = dst.ncols();
        for j in 0..n {
            let start = match diag {
                Diag::Include => j,
                Diag::Skip => j + 1,
            };
            for i in start.min(m)..m {
                f(unsafe { dst.rb_mut().get_unchecked(i, j) });
            }
        }
    }

    /// Applies `f` to every element of the upper triangular half.
    pub fn for_each_triangular_upper(self, diag: Diag, mut f: impl FnMut(&mut T)) {
        let mut dst = self.mat;
        let m = dst.nrows();
        let n = dst.ncols();
        for j in 0..n {
            let end = match diag {
                Diag::Include => j + 1,
                Diag::Skip => j,
            };
            for i in 0..end.min(m) {
                f(unsafe { dst.rb_mut().get_unchecked(i, j) });
            }
        }
    }
}

impl<'a, 'b, T> CwiseMat2<'a, 'b, T> {
    /// Applies `f` to every (destination, source) element pair.
    pub fn for_each(self, mut f: impl FnMut(&mut T, &T)) {
        let mut dst = self.dst;
        let src = self.src;
        let m = dst.nrows();
        let n = dst.ncols();
        for j in 0..n {
            for i in 0..m {
                f(unsafe { dst.rb_mut().get_unchecked(i, j) }, unsafe {
                    src.get_unchecked(i, j)
                });
            }
        }
    }

    /// Applies `f` to every pair in the lower triangular half.
    pub fn for_each_triangular_lower(self, diag: Diag, mut f: impl FnMut(&mut T, &T)) {
        let mut dst = self.dst;
        let src = self.src;
        let m = dst.nrows();
        let n = dst.ncols();
        for j in 0..n {
            let start = match diag {
                Diag::Include => j,
                Diag::Skip => j + 1,
            };
            for i in start.min(m)..m {
                f(unsafe { dst.rb_mut().get_unchecked(i, j) }, unsafe {
                    src.get_unchecked(i, j)
                });
            }
        }
    }

    /// Applies `f` to every pair in the upper triangular half.
    pub fn for_each_triangular_upper(self, diag: Diag, mut f: impl FnMut(&mut T, &T)) {
        let mut dst = self.dst;
        let src = self.src;
        let m = dst.nrows();
        let n = dst.ncols();
        for j in 0..n {
            let end = match diag {
                Diag::Include => j + 1,
                Diag::Skip => j,
            };
            for i in 0..end.min(m) {
                f(unsafe { dst.rb_mut().get_unchecked(i, j) }, unsafe {
                    src.get_unchecked(i, j)
                });
            }
        }
    }
}

impl<'a, T> CwiseCol<'a, T> {
    /// Pairs the destination with a read-only view of the same length.
    #[track_caller]
    pub fn zip<'b>(self, src: ColRef<'b, T>) -> CwiseCol2<'a, 'b, T> {
        fancy_assert!(self.col.nrows() == src.nrows());
        CwiseCol2 { dst: self.col, src }
    }

    /// Applies `f` to every element.
    pub fn for_each(self, mut f: impl FnMut(&mut T)) {
        let mut dst = self.col;
        for i in 0..dst.nrows() {
            f(unsafe { dst.rb_mut().get_unchecked(i) });
        }
    }
}

impl<'a, 'b, T> CwiseCol2<'a, 'b, T> {
    /// Applies `f` to every (destination, source) element pair.
    pub fn for_each(self, mut f: impl FnMut(&mut T, &T)) {
        let mut dst = self.dst;
        let src = self.src;
        for i in 0..dst.nrows() {
            f(unsafe { dst.rb_mut().get_unchecked(i) }, unsafe {
                src.get_unchecked(i)
            });
        }
    }
}

impl<'a, T> CwiseRow<'a, T> {
    /// Pairs the destination with a read-only view of the same length.
    #[track_caller]
    pub fn zip<'b>(self, src: RowRef<'b, T>) -> CwiseRow2<'a, 'b, T> {
        fancy_assert!(self.row.ncols() == src.ncols());
        CwiseRow2 { dst: self.row, src }
    }

    /// Applies `f` to every element.
    pub fn for_each(self, mut f: impl FnMut(&mut T)) {
        let mut dst = self.row;
        for j in 0..dst.ncols() {
            f(unsafe { dst.rb_mut().get_unchecked(j) });
        }
    }
}

impl<'a, 'b, T> CwiseRow2<'a, 'b, T> {
    /// Applies `f` to every (destination, source) element pair.
    pub fn for_each(self, mut f: impl FnMut(&mut T, &T)) {
        let mut dst = self.dst;
        let src = self.src;
        for j in 0..dst.ncols() {
            f(unsafe { dst.rb_mut().get_unchecked(j) }, unsafe {
                src.get_unchecked(j)
            });
        }
    }
}
