//! `faktor` core module.
//!
//! This module contains:
//! - definitions of matrix structures ([`MatRef`], [`MatMut`], [`Mat`], etc.),
//! - element-wise routines using multiple matrices,
//! - matrix multiplication routines,
//! - triangular matrix solve routines,
//! - Householder reflector helpers,
//! - the two-phase workspace sizing/allocation helpers shared by the
//!   factorization crates.

#![warn(rust_2018_idioms)]
#![allow(clippy::too_many_arguments)]

use assert2::{assert as fancy_assert, debug_assert as fancy_debug_assert};
use core::{
    fmt::Debug,
    marker::PhantomData,
    ops::{Add, Div, Index, IndexMut, Mul, Neg, Sub},
    ptr::NonNull,
};
use dyn_stack::{DynStack, SizeOverflow, StackReq};
use num_complex::ComplexFloat;
use reborrow::*;

/// Complex floating point number type, where the real and imaginary parts each occupy 32 bits.
pub use gemm::c32;
/// Complex floating point number type, where the real and imaginary parts each occupy 64 bits.
pub use gemm::c64;

pub mod householder;
pub mod mul;
pub mod norm;
pub mod permutation;
pub mod solve;
pub mod zip;

/// Indicates whether the corresponding operand should be conjugated or not.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Conj {
    /// Do not conjugate.
    No,
    /// Do conjugate.
    Yes,
}

impl Conj {
    /// Returns the composition of two conjugation operations.
    #[inline]
    pub fn compose(self, other: Conj) -> Conj {
        if self == other {
            Conj::No
        } else {
            Conj::Yes
        }
    }
}

/// Indicates which triangular half of a symmetric or triangular matrix is
/// stored and accessed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Uplo {
    /// The lower triangular half.
    Lower,
    /// The upper triangular half.
    Upper,
}

/// Parallelism strategy that can be passed to most of the routines in the library.
///
/// The factorization drivers are strictly sequential loops with a true data
/// dependency between successive panels. Parallelism only ever applies inside
/// one BLAS-3 call, which is invoked synchronously.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Parallelism {
    /// No parallelism. The code is executed sequentially on the calling thread.
    None,
    /// Rayon parallelism. The contained value is a hint for the number of
    /// threads to use, with `0` standing for `rayon::current_num_threads()`.
    Rayon(usize),
}

#[inline]
#[doc(hidden)]
pub fn join_raw(
    op_a: impl Send + for<'a> FnOnce(Parallelism),
    op_b: impl Send + for<'a> FnOnce(Parallelism),
    parallelism: Parallelism,
) {
    match parallelism {
        Parallelism::None => {
            op_a(parallelism);
            op_b(parallelism);
        }
        Parallelism::Rayon(n_threads) => {
            if n_threads == 1 {
                op_a(Parallelism::None);
                op_b(Parallelism::None);
            } else {
                let n_threads = if n_threads > 0 {
                    n_threads
                } else {
                    rayon::current_num_threads()
                };
                let parallelism = Parallelism::Rayon(n_threads - n_threads / 2);
                rayon::join(|| op_a(parallelism), || op_b(parallelism));
            }
        }
    }
}

/// Trait that describes a complex number field.
///
/// Real numbers are also complex numbers, with a zero imaginary part.
pub trait ComplexField:
    Copy
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + Send
    + Sync
    + Debug
    + 'static
{
    type Real: RealField;

    /// Returns a complex number whose real part is equal to `real`, and a zero imaginary part.
    fn from_real(real: Self::Real) -> Self;
    /// Returns the real and imaginary parts.
    fn into_real_imag(self) -> (Self::Real, Self::Real);
    /// Returns the real part.
    #[inline(always)]
    fn real(self) -> Self::Real {
        self.into_real_imag().0
    }
    /// Returns the imaginary part.
    #[inline(always)]
    fn imag(self) -> Self::Real {
        self.into_real_imag().1
    }

    /// Returns the value representing `0.0`.
    fn zero() -> Self;
    /// Returns the value representing `1.0`.
    fn one() -> Self;

    /// Returns the inverse of the number.
    fn inv(self) -> Self;
    /// Returns the conjugate of the number.
    fn conj(self) -> Self;
    /// Returns the square root of the number.
    fn sqrt(self) -> Self;
    /// Returns the input, scaled by `factor`.
    #[inline(always)]
    fn scale(self, factor: Self::Real) -> Self {
        self * Self::from_real(factor)
    }
    /// Returns either the norm or squared norm of the number.
    ///
    /// An implementation may choose either, so long as it chooses consistently.
    fn score(self) -> Self::Real;

    /// Returns the absolute value of the number.
    #[inline(always)]
    fn abs(self) -> Self::Real {
        (self * self.conj()).real().sqrt()
    }
}

/// Trait that describes a real number field.
pub trait RealField: ComplexField<Real = Self> + PartialOrd {
    /// Returns `true` if the value is a floating point NaN.
    #[inline(always)]
    fn is_nan(self) -> bool {
        self != self
    }
}

impl RealField for f32 {}
impl ComplexField for f32 {
    type Real = f32;

    #[inline(always)]
    fn from_real(real: Self::Real) -> Self {
        real
    }

    #[inline(always)]
    fn into_real_imag(self) -> (Self::Real, Self::Real) {
        (self, 0.0)
    }

    #[inline(always)]
    fn zero() -> Self {
        0.0
    }

    #[inline(always)]
    fn one() -> Self {
        1.0
    }

    #[inline(always)]
    fn inv(self) -> Self {
        1.0 / self
    }

    #[inline(always)]
    fn conj(self) -> Self {
        self
    }

    #[inline(always)]
    fn sqrt(self) -> Self {
        self.sqrt()
    }

    #[inline(always)]
    fn score(self) -> Self::Real {
        self.abs()
    }

    #[inline(always)]
    fn abs(self) -> Self::Real {
        self.abs()
    }
}

impl RealField for f64 {}
impl ComplexField for f64 {
    type Real = f64;

    #[inline(always)]
    fn from_real(real: Self::Real) -> Self {
        real
    }

    #[inline(always)]
    fn into_real_imag(self) -> (Self::Real, Self::Real) {
        (self, 0.0)
    }

    #[inline(always)]
    fn zero() -> Self {
        0.0
    }

    #[inline(always)]
    fn one() -> Self {
        1.0
    }

    #[inline(always)]
    fn inv(self) -> Self {
        1.0 / self
    }

    #[inline(always)]
    fn conj(self) -> Self {
        self
    }

    #[inline(always)]
    fn sqrt(self) -> Self {
        self.sqrt()
    }

    #[inline(always)]
    fn score(self) -> Self::Real {
        self.abs()
    }

    #[inline(always)]
    fn abs(self) -> Self::Real {
        self.abs()
    }
}

impl ComplexField for c32 {
    type Real = f32;

    #[inline(always)]
    fn from_real(real: Self::Real) -> Self {
        c32 { re: real, im: 0.0 }
    }

    #[inline(always)]
    fn into_real_imag(self) -> (Self::Real, Self::Real) {
        (self.re, self.im)
    }

    #[inline(always)]
    fn zero() -> Self {
        c32 { re: 0.0, im: 0.0 }
    }

    #[inline(always)]
    fn one() -> Self {
        c32 { re: 1.0, im: 0.0 }
    }

    #[inline(always)]
    fn inv(self) -> Self {
        1.0 / self
    }

    #[inline(always)]
    fn conj(self) -> Self {
        c32 {
            re: self.re,
            im: -self.im,
        }
    }

    #[inline(always)]
    fn sqrt(self) -> Self {
        <Self as ComplexFloat>::sqrt(self)
    }

    #[inline(always)]
    fn score(self) -> Self::Real {
        self.re * self.re + self.im * self.im
    }
}

impl ComplexField for c64 {
    type Real = f64;

    #[inline(always)]
    fn from_real(real: Self::Real) -> Self {
        c64 { re: real, im: 0.0 }
    }

    #[inline(always)]
    fn into_real_imag(self) -> (Self::Real, Self::Real) {
        (self.re, self.im)
    }

    #[inline(always)]
    fn zero() -> Self {
        c64 { re: 0.0, im: 0.0 }
    }

    #[inline(always)]
    fn one() -> Self {
        c64 { re: 1.0, im: 0.0 }
    }

    #[inline(always)]
    fn inv(self) -> Self {
        1.0 / self
    }

    #[inline(always)]
    fn conj(self) -> Self {
        c64 {
            re: self.re,
            im: -self.im,
        }
    }

    #[inline(always)]
    fn sqrt(self) -> Self {
        <Self as ComplexFloat>::sqrt(self)
    }

    #[inline(always)]
    fn score(self) -> Self::Real {
        self.re * self.re + self.im * self.im
    }
}

struct MatrixSliceBase<T> {
    ptr: NonNull<T>,
    nrows: usize,
    ncols: usize,
    row_stride: isize,
    col_stride: isize,
}
struct VecSliceBase<T> {
    ptr: NonNull<T>,
    len: usize,
    stride: isize,
}
impl<T> Copy for MatrixSliceBase<T> {}
impl<T> Clone for MatrixSliceBase<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for VecSliceBase<T> {}
impl<T> Clone for VecSliceBase<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

/// Matrix view with general row and column strides.
///
/// The strides are given in elements and may be negative or zero, which makes
/// the view polymorphic over the storage order of the backing buffer.
pub struct MatRef<'a, T> {
    base: MatrixSliceBase<T>,
    _marker: PhantomData<&'a T>,
}

/// Mutable matrix view with general row and column strides.
///
/// For usage examples, see [`MatRef`].
pub struct MatMut<'a, T> {
    base: MatrixSliceBase<T>,
    _marker: PhantomData<&'a mut T>,
}

/// Row vector view with general column stride.
pub struct RowRef<'a, T> {
    base: VecSliceBase<T>,
    _marker: PhantomData<&'a T>,
}

/// Mutable row vector view with general column stride.
pub struct RowMut<'a, T> {
    base: VecSliceBase<T>,
    _marker: PhantomData<&'a mut T>,
}

/// Column vector view with general row stride.
pub struct ColRef<'a, T> {
    base: VecSliceBase<T>,
    _marker: PhantomData<&'a T>,
}

/// Mutable column vector view with general row stride.
pub struct ColMut<'a, T> {
    base: VecSliceBase<T>,
    _marker: PhantomData<&'a mut T>,
}

unsafe impl<'a, T: Sync> Sync for MatRef<'a, T> {}
unsafe impl<'a, T: Sync> Send for MatRef<'a, T> {}
unsafe impl<'a, T: Sync> Sync for MatMut<'a, T> {}
unsafe impl<'a, T: Send> Send for MatMut<'a, T> {}
unsafe impl<'a, T: Sync> Sync for RowRef<'a, T> {}
unsafe impl<'a, T: Sync> Send for RowRef<'a, T> {}
unsafe impl<'a, T: Sync> Sync for RowMut<'a, T> {}
unsafe impl<'a, T: Send> Send for RowMut<'a, T> {}
unsafe impl<'a, T: Sync> Sync for ColRef<'a, T> {}
unsafe impl<'a, T: Sync> Send for ColRef<'a, T> {}
unsafe impl<'a, T: Sync> Sync for ColMut<'a, T> {}
unsafe impl<'a, T: Send> Send for ColMut<'a, T> {}

impl<'a, T> Copy for MatRef<'a, T> {}
impl<'a, T> Copy for RowRef<'a, T> {}
impl<'a, T> Copy for ColRef<'a, T> {}
impl<'a, T> Clone for MatRef<'a, T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}
impl<'a, T> Clone for RowRef<'a, T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}
impl<'a, T> Clone for ColRef<'a, T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<'b, 'a, T> Reborrow<'b> for MatRef<'a, T> {
    type Target = MatRef<'b, T>;
    #[inline]
    fn rb(&'b self) -> Self::Target {
        *self
    }
}
impl<'b, 'a, T> ReborrowMut<'b> for MatRef<'a, T> {
    type Target = MatRef<'b, T>;
    #[inline]
    fn rb_mut(&'b mut self) -> Self::Target {
        *self
    }
}
impl<'b, 'a, T> Reborrow<'b> for MatMut<'a, T> {
    type Target = MatRef<'b, T>;
    #[inline]
    fn rb(&'b self) -> Self::Target {
        MatRef {
            base: self.base,
            _marker: PhantomData,
        }
    }
}
impl<'b, 'a, T> ReborrowMut<'b> for MatMut<'a, T> {
    type Target = MatMut<'b, T>;
    #[inline]
    fn rb_mut(&'b mut self) -> Self::Target {
        MatMut {
            base: self.base,
            _marker: PhantomData,
        }
    }
}
impl<'a, T> IntoConst for MatRef<'a, T> {
    type Target = MatRef<'a, T>;
    #[inline]
    fn into_const(self) -> Self::Target {
        self
    }
}
impl<'a, T> IntoConst for MatMut<'a, T> {
    type Target = MatRef<'a, T>;
    #[inline]
    fn into_const(self) -> Self::Target {
        MatRef {
            base: self.base,
            _marker: PhantomData,
        }
    }
}

impl<'b, 'a, T> Reborrow<'b> for ColRef<'a, T> {
    type Target = ColRef<'b, T>;
    #[inline]
    fn rb(&'b self) -> Self::Target {
        *self
    }
}
impl<'b, 'a, T> ReborrowMut<'b> for ColRef<'a, T> {
    type Target = ColRef<'b, T>;
    #[inline]
    fn rb_mut(&'b mut self) -> Self::Target {
        *self
    }
}
impl<'b, 'a, T> Reborrow<'b> for ColMut<'a, T> {
    type Target = ColRef<'b, T>;
    #[inline]
    fn rb(&'b self) -> Self::Target {
        ColRef {
            base: self.base,
            _marker: PhantomData,
        }
    }
}
impl<'b, 'a, T> ReborrowMut<'b> for ColMut<'a, T> {
    type Target = ColMut<'b, T>;
    #[inline]
    fn rb_mut(&'b mut self) -> Self::Target {
        ColMut {
            base: self.base,
            _marker: PhantomData,
        }
    }
}
impl<'a, T> IntoConst for ColRef<'a, T> {
    type Target = ColRef<'a, T>;
    #[inline]
    fn into_const(self) -> Self::Target {
        self
    }
}
impl<'a, T> IntoConst for ColMut<'a, T> {
    type Target = ColRef<'a, T>;
    #[inline]
    fn into_const(self) -> Self::Target {
        ColRef {
            base: self.base,
            _marker: PhantomData,
        }
    }
}

impl<'b, 'a, T> Reborrow<'b> for RowRef<'a, T> {
    type Target = RowRef<'b, T>;
    #[inline]
    fn rb(&'b self) -> Self::Target {
        *self
    }
}
impl<'b, 'a, T> ReborrowMut<'b> for RowRef<'a, T> {
    type Target = RowRef<'b, T>;
    #[inline]
    fn rb_mut(&'b mut self) -> Self::Target {
        *self
    }
}
impl<'b, 'a, T> Reborrow<'b> for RowMut<'a, T> {
    type Target = RowRef<'b, T>;
    #[inline]
    fn rb(&'b self) -> Self::Target {
        RowRef {
            base: self.base,
            _marker: PhantomData,
        }
    }
}
impl<'b, 'a, T> ReborrowMut<'b> for RowMut<'a, T> {
    type Target = RowMut<'b, T>;
    #[inline]
    fn rb_mut(&'b mut self) -> Self::Target {
        RowMut {
            base: self.base,
            _marker: PhantomData,
        }
    }
}
impl<'a, T> IntoConst for RowRef<'a, T> {
    type Target = RowRef<'a, T>;
    #[inline]
    fn into_const(self) -> Self::Target {
        self
    }
}
impl<'a, T> IntoConst for RowMut<'a, T> {
    type Target = RowRef<'a, T>;
    #[inline]
    fn into_const(self) -> Self::Target {
        RowRef {
            base: self.base,
            _marker: PhantomData,
        }
    }
}

impl<'a, T> MatRef<'a, T> {
    /// Returns a matrix view over the given memory region.
    ///
    /// # Safety
    ///
    /// The pointed-to memory must be initialized and valid for reads for the
    /// lifetime `'a`, for every element reachable through the given strides.
    #[inline]
    pub unsafe fn from_raw_parts(
        ptr: *const T,
        nrows: usize,
        ncols: usize,
        row_stride: isize,
        col_stride: isize,
    ) -> Self {
        Self {
            base: MatrixSliceBase {
                ptr: NonNull::new_unchecked(ptr as *mut T),
                nrows,
                ncols,
                row_stride,
                col_stride,
            },
            _marker: PhantomData,
        }
    }

    /// Returns the number of rows of the matrix.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.base.nrows
    }

    /// Returns the number of columns of the matrix.
    #[inline]
    pub fn ncols(&self) -> usize {
        self.base.ncols
    }

    /// Returns the distance, in elements, between consecutive rows.
    #[inline]
    pub fn row_stride(&self) -> isize {
        self.base.row_stride
    }

    /// Returns the distance, in elements, between consecutive columns.
    #[inline]
    pub fn col_stride(&self) -> isize {
        self.base.col_stride
    }

    /// Returns a pointer to the first element of the view.
    #[inline]
    pub fn as_ptr(self) -> *const T {
        self.base.ptr.as_ptr()
    }

    /// Returns a pointer to the element at position (i, j), with no bound checks.
    ///
    /// # Safety
    ///
    /// Requires `i < self.nrows()` and `j < self.ncols()`.
    #[inline]
    pub unsafe fn ptr_at(self, i: usize, j: usize) -> *const T {
        self.base
            .ptr
            .as_ptr()
            .offset(i as isize * self.base.row_stride)
            .offset(j as isize * self.base.col_stride)
    }

    /// Returns a reference to the element at position (i, j), with no bound checks.
    ///
    /// # Safety
    ///
    /// Requires `i < self.nrows()` and `j < self.ncols()`.
    #[inline]
    pub unsafe fn get_unchecked(self, i: usize, j: usize) -> &'a T {
        fancy_debug_assert!(i < self.nrows());
        fancy_debug_assert!(j < self.ncols());
        &*self.ptr_at(i, j)
    }

    /// Returns a reference to the element at position (i, j).
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.nrows()` or `j >= self.ncols()`.
    #[track_caller]
    #[inline]
    pub fn get(self, i: usize, j: usize) -> &'a T {
        fancy_assert!(i < self.nrows());
        fancy_assert!(j < self.ncols());
        unsafe { self.get_unchecked(i, j) }
    }

    /// Splits the matrix into four quadrants at the position (i, j), returning
    /// (top-left, top-right, bottom-left, bottom-right).
    #[track_caller]
    #[inline]
    pub fn split_at(self, i: usize, j: usize) -> (Self, Self, Self, Self) {
        fancy_assert!(i <= self.nrows());
        fancy_assert!(j <= self.ncols());
        let m = self.nrows();
        let n = self.ncols();
        unsafe {
            (
                self.submatrix_unchecked(0, 0, i, j),
                self.submatrix_unchecked(0, j, i, n - j),
                self.submatrix_unchecked(i, 0, m - i, j),
                self.submatrix_unchecked(i, j, m - i, n - j),
            )
        }
    }

    /// Splits the matrix into (top, bottom) halves at the row `i`.
    #[track_caller]
    #[inline]
    pub fn split_at_row(self, i: usize) -> (Self, Self) {
        fancy_assert!(i <= self.nrows());
        let m = self.nrows();
        let n = self.ncols();
        unsafe {
            (
                self.submatrix_unchecked(0, 0, i, n),
                self.submatrix_unchecked(i, 0, m - i, n),
            )
        }
    }

    /// Splits the matrix into (left, right) halves at the column `j`.
    #[track_caller]
    #[inline]
    pub fn split_at_col(self, j: usize) -> (Self, Self) {
        fancy_assert!(j <= self.ncols());
        let m = self.nrows();
        let n = self.ncols();
        unsafe {
            (
                self.submatrix_unchecked(0, 0, m, j),
                self.submatrix_unchecked(0, j, m, n - j),
            )
        }
    }

    #[inline]
    unsafe fn submatrix_unchecked(self, i: usize, j: usize, nrows: usize, ncols: usize) -> Self {
        Self {
            base: MatrixSliceBase {
                ptr: NonNull::new_unchecked(
                    self.base
                        .ptr
                        .as_ptr()
                        .offset(i as isize * self.base.row_stride)
                        .offset(j as isize * self.base.col_stride),
                ),
                nrows,
                ncols,
                row_stride: self.base.row_stride,
                col_stride: self.base.col_stride,
            },
            _marker: PhantomData,
        }
    }

    /// Returns the `nrows×ncols` submatrix starting at position (i, j).
    #[track_caller]
    #[inline]
    pub fn submatrix(self, i: usize, j: usize, nrows: usize, ncols: usize) -> Self {
        fancy_assert!(i <= self.nrows());
        fancy_assert!(j <= self.ncols());
        fancy_assert!(nrows <= self.nrows() - i);
        fancy_assert!(ncols <= self.ncols() - j);
        unsafe { self.submatrix_unchecked(i, j, nrows, ncols) }
    }

    /// Returns the `nrows` rows starting at row `i`, over all columns.
    #[track_caller]
    #[inline]
    pub fn subrows(self, i: usize, nrows: usize) -> Self {
        let ncols = self.ncols();
        self.submatrix(i, 0, nrows, ncols)
    }

    /// Returns the `ncols` columns starting at column `j`, over all rows.
    #[track_caller]
    #[inline]
    pub fn subcols(self, j: usize, ncols: usize) -> Self {
        let nrows = self.nrows();
        self.submatrix(0, j, nrows, ncols)
    }

    /// Returns the row at index `i` as a row vector view.
    #[track_caller]
    #[inline]
    pub fn row(self, i: usize) -> RowRef<'a, T> {
        fancy_assert!(i < self.nrows());
        RowRef {
            base: VecSliceBase {
                ptr: unsafe {
                    NonNull::new_unchecked(
                        self.base.ptr.as_ptr().offset(i as isize * self.base.row_stride),
                    )
                },
                len: self.ncols(),
                stride: self.base.col_stride,
            },
            _marker: PhantomData,
        }
    }

    /// Returns the column at index `j` as a column vector view.
    #[track_caller]
    #[inline]
    pub fn col(self, j: usize) -> ColRef<'a, T> {
        fancy_assert!(j < self.ncols());
        ColRef {
            base: VecSliceBase {
                ptr: unsafe {
                    NonNull::new_unchecked(
                        self.base.ptr.as_ptr().offset(j as isize * self.base.col_stride),
                    )
                },
                len: self.nrows(),
                stride: self.base.row_stride,
            },
            _marker: PhantomData,
        }
    }

    /// Returns the diagonal of the matrix as a column vector view.
    #[inline]
    pub fn diagonal(self) -> ColRef<'a, T> {
        ColRef {
            base: VecSliceBase {
                ptr: self.base.ptr,
                len: self.nrows().min(self.ncols()),
                stride: self.base.row_stride + self.base.col_stride,
            },
            _marker: PhantomData,
        }
    }

    /// Returns the transpose of the matrix, sharing the backing storage.
    #[inline]
    pub fn transpose(self) -> MatRef<'a, T> {
        MatRef {
            base: MatrixSliceBase {
                ptr: self.base.ptr,
                nrows: self.base.ncols,
                ncols: self.base.nrows,
                row_stride: self.base.col_stride,
                col_stride: self.base.row_stride,
            },
            _marker: PhantomData,
        }
    }
}

impl<'a, T> MatMut<'a, T> {
    /// Returns a mutable matrix view over the given memory region.
    ///
    /// # Safety
    ///
    /// The pointed-to memory must be initialized, valid for reads and writes
    /// for the lifetime `'a` for every element reachable through the given
    /// strides, and must not be aliased by any other active view. No two
    /// distinct index pairs may map to the same element.
    #[inline]
    pub unsafe fn from_raw_parts(
        ptr: *mut T,
        nrows: usize,
        ncols: usize,
        row_stride: isize,
        col_stride: isize,
    ) -> Self {
        Self {
            base: MatrixSliceBase {
                ptr: NonNull::new_unchecked(ptr),
                nrows,
                ncols,
                row_stride,
                col_stride,
            },
            _marker: PhantomData,
        }
    }

    /// Returns the number of rows of the matrix.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.base.nrows
    }

    /// Returns the number of columns of the matrix.
    #[inline]
    pub fn ncols(&self) -> usize {
        self.base.ncols
    }

    /// Returns the distance, in elements, between consecutive rows.
    #[inline]
    pub fn row_stride(&self) -> isize {
        self.base.row_stride
    }

    /// Returns the distance, in elements, between consecutive columns.
    #[inline]
    pub fn col_stride(&self) -> isize {
        self.base.col_stride
    }

    /// Returns a mutable pointer to the first element of the view.
    #[inline]
    pub fn as_ptr(self) -> *mut T {
        self.base.ptr.as_ptr()
    }

    /// Returns a mutable pointer to the element at position (i, j), with no
    /// bound checks.
    ///
    /// # Safety
    ///
    /// Requires `i < self.nrows()` and `j < self.ncols()`.
    #[inline]
    pub unsafe fn ptr_at(self, i: usize, j: usize) -> *mut T {
        self.base
            .ptr
            .as_ptr()
            .offset(i as isize * self.base.row_stride)
            .offset(j as isize * self.base.col_stride)
    }

    /// Returns a mutable reference to the element at position (i, j), with no
    /// bound checks.
    ///
    /// # Safety
    ///
    /// Requires `i < self.nrows()` and `j < self.ncols()`.
    #[inline]
    pub unsafe fn get_unchecked(self, i: usize, j: usize) -> &'a mut T {
        fancy_debug_assert!(i < self.nrows());
        fancy_debug_assert!(j < self.ncols());
        &mut *self.ptr_at(i, j)
    }

    /// Returns a mutable reference to the element at position (i, j).
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.nrows()` or `j >= self.ncols()`.
    #[track_caller]
    #[inline]
    pub fn get(self, i: usize, j: usize) -> &'a mut T {
        fancy_assert!(i < self.nrows());
        fancy_assert!(j < self.ncols());
        unsafe { self.get_unchecked(i, j) }
    }

    /// Splits the matrix into four quadrants at the position (i, j), returning
    /// (top-left, top-right, bottom-left, bottom-right).
    #[track_caller]
    #[inline]
    pub fn split_at(self, i: usize, j: usize) -> (Self, Self, Self, Self) {
        fancy_assert!(i <= self.nrows());
        fancy_assert!(j <= self.ncols());
        let m = self.nrows();
        let n = self.ncols();
        let rs = self.base.row_stride;
        let cs = self.base.col_stride;
        let ptr = self.base.ptr.as_ptr();
        unsafe {
            (
                MatMut::from_raw_parts(ptr, i, j, rs, cs),
                MatMut::from_raw_parts(ptr.offset(j as isize * cs), i, n - j, rs, cs),
                MatMut::from_raw_parts(ptr.offset(i as isize * rs), m - i, j, rs, cs),
                MatMut::from_raw_parts(
                    ptr.offset(i as isize * rs).offset(j as isize * cs),
                    m - i,
                    n - j,
                    rs,
                    cs,
                ),
            )
        }
    }

    /// Splits the matrix into (top, bottom) halves at the row `i`.
    #[track_caller]
    #[inline]
    pub fn split_at_row(self, i: usize) -> (Self, Self) {
        fancy_assert!(i <= self.nrows());
        let m = self.nrows();
        let n = self.ncols();
        let rs = self.base.row_stride;
        let cs = self.base.col_stride;
        let ptr = self.base.ptr.as_ptr();
        unsafe {
            (
                MatMut::from_raw_parts(ptr, i, n, rs, cs),
                MatMut::from_raw_parts(ptr.offset(i as isize * rs), m - i, n, rs, cs),
            )
        }
    }

    /// Splits the matrix into (left, right) halves at the column `j`.
    #[track_caller]
    #[inline]
    pub fn split_at_col(self, j: usize) -> (Self, Self) {
        let (_, _, left, right) = self.split_at(0, j);
        (left, right)
    }

    /// Returns the `nrows×ncols` submatrix starting at position (i, j).
    #[track_caller]
    #[inline]
    pub fn submatrix(self, i: usize, j: usize, nrows: usize, ncols: usize) -> Self {
        fancy_assert!(i <= self.nrows());
        fancy_assert!(j <= self.ncols());
        fancy_assert!(nrows <= self.nrows() - i);
        fancy_assert!(ncols <= self.ncols() - j);
        let rs = self.base.row_stride;
        let cs = self.base.col_stride;
        unsafe {
            MatMut::from_raw_parts(
                self.base
                    .ptr
                    .as_ptr()
                    .offset(i as isize * rs)
                    .offset(j as isize * cs),
                nrows,
                ncols,
                rs,
                cs,
            )
        }
    }

    /// Returns the `nrows` rows starting at row `i`, over all columns.
    #[track_caller]
    #[inline]
    pub fn subrows(self, i: usize, nrows: usize) -> Self {
        let ncols = self.ncols();
        self.submatrix(i, 0, nrows, ncols)
    }

    /// Returns the `ncols` columns starting at column `j`, over all rows.
    #[track_caller]
    #[inline]
    pub fn subcols(self, j: usize, ncols: usize) -> Self {
        let nrows = self.nrows();
        self.submatrix(0, j, nrows, ncols)
    }

    /// Returns the row at index `i` as a mutable row vector view.
    #[track_caller]
    #[inline]
    pub fn row(self, i: usize) -> RowMut<'a, T> {
        fancy_assert!(i < self.nrows());
        RowMut {
            base: VecSliceBase {
                ptr: unsafe {
                    NonNull::new_unchecked(
                        self.base.ptr.as_ptr().offset(i as isize * self.base.row_stride),
                    )
                },
                len: self.ncols(),
                stride: self.base.col_stride,
            },
            _marker: PhantomData,
        }
    }

    /// Returns the column at index `j` as a mutable column vector view.
    #[track_caller]
    #[inline]
    pub fn col(self, j: usize) -> ColMut<'a, T> {
        fancy_assert!(j < self.ncols());
        ColMut {
            base: VecSliceBase {
                ptr: unsafe {
                    NonNull::new_unchecked(
                        self.base.ptr.as_ptr().offset(j as isize * self.base.col_stride),
                    )
                },
                len: self.nrows(),
                stride: self.base.row_stride,
            },
            _marker: PhantomData,
        }
    }

    /// Returns the diagonal of the matrix as a mutable column vector view.
    #[inline]
    pub fn diagonal(self) -> ColMut<'a, T> {
        ColMut {
            base: VecSliceBase {
                ptr: self.base.ptr,
                len: self.nrows().min(self.ncols()),
                stride: self.base.row_stride + self.base.col_stride,
            },
            _marker: PhantomData,
        }
    }

    /// Returns the transpose of the matrix, sharing the backing storage.
    #[inline]
    pub fn transpose(self) -> MatMut<'a, T> {
        MatMut {
            base: MatrixSliceBase {
                ptr: self.base.ptr,
                nrows: self.base.ncols,
                ncols: self.base.nrows,
                row_stride: self.base.col_stride,
                col_stride: self.base.row_stride,
            },
            _marker: PhantomData,
        }
    }

    /// Returns an element-wise kernel builder over this view.
    #[inline]
    pub fn cwise(self) -> zip::CwiseMat<'a, T> {
        zip::CwiseMat { mat: self }
    }
}

impl<'a, T> ColRef<'a, T> {
    /// Returns a column vector view over the given memory region.
    ///
    /// # Safety
    ///
    /// Same contract as [`MatRef::from_raw_parts`].
    #[inline]
    pub unsafe fn from_raw_parts(ptr: *const T, nrows: usize, row_stride: isize) -> Self {
        Self {
            base: VecSliceBase {
                ptr: NonNull::new_unchecked(ptr as *mut T),
                len: nrows,
                stride: row_stride,
            },
            _marker: PhantomData,
        }
    }

    /// Returns the number of rows of the vector.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.base.len
    }

    /// Returns the distance, in elements, between consecutive rows.
    #[inline]
    pub fn row_stride(&self) -> isize {
        self.base.stride
    }

    /// Returns a pointer to the first element of the view.
    #[inline]
    pub fn as_ptr(self) -> *const T {
        self.base.ptr.as_ptr()
    }

    /// Returns a reference to the element at row `i`, with no bound checks.
    ///
    /// # Safety
    ///
    /// Requires `i < self.nrows()`.
    #[inline]
    pub unsafe fn get_unchecked(self, i: usize) -> &'a T {
        fancy_debug_assert!(i < self.nrows());
        &*self.base.ptr.as_ptr().offset(i as isize * self.base.stride)
    }

    /// Returns a reference to the element at row `i`.
    #[track_caller]
    #[inline]
    pub fn get(self, i: usize) -> &'a T {
        fancy_assert!(i < self.nrows());
        unsafe { self.get_unchecked(i) }
    }

    /// Splits the vector into (top, bottom) halves at the row `i`.
    #[track_caller]
    #[inline]
    pub fn split_at(self, i: usize) -> (Self, Self) {
        fancy_assert!(i <= self.nrows());
        unsafe {
            (
                ColRef::from_raw_parts(self.as_ptr(), i, self.base.stride),
                ColRef::from_raw_parts(
                    self.base.ptr.as_ptr().offset(i as isize * self.base.stride),
                    self.base.len - i,
                    self.base.stride,
                ),
            )
        }
    }

    /// Returns the transpose of the vector as a row vector view.
    #[inline]
    pub fn transpose(self) -> RowRef<'a, T> {
        RowRef {
            base: self.base,
            _marker: PhantomData,
        }
    }

    /// Returns a matrix view with a single column over the same data.
    #[inline]
    pub fn as_2d(self) -> MatRef<'a, T> {
        unsafe {
            MatRef::from_raw_parts(self.base.ptr.as_ptr(), self.base.len, 1, self.base.stride, 0)
        }
    }
}

impl<'a, T> ColMut<'a, T> {
    /// Returns a mutable column vector view over the given memory region.
    ///
    /// # Safety
    ///
    /// Same contract as [`MatMut::from_raw_parts`].
    #[inline]
    pub unsafe fn from_raw_parts(ptr: *mut T, nrows: usize, row_stride: isize) -> Self {
        Self {
            base: VecSliceBase {
                ptr: NonNull::new_unchecked(ptr),
                len: nrows,
                stride: row_stride,
            },
            _marker: PhantomData,
        }
    }

    /// Returns the number of rows of the vector.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.base.len
    }

    /// Returns the distance, in elements, between consecutive rows.
    #[inline]
    pub fn row_stride(&self) -> isize {
        self.base.stride
    }

    /// Returns a mutable pointer to the first element of the view.
    #[inline]
    pub fn as_ptr(self) -> *mut T {
        self.base.ptr.as_ptr()
    }

    /// Returns a mutable reference to the element at row `i`, with no bound
    /// checks.
    ///
    /// # Safety
    ///
    /// Requires `i < self.nrows()`.
    #[inline]
    pub unsafe fn get_unchecked(self, i: usize) -> &'a mut T {
        fancy_debug_assert!(i < self.nrows());
        &mut *self.base.ptr.as_ptr().offset(i as isize * self.base.stride)
    }

    /// Returns a mutable reference to the element at row `i`.
    #[track_caller]
    #[inline]
    pub fn get(self, i: usize) -> &'a mut T {
        fancy_assert!(i < self.nrows());
        unsafe { self.get_unchecked(i) }
    }

    /// Splits the vector into (top, bottom) halves at the row `i`.
    #[track_caller]
    #[inline]
    pub fn split_at(self, i: usize) -> (Self, Self) {
        fancy_assert!(i <= self.nrows());
        let stride = self.base.stride;
        let len = self.base.len;
        let ptr = self.base.ptr.as_ptr();
        unsafe {
            (
                ColMut::from_raw_parts(ptr, i, stride),
                ColMut::from_raw_parts(ptr.offset(i as isize * stride), len - i, stride),
            )
        }
    }

    /// Returns the transpose of the vector as a mutable row vector view.
    #[inline]
    pub fn transpose(self) -> RowMut<'a, T> {
        RowMut {
            base: self.base,
            _marker: PhantomData,
        }
    }

    /// Returns a mutable matrix view with a single column over the same data.
    #[inline]
    pub fn as_2d(self) -> MatMut<'a, T> {
        unsafe {
            MatMut::from_raw_parts(self.base.ptr.as_ptr(), self.base.len, 1, self.base.stride, 0)
        }
    }

    /// Returns an element-wise kernel builder over this view.
    #[inline]
    pub fn cwise(self) -> zip::CwiseCol<'a, T> {
        zip::CwiseCol { col: self }
    }
}

impl<'a, T> RowRef<'a, T> {
    /// Returns a row vector view over the given memory region.
    ///
    /// # Safety
    ///
    /// Same contract as [`MatRef::from_raw_parts`].
    #[inline]
    pub unsafe fn from_raw_parts(ptr: *const T, ncols: usize, col_stride: isize) -> Self {
        Self {
            base: VecSliceBase {
                ptr: NonNull::new_unchecked(ptr as *mut T),
                len: ncols,
                stride: col_stride,
            },
            _marker: PhantomData,
        }
    }

    /// Returns the number of columns of the vector.
    #[inline]
    pub fn ncols(&self) -> usize {
        self.base.len
    }

    /// Returns the distance, in elements, between consecutive columns.
    #[inline]
    pub fn col_stride(&self) -> isize {
        self.base.stride
    }

    /// Returns a reference to the element at column `j`, with no bound checks.
    ///
    /// # Safety
    ///
    /// Requires `j < self.ncols()`.
    #[inline]
    pub unsafe fn get_unchecked(self, j: usize) -> &'a T {
        fancy_debug_assert!(j < self.ncols());
        &*self.base.ptr.as_ptr().offset(j as isize * self.base.stride)
    }

    /// Returns a reference to the element at column `j`.
    #[track_caller]
    #[inline]
    pub fn get(self, j: usize) -> &'a T {
        fancy_assert!(j < self.ncols());
        unsafe { self.get_unchecked(j) }
    }

    /// Splits the vector into (left, right) halves at the column `j`.
    #[track_caller]
    #[inline]
    pub fn split_at(self, j: usize) -> (Self, Self) {
        fancy_assert!(j <= self.ncols());
        unsafe {
            (
                RowRef::from_raw_parts(self.base.ptr.as_ptr(), j, self.base.stride),
                RowRef::from_raw_parts(
                    self.base.ptr.as_ptr().offset(j as isize * self.base.stride),
                    self.base.len - j,
                    self.base.stride,
                ),
            )
        }
    }

    /// Returns the transpose of the vector as a column vector view.
    #[inline]
    pub fn transpose(self) -> ColRef<'a, T> {
        ColRef {
            base: self.base,
            _marker: PhantomData,
        }
    }

    /// Returns a matrix view with a single row over the same data.
    #[inline]
    pub fn as_2d(self) -> MatRef<'a, T> {
        unsafe {
            MatRef::from_raw_parts(self.base.ptr.as_ptr(), 1, self.base.len, 0, self.base.stride)
        }
    }
}

impl<'a, T> RowMut<'a, T> {
    /// Returns a mutable row vector view over the given memory region.
    ///
    /// # Safety
    ///
    /// Same contract as [`MatMut::from_raw_parts`].
    #[inline]
    pub unsafe fn from_raw_parts(ptr: *mut T, ncols: usize, col_stride: isize) -> Self {
        Self {
            base: VecSliceBase {
                ptr: NonNull::new_unchecked(ptr),
                len: ncols,
                stride: col_stride,
            },
            _marker: PhantomData,
        }
    }

    /// Returns the number of columns of the vector.
    #[inline]
    pub fn ncols(&self) -> usize {
        self.base.len
    }

    /// Returns the distance, in elements, between consecutive columns.
    #[inline]
    pub fn col_stride(&self) -> isize {
        self.base.stride
    }

    /// Returns a mutable reference to the element at column `j`, with no bound
    /// checks.
    ///
    /// # Safety
    ///
    /// Requires `j < self.ncols()`.
    #[inline]
    pub unsafe fn get_unchecked(self, j: usize) -> &'a mut T {
        fancy_debug_assert!(j < self.ncols());
        &mut *self.base.ptr.as_ptr().offset(j as isize * self.base.stride)
    }

    /// Returns a mutable reference to the element at column `j`.
    #[track_caller]
    #[inline]
    pub fn get(self, j: usize) -> &'a mut T {
        fancy_assert!(j < self.ncols());
        unsafe { self.get_unchecked(j) }
    }

    /// Splits the vector into (left, right) halves at the column `j`.
    #[track_caller]
    #[inline]
    pub fn split_at(self, j: usize) -> (Self, Self) {
        fancy_assert!(j <= self.ncols());
        let stride = self.base.stride;
        let len = self.base.len;
        let ptr = self.base.ptr.as_ptr();
        unsafe {
            (
                RowMut::from_raw_parts(ptr, j, stride),
                RowMut::from_raw_parts(ptr.offset(j as isize * stride), len - j, stride),
            )
        }
    }

    /// Returns the transpose of the vector as a mutable column vector view.
    #[inline]
    pub fn transpose(self) -> ColMut<'a, T> {
        ColMut {
            base: self.base,
            _marker: PhantomData,
        }
    }

    /// Returns a mutable matrix view with a single row over the same data.
    #[inline]
    pub fn as_2d(self) -> MatMut<'a, T> {
        unsafe {
            MatMut::from_raw_parts(self.base.ptr.as_ptr(), 1, self.base.len, 0, self.base.stride)
        }
    }

    /// Returns an element-wise kernel builder over this view.
    #[inline]
    pub fn cwise(self) -> zip::CwiseRow<'a, T> {
        zip::CwiseRow { row: self }
    }
}

impl<'a, T> Index<(usize, usize)> for MatRef<'a, T> {
    type Output = T;

    #[track_caller]
    #[inline]
    fn index(&self, (i, j): (usize, usize)) -> &T {
        self.rb().get(i, j)
    }
}

/// Returns the stack requirement for creating a temporary matrix with the given
/// dimensions, callable before any allocation and with no side effects.
#[inline]
pub fn temp_mat_req<T: 'static>(nrows: usize, ncols: usize) -> Result<StackReq, SizeOverflow> {
    StackReq::try_new::<T>(nrows.checked_mul(ncols).unwrap_or(usize::MAX))
}

/// Carves a zero-initialized `nrows×ncols` matrix out of the workspace arena,
/// returning the matrix and the remainder of the arena.
///
/// The returned matrix borrows its storage from the arena, so its lifetime
/// ends with the current workspace scope.
///
/// # Panics
///
/// Panics if the arena cannot hold the requested matrix (see
/// [`temp_mat_req`]).
pub fn temp_mat_zeroed<'a, T: ComplexField>(
    nrows: usize,
    ncols: usize,
    stack: DynStack<'a>,
) -> (MatMut<'a, T>, DynStack<'a>) {
    let (mut storage, stack) =
        stack.make_aligned_with::<T, _>(nrows * ncols, core::mem::align_of::<T>(), |_| T::zero());
    let ptr = storage.as_mut_ptr();
    core::mem::forget(storage);
    // the carved region stays borrowed for 'a through the returned view
    let mat = unsafe { MatMut::from_raw_parts(ptr, nrows, ncols, 1, nrows as isize) };
    (mat, stack)
}

/// Owning matrix structure, stored in column major format.
#[derive(Clone, Debug)]
pub struct Mat<T> {
    data: Vec<T>,
    nrows: usize,
    ncols: usize,
}

impl<T: ComplexField> Mat<T> {
    /// Returns a new matrix with the given dimensions, with all elements set
    /// to zero.
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            data: vec![T::zero(); nrows.checked_mul(ncols).unwrap()],
            nrows,
            ncols,
        }
    }

    /// Returns a new matrix with the given dimensions, with each element
    /// initialized by the provided function of its (row, column) position.
    pub fn from_fn(nrows: usize, ncols: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(nrows.checked_mul(ncols).unwrap());
        for j in 0..ncols {
            for i in 0..nrows {
                data.push(f(i, j));
            }
        }
        Self { data, nrows, ncols }
    }

    /// Returns the number of rows of the matrix.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Returns the number of columns of the matrix.
    #[inline]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Returns a view over the matrix.
    #[inline]
    pub fn as_ref(&self) -> MatRef<'_, T> {
        unsafe {
            MatRef::from_raw_parts(self.data.as_ptr(), self.nrows, self.ncols, 1, self.nrows as isize)
        }
    }

    /// Returns a mutable view over the matrix.
    #[inline]
    pub fn as_mut(&mut self) -> MatMut<'_, T> {
        unsafe {
            MatMut::from_raw_parts(
                self.data.as_mut_ptr(),
                self.nrows,
                self.ncols,
                1,
                self.nrows as isize,
            )
        }
    }
}

impl<T: ComplexField> Index<(usize, usize)> for Mat<T> {
    type Output = T;

    #[track_caller]
    #[inline]
    fn index(&self, (i, j): (usize, usize)) -> &T {
        self.as_ref().get(i, j)
    }
}

impl<T: ComplexField> IndexMut<(usize, usize)> for Mat<T> {
    #[track_caller]
    #[inline]
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut T {
        self.as_mut().get(i, j)
    }
}
