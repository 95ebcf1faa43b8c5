//! The LU decomposition with partial pivoting of a matrix $A$ is such that:
//! $$PA = LU,$$
//! where $P$ is a permutation matrix, $L$ is unit lower trapezoidal and $U$
//! is upper trapezoidal.

#![warn(rust_2018_idioms)]

pub mod partial_pivoting;
