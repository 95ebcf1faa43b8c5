//! The Cholesky decomposition of a Hermitian positive definite matrix $A$ is
//! such that:
//! $$A = LL^H,$$
//! where $L$ is a lower triangular matrix, or equivalently $A = U^H U$ with
//! $U$ upper triangular when the upper half of $A$ is the one stored.

#![warn(rust_2018_idioms)]

pub mod llt;
