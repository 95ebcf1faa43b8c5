pub mod compute;
pub mod reconstruct;

#[cfg(test)]
mod tests {
    use super::compute::*;
    use super::reconstruct::*;
    use dyn_stack::DynStack;
    use faktor_core::{
        c64,
        norm::{triangular_norm, Diag, Norm},
        ComplexField, Mat, Parallelism, Uplo,
    };
    use rand::prelude::*;
    use std::cell::RefCell;

    thread_local! {
        static RNG: RefCell<StdRng> = RefCell::new(StdRng::seed_from_u64(0));
    }

    fn random_f64() -> f64 {
        RNG.with(|rng| rng.borrow_mut().gen())
    }

    const VARIANTS: [(CholeskyVariant, usize); 10] = [
        (CholeskyVariant::Blocked, 1),
        (CholeskyVariant::Blocked, 2),
        (CholeskyVariant::Blocked, 7),
        (CholeskyVariant::Blocked, 10),
        (CholeskyVariant::RightLooking, 1),
        (CholeskyVariant::RightLooking, 2),
        (CholeskyVariant::RightLooking, 7),
        (CholeskyVariant::RightLooking, 10),
        (CholeskyVariant::Recursive, 1),
        (CholeskyVariant::Level2, 1),
    ];

    /// Random diagonally dominant symmetric matrix, with the half opposite to
    /// `uplo` poisoned so that any out-of-policy access shows up in the
    /// results.
    fn random_spd(n: usize, uplo: Uplo) -> Mat<f64> {
        let base = Mat::from_fn(n, n, |_, _| random_f64());
        Mat::from_fn(n, n, |i, j| {
            let stored = match uplo {
                Uplo::Lower => i >= j,
                Uplo::Upper => i <= j,
            };
            if !stored {
                f64::NAN
            } else if i == j {
                base[(i, i)] + n as f64
            } else {
                let (lo, hi) = if i < j { (i, j) } else { (j, i) };
                base[(lo, hi)]
            }
        })
    }

    fn factor_error(uplo: Uplo, original: &Mat<f64>, factor: &Mat<f64>) -> f64 {
        let n = original.nrows();
        let mut reconstructed = Mat::zeros(n, n);
        reconstruct(
            uplo,
            reconstructed.as_mut(),
            factor.as_ref(),
            Parallelism::None,
        );

        let diff = Mat::from_fn(n, n, |i, j| {
            let stored = match uplo {
                Uplo::Lower => i >= j,
                Uplo::Upper => i <= j,
            };
            if stored {
                reconstructed[(i, j)] - original[(i, j)]
            } else {
                0.0
            }
        });
        let norm_orig = triangular_norm(Norm::Max, uplo, Diag::NonUnit, original.as_ref());
        triangular_norm(Norm::Max, uplo, Diag::NonUnit, diff.as_ref()) / norm_orig
    }

    #[test]
    fn test_roundtrip() {
        for n in [1, 2, 10, 19, 30, 64] {
            for uplo in [Uplo::Lower, Uplo::Upper] {
                for (variant, blocksize) in VARIANTS {
                    let a = random_spd(n, uplo);
                    let mut factor = a.clone();

                    cholesky_in_place(
                        uplo,
                        factor.as_mut(),
                        Parallelism::None,
                        DynStack::new(&mut []),
                        CholeskyParams { variant, blocksize },
                    )
                    .unwrap();

                    let tol = 50.0 * (n as f64) * f64::EPSILON;
                    let err = factor_error(uplo, &a, &factor);
                    assert!(
                        err <= tol,
                        "n={n} uplo={uplo:?} variant={variant:?} nb={blocksize} err={err:e}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_roundtrip_complex() {
        let n = 25;
        for uplo in [Uplo::Lower, Uplo::Upper] {
            let base = Mat::from_fn(n, n, |_, _| c64::new(random_f64(), random_f64()));
            // Hermitian with a dominant real diagonal (the off-diagonal
            // magnitudes reach √2, hence the 2n shift); only the selected
            // half is read by the factorization
            let a = Mat::from_fn(n, n, |i, j| {
                if i == j {
                    c64::new(base[(i, i)].re + 2.0 * n as f64, 0.0)
                } else if i < j {
                    base[(i, j)]
                } else {
                    base[(j, i)].conj()
                }
            });

            for (variant, blocksize) in VARIANTS {
                let mut factor = a.clone();
                cholesky_in_place(
                    uplo,
                    factor.as_mut(),
                    Parallelism::None,
                    DynStack::new(&mut []),
                    CholeskyParams { variant, blocksize },
                )
                .unwrap();

                let mut reconstructed = Mat::zeros(n, n);
                reconstruct(
                    uplo,
                    reconstructed.as_mut(),
                    factor.as_ref(),
                    Parallelism::None,
                );

                let tol = 50.0 * (n as f64) * f64::EPSILON;
                for i in 0..n {
                    for j in 0..n {
                        let stored = match uplo {
                            Uplo::Lower => i >= j,
                            Uplo::Upper => i <= j,
                        };
                        if stored {
                            let diff = (reconstructed[(i, j)] - a[(i, j)]).abs();
                            assert!(
                                diff <= tol * (n as f64),
                                "variant={variant:?} i={i} j={j} diff={diff:e}"
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_variants_agree() {
        let n = 37;
        for uplo in [Uplo::Lower, Uplo::Upper] {
            let a = random_spd(n, uplo);

            let mut results = Vec::new();
            for (variant, blocksize) in VARIANTS {
                let mut factor = a.clone();
                cholesky_in_place(
                    uplo,
                    factor.as_mut(),
                    Parallelism::None,
                    DynStack::new(&mut []),
                    CholeskyParams { variant, blocksize },
                )
                .unwrap();
                results.push(factor);
            }

            let reference = &results[0];
            for factor in &results[1..] {
                for i in 0..n {
                    for j in 0..n {
                        let stored = match uplo {
                            Uplo::Lower => i >= j,
                            Uplo::Upper => i <= j,
                        };
                        if stored {
                            let diff = (factor[(i, j)] - reference[(i, j)]).abs();
                            assert!(diff <= 1e-11, "uplo={uplo:?} i={i} j={j} diff={diff:e}");
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_upper_factor_is_adjoint_of_lower() {
        let n = 21;
        let lower_input = random_spd(n, Uplo::Lower);
        // the same symmetric matrix, stored in the other half
        let upper_input = Mat::from_fn(n, n, |i, j| {
            if i <= j {
                lower_input[(j, i)]
            } else {
                f64::NAN
            }
        });

        let mut l = lower_input.clone();
        cholesky_in_place(
            Uplo::Lower,
            l.as_mut(),
            Parallelism::None,
            DynStack::new(&mut []),
            CholeskyParams::default(),
        )
        .unwrap();

        let mut u = upper_input.clone();
        cholesky_in_place(
            Uplo::Upper,
            u.as_mut(),
            Parallelism::None,
            DynStack::new(&mut []),
            CholeskyParams::default(),
        )
        .unwrap();

        for i in 0..n {
            for j in 0..=i {
                let diff = (l[(i, j)] - u[(j, i)]).abs();
                assert!(diff <= 1e-12, "i={i} j={j} diff={diff:e}");
            }
        }
    }

    #[test]
    fn test_not_positive_definite_reports_step() {
        let n = 26;
        let failing = 11;

        for uplo in [Uplo::Lower, Uplo::Upper] {
            let mut a = random_spd(n, uplo);
            a[(failing, failing)] = -1000.0;

            for (variant, blocksize) in VARIANTS {
                let mut factor = a.clone();
                let err = cholesky_in_place(
                    uplo,
                    factor.as_mut(),
                    Parallelism::None,
                    DynStack::new(&mut []),
                    CholeskyParams { variant, blocksize },
                )
                .unwrap_err();

                // every variant detects the failure at the same step
                assert_eq!(err.index, failing + 1, "variant={variant:?}");
            }

            // the leading block is left correctly factored
            let mut factor = a.clone();
            let _ = cholesky_in_place(
                uplo,
                factor.as_mut(),
                Parallelism::None,
                DynStack::new(&mut []),
                CholeskyParams {
                    variant: CholeskyVariant::Level2,
                    blocksize: 1,
                },
            )
            .unwrap_err();

            let mut leading = Mat::from_fn(failing, failing, |i, j| a[(i, j)]);
            cholesky_in_place(
                uplo,
                leading.as_mut(),
                Parallelism::None,
                DynStack::new(&mut []),
                CholeskyParams::default(),
            )
            .unwrap();

            for i in 0..failing {
                for j in 0..failing {
                    let stored = match uplo {
                        Uplo::Lower => i >= j,
                        Uplo::Upper => i <= j,
                    };
                    if stored {
                        let diff = (factor[(i, j)] - leading[(i, j)]).abs();
                        assert!(diff <= 1e-12, "uplo={uplo:?} i={i} j={j} diff={diff:e}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_quick_return() {
        for (variant, blocksize) in VARIANTS {
            let mut a = Mat::<f64>::zeros(0, 0);
            cholesky_in_place(
                Uplo::Lower,
                a.as_mut(),
                Parallelism::None,
                DynStack::new(&mut []),
                CholeskyParams { variant, blocksize },
            )
            .unwrap();
        }
    }

    #[test]
    fn test_workspace_query_is_empty() {
        // no variant needs scratch storage, so sizing a buffer from the query
        // and passing an empty stack must both work
        for (variant, blocksize) in VARIANTS {
            let req =
                cholesky_in_place_req::<f64>(64, Parallelism::None, CholeskyParams { variant, blocksize })
                    .unwrap();
            assert_eq!(req.size_bytes(), 0);
        }
    }
}
