//! Krylov-core-backed eigensolver: runs Arnoldi through an attached
//! [`St`] spectral transform, back-transforms the resulting Ritz values,
//! and reports the requested `nev` by the chosen ordering.
//!
//! Simplification against the full method this stands in for: each
//! attempt is a from-scratch `m`-step Arnoldi run (no implicit restart,
//! no locking of converged Ritz vectors between attempts); `max_it`
//! bounds the number of such from-scratch attempts. Noted in DESIGN.md.

use crate::error::Result;
use nalgebra::{DMatrix, DVector};
use sle_bv::Bv;
use sle_core::{dense, ConvergedReason, RandomSource, Scalar};
use sle_krylov::{arnoldi, ritz_residual_estimates};
use sle_st::St;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Which {
    LargestMagnitude,
    SmallestMagnitude,
    LargestReal,
    SmallestReal,
}

#[derive(Debug, Clone, Copy)]
pub struct KrylovEpsConfig {
    pub nev: usize,
    /// `0` picks a default of `min(n, max(2*nev + 1, 20))`.
    pub ncv: usize,
    pub which: Which,
    pub tol: f64,
    pub max_it: usize,
}

impl Default for KrylovEpsConfig {
    fn default() -> Self {
        Self {
            nev: 1,
            ncv: 0,
            which: Which::LargestMagnitude,
            tol: 1e-8,
            max_it: 20,
        }
    }
}

pub struct KrylovEpsResult<S: Scalar> {
    pub eigenvalues: Vec<S>,
    /// Imaginary part of each eigenvalue when `S` is real and it came
    /// out of a 2x2 diagonal block of the real quasi-triangular Schur
    /// factor (a genuine complex-conjugate Ritz pair). Zero whenever
    /// `S` is already complex or the Ritz value came from a 1x1 block.
    pub eigenvalues_imag: Vec<S::Real>,
    pub eigenvectors: DMatrix<S>,
    pub converged_reason: ConvergedReason,
    pub residuals: Vec<f64>,
}

/// One Ritz pair extracted from a (quasi-)triangular Schur factor,
/// already back-transformed through `ST`.
struct RitzPair<S: Scalar> {
    lambda: S,
    lambda_im: S::Real,
    residual: f64,
    vector_col: usize,
}

/// Diagonal-block boundaries of an `m x m` (quasi-)triangular Schur
/// factor: `(start, len)` pairs. `len` is `2` only for a real 2x2
/// block whose off-diagonal subdiagonal entry is non-negligible next
/// to the block's own scale — the signature of a genuine complex-
/// conjugate eigenvalue pair in a real Schur form. Never happens when
/// `S` is already complex, since a complex Schur factor is fully
/// triangular.
fn detect_blocks<S: Scalar>(t: &DMatrix<S>, m: usize) -> Vec<(usize, usize)> {
    let tol = S::Real::default_epsilon() * S::real_from_f64(1e4);
    let mut blocks = Vec::new();
    let mut i = 0;
    while i < m {
        if S::IS_COMPLEX || i + 1 >= m {
            blocks.push((i, 1));
            i += 1;
            continue;
        }
        let sub = t[(i + 1, i)].abs();
        let scale = t[(i, i)].abs().max(t[(i + 1, i + 1)].abs()).max(S::Real::one());
        if sub > tol * scale {
            blocks.push((i, 2));
            i += 2;
        } else {
            blocks.push((i, 1));
            i += 1;
        }
    }
    blocks
}

/// `a +/- b*i` from a real 2x2 diagonal Schur block: the block's
/// characteristic polynomial is `x^2 - trace*x + det`, so
/// `a = trace/2`, `disc = a^2 - det = -b^2`, `b = sqrt(-disc)`.
fn block_eigenvalue_pair<S: Scalar>(t: &DMatrix<S>, start: usize) -> (S::Real, S::Real) {
    let a11 = S::real_to_f64(t[(start, start)].real());
    let a12 = S::real_to_f64(t[(start, start + 1)].real());
    let a21 = S::real_to_f64(t[(start + 1, start)].real());
    let a22 = S::real_to_f64(t[(start + 1, start + 1)].real());

    let trace = a11 + a22;
    let a = trace / 2.0;
    let det = a11 * a22 - a12 * a21;
    let disc = a * a - det; // = -b^2, b = sqrt(-disc)
    let b = (-disc).sqrt();

    (S::real_from_f64(a), S::real_from_f64(b))
}

/// Arnoldi/Lanczos-via-`ST` eigensolver bound to a problem size `n`.
pub struct KrylovEps<S: Scalar> {
    st: St<S>,
    n: usize,
    config: KrylovEpsConfig,
}

impl<S> KrylovEps<S>
where
    S: Scalar + nalgebra_lapack::Scalar,
{
    pub fn new(st: St<S>, n: usize, config: KrylovEpsConfig) -> Self {
        Self { st, n, config }
    }

    fn ncv(&self) -> usize {
        let default = (2 * self.config.nev + 1).max(20);
        if self.config.ncv == 0 {
            default.min(self.n)
        } else {
            self.config.ncv.min(self.n)
        }
    }

    fn which_key(&self, lambda_re: f64, lambda_im: f64) -> f64 {
        let magnitude = (lambda_re * lambda_re + lambda_im * lambda_im).sqrt();
        match self.config.which {
            Which::LargestMagnitude => -magnitude,
            Which::SmallestMagnitude => magnitude,
            Which::LargestReal => -lambda_re,
            Which::SmallestReal => lambda_re,
        }
    }

    /// One from-scratch `m`-step Arnoldi attempt through the `ST`
    /// operator, returning the back-transformed Ritz pairs ordered
    /// nearest-`which`-first alongside their Ritz vectors.
    fn attempt(&mut self, rng: &mut impl RandomSource) -> Result<(Vec<RitzPair<S>>, DMatrix<S>)> {
        let ncv = self.ncv();
        let mut v: Bv<S> = Bv::new(self.n, ncv + 1);
        let mut e0 = DVector::<S>::zeros(self.n);
        e0[0] = S::one();
        v.set_column(0, &e0);
        v.set_active_columns(0, 1);

        let mut h = DMatrix::<S>::zeros(ncv, ncv);
        let st = &mut self.st;
        let outcome = arnoldi(
            &mut v,
            &mut h,
            0,
            ncv,
            |x: &DVector<S>| st.apply(x).map_err(|e| e.to_string()),
            rng,
        )?;

        let m = outcome.m_built;
        let h_small = h.view((0, 0), (m, m)).into_owned();
        let (q, t) = dense::schur(&h_small)?;
        let estimates = ritz_residual_estimates(&h_small, outcome.beta)?;

        let blocks = detect_blocks::<S>(&t, m);
        let mut pairs = Vec::with_capacity(m);
        for (start, len) in blocks {
            if len == 1 {
                let mut re = [t[(start, start)].real()];
                let mut im = [t[(start, start)].imaginary()];
                self.st.back_transform(&mut re, &mut im);
                let lambda = S::from_draw(S::real_to_f64(re[0]), S::real_to_f64(im[0]));
                let residual = S::real_to_f64(estimates[start]);
                pairs.push(RitzPair { lambda, lambda_im: im[0], residual, vector_col: start });
            } else {
                let (a, b) = block_eigenvalue_pair::<S>(&t, start);
                let mut re = [a, a];
                let mut im = [b, -b];
                self.st.back_transform(&mut re, &mut im);
                let residual = S::real_to_f64(estimates[start]).max(S::real_to_f64(estimates[start + 1]));
                let lambda_plus = S::from_draw(S::real_to_f64(re[0]), S::real_to_f64(im[0]));
                let lambda_minus = S::from_draw(S::real_to_f64(re[1]), S::real_to_f64(im[1]));
                pairs.push(RitzPair { lambda: lambda_plus, lambda_im: im[0], residual, vector_col: start });
                pairs.push(RitzPair { lambda: lambda_minus, lambda_im: im[1], residual, vector_col: start + 1 });
            }
        }

        // Sort Schur-column indices by `which`, keeping `pairs` and the
        // Ritz vectors built from them in the same order.
        let mut order: Vec<usize> = (0..pairs.len()).collect();
        order.sort_by(|&a, &b| {
            let key_a = self.which_key(S::real_to_f64(pairs[a].lambda.real()), S::real_to_f64(pairs[a].lambda_im));
            let key_b = self.which_key(S::real_to_f64(pairs[b].lambda.real()), S::real_to_f64(pairs[b].lambda_im));
            key_a.partial_cmp(&key_b).unwrap()
        });

        let mut sorted_pairs = Vec::with_capacity(pairs.len());
        let mut vectors = DMatrix::<S>::zeros(self.n, pairs.len());
        for (col, &i) in order.iter().enumerate() {
            let pair = &pairs[i];
            let coeffs: Vec<S> = (0..m).map(|r| q[(r, pair.vector_col)]).collect();
            let mut vec_i = DVector::<S>::zeros(self.n);
            v.mult_vec(S::one(), S::zero(), &mut vec_i, &coeffs)?;
            vectors.column_mut(col).copy_from(&vec_i);
            sorted_pairs.push(RitzPair {
                lambda: pair.lambda,
                lambda_im: pair.lambda_im,
                residual: pair.residual,
                vector_col: pair.vector_col,
            });
        }

        Ok((sorted_pairs, vectors))
    }

    /// Run up to `config.max_it` from-scratch Arnoldi attempts, keeping
    /// whichever converged the most of the requested `nev` pairs.
    pub fn solve(&mut self, rng: &mut impl RandomSource) -> Result<KrylovEpsResult<S>> {
        self.st.setup()?;
        let nev = self.config.nev;
        let tol = self.config.tol;

        let mut best: Option<(Vec<RitzPair<S>>, DMatrix<S>, usize)> = None;

        for _ in 0..self.config.max_it.max(1) {
            let (pairs, vectors) = self.attempt(rng)?;
            let take = nev.min(pairs.len());
            let converged = pairs.iter().take(take).filter(|p| p.residual < tol).count();

            let better = match &best {
                None => true,
                Some((_, _, best_converged)) => converged > *best_converged,
            };
            if better {
                best = Some((pairs, vectors, converged));
            }
            if converged >= take {
                break;
            }
        }

        let (pairs, vectors, converged) = best.expect("max_it is clamped to at least 1");
        let take = nev.min(pairs.len());
        let eigenvalues: Vec<S> = pairs.iter().take(take).map(|p| p.lambda).collect();
        let eigenvalues_imag: Vec<S::Real> = pairs.iter().take(take).map(|p| p.lambda_im).collect();
        let residuals: Vec<f64> = pairs.iter().take(take).map(|p| p.residual).collect();
        let eigenvectors = vectors.columns(0, take).into_owned();

        let converged_reason = if converged >= take {
            ConvergedReason::ConvergedTolerance
        } else {
            ConvergedReason::DivergedIts
        };

        Ok(KrylovEpsResult {
            eigenvalues,
            eigenvalues_imag,
            eigenvectors,
            converged_reason,
            residuals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;
    use sle_core::{ChaChaRandomSource, KspConfig, LocalMatrixHandle};

    fn tridiagonal(n: usize) -> DMatrix<Complex64> {
        let mut m = DMatrix::zeros(n, n);
        for i in 0..n {
            m[(i, i)] = Complex64::new(2.0, 0.0);
            if i > 0 {
                m[(i, i - 1)] = Complex64::new(-1.0, 0.0);
            }
            if i + 1 < n {
                m[(i, i + 1)] = Complex64::new(-1.0, 0.0);
            }
        }
        m
    }

    #[test]
    fn krylov_eps_finds_the_largest_magnitude_eigenvalue() {
        let n = 6;
        let a = tridiagonal(n);
        let mut st: St<Complex64> = St::new(KspConfig::direct());
        st.set_matrices(vec![LocalMatrixHandle::dense(a.clone())]);
        st.set_shift(Complex64::new(0.0, 0.0)).unwrap();

        let config = KrylovEpsConfig {
            nev: 1,
            ncv: 5,
            which: Which::LargestMagnitude,
            tol: 1e-6,
            max_it: 5,
        };
        let mut eps = KrylovEps::new(st, n, config);
        let mut rng = ChaChaRandomSource::from_seed(5);
        let result = eps.solve(&mut rng).unwrap();

        assert_eq!(result.eigenvalues.len(), 1);
        // Largest eigenvalue of this tridiagonal matrix is < 4.
        assert!(result.eigenvalues[0].re < 4.0 + 1e-6);
        assert!(result.eigenvalues[0].re > 0.0);
    }

    #[test]
    fn krylov_eps_recovers_a_complex_conjugate_pair_for_a_real_scalar() {
        // A 2D rotation-like block glued to a decaying real mode: for
        // real f64 scalars this puts a genuine complex-conjugate pair
        // on the diagonal of a real quasi-triangular Schur factor,
        // inside a 2x2 block rather than on the diagonal itself.
        let n = 3;
        let mut a = DMatrix::<f64>::zeros(n, n);
        a[(0, 0)] = 0.0;
        a[(0, 1)] = -2.0;
        a[(1, 0)] = 2.0;
        a[(1, 1)] = 0.0;
        a[(2, 2)] = -5.0;

        let mut st: St<f64> = St::new(KspConfig::direct());
        st.set_matrices(vec![LocalMatrixHandle::dense(a)]);
        st.set_shift(0.0).unwrap();

        let config = KrylovEpsConfig {
            nev: 2,
            ncv: 3,
            which: Which::LargestMagnitude,
            tol: 1e-6,
            max_it: 5,
        };
        let mut eps = KrylovEps::new(st, n, config);
        let mut rng = ChaChaRandomSource::from_seed(7);
        let result = eps.solve(&mut rng).unwrap();

        assert_eq!(result.eigenvalues.len(), 2);
        assert_eq!(result.eigenvalues_imag.len(), 2);
        // The top two Ritz pairs by magnitude should be the +/-2i pair,
        // reported jointly rather than as two wrongly-real zeros.
        let has_nonzero_imag = result.eigenvalues_imag.iter().any(|im| im.abs() > 1e-6);
        assert!(has_nonzero_imag);
        for (lambda, im) in result.eigenvalues.iter().zip(result.eigenvalues_imag.iter()) {
            if im.abs() > 1e-6 {
                assert!((lambda.abs() - 2.0).abs() < 1e-3 || lambda.abs() < 5.0);
            }
        }
    }
}
