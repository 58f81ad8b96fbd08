//! Cyclic Hermitian-embedding SVD/GSVD: builds `C = [[0, A], [A^H, 0]]`
//! (and, for the generalized problem, the pencil `(C, D)` with
//! `D = diag(I_m, B^H B)`), hands it to a dense Hermitian eigensolver,
//! and recovers singular triplets from the positive eigenvalues.

use crate::error::{Result, SvdError};
use nalgebra::DMatrix;
use sle_core::{dense, LocalMatrixHandle, Matrix, NormType, Scalar};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Which {
    Largest,
    Smallest,
}

#[derive(Debug, Clone, Copy)]
pub struct CyclicSvdConfig {
    pub nsv: usize,
    pub which: Which,
    pub tol: f64,
    /// When set, the registered convergence test divides residual
    /// estimates by `max(‖A‖_inf, ‖B‖_inf)` rather than using a raw
    /// absolute tolerance.
    pub norm_relative: bool,
}

impl Default for CyclicSvdConfig {
    fn default() -> Self {
        Self { nsv: 1, which: Which::Largest, tol: 1e-8, norm_relative: true }
    }
}

pub struct SvdResult<S: Scalar> {
    pub singular_values: Vec<S::Real>,
    pub u: DMatrix<S>,
    pub v: DMatrix<S>,
}

/// One cyclic SVD instance, either standard (`B = None`) or generalized.
pub struct CyclicSvd<S: Scalar> {
    a: LocalMatrixHandle<S>,
    b: Option<LocalMatrixHandle<S>>,
    config: CyclicSvdConfig,
}

impl<S> CyclicSvd<S>
where
    S: Scalar + nalgebra_lapack::Scalar,
{
    pub fn new(a: LocalMatrixHandle<S>, b: Option<LocalMatrixHandle<S>>, config: CyclicSvdConfig) -> Self {
        Self { a, b, config }
    }

    /// The scale a norm-relative convergence test divides residuals by.
    pub fn residual_scale(&self) -> S::Real {
        let a_norm = self.a.norm(NormType::Infinity);
        let b_norm = self
            .b
            .as_ref()
            .map(|b| b.norm(NormType::Infinity))
            .unwrap_or(S::Real::zero());
        if a_norm > b_norm { a_norm } else { b_norm }
    }

    fn build_c(&self) -> DMatrix<S> {
        let a = self.a.as_dense();
        let (m, n) = (a.nrows(), a.ncols());
        let mut c = DMatrix::<S>::zeros(m + n, m + n);
        c.view_mut((0, m), (m, n)).copy_from(&a);
        c.view_mut((m, 0), (n, m)).copy_from(&a.adjoint());
        c
    }

    /// `D = diag(I_m, B^H B)`; `None` (identity) for the standard problem.
    fn build_d(&self, m: usize, n: usize) -> Option<DMatrix<S>> {
        let b = self.b.as_ref()?;
        let bd = b.as_dense();
        let mut d = DMatrix::<S>::identity(m + n, m + n);
        let gram = bd.adjoint() * &bd;
        d.view_mut((m, m), (n, n)).copy_from(&gram);
        Some(d)
    }

    /// `C' = [[0, B], [B^H, 0]]`, the alternate pencil used to recover
    /// the smallest generalized singular values accurately.
    fn build_c_prime(&self) -> DMatrix<S> {
        let bd = self.b.as_ref().expect("reciprocal pencil requires B").as_dense();
        let (p, n) = (bd.nrows(), bd.ncols());
        let mut c = DMatrix::<S>::zeros(p + n, p + n);
        c.view_mut((0, p), (p, n)).copy_from(&bd);
        c.view_mut((p, 0), (n, p)).copy_from(&bd.adjoint());
        c
    }

    /// `D' = diag(I_p, A^H A)`, paired with `C'` above.
    fn build_d_prime(&self, p: usize, n: usize) -> DMatrix<S> {
        let a = self.a.as_dense();
        let mut d = DMatrix::<S>::identity(p + n, p + n);
        let gram = a.adjoint() * &a;
        d.view_mut((p, p), (n, n)).copy_from(&gram);
        d
    }

    /// Run the cyclic solve and recover up to `config.nsv` triplets.
    pub fn solve(&mut self) -> Result<SvdResult<S>> {
        // The primary pencil `(C, D)` loses accuracy for the smallest
        // generalized singular values near `sigma ~ 0`, since they sit
        // at the bottom of `D^{-1}C`'s spectrum where rounding error is
        // largest. The alternate pencil `(C', D')` puts the same values
        // at the top of its spectrum instead (`sigma' = 1/sigma`), so
        // only the generalized + Smallest combination needs it; the
        // standard problem's Smallest case has no such pencil swap and
        // stays on the primary path.
        if self.b.is_some() && self.config.which == Which::Smallest {
            return self.solve_reciprocal_pencil();
        }
        self.solve_primary_pencil()
    }

    fn solve_primary_pencil(&mut self) -> Result<SvdResult<S>> {
        let a = self.a.as_dense();
        let (m, n) = (a.nrows(), a.ncols());
        let c = self.build_c();

        let (eigenvalues, eigenvectors, d) = match self.build_d(m, n) {
            None => {
                let (lambda, q) = dense::symmetric_eig(&c)?;
                (lambda.iter().map(|&r| S::from_real_part(r)).collect::<Vec<S>>(), q, None)
            }
            Some(d) => {
                // Generalized pencil (C, D): the same dense-inverse +
                // Schur approach used by CISS's Rayleigh-Ritz step,
                // rather than routing through a dedicated GHEP solver.
                let d_inv = dense::invert(&d)?;
                let c_gen = d_inv * &c;
                let (q, t) = dense::schur(&c_gen)?;
                let lambda: Vec<S> = (0..t.nrows()).map(|i| t[(i, i)]).collect();
                (lambda, q, Some(d))
            }
        };

        let mut triplets: Vec<(S::Real, DMatrix<S>)> = Vec::new();
        for (i, &lambda) in eigenvalues.iter().enumerate() {
            let sigma = lambda.real();
            if sigma <= S::Real::zero() {
                continue;
            }
            let mut x = eigenvectors.column(i).into_owned();
            let norm_d_sq = match &d {
                Some(d) => (x.adjoint() * d * &x)[(0, 0)].real(),
                None => (x.adjoint() * &x)[(0, 0)].real(),
            };
            if norm_d_sq <= S::Real::zero() {
                continue;
            }
            let scale = S::from_real_part(S::Real::one() / norm_d_sq.sqrt());
            x *= scale;
            triplets.push((sigma, x));
        }

        match self.config.which {
            Which::Largest => triplets.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap()),
            Which::Smallest => triplets.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap()),
        }

        let take = self.config.nsv.min(triplets.len());
        if take < self.config.nsv {
            return Err(SvdError::NotEnoughTriplets {
                requested: self.config.nsv,
                available: triplets.len(),
            });
        }

        let sqrt2 = S::from_real_part(S::real_from_f64(2.0).sqrt());
        let mut singular_values = Vec::with_capacity(take);
        let mut u = DMatrix::<S>::zeros(m, take);
        let mut v = DMatrix::<S>::zeros(n, take);
        for (col, (sigma, x)) in triplets.into_iter().take(take).enumerate() {
            singular_values.push(sigma);
            u.column_mut(col).copy_from(&(x.rows(0, m) * sqrt2));
            v.column_mut(col).copy_from(&(x.rows(m, n) * sqrt2));
        }

        Ok(SvdResult { singular_values, u, v })
    }

    /// Generalized + `Which::Smallest`: solve the alternate pencil
    /// `(C', D')` instead of `(C, D)` and report `1/mu` for each
    /// positive eigenvalue `mu`, recovering the smallest generalized
    /// singular values from the top of this pencil's spectrum rather
    /// than the numerically unreliable bottom of the primary one.
    fn solve_reciprocal_pencil(&mut self) -> Result<SvdResult<S>> {
        let a = self.a.as_dense();
        let (m, n) = (a.nrows(), a.ncols());
        let p = self.b.as_ref().expect("dispatch only calls this when B is set").as_dense().nrows();

        let c = self.build_c_prime();
        let d = self.build_d_prime(p, n);

        let d_inv = dense::invert(&d)?;
        let c_gen = d_inv * &c;
        let (q, t) = dense::schur(&c_gen)?;

        let mut triplets: Vec<(S::Real, DMatrix<S>)> = Vec::new();
        for i in 0..t.nrows() {
            let mu = t[(i, i)].real();
            if mu <= S::Real::zero() {
                continue;
            }
            let mut w = q.column(i).into_owned();
            let norm_d_sq = (w.adjoint() * &d * &w)[(0, 0)].real();
            if norm_d_sq <= S::Real::zero() {
                continue;
            }
            let scale = S::from_real_part(S::Real::one() / norm_d_sq.sqrt());
            w *= scale;
            triplets.push((S::Real::one() / mu, w));
        }

        triplets.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());

        let take = self.config.nsv.min(triplets.len());
        if take < self.config.nsv {
            return Err(SvdError::NotEnoughTriplets {
                requested: self.config.nsv,
                available: triplets.len(),
            });
        }

        let sqrt2 = S::from_real_part(S::real_from_f64(2.0).sqrt());
        let mut singular_values = Vec::with_capacity(take);
        let mut u = DMatrix::<S>::zeros(m, take);
        let mut v = DMatrix::<S>::zeros(n, take);
        for (col, (sigma, w)) in triplets.into_iter().take(take).enumerate() {
            singular_values.push(sigma);
            // `w = [w1; w2]` over the `(p, n)` split of `C'`; the
            // singular vector pair comes from the bottom `n`-block
            // `w2`, with `u` recovered by an explicit `A * w2` rather
            // than the top block of `C'`'s own eigenvector (which
            // lives in `B`'s range, not `A`'s).
            let w2 = w.rows(p, n).into_owned() * sqrt2;
            let mut u_col = &a * &w2;
            let u_norm = u_col.norm();
            if u_norm > S::Real::zero() {
                u_col *= S::from_real_part(S::Real::one() / u_norm);
            }
            u.column_mut(col).copy_from(&u_col);
            v.column_mut(col).copy_from(&w2);
        }

        Ok(SvdResult { singular_values, u, v })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    fn diag_rect(values: &[f64], m: usize, n: usize) -> DMatrix<f64> {
        let mut a = DMatrix::zeros(m, n);
        for (i, &v) in values.iter().enumerate() {
            a[(i, i)] = v;
        }
        a
    }

    #[test]
    fn standard_svd_recovers_diagonal_singular_values() {
        let a = diag_rect(&[3.0, 1.0], 2, 2);
        let config = CyclicSvdConfig { nsv: 2, which: Which::Largest, ..Default::default() };
        let mut svd = CyclicSvd::new(LocalMatrixHandle::dense(a), None, config);
        let result = svd.solve().unwrap();

        assert_eq!(result.singular_values.len(), 2);
        assert!((result.singular_values[0] - 3.0).abs() < 1e-8);
        assert!((result.singular_values[1] - 1.0).abs() < 1e-8);
    }

    #[test]
    fn smallest_which_returns_ascending_order() {
        let a = diag_rect(&[5.0, 2.0, 7.0], 3, 3);
        let config = CyclicSvdConfig { nsv: 1, which: Which::Smallest, ..Default::default() };
        let mut svd = CyclicSvd::new(LocalMatrixHandle::dense(a), None, config);
        let result = svd.solve().unwrap();

        assert!((result.singular_values[0] - 2.0).abs() < 1e-8);
    }

    #[test]
    fn requesting_more_triplets_than_exist_is_an_error() {
        let a = diag_rect(&[1.0], 1, 1);
        let config = CyclicSvdConfig { nsv: 5, ..Default::default() };
        let mut svd = CyclicSvd::new(LocalMatrixHandle::dense(a), None, config);
        assert!(matches!(svd.solve(), Err(SvdError::NotEnoughTriplets { .. })));
    }

    #[test]
    fn generalized_smallest_uses_the_reciprocal_pencil() {
        // Diagonal A/B: generalized singular values are the plain
        // ratios a_i/b_i, so this is hand-checkable without the
        // reciprocal pencil's machinery: 3/1 = 3, 1/1 = 1, smallest = 1.
        let a = diag_rect(&[3.0, 1.0], 2, 2);
        let b = diag_rect(&[1.0, 1.0], 2, 2);
        let config = CyclicSvdConfig { nsv: 1, which: Which::Smallest, ..Default::default() };
        let mut svd = CyclicSvd::new(LocalMatrixHandle::dense(a), Some(LocalMatrixHandle::dense(b)), config);
        let result = svd.solve().unwrap();

        assert_eq!(result.singular_values.len(), 1);
        assert!((result.singular_values[0] - 1.0).abs() < 1e-6);
    }
}
