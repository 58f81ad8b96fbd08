//! Block basis-vector container: the column-oriented block every solver
//! in this workspace stores its working subspace in.

use crate::error::{BvError, Result};
use nalgebra::DMatrix;
use sle_core::{CoreError, NormType, RandomSource, Scalar};

/// Classical vs. modified Gram-Schmidt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrthogType {
    Cgs,
    Mgs,
}

/// Iterative-refinement policy for one orthogonalization step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefineType {
    Never,
    IfNeeded,
    Always,
}

#[derive(Debug, Clone, Copy)]
pub struct OrthogPolicy {
    pub kind: OrthogType,
    pub refine: RefineType,
    /// Refinement trigger ratio `eta`, in `(0, 1]`.
    pub eta: f64,
    /// If `false` (the default), a non-positive inner product under a
    /// `B`-inner product raises [`BvError`]'s `IndefiniteInner`. If
    /// `true`, the BV is allowed to represent an indefinite inner
    /// product space and `norm` instead returns `sqrt(|value|)`.
    pub allow_indefinite: bool,
}

impl Default for OrthogPolicy {
    fn default() -> Self {
        Self {
            kind: OrthogType::Cgs,
            refine: RefineType::IfNeeded,
            eta: 0.7071, // 1/sqrt(2), SLEPc's default trigger ratio
            allow_indefinite: false,
        }
    }
}

/// Column borrowed out via [`Bv::get_column`]; writing to `data` and
/// passing the handle back to [`Bv::restore_column`] commits the change.
pub struct BvColumnHandle<S: Scalar> {
    index: usize,
    pub data: nalgebra::DVector<S>,
}

impl<S: Scalar> BvColumnHandle<S> {
    pub fn index(&self) -> usize {
        self.index
    }
}

/// A block of `m` columns of length `n`, with a locked/active/inactive
/// window split, an optional `B`-inner product, and a cached `B * X`
/// buffer for the active columns.
pub struct Bv<S: Scalar> {
    n: usize,
    columns: DMatrix<S>,
    l: usize,
    k: usize,
    b: Option<DMatrix<S>>,
    cached_bx: Option<DMatrix<S>>,
    cache_valid: bool,
    policy: OrthogPolicy,
    borrowed: Vec<usize>,
    breakdown_tol: S::Real,
}

impl<S: Scalar> Bv<S> {
    pub fn new(n: usize, m: usize) -> Self {
        Self {
            n,
            columns: DMatrix::zeros(n, m),
            l: 0,
            k: m,
            b: None,
            cached_bx: None,
            cache_valid: false,
            policy: OrthogPolicy::default(),
            borrowed: Vec::new(),
            breakdown_tol: {
                let mut ten = S::Real::zero();
                for _ in 0..10 {
                    ten += S::Real::one();
                }
                S::Real::default_epsilon() * ten
            },
        }
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn m(&self) -> usize {
        self.columns.ncols()
    }

    pub fn l(&self) -> usize {
        self.l
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn set_active_columns(&mut self, l: usize, k: usize) {
        self.l = l;
        self.k = k;
        self.cache_valid = false;
    }

    pub fn set_policy(&mut self, policy: OrthogPolicy) {
        self.policy = policy;
    }

    pub fn policy(&self) -> OrthogPolicy {
        self.policy
    }

    /// Install the (Hermitian, positive-definite-by-convention) matrix
    /// defining the non-standard inner product `<x, y>_B = y^H B x`.
    pub fn set_inner_product_matrix(&mut self, b: Option<DMatrix<S>>) {
        self.b = b;
        self.cache_valid = false;
    }

    pub fn column_view(&self, j: usize) -> nalgebra::DVectorView<'_, S> {
        self.columns.column(j)
    }

    pub fn set_column(&mut self, j: usize, data: &nalgebra::DVector<S>) {
        self.columns.column_mut(j).copy_from(data);
        self.cache_valid = false;
    }

    /// Borrow column `j` for read/write. At most two columns may be
    /// borrowed simultaneously (invariant (i) of §3).
    pub fn get_column(&mut self, j: usize) -> Result<BvColumnHandle<S>> {
        if self.borrowed.contains(&j) {
            return Err(BvError::Core(CoreError::ColumnAlreadyBorrowed(j)));
        }
        if self.borrowed.len() >= 2 {
            return Err(BvError::TooManyBorrows);
        }
        self.borrowed.push(j);
        Ok(BvColumnHandle {
            index: j,
            data: self.columns.column(j).into_owned(),
        })
    }

    /// Write the (possibly modified) borrowed column back and release
    /// the borrow. `index_hint` must match the handle's own index
    /// (invariant (ii) of §3); passing a handle for the wrong column is
    /// an invariant violation, not recoverable at this layer.
    pub fn restore_column(&mut self, handle: BvColumnHandle<S>) -> Result<()> {
        let pos = self
            .borrowed
            .iter()
            .position(|&idx| idx == handle.index)
            .ok_or(CoreError::RestoreMismatch {
                borrowed: self.borrowed.first().copied().unwrap_or(usize::MAX),
                requested: handle.index,
            })?;
        self.borrowed.remove(pos);
        self.columns.column_mut(handle.index).copy_from(&handle.data);
        self.cache_valid = false;
        Ok(())
    }

    /// `Y <- beta*Y + alpha * X * Q`, `X != Y`, leading columns of `Y`
    /// untouched.
    pub fn mult(&mut self, alpha: S, beta: S, x: &Bv<S>, q: &DMatrix<S>) -> Result<()> {
        let kx = x.k - x.l;
        let ky = self.k - self.l;
        if q.nrows() != kx || q.ncols() != ky {
            return Err(BvError::Core(CoreError::SizeMismatch(format!(
                "mult: Q is {}x{}, expected {}x{}",
                q.nrows(),
                q.ncols(),
                kx,
                ky
            ))));
        }
        let x_active = x.columns.columns(x.l, kx);
        let contribution = x_active * q * alpha;
        let mut y_active = self.columns.columns_mut(self.l, ky);
        for c in 0..ky {
            for r in 0..self.n {
                y_active[(r, c)] = y_active[(r, c)] * beta + contribution[(r, c)];
            }
        }
        self.cache_valid = false;
        Ok(())
    }

    /// `V[:, s:e) <- V[:, s:e) * Q[:, s:e)`, overwriting in place.
    pub fn mult_in_place(&mut self, q: &DMatrix<S>, s: usize, e: usize) -> Result<()> {
        let width = e - s;
        if q.nrows() != width {
            return Err(BvError::Core(CoreError::SizeMismatch(
                "mult_in_place: Q row count must match the column range width".to_string(),
            )));
        }
        let block = self.columns.columns(s, width).clone_owned();
        let updated = block * q;
        self.columns.columns_mut(s, width).copy_from(&updated);
        self.cache_valid = false;
        Ok(())
    }

    /// `y <- beta*y + alpha * X * q`, with `q` a length `k-l` scalar
    /// slice.
    pub fn mult_vec(&self, alpha: S, beta: S, y: &mut nalgebra::DVector<S>, q: &[S]) -> Result<()> {
        let width = self.k - self.l;
        if q.len() != width {
            return Err(BvError::Core(CoreError::SizeMismatch(
                "mult_vec: q length must equal the active window width".to_string(),
            )));
        }
        let qv = nalgebra::DVector::from_row_slice(q);
        let contribution = self.columns.columns(self.l, width) * qv * alpha;
        for r in 0..self.n {
            y[r] = y[r] * beta + contribution[r];
        }
        Ok(())
    }

    fn refresh_cache(&mut self) {
        if self.cache_valid {
            return;
        }
        if let Some(b) = &self.b {
            let width = self.k - self.l;
            let active = self.columns.columns(self.l, width);
            self.cached_bx = Some(b * active);
        } else {
            self.cached_bx = None;
        }
        self.cache_valid = true;
    }

    /// Read back the cached `B * X` buffer (only meaningful when a `B`
    /// inner-product matrix is set).
    pub fn cached_bx(&mut self) -> Option<&DMatrix<S>> {
        self.refresh_cache();
        self.cached_bx.as_ref()
    }

    fn b_or_identity_times_active(&mut self) -> DMatrix<S> {
        self.refresh_cache();
        match &self.cached_bx {
            Some(bx) => bx.clone(),
            None => self.columns.columns(self.l, self.k - self.l).clone_owned(),
        }
    }

    /// `M <- Y^H * (B * X)` (or `Y^H * X` if `X`'s `B` is unset),
    /// written into rows `[l(Y), k(Y))` x columns `[l(X), k(X))` of `m`.
    pub fn dot(&mut self, y: &Bv<S>, out: &mut DMatrix<S>) -> Result<()> {
        let bx = self.b_or_identity_times_active();
        let y_width = y.k - y.l;
        let x_width = self.k - self.l;
        if out.nrows() < y.k || out.ncols() < self.k {
            return Err(BvError::Core(CoreError::SizeMismatch(
                "dot: output matrix too small for the active windows".to_string(),
            )));
        }
        let y_active = y.columns.columns(y.l, y_width);
        let block = y_active.adjoint() * bx;
        for r in 0..y_width {
            for c in 0..x_width {
                out[(y.l + r, self.l + c)] = block[(r, c)];
            }
        }
        Ok(())
    }

    /// Column dots of the active window against a single vector.
    pub fn dot_vec(&mut self, y: &nalgebra::DVector<S>) -> Vec<S> {
        let bx = self.b_or_identity_times_active();
        (0..bx.ncols())
            .map(|c| {
                let mut acc = S::zero();
                for r in 0..bx.nrows() {
                    acc += y[r].conjugate() * bx[(r, c)];
                }
                acc
            })
            .collect()
    }

    /// Vector norm of column `j` (under `B` if set), or the Frobenius
    /// norm of the whole active window if `j` is `None`.
    pub fn norm(&mut self, j: Option<usize>, kind: NormType) -> Result<S::Real> {
        match j {
            None => {
                let width = self.k - self.l;
                let active = self.columns.columns(self.l, width);
                match kind {
                    NormType::Frobenius | NormType::Two => Ok(active.norm()),
                    NormType::Infinity => {
                        let mut m = S::Real::zero();
                        for c in 0..active.ncols() {
                            for r in 0..active.nrows() {
                                let v = active[(r, c)].abs();
                                if v > m {
                                    m = v;
                                }
                            }
                        }
                        Ok(m)
                    }
                }
            }
            Some(j) => {
                if j < self.l || j >= self.k {
                    return Err(BvError::IndexOutOfWindow(j));
                }
                let col = self.columns.column(j);
                if let Some(b) = &self.b {
                    let bv = b * col;
                    let mut ip = S::zero();
                    for r in 0..col.nrows() {
                        ip += col[r].conjugate() * bv[r];
                    }
                    let re = ip.real();
                    if re <= S::Real::zero() && !self.policy.allow_indefinite {
                        return Err(BvError::Core(CoreError::IndefiniteInner));
                    }
                    Ok(re.abs().sqrt())
                } else {
                    Ok(col.norm())
                }
            }
        }
    }

    /// Fill column `j` with reproducible pseudo-random values.
    pub fn set_random(&mut self, j: usize, rng: &mut impl RandomSource) {
        for r in 0..self.n {
            self.columns[(r, j)] = sle_core::next_scalar::<S>(rng);
        }
        self.cache_valid = false;
    }

    /// Orthogonalize column `j` against `[0, j)`, returning `(beta,
    /// lindep)`. On linear dependence, if `replace` is set the column is
    /// reseeded from `rng` and the attempt is retried once.
    pub fn orthonormalize_column(
        &mut self,
        j: usize,
        replace: bool,
        rng: &mut impl RandomSource,
        coeffs_out: Option<&mut [S]>,
    ) -> Result<(S::Real, bool)> {
        let (mut beta, mut lindep) = self.orthogonalize_column_once(j, coeffs_out)?;

        let needs_refine = match self.policy.refine {
            RefineType::Never => false,
            RefineType::Always => true,
            RefineType::IfNeeded => {
                let prev = self.columns.column(j).norm();
                beta < nalgebra::convert::<f64, S::Real>(self.policy.eta) * prev
            }
        };
        if needs_refine && !lindep {
            let (b2, l2) = self.orthogonalize_column_once(j, None)?;
            beta = b2;
            lindep = l2;
        }

        if lindep && replace {
            self.set_random(j, rng);
            let (b2, l2) = self.orthogonalize_column_once(j, None)?;
            beta = b2;
            lindep = l2;
        }

        if !lindep && beta > S::Real::zero() {
            let mut col = self.columns.column_mut(j);
            col /= S::from_real_part(beta);
        }
        self.cache_valid = false;
        Ok((beta, lindep))
    }

    fn orthogonalize_column_once(
        &mut self,
        j: usize,
        mut coeffs_out: Option<&mut [S]>,
    ) -> Result<(S::Real, bool)> {
        let init_norm = self.columns.column(j).norm();

        match self.policy.kind {
            OrthogType::Cgs => {
                let prev = self.columns.columns(0, j).clone_owned();
                let v = self.columns.column(j).clone_owned();
                let h = match &self.b {
                    Some(b) => prev.adjoint() * (b * &v),
                    None => prev.adjoint() * &v,
                };
                let correction = &prev * &h;
                let mut col = self.columns.column_mut(j);
                col -= correction;
                if let Some(out) = coeffs_out.as_deref_mut() {
                    for i in 0..j.min(out.len()) {
                        out[i] = h[i];
                    }
                }
            }
            OrthogType::Mgs => {
                for i in 0..j {
                    let prev_col = self.columns.column(i).clone_owned();
                    let v = self.columns.column(j).clone_owned();
                    let h = match &self.b {
                        Some(b) => prev_col.dotc(&(b * &v)),
                        None => prev_col.dotc(&v),
                    };
                    let mut col = self.columns.column_mut(j);
                    col.axpy(-h, &prev_col, S::one());
                    if let Some(out) = coeffs_out.as_deref_mut() {
                        if i < out.len() {
                            out[i] = h;
                        }
                    }
                }
            }
        }

        let new_norm = if let Some(b) = &self.b {
            let v = self.columns.column(j).clone_owned();
            let bv = b * &v;
            let mut ip = S::zero();
            for r in 0..v.nrows() {
                ip += v[r].conjugate() * bv[r];
            }
            ip.real().abs().sqrt()
        } else {
            self.columns.column(j).norm()
        };

        let lindep = new_norm < self.breakdown_tol * init_norm.max(S::Real::one());
        Ok((new_norm, lindep))
    }

    /// Block QR over the active window: orthonormalize every column in
    /// order, filling the upper triangle of `r_out` (size `(k-l)x(k-l)`)
    /// with the accumulated coefficients.
    pub fn orthogonalize(&mut self, rng: &mut impl RandomSource, r_out: &mut DMatrix<S>) -> Result<()> {
        let width = self.k - self.l;
        if r_out.nrows() != width || r_out.ncols() != width {
            return Err(BvError::Core(CoreError::SizeMismatch(
                "orthogonalize: R must be (k-l) x (k-l)".to_string(),
            )));
        }
        for jj in 0..width {
            let j = self.l + jj;
            let mut coeffs = vec![S::zero(); j];
            let (beta, _lindep) = self.orthonormalize_column(j, true, rng, Some(&mut coeffs))?;
            for (i, c) in coeffs.iter().enumerate() {
                if i >= self.l && i - self.l < width {
                    r_out[(i - self.l, jj)] = *c;
                }
            }
            r_out[(jj, jj)] = S::from_real_part(beta);
        }
        self.refresh_cache();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sle_core::ChaChaRandomSource;

    fn laplacian_1d(n: usize) -> DMatrix<f64> {
        let mut m = DMatrix::zeros(n, n);
        for i in 0..n {
            m[(i, i)] = 2.0;
            if i > 0 {
                m[(i, i - 1)] = -1.0;
            }
            if i + 1 < n {
                m[(i, i + 1)] = -1.0;
            }
        }
        m
    }

    #[test]
    fn empty_active_window_is_a_no_op() {
        let mut bv: Bv<f64> = Bv::new(5, 3);
        bv.set_active_columns(1, 1);
        let mut r = DMatrix::zeros(0, 0);
        let mut rng = ChaChaRandomSource::from_seed(1);
        assert!(bv.orthogonalize(&mut rng, &mut r).is_ok());
    }

    #[test]
    fn orthogonalize_produces_orthonormal_columns_identity_inner_product() {
        let n = 20;
        let k = 8;
        let mut bv: Bv<f64> = Bv::new(n, k);
        for j in 0..k {
            for i in 0..n {
                let val = (3.0 * (i as f64) + (j as f64) - 2.0) / (2.0 * ((i + j + 1) as f64));
                bv.columns[(i, j)] = val;
            }
        }
        bv.set_active_columns(0, k);
        let mut r = DMatrix::zeros(k, k);
        let mut rng = ChaChaRandomSource::from_seed(1);
        bv.orthogonalize(&mut rng, &mut r).unwrap();

        let q = bv.columns.clone();
        let gram = q.adjoint() * &q;
        let id = DMatrix::<f64>::identity(k, k);
        assert!((gram - id).norm() < 1e-8);
    }

    #[test]
    fn orthogonalize_respects_nonstandard_inner_product() {
        let n = 20;
        let k = 8;
        let b = laplacian_1d(n);
        let mut bv: Bv<f64> = Bv::new(n, k);
        for j in 0..k {
            for i in 0..n {
                let val = (3.0 * (i as f64) + (j as f64) - 2.0) / (2.0 * ((i + j + 1) as f64));
                bv.columns[(i, j)] = val;
            }
        }
        bv.set_active_columns(0, k);
        bv.set_inner_product_matrix(Some(b.clone()));
        let mut r = DMatrix::zeros(k, k);
        let mut rng = ChaChaRandomSource::from_seed(2);
        bv.orthogonalize(&mut rng, &mut r).unwrap();

        let q = bv.columns.clone();
        let gram = q.adjoint() * (&b * &q);
        let id = DMatrix::<f64>::identity(k, k);
        assert!((gram - id).norm() < 1e-6);
    }

    #[test]
    fn get_column_then_get_again_is_rejected() {
        let mut bv: Bv<f64> = Bv::new(4, 2);
        let _h = bv.get_column(0).unwrap();
        assert!(bv.get_column(0).is_err());
    }

    #[test]
    fn a_third_simultaneous_borrow_is_rejected() {
        let mut bv: Bv<f64> = Bv::new(4, 3);
        let _a = bv.get_column(0).unwrap();
        let _b = bv.get_column(1).unwrap();
        assert!(bv.get_column(2).is_err());
    }

    #[test]
    fn restore_writes_modified_column_back() {
        let mut bv: Bv<f64> = Bv::new(3, 1);
        let mut h = bv.get_column(0).unwrap();
        h.data[1] = 9.0;
        bv.restore_column(h).unwrap();
        assert_eq!(bv.column_view(0)[1], 9.0);
    }
}
