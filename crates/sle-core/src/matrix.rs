//! Matrix contract (§6) plus the local dense/sparse implementation used
//! throughout this workspace's tests.
//!
//! The real substrate this core is meant to sit on top of is a
//! distributed sparse matrix type (out of scope, §1); `LocalMatrix` is
//! the single-rank stand-in that makes the rest of the crate buildable
//! and testable, following the same "trait + concrete backend" split the
//! host project uses in `backend::traits` / `backend::native`.

use crate::scalar::Scalar;
use crate::vector::{LocalVector, NormType};
use nalgebra::DMatrix;
use nalgebra_sparse::CsrMatrix;

/// Hint about how the sparsity pattern of one matrix relates to another,
/// passed to `axpy` so an implementation can skip re-deriving a union
/// pattern when it already knows the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureHint {
    Same,
    Subset,
    Different,
    Unknown,
}

/// The opaque parallel sparse-or-dense matrix contract (§3/§6).
///
/// Every implementation carries a generation counter, bumped on every
/// mutating call, so callers (notably `ST`) can detect external
/// mutation by comparing a stored snapshot against the current value.
pub trait Matrix<S: Scalar> {
    type Vec: crate::vector::Vector<S>;

    fn nrows(&self) -> usize;
    fn ncols(&self) -> usize;

    /// `y := self * x`
    fn mult(&self, x: &Self::Vec, y: &mut Self::Vec);
    /// `y := self^H * x`
    fn mult_transpose(&self, x: &Self::Vec, y: &mut Self::Vec);

    /// `self += alpha * other`, given a hint about how `other`'s sparsity
    /// pattern relates to `self`'s.
    fn axpy(&mut self, alpha: S, other: &Self, hint: StructureHint);

    /// `self += alpha * I`
    fn shift(&mut self, alpha: S);

    fn duplicate(&self) -> Self;
    fn copy_from(&mut self, other: &Self);

    fn norm(&self, kind: NormType) -> S::Real;

    /// Generation counter: strictly increases on every mutating call.
    fn state(&self) -> u64;

    fn is_hermitian_known(&self) -> Option<bool>;
}

/// A local (single-rank) sparse-or-dense matrix over `nalgebra`/
/// `nalgebra-sparse`.
#[derive(Debug, Clone)]
pub enum LocalMatrix<S: Scalar> {
    Dense(DMatrix<S>),
    Sparse(CsrMatrix<S>),
}

#[derive(Debug, Clone)]
pub struct LocalMatrixHandle<S: Scalar> {
    data: LocalMatrix<S>,
    generation: u64,
    hermitian_known: Option<bool>,
}

impl<S: Scalar> LocalMatrixHandle<S> {
    pub fn dense(m: DMatrix<S>) -> Self {
        Self {
            data: LocalMatrix::Dense(m),
            generation: 0,
            hermitian_known: None,
        }
    }

    pub fn sparse(m: CsrMatrix<S>) -> Self {
        Self {
            data: LocalMatrix::Sparse(m),
            generation: 0,
            hermitian_known: None,
        }
    }

    pub fn set_hermitian_known(&mut self, known: bool) {
        self.hermitian_known = Some(known);
    }

    pub fn as_dense(&self) -> DMatrix<S> {
        match &self.data {
            LocalMatrix::Dense(m) => m.clone(),
            LocalMatrix::Sparse(m) => dense_from_csr(m),
        }
    }

    fn bump(&mut self) {
        self.generation += 1;
    }
}

fn dense_from_csr<S: Scalar>(m: &CsrMatrix<S>) -> DMatrix<S> {
    let mut out = DMatrix::zeros(m.nrows(), m.ncols());
    for (r, c, v) in m.triplet_iter() {
        out[(r, c)] = *v;
    }
    out
}

impl<S: Scalar> Matrix<S> for LocalMatrixHandle<S> {
    type Vec = LocalVector<S>;

    fn nrows(&self) -> usize {
        match &self.data {
            LocalMatrix::Dense(m) => m.nrows(),
            LocalMatrix::Sparse(m) => m.nrows(),
        }
    }

    fn ncols(&self) -> usize {
        match &self.data {
            LocalMatrix::Dense(m) => m.ncols(),
            LocalMatrix::Sparse(m) => m.ncols(),
        }
    }

    fn mult(&self, x: &Self::Vec, y: &mut Self::Vec) {
        match &self.data {
            LocalMatrix::Dense(m) => {
                *y.as_dvector_mut() = m * x.as_dvector();
            }
            LocalMatrix::Sparse(m) => {
                *y.as_dvector_mut() = m * x.as_dvector();
            }
        }
    }

    fn mult_transpose(&self, x: &Self::Vec, y: &mut Self::Vec) {
        match &self.data {
            LocalMatrix::Dense(m) => {
                *y.as_dvector_mut() = m.adjoint() * x.as_dvector();
            }
            LocalMatrix::Sparse(m) => {
                let dense = dense_from_csr(m);
                *y.as_dvector_mut() = dense.adjoint() * x.as_dvector();
            }
        }
    }

    fn axpy(&mut self, alpha: S, other: &Self, _hint: StructureHint) {
        let lhs = self.as_dense();
        let rhs = other.as_dense();
        self.data = LocalMatrix::Dense(lhs + rhs * alpha);
        self.bump();
    }

    fn shift(&mut self, alpha: S) {
        let mut dense = self.as_dense();
        let n = dense.nrows().min(dense.ncols());
        for i in 0..n {
            dense[(i, i)] += alpha;
        }
        self.data = LocalMatrix::Dense(dense);
        self.bump();
    }

    fn duplicate(&self) -> Self {
        self.clone()
    }

    fn copy_from(&mut self, other: &Self) {
        self.data = other.data.clone();
        self.hermitian_known = other.hermitian_known;
        self.bump();
    }

    fn norm(&self, kind: NormType) -> S::Real {
        let dense = self.as_dense();
        match kind {
            NormType::Frobenius => dense.norm(),
            NormType::Two => dense.norm(),
            NormType::Infinity => {
                let mut max_row_sum = S::Real::zero();
                for r in 0..dense.nrows() {
                    let mut row_sum = S::Real::zero();
                    for c in 0..dense.ncols() {
                        row_sum += dense[(r, c)].abs();
                    }
                    if row_sum > max_row_sum {
                        max_row_sum = row_sum;
                    }
                }
                max_row_sum
            }
        }
    }

    fn state(&self) -> u64 {
        self.generation
    }

    fn is_hermitian_known(&self) -> Option<bool> {
        self.hermitian_known
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mult_matches_hand_computation() {
        let m = LocalMatrixHandle::dense(DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 3.0]));
        let x = LocalVector::from_vec(vec![1.0, 1.0]);
        let mut y = LocalVector::zeros(2);
        m.mult(&x, &mut y);
        assert_eq!(y.as_dvector().as_slice(), &[2.0, 3.0]);
    }

    #[test]
    fn shift_bumps_generation_and_diagonal() {
        let mut m = LocalMatrixHandle::dense(DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1.0]));
        let gen0 = m.state();
        m.shift(3.0);
        assert_eq!(m.as_dense()[(0, 0)], 4.0);
        assert_eq!(m.as_dense()[(1, 1)], 4.0);
        assert!(m.state() > gen0);
    }

    #[test]
    fn axpy_adds_scaled_matrix() {
        let mut a = LocalMatrixHandle::dense(DMatrix::identity(2, 2));
        let b = LocalMatrixHandle::dense(DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]));
        a.axpy(2.0, &b, StructureHint::Unknown);
        assert_eq!(a.as_dense(), DMatrix::from_row_slice(2, 2, &[3.0, 4.0, 6.0, 9.0]));
    }
}
