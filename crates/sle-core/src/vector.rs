//! Vector contract (§6) plus the local dense implementation used
//! throughout this workspace's tests.

use crate::scalar::Scalar;
use nalgebra::DVector;

/// Norm kind requested of a `Vector` or of a `BV` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormType {
    Two,
    Infinity,
    Frobenius,
}

/// The distributed dense vector contract every solver component
/// consumes. The local implementation ([`LocalVector`]) happens to be
/// un-distributed (one rank owns the whole vector), but the contract is
/// written as if it might not be, per §6.
pub trait Vector<S: Scalar>: Clone {
    fn local_len(&self) -> usize;
    fn set(&mut self, value: S);
    fn scale(&mut self, alpha: S);
    /// `self <- self + alpha * other`
    fn axpy(&mut self, alpha: S, other: &Self);
    fn dot(&self, other: &Self) -> S;
    /// Column-wise dot against a slice of basis vectors, one all-reduce.
    fn m_dot(&self, others: &[Self]) -> Vec<S>;
    fn norm(&self, kind: NormType) -> S::Real;
    fn pointwise_mult(&mut self, other: &Self);

    /// Scoped, read-only access to the underlying buffer — stands in for
    /// `getArray`/`restoreArray`, with release guaranteed by the closure
    /// returning rather than by a paired call the caller must remember.
    fn with_array<R>(&self, f: impl FnOnce(&[S]) -> R) -> R;

    /// Scoped, mutable access to the underlying buffer — stands in for
    /// `placeArray`: the caller borrows an existing buffer and it is
    /// released (here: simply goes out of scope) when `f` returns.
    fn with_array_mut<R>(&mut self, f: impl FnOnce(&mut [S]) -> R) -> R;
}

/// A local (single-rank) dense vector over `nalgebra::DVector`.
#[derive(Debug, Clone)]
pub struct LocalVector<S: Scalar> {
    data: DVector<S>,
}

impl<S: Scalar> LocalVector<S> {
    pub fn zeros(n: usize) -> Self {
        Self {
            data: DVector::zeros(n),
        }
    }

    pub fn from_vec(values: Vec<S>) -> Self {
        Self {
            data: DVector::from_vec(values),
        }
    }

    pub fn as_dvector(&self) -> &DVector<S> {
        &self.data
    }

    pub fn as_dvector_mut(&mut self) -> &mut DVector<S> {
        &mut self.data
    }
}

impl<S: Scalar> Vector<S> for LocalVector<S> {
    fn local_len(&self) -> usize {
        self.data.len()
    }

    fn set(&mut self, value: S) {
        self.data.fill(value);
    }

    fn scale(&mut self, alpha: S) {
        self.data.scale_mut(alpha);
    }

    fn axpy(&mut self, alpha: S, other: &Self) {
        self.data.axpy(alpha, &other.data, S::one());
    }

    fn dot(&self, other: &Self) -> S {
        self.data.dotc(&other.data)
    }

    fn m_dot(&self, others: &[Self]) -> Vec<S> {
        others.iter().map(|o| self.dot(o)).collect()
    }

    fn norm(&self, kind: NormType) -> S::Real {
        match kind {
            NormType::Two | NormType::Frobenius => self.data.norm(),
            NormType::Infinity => self.data.amax(),
        }
    }

    fn pointwise_mult(&mut self, other: &Self) {
        self.data.component_mul_assign(&other.data);
    }

    fn with_array<R>(&self, f: impl FnOnce(&[S]) -> R) -> R {
        f(self.data.as_slice())
    }

    fn with_array_mut<R>(&mut self, f: impl FnOnce(&mut [S]) -> R) -> R {
        f(self.data.as_mut_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axpy_matches_hand_computation() {
        let mut a = LocalVector::from_vec(vec![1.0, 2.0, 3.0]);
        let b = LocalVector::from_vec(vec![1.0, 1.0, 1.0]);
        a.axpy(2.0, &b);
        assert_eq!(a.as_dvector().as_slice(), &[3.0, 4.0, 5.0]);
    }

    #[test]
    fn dot_of_orthogonal_unit_vectors_is_zero() {
        let a = LocalVector::from_vec(vec![1.0, 0.0]);
        let b = LocalVector::from_vec(vec![0.0, 1.0]);
        assert_eq!(a.dot(&b), 0.0);
    }

    #[test]
    fn with_array_mut_writes_are_visible_after_scope() {
        let mut v = LocalVector::<f64>::zeros(3);
        v.with_array_mut(|arr| arr[1] = 5.0);
        assert_eq!(v.as_dvector()[1], 5.0);
    }
}
