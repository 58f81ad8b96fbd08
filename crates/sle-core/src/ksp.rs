//! Linear-solver (KSP-equivalent) handle contract, a native direct-solve
//! backend, and a feature-gated stub documenting the parallel backend.
//!
//! Grounded directly in the host project's `backend` module: the same
//! trait / native-impl / feature-gated-external-impl split, the same
//! plain string-wrapping `BackendError`, and the same preset-constructor
//! style for configuration (`KspConfig::direct()` etc. mirror
//! `KspConfig::cg_icc()` / `KspConfig::direct_mumps()`).

use crate::matrix::LocalMatrixHandle;
use crate::scalar::Scalar;
use crate::vector::LocalVector;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Error type for backend (KSP) operations. Kept as a plain
/// string-wrapping struct — like the host project's
/// `backend::traits::BackendError` — because this boundary crosses into
/// an external solver library whose own error type we cannot model
/// structurally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError(pub String);

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BackendError {}

impl From<&str> for BackendError {
    fn from(s: &str) -> Self {
        BackendError(s.to_string())
    }
}

impl From<String> for BackendError {
    fn from(s: String) -> Self {
        BackendError(s)
    }
}

/// Iterative solver family (mirrors PETSc's `KSPType` naming, since a
/// real parallel backend would need to pick one).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KspType {
    Cg,
    Gmres,
    BiCgStab,
    PreOnly,
}

impl Default for KspType {
    fn default() -> Self {
        KspType::Gmres
    }
}

/// Configuration for the linear-solver handle attached to an `ST`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KspConfig {
    pub solver_type: KspType,
    pub relative_tol: f64,
    pub absolute_tol: f64,
    pub max_iterations: usize,
}

impl Default for KspConfig {
    fn default() -> Self {
        Self {
            solver_type: KspType::PreOnly,
            relative_tol: 1e-10,
            absolute_tol: 1e-50,
            max_iterations: 1000,
        }
    }
}

impl KspConfig {
    /// Direct factorization (`PREONLY`), the default used by `ST`'s
    /// shift-and-invert since the factorization is reused for every
    /// `apply` call.
    pub fn direct() -> Self {
        Self {
            solver_type: KspType::PreOnly,
            max_iterations: 1,
            ..Default::default()
        }
    }

    pub fn gmres(relative_tol: f64) -> Self {
        Self {
            solver_type: KspType::Gmres,
            relative_tol,
            ..Default::default()
        }
    }
}

/// Diagnostic info returned alongside a solve.
#[derive(Debug, Clone)]
pub struct SolveInfo {
    pub iterations: usize,
    pub residual_norm: Option<f64>,
    pub solver_name: String,
}

/// The KSP-equivalent linear-solver handle contract (§6/GLOSSARY).
///
/// `set_operators` binds the operator `A` and the preconditioning
/// matrix `P` (which may be the same object); `setup` performs the
/// factorization; `solve` may be called many times against the same
/// factorization (this is exactly what `ST::apply` relies on).
pub trait LinearSolver<S: Scalar> {
    fn set_operators(&mut self, a: &LocalMatrixHandle<S>, p: &LocalMatrixHandle<S>);
    fn setup(&mut self) -> Result<(), BackendError>;
    fn solve(&mut self, b: &LocalVector<S>, x: &mut LocalVector<S>) -> Result<SolveInfo, BackendError>;
    fn name(&self) -> &str;
}

/// Native direct-solve backend: dense LU via `nalgebra`.
///
/// Suitable for the small-to-medium dense/sparse-reconstructed-to-dense
/// problems this workspace's local substrate targets; a real
/// large-scale deployment would swap in a parallel sparse-direct or
/// preconditioned-iterative backend behind the same trait (see
/// [`ParallelKsp`] below).
pub struct NativeKsp<S: Scalar> {
    config: KspConfig,
    factored: Option<DMatrix<S>>,
}

impl<S: Scalar> NativeKsp<S> {
    pub fn new(config: KspConfig) -> Self {
        Self {
            config,
            factored: None,
        }
    }
}

impl<S: Scalar> LinearSolver<S> for NativeKsp<S> {
    fn set_operators(&mut self, a: &LocalMatrixHandle<S>, _p: &LocalMatrixHandle<S>) {
        self.factored = Some(a.as_dense());
    }

    fn setup(&mut self) -> Result<(), BackendError> {
        if self.factored.is_none() {
            return Err(BackendError("set_operators must be called before setup".into()));
        }
        Ok(())
    }

    fn solve(&mut self, b: &LocalVector<S>, x: &mut LocalVector<S>) -> Result<SolveInfo, BackendError> {
        let a = self
            .factored
            .as_ref()
            .ok_or_else(|| BackendError("KSP not set up".to_string()))?;
        let lu = a.clone().lu();
        let solution = lu
            .solve(b.as_dvector())
            .ok_or_else(|| BackendError("singular matrix in LU decomposition".to_string()))?;
        *x.as_dvector_mut() = solution;
        Ok(SolveInfo {
            iterations: 1,
            residual_norm: None,
            solver_name: "native-LU".to_string(),
        })
    }

    fn name(&self) -> &str {
        match self.config.solver_type {
            KspType::PreOnly => "native-LU",
            _ => "native-LU (iterative types fall back to direct solve locally)",
        }
    }
}

/// Feature-gated stub for a real MPI-parallel KSP backend.
///
/// Not implemented — no FFI is vendored in this workspace. This mirrors
/// the host project's own `backend::petsc` module: the trait impl
/// exists so call sites type-check against the same `LinearSolver`
/// contract, but every method documents the real integration point
/// instead of doing the work.
#[cfg(feature = "mpi")]
pub struct ParallelKsp {
    config: KspConfig,
}

#[cfg(feature = "mpi")]
impl ParallelKsp {
    pub fn new(config: KspConfig) -> Self {
        Self { config }
    }
}

#[cfg(feature = "mpi")]
impl<S: Scalar> LinearSolver<S> for ParallelKsp {
    fn set_operators(&mut self, _a: &LocalMatrixHandle<S>, _p: &LocalMatrixHandle<S>) {
        // A real implementation would hand the distributed matrix handles
        // to e.g. `KSPSetOperators`.
    }

    fn setup(&mut self) -> Result<(), BackendError> {
        Err(BackendError(
            "parallel KSP backend not implemented; no MPI/PETSc FFI is vendored in this workspace".into(),
        ))
    }

    fn solve(&mut self, _b: &LocalVector<S>, _x: &mut LocalVector<S>) -> Result<SolveInfo, BackendError> {
        Err(BackendError("parallel KSP backend not implemented".into()))
    }

    fn name(&self) -> &str {
        "parallel (unimplemented)"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    #[test]
    fn native_ksp_solves_diagonal_system() {
        let a = LocalMatrixHandle::dense(DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 3.0]));
        let mut ksp = NativeKsp::new(KspConfig::direct());
        ksp.set_operators(&a, &a);
        ksp.setup().unwrap();
        let b = LocalVector::from_vec(vec![4.0, 9.0]);
        let mut x = LocalVector::zeros(2);
        ksp.solve(&b, &mut x).unwrap();
        assert!((x.as_dvector()[0] - 2.0).abs() < 1e-12);
        assert!((x.as_dvector()[1] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn solve_before_setup_is_an_error() {
        let mut ksp = NativeKsp::<f64>::new(KspConfig::direct());
        let b = LocalVector::from_vec(vec![1.0]);
        let mut x = LocalVector::zeros(1);
        assert!(ksp.solve(&b, &mut x).is_err());
    }
}
