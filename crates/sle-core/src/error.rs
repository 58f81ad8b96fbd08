//! Shared error kinds.
//!
//! Every crate in the stack wraps this enum in its own `thiserror::Error`
//! (`BvError`, `StError`, `FnError`, `CissError`, `SvdError`) rather than
//! re-declaring the same precondition/invariant variants, the way
//! `ccx-io::error::IoError` collects one crate's error surface behind a
//! single `#[error(...)]` enum.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    // -- Precondition --
    #[error("size mismatch: {0}")]
    SizeMismatch(String),

    #[error("operation requires complex scalars, but the context was built over real scalars")]
    WrongScalarType,

    #[error("unsupported extraction type: {0}")]
    UnsupportedExtraction(String),

    #[error("unsupported 'which eigenvalues' selection: {0}")]
    UnsupportedWhich(String),

    #[error("incompatible options: {0}")]
    IncompatibleOptions(String),

    #[error("value out of range: {0}")]
    OutOfRange(String),

    // -- Domain --
    #[error("domain error evaluating function at the given argument: {0}")]
    DomainError(String),

    #[error("derivative undefined at the given argument: {0}")]
    DerivativeUndefined(String),

    #[error("inner product evaluated non-positive under a non-indefinite policy")]
    IndefiniteInner,

    // -- Numerical --
    #[error("matrix function iteration did not converge within {max_iterations} iterations (residual {residual:e})")]
    MatrixFunctionNotConverged { max_iterations: usize, residual: f64 },

    #[error("factorization encountered a (near-)zero pivot")]
    FactorizationZeroPivot,

    #[error("dense LAPACK-equivalent routine unavailable: {0}")]
    LapackRoutineUnavailable(String),

    // -- Solver outcome (surfaced, not exceptions in spirit, but we still
    //    carry them through `Result` so callers must acknowledge them) --
    #[error("linear solve diverged: {0}")]
    DivergedLinearSolve(String),

    #[error("Krylov factorization broke down at step {0}")]
    DivergedBreakdown(usize),

    #[error("iteration cap reached without convergence")]
    DivergedMaxIt,

    // -- Invariant violation (programmer error) --
    #[error("column {0} is already borrowed")]
    ColumnAlreadyBorrowed(usize),

    #[error("restoreColumn called for column {requested} but column {borrowed} is borrowed")]
    RestoreMismatch { borrowed: usize, requested: usize },

    #[error("matrix mutated since the spectral transform was set up (state is stale)")]
    StateStale,

    #[error("backend error: {0}")]
    Backend(#[from] crate::ksp::BackendError),
}

/// Convergence / divergence reason surfaced to a solver's caller.
///
/// Mirrors the `ConvergedTolerance` / `DivergedIts` / `DivergedBreakdown`
/// / `DivergedLinearSolve` taxonomy shared by the EPS/SVD/PEP/NEP
/// frontends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergedReason {
    ConvergedTolerance,
    DivergedIts,
    DivergedBreakdown,
    DivergedLinearSolve,
}

impl ConvergedReason {
    pub fn converged(self) -> bool {
        matches!(self, ConvergedReason::ConvergedTolerance)
    }
}
