//! ST-specific error surface, wrapping the shared [`sle_core::CoreError`]
//! kinds.

use sle_core::CoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("setUp must be called before apply/applyTranspose")]
    NotSetUp,

    #[error("spectral transform setup failed: the attached linear solver could not be factored ({0})")]
    SolverSetupFailure(String),
}
