//! Function-evaluator error surface, wrapping the shared
//! [`sle_core::CoreError`] kinds.

use sle_core::CoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FnError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FnError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("matrix function method {method} does not support the '{variant}' function")]
    UnsupportedMethodForFunction { method: String, variant: String },
}
