//! BV-specific error surface, wrapping the shared [`sle_core::CoreError`]
//! kinds.

use sle_core::CoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BvError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BvError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("BV column index {0} is out of the active window")]
    IndexOutOfWindow(usize),

    #[error("at most two columns may be borrowed simultaneously")]
    TooManyBorrows,
}
