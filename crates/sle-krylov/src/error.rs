//! Krylov-core error surface, wrapping the shared [`sle_core::CoreError`]
//! and [`sle_bv::BvError`] kinds plus whatever the caller's operator
//! closure reports.

use sle_bv::BvError;
use sle_core::CoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, KrylovError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum KrylovError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Bv(#[from] BvError),

    #[error("operator application failed: {0}")]
    OperatorApply(String),
}
