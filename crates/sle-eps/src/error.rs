//! Eigensolver error surface, wrapping the shared [`sle_core::CoreError`]
//! and collaborator-crate kinds plus the CISS-specific preconditions.
//!
//! Named `CissError` rather than `EpsError`: CISS is the component that
//! introduces genuinely new failure modes over what `CoreError`/`StError`
//! already enumerate, and this crate's other method (Krylov-via-`ST`)
//! only ever surfaces errors those already cover.

use sle_bv::BvError;
use sle_core::CoreError;
use sle_krylov::KrylovError;
use sle_st::StError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CissError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CissError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Bv(#[from] BvError),

    #[error(transparent)]
    St(#[from] StError),

    #[error(transparent)]
    Krylov(#[from] KrylovError),

    #[error("CISS requires complex scalars")]
    RealScalarsUnsupported,

    #[error("only Ritz extraction is supported")]
    ExtractionUnsupported,

    #[error("arbitrary eigenvalue selection is not supported")]
    ArbitrarySelectionUnsupported,
}
