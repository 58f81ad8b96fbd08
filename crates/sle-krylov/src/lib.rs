//! Arnoldi/Lanczos Krylov core shared by the eigensolvers: builds an
//! `m`-step factorization of a caller-supplied operator against a
//! [`sle_bv::Bv`] basis, and derives Ritz-pair residual estimates from
//! it.

pub mod arnoldi;
pub mod error;

pub use arnoldi::{arnoldi, lanczos, ritz_residual_estimates, true_residual_norm, ArnoldiOutcome};
pub use error::{KrylovError, Result};
