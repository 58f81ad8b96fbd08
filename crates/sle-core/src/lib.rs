//! Scalar kernel, dense LA adapter, and the local substrate collaborators
//! (`Matrix`, `Vec`, `Communicator`, `RandomSource`, `LinearSolver`) that
//! every other crate in the `sle-rs` eigensolver stack is built against.
//!
//! This crate is the analogue of the host project's `backend` module:
//! trait-first, with one local/native implementation and a feature-gated
//! stub for a real parallel backend.

pub mod comm;
pub mod dense;
pub mod error;
pub mod ksp;
pub mod matrix;
pub mod rng;
pub mod scalar;
pub mod vector;

pub use comm::{Communicator, ReduceOp, SingleRankComm};
pub use error::{ConvergedReason, CoreError, Result};
pub use ksp::{BackendError, KspConfig, KspType, LinearSolver, NativeKsp, SolveInfo};
pub use matrix::{LocalMatrix, LocalMatrixHandle, Matrix, StructureHint};
pub use rng::{next_scalar, ChaChaRandomSource, RandomSource};
pub use scalar::{horner, horner_derivative, Scalar};
pub use vector::{LocalVector, NormType, Vector};
