//! Scalar and dense-matrix function evaluation: the unit `ST`'s
//! shift-and-invert splits and polynomial pencils build on, and that a
//! caller can also use directly (matrix exponentials, square roots, ...).

pub mod error;
pub mod matrix_fn;
pub mod scalar_fn;

pub use error::{FnError, Result};
pub use matrix_fn::{evaluate_matrix, MatrixFnMethod, SymmetryHint};
pub use scalar_fn::{FnKind, FunctionHandle};
