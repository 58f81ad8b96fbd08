//! Spectral transform (`ST`): shift-and-invert, polynomial pencil
//! composition, and a matrix-free shell mode, all built on the
//! [`sle_core`] linear-solver handle.

pub mod error;
pub mod st;

pub use error::{Result, StError};
pub use st::{MatMode, St};
