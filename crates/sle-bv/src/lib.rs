//! Block basis-vector container: the column-oriented working subspace
//! every solver in this workspace (Krylov core, CISS, cyclic SVD) stores
//! its basis in, with orthogonalization against an optional non-standard
//! inner product.

pub mod bv;
pub mod error;

pub use bv::{Bv, BvColumnHandle, OrthogPolicy, OrthogType, RefineType};
pub use error::{BvError, Result};
