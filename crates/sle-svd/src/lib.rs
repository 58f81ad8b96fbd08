pub mod cyclic;
pub mod error;
pub mod frontend;

pub use cyclic::{CyclicSvd, CyclicSvdConfig, SvdResult, Which};
pub use error::{Result, SvdError};
pub use frontend::{Svd, SvdFrontendResult, SvdKind};
