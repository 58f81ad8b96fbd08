use sle_core::CoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SvdError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SvdError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("requested {requested} singular triplets but only {available} were recovered")]
    NotEnoughTriplets { requested: usize, available: usize },
}
