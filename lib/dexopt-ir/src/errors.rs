//! IR errors definition.

use thiserror::Error;

/// An alias for results that can be an [`IrError`].
pub type IrResult<T> = Result<T, IrError>;

/// The IR error type.
#[derive(Debug, Error)]
pub enum IrError {
    #[error("invalid type descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("type is not a class: {0}")]
    NotAClass(String),

    #[error("type is not an array: {0}")]
    NotAnArray(String),
}
