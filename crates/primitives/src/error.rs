//! Errors raised while validating a producer payload, before it is ever
//! handed to the Reconciler.

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SchemaError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid content encoding: {0}")]
    InvalidContent(String),
}
