//! Failure semantics for every Structured Store operation (§4.2, §7).

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// A `visit_id` unique-key violation: the processor treats this as a
    /// signal that the visit is an idempotent replay, not a failure.
    #[error("visit already present")]
    Duplicate,

    /// A foreign-key or check-constraint violation other than the
    /// expected unique-key replay case. Surfaces a bug; the visit is
    /// dropped and the violation is logged.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// The store could not be reached or a query could not be executed
    /// for reasons unrelated to the data itself.
    #[error("store io error: {0}")]
    Io(String),

    /// A stored value failed to deserialise (e.g. malformed intentions JSON).
    #[error("serialisation error: {0}")]
    Serialisation(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    Self::Duplicate
                } else if db_err.is_foreign_key_violation() || db_err.is_check_violation() {
                    Self::Constraint(db_err.message().to_owned())
                } else {
                    Self::Io(db_err.message().to_owned())
                }
            }
            other => Self::Io(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialisation(err.to_string())
    }
}

impl From<chrono::ParseError> for StoreError {
    fn from(err: chrono::ParseError) -> Self {
        Self::Serialisation(err.to_string())
    }
}
