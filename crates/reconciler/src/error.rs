use thiserror::Error;
use wayline_store::StoreError;

/// Failures the Reconciler can surface (§4.4, §7). Every variant wraps a
/// `StoreError`; the whole reconciliation runs in one transaction, so any
/// store failure aborts it and propagates here unchanged.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ReconcileError(#[from] pub(crate) StoreError);

impl ReconcileError {
    /// The spec treats `Duplicate` as an idempotent-replay signal rather
    /// than a failure; callers that see it as an error (instead of letting
    /// the Reconciler absorb it, which is the normal path) can still match
    /// on it here.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self.0, StoreError::Duplicate)
    }
}
