use thiserror::Error;

/// The external analysis pipeline failed. Logged and swallowed by the
/// Dispatcher: durable state (the Visit row, the persisted content) is
/// already committed, so analysis is backfillable later (§4.7, §7).
#[derive(Debug, Error)]
#[error("workflow analysis failed: {0}")]
pub struct WorkflowError(pub String);
