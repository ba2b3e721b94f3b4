use thiserror::Error;

/// Raised only while assembling the engine — the structured store or the
/// content store failed to open. Once running, every other failure within
/// a batch item is logged and the item is dropped, per the propagation
/// policy in §7.
#[derive(Debug, Error)]
#[error("engine fatal: {0}")]
pub struct EngineFatal(pub String);
