//! The Visit Queue Processor (§4.6 of the spec): the single consumer that
//! ties the Tree Reconciler, the Orphan Manager, and the Workflow
//! Dispatcher together behind one actix actor, so every mutation to the
//! structured store happens from exactly one place at a time (§5).

mod actor;
mod bootstrap;
mod client;
mod error;
mod messages;
mod queue;
mod stats;

pub use actor::Engine;
pub use bootstrap::start;
pub use client::EngineClient;
pub use error::EngineFatal;
pub use queue::{OrphanFlushItem, PendingVisit, QueueItem};
pub use stats::EngineStats;
