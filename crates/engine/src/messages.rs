//! The actor's public and internal message types (§4.6, §6).
//!
//! `SubmitVisit`/`GetStats`/`Stop` are the surface an [`crate::EngineClient`]
//! sends; `ProcessQueue` and `RetryOrphans` are internal timer/self
//! notifications that never leave this crate.

use actix::Message;
use wayline_primitives::{SchemaError, SubmitAck, VisitPayload};

use crate::stats::EngineStats;

/// One producer-submitted visit, still in its raw wire shape. Validated
/// inside the handler, not before — the handler is the single place that
/// both validates and assigns the queue position quoted back in the ack.
#[derive(Debug)]
pub struct SubmitVisit(pub VisitPayload);

impl Message for SubmitVisit {
    type Result = Result<SubmitAck, SchemaError>;
}

/// Read-only snapshot of queue depth, processing state, and orphan counts.
#[derive(Debug)]
pub struct GetStats;

impl Message for GetStats {
    type Result = EngineStats;
}

/// Cancels the retry timer and any pending batch timer; does not drain the
/// queue. Idempotent.
#[derive(Debug)]
pub struct Stop;

impl Message for Stop {
    type Result = ();
}

/// Self-notification that a batch is due: either the queue just reached
/// `batch_size`, or the one-shot batch timer fired. A no-op if the
/// processing guard is already held or the queue is empty.
#[derive(Debug)]
pub(crate) struct ProcessQueue;

impl Message for ProcessQueue {
    type Result = ();
}

/// Fired by the periodic retry timer; pulls every orphan entry due for
/// another attempt and re-resolves its referrer against the store (§4.5).
#[derive(Debug)]
pub(crate) struct RetryOrphans;

impl Message for RetryOrphans {
    type Result = ();
}
