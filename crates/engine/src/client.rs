//! A thin, cloneable handle onto the engine actor — mirrors the teacher's
//! `NetworkClient`: wraps an `Addr<A>`, hides the message types from
//! callers, and treats a dropped mailbox as a programmer error rather
//! than something worth propagating.

use actix::Addr;
use wayline_primitives::{SchemaError, SubmitAck, VisitPayload};
use wayline_workflow::AnalysisWorkflow;

use crate::actor::Engine;
use crate::messages::{GetStats, Stop, SubmitVisit};
use crate::stats::EngineStats;

#[derive(Clone)]
pub struct EngineClient<W: AnalysisWorkflow> {
    engine: Addr<Engine<W>>,
}

impl<W: AnalysisWorkflow + 'static> EngineClient<W> {
    #[must_use]
    pub const fn new(engine: Addr<Engine<W>>) -> Self {
        Self { engine }
    }

    /// Submits one raw producer payload. Returns the validation error
    /// as-is on a malformed payload, before it ever reaches the queue.
    pub async fn submit_visit(&self, payload: VisitPayload) -> Result<SubmitAck, SchemaError> {
        self.engine.send(SubmitVisit(payload)).await.expect("Mailbox not to be dropped")
    }

    pub async fn stats(&self) -> EngineStats {
        self.engine.send(GetStats).await.expect("Mailbox not to be dropped")
    }

    /// Cancels the engine's timers. Does not drain or flush the queue —
    /// the queue and the Orphan Manager are in-memory only, so whatever
    /// is left queued is lost; everything already persisted to the store
    /// and content-addressed blob store is unaffected.
    pub async fn stop(&self) {
        self.engine.send(Stop).await.expect("Mailbox not to be dropped");
    }
}
