//! Typed records flowing through the Visit Queue Processor's queue
//! (§4.6, §9 "mixed duck-typed records"): a freshly-submitted visit is
//! strictly distinct from a previously-orphaned visit being re-enqueued
//! once its parent arrives — they take different per-visit steps.

use wayline_primitives::{NewVisit, Visit};

/// A brand-new visit pulled from the tail of the queue (or the head, if
/// it was itself re-queued at priority — see [`QueueItem::OrphanFlush`]).
#[derive(Clone, Debug)]
pub struct PendingVisit {
    pub new_visit: NewVisit,
    pub tab_id: Option<i64>,
    pub opener_tab_id: Option<i64>,
    pub body: String,
}

/// A previously orphaned visit whose opener's root visit has just been
/// processed. Its reparenting (new `tree_id` and `referrer_visit_id`) is
/// already decided by the flush that created this item — the per-visit
/// step only needs to apply it and dispatch the workflow, not re-run the
/// Reconciler (§4.6, §9 "in-place mutation ... replaced with immutable
/// snapshots").
#[derive(Clone, Debug)]
pub struct OrphanFlushItem {
    pub visit: Visit,
    pub body: String,
    pub tab_id: Option<String>,
}

#[derive(Clone, Debug)]
pub enum QueueItem {
    Regular(PendingVisit),
    OrphanFlush(OrphanFlushItem),
}

pub(crate) fn tab_id_to_key(tab_id: Option<i64>) -> Option<String> {
    tab_id.map(|id| id.to_string())
}
