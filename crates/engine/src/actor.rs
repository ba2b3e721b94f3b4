//! The Visit Queue Processor (§4.6): the single actix actor that owns the
//! queue, the Orphan Manager, and the batch/retry timers, and is the only
//! thing ever allowed to drive the Tree Reconciler or the Workflow
//! Dispatcher. Mirrors the teacher's `ContextManager` — private fields, an
//! `actix::Context<Self>`, handlers kept thin by delegating the actual I/O
//! to free `async fn`s wrapped with `.into_actor(self)`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use actix::{Actor, ActorFutureExt, ActorResponse, AsyncContext, Context, Handler, SpawnHandle, WrapFuture};
use wayline_config::EngineConfig;
use wayline_orphan::{OrphanEntry, OrphanManager, OrphanPolicy};
use wayline_primitives::{SchemaError, SubmitAck, TreeId, Visit, VisitId};
use wayline_reconciler::TreeReconciler;
use wayline_store::StructuredStore;
use wayline_workflow::{AnalysisWorkflow, Dispatcher};

use crate::messages::{GetStats, ProcessQueue, RetryOrphans, Stop, SubmitVisit};
use crate::queue::{tab_id_to_key, OrphanFlushItem, PendingVisit, QueueItem};
use crate::stats::EngineStats;

/// What one per-visit step decided, reported back to the actor so it can
/// apply the only two in-memory mutations a step is allowed to cause: an
/// Orphan Manager update, or a newly primed flush item at the queue head.
enum ItemOutcome {
    /// Reconciliation failed, the visit was an aggregator skip, or the
    /// item was dropped for some other propagation-policy reason (§7).
    Dropped,
    /// Attached to some tree but its declared opener hasn't arrived yet.
    Orphaned { visit: Visit, body: String, tab_id: Option<String>, opener_tab_id: String },
    /// Durably attached (root or child) and, if it dispatched, already
    /// dispatched. Carries its own tab id so any orphans chained onto it
    /// can be drained in the same pass, and its own `visit_id`/`tree_id` so
    /// those drained orphans can be reparented onto it.
    Attached { own_tab_id: Option<String>, visit_id: VisitId, tree_id: TreeId },
}

/// The engine actor. Generic over the analysis workflow so the crate never
/// depends on a concrete implementation of it (§4.7).
pub struct Engine<W: AnalysisWorkflow> {
    queue: VecDeque<QueueItem>,
    processing: bool,
    batch_timer: Option<SpawnHandle>,
    retry_timer: Option<SpawnHandle>,
    orphan: OrphanManager,
    reconciler: TreeReconciler,
    dispatcher: Arc<Dispatcher<W>>,
    store: StructuredStore,
    batch_size: usize,
    batch_timeout: Duration,
    retry_interval: Duration,
}

impl<W: AnalysisWorkflow + 'static> Engine<W> {
    #[must_use]
    pub fn new(
        config: &EngineConfig,
        store: StructuredStore,
        reconciler: TreeReconciler,
        dispatcher: Dispatcher<W>,
    ) -> Self {
        let policy = OrphanPolicy {
            max_retries: config.orphan_max_retries,
            max_age: Duration::from_millis(config.orphan_max_age_ms),
        };
        Self {
            queue: VecDeque::new(),
            processing: false,
            batch_timer: None,
            retry_timer: None,
            orphan: OrphanManager::new(policy),
            reconciler,
            dispatcher: Arc::new(dispatcher),
            store,
            batch_size: config.batch_size.max(1),
            batch_timeout: Duration::from_millis(config.batch_timeout_ms),
            retry_interval: Duration::from_millis(config.orphan_retry_interval_ms),
        }
    }

    /// Arms the batch timer if one isn't already pending for the current
    /// queue contents.
    fn arm_batch_timer(&mut self, ctx: &mut Context<Self>) {
        if self.batch_timer.is_some() {
            return;
        }
        let handle = ctx.run_later(self.batch_timeout, |act, ctx| {
            act.batch_timer = None;
            ctx.notify(ProcessQueue);
        });
        self.batch_timer = Some(handle);
    }

    fn disarm_batch_timer(&mut self, ctx: &mut Context<Self>) {
        if let Some(handle) = self.batch_timer.take() {
            let _ = ctx.cancel_future(handle);
        }
    }

    /// Applies every step's decision. Orphan registrations are all applied
    /// before any drain is attempted, so a parent and its just-arrived
    /// child landing in the same batch still reunite this pass regardless
    /// of iteration order.
    fn apply_outcomes(&mut self, outcomes: Vec<ItemOutcome>) {
        for outcome in &outcomes {
            if let ItemOutcome::Orphaned { visit, body, tab_id, opener_tab_id } = outcome {
                self.orphan.add(visit.clone(), body.clone(), tab_id.clone(), opener_tab_id.clone());
            }
        }
        for outcome in outcomes {
            if let ItemOutcome::Attached { own_tab_id: Some(own_tab), visit_id, tree_id } = outcome {
                // `push_front` one at a time would reverse arrival order;
                // pushing the reversed drain restores it at the head.
                for mut entry in self.orphan.drain_for_opener(&own_tab).into_iter().rev() {
                    // §4.6: "rewrite each orphan entry's `referrer_visit_id =
                    // this_visit.visit_id`" before re-enqueuing it at priority.
                    entry.visit.referrer_visit_id = Some(visit_id);
                    entry.visit.tree_id = tree_id;
                    self.queue.push_front(QueueItem::OrphanFlush(flush_item_for(entry)));
                }
            }
        }
    }
}

impl<W: AnalysisWorkflow + 'static> Actor for Engine<W> {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.retry_timer = Some(ctx.run_interval(self.retry_interval, |_act, ctx| ctx.notify(RetryOrphans)));
    }
}

impl<W: AnalysisWorkflow + 'static> Handler<SubmitVisit> for Engine<W> {
    type Result = Result<SubmitAck, SchemaError>;

    fn handle(&mut self, SubmitVisit(payload): SubmitVisit, ctx: &mut Self::Context) -> Self::Result {
        let validated = payload.validate()?;
        let new_visit = wayline_reconciler::new_visit(validated.url, validated.referrer, validated.page_loaded_at);

        self.queue.push_back(QueueItem::Regular(PendingVisit {
            new_visit,
            tab_id: validated.tab_id,
            opener_tab_id: validated.opener_tab_id,
            body: validated.body,
        }));
        let position = self.queue.len();

        if self.queue.len() >= self.batch_size {
            self.disarm_batch_timer(ctx);
            ctx.notify(ProcessQueue);
        } else {
            self.arm_batch_timer(ctx);
        }

        Ok(SubmitAck::Queued { position })
    }
}

impl<W: AnalysisWorkflow + 'static> Handler<GetStats> for Engine<W> {
    type Result = EngineStats;

    fn handle(&mut self, _msg: GetStats, _ctx: &mut Self::Context) -> Self::Result {
        let orphan_stats = self.orphan.stats();
        EngineStats {
            queue_length: self.queue.len(),
            processing: self.processing,
            orphans_total: orphan_stats.total,
            orphans_by_opener: orphan_stats.distinct_openers,
            oldest_orphan_age_ms: orphan_stats.oldest_age_ms,
        }
    }
}

impl<W: AnalysisWorkflow + 'static> Handler<Stop> for Engine<W> {
    type Result = ();

    fn handle(&mut self, _msg: Stop, ctx: &mut Self::Context) -> Self::Result {
        self.disarm_batch_timer(ctx);
        if let Some(handle) = self.retry_timer.take() {
            let _ = ctx.cancel_future(handle);
        }
    }
}

impl<W: AnalysisWorkflow + 'static> Handler<ProcessQueue> for Engine<W> {
    type Result = ActorResponse<Self, ()>;

    fn handle(&mut self, _msg: ProcessQueue, _ctx: &mut Self::Context) -> Self::Result {
        if self.processing || self.queue.is_empty() {
            return ActorResponse::reply(());
        }
        self.processing = true;

        let take = self.batch_size.min(self.queue.len());
        let batch: Vec<QueueItem> = self.queue.drain(..take).collect();

        let reconciler = self.reconciler.clone();
        let dispatcher = Arc::clone(&self.dispatcher);
        let store = self.store.clone();

        let task = async move {
            futures_util::future::join_all(
                batch.into_iter().map(|item| process_item(item, &reconciler, &dispatcher, &store)),
            )
            .await
        };

        ActorResponse::r#async(task.into_actor(self).map(|outcomes, act, ctx| {
            act.processing = false;
            act.apply_outcomes(outcomes);
            if !act.queue.is_empty() {
                ctx.notify(ProcessQueue);
            }
        }))
    }
}

impl<W: AnalysisWorkflow + 'static> Handler<RetryOrphans> for Engine<W> {
    type Result = ActorResponse<Self, ()>;

    fn handle(&mut self, _msg: RetryOrphans, _ctx: &mut Self::Context) -> Self::Result {
        let due = self.orphan.take_due_for_retry();
        if due.is_empty() {
            return ActorResponse::reply(());
        }

        let store = self.store.clone();
        let task = async move { resolve_due_orphans(due, &store).await };

        ActorResponse::r#async(task.into_actor(self).map(|(resolved, exhausted), act, ctx| {
            for (opener_tab_id, visit_id) in exhausted {
                act.orphan.increment_retry_count(&opener_tab_id, visit_id);
            }
            for entry in resolved.into_iter().rev() {
                let _ = act.orphan.remove(&entry.opener_tab_id, entry.visit.visit_id);
                act.queue.push_front(QueueItem::OrphanFlush(flush_item_for(entry)));
            }
            if !act.queue.is_empty() {
                ctx.notify(ProcessQueue);
            }
        }))
    }
}

/// Rebuilds the visit row with its resolved parent so the eventual
/// `update_visit_parent` store call (the one mutation a flush is allowed
/// to perform) has a fully-formed target to write.
fn flush_item_for(entry: OrphanEntry) -> OrphanFlushItem {
    OrphanFlushItem { visit: entry.visit, body: entry.body, tab_id: entry.tab_id }
}

/// Re-attempts the referrer-URL lookup for every orphan due for a retry —
/// distinct from the reactive drain-on-attach path, this is the second
/// chance for a parent that arrived through some tab other than the one
/// the orphan declared as its opener (§4.5, §4.6 "retry_timer").
async fn resolve_due_orphans(
    due: Vec<OrphanEntry>,
    store: &StructuredStore,
) -> (Vec<OrphanEntry>, Vec<(String, VisitId)>) {
    let mut resolved = Vec::new();
    let mut exhausted = Vec::new();

    for mut entry in due {
        let Some(referrer_url) = entry.visit.referrer_url.clone() else {
            exhausted.push((entry.opener_tab_id, entry.visit.visit_id));
            continue;
        };

        match store.find_visit_by_referrer_url(&referrer_url, entry.visit.page_loaded_at).await {
            Ok(Some(parent)) => {
                entry.visit.tree_id = parent.tree_id;
                entry.visit.referrer_visit_id = Some(parent.visit_id);
                resolved.push(entry);
            }
            Ok(None) => exhausted.push((entry.opener_tab_id, entry.visit.visit_id)),
            Err(err) => {
                tracing::warn!(error = %err, visit_id = %entry.visit.visit_id, "orphan retry lookup failed");
                exhausted.push((entry.opener_tab_id, entry.visit.visit_id));
            }
        }
    }

    (resolved, exhausted)
}

async fn process_item<W: AnalysisWorkflow>(
    item: QueueItem,
    reconciler: &TreeReconciler,
    dispatcher: &Dispatcher<W>,
    store: &StructuredStore,
) -> ItemOutcome {
    match item {
        QueueItem::Regular(pending) => process_regular(pending, reconciler, dispatcher, store).await,
        QueueItem::OrphanFlush(flush) => process_flush(flush, dispatcher, store).await,
    }
}

/// The normal branch of §4.6: runs the Reconciler, classifies the result
/// as a root/attach, an orphan, or a drop, and dispatches the workflow
/// when the tree actually changed.
async fn process_regular<W: AnalysisWorkflow>(
    pending: PendingVisit,
    reconciler: &TreeReconciler,
    dispatcher: &Dispatcher<W>,
    store: &StructuredStore,
) -> ItemOutcome {
    let outcome = match reconciler.reconcile(&pending.new_visit).await {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::warn!(error = %err, url = %pending.new_visit.url, "reconciliation failed, dropping visit");
            return ItemOutcome::Dropped;
        }
    };

    let Some(tree_id) = outcome.tree_id else {
        return ItemOutcome::Dropped;
    };

    let persisted = Visit {
        visit_id: pending.new_visit.visit_id,
        url: pending.new_visit.url,
        referrer_url: pending.new_visit.referrer_url,
        referrer_visit_id: outcome.referrer_visit_id,
        page_loaded_at: pending.new_visit.page_loaded_at,
        tree_id,
    };

    // §4.5: a visit declaring an opener, durably attached, with its own
    // referrer still unresolved is exactly the orphan detection rule.
    if pending.opener_tab_id.is_some() && outcome.referrer_visit_id.is_none() {
        let opener_tab_id = tab_id_to_key(pending.opener_tab_id).expect("opener_tab_id is Some");
        return ItemOutcome::Orphaned {
            visit: persisted,
            body: pending.body,
            tab_id: tab_id_to_key(pending.tab_id),
            opener_tab_id,
        };
    }

    if outcome.tree_changed {
        dispatch_to_tree(dispatcher, store, tree_id, &persisted, &pending.body).await;
    }

    ItemOutcome::Attached {
        own_tab_id: tab_id_to_key(pending.tab_id),
        visit_id: persisted.visit_id,
        tree_id: persisted.tree_id,
    }
}

/// An `OrphanFlushItem`'s parent link is already decided; this step's only
/// job is to persist it and dispatch, never to re-run the Reconciler
/// (§9, "in-place mutation ... replaced with immutable snapshots").
async fn process_flush<W: AnalysisWorkflow>(
    flush: OrphanFlushItem,
    dispatcher: &Dispatcher<W>,
    store: &StructuredStore,
) -> ItemOutcome {
    let visit = flush.visit;
    let Some(referrer_visit_id) = visit.referrer_visit_id else {
        tracing::warn!(visit_id = %visit.visit_id, "orphan flush missing a resolved parent, dropping");
        return ItemOutcome::Dropped;
    };

    if let Err(err) = store.update_visit_parent(visit.visit_id, visit.tree_id, referrer_visit_id).await {
        tracing::warn!(error = %err, visit_id = %visit.visit_id, "failed to persist orphan's resolved parent");
        return ItemOutcome::Dropped;
    }
    if let Err(err) = store.upsert_tree(visit.tree_id, visit.page_loaded_at, visit.page_loaded_at).await {
        tracing::warn!(error = %err, tree_id = %visit.tree_id, "failed to advance tree activity on flush");
    }

    dispatch_to_tree(dispatcher, store, visit.tree_id, &visit, &flush.body).await;

    ItemOutcome::Attached { own_tab_id: flush.tab_id, visit_id: visit.visit_id, tree_id: visit.tree_id }
}

async fn dispatch_to_tree<W: AnalysisWorkflow>(
    dispatcher: &Dispatcher<W>,
    store: &StructuredStore,
    tree_id: TreeId,
    visit: &Visit,
    body: &str,
) {
    let members = match store.get_tree_members(tree_id).await {
        Ok(members) => members,
        Err(err) => {
            tracing::warn!(error = %err, %tree_id, "failed to load tree members, skipping dispatch");
            return;
        }
    };

    if let Err(err) = dispatcher.dispatch(tree_id, &members, visit, body).await {
        tracing::warn!(error = %err, visit_id = %visit.visit_id, "dispatch failed");
    }
}
