//! The Workflow Dispatcher (§4.7): a thin adapter between the engine and
//! the external analysis pipeline (out of scope here, specified only by
//! the [`AnalysisWorkflow`] trait it must implement).
//!
//! Responsibilities, in order: persist the raw body to the Content Store
//! *before* analysis runs (so a mid-analysis crash still leaves content
//! available for a later backfill), await the external analysis, and on
//! success persist whatever `Analysis`/`TreeIntention` rows it returned.
//! A workflow failure is logged and swallowed — the Visit row and its
//! content are already durable, and analysis can be backfilled later by a
//! maintenance job not specified here.

mod error;

use async_trait::async_trait;
pub use error::WorkflowError;
use wayline_content::ContentStore;
use wayline_primitives::{Analysis, TreeId, Visit, VisitId, VisitWithMeta};
use wayline_store::{StoreError, StructuredStore};

/// The external collaborator's interface: enriches a tree's members with
/// a title, summary, and ordered intentions. Not implemented in this
/// crate — only the contract the engine dispatches against.
#[async_trait]
pub trait AnalysisWorkflow: Send + Sync {
    async fn analyse(
        &self,
        tree_members: &[VisitWithMeta],
        new_visit: &Visit,
        raw_content: &str,
    ) -> Result<WorkflowOutcome, WorkflowError>;
}

/// What a successful analysis run hands back: an optional per-visit
/// `Analysis` record, and zero or more per-tree-per-visit intention
/// lists (§3, `TreeIntention`).
#[derive(Clone, Debug, Default)]
pub struct WorkflowOutcome {
    pub analysis: Option<Analysis>,
    pub tree_intentions: Vec<(VisitId, Vec<String>)>,
}

/// A failure persisting durable state around the workflow call — distinct
/// from [`WorkflowError`], which the dispatcher absorbs itself. These
/// propagate to the caller, which logs and drops the batch item per §7.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("content store error: {0}")]
    Content(#[from] wayline_content::ContentStoreError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub struct Dispatcher<W> {
    workflow: W,
    content: std::sync::Arc<dyn ContentStore>,
    store: StructuredStore,
}

impl<W: AnalysisWorkflow> Dispatcher<W> {
    #[must_use]
    pub const fn new(workflow: W, content: std::sync::Arc<dyn ContentStore>, store: StructuredStore) -> Self {
        Self { workflow, content, store }
    }

    /// Persists content, runs analysis, and persists its results. Called
    /// once per visit whose reconciliation changed a tree (§4.6 normal
    /// branch) — new root or newly attached child, and again for each
    /// orphan flushed once its parent is found.
    pub async fn dispatch(
        &self,
        tree_id: TreeId,
        tree_members: &[VisitWithMeta],
        new_visit: &Visit,
        raw_content: &str,
    ) -> Result<(), DispatchError> {
        self.content
            .put(new_visit.visit_id, &new_visit.url, None, raw_content)
            .await?;

        match self.workflow.analyse(tree_members, new_visit, raw_content).await {
            Ok(outcome) => {
                if let Some(analysis) = outcome.analysis {
                    self.store.insert_or_replace_analysis(&analysis).await?;
                }
                if !outcome.tree_intentions.is_empty() {
                    self.store.upsert_tree_intentions(tree_id, &outcome.tree_intentions).await?;
                }
                Ok(())
            }
            Err(err) => {
                tracing::warn!(
                    visit_id = %new_visit.visit_id,
                    error = %err,
                    "workflow analysis failed; visit and content already durable, backfillable later"
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use camino::Utf8PathBuf;
    use chrono::Utc;
    use wayline_content::RocksDbContentStore;
    use wayline_primitives::{Digest, TreeId};

    use super::*;

    fn visit(seed: u8, tree: u8) -> Visit {
        let id = wayline_primitives::VisitId::from_digest(Digest::from_bytes([seed; 32]));
        let tree_id = TreeId::from_digest(Digest::from_bytes([tree; 32]));
        Visit {
            visit_id: id,
            url: "https://a.com/x".into(),
            referrer_url: None,
            referrer_visit_id: None,
            page_loaded_at: Utc::now(),
            tree_id,
        }
    }

    struct StubWorkflow {
        outcome: Mutex<Option<WorkflowOutcome>>,
        calls: Arc<Mutex<u32>>,
    }

    #[async_trait]
    impl AnalysisWorkflow for StubWorkflow {
        async fn analyse(
            &self,
            _tree_members: &[VisitWithMeta],
            _new_visit: &Visit,
            _raw_content: &str,
        ) -> Result<WorkflowOutcome, WorkflowError> {
            *self.calls.lock().unwrap() += 1;
            match self.outcome.lock().unwrap().take() {
                Some(outcome) => Ok(outcome),
                None => Err(WorkflowError("stub failure".into())),
            }
        }
    }

    async fn fixtures() -> (StructuredStore, Arc<dyn ContentStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = Utf8PathBuf::from_path_buf(dir.path().join("store.db")).unwrap();
        let store = StructuredStore::connect(&db_path).await.unwrap();
        let content: Arc<dyn ContentStore> =
            Arc::new(RocksDbContentStore::open(dir.path().join("content")).unwrap());
        (store, content, dir)
    }

    #[tokio::test]
    async fn successful_analysis_persists_content_and_analysis() {
        let (store, content, _dir) = fixtures().await;
        let v = visit(1, 1);
        store.upsert_tree(v.tree_id, v.page_loaded_at, v.page_loaded_at).await.unwrap();
        store.insert_visit(&v).await.unwrap();

        let outcome = WorkflowOutcome {
            analysis: Some(Analysis {
                visit_id: v.visit_id,
                title: Some("Title".into()),
                summary: Some("Summary".into()),
                intentions: vec!["reading docs".into()],
            }),
            tree_intentions: vec![(v.visit_id, vec!["reading docs".into()])],
        };
        let workflow = StubWorkflow { outcome: Mutex::new(Some(outcome)), calls: Arc::new(Mutex::new(0)) };
        let dispatcher = Dispatcher::new(workflow, content.clone(), store.clone());

        dispatcher.dispatch(v.tree_id, &[], &v, "hello world").await.unwrap();

        let stored = content.get(v.visit_id).await.unwrap().expect("content persisted");
        assert_eq!(stored.body, "hello world");

        let members = store.get_tree_members(v.tree_id).await.unwrap();
        assert_eq!(members.len(), 1);
        assert!(members[0].analysis.is_some());
    }

    #[tokio::test]
    async fn workflow_failure_is_swallowed_but_content_persists() {
        let (store, content, _dir) = fixtures().await;
        let v = visit(2, 2);
        store.upsert_tree(v.tree_id, v.page_loaded_at, v.page_loaded_at).await.unwrap();
        store.insert_visit(&v).await.unwrap();

        let workflow = StubWorkflow { outcome: Mutex::new(None), calls: Arc::new(Mutex::new(0)) };
        let dispatcher = Dispatcher::new(workflow, content.clone(), store.clone());

        let result = dispatcher.dispatch(v.tree_id, &[], &v, "hi").await;

        assert!(result.is_ok());
        assert!(content.get(v.visit_id).await.unwrap().is_some());
    }
}
