//! Lifecycle-stage types for a single page visit.
//!
//! Each stage is a distinct, strictly-typed record (`NewVisit` →
//! `Visit` → `VisitWithMeta`) rather than one loosely-optional struct
//! threaded through the whole pipeline; validation only happens at the
//! transitions between them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{TreeId, VisitId};

/// A visit as handed to the Tree Reconciler, before it has been assigned
/// to a tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewVisit {
    pub visit_id: VisitId,
    pub url: String,
    pub referrer_url: Option<String>,
    pub page_loaded_at: DateTime<Utc>,
}

/// A visit as persisted in the Structured Store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visit {
    pub visit_id: VisitId,
    pub url: String,
    pub referrer_url: Option<String>,
    pub referrer_visit_id: Option<VisitId>,
    pub page_loaded_at: DateTime<Utc>,
    pub tree_id: TreeId,
}

/// Structured analysis attached to a visit by the external workflow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub visit_id: VisitId,
    pub title: Option<String>,
    pub summary: Option<String>,
    /// Ordered, short free-text intentions ("comparing prices", "reading docs").
    pub intentions: Vec<String>,
}

/// Per-tree-per-visit intentions, distinct from the visit-level `Analysis.intentions`
/// because a visit can be re-interpreted differently depending on which tree
/// it is viewed from after a split.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeIntention {
    pub tree_id: TreeId,
    pub visit_id: VisitId,
    pub intentions: Vec<String>,
}

/// A visit joined with whatever analysis/intentions the store has for it.
/// Produced only by `get_tree_members` / `get_recent_trees_with_members`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitWithMeta {
    pub visit: Visit,
    pub analysis: Option<Analysis>,
    pub tree_intentions: Option<Vec<String>>,
}

/// Outcome of reconciling one `NewVisit` against the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// `None` only for aggregator pages reached with no referrer.
    pub tree_id: Option<TreeId>,
    /// Whether this call inserted a new tree or attached a new visit to an
    /// existing one (`false` on idempotent replay or on skip).
    pub tree_changed: bool,
    /// The parent visit this visit was attached under, if any was resolved.
    /// `None` with `tree_id: Some(_)` means this visit rooted a new tree,
    /// or its declared referrer could not be resolved (a phantom referrer
    /// or an orphan candidate).
    pub referrer_visit_id: Option<VisitId>,
}

impl ReconcileOutcome {
    #[must_use]
    pub const fn skipped() -> Self {
        Self {
            tree_id: None,
            tree_changed: false,
            referrer_visit_id: None,
        }
    }
}
