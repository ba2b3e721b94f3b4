//! Persistent relational store for trees, visits, analysis, and
//! tree intentions (§4.2). Backed by SQLite through `sqlx`; every query is
//! a prepared statement with typed parameter binding, never interpolated
//! SQL.
//!
//! Reads and single-row writes run directly against the pool.
//! [`StructuredStore::begin_reconcile`] opens the one transaction per
//! call the Tree Reconciler needs to run its find-then-insert-then-upsert
//! sequence atomically (§4.4, §5).

mod error;
mod queries;
mod schema;

use camino::Utf8Path;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{SqlitePool, Transaction};

pub use error::StoreError;
use wayline_primitives::{Analysis, TreeId, Visit, VisitId, VisitWithMeta};

/// Handle to the structured store. Cheap to clone (wraps a pool).
#[derive(Clone)]
pub struct StructuredStore {
    pool: SqlitePool,
}

impl StructuredStore {
    /// Opens (creating if absent) the SQLite database at `database_path`
    /// with foreign keys enforced and WAL journaling for concurrent
    /// readers alongside the single writer.
    pub async fn connect(database_path: &Utf8Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(database_path.as_std_path())
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(StoreError::from)?;

        let store = Self { pool };
        store.create_schema().await?;
        Ok(store)
    }

    #[must_use]
    pub const fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Idempotent; creates the four tables and their indexes.
    pub async fn create_schema(&self) -> Result<(), StoreError> {
        for statement in schema::CREATE_TABLES.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn upsert_tree(
        &self,
        tree_id: TreeId,
        first_load_time: DateTime<Utc>,
        latest_activity_time: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        queries::upsert_tree(&self.pool, tree_id, first_load_time, latest_activity_time).await
    }

    pub async fn insert_visit(&self, visit: &Visit) -> Result<(), StoreError> {
        queries::insert_visit(&self.pool, visit).await
    }

    pub async fn update_visit_parent(
        &self,
        visit_id: VisitId,
        tree_id: TreeId,
        referrer_visit_id: VisitId,
    ) -> Result<(), StoreError> {
        queries::update_visit_parent(&self.pool, visit_id, tree_id, referrer_visit_id).await
    }

    pub async fn find_visit_by_referrer_url(
        &self,
        prefix_url: &str,
        near_timestamp: DateTime<Utc>,
    ) -> Result<Option<Visit>, StoreError> {
        queries::find_visit_by_referrer_url(&self.pool, prefix_url, near_timestamp).await
    }

    /// Looks up a visit by its id directly, used to resolve the pre-existing
    /// row's `tree_id`/`referrer_visit_id` on an idempotent replay (§3 rule 6).
    pub async fn get_visit(&self, visit_id: VisitId) -> Result<Option<Visit>, StoreError> {
        queries::get_visit(&self.pool, visit_id).await
    }

    pub async fn get_tree_members(&self, tree_id: TreeId) -> Result<Vec<VisitWithMeta>, StoreError> {
        queries::get_tree_members(&self.pool, tree_id).await
    }

    /// Ordered by `latest_activity_time` descending, as specified. Returned
    /// as an ordered `Vec` of `(tree_id, members)` pairs rather than a map
    /// type, so callers keep the DESC ordering the spec requires.
    pub async fn get_recent_trees_with_members(
        &self,
        exclude_tree_id: Option<TreeId>,
        limit: usize,
    ) -> Result<Vec<(TreeId, Vec<VisitWithMeta>)>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        queries::get_recent_trees_with_members(&self.pool, exclude_tree_id, limit).await
    }

    pub async fn insert_or_replace_analysis(&self, analysis: &Analysis) -> Result<(), StoreError> {
        queries::insert_or_replace_analysis(&self.pool, analysis).await
    }

    pub async fn upsert_tree_intentions(
        &self,
        tree_id: TreeId,
        items: &[(VisitId, Vec<String>)],
    ) -> Result<(), StoreError> {
        queries::upsert_tree_intentions(&self.pool, tree_id, items).await
    }

    /// Opens the single transaction the Tree Reconciler runs its whole
    /// per-visit decision inside (§4.4, §5): the lookup, the insert, and
    /// the tree upsert all commit or abort together.
    pub async fn begin_reconcile(&self) -> Result<ReconcileTxn<'_>, StoreError> {
        let tx = self.pool.begin().await.map_err(StoreError::from)?;
        Ok(ReconcileTxn { tx })
    }
}

/// A single Reconciler call's transaction. Dropped without [`commit`] rolls
/// back automatically.
///
/// [`commit`]: ReconcileTxn::commit
pub struct ReconcileTxn<'a> {
    tx: Transaction<'a, sqlx::Sqlite>,
}

impl ReconcileTxn<'_> {
    pub async fn upsert_tree(
        &mut self,
        tree_id: TreeId,
        first_load_time: DateTime<Utc>,
        latest_activity_time: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        queries::upsert_tree(&mut *self.tx, tree_id, first_load_time, latest_activity_time).await
    }

    pub async fn insert_visit(&mut self, visit: &Visit) -> Result<(), StoreError> {
        queries::insert_visit(&mut *self.tx, visit).await
    }

    pub async fn find_visit_by_referrer_url(
        &mut self,
        prefix_url: &str,
        near_timestamp: DateTime<Utc>,
    ) -> Result<Option<Visit>, StoreError> {
        queries::find_visit_by_referrer_url(&mut *self.tx, prefix_url, near_timestamp).await
    }

    pub async fn get_visit(&mut self, visit_id: VisitId) -> Result<Option<Visit>, StoreError> {
        queries::get_visit(&mut *self.tx, visit_id).await
    }

    pub async fn update_visit_parent(
        &mut self,
        visit_id: VisitId,
        tree_id: TreeId,
        referrer_visit_id: VisitId,
    ) -> Result<(), StoreError> {
        queries::update_visit_parent(&mut *self.tx, visit_id, tree_id, referrer_visit_id).await
    }

    pub async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(StoreError::from)
    }
}
