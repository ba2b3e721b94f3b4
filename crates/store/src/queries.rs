//! Prepared-statement query bodies shared by direct pool execution and
//! explicit transactions (§4.2, §4.4). Every function here is generic over
//! [`sqlx::Executor`] so the Reconciler can run the whole
//! find-then-insert-then-upsert sequence inside one transaction while the
//! Workflow Dispatcher can run single-shot reads straight against the pool.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite};

use wayline_primitives::{Analysis, TreeId, Visit, VisitId, VisitWithMeta};

use crate::error::StoreError;

fn parse_visit_id(raw: &str) -> Result<VisitId, StoreError> {
    raw.parse()
        .map_err(|_| StoreError::Serialisation(format!("invalid visit id: {raw}")))
}

fn parse_tree_id(raw: &str) -> Result<TreeId, StoreError> {
    raw.parse()
        .map_err(|_| StoreError::Serialisation(format!("invalid tree id: {raw}")))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

fn parse_intentions(raw: Option<String>) -> Result<Vec<String>, StoreError> {
    match raw {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Ok(Vec::new()),
    }
}

fn row_to_visit(row: &SqliteRow) -> Result<Visit, StoreError> {
    Ok(Visit {
        visit_id: parse_visit_id(row.try_get("visit_id")?)?,
        url: row.try_get("url")?,
        referrer_url: row.try_get("referrer_url")?,
        referrer_visit_id: row
            .try_get::<Option<String>, _>("referrer_visit_id")?
            .map(|s| parse_visit_id(&s))
            .transpose()?,
        page_loaded_at: parse_timestamp(row.try_get("page_loaded_at")?)?,
        tree_id: parse_tree_id(row.try_get("tree_id")?)?,
    })
}

pub(crate) async fn upsert_tree<'c, E>(
    exec: E,
    tree_id: TreeId,
    first_load_time: DateTime<Utc>,
    latest_activity_time: DateTime<Utc>,
) -> Result<(), StoreError>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        r"
        INSERT INTO trees (tree_id, first_load_time, first_load_time_ms, latest_activity_time, latest_activity_time_ms)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(tree_id) DO UPDATE SET
            latest_activity_time = CASE WHEN excluded.latest_activity_time_ms > trees.latest_activity_time_ms
                                        THEN excluded.latest_activity_time ELSE trees.latest_activity_time END,
            latest_activity_time_ms = MAX(trees.latest_activity_time_ms, excluded.latest_activity_time_ms)
        ",
    )
    .bind(tree_id.to_string())
    .bind(wayline_identity::canonical_timestamp(first_load_time))
    .bind(first_load_time.timestamp_millis())
    .bind(wayline_identity::canonical_timestamp(latest_activity_time))
    .bind(latest_activity_time.timestamp_millis())
    .execute(exec)
    .await?;
    Ok(())
}

pub(crate) async fn insert_visit<'c, E>(exec: E, visit: &Visit) -> Result<(), StoreError>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        r"
        INSERT INTO visits (visit_id, url, referrer_url, referrer_visit_id, page_loaded_at, page_loaded_at_ms, tree_id)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ",
    )
    .bind(visit.visit_id.to_string())
    .bind(&visit.url)
    .bind(&visit.referrer_url)
    .bind(visit.referrer_visit_id.map(|id| id.to_string()))
    .bind(wayline_identity::canonical_timestamp(visit.page_loaded_at))
    .bind(visit.page_loaded_at.timestamp_millis())
    .bind(visit.tree_id.to_string())
    .execute(exec)
    .await?;
    Ok(())
}

pub(crate) async fn update_visit_parent<'c, E>(
    exec: E,
    visit_id: VisitId,
    tree_id: TreeId,
    referrer_visit_id: VisitId,
) -> Result<(), StoreError>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        r"UPDATE visits SET tree_id = ?1, referrer_visit_id = ?2 WHERE visit_id = ?3",
    )
    .bind(tree_id.to_string())
    .bind(referrer_visit_id.to_string())
    .bind(visit_id.to_string())
    .execute(exec)
    .await?;
    Ok(())
}

pub(crate) async fn get_visit<'c, E>(exec: E, visit_id: VisitId) -> Result<Option<Visit>, StoreError>
where
    E: Executor<'c, Database = Sqlite>,
{
    let row = sqlx::query(
        r"SELECT visit_id, url, referrer_url, referrer_visit_id, page_loaded_at, tree_id FROM visits WHERE visit_id = ?1",
    )
    .bind(visit_id.to_string())
    .fetch_optional(exec)
    .await?;

    row.as_ref().map(row_to_visit).transpose()
}

/// Implements the §4.2/§4.4 fuzzy match: `url LIKE prefix_url || '%'`,
/// ordered by absolute distance to `near_timestamp`, earlier timestamp
/// then lexicographically smaller `visit_id` breaking remaining ties.
pub(crate) async fn find_visit_by_referrer_url<'c, E>(
    exec: E,
    prefix_url: &str,
    near_timestamp: DateTime<Utc>,
) -> Result<Option<Visit>, StoreError>
where
    E: Executor<'c, Database = Sqlite>,
{
    let escaped = prefix_url.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    let pattern = format!("{escaped}%");
    let near_ms = near_timestamp.timestamp_millis();

    let row = sqlx::query(
        r"
        SELECT visit_id, url, referrer_url, referrer_visit_id, page_loaded_at, tree_id
        FROM visits
        WHERE url LIKE ?1 ESCAPE '\'
        ORDER BY ABS(page_loaded_at_ms - ?2) ASC, page_loaded_at_ms ASC, visit_id ASC
        LIMIT 1
        ",
    )
    .bind(pattern)
    .bind(near_ms)
    .fetch_optional(exec)
    .await?;

    row.as_ref().map(row_to_visit).transpose()
}

pub(crate) async fn get_tree_members<'c, E>(
    exec: E,
    tree_id: TreeId,
) -> Result<Vec<VisitWithMeta>, StoreError>
where
    E: Executor<'c, Database = Sqlite>,
{
    let rows = sqlx::query(
        r"
        SELECT
            v.visit_id, v.url, v.referrer_url, v.referrer_visit_id, v.page_loaded_at, v.tree_id,
            a.title AS a_title, a.summary AS a_summary, a.intentions AS a_intentions,
            ti.intentions AS ti_intentions
        FROM visits v
        LEFT JOIN analysis a ON a.visit_id = v.visit_id
        LEFT JOIN tree_intentions ti ON ti.tree_id = v.tree_id AND ti.visit_id = v.visit_id
        WHERE v.tree_id = ?1
        ORDER BY v.page_loaded_at_ms ASC
        ",
    )
    .bind(tree_id.to_string())
    .fetch_all(exec)
    .await?;

    rows.iter().map(row_to_visit_with_meta).collect()
}

fn row_to_visit_with_meta(row: &SqliteRow) -> Result<VisitWithMeta, StoreError> {
    let visit = row_to_visit(row)?;

    let title: Option<String> = row.try_get("a_title")?;
    let summary: Option<String> = row.try_get("a_summary")?;
    let a_intentions: Option<String> = row.try_get("a_intentions")?;
    let analysis = if title.is_some() || summary.is_some() || a_intentions.is_some() {
        Some(Analysis {
            visit_id: visit.visit_id,
            title,
            summary,
            intentions: parse_intentions(a_intentions)?,
        })
    } else {
        None
    };

    let ti_intentions: Option<String> = row.try_get("ti_intentions")?;
    let tree_intentions = ti_intentions.map(|json| parse_intentions(Some(json))).transpose()?;

    Ok(VisitWithMeta { visit, analysis, tree_intentions })
}

pub(crate) async fn get_recent_trees_with_members<'c, E>(
    exec: E,
    exclude_tree_id: Option<TreeId>,
    limit: i64,
) -> Result<Vec<(TreeId, Vec<VisitWithMeta>)>, StoreError>
where
    E: Executor<'c, Database = Sqlite> + Copy,
{
    let tree_rows = sqlx::query(
        r"
        SELECT tree_id FROM trees
        WHERE ?1 IS NULL OR tree_id != ?1
        ORDER BY latest_activity_time_ms DESC
        LIMIT ?2
        ",
    )
    .bind(exclude_tree_id.map(|id| id.to_string()))
    .bind(limit)
    .fetch_all(exec)
    .await?;

    let mut out = Vec::with_capacity(tree_rows.len());
    for row in &tree_rows {
        let tree_id = parse_tree_id(row.try_get("tree_id")?)?;
        let members = get_tree_members(exec, tree_id).await?;
        out.push((tree_id, members));
    }
    Ok(out)
}

pub(crate) async fn insert_or_replace_analysis<'c, E>(
    exec: E,
    analysis: &Analysis,
) -> Result<(), StoreError>
where
    E: Executor<'c, Database = Sqlite>,
{
    let intentions = serde_json::to_string(&analysis.intentions)?;
    sqlx::query(
        r"
        INSERT INTO analysis (visit_id, title, summary, intentions)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(visit_id) DO UPDATE SET title = excluded.title, summary = excluded.summary, intentions = excluded.intentions
        ",
    )
    .bind(analysis.visit_id.to_string())
    .bind(&analysis.title)
    .bind(&analysis.summary)
    .bind(intentions)
    .execute(exec)
    .await?;
    Ok(())
}

pub(crate) async fn upsert_tree_intentions<'c, E>(
    exec: E,
    tree_id: TreeId,
    items: &[(VisitId, Vec<String>)],
) -> Result<(), StoreError>
where
    E: Executor<'c, Database = Sqlite> + Copy,
{
    for (visit_id, intentions) in items {
        let encoded = serde_json::to_string(intentions)?;
        sqlx::query(
            r"
            INSERT INTO tree_intentions (tree_id, visit_id, intentions)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(tree_id, visit_id) DO UPDATE SET intentions = excluded.intentions
            ",
        )
        .bind(tree_id.to_string())
        .bind(visit_id.to_string())
        .bind(encoded)
        .execute(exec)
        .await?;
    }
    Ok(())
}
