//! DDL for the four persistent tables and their indexes (§4.2).
//!
//! Timestamps are stored twice: once as the canonical RFC 3339 `TEXT` the
//! rest of the system round-trips, and once as an epoch-millisecond
//! `INTEGER` companion column used for `ORDER BY`/`MAX`/proximity
//! arithmetic, because `TEXT` timestamps of varying fractional-second
//! precision do not sort correctly against each other in SQLite.

pub(crate) const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS trees (
    tree_id               TEXT PRIMARY KEY,
    first_load_time       TEXT NOT NULL,
    first_load_time_ms    INTEGER NOT NULL,
    latest_activity_time  TEXT NOT NULL,
    latest_activity_time_ms INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS visits (
    visit_id           TEXT PRIMARY KEY,
    url                TEXT NOT NULL,
    referrer_url       TEXT,
    referrer_visit_id  TEXT REFERENCES visits(visit_id),
    page_loaded_at     TEXT NOT NULL,
    page_loaded_at_ms  INTEGER NOT NULL,
    tree_id            TEXT NOT NULL REFERENCES trees(tree_id)
);

CREATE TABLE IF NOT EXISTS analysis (
    visit_id  TEXT PRIMARY KEY REFERENCES visits(visit_id),
    title     TEXT,
    summary   TEXT,
    intentions TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS tree_intentions (
    tree_id    TEXT NOT NULL REFERENCES trees(tree_id),
    visit_id   TEXT NOT NULL REFERENCES visits(visit_id),
    intentions TEXT NOT NULL DEFAULT '[]',
    PRIMARY KEY (tree_id, visit_id)
);

CREATE INDEX IF NOT EXISTS idx_visits_url ON visits(url);
CREATE INDEX IF NOT EXISTS idx_visits_tree_id ON visits(tree_id);
CREATE INDEX IF NOT EXISTS idx_visits_referrer_visit_id ON visits(referrer_visit_id);
CREATE INDEX IF NOT EXISTS idx_visits_page_loaded_at ON visits(page_loaded_at_ms);
CREATE INDEX IF NOT EXISTS idx_trees_latest_activity_time ON trees(latest_activity_time_ms);
CREATE INDEX IF NOT EXISTS idx_analysis_title ON analysis(title);
CREATE INDEX IF NOT EXISTS idx_tree_intentions_tree_visit ON tree_intentions(tree_id, visit_id);
";
