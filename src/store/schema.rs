//! SQLite DDL definitions for the rank store.
//!
//! All `CREATE TABLE` / `CREATE INDEX` statements live here so they are
//! reviewable and testable in isolation.

use rusqlite::Connection;

/// Complete DDL for the rank database.
///
/// Uses `IF NOT EXISTS` throughout so `apply_schema` is idempotent.
pub(crate) const SCHEMA_SQL: &str = r#"
-- Enable WAL mode for concurrent reads during writes.
PRAGMA journal_mode = WAL;

-- Enforce foreign key constraints (affiliate links cascade with results).
PRAGMA foreign_keys = ON;

-- Schema version tracking.
CREATE TABLE IF NOT EXISTS schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS projects (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    name       TEXT NOT NULL,
    created_at INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS keywords (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id    INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    text          TEXT NOT NULL,
    search_volume INTEGER,             -- primary provider hit count only
    max_rank      INTEGER NOT NULL DEFAULT 50,
    created_at    INTEGER NOT NULL DEFAULT 0,
    UNIQUE (project_id, text)
);

CREATE TABLE IF NOT EXISTS runs (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id  INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    keyword_id  INTEGER REFERENCES keywords(id) ON DELETE CASCADE,
    scope       TEXT NOT NULL,         -- 'project' | 'keyword'
    status      TEXT NOT NULL DEFAULT 'pending',
    max_rank    INTEGER NOT NULL,
    executed_at INTEGER NOT NULL DEFAULT 0,
    started_at  INTEGER,
    finished_at INTEGER,
    error       TEXT
);

CREATE INDEX IF NOT EXISTS idx_runs_project ON runs(project_id);
CREATE INDEX IF NOT EXISTS idx_runs_status  ON runs(status);

-- Tracked keyword set, frozen when the run is created.
CREATE TABLE IF NOT EXISTS run_keywords (
    run_id     INTEGER NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    keyword_id INTEGER NOT NULL REFERENCES keywords(id) ON DELETE CASCADE,
    PRIMARY KEY (run_id, keyword_id)
);

CREATE TABLE IF NOT EXISTS media_sites (
    id     INTEGER PRIMARY KEY AUTOINCREMENT,
    domain TEXT NOT NULL UNIQUE,       -- lowercase host, leading www. stripped
    name   TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS search_results (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id        INTEGER NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    keyword_id    INTEGER NOT NULL REFERENCES keywords(id) ON DELETE CASCADE,
    media_site_id INTEGER NOT NULL REFERENCES media_sites(id),
    rank          INTEGER NOT NULL,    -- 0 marks the not-found placeholder
    page_url      TEXT NOT NULL,
    title         TEXT NOT NULL DEFAULT '',
    UNIQUE (run_id, keyword_id, rank)
);

CREATE INDEX IF NOT EXISTS idx_results_run_keyword ON search_results(run_id, keyword_id);

CREATE TABLE IF NOT EXISTS affiliate_links (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    search_result_id INTEGER NOT NULL REFERENCES search_results(id) ON DELETE CASCADE,
    link_url         TEXT NOT NULL,
    asp_name         TEXT NOT NULL,
    product_name     TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_links_result ON affiliate_links(search_result_id);

CREATE TABLE IF NOT EXISTS keyword_failures (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id     INTEGER NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    keyword_id INTEGER NOT NULL REFERENCES keywords(id) ON DELETE CASCADE,
    attempts   INTEGER NOT NULL,
    error      TEXT NOT NULL,
    failed_at  INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_failures_run ON keyword_failures(run_id);
"#;

/// Apply the full schema to an open connection.
///
/// Safe to call multiple times; all statements use `IF NOT EXISTS`.
/// Inserts the current schema version into `schema_meta` if not already
/// present.
pub(crate) fn apply_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    let version_str = super::types::CURRENT_SCHEMA_VERSION.to_string();
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
        rusqlite::params![version_str],
    )?;

    Ok(())
}

/// Read the current schema version from the database.
///
/// Returns `None` if the `schema_meta` table is empty or the key is missing.
pub(crate) fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<u32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_meta WHERE key = 'schema_version'")?;
    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().ok())
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_schema_creates_tables() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        apply_schema(&conn).expect("first apply_schema");

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .expect("prepare")
            .query_map([], |row| row.get(0))
            .expect("query")
            .filter_map(|r| r.ok())
            .collect();

        for table in [
            "affiliate_links",
            "keyword_failures",
            "keywords",
            "media_sites",
            "projects",
            "run_keywords",
            "runs",
            "schema_meta",
            "search_results",
        ] {
            assert!(tables.contains(&table.to_owned()), "missing table {table}");
        }
    }

    #[test]
    fn apply_schema_is_idempotent() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        apply_schema(&conn).expect("first apply_schema");
        apply_schema(&conn).expect("second apply_schema (idempotent)");
    }

    #[test]
    fn schema_version_is_seeded() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        apply_schema(&conn).expect("apply_schema");

        let version = read_schema_version(&conn)
            .expect("read_schema_version")
            .expect("version should exist");
        assert_eq!(version, super::super::types::CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn rank_is_unique_per_run_and_keyword() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        apply_schema(&conn).expect("apply_schema");
        conn.execute_batch(
            "INSERT INTO projects (name) VALUES ('p');
             INSERT INTO keywords (project_id, text) VALUES (1, 'k');
             INSERT INTO runs (project_id, scope, max_rank) VALUES (1, 'project', 10);
             INSERT INTO media_sites (domain) VALUES ('example.com');
             INSERT INTO search_results (run_id, keyword_id, media_site_id, rank, page_url)
                 VALUES (1, 1, 1, 1, 'https://example.com/');",
        )
        .expect("seed");

        let dup = conn.execute(
            "INSERT INTO search_results (run_id, keyword_id, media_site_id, rank, page_url)
             VALUES (1, 1, 1, 1, 'https://example.com/other')",
            [],
        );
        assert!(dup.is_err());
    }
}
