//! SQLite-backed rank store.
//!
//! Thread-safe via an internal `Mutex<Connection>`. Every status
//! read-modify-write happens inside one transaction while the mutex is
//! held, and status changes are guarded `UPDATE … WHERE status = …`
//! statements, so concurrent keyword units can never complete a run twice.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rank_search::ExtractedLink;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};

use super::schema::{apply_schema, read_schema_version};
use super::types::{
    AffiliateLink, CompletionCheck, Keyword, KeywordFailure, MediaSite, NewResult, Project, Run,
    RunScope, RunStatus, SearchResultRow, now_epoch_secs, str_to_status,
};

const RUN_COLUMNS: &str = "id, project_id, keyword_id, scope, status, max_rank, executed_at, \
                           started_at, finished_at, error";
const KEYWORD_COLUMNS: &str = "id, project_id, text, search_volume, max_rank, created_at";
const RESULT_COLUMNS: &str = "id, run_id, keyword_id, media_site_id, rank, page_url, title";

/// SQLite-backed store for projects, keywords, runs and their results.
pub struct RankStore {
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
}

impl RankStore {
    /// Open (or create) the database at `db_path`, creating parent
    /// directories as needed. Applies the schema if the database is new.
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        let conn = Connection::open(db_path)?;
        apply_schema(&conn)?;
        Ok(Self {
            path: Some(db_path.to_path_buf()),
            conn: Mutex::new(conn),
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self {
            path: None,
            conn: Mutex::new(conn),
        })
    }

    /// Database file path, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read the current schema version from the database.
    pub fn schema_version(&self) -> Result<Option<u32>, StoreError> {
        let conn = self.lock()?;
        Ok(read_schema_version(&conn)?)
    }

    // -----------------------------------------------------------------------
    // Projects and keywords
    // -----------------------------------------------------------------------

    pub fn create_project(&self, name: &str) -> Result<Project, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::Invalid("project name must not be empty".into()));
        }
        let conn = self.lock()?;
        let now = now_epoch_secs();
        conn.execute(
            "INSERT INTO projects (name, created_at) VALUES (?1, ?2)",
            params![name, now],
        )?;
        Ok(Project {
            id: conn.last_insert_rowid(),
            name: name.to_owned(),
            created_at: now,
        })
    }

    pub fn get_project(&self, id: i64) -> Result<Project, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, name, created_at FROM projects WHERE id = ?1",
            params![id],
            row_to_project,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("project {id}")))
    }

    pub fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, name, created_at FROM projects ORDER BY id")?;
        let rows = stmt.query_map([], row_to_project)?;
        collect_rows(rows)
    }

    /// Add a keyword to a project. Keyword text is unique per project.
    pub fn add_keyword(
        &self,
        project_id: i64,
        text: &str,
        max_rank: u32,
    ) -> Result<Keyword, StoreError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(StoreError::Invalid("keyword text must not be empty".into()));
        }
        if max_rank == 0 {
            return Err(StoreError::Invalid("keyword max_rank must be at least 1".into()));
        }
        let conn = self.lock()?;
        ensure_exists(&conn, "projects", project_id)?;

        let now = now_epoch_secs();
        let inserted = conn.execute(
            "INSERT INTO keywords (project_id, text, max_rank, created_at) VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT (project_id, text) DO NOTHING",
            params![project_id, text, max_rank, now],
        )?;
        if inserted == 0 {
            return Err(StoreError::Duplicate(format!(
                "keyword {text:?} already exists in project {project_id}"
            )));
        }
        Ok(Keyword {
            id: conn.last_insert_rowid(),
            project_id,
            text: text.to_owned(),
            search_volume: None,
            max_rank,
            created_at: now,
        })
    }

    pub fn get_keyword(&self, id: i64) -> Result<Keyword, StoreError> {
        let conn = self.lock()?;
        query_keyword(&conn, id)
    }

    pub fn list_keywords(&self, project_id: i64) -> Result<Vec<Keyword>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {KEYWORD_COLUMNS} FROM keywords WHERE project_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![project_id], row_to_keyword)?;
        collect_rows(rows)
    }

    /// Store a hit estimate from the primary provider.
    pub fn update_search_volume(&self, keyword_id: i64, volume: i64) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE keywords SET search_volume = ?1 WHERE id = ?2",
            params![volume, keyword_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("keyword {keyword_id}")));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Create a pending run and freeze its tracked keyword set.
    pub fn create_run(&self, scope: RunScope, max_rank: u32) -> Result<Run, StoreError> {
        if max_rank == 0 {
            return Err(StoreError::Invalid("run max_rank must be at least 1".into()));
        }
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        let (project_id, keyword_id, keyword_ids) = match scope {
            RunScope::Project(project_id) => {
                ensure_exists(&tx, "projects", project_id)?;
                let mut stmt =
                    tx.prepare("SELECT id FROM keywords WHERE project_id = ?1 ORDER BY id")?;
                let ids = stmt
                    .query_map(params![project_id], |row| row.get::<_, i64>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                (project_id, None, ids)
            }
            RunScope::Keyword(keyword_id) => {
                let keyword = query_keyword(&tx, keyword_id)?;
                (keyword.project_id, Some(keyword_id), vec![keyword_id])
            }
        };
        if keyword_ids.is_empty() {
            return Err(StoreError::Invalid(format!(
                "project {project_id} has no keywords to track"
            )));
        }

        let now = now_epoch_secs();
        tx.execute(
            "INSERT INTO runs (project_id, keyword_id, scope, status, max_rank, executed_at) \
             VALUES (?1, ?2, ?3, 'pending', ?4, ?5)",
            params![project_id, keyword_id, scope.kind_str(), max_rank, now],
        )?;
        let run_id = tx.last_insert_rowid();
        {
            let mut stmt =
                tx.prepare("INSERT INTO run_keywords (run_id, keyword_id) VALUES (?1, ?2)")?;
            for id in &keyword_ids {
                stmt.execute(params![run_id, id])?;
            }
        }
        tx.commit()?;

        Ok(Run {
            id: run_id,
            project_id,
            scope,
            status: RunStatus::Pending,
            max_rank,
            executed_at: now,
            started_at: None,
            finished_at: None,
            error: None,
        })
    }

    pub fn get_run(&self, id: i64) -> Result<Run, StoreError> {
        let conn = self.lock()?;
        query_run(&conn, id)
    }

    /// Runs, newest first, optionally limited to one project.
    pub fn list_runs(&self, project_id: Option<i64>) -> Result<Vec<Run>, StoreError> {
        let conn = self.lock()?;
        let runs = match project_id {
            Some(pid) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {RUN_COLUMNS} FROM runs WHERE project_id = ?1 ORDER BY id DESC"
                ))?;
                let rows = stmt.query_map(params![pid], row_to_run)?;
                collect_rows(rows)?
            }
            None => {
                let mut stmt =
                    conn.prepare(&format!("SELECT {RUN_COLUMNS} FROM runs ORDER BY id DESC"))?;
                let rows = stmt.query_map([], row_to_run)?;
                collect_rows(rows)?
            }
        };
        Ok(runs)
    }

    /// The keyword set frozen when the run was created.
    pub fn run_keywords(&self, run_id: i64) -> Result<Vec<Keyword>, StoreError> {
        let conn = self.lock()?;
        ensure_exists(&conn, "runs", run_id)?;
        let mut stmt = conn.prepare(
            "SELECT k.id, k.project_id, k.text, k.search_volume, k.max_rank, k.created_at \
             FROM run_keywords rk JOIN keywords k ON k.id = rk.keyword_id \
             WHERE rk.run_id = ?1 ORDER BY k.id",
        )?;
        let rows = stmt.query_map(params![run_id], row_to_keyword)?;
        collect_rows(rows)
    }

    /// Move a run from `pending` to `running`. Returns `true` only for the
    /// call that performed the transition.
    pub fn try_start_run(&self, run_id: i64) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE runs SET status = 'running', started_at = ?1 \
             WHERE id = ?2 AND status = 'pending'",
            params![now_epoch_secs(), run_id],
        )?;
        if changed == 0 {
            ensure_exists(&conn, "runs", run_id)?;
        }
        Ok(changed == 1)
    }

    /// Complete the run if every tracked keyword has at least one result row.
    pub fn check_completion(&self, run_id: i64) -> Result<CompletionCheck, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let status = query_status(&tx, run_id)?;
        if status.is_terminal() {
            return Ok(CompletionCheck::AlreadyTerminal(status));
        }

        let total: u32 = tx.query_row(
            "SELECT COUNT(*) FROM run_keywords WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        let done: u32 = tx.query_row(
            "SELECT COUNT(DISTINCT sr.keyword_id) FROM search_results sr \
             JOIN run_keywords rk ON rk.run_id = sr.run_id AND rk.keyword_id = sr.keyword_id \
             WHERE sr.run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;

        if total == 0 || done < total {
            return Ok(CompletionCheck::Pending { done, total });
        }

        let changed = tx.execute(
            "UPDATE runs SET status = 'completed', finished_at = ?1 \
             WHERE id = ?2 AND status = 'running'",
            params![now_epoch_secs(), run_id],
        )?;
        tx.commit()?;

        if changed == 1 {
            Ok(CompletionCheck::Completed)
        } else {
            // Still pending: nobody has started the run yet.
            Ok(CompletionCheck::Pending { done, total })
        }
    }

    /// Mark a non-terminal run as failed. Returns `false` if it was already
    /// terminal.
    pub fn fail_run(&self, run_id: i64, reason: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE runs SET status = 'failed', finished_at = ?1, error = ?2 \
             WHERE id = ?3 AND status IN ('pending', 'running')",
            params![now_epoch_secs(), reason, run_id],
        )?;
        if changed == 0 {
            ensure_exists(&conn, "runs", run_id)?;
        }
        Ok(changed == 1)
    }

    // -----------------------------------------------------------------------
    // Results and links
    // -----------------------------------------------------------------------

    /// Replace the result set of one keyword in one run.
    ///
    /// In a single transaction: refuses terminal runs, gets or creates the
    /// media sites, upserts rows by `(run, keyword, rank)`, deletes rows of
    /// that keyword whose rank is not in `rows`, and replaces the affiliate
    /// links of every row that carries some. Returns the stored rows in
    /// rank order.
    pub fn replace_results(
        &self,
        run_id: i64,
        keyword_id: i64,
        rows: &[NewResult],
    ) -> Result<Vec<SearchResultRow>, StoreError> {
        if rows.is_empty() {
            return Err(StoreError::Invalid(
                "a result set needs at least one row".into(),
            ));
        }
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let status = query_status(&tx, run_id)?;
        if status.is_terminal() {
            return Err(StoreError::RunTerminal { run_id, status });
        }
        let tracked: bool = tx.query_row(
            "SELECT EXISTS (SELECT 1 FROM run_keywords WHERE run_id = ?1 AND keyword_id = ?2)",
            params![run_id, keyword_id],
            |row| row.get(0),
        )?;
        if !tracked {
            return Err(StoreError::Invalid(format!(
                "keyword {keyword_id} is not tracked by run {run_id}"
            )));
        }

        let mut kept_ids = HashSet::new();
        let mut seen_ranks = HashSet::new();
        for row in rows {
            if !seen_ranks.insert(row.rank) {
                tracing::warn!(
                    run_id,
                    keyword_id,
                    rank = row.rank,
                    page_url = %row.page_url,
                    "duplicate rank in result set, keeping the first row"
                );
                continue;
            }
            let media_site_id = get_or_create_media_site(&tx, &row.domain, &row.site_name)?;
            let result_id: i64 = tx.query_row(
                "INSERT INTO search_results (run_id, keyword_id, media_site_id, rank, page_url, title) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                 ON CONFLICT (run_id, keyword_id, rank) DO UPDATE SET \
                     media_site_id = excluded.media_site_id, \
                     page_url = excluded.page_url, \
                     title = excluded.title \
                 RETURNING id",
                params![run_id, keyword_id, media_site_id, row.rank, row.page_url, row.title],
                |r| r.get(0),
            )?;
            kept_ids.insert(result_id);

            if let Some(links) = &row.links {
                replace_links_tx(&tx, result_id, links)?;
            }
        }

        let existing: Vec<i64> = {
            let mut stmt =
                tx.prepare("SELECT id FROM search_results WHERE run_id = ?1 AND keyword_id = ?2")?;
            stmt.query_map(params![run_id, keyword_id], |r| r.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?
        };
        let mut stale = 0usize;
        for id in existing.into_iter().filter(|id| !kept_ids.contains(id)) {
            stale += tx.execute("DELETE FROM search_results WHERE id = ?1", params![id])?;
        }

        let stored = query_results(&tx, run_id, Some(keyword_id))?;
        tx.commit()?;

        tracing::debug!(
            run_id,
            keyword_id,
            rows = stored.len(),
            stale,
            "result set replaced"
        );
        Ok(stored)
    }

    /// All result rows of a run, ordered by keyword then rank.
    pub fn results_for_run(&self, run_id: i64) -> Result<Vec<SearchResultRow>, StoreError> {
        let conn = self.lock()?;
        ensure_exists(&conn, "runs", run_id)?;
        query_results(&conn, run_id, None)
    }

    /// Result rows of one keyword in a run, in rank order.
    pub fn results_for_keyword(
        &self,
        run_id: i64,
        keyword_id: i64,
    ) -> Result<Vec<SearchResultRow>, StoreError> {
        let conn = self.lock()?;
        query_results(&conn, run_id, Some(keyword_id))
    }

    pub fn links_for_result(&self, search_result_id: i64) -> Result<Vec<AffiliateLink>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, search_result_id, link_url, asp_name, product_name \
             FROM affiliate_links WHERE search_result_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![search_result_id], row_to_link)?;
        collect_rows(rows)
    }

    pub fn media_site(&self, id: i64) -> Result<MediaSite, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, domain, name FROM media_sites WHERE id = ?1",
            params![id],
            row_to_media_site,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("media site {id}")))
    }

    pub fn media_site_by_domain(&self, domain: &str) -> Result<Option<MediaSite>, StoreError> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                "SELECT id, domain, name FROM media_sites WHERE domain = ?1",
                params![domain],
                row_to_media_site,
            )
            .optional()?)
    }

    // -----------------------------------------------------------------------
    // Failures
    // -----------------------------------------------------------------------

    pub fn record_keyword_failure(
        &self,
        run_id: i64,
        keyword_id: i64,
        attempts: u32,
        error: &str,
    ) -> Result<KeywordFailure, StoreError> {
        let conn = self.lock()?;
        let now = now_epoch_secs();
        conn.execute(
            "INSERT INTO keyword_failures (run_id, keyword_id, attempts, error, failed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![run_id, keyword_id, attempts, error, now],
        )?;
        Ok(KeywordFailure {
            id: conn.last_insert_rowid(),
            run_id,
            keyword_id,
            attempts,
            error: error.to_owned(),
            failed_at: now,
        })
    }

    pub fn keyword_failures(&self, run_id: i64) -> Result<Vec<KeywordFailure>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, run_id, keyword_id, attempts, error, failed_at \
             FROM keyword_failures WHERE run_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok(KeywordFailure {
                id: row.get(0)?,
                run_id: row.get(1)?,
                keyword_id: row.get(2)?,
                attempts: row.get(3)?,
                error: row.get(4)?,
                failed_at: row.get(5)?,
            })
        })?;
        collect_rows(rows)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))
    }
}

/// Errors from the rank store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("invalid: {0}")]
    Invalid(String),

    #[error("run {run_id} is {status} and can no longer change")]
    RunTerminal { run_id: i64, status: RunStatus },

    #[error("lock poisoned: {0}")]
    Lock(String),
}

// ---------------------------------------------------------------------------
// Query helpers
// ---------------------------------------------------------------------------

fn collect_rows<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
) -> Result<Vec<T>, StoreError> {
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

/// `NotFound` unless `table` has a row with `id`.
fn ensure_exists(conn: &Connection, table: &str, id: i64) -> Result<(), StoreError> {
    let exists: bool = conn.query_row(
        &format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE id = ?1)"),
        params![id],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(StoreError::NotFound(format!(
            "{} {id}",
            table.trim_end_matches('s')
        )))
    }
}

fn query_keyword(conn: &Connection, id: i64) -> Result<Keyword, StoreError> {
    conn.query_row(
        &format!("SELECT {KEYWORD_COLUMNS} FROM keywords WHERE id = ?1"),
        params![id],
        row_to_keyword,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("keyword {id}")))
}

fn query_run(conn: &Connection, id: i64) -> Result<Run, StoreError> {
    conn.query_row(
        &format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ?1"),
        params![id],
        row_to_run,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("run {id}")))
}

fn query_status(conn: &Connection, run_id: i64) -> Result<RunStatus, StoreError> {
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM runs WHERE id = ?1",
            params![run_id],
            |row| row.get(0),
        )
        .optional()?;
    status
        .map(|s| str_to_status(&s))
        .ok_or_else(|| StoreError::NotFound(format!("run {run_id}")))
}

fn query_results(
    conn: &Connection,
    run_id: i64,
    keyword_id: Option<i64>,
) -> Result<Vec<SearchResultRow>, StoreError> {
    match keyword_id {
        Some(kid) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RESULT_COLUMNS} FROM search_results \
                 WHERE run_id = ?1 AND keyword_id = ?2 ORDER BY rank"
            ))?;
            let rows = stmt.query_map(params![run_id, kid], row_to_result)?;
            collect_rows(rows)
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RESULT_COLUMNS} FROM search_results \
                 WHERE run_id = ?1 ORDER BY keyword_id, rank"
            ))?;
            let rows = stmt.query_map(params![run_id], row_to_result)?;
            collect_rows(rows)
        }
    }
}

/// Media-site id for `domain`, creating the site on first sight. An
/// existing site keeps its first-seen display name.
fn get_or_create_media_site(
    tx: &Transaction<'_>,
    domain: &str,
    name: &str,
) -> Result<i64, StoreError> {
    tx.execute(
        "INSERT INTO media_sites (domain, name) VALUES (?1, ?2) ON CONFLICT (domain) DO NOTHING",
        params![domain, name],
    )?;
    Ok(tx.query_row(
        "SELECT id FROM media_sites WHERE domain = ?1",
        params![domain],
        |row| row.get(0),
    )?)
}

/// Delete-then-insert the link set of one result row, deduplicated by URL.
fn replace_links_tx(
    tx: &Transaction<'_>,
    search_result_id: i64,
    links: &[ExtractedLink],
) -> Result<usize, StoreError> {
    tx.execute(
        "DELETE FROM affiliate_links WHERE search_result_id = ?1",
        params![search_result_id],
    )?;
    let mut stmt = tx.prepare(
        "INSERT INTO affiliate_links (search_result_id, link_url, asp_name, product_name) \
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    let mut seen = HashSet::new();
    for link in links {
        if seen.insert(link.link_url.as_str()) {
            stmt.execute(params![
                search_result_id,
                link.link_url,
                link.asp_name,
                link.product_name
            ])?;
        }
    }
    Ok(seen.len())
}

// ---------------------------------------------------------------------------
// Row conversion helpers
// ---------------------------------------------------------------------------

fn row_to_project(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: row.get(2)?,
    })
}

fn row_to_keyword(row: &rusqlite::Row<'_>) -> rusqlite::Result<Keyword> {
    Ok(Keyword {
        id: row.get(0)?,
        project_id: row.get(1)?,
        text: row.get(2)?,
        search_volume: row.get(3)?,
        max_rank: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn row_to_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<Run> {
    let project_id: i64 = row.get(1)?;
    let keyword_id: Option<i64> = row.get(2)?;
    let scope_str: String = row.get(3)?;
    let status_str: String = row.get(4)?;

    let scope = match (scope_str.as_str(), keyword_id) {
        ("keyword", Some(kid)) => RunScope::Keyword(kid),
        _ => RunScope::Project(project_id),
    };

    Ok(Run {
        id: row.get(0)?,
        project_id,
        scope,
        status: str_to_status(&status_str),
        max_rank: row.get(5)?,
        executed_at: row.get(6)?,
        started_at: row.get(7)?,
        finished_at: row.get(8)?,
        error: row.get(9)?,
    })
}

fn row_to_result(row: &rusqlite::Row<'_>) -> rusqlite::Result<SearchResultRow> {
    Ok(SearchResultRow {
        id: row.get(0)?,
        run_id: row.get(1)?,
        keyword_id: row.get(2)?,
        media_site_id: row.get(3)?,
        rank: row.get(4)?,
        page_url: row.get(5)?,
        title: row.get(6)?,
    })
}

fn row_to_media_site(row: &rusqlite::Row<'_>) -> rusqlite::Result<MediaSite> {
    Ok(MediaSite {
        id: row.get(0)?,
        domain: row.get(1)?,
        name: row.get(2)?,
    })
}

fn row_to_link(row: &rusqlite::Row<'_>) -> rusqlite::Result<AffiliateLink> {
    Ok(AffiliateLink {
        id: row.get(0)?,
        search_result_id: row.get(1)?,
        link_url: row.get(2)?,
        asp_name: row.get(3)?,
        product_name: row.get(4)?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::{NOT_FOUND_DOMAIN, NOT_FOUND_RANK};

    fn test_store() -> (tempfile::TempDir, RankStore) {
        let dir = tempfile::TempDir::new().expect("create temp dir");
        let store = RankStore::open(&dir.path().join("rankwatch.db")).expect("open RankStore");
        (dir, store)
    }

    fn row(rank: u32, url: &str) -> NewResult {
        let domain = rank_search::url_normalize::domain_key(url).expect("domain");
        let site_name = rank_search::url_normalize::display_host(url).expect("host");
        NewResult {
            rank,
            page_url: url.to_owned(),
            title: format!("Title {rank}"),
            domain,
            site_name,
            links: None,
        }
    }

    fn link(url: &str) -> ExtractedLink {
        ExtractedLink {
            asp_name: "A8.net".into(),
            link_url: url.into(),
            product_name: "Widget".into(),
        }
    }

    /// Project with `n` keywords and a started project-scope run.
    fn seeded(store: &RankStore, n: usize) -> (Project, Vec<Keyword>, Run) {
        let project = store.create_project("Widgets").expect("project");
        let keywords: Vec<Keyword> = (0..n)
            .map(|i| {
                store
                    .add_keyword(project.id, &format!("widget {i}"), 50)
                    .expect("keyword")
            })
            .collect();
        let run = store
            .create_run(RunScope::Project(project.id), 10)
            .expect("run");
        assert!(store.try_start_run(run.id).expect("start"));
        (project, keywords, run)
    }

    #[test]
    fn open_creates_schema() {
        let (_dir, store) = test_store();
        assert_eq!(
            store.schema_version().expect("version"),
            Some(crate::store::types::CURRENT_SCHEMA_VERSION)
        );
        assert!(store.path().is_some());
    }

    #[test]
    fn keyword_text_unique_per_project() {
        let (_dir, store) = test_store();
        let a = store.create_project("A").expect("project");
        let b = store.create_project("B").expect("project");
        store.add_keyword(a.id, "blue widgets", 50).expect("first");
        let dup = store.add_keyword(a.id, "blue widgets", 50);
        assert!(matches!(dup, Err(StoreError::Duplicate(_))));
        store
            .add_keyword(b.id, "blue widgets", 50)
            .expect("same text in another project");
    }

    #[test]
    fn add_keyword_to_missing_project_is_not_found() {
        let (_dir, store) = test_store();
        assert!(matches!(
            store.add_keyword(99, "x", 10),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn create_run_snapshots_keywords() {
        let (_dir, store) = test_store();
        let (project, keywords, run) = seeded(&store, 3);
        // Keywords added later are not tracked by the existing run.
        store.add_keyword(project.id, "late", 50).expect("late keyword");

        let tracked = store.run_keywords(run.id).expect("tracked");
        assert_eq!(tracked.len(), 3);
        assert_eq!(tracked[0].id, keywords[0].id);
        assert_eq!(run.scope, RunScope::Project(project.id));
    }

    #[test]
    fn create_run_without_keywords_is_invalid() {
        let (_dir, store) = test_store();
        let project = store.create_project("Empty").expect("project");
        assert!(matches!(
            store.create_run(RunScope::Project(project.id), 10),
            Err(StoreError::Invalid(_))
        ));
    }

    #[test]
    fn keyword_scope_run_tracks_one_keyword() {
        let (_dir, store) = test_store();
        let project = store.create_project("P").expect("project");
        let k = store.add_keyword(project.id, "one", 20).expect("keyword");
        store.add_keyword(project.id, "two", 20).expect("keyword");

        let run = store.create_run(RunScope::Keyword(k.id), 5).expect("run");
        assert_eq!(run.project_id, project.id);
        let stored = store.get_run(run.id).expect("get");
        assert_eq!(stored.scope, RunScope::Keyword(k.id));
        assert_eq!(store.run_keywords(run.id).expect("tracked").len(), 1);
    }

    #[test]
    fn start_is_compare_and_set() {
        let (_dir, store) = test_store();
        let project = store.create_project("P").expect("project");
        store.add_keyword(project.id, "k", 10).expect("keyword");
        let run = store.create_run(RunScope::Project(project.id), 10).expect("run");

        assert!(store.try_start_run(run.id).expect("first start"));
        assert!(!store.try_start_run(run.id).expect("second start"));
        let run = store.get_run(run.id).expect("get");
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.started_at.is_some());
    }

    #[test]
    fn upsert_by_rank_replaces_and_prunes() {
        let (_dir, store) = test_store();
        let (_p, keywords, run) = seeded(&store, 1);
        let kid = keywords[0].id;

        let first = store
            .replace_results(
                run.id,
                kid,
                &[
                    row(1, "https://www.a.example/"),
                    row(2, "https://b.example/"),
                    row(3, "https://c.example/"),
                ],
            )
            .expect("first write");
        assert_eq!(first.len(), 3);

        let second = store
            .replace_results(
                run.id,
                kid,
                &[row(1, "https://d.example/"), row(2, "https://b.example/x")],
            )
            .expect("second write");
        assert_eq!(second.len(), 2);
        // Row identity follows the rank.
        assert_eq!(second[0].id, first[0].id);
        assert_eq!(second[0].page_url, "https://d.example/");
        assert_eq!(store.results_for_keyword(run.id, kid).expect("read").len(), 2);
    }

    #[test]
    fn duplicate_ranks_keep_first_row() {
        let (_dir, store) = test_store();
        let (_p, keywords, run) = seeded(&store, 1);

        let rows = store
            .replace_results(
                run.id,
                keywords[0].id,
                &[
                    row(1, "https://a.example/"),
                    row(1, "https://dup.example/"),
                    row(2, "https://b.example/"),
                ],
            )
            .expect("write");
        let urls: Vec<&str> = rows.iter().map(|r| r.page_url.as_str()).collect();
        assert_eq!(urls, ["https://a.example/", "https://b.example/"]);
        assert!(store.media_site_by_domain("dup.example").expect("lookup").is_none());
    }

    #[test]
    fn not_found_row_replaces_previous_rows() {
        let (_dir, store) = test_store();
        let (_p, keywords, run) = seeded(&store, 1);
        let kid = keywords[0].id;

        store
            .replace_results(run.id, kid, &[row(1, "https://a.example/")])
            .expect("found");
        let rows = store
            .replace_results(run.id, kid, &[NewResult::not_found()])
            .expect("not found");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].rank, NOT_FOUND_RANK);
        assert!(rows[0].is_not_found());

        let site = store.media_site(rows[0].media_site_id).expect("site");
        assert_eq!(site.domain, NOT_FOUND_DOMAIN);

        // And a later found result replaces the placeholder.
        let rows = store
            .replace_results(run.id, kid, &[row(1, "https://a.example/")])
            .expect("found again");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].rank, 1);
    }

    #[test]
    fn media_site_domain_is_shared_and_keeps_first_name() {
        let (_dir, store) = test_store();
        let (_p, keywords, run) = seeded(&store, 2);

        store
            .replace_results(run.id, keywords[0].id, &[row(1, "https://www.shop.example/a")])
            .expect("write");
        store
            .replace_results(run.id, keywords[1].id, &[row(4, "https://shop.example/b")])
            .expect("write");

        let site = store
            .media_site_by_domain("shop.example")
            .expect("query")
            .expect("site exists");
        assert_eq!(site.name, "www.shop.example");

        let results = store.results_for_run(run.id).expect("results");
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.media_site_id == site.id));
    }

    #[test]
    fn links_replaced_not_duplicated() {
        let (_dir, store) = test_store();
        let (_p, keywords, run) = seeded(&store, 1);
        let kid = keywords[0].id;

        let mut with_links = row(1, "https://a.example/");
        with_links.links = Some(vec![
            link("https://px.a8.net/1"),
            link("https://px.a8.net/2"),
            link("https://px.a8.net/1"),
        ]);

        let rows = store
            .replace_results(run.id, kid, &[with_links.clone()])
            .expect("first");
        store
            .replace_results(run.id, kid, &[with_links])
            .expect("second");

        let links = store.links_for_result(rows[0].id).expect("links");
        assert_eq!(links.len(), 2);
    }

    #[test]
    fn links_cascade_with_pruned_rows() {
        let (_dir, store) = test_store();
        let (_p, keywords, run) = seeded(&store, 1);
        let kid = keywords[0].id;

        let mut r2 = row(2, "https://b.example/");
        r2.links = Some(vec![link("https://px.a8.net/b")]);
        let rows = store
            .replace_results(run.id, kid, &[row(1, "https://a.example/"), r2])
            .expect("write");
        let pruned_id = rows[1].id;

        store
            .replace_results(run.id, kid, &[row(1, "https://a.example/")])
            .expect("rewrite");
        assert!(store.links_for_result(pruned_id).expect("links").is_empty());
    }

    #[test]
    fn completion_fires_exactly_once() {
        let (_dir, store) = test_store();
        let (_p, keywords, run) = seeded(&store, 2);

        store
            .replace_results(run.id, keywords[0].id, &[row(1, "https://a.example/")])
            .expect("write");
        assert_eq!(
            store.check_completion(run.id).expect("check"),
            CompletionCheck::Pending { done: 1, total: 2 }
        );

        store
            .replace_results(run.id, keywords[1].id, &[NewResult::not_found()])
            .expect("write");
        assert_eq!(
            store.check_completion(run.id).expect("check"),
            CompletionCheck::Completed
        );
        assert_eq!(
            store.check_completion(run.id).expect("check again"),
            CompletionCheck::AlreadyTerminal(RunStatus::Completed)
        );

        let run = store.get_run(run.id).expect("get");
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn concurrent_start_and_completion_each_win_once() {
        const UNITS: usize = 8;

        for _ in 0..20 {
            let (_dir, store) = test_store();
            let project = store.create_project("Widgets").expect("project");
            let keywords: Vec<Keyword> = (0..UNITS)
                .map(|i| {
                    store
                        .add_keyword(project.id, &format!("widget {i}"), 10)
                        .expect("keyword")
                })
                .collect();
            let run = store
                .create_run(RunScope::Project(project.id), 10)
                .expect("run");

            let (starts, completions) = std::thread::scope(|scope| {
                let handles: Vec<_> = keywords
                    .iter()
                    .map(|kw| {
                        let store = &store;
                        let run_id = run.id;
                        let url = format!("https://site{}.example/", kw.id);
                        scope.spawn(move || {
                            let started = store.try_start_run(run_id).expect("start");
                            store
                                .replace_results(run_id, kw.id, &[row(1, &url)])
                                .expect("write");
                            let check = store.check_completion(run_id).expect("check");
                            (started, check == CompletionCheck::Completed)
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().expect("unit thread"))
                    .fold((0, 0), |(s, c), (started, completed)| {
                        (s + usize::from(started), c + usize::from(completed))
                    })
            });

            assert_eq!(starts, 1);
            assert_eq!(completions, 1);
            let run = store.get_run(run.id).expect("get");
            assert_eq!(run.status, RunStatus::Completed);
            assert_eq!(store.results_for_run(run.id).expect("rows").len(), UNITS);
        }
    }

    #[test]
    fn terminal_runs_refuse_writes() {
        let (_dir, store) = test_store();
        let (_p, keywords, run) = seeded(&store, 1);
        let kid = keywords[0].id;

        store
            .replace_results(run.id, kid, &[row(1, "https://a.example/")])
            .expect("write");
        assert_eq!(
            store.check_completion(run.id).expect("check"),
            CompletionCheck::Completed
        );

        let err = store
            .replace_results(run.id, kid, &[row(1, "https://changed.example/")])
            .expect_err("completed run must not change");
        assert!(matches!(err, StoreError::RunTerminal { .. }));
        let rows = store.results_for_keyword(run.id, kid).expect("read");
        assert_eq!(rows[0].page_url, "https://a.example/");
    }

    #[test]
    fn fail_run_only_from_non_terminal() {
        let (_dir, store) = test_store();
        let (_p, _k, run) = seeded(&store, 1);

        assert!(store.fail_run(run.id, "search exhausted").expect("fail"));
        assert!(!store.fail_run(run.id, "again").expect("fail again"));
        let run = store.get_run(run.id).expect("get");
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error.as_deref(), Some("search exhausted"));
        assert_eq!(
            store.check_completion(run.id).expect("check"),
            CompletionCheck::AlreadyTerminal(RunStatus::Failed)
        );
    }

    #[test]
    fn untracked_keyword_rejected() {
        let (_dir, store) = test_store();
        let (project, _k, run) = seeded(&store, 1);
        let other = store.add_keyword(project.id, "late", 50).expect("keyword");
        assert!(matches!(
            store.replace_results(run.id, other.id, &[row(1, "https://a.example/")]),
            Err(StoreError::Invalid(_))
        ));
    }

    #[test]
    fn search_volume_and_failures_persist() {
        let (_dir, store) = test_store();
        let (_p, keywords, run) = seeded(&store, 1);
        let kid = keywords[0].id;

        store.update_search_volume(kid, 1_230).expect("volume");
        assert_eq!(store.get_keyword(kid).expect("kw").search_volume, Some(1_230));

        store
            .record_keyword_failure(run.id, kid, 2, "store unavailable")
            .expect("failure");
        let failures = store.keyword_failures(run.id).expect("list");
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].attempts, 2);
    }

    #[test]
    fn list_runs_newest_first() {
        let (_dir, store) = test_store();
        let (project, _k, first) = seeded(&store, 1);
        let second = store
            .create_run(RunScope::Project(project.id), 10)
            .expect("second run");
        let runs = store.list_runs(Some(project.id)).expect("list");
        assert_eq!(runs[0].id, second.id);
        assert_eq!(runs[1].id, first.id);
        assert_eq!(store.list_runs(None).expect("all").len(), 2);
    }
}
