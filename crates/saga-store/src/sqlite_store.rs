//! SQLite-backed storage for repositories, analysis runs and weekly reports.
//!
//! A single `saga.db` file in WAL mode.

use rusqlite::{params, Connection, OptionalExtension};
use saga_core::{
    AnalysisRun, BudgetMetadata, RepoId, ReportContent, ReportMetadata, Repository, RunKind,
    WeeklyReport,
};
use std::path::Path;

use crate::ReportStore;

const SCHEMA_SQL: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS repositories (
    id INTEGER PRIMARY KEY,
    name TEXT UNIQUE NOT NULL,
    path TEXT NOT NULL,
    description TEXT,
    tracked_branch TEXT NOT NULL,
    last_analyzed_sha TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS analysis_runs (
    id TEXT PRIMARY KEY,
    repository_id INTEGER NOT NULL REFERENCES repositories(id),
    from_sha TEXT,
    to_sha TEXT NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    summary TEXT,
    agent_mode BOOLEAN NOT NULL,
    budget TEXT
);

CREATE INDEX IF NOT EXISTS idx_runs_repo_completed
    ON analysis_runs(repository_id, completed_at);

CREATE TABLE IF NOT EXISTS weekly_reports (
    id INTEGER PRIMARY KEY,
    repository_id INTEGER NOT NULL REFERENCES repositories(id),
    year INTEGER NOT NULL,
    week INTEGER NOT NULL,
    week_start TEXT NOT NULL,
    week_end TEXT NOT NULL,
    summary TEXT NOT NULL,
    commit_count INTEGER NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    agent_mode BOOLEAN NOT NULL,
    budget TEXT,
    analysis_run_id TEXT REFERENCES analysis_runs(id),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(repository_id, year, week)
);

CREATE INDEX IF NOT EXISTS idx_reports_repo_period
    ON weekly_reports(repository_id, year DESC, week DESC);

CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

/// v2: runs record whether they covered a watermark range or a week.
/// Existing runs referenced by a weekly report are backfilled as `week`.
const SCHEMA_V2_SQL: &str = "
ALTER TABLE analysis_runs ADD COLUMN kind TEXT NOT NULL DEFAULT 'range';

UPDATE analysis_runs SET kind = 'week'
    WHERE id IN (SELECT analysis_run_id FROM weekly_reports WHERE analysis_run_id IS NOT NULL);

CREATE INDEX IF NOT EXISTS idx_runs_repo_kind_completed
    ON analysis_runs(repository_id, kind, completed_at);
";

const SCHEMA_VERSION: u32 = 2;

const REPOSITORY_COLUMNS: &str =
    "id, name, path, description, tracked_branch, last_analyzed_sha, created_at";

const RUN_COLUMNS: &str = "id, repository_id, from_sha, to_sha, started_at, completed_at, \
     summary, agent_mode, budget, kind";

const REPORT_COLUMNS: &str = "id, repository_id, year, week, week_start, week_end, summary, \
     commit_count, metadata, agent_mode, budget, analysis_run_id, created_at, updated_at";

/// SQLite-backed storage engine.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open an existing saga.db.
    pub fn open(db_path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(db_path)?;
        let store = Self { conn };
        store.apply_pragmas()?;
        Ok(store)
    }

    /// Open or create saga.db with the full schema.
    pub fn open_or_create(db_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        let store = Self { conn };
        store.apply_pragmas()?;
        store.apply_schema()?;
        tracing::debug!(path = %db_path.display(), "opened saga.db");
        Ok(store)
    }

    fn apply_pragmas(&self) -> anyhow::Result<()> {
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    fn apply_schema(&self) -> anyhow::Result<()> {
        self.conn.execute_batch(SCHEMA_SQL)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('version', '1')",
            [],
        )?;
        let current = self.schema_version()?;
        if current > SCHEMA_VERSION {
            anyhow::bail!(
                "saga.db schema version {current} is newer than supported ({SCHEMA_VERSION})"
            );
        }
        if current < 2 {
            self.migrate_v1_to_v2()?;
        }
        Ok(())
    }

    fn set_schema_version(&self, version: u32) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO schema_meta (key, value) VALUES ('version', ?1)",
            params![version.to_string()],
        )?;
        Ok(())
    }

    fn migrate_v1_to_v2(&self) -> anyhow::Result<()> {
        self.conn.execute_batch(SCHEMA_V2_SQL)?;
        self.set_schema_version(2)?;
        tracing::debug!("migrated saga.db to schema v2");
        Ok(())
    }

    pub fn schema_version(&self) -> anyhow::Result<u32> {
        let version_str: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM schema_meta WHERE key = 'version'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version_str
            .and_then(|v| v.parse().ok())
            .unwrap_or(1))
    }

    fn report_id(&self, repo: RepoId, year: i32, week: u32) -> anyhow::Result<Option<i64>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id FROM weekly_reports WHERE repository_id = ?1 AND year = ?2 AND week = ?3",
                params![repo, year, week],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn report_by_id(&self, id: i64) -> anyhow::Result<WeeklyReport> {
        let sql = format!("SELECT {REPORT_COLUMNS} FROM weekly_reports WHERE id = ?1");
        let row = self.conn.query_row(&sql, params![id], report_row)?;
        row.into_report()
    }
}

impl ReportStore for SqliteStore {
    // ── Repositories ──

    fn ensure_repository(
        &self,
        name: &str,
        path: &str,
        description: Option<&str>,
        tracked_branch: &str,
    ) -> anyhow::Result<Repository> {
        self.conn.execute(
            "INSERT INTO repositories (name, path, description, tracked_branch, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(name) DO UPDATE SET
                path = excluded.path,
                description = COALESCE(excluded.description, repositories.description),
                tracked_branch = excluded.tracked_branch",
            params![name, path, description, tracked_branch, saga_core::now_rfc3339()],
        )?;
        self.repository(name)?
            .ok_or_else(|| anyhow::anyhow!("repository {name} missing after upsert"))
    }

    fn repository(&self, name: &str) -> anyhow::Result<Option<Repository>> {
        let sql = format!("SELECT {REPOSITORY_COLUMNS} FROM repositories WHERE name = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![name], map_repository)
            .optional()?)
    }

    fn set_watermark(&self, repo: RepoId, sha: &str) -> anyhow::Result<()> {
        let n = self.conn.execute(
            "UPDATE repositories SET last_analyzed_sha = ?1 WHERE id = ?2",
            params![sha, repo],
        )?;
        if n == 0 {
            anyhow::bail!("no repository with id {repo}");
        }
        Ok(())
    }

    // ── Analysis runs ──

    fn create_analysis_run(
        &self,
        repo: RepoId,
        kind: RunKind,
        from_sha: Option<&str>,
        to_sha: &str,
        agent_mode: bool,
    ) -> anyhow::Result<AnalysisRun> {
        let run = AnalysisRun {
            id: format!("run_{}", ulid::Ulid::new().to_string().to_lowercase()),
            repository_id: repo,
            kind,
            from_sha: from_sha.map(str::to_string),
            to_sha: to_sha.to_string(),
            started_at: saga_core::now_rfc3339(),
            completed_at: None,
            summary: None,
            agent_mode,
            budget: None,
        };
        self.conn.execute(
            "INSERT INTO analysis_runs
             (id, repository_id, kind, from_sha, to_sha, started_at, agent_mode)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run.id,
                repo,
                kind.as_str(),
                run.from_sha,
                run.to_sha,
                run.started_at,
                agent_mode
            ],
        )?;
        Ok(run)
    }

    fn complete_analysis_run(
        &self,
        run_id: &str,
        summary: &str,
        budget: Option<&BudgetMetadata>,
    ) -> anyhow::Result<()> {
        let budget_json = budget.map(serde_json::to_string).transpose()?;
        let n = self.conn.execute(
            "UPDATE analysis_runs SET completed_at = ?1, summary = ?2, budget = ?3 WHERE id = ?4",
            params![saga_core::now_rfc3339(), summary, budget_json, run_id],
        )?;
        if n == 0 {
            anyhow::bail!("no analysis run {run_id}");
        }
        Ok(())
    }

    fn latest_analysis_run(
        &self,
        repo: RepoId,
        kind: RunKind,
    ) -> anyhow::Result<Option<AnalysisRun>> {
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM analysis_runs
             WHERE repository_id = ?1 AND kind = ?2 AND completed_at IS NOT NULL
             ORDER BY julianday(completed_at) DESC, rowid DESC LIMIT 1"
        );
        let row = self
            .conn
            .query_row(&sql, params![repo, kind.as_str()], run_row)
            .optional()?;
        row.map(RunRow::into_run).transpose()
    }

    // ── Weekly reports ──

    fn report(&self, repo: RepoId, year: i32, week: u32) -> anyhow::Result<Option<WeeklyReport>> {
        let sql = format!(
            "SELECT {REPORT_COLUMNS} FROM weekly_reports
             WHERE repository_id = ?1 AND year = ?2 AND week = ?3"
        );
        let row = self
            .conn
            .query_row(&sql, params![repo, year, week], report_row)
            .optional()?;
        row.map(ReportRow::into_report).transpose()
    }

    fn report_exists(&self, repo: RepoId, year: i32, week: u32) -> anyhow::Result<bool> {
        Ok(self.report_id(repo, year, week)?.is_some())
    }

    fn insert_report(
        &self,
        repo: RepoId,
        year: i32,
        week: u32,
        content: &ReportContent,
    ) -> anyhow::Result<WeeklyReport> {
        let now = saga_core::now_rfc3339();
        self.conn.execute(
            "INSERT INTO weekly_reports
             (repository_id, year, week, week_start, week_end, summary, commit_count,
              metadata, agent_mode, budget, analysis_run_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
            params![
                repo,
                year,
                week,
                content.week_start,
                content.week_end,
                content.summary,
                content.commit_count as i64,
                serde_json::to_string(&content.metadata)?,
                content.agent_mode,
                content.budget.as_ref().map(serde_json::to_string).transpose()?,
                content.analysis_run_id,
                now,
            ],
        )?;
        self.report_by_id(self.conn.last_insert_rowid())
    }

    fn update_report(
        &self,
        repo: RepoId,
        year: i32,
        week: u32,
        content: &ReportContent,
    ) -> anyhow::Result<WeeklyReport> {
        let id = self
            .report_id(repo, year, week)?
            .ok_or_else(|| anyhow::anyhow!("no report for {year}-W{week:02}"))?;
        self.conn.execute(
            "UPDATE weekly_reports SET
                week_start = ?1, week_end = ?2, summary = ?3, commit_count = ?4,
                metadata = ?5, agent_mode = ?6, budget = ?7, analysis_run_id = ?8,
                updated_at = ?9
             WHERE id = ?10",
            params![
                content.week_start,
                content.week_end,
                content.summary,
                content.commit_count as i64,
                serde_json::to_string(&content.metadata)?,
                content.agent_mode,
                content.budget.as_ref().map(serde_json::to_string).transpose()?,
                content.analysis_run_id,
                saga_core::now_rfc3339(),
                id,
            ],
        )?;
        self.report_by_id(id)
    }

    fn latest_report(&self, repo: RepoId) -> anyhow::Result<Option<WeeklyReport>> {
        Ok(self.list_reports(repo, Some(1))?.into_iter().next())
    }

    fn list_reports(
        &self,
        repo: RepoId,
        limit: Option<usize>,
    ) -> anyhow::Result<Vec<WeeklyReport>> {
        let sql = format!(
            "SELECT {REPORT_COLUMNS} FROM weekly_reports
             WHERE repository_id = ?1
             ORDER BY year DESC, week DESC LIMIT ?2"
        );
        let limit = limit.map(|n| n as i64).unwrap_or(-1);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![repo, limit], report_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(ReportRow::into_report).collect()
    }
}

impl Drop for SqliteStore {
    fn drop(&mut self) {
        // Fold the WAL back into saga.db so an idle repo holds one file.
        let _ = self
            .conn
            .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);");
    }
}

// ── Row mapping ──

fn map_repository(row: &rusqlite::Row<'_>) -> rusqlite::Result<Repository> {
    Ok(Repository {
        id: row.get(0)?,
        name: row.get(1)?,
        path: row.get(2)?,
        description: row.get(3)?,
        tracked_branch: row.get(4)?,
        last_analyzed_sha: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Raw columns; JSON payloads are decoded outside the rusqlite closure.
struct RunRow {
    run: AnalysisRun,
    budget: Option<String>,
    kind: String,
}

fn run_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRow> {
    Ok(RunRow {
        run: AnalysisRun {
            id: row.get(0)?,
            repository_id: row.get(1)?,
            kind: RunKind::Range,
            from_sha: row.get(2)?,
            to_sha: row.get(3)?,
            started_at: row.get(4)?,
            completed_at: row.get(5)?,
            summary: row.get(6)?,
            agent_mode: row.get(7)?,
            budget: None,
        },
        budget: row.get(8)?,
        kind: row.get(9)?,
    })
}

impl RunRow {
    fn into_run(self) -> anyhow::Result<AnalysisRun> {
        let mut run = self.run;
        run.kind = RunKind::parse(&self.kind)
            .ok_or_else(|| anyhow::anyhow!("unknown run kind {:?} for {}", self.kind, run.id))?;
        run.budget = self.budget.as_deref().map(serde_json::from_str).transpose()?;
        Ok(run)
    }
}

struct ReportRow {
    report: WeeklyReport,
    metadata: String,
    budget: Option<String>,
}

fn report_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReportRow> {
    let commit_count: i64 = row.get(7)?;
    Ok(ReportRow {
        report: WeeklyReport {
            id: row.get(0)?,
            repository_id: row.get(1)?,
            year: row.get(2)?,
            week: row.get(3)?,
            week_start: row.get(4)?,
            week_end: row.get(5)?,
            summary: row.get(6)?,
            commit_count: commit_count.max(0) as usize,
            metadata: ReportMetadata::default(),
            agent_mode: row.get(9)?,
            budget: None,
            analysis_run_id: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        },
        metadata: row.get(8)?,
        budget: row.get(10)?,
    })
}

impl ReportRow {
    fn into_report(self) -> anyhow::Result<WeeklyReport> {
        let mut report = self.report;
        report.metadata = serde_json::from_str(&self.metadata)?;
        report.budget = self.budget.as_deref().map(serde_json::from_str).transpose()?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use saga_core::DiffFetchRecord;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn tmp_db() -> (std::path::PathBuf, SqliteStore) {
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir =
            std::env::temp_dir().join(format!("saga_sqlite_test_{}_{n}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let store = SqliteStore::open_or_create(&dir.join("saga.db")).unwrap();
        (dir, store)
    }

    fn content(summary: &str, commit_count: usize, run: Option<&str>) -> ReportContent {
        let mut author_counts = BTreeMap::new();
        author_counts.insert("ana".to_string(), commit_count);
        ReportContent {
            week_start: "2024-03-04T00:00:00Z".into(),
            week_end: "2024-03-10T23:59:59Z".into(),
            summary: summary.into(),
            commit_count,
            metadata: ReportMetadata {
                authors: vec!["ana".into()],
                commit_shas: (0..commit_count).map(|i| format!("c{i}")).collect(),
                author_counts,
            },
            agent_mode: true,
            budget: Some(BudgetMetadata {
                fetch_count: 1,
                total_bytes: 400,
                estimated_tokens: 100,
                fetch_log: vec![DiffFetchRecord {
                    sha: "c0".into(),
                    size_bytes: 400,
                    reason: "vague".into(),
                    timestamp: "2024-03-11T08:00:00Z".into(),
                }],
            }),
            analysis_run_id: run.map(str::to_string),
        }
    }

    #[test]
    fn schema_creation() {
        let (dir, store) = tmp_db();
        let tables: Vec<String> = store
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        for t in ["analysis_runs", "repositories", "schema_meta", "weekly_reports"] {
            assert!(tables.contains(&t.to_string()), "missing {t}");
        }
        assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);
        drop(store);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn idempotent_schema_apply() {
        let (dir, store) = tmp_db();
        store.ensure_repository("pay", "/src/pay", None, "main").unwrap();
        drop(store);
        let store = SqliteStore::open_or_create(&dir.join("saga.db")).unwrap();
        assert!(store.repository("pay").unwrap().is_some());
        drop(store);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn ensure_repository_is_idempotent_on_name() {
        let (dir, store) = tmp_db();
        let a = store
            .ensure_repository("pay", "/src/pay", Some("Payments"), "main")
            .unwrap();
        let b = store.ensure_repository("pay", "/new/pay", None, "trunk").unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.created_at, b.created_at);
        assert_eq!(b.path, "/new/pay");
        assert_eq!(b.description.as_deref(), Some("Payments"));
        assert_eq!(b.tracked_branch, "trunk");
        assert!(b.last_analyzed_sha.is_none());

        store.set_watermark(b.id, "abc123").unwrap();
        let r = store.repository("pay").unwrap().unwrap();
        assert_eq!(r.last_analyzed_sha.as_deref(), Some("abc123"));
        assert!(store.set_watermark(9999, "x").is_err());
        drop(store);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn analysis_run_lifecycle() {
        let (dir, store) = tmp_db();
        let repo = store.ensure_repository("pay", "/src/pay", None, "main").unwrap();
        assert!(store.latest_analysis_run(repo.id, RunKind::Range).unwrap().is_none());

        let run = store
            .create_analysis_run(repo.id, RunKind::Range, Some("aaa"), "bbb", true)
            .unwrap();
        assert!(run.id.starts_with("run_"));
        // Incomplete runs are not "latest".
        assert!(store.latest_analysis_run(repo.id, RunKind::Range).unwrap().is_none());

        let budget = BudgetMetadata {
            fetch_count: 2,
            total_bytes: 800,
            estimated_tokens: 200,
            fetch_log: vec![],
        };
        store
            .complete_analysis_run(&run.id, "Two fixes.", Some(&budget))
            .unwrap();
        let latest = store.latest_analysis_run(repo.id, RunKind::Range).unwrap().unwrap();
        assert_eq!(latest.id, run.id);
        assert_eq!(latest.from_sha.as_deref(), Some("aaa"));
        assert_eq!(latest.summary.as_deref(), Some("Two fixes."));
        assert_eq!(latest.budget, Some(budget));
        assert!(latest.completed_at.is_some());

        let second = store
            .create_analysis_run(repo.id, RunKind::Range, Some("bbb"), "ccc", false)
            .unwrap();
        store.complete_analysis_run(&second.id, "More.", None).unwrap();
        let latest = store.latest_analysis_run(repo.id, RunKind::Range).unwrap().unwrap();
        assert_eq!(latest.id, second.id);
        assert!(latest.budget.is_none());
        assert!(store.complete_analysis_run("run_missing", "x", None).is_err());
        drop(store);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn latest_run_is_scoped_by_kind() {
        let (dir, store) = tmp_db();
        let repo = store.ensure_repository("pay", "/src/pay", None, "main").unwrap();
        let range = store
            .create_analysis_run(repo.id, RunKind::Range, None, "c5", true)
            .unwrap();
        store.complete_analysis_run(&range.id, "Range summary.", None).unwrap();
        let week = store
            .create_analysis_run(repo.id, RunKind::Week, None, "old1", true)
            .unwrap();
        store.complete_analysis_run(&week.id, "A week in 2022.", None).unwrap();

        let latest = store.latest_analysis_run(repo.id, RunKind::Range).unwrap().unwrap();
        assert_eq!(latest.id, range.id);
        assert_eq!(latest.kind, RunKind::Range);
        let latest = store.latest_analysis_run(repo.id, RunKind::Week).unwrap().unwrap();
        assert_eq!(latest.id, week.id);
        assert_eq!(latest.summary.as_deref(), Some("A week in 2022."));
        drop(store);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn v1_database_migrates_run_kind() {
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir =
            std::env::temp_dir().join(format!("saga_sqlite_v1_{}_{n}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let db = dir.join("saga.db");
        {
            let conn = Connection::open(&db).unwrap();
            conn.execute_batch(SCHEMA_SQL).unwrap();
            conn.execute_batch(
                "INSERT INTO schema_meta (key, value) VALUES ('version', '1');
                 INSERT INTO repositories (id, name, path, tracked_branch, created_at)
                     VALUES (1, 'pay', '/src/pay', 'main', '2024-03-01T00:00:00Z');
                 INSERT INTO analysis_runs
                     (id, repository_id, to_sha, started_at, completed_at, summary, agent_mode)
                     VALUES ('run_a', 1, 'c1', '2024-03-01T00:00:00Z', '2024-03-01T00:01:00Z',
                             'range work', 0),
                            ('run_w', 1, 'c2', '2024-03-02T00:00:00Z', '2024-03-02T00:01:00Z',
                             'week work', 0);
                 INSERT INTO weekly_reports
                     (repository_id, year, week, week_start, week_end, summary, commit_count,
                      agent_mode, analysis_run_id, created_at, updated_at)
                     VALUES (1, 2024, 9, '2024-02-26T00:00:00Z', '2024-03-03T23:59:59Z',
                             'week work', 1, 0, 'run_w', '2024-03-02T00:01:00Z',
                             '2024-03-02T00:01:00Z');",
            )
            .unwrap();
        }

        let store = SqliteStore::open_or_create(&db).unwrap();
        assert_eq!(store.schema_version().unwrap(), 2);
        let range = store.latest_analysis_run(1, RunKind::Range).unwrap().unwrap();
        assert_eq!(range.id, "run_a");
        let week = store.latest_analysis_run(1, RunKind::Week).unwrap().unwrap();
        assert_eq!(week.id, "run_w");
        drop(store);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn report_insert_and_lookup() {
        let (dir, store) = tmp_db();
        let repo = store.ensure_repository("pay", "/src/pay", None, "main").unwrap();
        let run = store
            .create_analysis_run(repo.id, RunKind::Week, None, "c0", true)
            .unwrap();
        assert!(!store.report_exists(repo.id, 2024, 10).unwrap());

        let r = store
            .insert_report(repo.id, 2024, 10, &content("Week ten.", 2, Some(&run.id)))
            .unwrap();
        assert!(store.report_exists(repo.id, 2024, 10).unwrap());
        assert_eq!(r.created_at, r.updated_at);
        let got = store.report(repo.id, 2024, 10).unwrap().unwrap();
        assert_eq!(got, r);
        assert_eq!(got.metadata.commit_shas, vec!["c0", "c1"]);
        assert_eq!(got.budget.unwrap().fetch_log[0].reason, "vague");
        assert_eq!(got.analysis_run_id.as_deref(), Some(run.id.as_str()));

        let dup = store.insert_report(repo.id, 2024, 10, &content("again", 1, None));
        assert!(dup.is_err());
        drop(store);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn update_preserves_identity_and_creation() {
        let (dir, store) = tmp_db();
        let repo = store.ensure_repository("pay", "/src/pay", None, "main").unwrap();
        let first = store
            .insert_report(repo.id, 2024, 10, &content("old", 1, None))
            .unwrap();
        let updated = store
            .update_report(repo.id, 2024, 10, &content("new", 3, None))
            .unwrap();
        assert_eq!(updated.id, first.id);
        assert_eq!(updated.created_at, first.created_at);
        assert_eq!(updated.summary, "new");
        assert_eq!(updated.commit_count, 3);
        assert_eq!(updated.metadata.commit_shas.len(), 3);
        assert!(updated.analysis_run_id.is_none());

        let count: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM weekly_reports", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
        assert!(store.update_report(repo.id, 2024, 11, &content("x", 1, None)).is_err());
        drop(store);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn list_and_latest_order_by_period() {
        let (dir, store) = tmp_db();
        let repo = store.ensure_repository("pay", "/src/pay", None, "main").unwrap();
        let other = store.ensure_repository("web", "/src/web", None, "main").unwrap();
        for (year, week) in [(2023, 52), (2024, 2), (2024, 1)] {
            store
                .insert_report(repo.id, year, week, &content("s", 1, None))
                .unwrap();
        }
        store.insert_report(other.id, 2025, 1, &content("s", 1, None)).unwrap();

        let all = store.list_reports(repo.id, None).unwrap();
        let periods: Vec<_> = all.iter().map(|r| (r.year, r.week)).collect();
        assert_eq!(periods, vec![(2024, 2), (2024, 1), (2023, 52)]);
        assert_eq!(store.list_reports(repo.id, Some(2)).unwrap().len(), 2);

        let latest = store.latest_report(repo.id).unwrap().unwrap();
        assert_eq!((latest.year, latest.week), (2024, 2));
        assert!(store.latest_report(9999).unwrap().is_none());
        drop(store);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn wal_checkpoint_on_drop() {
        let (dir, store) = tmp_db();
        store.ensure_repository("pay", "/src/pay", None, "main").unwrap();
        drop(store);
        let wal = dir.join("saga.db-wal");
        if wal.exists() {
            assert_eq!(std::fs::metadata(&wal).unwrap().len(), 0);
        }
        let _ = std::fs::remove_dir_all(&dir);
    }
}
