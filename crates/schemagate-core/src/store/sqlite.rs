//! SQLite-backed migration store.
//!
//! # Tables
//!
//! ```text
//! <tracking>        (version_num TEXT NOT NULL PRIMARY KEY)   -- zero or one row
//! <tracking>_lease  (id INTEGER PRIMARY KEY CHECK (id = 1), holder TEXT, expires_at TEXT)
//! ```
//!
//! Every write runs in a `BEGIN IMMEDIATE` transaction so the read of the
//! tracking cell and the write that follows it are serialized against other
//! replicas. Migration SQL runs inside that same transaction and must not
//! issue its own `BEGIN`/`COMMIT`.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use regex::Regex;
use rusqlite::{params, Connection, ErrorCode, OpenFlags, OptionalExtension, TransactionBehavior};
use std::sync::OnceLock;

use crate::cancel::CancelToken;
use crate::error::{GateError, Result};
use crate::graph::RevisionGraph;
use crate::revision::{Direction, Revision, RevisionId};

use super::{Lease, LeaseOutcome, MigrationStore, StepOutcome};

/// Interrupt callback granularity, in SQLite VM instructions.
const PROGRESS_OPS: i32 = 1_000;

static TABLE_RE: OnceLock<Regex> = OnceLock::new();

fn valid_table_name(name: &str) -> bool {
    TABLE_RE
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap())
        .is_match(name)
}

// ---------------------------------------------------------------------------
// Connection target
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    File(PathBuf),
    Memory,
}

impl Target {
    /// Accepts `sqlite://<path>`, `sqlite:<path>`, `sqlite::memory:` or a bare path.
    pub fn parse(url: &str) -> Result<Self> {
        let rest = if let Some(rest) = url.strip_prefix("sqlite://") {
            rest
        } else if let Some(rest) = url.strip_prefix("sqlite:") {
            rest
        } else if url.contains("://") {
            return Err(GateError::UnsupportedStore(url.to_string()));
        } else {
            url
        };
        if rest.is_empty() {
            return Err(GateError::UnsupportedStore(url.to_string()));
        }
        if rest == ":memory:" {
            return Ok(Self::Memory);
        }
        Ok(Self::File(PathBuf::from(rest)))
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SqliteOptions {
    pub tracking_table: String,
    /// How long a write waits for another replica's transaction to finish.
    pub busy_timeout: Duration,
    /// Upper bound for one migration step; `None` = unbounded.
    pub step_timeout: Option<Duration>,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            tracking_table: "schema_version".to_string(),
            busy_timeout: Duration::from_secs(30),
            step_timeout: None,
        }
    }
}

// ---------------------------------------------------------------------------
// SqliteStore
// ---------------------------------------------------------------------------

enum RawStep {
    Applied,
    Superseded(Option<String>),
}

pub struct SqliteStore {
    conn: Connection,
    graph: RevisionGraph,
    table: String,
    lease_table: String,
    step_timeout: Option<Duration>,
    cancel: CancelToken,
}

fn db(e: rusqlite::Error) -> GateError {
    GateError::Store(e.to_string())
}

fn unreachable(e: rusqlite::Error) -> GateError {
    GateError::StoreUnreachable(e.to_string())
}

impl SqliteStore {
    /// Connect to the store at `url`. Fails with `StoreUnreachable` when the
    /// database file does not exist, cannot be opened or is not a SQLite
    /// database. A missing file is never created.
    pub fn open(
        url: &str,
        graph: RevisionGraph,
        options: &SqliteOptions,
        cancel: CancelToken,
    ) -> Result<Self> {
        if !valid_table_name(&options.tracking_table) {
            return Err(GateError::InvalidConfig(format!(
                "tracking table name '{}' is not a plain identifier",
                options.tracking_table
            )));
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = match Target::parse(url)? {
            Target::File(path) => Connection::open_with_flags(&path, flags),
            Target::Memory => Connection::open_in_memory(),
        }
        .map_err(unreachable)?;
        conn.busy_timeout(options.busy_timeout).map_err(unreachable)?;
        // Touch the schema so a non-database file fails here, not mid-run.
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
            row.get::<_, i64>(0)
        })
        .map_err(unreachable)?;

        Ok(Self {
            conn,
            graph,
            table: options.tracking_table.clone(),
            lease_table: format!("{}_lease", options.tracking_table),
            step_timeout: options.step_timeout,
            cancel,
        })
    }

    fn run_step(&mut self, revision: &Revision, direction: Direction) -> Result<StepOutcome> {
        // Moving the tracking cell without undoing anything would be a stamp.
        if direction == Direction::Backward && revision.downgrade.trim().is_empty() {
            return Err(GateError::Execution {
                revision: revision.id.to_string(),
                direction: direction.to_string(),
                reason: "revision has no downgrade SQL".to_string(),
            });
        }
        let deadline = self.step_timeout.map(|t| Instant::now() + t);
        let flag = self.cancel.flag();
        self.conn.progress_handler(
            PROGRESS_OPS,
            Some(move || {
                flag.load(std::sync::atomic::Ordering::SeqCst)
                    || deadline.is_some_and(|d| Instant::now() >= d)
            }),
        );
        let result = step_tx(&mut self.conn, &self.table, revision, direction);
        self.conn.progress_handler(0, None::<fn() -> bool>);

        match result {
            Ok(RawStep::Applied) => Ok(StepOutcome::Applied),
            Ok(RawStep::Superseded(found)) => Ok(StepOutcome::Superseded {
                found: parse_stored(found)?,
            }),
            Err(e) => {
                if self.cancel.is_cancelled() {
                    return Err(GateError::Cancelled);
                }
                if let (Some(deadline), Some(limit)) = (deadline, self.step_timeout) {
                    if Instant::now() >= deadline {
                        return Err(GateError::StepTimeout {
                            revision: revision.id.to_string(),
                            direction: direction.to_string(),
                            secs: limit.as_secs(),
                        });
                    }
                }
                Err(GateError::Execution {
                    revision: revision.id.to_string(),
                    direction: direction.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SQL helpers
// ---------------------------------------------------------------------------

fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        params![table],
        |row| row.get(0),
    )
}

fn read_current(conn: &Connection, table: &str) -> rusqlite::Result<Option<String>> {
    if !table_exists(conn, table)? {
        return Ok(None);
    }
    conn.query_row(
        &format!("SELECT version_num FROM \"{table}\" LIMIT 1"),
        [],
        |row| row.get(0),
    )
    .optional()
}

fn write_current(conn: &Connection, table: &str, revision: Option<&RevisionId>) -> rusqlite::Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS \"{table}\" (version_num TEXT NOT NULL PRIMARY KEY);
         DELETE FROM \"{table}\";"
    ))?;
    if let Some(rev) = revision {
        conn.execute(
            &format!("INSERT INTO \"{table}\" (version_num) VALUES (?1)"),
            params![rev.as_str()],
        )?;
    }
    Ok(())
}

fn step_tx(
    conn: &mut Connection,
    table: &str,
    revision: &Revision,
    direction: Direction,
) -> rusqlite::Result<RawStep> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let current = read_current(&tx, table)?;
    let expected = revision.expected_before(direction).map(|r| r.as_str());
    if current.as_deref() != expected {
        return Ok(RawStep::Superseded(current));
    }
    let sql = revision.sql(direction);
    if !sql.trim().is_empty() {
        tx.execute_batch(sql)?;
    }
    write_current(&tx, table, revision.resulting(direction))?;
    tx.commit()?;
    Ok(RawStep::Applied)
}

fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

fn lease_tx(
    conn: &mut Connection,
    table: &str,
    lease: &Lease,
    ttl: chrono::Duration,
) -> rusqlite::Result<LeaseOutcome> {
    let now = Utc::now();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    tx.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS \"{table}\" (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            holder TEXT NOT NULL,
            expires_at TEXT NOT NULL
        );"
    ))?;
    let existing: Option<(String, String)> = tx
        .query_row(
            &format!("SELECT holder, expires_at FROM \"{table}\" WHERE id = 1"),
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    if let Some((holder, expires_at)) = existing {
        // Unparseable expiry is treated as expired so a bad row cannot wedge deploys.
        let expires_at = DateTime::parse_from_rfc3339(&expires_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or(now);
        if holder != lease.holder && expires_at > now {
            return Ok(LeaseOutcome::Held { holder, expires_at });
        }
    }
    tx.execute(
        &format!("INSERT OR REPLACE INTO \"{table}\" (id, holder, expires_at) VALUES (1, ?1, ?2)"),
        params![lease.holder, (now + ttl).to_rfc3339()],
    )?;
    tx.commit()?;
    Ok(LeaseOutcome::Acquired)
}

fn parse_stored(raw: Option<String>) -> Result<Option<RevisionId>> {
    raw.map(|s| RevisionId::new(s.clone()).map_err(|_| GateError::OrphanRevision(s)))
        .transpose()
}

// ---------------------------------------------------------------------------
// MigrationStore
// ---------------------------------------------------------------------------

impl MigrationStore for SqliteStore {
    fn probe_tracking_table(&mut self) -> Result<bool> {
        table_exists(&self.conn, &self.table).map_err(unreachable)
    }

    fn read_revision(&mut self) -> Result<Option<RevisionId>> {
        parse_stored(read_current(&self.conn, &self.table).map_err(unreachable)?)
    }

    fn write_revision(&mut self, expected: Option<&RevisionId>, next: &RevisionId) -> Result<bool> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db)?;
        let current = read_current(&tx, &self.table).map_err(db)?;
        if current.as_deref() != expected.map(|r| r.as_str()) {
            return Ok(false);
        }
        write_current(&tx, &self.table, Some(next)).map_err(db)?;
        tx.commit().map_err(db)?;
        Ok(true)
    }

    fn apply_step_forward(&mut self, revision: &Revision) -> Result<StepOutcome> {
        self.run_step(revision, Direction::Forward)
    }

    fn apply_step_backward(&mut self, revision: &Revision) -> Result<StepOutcome> {
        self.run_step(revision, Direction::Backward)
    }

    fn list_graph(&self) -> Result<RevisionGraph> {
        Ok(self.graph.clone())
    }

    fn acquire_lease(&mut self, lease: &Lease) -> Result<LeaseOutcome> {
        let ttl = chrono::Duration::from_std(lease.ttl)
            .map_err(|e| GateError::InvalidConfig(format!("lease ttl: {e}")))?;
        match lease_tx(&mut self.conn, &self.lease_table, lease, ttl) {
            Err(e) if is_busy(&e) => {
                tracing::debug!(error = %e, "store write lock held elsewhere");
                Ok(LeaseOutcome::Busy)
            }
            other => other.map_err(db),
        }
    }

    fn release_lease(&mut self, holder: &str) -> Result<()> {
        if !table_exists(&self.conn, &self.lease_table).map_err(db)? {
            return Ok(());
        }
        self.conn
            .execute(
                &format!("DELETE FROM \"{}\" WHERE id = 1 AND holder = ?1", self.lease_table),
                params![holder],
            )
            .map_err(db)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn id(s: &str) -> RevisionId {
        RevisionId::new(s).unwrap()
    }

    fn graph() -> RevisionGraph {
        RevisionGraph::new(vec![
            Revision::new(id("root"), None).with_sql(
                "CREATE TABLE jobs (id INTEGER PRIMARY KEY);",
                "DROP TABLE jobs;",
            ),
            Revision::new(id("v1"), Some(id("root"))).with_sql(
                "ALTER TABLE jobs ADD COLUMN kind TEXT;",
                "ALTER TABLE jobs DROP COLUMN kind;",
            ),
            Revision::new(id("v2"), Some(id("v1"))).with_sql(
                "CREATE TABLE drivers (id INTEGER PRIMARY KEY); INSERT INTO nope VALUES (1);",
                "DROP TABLE drivers;",
            ),
        ])
        .unwrap()
    }

    /// URL of `app.db` in `dir`, created empty if missing.
    fn db_url(dir: &TempDir) -> String {
        let path = dir.path().join("app.db");
        if !path.exists() {
            std::fs::write(&path, b"").unwrap();
        }
        format!("sqlite://{}", path.display())
    }

    fn open(dir: &TempDir) -> SqliteStore {
        open_with(dir, &SqliteOptions::default())
    }

    fn open_with(dir: &TempDir, options: &SqliteOptions) -> SqliteStore {
        SqliteStore::open(&db_url(dir), graph(), options, CancelToken::new()).unwrap()
    }

    fn rev(store: &SqliteStore, s: &str) -> Revision {
        store.graph.get(&id(s)).unwrap().clone()
    }

    #[test]
    fn parses_connection_targets() {
        assert_eq!(Target::parse("sqlite::memory:").unwrap(), Target::Memory);
        assert_eq!(
            Target::parse("sqlite:///var/lib/app.db").unwrap(),
            Target::File(PathBuf::from("/var/lib/app.db"))
        );
        assert_eq!(
            Target::parse("data/app.db").unwrap(),
            Target::File(PathBuf::from("data/app.db"))
        );
        assert!(matches!(
            Target::parse("postgresql://db/app"),
            Err(GateError::UnsupportedStore(_))
        ));
    }

    #[test]
    fn unreachable_path_fails_open() {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}", dir.path().join("missing/dir/app.db").display());
        let err = SqliteStore::open(&url, graph(), &SqliteOptions::default(), CancelToken::new())
            .err()
            .unwrap();
        assert!(matches!(err, GateError::StoreUnreachable(_)), "{err}");
    }

    #[test]
    fn non_database_file_is_unreachable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("garbage.db");
        std::fs::write(&path, vec![0x42u8; 4096]).unwrap();
        let err = SqliteStore::open(
            &path.display().to_string(),
            graph(),
            &SqliteOptions::default(),
            CancelToken::new(),
        )
        .err()
        .unwrap();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn missing_file_is_unreachable_and_not_created() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.db");
        let url = format!("sqlite://{}", path.display());
        let err = SqliteStore::open(&url, graph(), &SqliteOptions::default(), CancelToken::new())
            .err()
            .unwrap();
        assert!(matches!(err, GateError::StoreUnreachable(_)), "{err}");
        assert!(!path.exists());
    }

    #[test]
    fn unreadable_tracking_table_is_unreachable_at_probe() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        store
            .conn
            .execute_batch("CREATE TABLE schema_version (v TEXT);")
            .unwrap();
        let err = crate::state::probe(&mut store).unwrap_err();
        assert!(matches!(err, GateError::StoreUnreachable(_)), "{err}");
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn rejects_unsafe_tracking_table_name() {
        let options = SqliteOptions {
            tracking_table: "v\"; DROP TABLE x; --".into(),
            ..SqliteOptions::default()
        };
        let err = SqliteStore::open("sqlite::memory:", graph(), &options, CancelToken::new())
            .err()
            .unwrap();
        assert!(matches!(err, GateError::InvalidConfig(_)));
    }

    #[test]
    fn probe_sees_empty_tracking_table() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        assert!(!store.probe_tracking_table().unwrap());
        store
            .conn
            .execute_batch("CREATE TABLE schema_version (version_num TEXT NOT NULL PRIMARY KEY);")
            .unwrap();
        assert!(store.probe_tracking_table().unwrap());
        assert_eq!(store.read_revision().unwrap(), None);
    }

    #[test]
    fn conditional_write_loses_to_earlier_writer() {
        let dir = TempDir::new().unwrap();
        let mut first = open(&dir);
        let mut second = open(&dir);
        assert!(first.write_revision(None, &id("v2")).unwrap());
        assert!(!second.write_revision(None, &id("v2")).unwrap());
        assert_eq!(second.read_revision().unwrap(), Some(id("v2")));
    }

    #[test]
    fn forward_step_commits_schema_and_revision_together() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        let root = rev(&store, "root");
        assert_eq!(store.apply_step_forward(&root).unwrap(), StepOutcome::Applied);
        assert_eq!(store.read_revision().unwrap(), Some(id("root")));
        assert!(table_exists(&store.conn, "jobs").unwrap());

        // Replaying the same step is guarded, not re-run.
        assert_eq!(
            store.apply_step_forward(&root).unwrap(),
            StepOutcome::Superseded { found: Some(id("root")) }
        );
    }

    #[test]
    fn failed_step_rolls_back_its_own_changes() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        let (root, v1, v2) = (rev(&store, "root"), rev(&store, "v1"), rev(&store, "v2"));
        store.apply_step_forward(&root).unwrap();
        store.apply_step_forward(&v1).unwrap();

        let err = store.apply_step_forward(&v2).unwrap_err();
        assert!(matches!(err, GateError::Execution { .. }), "{err}");
        assert_eq!(store.read_revision().unwrap(), Some(id("v1")));
        assert!(!table_exists(&store.conn, "drivers").unwrap());
    }

    #[test]
    fn backward_step_of_root_empties_tracking_table() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        let root = rev(&store, "root");
        store.apply_step_forward(&root).unwrap();
        assert_eq!(store.apply_step_backward(&root).unwrap(), StepOutcome::Applied);
        assert!(store.probe_tracking_table().unwrap());
        assert_eq!(store.read_revision().unwrap(), None);
        assert!(!table_exists(&store.conn, "jobs").unwrap());
    }

    #[test]
    fn backward_step_without_downgrade_sql_is_refused() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        let root = rev(&store, "root");
        store.apply_step_forward(&root).unwrap();
        let bare = Revision::new(id("root"), None).with_sql("CREATE TABLE jobs (id INTEGER);", "  ");

        let err = store.apply_step_backward(&bare).unwrap_err();
        assert!(matches!(err, GateError::Execution { .. }), "{err}");
        assert_eq!(err.exit_code(), 3);
        assert_eq!(store.read_revision().unwrap(), Some(id("root")));
        assert!(table_exists(&store.conn, "jobs").unwrap());
    }

    #[test]
    fn slow_step_times_out_and_rolls_back() {
        let dir = TempDir::new().unwrap();
        let options = SqliteOptions {
            step_timeout: Some(Duration::from_millis(50)),
            ..SqliteOptions::default()
        };
        let mut store = open_with(&dir, &options);
        let slow = Revision::new(id("root"), None).with_sql(
            "CREATE TABLE jobs (id INTEGER);
             WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n)
             SELECT count(*) FROM n;",
            "",
        );
        let err = store.apply_step_forward(&slow).unwrap_err();
        assert!(matches!(err, GateError::StepTimeout { .. }), "{err}");
        assert!(!store.probe_tracking_table().unwrap());
        assert!(!table_exists(&store.conn, "jobs").unwrap());
    }

    #[test]
    fn cancelled_step_is_interrupted() {
        let cancel = CancelToken::new();
        let mut store =
            SqliteStore::open("sqlite::memory:", graph(), &SqliteOptions::default(), cancel.clone())
                .unwrap();
        cancel.cancel();
        let slow = Revision::new(id("root"), None).with_sql(
            "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n) SELECT count(*) FROM n;",
            "",
        );
        assert!(matches!(
            store.apply_step_forward(&slow),
            Err(GateError::Cancelled)
        ));
    }

    #[test]
    fn lease_blocks_other_holder_until_released() {
        let dir = TempDir::new().unwrap();
        let mut a = open(&dir);
        let mut b = open(&dir);
        let lease = |holder: &str| Lease {
            holder: holder.into(),
            ttl: Duration::from_secs(60),
        };
        assert_eq!(a.acquire_lease(&lease("a")).unwrap(), LeaseOutcome::Acquired);
        // Renewal by the same holder succeeds.
        assert_eq!(a.acquire_lease(&lease("a")).unwrap(), LeaseOutcome::Acquired);
        match b.acquire_lease(&lease("b")).unwrap() {
            LeaseOutcome::Held { holder, .. } => assert_eq!(holder, "a"),
            other => panic!("expected Held, got {other:?}"),
        }
        a.release_lease("a").unwrap();
        assert_eq!(b.acquire_lease(&lease("b")).unwrap(), LeaseOutcome::Acquired);
    }

    #[test]
    fn expired_lease_is_reclaimed() {
        let dir = TempDir::new().unwrap();
        let mut a = open(&dir);
        let mut b = open(&dir);
        let short = Lease {
            holder: "crashed".into(),
            ttl: Duration::from_millis(1),
        };
        a.acquire_lease(&short).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let lease = Lease {
            holder: "b".into(),
            ttl: Duration::from_secs(60),
        };
        assert_eq!(b.acquire_lease(&lease).unwrap(), LeaseOutcome::Acquired);
    }

    fn quick_busy() -> SqliteOptions {
        SqliteOptions {
            busy_timeout: Duration::from_millis(50),
            ..SqliteOptions::default()
        }
    }

    #[test]
    fn lease_reports_busy_while_another_writer_holds_the_lock() {
        let dir = TempDir::new().unwrap();
        let writer = open(&dir);
        let mut b = open_with(&dir, &quick_busy());
        writer
            .conn
            .execute_batch("BEGIN IMMEDIATE; CREATE TABLE busy (x);")
            .unwrap();
        let lease = Lease {
            holder: "b".into(),
            ttl: Duration::from_secs(60),
        };
        assert_eq!(b.acquire_lease(&lease).unwrap(), LeaseOutcome::Busy);

        writer.conn.execute_batch("COMMIT;").unwrap();
        assert_eq!(b.acquire_lease(&lease).unwrap(), LeaseOutcome::Acquired);
    }

    #[test]
    fn reconciler_waits_out_a_busy_store_then_times_out() {
        use crate::reconcile::{LockOptions, ReconcileOptions, Reconciler};

        let dir = TempDir::new().unwrap();
        let writer = open(&dir);
        let mut store = open_with(&dir, &quick_busy());
        writer
            .conn
            .execute_batch("BEGIN IMMEDIATE; CREATE TABLE busy (x);")
            .unwrap();
        let options = ReconcileOptions {
            lock: Some(LockOptions {
                ttl: Duration::from_secs(60),
                wait: Duration::from_millis(300),
                poll: Duration::from_millis(10),
            }),
            ..ReconcileOptions::default()
        };
        let err = Reconciler::new(options, CancelToken::new())
            .run(&mut store)
            .unwrap_err();
        assert!(matches!(err, GateError::LockTimeout { .. }), "{err}");
        assert_eq!(err.exit_code(), 4);

        writer.conn.execute_batch("ROLLBACK;").unwrap();
        assert!(!store.probe_tracking_table().unwrap());
    }
}
