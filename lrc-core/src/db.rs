use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use tokio_rusqlite::Connection;

use crate::error::{Error, Result};
use crate::types::{Action, FileEntry, ReviewSession};

/// Default bound on how long a writer waits for another process's lock.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens (or creates) the SQLite session store at `path`, configures WAL mode,
/// and applies schema migrations via the `schema_version` table.
///
/// The busy timeout is set first, via the `Connection` method rather than a
/// PRAGMA string, so that the WAL switch and the migration both wait on a
/// concurrent hook process instead of failing with `SQLITE_BUSY`.
///
/// # Errors
///
/// Returns `tokio_rusqlite::Error` if the file cannot be opened, WAL configuration
/// fails, or schema DDL fails.
pub async fn open_db(
    path: &Path,
    busy_timeout: Duration,
) -> std::result::Result<Connection, tokio_rusqlite::Error> {
    let conn = Connection::open(path).await?;

    conn.call(move |db| {
        db.busy_timeout(busy_timeout)?;
        db.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;",
        )?;
        Ok::<_, rusqlite::Error>(())
    })
    .await?;

    conn.call(|db| crate::schema::migrate(db)).await?;

    Ok(conn)
}

/// Opens the store, creating its parent directory if needed.
///
/// Every failure is reported as [`Error::StoreUnavailable`] so callers can
/// degrade to a neutral coverage result.
pub async fn open_store(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::StoreUnavailable {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;
    }
    open_db(path, busy_timeout)
        .await
        .map_err(|e| Error::StoreUnavailable { path: path.to_path_buf(), source: Box::new(e) })
}

/// A `review_sessions` row before its JSON and timestamp columns are decoded.
#[derive(Debug, Clone)]
pub struct SessionRow {
    pub id: i64,
    pub tree_hash: String,
    pub branch: String,
    pub action: String,
    pub timestamp: String,
    pub diff_files: String,
    pub review_id: String,
}

impl SessionRow {
    /// Decodes the row into a [`ReviewSession`].
    ///
    /// A malformed timestamp is tolerated (logged, replaced by the Unix epoch);
    /// a malformed action or file list is not.
    pub fn decode(self) -> Result<ReviewSession> {
        let action: Action = self.action.parse()?;
        let diff_files: Vec<FileEntry> = if self.diff_files.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&self.diff_files)
                .map_err(|source| Error::MalformedSession { session_id: self.id, source })?
        };
        let timestamp = match DateTime::parse_from_rfc3339(&self.timestamp) {
            Ok(ts) => ts.with_timezone(&Utc),
            Err(err) => {
                tracing::warn!(
                    session_id = self.id,
                    timestamp = %self.timestamp,
                    error = %err,
                    "malformed timestamp in review session"
                );
                DateTime::<Utc>::UNIX_EPOCH
            }
        };
        Ok(ReviewSession {
            id: self.id,
            tree_hash: self.tree_hash,
            branch: self.branch,
            action,
            timestamp,
            diff_files,
            review_id: self.review_id,
        })
    }
}

/// Formats `ts` as fixed-width RFC 3339 UTC text (microseconds, `Z` suffix).
///
/// Fixed width keeps lexical order of the `timestamp` column chronological.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Appends a session row and returns its assigned id.
///
/// The timestamp is taken here, in UTC. The insert runs inside
/// `BEGIN IMMEDIATE` so concurrent writers queue on the busy timeout.
///
/// # Errors
///
/// Returns [`Error::Serialize`] if the file list cannot be encoded, or
/// [`Error::Store`] if the write transaction fails.
pub async fn insert_session(
    conn: &Connection,
    tree_hash: &str,
    branch: &str,
    action: Action,
    files: &[FileEntry],
    review_id: &str,
) -> Result<i64> {
    let diff_files = serde_json::to_string(files)?;
    let tree_hash = tree_hash.to_owned();
    let branch = branch.to_owned();
    let review_id = review_id.to_owned();
    let timestamp = format_timestamp(Utc::now());

    let id = conn
        .call(move |db| {
            let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
            tx.execute(
                "INSERT INTO review_sessions
                     (tree_hash, branch, action, timestamp, diff_files, review_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    &tree_hash,
                    &branch,
                    action.as_str(),
                    &timestamp,
                    &diff_files,
                    &review_id
                ],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;
            Ok::<_, rusqlite::Error>(id)
        })
        .await?;
    Ok(id)
}

/// Counts sessions recorded for `branch`, any action.
pub async fn count_sessions(conn: &Connection, branch: &str) -> Result<u32> {
    let branch = branch.to_owned();
    let count = conn
        .call(move |db| {
            db.query_row(
                "SELECT COUNT(*) FROM review_sessions WHERE branch = ?1",
                rusqlite::params![&branch],
                |r| r.get::<_, u32>(0),
            )
        })
        .await?;
    Ok(count)
}

/// Loads the `reviewed` sessions for `branch`, oldest first.
///
/// Rows are returned undecoded so a single malformed row can be skipped by
/// the caller without losing the rest.
pub async fn list_reviewed(conn: &Connection, branch: &str) -> Result<Vec<SessionRow>> {
    let branch = branch.to_owned();
    let rows = conn
        .call(move |db| {
            let mut stmt = db.prepare(
                "SELECT id, tree_hash, branch, action, timestamp, diff_files, review_id
                 FROM review_sessions
                 WHERE branch = ?1 AND action = 'reviewed'
                 ORDER BY timestamp ASC, id ASC",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![&branch], |r| {
                    Ok(SessionRow {
                        id: r.get(0)?,
                        tree_hash: r.get(1)?,
                        branch: r.get(2)?,
                        action: r.get(3)?,
                        timestamp: r.get(4)?,
                        diff_files: r.get(5)?,
                        review_id: r.get(6)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok::<_, rusqlite::Error>(rows)
        })
        .await?;
    Ok(rows)
}

/// Deletes every session for `branch`. Returns the number of rows removed.
pub async fn delete_branch(conn: &Connection, branch: &str) -> Result<usize> {
    let branch = branch.to_owned();
    let affected = conn
        .call(move |db| {
            db.execute(
                "DELETE FROM review_sessions WHERE branch = ?1",
                rusqlite::params![&branch],
            )
        })
        .await?;
    Ok(affected)
}

/// Deletes every session in the store. Returns the number of rows removed.
pub async fn delete_all(conn: &Connection) -> Result<usize> {
    let affected = conn
        .call(|db| db.execute("DELETE FROM review_sessions", []))
        .await?;
    Ok(affected)
}
