/// DDL to create the schema_version tracking table.
///
/// Applied unconditionally on every DB open (before checking the version),
/// using `IF NOT EXISTS` so it is safe to run multiple times.
pub const SCHEMA_VERSION_DDL: &str = "
    CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER NOT NULL
    ) STRICT;
";

/// DDL for the v1 schema.
///
/// `review_sessions` holds one row per reviewed/skipped/vouched action.
/// Rows are append-only; `diff_files` is the JSON-encoded file list (line
/// ranges only) and `timestamp` is RFC 3339 UTC text, so ordering by the
/// column is chronological.
pub const SCHEMA_V1_SQL: &str = "
    CREATE TABLE IF NOT EXISTS review_sessions (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        tree_hash   TEXT    NOT NULL,
        branch      TEXT    NOT NULL,
        action      TEXT    NOT NULL
                            CHECK(action IN ('reviewed', 'skipped', 'vouched')),
        timestamp   TEXT    NOT NULL,
        diff_files  TEXT    NOT NULL DEFAULT '[]',
        review_id   TEXT    NOT NULL DEFAULT ''
    ) STRICT;

    CREATE INDEX IF NOT EXISTS idx_review_sessions_branch ON review_sessions(branch);
    CREATE INDEX IF NOT EXISTS idx_review_sessions_tree ON review_sessions(tree_hash);
";

/// Runs forward-only schema migration to migrate the DB to the latest version.
///
/// Idempotent and safe under concurrent opens from several processes: the
/// version is re-read inside the `BEGIN IMMEDIATE` transaction, so only the
/// first writer applies the DDL and records the version row.
///
/// # Errors
///
/// Returns `rusqlite::Error` if the DDL fails or the version row cannot be read.
pub fn migrate(db: &mut rusqlite::Connection) -> rusqlite::Result<()> {
    db.execute_batch(SCHEMA_VERSION_DDL)?;

    if current_version(db) >= 1 {
        return Ok(());
    }

    let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
    if current_version(&tx) < 1 {
        tx.execute_batch(SCHEMA_V1_SQL)?;
        tx.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;
    }
    tx.commit()?;

    Ok(())
}

fn current_version(db: &rusqlite::Connection) -> i64 {
    db.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )
    .unwrap_or(0)
}
