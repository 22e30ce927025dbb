//! Prior-review coverage.
//!
//! Answers "how much of this diff did an earlier AI review on the same branch
//! already see?" by walking the branch's `reviewed` sessions oldest first and
//! accumulating a union of covered `(file, new-side line)` pairs.
//!
//! Lines are credited only when they are provably unchanged since the prior
//! review. Any session whose tree or file diff cannot be computed contributes
//! nothing, so errors can only under-count coverage.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Range;
use std::time::Duration;

use tokio_rusqlite::Connection;

use crate::db;
use crate::error::{Error, Result};
use crate::identity::ContentIdentity;
use crate::layout::RepoLayout;
use crate::types::{Action, CoverageResult, FileEntry, HunkRange, ReviewSession};

/// Settings for the entry points that open the store themselves.
#[derive(Debug, Clone)]
pub struct CoverageOptions {
    pub layout: RepoLayout,
    /// When false, nothing is recorded and coverage is always neutral.
    pub enabled: bool,
    pub busy_timeout: Duration,
}

impl CoverageOptions {
    pub fn new(layout: RepoLayout) -> Self {
        Self { layout, enabled: true, busy_timeout: db::DEFAULT_BUSY_TIMEOUT }
    }
}

/// Covered new-side lines, keyed by file path.
///
/// Each file holds sorted, disjoint half-open line intervals, so memory grows
/// with the number of hunks rather than the number of lines they span.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct CoveredLines {
    files: BTreeMap<String, Vec<Range<u32>>>,
}

impl CoveredLines {
    fn mark(&mut self, path: &str, lines: Range<u32>) {
        if lines.is_empty() {
            return;
        }
        let ranges = self.files.entry(path.to_owned()).or_default();
        ranges.push(lines);
        coalesce(ranges);
    }

    fn mark_all(&mut self, file: &FileEntry) {
        for hunk in &file.hunks {
            self.mark(&file.file_path, hunk.new_lines());
        }
    }

    fn merge(&mut self, other: CoveredLines) {
        for (path, lines) in other.files {
            let ranges = self.files.entry(path).or_default();
            ranges.extend(lines);
            coalesce(ranges);
        }
    }

    fn len(&self) -> u64 {
        self.files
            .values()
            .flatten()
            .map(|r| u64::from(r.end - r.start))
            .sum()
    }
}

/// Sorts `ranges` and merges overlapping or adjacent intervals in place.
fn coalesce(ranges: &mut Vec<Range<u32>>) {
    ranges.sort_by_key(|r| r.start);
    let mut merged: Vec<Range<u32>> = Vec::with_capacity(ranges.len());
    for range in ranges.drain(..) {
        match merged.last_mut() {
            Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
            _ => merged.push(range),
        }
    }
    *ranges = merged;
}

/// Sum of new-side line counts across every hunk of every file.
pub fn count_total_new_lines(files: &[FileEntry]) -> u64 {
    files.iter().map(FileEntry::new_line_total).sum()
}

/// Computes how much of `current_files` was covered by earlier `reviewed`
/// sessions on `branch`.
///
/// Must run before the current session is inserted: `iterations` counts the
/// stored sessions plus the one about to be recorded.
///
/// # Errors
///
/// Returns [`Error::Store`] if the session count or listing fails. Failures
/// tied to a single prior session are logged and that session is skipped.
pub async fn compute_prior_coverage(
    conn: &Connection,
    identity: &dyn ContentIdentity,
    branch: &str,
    current_tree: &str,
    current_files: &[FileEntry],
) -> Result<CoverageResult> {
    let mut result = CoverageResult {
        iterations: db::count_sessions(conn, branch).await? + 1,
        ..CoverageResult::default()
    };

    let rows = db::list_reviewed(conn, branch).await?;
    result.prior_review_count = rows.len() as u32;
    result.total_lines = count_total_new_lines(current_files);

    if rows.is_empty() || current_files.is_empty() || result.total_lines == 0 {
        return Ok(result);
    }

    let mut covered = CoveredLines::default();
    for row in rows {
        let session = match row.decode() {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!(error = %err, "skipping review session");
                continue;
            }
        };
        match session_coverage(identity, &session, current_tree, current_files) {
            Ok(lines) => covered.merge(lines),
            Err(err) => {
                tracing::warn!(
                    session_id = session.id,
                    prior_tree = %session.tree_hash,
                    current_tree = %current_tree,
                    error = %err,
                    "skipping review session"
                );
            }
        }
    }

    result.covered_lines = covered.len();
    result.prior_ai_coverage_pct =
        result.covered_lines as f64 / result.total_lines as f64 * 100.0;
    Ok(result)
}

/// Lines of `current_files` that one prior session already covered.
///
/// Computed into a scratch set so that a diff failure part-way through
/// discards the whole session rather than leaving partial credit behind.
fn session_coverage(
    identity: &dyn ContentIdentity,
    session: &ReviewSession,
    current_tree: &str,
    current_files: &[FileEntry],
) -> Result<CoveredLines> {
    let mut covered = CoveredLines::default();

    if session.tree_hash == current_tree {
        for file in current_files {
            covered.mark_all(file);
        }
        return Ok(covered);
    }

    let wrap = |source: Error| Error::SessionDiff { session_id: session.id, source: Box::new(source) };

    let changed: HashSet<String> = identity
        .diff_tree_files(&session.tree_hash, current_tree)
        .map_err(wrap)?
        .into_iter()
        .collect();

    let prior_files: HashMap<&str, &[HunkRange]> = session
        .diff_files
        .iter()
        .map(|f| (f.file_path.as_str(), f.hunks.as_slice()))
        .collect();

    for file in current_files {
        if !changed.contains(&file.file_path) {
            covered.mark_all(file);
            continue;
        }
        // Changed since the prior review: only files that review actually saw
        // can lend coverage, and only on lines outside the intervening edits.
        if !prior_files.contains_key(file.file_path.as_str()) {
            continue;
        }
        let edits = identity
            .diff_tree_file_hunks(&session.tree_hash, current_tree, &file.file_path)
            .map_err(wrap)?;
        mark_unchanged_lines(&mut covered, file, &edits);
    }

    Ok(covered)
}

/// Marks each new-side line of `file` that lies outside every `edits` range.
fn mark_unchanged_lines(covered: &mut CoveredLines, file: &FileEntry, edits: &[HunkRange]) {
    let mut edited: Vec<Range<u32>> = edits.iter().map(HunkRange::new_lines).collect();
    coalesce(&mut edited);

    for hunk in &file.hunks {
        let Range { mut start, end } = hunk.new_lines();
        for edit in &edited {
            if edit.end <= start {
                continue;
            }
            if edit.start >= end {
                break;
            }
            if edit.start > start {
                covered.mark(&file.file_path, start..edit.start);
            }
            start = edit.end;
            if start >= end {
                break;
            }
        }
        covered.mark(&file.file_path, start..end);
    }
}

/// Main entry point for review, skip, and vouch actions.
///
/// Computes prior coverage for the current tree, then records this action as
/// a new session. Coverage tracking is best effort: an unavailable store, an
/// unresolvable tree, or a failed computation yields
/// [`CoverageResult::neutral`] with a warning instead of an error, and a failed
/// insert is only logged.
pub async fn record_and_compute_coverage(
    options: &CoverageOptions,
    identity: &dyn ContentIdentity,
    action: Action,
    files: &[FileEntry],
    review_id: &str,
) -> CoverageResult {
    if !options.enabled {
        return CoverageResult::neutral();
    }

    let store_path = options.layout.store_path();
    let conn = match db::open_store(&store_path, options.busy_timeout).await {
        Ok(conn) => conn,
        Err(err) => {
            tracing::warn!(error = %err, "coverage tracking disabled");
            return CoverageResult::neutral();
        }
    };

    let tree_hash = match identity.current_tree_hash() {
        Ok(hash) if !hash.is_empty() => hash,
        Ok(_) => {
            tracing::warn!("empty tree hash; coverage tracking disabled");
            return CoverageResult::neutral();
        }
        Err(err) => {
            tracing::warn!(error = %err, "could not determine current tree hash; coverage tracking disabled");
            return CoverageResult::neutral();
        }
    };
    let branch = identity.current_branch();

    let coverage = match compute_prior_coverage(&conn, identity, &branch, &tree_hash, files).await {
        Ok(coverage) => coverage,
        Err(err) => {
            tracing::warn!(error = %err, "coverage computation failed");
            CoverageResult::neutral()
        }
    };

    match db::insert_session(&conn, &tree_hash, &branch, action, files, review_id).await {
        Ok(id) => tracing::debug!(
            session_id = id,
            %branch,
            tree = %tree_hash,
            %action,
            iterations = coverage.iterations,
            coverage_pct = coverage.prior_ai_coverage_pct,
            "review session recorded"
        ),
        Err(err) => tracing::warn!(error = %err, "failed to record review session"),
    }

    coverage
}

/// Post-commit cleanup: forgets the branch's session history.
///
/// Returns the number of sessions removed. A store that cannot be opened is
/// treated as empty.
///
/// # Errors
///
/// Returns [`Error::Store`] if the delete itself fails.
pub async fn cleanup_branch(options: &CoverageOptions, branch: &str) -> Result<usize> {
    let conn = match db::open_store(&options.layout.store_path(), options.busy_timeout).await {
        Ok(conn) => conn,
        Err(err) => {
            tracing::warn!(error = %err, "could not open review store for cleanup");
            return Ok(0);
        }
    };
    let affected = db::delete_branch(&conn, branch).await?;
    if affected > 0 {
        tracing::info!(%branch, sessions = affected, "cleaned up review sessions");
    }
    Ok(affected)
}

/// Administrative wipe of every recorded session.
///
/// # Errors
///
/// Unlike [`cleanup_branch`], an unavailable store is an error here: the
/// caller asked for a reset explicitly.
pub async fn reset_all(options: &CoverageOptions) -> Result<usize> {
    let conn = db::open_store(&options.layout.store_path(), options.busy_timeout).await?;
    db::delete_all(&conn).await
}

/// Number of sessions recorded on `branch`, or 0 when the store is unavailable.
pub async fn recorded_iterations(options: &CoverageOptions, branch: &str) -> u32 {
    let conn = match db::open_store(&options.layout.store_path(), options.busy_timeout).await {
        Ok(conn) => conn,
        Err(err) => {
            tracing::warn!(error = %err, "could not open review store");
            return 0;
        }
    };
    db::count_sessions(&conn, branch).await.unwrap_or_else(|err| {
        tracing::warn!(error = %err, "could not count review sessions");
        0
    })
}
