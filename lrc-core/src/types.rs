use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Outcome label of a review cycle.
///
/// Persisted as lowercase text (`reviewed`, `skipped`, `vouched`) in the
/// `review_sessions.action` column and in attestation records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// The AI review ran over the diff.
    Reviewed,
    /// Review was bypassed; no responsibility claimed.
    Skipped,
    /// A human takes responsibility without AI re-analysis.
    Vouched,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Reviewed => "reviewed",
            Action::Skipped => "skipped",
            Action::Vouched => "vouched",
        }
    }

    /// Value used in the commit trailer. `reviewed` is rendered as `ran`.
    pub fn trailer_value(self) -> &'static str {
        match self {
            Action::Reviewed => "ran",
            Action::Skipped => "skipped",
            Action::Vouched => "vouched",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "reviewed" => Ok(Action::Reviewed),
            "skipped" => Ok(Action::Skipped),
            "vouched" => Ok(Action::Vouched),
            other => Err(Error::UnknownAction(other.to_owned())),
        }
    }
}

/// A contiguous changed region, 1-based on both sides.
///
/// Counts are never zero: a `0` count in a diff header marks a pure
/// insertion/deletion point and is stored as `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HunkRange {
    pub old_start_line: u32,
    pub old_line_count: u32,
    pub new_start_line: u32,
    pub new_line_count: u32,
}

impl HunkRange {
    /// Builds a range, normalizing zero counts to one.
    pub fn new(old_start: u32, old_count: u32, new_start: u32, new_count: u32) -> Self {
        Self {
            old_start_line: old_start,
            old_line_count: old_count.max(1),
            new_start_line: new_start,
            new_line_count: new_count.max(1),
        }
    }

    /// New-side line numbers spanned by this hunk (half-open).
    pub fn new_lines(&self) -> Range<u32> {
        self.new_start_line..self.new_start_line.saturating_add(self.new_line_count)
    }

    /// Inclusive last new-side line.
    pub fn new_end_line(&self) -> u32 {
        self.new_lines().end.saturating_sub(1)
    }

    pub fn contains_new_line(&self, line: u32) -> bool {
        line >= self.new_start_line && line <= self.new_end_line()
    }
}

/// One file's changed-range summary. Carries no file content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub file_path: String,
    pub hunks: Vec<HunkRange>,
}

impl FileEntry {
    pub fn new(file_path: impl Into<String>, hunks: Vec<HunkRange>) -> Self {
        Self { file_path: file_path.into(), hunks }
    }

    /// Sum of new-side line counts over all hunks.
    pub fn new_line_total(&self) -> u64 {
        self.hunks.iter().map(|h| u64::from(h.new_line_count)).sum()
    }
}

/// One recorded review action, as stored in `review_sessions`.
///
/// Rows are immutable once written; only bulk deletion by branch (or of
/// everything) is supported.
#[derive(Debug, Clone)]
pub struct ReviewSession {
    pub id: i64,
    pub tree_hash: String,
    pub branch: String,
    pub action: Action,
    pub timestamp: DateTime<Utc>,
    pub diff_files: Vec<FileEntry>,
    /// External review correlation id; empty for skip/vouch without a remote review.
    pub review_id: String,
}

/// Output of a coverage computation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CoverageResult {
    /// Sessions recorded for the branch, counting the one about to be recorded.
    pub iterations: u32,
    /// Percentage (0–100) of new-side lines already covered by a prior review.
    pub prior_ai_coverage_pct: f64,
    pub covered_lines: u64,
    pub total_lines: u64,
    /// Prior sessions with action `reviewed`.
    pub prior_review_count: u32,
}

impl CoverageResult {
    /// Result used whenever coverage tracking is unavailable.
    pub fn neutral() -> Self {
        Self { iterations: 1, ..Self::default() }
    }
}

/// The single gating record for one tree hash.
///
/// Serialized as JSON to `<git-dir>/lrc/attestations/<tree>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttestationRecord {
    pub action: Action,
    #[serde(default)]
    pub iterations: u32,
    #[serde(default)]
    pub prior_ai_coverage_pct: f64,
    #[serde(default)]
    pub prior_review_count: u32,
}

impl AttestationRecord {
    /// Builds a record for `action`; `iterations` is clamped to at least 1.
    pub fn from_coverage(action: Action, coverage: &CoverageResult) -> Self {
        Self {
            action,
            iterations: coverage.iterations.max(1),
            prior_ai_coverage_pct: coverage.prior_ai_coverage_pct,
            prior_review_count: coverage.prior_review_count,
        }
    }

    /// Commit trailer consumed by the `commit-msg` hook.
    ///
    /// `LiveReview Pre-Commit Check: ran (iter:2, coverage:67%)`. The
    /// parenthesized stats are omitted when no iteration count was recorded.
    pub fn trailer(&self) -> String {
        let value = self.action.trailer_value();
        if self.iterations > 0 {
            let pct = self.prior_ai_coverage_pct.round() as i64;
            format!(
                "LiveReview Pre-Commit Check: {value} (iter:{}, coverage:{pct}%)",
                self.iterations
            )
        } else {
            format!("LiveReview Pre-Commit Check: {value}")
        }
    }
}
