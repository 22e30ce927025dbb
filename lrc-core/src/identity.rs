//! Content identity: what the coverage engine needs to know about trees.
//!
//! [`GitRepo`](crate::git::GitRepo) is the production implementation. The
//! engine only talks to this trait, so tests can substitute an in-memory
//! tree set.

use crate::error::Result;
use crate::types::HunkRange;

/// Branch name reported when `HEAD` does not point at a branch.
pub const DETACHED_BRANCH: &str = "HEAD";

pub trait ContentIdentity {
    /// Content-addressed id of the current staged tree.
    fn current_tree_hash(&self) -> Result<String>;

    /// Paths that differ between two trees, in either direction.
    fn diff_tree_files(&self, from: &str, to: &str) -> Result<Vec<String>>;

    /// Line-range diff between two trees, restricted to `path`.
    ///
    /// Returned ranges are already normalized (no zero counts).
    fn diff_tree_file_hunks(&self, from: &str, to: &str, path: &str) -> Result<Vec<HunkRange>>;

    /// Current branch, or [`DETACHED_BRANCH`].
    fn current_branch(&self) -> String;
}
