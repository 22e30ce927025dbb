use std::path::{Path, PathBuf};

/// Directory under the git dir that holds all lrc state.
pub const METADATA_DIR: &str = "lrc";
const STORE_FILE: &str = "reviews.db";
const ATTESTATION_DIR: &str = "attestations";

/// Per-repository state locations.
///
/// ```text
/// <git-dir>/lrc/reviews.db              session store
/// <git-dir>/lrc/attestations/<tree>.json
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLayout {
    root: PathBuf,
}

impl RepoLayout {
    /// Layout rooted at an arbitrary metadata directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn for_git_dir(git_dir: &Path) -> Self {
        Self::new(git_dir.join(METADATA_DIR))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store_path(&self) -> PathBuf {
        self.root.join(STORE_FILE)
    }

    pub fn attestation_dir(&self) -> PathBuf {
        self.root.join(ATTESTATION_DIR)
    }
}
