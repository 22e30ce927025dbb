//! Per-tree attestation records: the commit gate consulted by hooks.
//!
//! One JSON file per tree hash lives under `<git-dir>/lrc/attestations/`.
//! Writes go through a uniquely named temporary file in the same directory
//! followed by a rename, so a concurrent reader sees either the old record or
//! the new one and never a partial file.
//!
//! Reads never fail: a missing, unreadable, or malformed file is "no
//! attestation". Writes and deletes always surface their I/O error, because a
//! silently lost record would let an unreviewed commit through.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::identity::ContentIdentity;
use crate::types::{Action, AttestationRecord, CoverageResult};

#[derive(Debug, Clone)]
pub struct AttestationStore {
    dir: PathBuf,
}

impl AttestationStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Final location of the record for `tree_hash`.
    pub fn path_for(&self, tree_hash: &str) -> PathBuf {
        self.dir.join(format!("{tree_hash}.json"))
    }

    /// Atomically writes `record` for `tree_hash`, replacing any existing one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyTreeHash`] for an empty hash and
    /// [`Error::AttestationWrite`] if the directory, temporary file, or rename
    /// fails. No temporary file is left behind on failure.
    pub fn write(&self, tree_hash: &str, record: &AttestationRecord) -> Result<PathBuf> {
        if tree_hash.is_empty() {
            return Err(Error::EmptyTreeHash);
        }
        let target = self.path_for(tree_hash);
        let data = serde_json::to_vec(record)?;

        fs::create_dir_all(&self.dir)
            .map_err(|source| Error::AttestationWrite { path: self.dir.clone(), source })?;

        let tmp = self
            .dir
            .join(format!("{tree_hash}.{}.json.tmp", uuid::Uuid::new_v4()));
        if let Err(source) = write_synced(&tmp, &data).and_then(|()| fs::rename(&tmp, &target)) {
            let _ = fs::remove_file(&tmp);
            return Err(Error::AttestationWrite { path: target, source });
        }
        Ok(target)
    }

    /// Record for `tree_hash`, or `None` if absent or unparsable.
    pub fn read(&self, tree_hash: &str) -> Option<AttestationRecord> {
        if tree_hash.is_empty() {
            return None;
        }
        let path = self.path_for(tree_hash);
        let data = fs::read(&path).ok()?;
        match serde_json::from_slice(&data) {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "ignoring malformed attestation");
                None
            }
        }
    }

    /// Removes the record for `tree_hash`. A missing record is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AttestationDelete`] for any other I/O failure.
    pub fn delete(&self, tree_hash: &str) -> Result<()> {
        if tree_hash.is_empty() {
            return Ok(());
        }
        let path = self.path_for(tree_hash);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(Error::AttestationDelete { path, source }),
        }
    }

    /// Writes `record` for the identity's current tree.
    ///
    /// # Errors
    ///
    /// Fails if the tree hash cannot be computed or the write fails.
    pub fn write_for_current_tree(
        &self,
        identity: &dyn ContentIdentity,
        record: &AttestationRecord,
    ) -> Result<PathBuf> {
        let tree_hash = identity.current_tree_hash()?;
        self.write(&tree_hash, record)
    }

    /// Record for the current tree; `None` also when the tree hash is unknown.
    pub fn read_for_current_tree(&self, identity: &dyn ContentIdentity) -> Option<AttestationRecord> {
        match identity.current_tree_hash() {
            Ok(tree_hash) => self.read(&tree_hash),
            Err(err) => {
                tracing::warn!(error = %err, "could not determine current tree hash");
                None
            }
        }
    }

    /// Deletes the current tree's record (used by `--force` re-runs and by
    /// post-commit cleanup).
    ///
    /// # Errors
    ///
    /// Fails if the tree hash cannot be computed or the file cannot be removed.
    pub fn delete_for_current_tree(&self, identity: &dyn ContentIdentity) -> Result<()> {
        let tree_hash = identity.current_tree_hash()?;
        self.delete(&tree_hash)
    }

    /// Action already attested for the current tree, if any.
    ///
    /// `Some` means a commit of this tree is already unblocked; `None` means a
    /// review, skip, or vouch must run first.
    pub fn existing_action(&self, identity: &dyn ContentIdentity) -> Option<Action> {
        self.read_for_current_tree(identity).map(|record| record.action)
    }
}

/// Writes the attestation for `action` unless one was already written during
/// this invocation.
///
/// `written` is owned by the calling workflow and flipped to `true` on
/// success. Returns the path written, or `None` when the guard short-circuited.
///
/// # Errors
///
/// Any failure is fatal to the calling action: its attestation did not land.
pub fn ensure_attestation(
    store: &AttestationStore,
    identity: &dyn ContentIdentity,
    action: Action,
    coverage: &CoverageResult,
    written: &mut bool,
) -> Result<Option<PathBuf>> {
    if *written {
        return Ok(None);
    }
    let record = AttestationRecord::from_coverage(action, coverage);
    let path = store.write_for_current_tree(identity, &record)?;
    tracing::info!(
        path = %path.display(),
        %action,
        iterations = record.iterations,
        coverage_pct = record.prior_ai_coverage_pct,
        "attestation written"
    );
    *written = true;
    Ok(Some(path))
}

fn write_synced(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create_new(path)?;
    file.write_all(data)?;
    file.sync_all()
}
