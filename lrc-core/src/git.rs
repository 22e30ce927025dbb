//! git2-backed [`ContentIdentity`].
//!
//! `GitRepo` owns a `git2::Repository` for the lifetime of one CLI action.
//! Every value it hands out is owned (`String`, `u32`, `FileEntry`) so nothing
//! borrowed from libgit2 escapes a method call.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::path::Path;

use git2::{Diff, DiffOptions, ErrorCode, Oid, Repository, Tree};

use crate::error::{Error, Result};
use crate::identity::{ContentIdentity, DETACHED_BRANCH};
use crate::layout::RepoLayout;
use crate::types::{FileEntry, HunkRange};

pub struct GitRepo {
    repo: Repository,
}

impl GitRepo {
    /// Opens the repository containing `path`, searching parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Git`] when `path` is not inside a repository.
    pub fn discover(path: impl AsRef<Path>) -> Result<Self> {
        let repo = Repository::discover(path)?;
        Ok(Self { repo })
    }

    /// The repository's `.git` directory.
    pub fn git_dir(&self) -> &Path {
        self.repo.path()
    }

    /// Store and attestation locations under `<git-dir>/lrc`.
    pub fn layout(&self) -> RepoLayout {
        RepoLayout::for_git_dir(self.repo.path())
    }

    /// File entries for the staged diff: `HEAD` (or the empty tree on an
    /// unborn branch) against the index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Git`] if the index cannot be read or diffed.
    pub fn staged_files(&self) -> Result<Vec<FileEntry>> {
        let head_tree = match self.repo.head() {
            Ok(head) => Some(head.peel_to_tree()?),
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => None,
            Err(e) => return Err(e.into()),
        };
        let mut index = self.repo.index()?;
        index.read(true)?;
        let mut opts = DiffOptions::new();
        let diff = self
            .repo
            .diff_tree_to_index(head_tree.as_ref(), Some(&index), Some(&mut opts))?;
        extract_entries(&diff)
    }

    fn find_tree(&self, hash: &str) -> Result<Tree<'_>> {
        let oid = Oid::from_str(hash).map_err(|_| Error::UnknownTree(hash.to_owned()))?;
        Ok(self.repo.find_tree(oid)?)
    }
}

impl ContentIdentity for GitRepo {
    /// Writes the index as a tree (the `git write-tree` equivalent).
    ///
    /// The index is re-read from disk first; another process may have staged
    /// changes since this repository handle was opened.
    fn current_tree_hash(&self) -> Result<String> {
        let mut index = self.repo.index()?;
        index.read(true)?;
        let oid = index.write_tree()?;
        Ok(oid.to_string())
    }

    fn diff_tree_files(&self, from: &str, to: &str) -> Result<Vec<String>> {
        let old_tree = self.find_tree(from)?;
        let new_tree = self.find_tree(to)?;
        let diff = self.repo.diff_tree_to_tree(Some(&old_tree), Some(&new_tree), None)?;

        let mut paths = BTreeSet::new();
        for delta in diff.deltas() {
            for file in [delta.old_file(), delta.new_file()] {
                if let Some(path) = file.path() {
                    paths.insert(path.to_string_lossy().into_owned());
                }
            }
        }
        Ok(paths.into_iter().collect())
    }

    /// Uses git's default three lines of context, so the changed ranges are
    /// padded and coverage errs toward "not covered".
    fn diff_tree_file_hunks(&self, from: &str, to: &str, path: &str) -> Result<Vec<HunkRange>> {
        let old_tree = self.find_tree(from)?;
        let new_tree = self.find_tree(to)?;
        let mut opts = DiffOptions::new();
        opts.pathspec(path).disable_pathspec_match(true);
        let diff = self
            .repo
            .diff_tree_to_tree(Some(&old_tree), Some(&new_tree), Some(&mut opts))?;
        Ok(extract_entries(&diff)?.into_iter().flat_map(|f| f.hunks).collect())
    }

    fn current_branch(&self) -> String {
        match self.repo.find_reference("HEAD") {
            Ok(head) => match head.symbolic_target() {
                Some(target) => target.strip_prefix("refs/heads/").unwrap_or(target).to_owned(),
                None => DETACHED_BRANCH.to_owned(),
            },
            Err(err) => {
                tracing::warn!(error = %err, "could not determine branch");
                DETACHED_BRANCH.to_owned()
            }
        }
    }
}

/// Walks diff deltas and hunks, converting them to owned file entries.
///
/// The file callback opens a new entry; the hunk callback appends to the most
/// recent one. Both run sequentially on this thread, so the shared `RefCell`
/// is never borrowed twice at once.
fn extract_entries(diff: &Diff<'_>) -> Result<Vec<FileEntry>> {
    let files: RefCell<Vec<FileEntry>> = RefCell::new(Vec::new());

    diff.foreach(
        &mut |delta, _progress| {
            let (new_file, old_file) = (delta.new_file(), delta.old_file());
            let path = new_file
                .path()
                .or(old_file.path())
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();
            files.borrow_mut().push(FileEntry::new(path, Vec::new()));
            true
        },
        None,
        Some(&mut |_delta, hunk| {
            if let Some(f) = files.borrow_mut().last_mut() {
                f.hunks.push(HunkRange::new(
                    hunk.old_start(),
                    hunk.old_lines(),
                    hunk.new_start(),
                    hunk.new_lines(),
                ));
            }
            true
        }),
        None,
    )?;

    Ok(files.into_inner())
}
