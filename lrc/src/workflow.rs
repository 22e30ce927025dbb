//! Hook-facing workflows over one repository.
//!
//! Each subcommand builds a [`Workflow`] for the repository enclosing the
//! working directory and runs exactly one method on it.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use lrc_core::attestation::{AttestationStore, ensure_attestation};
use lrc_core::coverage::{self, CoverageOptions};
use lrc_core::diff::parse_unified_diff;
use lrc_core::git::GitRepo;
use lrc_core::identity::ContentIdentity;
use lrc_core::layout::RepoLayout;
use lrc_core::types::{Action, AttestationRecord, CoverageResult, FileEntry};

/// Where `attest` reads the reviewed diff from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffSource {
    /// HEAD (or the empty tree) against the index.
    Staged,
    /// Raw `git diff` output saved to a file.
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct AttestRequest {
    pub action: Action,
    pub force: bool,
    pub diff: DiffSource,
    pub review_id: String,
}

#[derive(Debug, Clone)]
pub struct AttestOutcome {
    pub path: PathBuf,
    pub record: AttestationRecord,
    pub coverage: CoverageResult,
}

impl fmt::Display for AttestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: iteration {}, {:.0}% covered by {} prior review(s) ({}/{} lines)",
            self.record.action,
            self.record.iterations,
            self.coverage.prior_ai_coverage_pct,
            self.coverage.prior_review_count,
            self.coverage.covered_lines,
            self.coverage.total_lines,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupOutcome {
    pub sessions_removed: usize,
    pub tree_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub branch: String,
    pub tree_hash: Option<String>,
    pub iterations: u32,
    pub attestation: Option<Action>,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "branch:      {}", self.branch)?;
        writeln!(f, "tree:        {}", self.tree_hash.as_deref().unwrap_or("unknown"))?;
        writeln!(f, "iterations:  {}", self.iterations)?;
        match self.attestation {
            Some(action) => write!(f, "attestation: {action}"),
            None => write!(f, "attestation: none"),
        }
    }
}

pub struct Workflow {
    repo: GitRepo,
    options: CoverageOptions,
    attestations: AttestationStore,
}

impl Workflow {
    /// Opens the repository enclosing `start`.
    ///
    /// `configure` turns the repository's layout into coverage settings.
    pub fn open(
        start: &Path,
        configure: impl FnOnce(RepoLayout) -> CoverageOptions,
    ) -> anyhow::Result<Self> {
        let repo = GitRepo::discover(start)
            .with_context(|| format!("not inside a git repository: {}", start.display()))?;
        let options = configure(repo.layout());
        let attestations = AttestationStore::new(options.layout.attestation_dir());
        Ok(Self { repo, options, attestations })
    }

    /// Records `request.action` for the current tree and writes its attestation.
    ///
    /// Refuses when the tree is already attested unless `force` is set, in
    /// which case the old record is removed first.
    ///
    /// The session is recorded before the attestation is written. If the write
    /// then fails the action is reported as failed, but its session still
    /// counts toward the branch's iterations.
    pub async fn attest(&self, request: &AttestRequest) -> anyhow::Result<AttestOutcome> {
        if let Some(existing) = self.attestations.existing_action(&self.repo) {
            if !request.force {
                bail!("this tree is already attested as {existing}; pass --force to replace it");
            }
            self.attestations
                .delete_for_current_tree(&self.repo)
                .context("failed to remove existing attestation")?;
            tracing::info!(%existing, "removed existing attestation");
        }

        let files = self.collect_files(&request.diff)?;
        let coverage = coverage::record_and_compute_coverage(
            &self.options,
            &self.repo,
            request.action,
            &files,
            &request.review_id,
        )
        .await;

        let mut written = false;
        let path = ensure_attestation(
            &self.attestations,
            &self.repo,
            request.action,
            &coverage,
            &mut written,
        )
        .context("failed to write attestation")?
        .context("attestation was not written")?;

        Ok(AttestOutcome {
            path,
            record: AttestationRecord::from_coverage(request.action, &coverage),
            coverage,
        })
    }

    fn collect_files(&self, source: &DiffSource) -> anyhow::Result<Vec<FileEntry>> {
        match source {
            DiffSource::Staged => self.repo.staged_files().context("failed to diff staged changes"),
            DiffSource::File(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("cannot read diff file {}", path.display()))?;
                parse_unified_diff(&raw)
                    .with_context(|| format!("cannot parse diff file {}", path.display()))
            }
        }
    }

    /// Post-commit cleanup: forgets this branch's sessions and removes the
    /// attestation for the tree that was just committed.
    pub async fn cleanup(&self) -> anyhow::Result<CleanupOutcome> {
        let branch = self.repo.current_branch();
        let sessions_removed = coverage::cleanup_branch(&self.options, &branch)
            .await
            .context("failed to clean up review sessions")?;
        let tree_hash = self.remove_current_attestation()?;
        Ok(CleanupOutcome { sessions_removed, tree_hash })
    }

    /// Wipes every recorded session on every branch, plus the current tree's
    /// attestation.
    pub async fn reset(&self) -> anyhow::Result<CleanupOutcome> {
        let sessions_removed = coverage::reset_all(&self.options)
            .await
            .context("failed to reset review store")?;
        let tree_hash = self.remove_current_attestation()?;
        Ok(CleanupOutcome { sessions_removed, tree_hash })
    }

    fn remove_current_attestation(&self) -> anyhow::Result<String> {
        let tree_hash = self
            .repo
            .current_tree_hash()
            .context("cannot determine current tree")?;
        self.attestations
            .delete(&tree_hash)
            .context("failed to remove attestation")?;
        Ok(tree_hash)
    }

    /// Commit trailer for the current tree, if it is attested.
    pub fn trailer(&self) -> Option<String> {
        self.attestations
            .read_for_current_tree(&self.repo)
            .map(|record| record.trailer())
    }

    pub async fn status(&self) -> Status {
        let branch = self.repo.current_branch();
        let tree_hash = match self.repo.current_tree_hash() {
            Ok(hash) => Some(hash),
            Err(err) => {
                tracing::warn!(error = %err, "could not determine current tree hash");
                None
            }
        };
        let iterations = coverage::recorded_iterations(&self.options, &branch).await;
        let attestation = tree_hash
            .as_deref()
            .and_then(|hash| self.attestations.read(hash))
            .map(|record| record.action);
        Status { branch, tree_hash, iterations, attestation }
    }
}
