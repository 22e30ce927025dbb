//! lrc: pre-commit review attestation and prior-review coverage.
//!
//! Git hooks call into this binary:
//!
//! - `pre-commit` checks `lrc status` / runs `lrc attest` so a commit of an
//!   unreviewed tree is blocked until it is reviewed, skipped, or vouched for.
//! - `commit-msg` appends the output of `lrc attestation-trailer`.
//! - `post-commit` runs `lrc review-cleanup` to start the next review cycle
//!   from a clean slate.
//!
//! # Startup sequence
//!
//! 1. Parse arguments.
//! 2. Load `~/.config/lrc/config.toml` (soft failures, printed to stderr).
//! 3. Install the stderr `tracing` subscriber; `RUST_LOG` overrides the
//!    level chosen from `--verbose` / the config file.
//! 4. Open the repository enclosing the working directory and run the
//!    subcommand.

mod config;
mod workflow;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use lrc_core::types::Action;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::Config;
use crate::workflow::{AttestRequest, DiffSource, Workflow};

#[derive(Parser)]
#[command(name = "lrc", about = "Review attestations and prior-review coverage for git commits", version)]
struct Cli {
    /// Debug-level logging on stderr.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record an action for the staged tree and write its attestation.
    Attest {
        /// reviewed, skipped, or vouched.
        #[arg(long, value_parser = parse_action)]
        action: Action,

        /// Replace an existing attestation for this tree.
        #[arg(long)]
        force: bool,

        /// Read the reviewed diff from this file instead of the index.
        #[arg(long)]
        diff_file: Option<PathBuf>,

        /// Identifier of the review that produced this action.
        #[arg(long, default_value = "")]
        review_id: String,
    },

    /// Post-commit cleanup of this branch's review sessions.
    ReviewCleanup {
        /// Wipe the sessions of every branch.
        #[arg(long)]
        all: bool,
    },

    /// Print the commit trailer for the staged tree, if attested.
    AttestationTrailer,

    /// Show branch, tree, iteration count, and attestation state.
    Status,
}

fn parse_action(s: &str) -> Result<Action, String> {
    s.parse().map_err(|e: lrc_core::Error| e.to_string())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load();
    init_logging(cli.verbose || config.verbose);

    let cwd = std::env::current_dir().context("cannot determine working directory")?;
    let flow = Workflow::open(&cwd, |layout| config.coverage_options(layout))?;

    match cli.command {
        Commands::Attest { action, force, diff_file, review_id } => {
            let request = AttestRequest {
                action,
                force,
                diff: diff_file.map_or(DiffSource::Staged, DiffSource::File),
                review_id,
            };
            let outcome = flow.attest(&request).await?;
            println!("{outcome}");
            tracing::debug!(path = %outcome.path.display(), "attestation path");
        }
        Commands::ReviewCleanup { all } => {
            let outcome = if all { flow.reset().await? } else { flow.cleanup().await? };
            tracing::info!(
                sessions = outcome.sessions_removed,
                tree = %outcome.tree_hash,
                all,
                "review state cleaned up"
            );
        }
        Commands::AttestationTrailer => {
            if let Some(trailer) = flow.trailer() {
                println!("{trailer}");
            }
        }
        Commands::Status => {
            println!("{}", flow.status().await);
        }
    }

    Ok(())
}
