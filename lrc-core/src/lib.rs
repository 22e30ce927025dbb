//! Review-coverage tracking and commit attestation for lrc.
//!
//! - [`db`] / [`schema`]: the per-repository SQLite session store.
//! - [`coverage`]: prior-review coverage over a new diff.
//! - [`attestation`]: the per-tree record that commit hooks gate on.
//! - [`identity`] / [`git`]: tree identity and tree diffs, backed by git2.
//! - [`diff`]: unified-diff header parsing.

pub mod attestation;
pub mod coverage;
pub mod db;
pub mod diff;
pub mod error;
pub mod git;
pub mod identity;
pub mod layout;
pub mod schema;
pub mod types;

pub use error::{Error, Result};
