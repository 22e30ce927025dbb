use std::path::PathBuf;

/// Result type for lrc-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the coverage store, coverage engine, and attestation manager.
///
/// Only `AttestationWrite` and `AttestationDelete` are meant to reach the user
/// as hard failures; the coverage path recovers from the rest with a warning.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The session store could not be opened or migrated.
    #[error("coverage store unavailable at {}: {source}", path.display())]
    StoreUnavailable {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A query or write against an open store failed.
    #[error("coverage store error: {0}")]
    Store(#[from] tokio_rusqlite::Error),

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// A tree hash that is not a valid object id, or not a tree.
    #[error("unknown tree {0}")]
    UnknownTree(String),

    /// Tree or file-hunk diff for one prior session failed.
    #[error("review session {session_id}: {source}")]
    SessionDiff {
        session_id: i64,
        #[source]
        source: Box<Error>,
    },

    /// A stored session's `diff_files` column is not a valid file list.
    #[error("malformed diff_files in review session {session_id}: {source}")]
    MalformedSession {
        session_id: i64,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown review action {0:?}")]
    UnknownAction(String),

    #[error("empty tree hash")]
    EmptyTreeHash,

    #[error("failed to write attestation {}: {source}", path.display())]
    AttestationWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to delete attestation {}: {source}", path.display())]
    AttestationDelete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The raw diff handed to the parser was empty.
    #[error("empty diff content")]
    EmptyDiff,
}

