//! Failure domains for the two stores.
//!
//! - `StorageError`: the repository catalog's embedded database failed.
//!   Surfaced to the caller of every catalog operation, never swallowed.
//! - `GitError`: the git collaborator failed. Always absorbed at the history
//!   store's guarded boundary and redirected to its error channel.
//!
//! Caller contract violations (e.g. upserting GitHub metadata for a
//! repository that was never added) are programming errors and panic instead
//! of returning a variant.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum GitError {
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("git task failed: {0}")]
    Task(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
pub type GitResult<T> = std::result::Result<T, GitError>;
