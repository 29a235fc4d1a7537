//! Core data stores for a desktop Git client.
//!
//! Two cooperating components:
//! - [`RepositoryCatalog`]: durable, normalized storage of the repositories
//!   the user has added, with optional linked GitHub metadata, backed by an
//!   embedded SQLite database.
//! - [`HistoryStore`]: an in-memory, per-repository cache of commit content
//!   and traversal order, loaded incrementally from git with deduplication
//!   of concurrent fetches and observer-style change notification.
//!
//! Git itself is reached through the [`GitClient`] trait; [`GitBackend`] is
//! the libgit2-backed production implementation.

pub mod catalog;
pub mod error;
pub mod git;
pub mod history;
pub mod models;

pub use catalog::RepositoryCatalog;
pub use error::{GitError, GitResult, StorageError, StorageResult};
pub use git::{GitBackend, GitClient, ResetMode, RevisionRange};
pub use history::{HistoryStore, Subscription};
pub use models::{
    Branch, BranchKind, Commit, CommitIdentity, GitHubRepository, Owner, Repository,
};
