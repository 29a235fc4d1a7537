//! The git collaborator seam.
//!
//! `GitClient` abstracts every git operation the stores need, so tests can
//! substitute a scripted fake. The production implementation is
//! [`GitBackend`](crate::git::GitBackend).

use std::fmt;
use std::path::Path;

use async_trait::async_trait;

use crate::error::GitResult;
use crate::models::{Branch, Commit};

/// Which commits a log request should walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevisionRange {
    /// Ancestry of HEAD.
    Head,
    /// Ancestry starting at the first parent of the given commit, i.e. the
    /// continuation range after a batch ending at that SHA. Fails for a
    /// parentless commit.
    AncestorsOf(String),
    /// Commits reachable from `to` but not from `from` (`from..to`).
    Range { from: String, to: String },
    /// HEAD minus everything reachable from any remote-tracking ref.
    HeadExcludingRemotes,
}

impl fmt::Display for RevisionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevisionRange::Head => write!(f, "HEAD"),
            RevisionRange::AncestorsOf(sha) => write!(f, "{sha}^"),
            RevisionRange::Range { from, to } => write!(f, "{from}..{to}"),
            RevisionRange::HeadExcludingRemotes => write!(f, "HEAD --not --remotes"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMode {
    Soft,
    Mixed,
    Hard,
}

/// Git operations consumed by the stores.
#[async_trait]
pub trait GitClient: Send + Sync {
    /// Commits in `range`, newest first, at most `limit` entries.
    async fn commits(
        &self,
        repo_path: &Path,
        range: RevisionRange,
        limit: usize,
    ) -> GitResult<Vec<Commit>>;

    /// All local and remote branches.
    async fn branches(&self, repo_path: &Path) -> GitResult<Vec<Branch>>;

    /// The branch HEAD points at, or `None` when HEAD is detached or unborn.
    async fn current_branch(&self, repo_path: &Path) -> GitResult<Option<Branch>>;

    /// Reset HEAD (and, depending on `mode`, index and working tree) to
    /// `target`.
    async fn reset(&self, repo_path: &Path, mode: ResetMode, target: &str) -> GitResult<()>;

    /// Delete the ref backing `branch`.
    async fn delete_branch(&self, repo_path: &Path, branch: &Branch) -> GitResult<()>;
}
