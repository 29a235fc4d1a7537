use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single commit as reported by the git collaborator.
///
/// Content-addressed by `sha`; the same SHA always carries the same content,
/// so later inserts into a commit map are harmless overwrites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub summary: String,
    pub body: String,
    pub author: CommitIdentity,
    pub parent_shas: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    /// Short name of the remote-tracking branch, e.g. `origin/main`.
    pub upstream: Option<String>,
    pub kind: BranchKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchKind {
    Local,
    Remote,
}
