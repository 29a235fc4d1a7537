use serde::{Deserialize, Serialize};

/// A repository the user has added, identified by its working-directory path.
///
/// `id` is assigned by the catalog on insert and immutable afterwards; it is
/// `None` on values that have not been stored yet. Duplicate paths are not
/// deduplicated at this layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: Option<i64>,
    pub path: String,
    pub github_repository: Option<GitHubRepository>,
}

impl Repository {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            id: None,
            path: path.into(),
            github_repository: None,
        }
    }
}

/// Metadata about the GitHub remote linked to a local repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubRepository {
    pub id: Option<i64>,
    pub name: String,
    pub owner: Owner,
    pub private: bool,
    pub fork: bool,
    pub html_url: String,
}

/// The account owning a GitHub repository.
///
/// `(login, endpoint)` is the natural key; login comparisons are
/// case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub id: Option<i64>,
    pub login: String,
    /// API endpoint URL, distinguishing github.com from Enterprise installs.
    pub endpoint: String,
}
