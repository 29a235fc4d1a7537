//! libgit2-backed production implementation of [`GitClient`].
//!
//! Every call opens the repository fresh and runs on the blocking pool, so
//! the stores' async methods never block the event loop on disk I/O.

use std::path::Path;

use async_trait::async_trait;
use chrono::DateTime;
use git2::{BranchType, ErrorCode, Oid, Repository, ResetType, Sort};

use crate::error::{GitError, GitResult};
use crate::git::client::{GitClient, ResetMode, RevisionRange};
use crate::models::{Branch, BranchKind, Commit, CommitIdentity};

#[derive(Debug, Default)]
pub struct GitBackend;

impl GitBackend {
    pub fn new() -> Self {
        Self
    }
}

async fn with_repo<T, F>(path: &Path, f: F) -> GitResult<T>
where
    F: FnOnce(&Repository) -> GitResult<T> + Send + 'static,
    T: Send + 'static,
{
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let repo = Repository::discover(&path)?;
        f(&repo)
    })
    .await
    .map_err(|err| GitError::Task(err.to_string()))?
}

#[async_trait]
impl GitClient for GitBackend {
    async fn commits(
        &self,
        repo_path: &Path,
        range: RevisionRange,
        limit: usize,
    ) -> GitResult<Vec<Commit>> {
        with_repo(repo_path, move |repo| {
            let mut revwalk = repo.revwalk()?;
            revwalk.set_sorting(Sort::TIME)?;

            match range {
                RevisionRange::Head => revwalk.push_head()?,
                RevisionRange::AncestorsOf(sha) => {
                    let commit = repo.find_commit(Oid::from_str(&sha)?)?;
                    revwalk.push(commit.parent_id(0)?)?;
                }
                RevisionRange::Range { from, to } => {
                    revwalk.push_range(&format!("{from}..{to}"))?;
                }
                RevisionRange::HeadExcludingRemotes => {
                    revwalk.push_head()?;
                    revwalk.hide_glob("refs/remotes/*")?;
                }
            }

            let mut commits = Vec::new();
            for oid in revwalk {
                if commits.len() == limit {
                    break;
                }
                let commit = repo.find_commit(oid?)?;
                commits.push(commit_to_record(&commit));
            }

            Ok(commits)
        })
        .await
    }

    async fn branches(&self, repo_path: &Path) -> GitResult<Vec<Branch>> {
        with_repo(repo_path, |repo| {
            let mut branches = Vec::new();

            for entry in repo.branches(None)? {
                let (branch, branch_type) = entry?;
                let Some(name) = branch.name()? else {
                    continue;
                };
                let name = name.to_string();

                let (kind, upstream) = match branch_type {
                    BranchType::Local => {
                        let upstream = branch
                            .upstream()
                            .ok()
                            .and_then(|u| u.name().ok().flatten().map(str::to_string));
                        (BranchKind::Local, upstream)
                    }
                    BranchType::Remote => (BranchKind::Remote, None),
                };

                branches.push(Branch {
                    name,
                    upstream,
                    kind,
                });
            }

            Ok(branches)
        })
        .await
    }

    async fn current_branch(&self, repo_path: &Path) -> GitResult<Option<Branch>> {
        with_repo(repo_path, |repo| {
            let head = match repo.head() {
                Ok(head) => head,
                Err(err)
                    if err.code() == ErrorCode::UnbornBranch
                        || err.code() == ErrorCode::NotFound =>
                {
                    return Ok(None);
                }
                Err(err) => return Err(err.into()),
            };

            if !head.is_branch() {
                return Ok(None);
            }
            let Some(name) = head.shorthand().map(str::to_string) else {
                return Ok(None);
            };

            let branch = repo.find_branch(&name, BranchType::Local)?;
            let upstream = branch
                .upstream()
                .ok()
                .and_then(|u| u.name().ok().flatten().map(str::to_string));

            Ok(Some(Branch {
                name,
                upstream,
                kind: BranchKind::Local,
            }))
        })
        .await
    }

    async fn reset(&self, repo_path: &Path, mode: ResetMode, target: &str) -> GitResult<()> {
        let target = target.to_string();
        with_repo(repo_path, move |repo| {
            let object = repo.revparse_single(&target)?;
            let reset_type = match mode {
                ResetMode::Soft => ResetType::Soft,
                ResetMode::Mixed => ResetType::Mixed,
                ResetMode::Hard => ResetType::Hard,
            };
            repo.reset(&object, reset_type, None)?;
            Ok(())
        })
        .await
    }

    async fn delete_branch(&self, repo_path: &Path, branch: &Branch) -> GitResult<()> {
        let name = branch.name.clone();
        let branch_type = match branch.kind {
            BranchKind::Local => BranchType::Local,
            BranchKind::Remote => BranchType::Remote,
        };
        with_repo(repo_path, move |repo| {
            let mut branch = repo.find_branch(&name, branch_type)?;
            branch.delete()?;
            Ok(())
        })
        .await
    }
}

fn commit_to_record(commit: &git2::Commit) -> Commit {
    let author = commit.author();
    Commit {
        sha: commit.id().to_string(),
        summary: commit.summary().unwrap_or("").to_string(),
        body: commit.body().unwrap_or("").trim().to_string(),
        author: CommitIdentity {
            name: author.name().unwrap_or("Unknown").to_string(),
            email: author.email().unwrap_or("").to_string(),
            date: DateTime::from_timestamp(author.when().seconds(), 0).unwrap_or_default(),
        },
        parent_shas: commit.parent_ids().map(|id| id.to_string()).collect(),
    }
}
