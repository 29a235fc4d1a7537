//! The repository catalog: durable, normalized storage of every repository
//! the user has added, with optional linked GitHub metadata.
//!
//! Three tables linked by integer ids the database assigns on insert:
//! `repositories`, `github_repositories`, `owners`. The local repository's
//! reference to its GitHub repository is the authoritative edge; GitHub rows
//! are only ever reached through it. Owner rows are created lazily on first
//! reference and never deleted.
//!
//! Reads always hit the database — there is no caching layer, so every
//! `list_repositories` call observes the latest committed state.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};

use crate::error::StorageResult;
use crate::models::{GitHubRepository, Owner, Repository};

pub struct RepositoryCatalog {
    conn: Connection,
}

impl RepositoryCatalog {
    /// Open or create the catalog database at the given path.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "wal")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let catalog = Self { conn };
        catalog.init_schema()?;
        Ok(catalog)
    }

    /// Open an in-memory catalog (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let catalog = Self { conn };
        catalog.init_schema()?;
        Ok(catalog)
    }

    fn init_schema(&self) -> StorageResult<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS repositories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL,
                github_repository_id INTEGER REFERENCES github_repositories(id)
            );

            CREATE TABLE IF NOT EXISTS github_repositories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                owner_id INTEGER NOT NULL REFERENCES owners(id),
                private INTEGER NOT NULL DEFAULT 0,
                fork INTEGER NOT NULL DEFAULT 0,
                html_url TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS owners (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                login TEXT NOT NULL COLLATE NOCASE,
                endpoint TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_owners_login ON owners(login);
            ",
        )?;
        Ok(())
    }

    /// All repositories in the catalog, fully inflated with their linked
    /// GitHub repository and owner where present.
    pub fn list_repositories(&self) -> StorageResult<Vec<Repository>> {
        let mut repo_stmt = self
            .conn
            .prepare("SELECT id, path, github_repository_id FROM repositories ORDER BY id")?;
        let mut github_stmt = self.conn.prepare(
            "SELECT g.id, g.name, g.private, g.fork, g.html_url, o.id, o.login, o.endpoint
             FROM github_repositories g
             JOIN owners o ON o.id = g.owner_id
             WHERE g.id = ?1",
        )?;

        let rows = repo_stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<i64>>(2)?,
            ))
        })?;

        let mut repositories = Vec::new();
        for row in rows {
            let (id, path, github_id) = row?;
            let github_repository = match github_id {
                Some(github_id) => Some(github_stmt.query_row(params![github_id], |row| {
                    Ok(GitHubRepository {
                        id: Some(row.get(0)?),
                        name: row.get(1)?,
                        private: row.get(2)?,
                        fork: row.get(3)?,
                        html_url: row.get(4)?,
                        owner: Owner {
                            id: Some(row.get(5)?),
                            login: row.get(6)?,
                            endpoint: row.get(7)?,
                        },
                    })
                })?),
                None => None,
            };
            repositories.push(Repository {
                id: Some(id),
                path,
                github_repository,
            });
        }

        Ok(repositories)
    }

    /// Insert a repository, ignoring any id the caller supplied, and return
    /// the stored copy with its newly assigned id.
    ///
    /// The insert commits on its own; when the input carries GitHub metadata
    /// the upsert runs as a second, independent transaction. A crash between
    /// the two leaves a repository with no linked remote, recoverable by
    /// re-running [`update_github_repository`](Self::update_github_repository).
    pub fn add_repository(&mut self, repo: &Repository) -> StorageResult<Repository> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO repositories (path) VALUES (?1)",
            params![repo.path],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        tracing::debug!(id, path = %repo.path, "added repository");

        let mut added = repo.clone();
        added.id = Some(id);
        if added.github_repository.is_some() {
            self.update_github_repository(&added)?;
        }
        Ok(added)
    }

    /// Upsert GitHub metadata for an already-added repository.
    ///
    /// Runs as one transaction across all three tables. When the repository
    /// already links a GitHub row, that row's id and owner are reused as-is,
    /// keeping both identifiers stable across repeated updates. Otherwise the
    /// owner is resolved or created by case-insensitive login and a fresh
    /// GitHub row is inserted and linked.
    ///
    /// # Panics
    ///
    /// Panics if the repository has no id, carries no GitHub metadata, or is
    /// not present in the catalog — all caller contract violations.
    pub fn update_github_repository(&mut self, repo: &Repository) -> StorageResult<()> {
        let Some(repo_id) = repo.id else {
            panic!("repository must be added to the catalog before updating its GitHub repository");
        };
        let Some(github) = &repo.github_repository else {
            panic!("updating a GitHub repository requires GitHub repository metadata");
        };

        let tx = self.conn.transaction()?;

        let linked: Option<Option<i64>> = tx
            .query_row(
                "SELECT github_repository_id FROM repositories WHERE id = ?1",
                params![repo_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(linked) = linked else {
            panic!("repository {repo_id} is not in the catalog");
        };

        let (existing_id, owner_id) = match linked {
            Some(github_id) => {
                // The existing linkage wins; the owner is not re-resolved
                // from the incoming payload.
                let owner_id: i64 = tx.query_row(
                    "SELECT owner_id FROM github_repositories WHERE id = ?1",
                    params![github_id],
                    |row| row.get(0),
                )?;
                (Some(github_id), owner_id)
            }
            None => {
                // Lookup is by login alone; endpoint is stored but not part
                // of the filter.
                let found: Option<i64> = tx
                    .query_row(
                        "SELECT id FROM owners WHERE login = ?1",
                        params![github.owner.login],
                        |row| row.get(0),
                    )
                    .optional()?;
                let owner_id = match found {
                    Some(owner_id) => owner_id,
                    None => {
                        tx.execute(
                            "INSERT INTO owners (login, endpoint) VALUES (?1, ?2)",
                            params![github.owner.login, github.owner.endpoint],
                        )?;
                        tx.last_insert_rowid()
                    }
                };
                (None, owner_id)
            }
        };

        let github_id = match existing_id {
            Some(github_id) => {
                tx.execute(
                    "UPDATE github_repositories
                     SET name = ?1, owner_id = ?2, private = ?3, fork = ?4, html_url = ?5
                     WHERE id = ?6",
                    params![
                        github.name,
                        owner_id,
                        github.private,
                        github.fork,
                        github.html_url,
                        github_id
                    ],
                )?;
                github_id
            }
            None => {
                tx.execute(
                    "INSERT INTO github_repositories (name, owner_id, private, fork, html_url)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        github.name,
                        owner_id,
                        github.private,
                        github.fork,
                        github.html_url
                    ],
                )?;
                tx.last_insert_rowid()
            }
        };

        tx.execute(
            "UPDATE repositories SET github_repository_id = ?1 WHERE id = ?2",
            params![github_id, repo_id],
        )?;
        tx.commit()?;
        tracing::debug!(repo_id, github_id, "updated GitHub repository");

        Ok(())
    }
}
