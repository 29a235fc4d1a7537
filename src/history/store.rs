//! In-memory commit history store for one open repository.
//!
//! Keeps a SHA-keyed map of commit content and the ordered traversal
//! sequence from HEAD, loaded in fixed-size batches from the git
//! collaborator. State lives for the process only and is rebuilt from git on
//! each run.
//!
//! Concurrent loads of the same range are collapsed by request key: a keyed
//! load already in flight turns the second call into a no-op. Collaborator
//! failures never escape to callers — they are logged, forwarded to the
//! error channel, and converted into an absent result.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{GitError, GitResult};
use crate::git::{GitClient, ResetMode, RevisionRange};
use crate::history::emitter::{StoreEmitter, Subscription};
use crate::models::{Branch, Commit, Repository};

/// Number of commits fetched per batch.
const COMMIT_BATCH_SIZE: usize = 100;

/// Request key guarding a full history load from HEAD.
const HISTORY_REQUEST_KEY: &str = "history";

#[derive(Default)]
struct HistoryState {
    /// SHA -> commit content. Grows monotonically; nothing is evicted.
    commits: HashMap<String, Commit>,
    /// Traversal order from HEAD, newest first.
    history: Vec<String>,
    /// Commits not yet pushed to the current branch's upstream.
    local_commit_shas: Vec<String>,
    branches: Vec<Branch>,
    current_branch: Option<Branch>,
}

pub struct HistoryStore {
    repository: Repository,
    client: Arc<dyn GitClient>,
    state: Mutex<HistoryState>,
    requests_in_flight: Mutex<HashSet<String>>,
    emitter: StoreEmitter,
}

impl HistoryStore {
    pub fn new(repository: Repository, client: Arc<dyn GitClient>) -> Self {
        Self {
            repository,
            client,
            state: Mutex::new(HistoryState::default()),
            requests_in_flight: Mutex::new(HashSet::new()),
            emitter: StoreEmitter::new(),
        }
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    /// Traversal order from HEAD, newest first.
    pub fn history(&self) -> Vec<String> {
        self.state().history.clone()
    }

    pub fn commit(&self, sha: &str) -> Option<Commit> {
        self.state().commits.get(sha).cloned()
    }

    /// Commits loaded by the last `load_local_commits` call, newest first.
    pub fn local_commits(&self) -> Vec<Commit> {
        let state = self.state();
        state
            .local_commit_shas
            .iter()
            .filter_map(|sha| state.commits.get(sha).cloned())
            .collect()
    }

    pub fn branches(&self) -> Vec<Branch> {
        self.state().branches.clone()
    }

    pub fn current_branch(&self) -> Option<Branch> {
        self.state().current_branch.clone()
    }

    pub fn on_did_update(&self, f: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.emitter.on_did_update(f)
    }

    pub fn on_did_load_new_commits(
        &self,
        f: impl Fn(&[Commit]) + Send + Sync + 'static,
    ) -> Subscription {
        self.emitter.on_did_load_new_commits(f)
    }

    pub fn on_did_error(&self, f: impl Fn(&GitError) + Send + Sync + 'static) -> Subscription {
        self.emitter.on_did_error(f)
    }

    /// (Re)load one batch of history from the current HEAD.
    ///
    /// No-op while another full history load is in flight. When a previous
    /// history exists, the new batch is searched for the old tip: if found,
    /// the batch prefix up to it is spliced in front of the old history,
    /// which is trusted unchanged beyond the intersection; if not found
    /// within the batch, the old history is discarded as diverged.
    pub async fn load_history(&self) {
        if !self.begin_request(HISTORY_REQUEST_KEY.to_string()) {
            return;
        }

        let fetched = self
            .perform_failable(
                self.client
                    .commits(self.path(), RevisionRange::Head, COMMIT_BATCH_SIZE),
            )
            .await;
        self.end_request(HISTORY_REQUEST_KEY);
        let Some(fetched) = fetched else {
            return;
        };

        {
            let mut state = self.state();
            let fetched_shas: Vec<String> = fetched.iter().map(|c| c.sha.clone()).collect();
            let tip = state.history.first().cloned();
            match tip {
                Some(tip) => match fetched.iter().position(|c| c.sha == tip) {
                    Some(index) => {
                        let mut spliced = fetched_shas[..index].to_vec();
                        spliced.append(&mut state.history);
                        state.history = spliced;
                    }
                    // The old tip is unreachable within one batch; treat the
                    // divergence as a full rewrite.
                    None => state.history = fetched_shas,
                },
                None => state.history = fetched_shas,
            }
            store_commits(&mut state, &fetched);
        }

        self.emitter.emit_new_commits(&fetched);
        self.emitter.emit_update();
    }

    /// Append the next batch of older commits past the current end of
    /// history.
    ///
    /// No-op when history is empty, while a full history load is in flight,
    /// or while the continuation batch for the same end SHA is already being
    /// fetched.
    pub async fn load_next_history_batch(&self) {
        if self.request_in_flight(HISTORY_REQUEST_KEY) {
            return;
        }
        let Some(last) = self.state().history.last().cloned() else {
            return;
        };
        let key = format!("{HISTORY_REQUEST_KEY}/{last}");
        if !self.begin_request(key.clone()) {
            return;
        }

        let fetched = self
            .perform_failable(self.client.commits(
                self.path(),
                RevisionRange::AncestorsOf(last),
                COMMIT_BATCH_SIZE,
            ))
            .await;
        self.end_request(&key);
        let Some(fetched) = fetched else {
            return;
        };

        {
            let mut state = self.state();
            state.history.extend(fetched.iter().map(|c| c.sha.clone()));
            store_commits(&mut state, &fetched);
        }

        self.emitter.emit_new_commits(&fetched);
        self.emitter.emit_update();
    }

    /// Load the commits on `branch` that its upstream does not have yet, or,
    /// for a branch with no upstream, everything on HEAD that no remote
    /// branch can reach. `None` clears the local list (detached HEAD).
    ///
    /// The result is kept separate from `history`.
    pub async fn load_local_commits(&self, branch: Option<&Branch>) {
        let Some(branch) = branch else {
            self.state().local_commit_shas.clear();
            return;
        };

        let range = match &branch.upstream {
            Some(upstream) => RevisionRange::Range {
                from: upstream.clone(),
                to: branch.name.clone(),
            },
            None => RevisionRange::HeadExcludingRemotes,
        };

        let Some(fetched) = self
            .perform_failable(self.client.commits(self.path(), range, COMMIT_BATCH_SIZE))
            .await
        else {
            return;
        };

        {
            let mut state = self.state();
            state.local_commit_shas = fetched.iter().map(|c| c.sha.clone()).collect();
            store_commits(&mut state, &fetched);
        }

        self.emitter.emit_update();
    }

    /// Refresh the cached branch list and current branch.
    pub async fn load_branches(&self) {
        let Some(branches) = self.perform_failable(self.client.branches(self.path())).await else {
            return;
        };
        let Some(current) = self
            .perform_failable(self.client.current_branch(self.path()))
            .await
        else {
            return;
        };

        {
            let mut state = self.state();
            state.branches = branches;
            state.current_branch = current;
        }

        self.emitter.emit_update();
    }

    /// Undo a commit by resetting to its first parent, keeping the working
    /// tree. Returns `false` for a parentless commit or when the reset
    /// fails; the failure itself is reported on the error channel.
    pub async fn undo_commit(&self, commit: &Commit) -> bool {
        let Some(parent) = commit.parent_shas.first() else {
            return false;
        };
        if self
            .perform_failable(self.client.reset(self.path(), ResetMode::Mixed, parent))
            .await
            .is_none()
        {
            return false;
        }
        self.emitter.emit_update();
        true
    }

    /// Delete the ref backing `branch`. Returns `false` when the deletion
    /// fails; the failure itself is reported on the error channel.
    pub async fn delete_branch(&self, branch: &Branch) -> bool {
        if self
            .perform_failable(self.client.delete_branch(self.path(), branch))
            .await
            .is_none()
        {
            return false;
        }
        self.emitter.emit_update();
        true
    }

    /// Run a collaborator call, absorbing any failure into an error
    /// notification plus an absent result. Every git access goes through
    /// here; callers only ever observe "no new data" on failure.
    async fn perform_failable<T>(&self, operation: impl Future<Output = GitResult<T>>) -> Option<T> {
        match operation.await {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::error!(
                    repository = %self.repository.path,
                    error = %err,
                    "git operation failed"
                );
                self.emitter.emit_error(&err);
                None
            }
        }
    }

    fn path(&self) -> &Path {
        Path::new(&self.repository.path)
    }

    fn state(&self) -> MutexGuard<'_, HistoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_request(&self, key: String) -> bool {
        self.requests_in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key)
    }

    fn end_request(&self, key: &str) {
        self.requests_in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    fn request_in_flight(&self, key: &str) -> bool {
        self.requests_in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }
}

fn store_commits(state: &mut HistoryState, commits: &[Commit]) {
    for commit in commits {
        state.commits.insert(commit.sha.clone(), commit.clone());
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::DateTime;

    use super::*;
    use crate::error::GitError;
    use crate::models::{BranchKind, CommitIdentity};

    #[derive(Default)]
    struct ScriptedGit {
        log_responses: Mutex<VecDeque<GitResult<Vec<Commit>>>>,
        log_ranges: Mutex<Vec<RevisionRange>>,
        log_calls: AtomicUsize,
        resets: Mutex<Vec<(ResetMode, String)>>,
        deleted_branches: Mutex<Vec<String>>,
    }

    impl ScriptedGit {
        fn respond_with(responses: Vec<GitResult<Vec<Commit>>>) -> Arc<Self> {
            Arc::new(Self {
                log_responses: Mutex::new(responses.into()),
                ..Default::default()
            })
        }
    }

    #[async_trait]
    impl GitClient for ScriptedGit {
        async fn commits(
            &self,
            _repo_path: &Path,
            range: RevisionRange,
            _limit: usize,
        ) -> GitResult<Vec<Commit>> {
            // Suspend once so concurrent calls can interleave before the
            // response is produced.
            tokio::task::yield_now().await;
            self.log_calls.fetch_add(1, Ordering::SeqCst);
            self.log_ranges.lock().unwrap().push(range);
            self.log_responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn branches(&self, _repo_path: &Path) -> GitResult<Vec<Branch>> {
            Ok(vec![branch("main", Some("origin/main"))])
        }

        async fn current_branch(&self, _repo_path: &Path) -> GitResult<Option<Branch>> {
            Ok(Some(branch("main", Some("origin/main"))))
        }

        async fn reset(
            &self,
            _repo_path: &Path,
            mode: ResetMode,
            target: &str,
        ) -> GitResult<()> {
            self.resets.lock().unwrap().push((mode, target.to_string()));
            Ok(())
        }

        async fn delete_branch(&self, _repo_path: &Path, branch: &Branch) -> GitResult<()> {
            self.deleted_branches.lock().unwrap().push(branch.name.clone());
            Ok(())
        }
    }

    fn commit(sha: &str, parents: &[&str]) -> Commit {
        Commit {
            sha: sha.to_string(),
            summary: format!("commit {sha}"),
            body: String::new(),
            author: CommitIdentity {
                name: "Hubot".to_string(),
                email: "hubot@example.com".to_string(),
                date: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            },
            parent_shas: parents.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn branch(name: &str, upstream: Option<&str>) -> Branch {
        Branch {
            name: name.to_string(),
            upstream: upstream.map(str::to_string),
            kind: BranchKind::Local,
        }
    }

    fn store(client: Arc<ScriptedGit>) -> HistoryStore {
        HistoryStore::new(Repository::new("/repo"), client)
    }

    #[tokio::test]
    async fn load_history_populates_history_and_commits() {
        let client = ScriptedGit::respond_with(vec![Ok(vec![
            commit("c2", &["c1"]),
            commit("c1", &["c0"]),
            commit("c0", &[]),
        ])]);
        let store = store(client.clone());

        store.load_history().await;

        assert_eq!(store.history(), vec!["c2", "c1", "c0"]);
        assert_eq!(store.commit("c1").unwrap().summary, "commit c1");
        assert_eq!(client.log_calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.log_ranges.lock().unwrap()[0], RevisionRange::Head);
    }

    #[tokio::test]
    async fn load_history_splices_at_the_known_tip() {
        // The second batch ends right at the old tip; everything past it
        // must come from the previous history, untouched.
        let client = ScriptedGit::respond_with(vec![
            Ok(vec![commit("c0", &["c1"]), commit("c1", &["c2"]), commit("c2", &[])]),
            Ok(vec![commit("n0", &["n1"]), commit("n1", &["c0"]), commit("c0", &["c1"])]),
        ]);
        let store = store(client.clone());

        store.load_history().await;
        store.load_history().await;

        assert_eq!(store.history(), vec!["n0", "n1", "c0", "c1", "c2"]);
    }

    #[tokio::test]
    async fn load_history_discards_diverged_history() {
        let client = ScriptedGit::respond_with(vec![
            Ok(vec![commit("c0", &["c1"]), commit("c1", &[])]),
            Ok(vec![commit("x0", &["x1"]), commit("x1", &[])]),
        ]);
        let store = store(client.clone());

        store.load_history().await;
        store.load_history().await;

        assert_eq!(store.history(), vec!["x0", "x1"]);
    }

    #[tokio::test]
    async fn concurrent_history_loads_are_deduplicated() {
        let client = ScriptedGit::respond_with(vec![Ok(vec![commit("c0", &[])])]);
        let store = store(client.clone());

        let updates = Arc::new(AtomicUsize::new(0));
        let batches = Arc::new(AtomicUsize::new(0));
        let updates_seen = updates.clone();
        let batches_seen = batches.clone();
        let _update_sub = store.on_did_update(move || {
            updates_seen.fetch_add(1, Ordering::SeqCst);
        });
        let _commits_sub = store.on_did_load_new_commits(move |batch| {
            assert_eq!(batch.len(), 1);
            batches_seen.fetch_add(1, Ordering::SeqCst);
        });

        tokio::join!(store.load_history(), store.load_history());

        assert_eq!(client.log_calls.load(Ordering::SeqCst), 1);
        assert_eq!(updates.load(Ordering::SeqCst), 1);
        assert_eq!(batches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn load_next_history_batch_appends_older_commits() {
        let client = ScriptedGit::respond_with(vec![
            Ok(vec![commit("c2", &["c1"]), commit("c1", &["c0"])]),
            Ok(vec![commit("c0", &[])]),
        ]);
        let store = store(client.clone());

        store.load_history().await;
        store.load_next_history_batch().await;

        assert_eq!(store.history(), vec!["c2", "c1", "c0"]);
        let ranges = client.log_ranges.lock().unwrap();
        assert_eq!(ranges[1], RevisionRange::AncestorsOf("c1".to_string()));
    }

    #[tokio::test]
    async fn load_next_history_batch_without_history_is_a_noop() {
        let client = ScriptedGit::respond_with(vec![]);
        let store = store(client.clone());

        store.load_next_history_batch().await;

        assert_eq!(client.log_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn next_batch_defers_to_a_full_history_load() {
        let client = ScriptedGit::respond_with(vec![
            Ok(vec![commit("c1", &["c0"])]),
            Ok(vec![commit("c1", &["c0"])]),
        ]);
        let store = store(client.clone());

        store.load_history().await;
        tokio::join!(store.load_history(), store.load_next_history_batch());

        // The continuation saw the in-flight history load and backed off.
        assert_eq!(client.log_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_batch_load_leaves_state_untouched() {
        let client = ScriptedGit::respond_with(vec![
            Ok(vec![commit("c1", &["c0"]), commit("c0", &[])]),
            Err(GitError::Task("git log exited with code 128".to_string())),
        ]);
        let store = store(client.clone());

        let errors = Arc::new(AtomicUsize::new(0));
        let errors_seen = errors.clone();
        let _error_sub = store.on_did_error(move |_| {
            errors_seen.fetch_add(1, Ordering::SeqCst);
        });

        store.load_history().await;
        let before = store.history();

        store.load_next_history_batch().await;

        assert_eq!(store.history(), before);
        assert_eq!(store.commit("c0").unwrap(), commit("c0", &[]));
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn load_local_commits_tracks_unpushed_commits() {
        let client = ScriptedGit::respond_with(vec![Ok(vec![
            commit("l1", &["l0"]),
            commit("l0", &["c0"]),
        ])]);
        let store = store(client.clone());

        store
            .load_local_commits(Some(&branch("feature", Some("origin/feature"))))
            .await;

        let locals: Vec<String> = store.local_commits().iter().map(|c| c.sha.clone()).collect();
        assert_eq!(locals, vec!["l1", "l0"]);
        assert!(store.history().is_empty());
        assert_eq!(
            client.log_ranges.lock().unwrap()[0],
            RevisionRange::Range {
                from: "origin/feature".to_string(),
                to: "feature".to_string(),
            }
        );

        store.load_local_commits(None).await;
        assert!(store.local_commits().is_empty());
    }

    #[tokio::test]
    async fn load_local_commits_without_upstream_excludes_remotes() {
        let client = ScriptedGit::respond_with(vec![Ok(vec![commit("l0", &[])])]);
        let store = store(client.clone());

        store.load_local_commits(Some(&branch("topic", None))).await;

        assert_eq!(
            client.log_ranges.lock().unwrap()[0],
            RevisionRange::HeadExcludingRemotes
        );
    }

    #[tokio::test]
    async fn load_branches_caches_the_branch_list() {
        let client = ScriptedGit::respond_with(vec![]);
        let store = store(client.clone());

        store.load_branches().await;

        assert_eq!(store.branches(), vec![branch("main", Some("origin/main"))]);
        assert_eq!(store.current_branch(), Some(branch("main", Some("origin/main"))));
    }

    #[tokio::test]
    async fn undo_commit_resets_to_the_first_parent() {
        let client = ScriptedGit::respond_with(vec![]);
        let store = store(client.clone());

        assert!(store.undo_commit(&commit("c1", &["c0"])).await);
        assert_eq!(
            client.resets.lock().unwrap().as_slice(),
            &[(ResetMode::Mixed, "c0".to_string())]
        );

        assert!(!store.undo_commit(&commit("root", &[])).await);
        assert_eq!(client.resets.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_branch_reports_an_update() {
        let client = ScriptedGit::respond_with(vec![]);
        let store = store(client.clone());

        let updates = Arc::new(AtomicUsize::new(0));
        let updates_seen = updates.clone();
        let _sub = store.on_did_update(move || {
            updates_seen.fetch_add(1, Ordering::SeqCst);
        });

        assert!(store.delete_branch(&branch("old", None)).await);
        assert_eq!(
            client.deleted_branches.lock().unwrap().as_slice(),
            &["old".to_string()]
        );
        assert_eq!(updates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsubscribed_listeners_stop_receiving_updates() {
        let client = ScriptedGit::respond_with(vec![
            Ok(vec![commit("c0", &[])]),
            Ok(vec![commit("c0", &[])]),
        ]);
        let store = store(client.clone());

        let updates = Arc::new(AtomicUsize::new(0));
        let updates_seen = updates.clone();
        let sub = store.on_did_update(move || {
            updates_seen.fetch_add(1, Ordering::SeqCst);
        });

        store.load_history().await;
        sub.unsubscribe();
        store.load_history().await;

        assert_eq!(updates.load(Ordering::SeqCst), 1);
    }
}
