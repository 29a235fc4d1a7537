//! Typed notification channels for the history store.
//!
//! Three channels, each a plain listener-list broadcast delivered
//! synchronously on the task that performed the mutation:
//! - update: state changed, no payload
//! - new commits: a freshly fetched batch of commit records
//! - error: an absorbed git failure
//!
//! Listeners must not subscribe or unsubscribe from inside a notification.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::GitError;
use crate::models::Commit;

type Callback<P> = Box<dyn Fn(&P) + Send + Sync>;

struct ListenerSet<P: ?Sized> {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, Callback<P>)>>,
}

impl<P: ?Sized> ListenerSet<P> {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(0),
            entries: Mutex::new(Vec::new()),
        })
    }

    fn emit(&self, payload: &P) {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, callback) in entries.iter() {
            callback(payload);
        }
    }
}

fn subscribe<P: ?Sized + 'static>(set: &Arc<ListenerSet<P>>, callback: Callback<P>) -> Subscription {
    let id = set.next_id.fetch_add(1, Ordering::Relaxed);
    set.entries
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push((id, callback));

    let set = Arc::downgrade(set);
    Subscription(Box::new(move || {
        if let Some(set) = set.upgrade() {
            set.entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(entry_id, _)| *entry_id != id);
        }
    }))
}

/// Handle for a registered listener. Call
/// [`unsubscribe`](Subscription::unsubscribe) to stop receiving
/// notifications; dropping the handle leaves the listener registered.
pub struct Subscription(Box<dyn FnOnce() + Send>);

impl Subscription {
    pub fn unsubscribe(self) {
        (self.0)()
    }
}

pub(crate) struct StoreEmitter {
    update: Arc<ListenerSet<()>>,
    new_commits: Arc<ListenerSet<[Commit]>>,
    error: Arc<ListenerSet<GitError>>,
}

impl StoreEmitter {
    pub(crate) fn new() -> Self {
        Self {
            update: ListenerSet::new(),
            new_commits: ListenerSet::new(),
            error: ListenerSet::new(),
        }
    }

    pub(crate) fn on_did_update(&self, f: impl Fn() + Send + Sync + 'static) -> Subscription {
        subscribe(&self.update, Box::new(move |_| f()))
    }

    pub(crate) fn on_did_load_new_commits(
        &self,
        f: impl Fn(&[Commit]) + Send + Sync + 'static,
    ) -> Subscription {
        subscribe(&self.new_commits, Box::new(f))
    }

    pub(crate) fn on_did_error(
        &self,
        f: impl Fn(&GitError) + Send + Sync + 'static,
    ) -> Subscription {
        subscribe(&self.error, Box::new(f))
    }

    pub(crate) fn emit_update(&self) {
        self.update.emit(&());
    }

    pub(crate) fn emit_new_commits(&self, commits: &[Commit]) {
        self.new_commits.emit(commits);
    }

    pub(crate) fn emit_error(&self, error: &GitError) {
        self.error.emit(error);
    }
}
