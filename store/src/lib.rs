//! In-process realtime document store backing the race engine
//!
//! This crate provides the store contract the engine is written against:
//! - A hierarchical document space: JSON values keyed by `/`-separated paths
//! - A conflict-safe read-modify-write primitive with bounded retry
//! - Per-subtree subscriptions whose notifications coalesce rapid updates
//! - Server-assigned timestamps via a swappable [`Clock`]
//!
//! Writes provide single-document atomicity: a transaction commits only if
//! the document is unchanged since the paired read, and retries transparently
//! on conflict. No cross-document transactions exist; anything that must
//! change together belongs in one document.

pub mod clock;
pub mod error;

pub use clock::Clock;
pub use error::StoreError;

use log::{debug, warn};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Retry budget for one conflict-safe write. Matches the retry limit the
/// Firebase realtime-database client applies to `runTransaction`.
pub const MAX_TX_RETRIES: u32 = 25;

/// What a transaction closure decided to do with the document it was shown.
pub enum TxDecision {
    /// Replace the document with this value if nobody else wrote in between.
    Commit(Value),
    /// Leave the document untouched and end the transaction.
    Abort,
}

#[derive(Debug, Clone)]
struct VersionedDoc {
    version: u64,
    value: Value,
}

struct WatcherSlot {
    prefix: String,
    tx: watch::Sender<Value>,
}

struct StoreInner {
    docs: Mutex<BTreeMap<String, VersionedDoc>>,
    watchers: Mutex<Vec<WatcherSlot>>,
    version_counter: AtomicU64,
    clock: Clock,
}

/// Handle to the shared document space. Cloning is cheap; all clones see the
/// same documents, the same watchers and the same clock.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    pub fn new() -> Self {
        Self::with_clock(Clock::system())
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                docs: Mutex::new(BTreeMap::new()),
                watchers: Mutex::new(Vec::new()),
                version_counter: AtomicU64::new(0),
                clock,
            }),
        }
    }

    /// Current server time in milliseconds since the epoch.
    pub fn now_ms(&self) -> u64 {
        self.inner.clock.now_ms()
    }

    pub fn clock(&self) -> &Clock {
        &self.inner.clock
    }

    /// Reads the document at `path`, if any.
    pub fn read(&self, path: &str) -> Option<Value> {
        self.docs().get(path).map(|doc| doc.value.clone())
    }

    /// Unconditionally replaces the document at `path`.
    ///
    /// This is the plain `set` of the store contract. Anything racing other
    /// writers must go through [`Store::transact`] instead.
    pub fn write(&self, path: &str, value: Value) {
        let mut docs = self.docs();
        self.commit_locked(&mut docs, path, value);
    }

    /// Removes the document at `path` and every document below it.
    ///
    /// Idempotent: removing a path that holds nothing returns `false` and
    /// notifies nobody.
    pub fn remove(&self, path: &str) -> bool {
        let mut docs = self.docs();
        let child_prefix = format!("{}/", path);
        let targets: Vec<String> = docs
            .keys()
            .filter(|key| key.as_str() == path || key.starts_with(&child_prefix))
            .cloned()
            .collect();

        if targets.is_empty() {
            return false;
        }
        for target in &targets {
            docs.remove(target);
        }
        self.notify_locked(&docs, path);
        true
    }

    /// All documents at or below `prefix`, in path order.
    pub fn list(&self, prefix: &str) -> Vec<(String, Value)> {
        let docs = self.docs();
        let child_prefix = format!("{}/", prefix);
        docs.iter()
            .filter(|(path, _)| path.as_str() == prefix || path.starts_with(&child_prefix))
            .map(|(path, doc)| (path.clone(), doc.value.clone()))
            .collect()
    }

    /// Conflict-safe read-modify-write on a single document.
    ///
    /// The closure sees a snapshot of the document (or `None` if absent) and
    /// decides to commit a replacement or abort. The commit lands only if the
    /// document is still at the snapshotted version; otherwise the closure
    /// runs again against a fresh snapshot, up to [`MAX_TX_RETRIES`] times.
    ///
    /// Returns the committed value, `Ok(None)` if the closure aborted, or
    /// [`StoreError::Contended`] once the retry budget is spent. The closure
    /// runs without any lock held, so it may freely read the store — and
    /// must therefore be safe to run more than once.
    pub fn transact<F>(&self, path: &str, mut op: F) -> Result<Option<Value>, StoreError>
    where
        F: FnMut(Option<&Value>) -> TxDecision,
    {
        for attempt in 1..=MAX_TX_RETRIES {
            let snapshot = {
                let docs = self.docs();
                docs.get(path).map(|doc| (doc.version, doc.value.clone()))
            };

            let value = match op(snapshot.as_ref().map(|(_, value)| value)) {
                TxDecision::Abort => return Ok(None),
                TxDecision::Commit(value) => value,
            };

            {
                let mut docs = self.docs();
                let current_version = docs.get(path).map(|doc| doc.version);
                if current_version == snapshot.as_ref().map(|(version, _)| *version) {
                    let committed = value.clone();
                    self.commit_locked(&mut docs, path, value);
                    return Ok(Some(committed));
                }
            }

            debug!(
                "transaction on '{}' conflicted, retrying ({}/{})",
                path, attempt, MAX_TX_RETRIES
            );
            std::thread::yield_now();
        }

        warn!("transaction on '{}' exceeded its retry budget", path);
        Err(StoreError::Contended {
            path: path.to_string(),
            attempts: MAX_TX_RETRIES,
        })
    }

    /// Subscribes to the subtree rooted at `prefix`.
    ///
    /// The returned handle starts out holding the current snapshot. Every
    /// committed mutation under the prefix re-publishes the latest snapshot;
    /// rapid updates coalesce, so an observer always sees the newest state
    /// but may skip intermediates. Dropping the handle ends the subscription.
    pub fn watch(&self, prefix: &str) -> Subtree {
        let docs = self.docs();
        let initial = subtree_locked(&docs, prefix);
        let (tx, rx) = watch::channel(initial);
        self.watchers().push(WatcherSlot {
            prefix: prefix.to_string(),
            tx,
        });
        drop(docs);
        Subtree { rx }
    }

    fn docs(&self) -> MutexGuard<'_, BTreeMap<String, VersionedDoc>> {
        self.inner.docs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn watchers(&self) -> MutexGuard<'_, Vec<WatcherSlot>> {
        self.inner
            .watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn commit_locked(&self, docs: &mut BTreeMap<String, VersionedDoc>, path: &str, value: Value) {
        let version = self.inner.version_counter.fetch_add(1, Ordering::SeqCst) + 1;
        docs.insert(path.to_string(), VersionedDoc { version, value });
        self.notify_locked(docs, path);
    }

    // Runs with the docs lock held so each watcher sees snapshots in commit
    // order.
    fn notify_locked(&self, docs: &BTreeMap<String, VersionedDoc>, path: &str) {
        let mut watchers = self.watchers();
        watchers.retain(|slot| !slot.tx.is_closed());
        for slot in watchers.iter() {
            if covers(&slot.prefix, path) {
                let _ = slot.tx.send(subtree_locked(docs, &slot.prefix));
            }
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

/// Live view of one subtree, updated on every commit beneath it.
pub struct Subtree {
    rx: watch::Receiver<Value>,
}

impl Subtree {
    /// Waits until a snapshot newer than the last one seen is available.
    pub async fn changed(&mut self) -> Result<(), StoreError> {
        self.rx
            .changed()
            .await
            .map_err(|_| StoreError::SubscriptionClosed)
    }

    /// Latest snapshot, marking it as seen.
    pub fn latest(&mut self) -> Value {
        self.rx.borrow_and_update().clone()
    }
}

fn covers(prefix: &str, path: &str) -> bool {
    if prefix == path {
        return true;
    }
    // A write below the prefix, or the removal of an ancestor of it
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('/'))
        || prefix
            .strip_prefix(path)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn subtree_locked(docs: &BTreeMap<String, VersionedDoc>, prefix: &str) -> Value {
    if let Some(doc) = docs.get(prefix) {
        return doc.value.clone();
    }

    let child_prefix = format!("{}/", prefix);
    let mut root = Map::new();
    for (path, doc) in docs.iter() {
        if let Some(rel) = path.strip_prefix(&child_prefix) {
            insert_nested(&mut root, rel, doc.value.clone());
        }
    }

    if root.is_empty() {
        Value::Null
    } else {
        Value::Object(root)
    }
}

fn insert_nested(map: &mut Map<String, Value>, rel_path: &str, value: Value) {
    match rel_path.split_once('/') {
        None => {
            map.insert(rel_path.to_string(), value);
        }
        Some((head, rest)) => {
            let slot = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(child) = slot {
                insert_nested(child, rest, value);
            }
        }
    }
}
