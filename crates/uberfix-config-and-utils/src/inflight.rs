//! Single-flight coordination: one running operation per key, any number of
//! callers waiting on its outcome.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

type Entries<K, V> = Arc<Mutex<HashMap<K, (u64, watch::Receiver<Option<V>>)>>>;

/// Map from key to the outcome of the single operation running for it.
///
/// The first caller to [`join`](Self::join) a key becomes the leader and owns
/// a [`Completion`]; later callers get a [`Waiter`] on the same outcome.
/// Completing broadcasts the value and frees the key.
pub struct InflightRegistry<K, V> {
    next_id: AtomicU64,
    entries: Entries<K, V>,
}

/// Result of joining a key.
pub enum Joined<K: Eq + Hash, V> {
    Leader {
        completion: Completion<K, V>,
        waiter: Waiter<V>,
    },
    Follower(Waiter<V>),
}

/// Receiving end of an in-flight operation.
pub struct Waiter<V> {
    receiver: watch::Receiver<Option<V>>,
}

impl<V: Clone> Waiter<V> {
    /// Wait for the outcome. `None` when the leader went away without one.
    pub async fn wait(mut self) -> Option<V> {
        let outcome = match self.receiver.wait_for(|value| value.is_some()).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };
        outcome
    }
}

/// Leader's handle; dropping it without completing wakes waiters with `None`.
pub struct Completion<K: Eq + Hash, V> {
    key: K,
    id: u64,
    sender: watch::Sender<Option<V>>,
    entries: Entries<K, V>,
    finished: bool,
}

impl<K: Eq + Hash, V> Completion<K, V> {
    fn release(&self) {
        let mut entries = self.entries.lock();
        // The key may belong to a newer operation after a clear.
        if entries.get(&self.key).map(|(id, _)| *id) == Some(self.id) {
            entries.remove(&self.key);
        }
    }

    /// Free the key and broadcast `value` to every waiter.
    pub fn complete(mut self, value: V) {
        self.release();
        self.sender.send_replace(Some(value));
        self.finished = true;
    }
}

impl<K: Eq + Hash, V> Drop for Completion<K, V> {
    fn drop(&mut self) {
        if !self.finished {
            self.release();
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> InflightRegistry<K, V> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Attach to the operation running for `key`, or become its leader.
    pub fn join(&self, key: &K) -> Joined<K, V> {
        let mut entries = self.entries.lock();
        if let Some((_, receiver)) = entries.get(key) {
            return Joined::Follower(Waiter {
                receiver: receiver.clone(),
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = watch::channel(None);
        entries.insert(key.clone(), (id, receiver.clone()));

        Joined::Leader {
            completion: Completion {
                key: key.clone(),
                id,
                sender,
                entries: Arc::clone(&self.entries),
                finished: false,
            },
            waiter: Waiter { receiver },
        }
    }

    /// Forget the operation for `key`. It still resolves its own waiters,
    /// but the next `join` starts a fresh one.
    pub fn clear(&self, key: &K) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.lock().contains_key(key)
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Default for InflightRegistry<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
