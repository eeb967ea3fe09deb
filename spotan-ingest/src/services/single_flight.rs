//! Single-flight entity cache
//!
//! Maps an entity id to a shared handle. A missing or stale key gets exactly
//! one fetch no matter how many callers ask for it concurrently: the first
//! caller installs a pending placeholder under the map lock and every later
//! caller awaits that same placeholder.
//!
//! The fetch runs as its own task and installs its outcome itself, so a
//! caller that gives up waiting never leaves a key stuck in the pending
//! state. Failures are not cached. A failed refresh of a stale entry puts
//! the stale entry back.

use super::staleness::StalenessPolicy;
use crate::error::ResolveError;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use spotan_common::{Error, Result};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};

/// Shared, in-place refreshable entity.
///
/// Every holder of a handle sees a refresh; the cache never swaps the
/// allocation behind an id once it exists.
pub type EntityHandle<V> = Arc<RwLock<V>>;

type SharedFetch<V> = Shared<BoxFuture<'static, std::result::Result<EntityHandle<V>, ResolveError>>>;

/// An entity that can live in a [`SingleFlightCache`]
pub trait CacheEntry: Clone + Send + Sync + 'static {
    type Key: Eq + Hash + Clone + Display + Send + Sync + 'static;

    /// Entity kind used in log lines and errors ("artist", "album", ...)
    const KIND: &'static str;

    fn key(&self) -> Self::Key;

    fn last_refreshed(&self) -> DateTime<Utc>;
}

enum Slot<V> {
    Ready(EntityHandle<V>),
    Pending(SharedFetch<V>),
}

/// Snapshot read of a handle's content
pub fn read_entry<V>(handle: &EntityHandle<V>) -> RwLockReadGuard<'_, V> {
    handle.read().unwrap_or_else(PoisonError::into_inner)
}

fn lock_slots<K, V>(slots: &Mutex<HashMap<K, Slot<V>>>) -> MutexGuard<'_, HashMap<K, Slot<V>>> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Write fresh content into the existing handle, or allocate the first one
fn replace_or_create<V>(previous: Option<EntityHandle<V>>, value: V) -> EntityHandle<V> {
    match previous {
        Some(handle) => {
            *handle.write().unwrap_or_else(PoisonError::into_inner) = value;
            handle
        }
        None => Arc::new(RwLock::new(value)),
    }
}

/// Put the outcome of a finished fetch into the map
fn settle<V: CacheEntry>(
    slots: &Mutex<HashMap<V::Key, Slot<V>>>,
    key: &V::Key,
    previous: Option<EntityHandle<V>>,
    outcome: Option<&EntityHandle<V>>,
) {
    let mut slots = lock_slots(slots);
    match (outcome, previous) {
        (Some(handle), _) => {
            slots.insert(key.clone(), Slot::Ready(Arc::clone(handle)));
        }
        (None, Some(stale)) => {
            slots.insert(key.clone(), Slot::Ready(stale));
        }
        (None, None) => {
            slots.remove(key);
        }
    }
}

pub struct SingleFlightCache<V: CacheEntry> {
    slots: Arc<Mutex<HashMap<V::Key, Slot<V>>>>,
    policy: StalenessPolicy,
}

impl<V: CacheEntry> SingleFlightCache<V> {
    pub fn new(policy: StalenessPolicy) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            policy,
        }
    }

    /// Seed the cache with entities already held by the durable store.
    ///
    /// Preloaded entries count as ready; staleness is still judged from
    /// their own `last_refreshed`. A repeated id means the store is corrupt
    /// and is rejected.
    pub fn preload(&self, values: Vec<V>) -> Result<usize> {
        let mut slots = lock_slots(&self.slots);
        let count = values.len();
        for value in values {
            match slots.entry(value.key()) {
                Entry::Occupied(occupied) => {
                    return Err(Error::DuplicateKey(format!(
                        "{} {}",
                        V::KIND,
                        occupied.key()
                    )));
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(Slot::Ready(Arc::new(RwLock::new(value))));
                }
            }
        }
        Ok(count)
    }

    /// Resolve `key`, fetching at most once across concurrent callers.
    ///
    /// `fetch` is only invoked by the caller that claims the key. It
    /// receives the stale handle when this is a refresh, and must produce
    /// the complete new content.
    pub async fn get<F, Fut>(
        &self,
        key: &V::Key,
        fetch: F,
    ) -> std::result::Result<EntityHandle<V>, ResolveError>
    where
        F: FnOnce(Option<EntityHandle<V>>) -> Fut + Send,
        Fut: Future<Output = std::result::Result<V, ResolveError>> + Send + 'static,
    {
        let pending = {
            let mut slots = lock_slots(&self.slots);

            let (joined, previous) = match slots.get(key) {
                Some(Slot::Ready(handle)) if !self.is_stale(handle) => {
                    return Ok(Arc::clone(handle));
                }
                Some(Slot::Ready(handle)) => (None, Some(Arc::clone(handle))),
                Some(Slot::Pending(shared)) => (Some(shared.clone()), None),
                None => (None, None),
            };

            match joined {
                Some(shared) => {
                    tracing::trace!(kind = V::KIND, key = %key, "Joining in-flight fetch");
                    shared
                }
                None => {
                    if previous.is_some() {
                        tracing::debug!(kind = V::KIND, key = %key, "Refreshing stale entry");
                    } else {
                        tracing::debug!(kind = V::KIND, key = %key, "Cache miss, fetching");
                    }
                    let future = fetch(previous.clone());
                    let shared = self.spawn_fetch(key.clone(), previous, future);
                    slots.insert(key.clone(), Slot::Pending(shared.clone()));
                    shared
                }
            }
        };

        pending.await
    }

    /// Ready handle for `key`, ignoring staleness; never fetches
    pub fn get_cached(&self, key: &V::Key) -> Option<EntityHandle<V>> {
        match lock_slots(&self.slots).get(key) {
            Some(Slot::Ready(handle)) => Some(Arc::clone(handle)),
            _ => None,
        }
    }

    /// Number of occupied keys (ready or pending)
    pub fn len(&self) -> usize {
        lock_slots(&self.slots).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_stale(&self, handle: &EntityHandle<V>) -> bool {
        self.policy.is_stale(read_entry(handle).last_refreshed())
    }

    /// Run the fetch on its own task; the task settles the slot.
    ///
    /// Must be called with the slot map locked so the task cannot settle
    /// before the pending placeholder is in place.
    fn spawn_fetch<Fut>(
        &self,
        key: V::Key,
        previous: Option<EntityHandle<V>>,
        future: Fut,
    ) -> SharedFetch<V>
    where
        Fut: Future<Output = std::result::Result<V, ResolveError>> + Send + 'static,
    {
        let task_slots = Arc::clone(&self.slots);
        let task_key = key.clone();
        let task_previous = previous.clone();

        let task = tokio::spawn(async move {
            let outcome = future
                .await
                .map(|value| replace_or_create(task_previous.clone(), value));
            settle(&task_slots, &task_key, task_previous, outcome.as_ref().ok());
            outcome
        });

        let slots = Arc::clone(&self.slots);
        async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    // Panicked before settling
                    tracing::error!(
                        kind = V::KIND,
                        key = %key,
                        error = %join_error,
                        "Fetch task aborted"
                    );
                    let mut guard = lock_slots(&slots);
                    if matches!(guard.get(&key), Some(Slot::Pending(_))) {
                        match previous {
                            Some(stale) => {
                                guard.insert(key.clone(), Slot::Ready(stale));
                            }
                            None => {
                                guard.remove(&key);
                            }
                        }
                    }
                    Err(ResolveError::Internal(format!(
                        "{} {} fetch task aborted: {}",
                        V::KIND,
                        key,
                        join_error
                    )))
                }
            }
        }
        .boxed()
        .shared()
    }
}
