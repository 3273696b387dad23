//! In-flight registry and the `execute` entry point

use crate::types::CoalescerConfig;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::time::Instant;
use tracing::debug;

type SharedFetch<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

struct InFlightRequest<T, E> {
    id: u64,
    handle: SharedFetch<T, E>,
    callers_count: usize,
    started_at: Instant,
}

struct Registry<T, E> {
    entries: HashMap<String, InFlightRequest<T, E>>,
    next_id: u64,
}

/// Removes its registry slot when the fetch it rides in finishes or is dropped,
/// unless a newer slot has taken over the key.
struct SlotGuard<T, E> {
    registry: Weak<Mutex<Registry<T, E>>>,
    key: String,
    id: u64,
}

impl<T, E> Drop for SlotGuard<T, E> {
    fn drop(&mut self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let removed = {
            let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
            let is_current = registry
                .entries
                .get(&self.key)
                .is_some_and(|entry| entry.id == self.id);
            if is_current {
                registry.entries.remove(&self.key)
            } else {
                None
            }
        };
        // Dropped after unlocking: the removed handle may own the last reference
        // to a future whose own guard needs the lock.
        drop(removed);
    }
}

/// Outcome of the critical section in [`RequestCoalescer::execute`]
struct Claim<T, E> {
    handle: SharedFetch<T, E>,
    leader: bool,
    superseded: Option<InFlightRequest<T, E>>,
}

/// Ensures at most one fetch per key is in flight at a time
///
/// Every caller that arrives while a fetch for its key is running, and younger
/// than `max_wait_time`, awaits that fetch instead of starting its own. Fetches
/// run on detached tokio tasks, so a caller giving up does not cancel them.
pub struct RequestCoalescer<T, E> {
    registry: Arc<Mutex<Registry<T, E>>>,
    config: CoalescerConfig,
}

impl<T, E> RequestCoalescer<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new(config: CoalescerConfig) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                entries: HashMap::new(),
                next_id: 0,
            })),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry<T, E>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `fetcher` for `key`, or join the fetch already running for it
    ///
    /// The result, success or failure, is whatever the shared fetch produced.
    pub async fn execute<F, Fut>(&self, key: &str, fetcher: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let Claim {
            handle,
            leader,
            superseded,
        } = self.claim(key, fetcher);
        drop(superseded);

        if leader {
            tokio::spawn(handle.clone());
        }

        handle.await
    }

    /// Join a live slot or install a new one; never awaits while locked
    fn claim<F, Fut>(&self, key: &str, fetcher: F) -> Claim<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let mut registry = self.lock();

        if let Some(entry) = registry.entries.get_mut(key) {
            if entry.started_at.elapsed() < self.config.max_wait_time {
                entry.callers_count += 1;
                debug!(key, callers = entry.callers_count, "Joining in-flight request");
                return Claim {
                    handle: entry.handle.clone(),
                    leader: false,
                    superseded: None,
                };
            }
            debug!(key, "In-flight request exceeded max wait time, starting a new one");
        }

        let id = registry.next_id;
        registry.next_id += 1;

        let guard = SlotGuard {
            registry: Arc::downgrade(&self.registry),
            key: key.to_string(),
            id,
        };
        let handle = async move {
            let _guard = guard;
            fetcher().await
        }
        .boxed()
        .shared();

        let superseded = registry.entries.insert(
            key.to_string(),
            InFlightRequest {
                id,
                handle: handle.clone(),
                callers_count: 1,
                started_at: Instant::now(),
            },
        );
        debug!(key, id, "Starting coalesced request");

        Claim {
            handle,
            leader: true,
            superseded,
        }
    }

    /// Number of keys with a fetch in flight
    pub fn in_flight_count(&self) -> usize {
        self.lock().entries.len()
    }

    /// Callers across all in-flight fetches, including each fetch's starter
    pub fn total_callers_count(&self) -> usize {
        self.lock()
            .entries
            .values()
            .map(|entry| entry.callers_count)
            .sum()
    }

    /// Forget every in-flight fetch without cancelling any of them
    pub fn clear(&self) {
        let drained: Vec<_> = self.lock().entries.drain().collect();
        debug!(count = drained.len(), "Cleared in-flight requests");
    }
}

impl<T, E> Default for RequestCoalescer<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(CoalescerConfig::default())
    }
}
