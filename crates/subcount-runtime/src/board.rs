//! The single owner of the live [`Counters`].
//!
//! Only the batching engine and polling reconciliation mutate the board;
//! everyone else reads snapshots. Each mutation is persisted through the
//! [`CounterStore`] before the lock is released, so saves land in mutation
//! order. Persistence failures are logged and never propagated.

use std::sync::Arc;

use parking_lot::Mutex;
use subcount_core::{BatchDirection, CounterKind, CounterStore, Counters};
use tracing::{info, warn};

/// Live counters plus their persistence.
pub struct CounterBoard {
    counters: Mutex<Counters>,
    store: Arc<dyn CounterStore>,
}

impl CounterBoard {
    /// Board seeded from `store`. A load failure starts from zero.
    pub fn load(store: Arc<dyn CounterStore>) -> Self {
        let counters = match store.load() {
            Ok(counters) => {
                info!(follows = counters.follows, subs = counters.subs, "counters loaded");
                counters
            }
            Err(error) => {
                warn!(%error, "failed to load counters, starting from zero");
                Counters::default()
            }
        };
        Self {
            counters: Mutex::new(counters),
            store,
        }
    }

    /// Copy of both counters.
    pub fn snapshot(&self) -> Counters {
        *self.counters.lock()
    }

    /// Current value of one counter.
    pub fn get(&self, kind: CounterKind) -> u64 {
        self.counters.lock().get(kind)
    }

    /// Apply a flushed batch. Returns the new value.
    pub(crate) fn apply(&self, direction: BatchDirection, amount: u64) -> u64 {
        let mut counters = self.counters.lock();
        let value = counters.apply(direction, amount);
        self.persist(&counters);
        value
    }

    /// Overwrite one counter. Returns the previous value when it changed.
    pub(crate) fn replace(&self, kind: CounterKind, value: u64) -> Option<u64> {
        let mut counters = self.counters.lock();
        let old = counters.get(kind);
        if old == value {
            return None;
        }
        counters.set(kind, value);
        self.persist(&counters);
        Some(old)
    }

    fn persist(&self, counters: &Counters) {
        if let Err(error) = self.store.save(counters) {
            warn!(%error, "failed to persist counters");
        }
    }
}
