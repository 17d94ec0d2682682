//! Named, cancellable delayed and periodic callbacks.
//!
//! Every timer in the engine goes through a [`Scheduler`] under a string
//! name. Scheduling under a name that is already taken cancels the previous
//! entry, so "re-arm" is just `schedule` again. Callbacks run on their own
//! tokio task; a callback never runs once its entry was cancelled or
//! replaced.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::trace;

struct Entry {
    id: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Inner {
    entries: Mutex<HashMap<String, Entry>>,
    next_id: AtomicU64,
}

/// Registry of named timers.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone, Default)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `callback` once after `delay`, replacing any entry named `name`.
    pub fn schedule<F, Fut>(&self, name: impl Into<String>, delay: Duration, callback: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let (id, cancel) = self.register(&name);
        let inner = Arc::clone(&self.inner);

        drop(tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
            {
                let mut entries = inner.entries.lock();
                match entries.get(&name) {
                    Some(entry) if entry.id == id && !entry.cancel.is_cancelled() => {
                        let _ = entries.remove(&name);
                    }
                    _ => return,
                }
            }
            trace!(timer = %name, "timer fired");
            callback().await;
        }));
    }

    /// Run `callback` every `period`, first after one full period, until the
    /// entry named `name` is cancelled or replaced.
    pub fn schedule_every<F, Fut>(&self, name: impl Into<String>, period: Duration, mut callback: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let (id, cancel) = self.register(&name);
        let inner = Arc::clone(&self.inner);

        drop(tokio::spawn(async move {
            let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => return,
                    _ = ticks.tick() => {}
                }
                let current = inner
                    .entries
                    .lock()
                    .get(&name)
                    .is_some_and(|entry| entry.id == id);
                if !current || cancel.is_cancelled() {
                    return;
                }
                trace!(timer = %name, "interval tick");
                callback().await;
            }
        }));
    }

    /// Cancel the entry named `name`. Returns whether one existed.
    pub fn cancel(&self, name: &str) -> bool {
        match self.inner.entries.lock().remove(name) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether an entry named `name` is pending.
    pub fn is_scheduled(&self, name: &str) -> bool {
        self.inner.entries.lock().contains_key(name)
    }

    /// Names of all pending entries, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.entries.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Cancel every entry.
    pub fn cancel_all(&self) {
        let drained: Vec<Entry> = self.inner.entries.lock().drain().map(|(_, e)| e).collect();
        for entry in drained {
            entry.cancel.cancel();
        }
    }

    fn register(&self, name: &str) -> (u64, CancellationToken) {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let previous = self.inner.entries.lock().insert(
            name.to_owned(),
            Entry {
                id,
                cancel: cancel.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }
        (id, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use tokio::time::sleep;

    fn counter() -> (Arc<AtomicU32>, impl Fn() -> u32) {
        let hits = Arc::new(AtomicU32::new(0));
        let read = {
            let hits = Arc::clone(&hits);
            move || hits.load(Ordering::SeqCst)
        };
        (hits, read)
    }

    fn bump(hits: &Arc<AtomicU32>) -> impl FnOnce() -> std::future::Ready<()> + Send + 'static {
        let hits = Arc::clone(hits);
        move || {
            let _ = hits.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay() {
        let scheduler = Scheduler::new();
        let (hits, read) = counter();
        scheduler.schedule("t", Duration::from_millis(300), bump(&hits));

        sleep(Duration::from_millis(299)).await;
        assert_eq!(read(), 0);
        assert!(scheduler.is_scheduled("t"));

        sleep(Duration::from_millis(2)).await;
        assert_eq!(read(), 1);
        assert!(!scheduler.is_scheduled("t"));
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_replaces_previous() {
        let scheduler = Scheduler::new();
        let (hits, read) = counter();
        scheduler.schedule("debounce", Duration::from_millis(300), bump(&hits));
        sleep(Duration::from_millis(200)).await;
        scheduler.schedule("debounce", Duration::from_millis(300), bump(&hits));

        sleep(Duration::from_millis(150)).await;
        assert_eq!(read(), 0, "first entry must not fire");

        sleep(Duration::from_millis(200)).await;
        assert_eq!(read(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_firing() {
        let scheduler = Scheduler::new();
        let (hits, read) = counter();
        scheduler.schedule("t", Duration::from_millis(100), bump(&hits));

        assert!(scheduler.cancel("t"));
        assert!(!scheduler.cancel("t"));

        sleep(Duration::from_millis(500)).await;
        assert_eq!(read(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_until_cancelled() {
        let scheduler = Scheduler::new();
        let hits = Arc::new(AtomicU32::new(0));
        let tick_hits = Arc::clone(&hits);
        scheduler.schedule_every("poll", Duration::from_secs(10), move || {
            let _ = tick_hits.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        });

        sleep(Duration::from_millis(9_999)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        sleep(Duration::from_millis(20_002)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert!(scheduler.is_scheduled("poll"));

        assert!(scheduler.cancel("poll"));
        sleep(Duration::from_secs(60)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn callback_can_reschedule_its_own_name() {
        let scheduler = Scheduler::new();
        let (hits, read) = counter();
        let again = scheduler.clone();
        let hits_inner = Arc::clone(&hits);
        scheduler.schedule("chain", Duration::from_millis(100), move || async move {
            let _ = hits_inner.fetch_add(1, Ordering::SeqCst);
            again.schedule("chain", Duration::from_millis(100), bump(&hits_inner));
        });

        sleep(Duration::from_millis(250)).await;
        assert_eq!(read(), 2);
        assert!(!scheduler.is_scheduled("chain"));
    }

    #[tokio::test(start_paused = true)]
    async fn names_and_cancel_all() {
        let scheduler = Scheduler::new();
        let (hits, read) = counter();
        scheduler.schedule("b", Duration::from_secs(1), bump(&hits));
        scheduler.schedule("a", Duration::from_secs(1), bump(&hits));
        scheduler.schedule_every("c", Duration::from_secs(1), || std::future::ready(()));
        assert_eq!(scheduler.names(), vec!["a", "b", "c"]);

        scheduler.cancel_all();
        assert!(scheduler.names().is_empty());
        sleep(Duration::from_secs(5)).await;
        assert_eq!(read(), 0);
    }
}
