//! Periodic full-count reconciliation.
//!
//! Each tick fetches the authoritative total for one counter and, when it
//! differs from the board, overwrites the local value in one step and emits
//! a reconcile update. Fetch failures keep the local value; the next tick
//! retries.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use subcount_core::{CountSource, CounterKind, CounterUpdate, ReconcileError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::board::CounterBoard;
use crate::scheduler::Scheduler;

const INITIAL_TIMER: &str = "poll:initial";

/// Whether polling runs and what role it plays.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollingMode {
    /// No timers armed.
    #[default]
    Stopped,
    /// Drift correction next to a live event session.
    Backup,
    /// Only source of truth; event subscriptions are unavailable.
    Primary,
}

/// Polling intervals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollingConfig {
    /// Follower total interval.
    pub follows_interval: Duration,
    /// Subscriber total interval.
    pub subs_interval: Duration,
    /// Delay before the first reconciliation of both counters.
    pub initial_delay: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            follows_interval: Duration::from_secs(10),
            subs_interval: Duration::from_secs(60),
            initial_delay: Duration::from_secs(5),
        }
    }
}

impl PollingConfig {
    fn interval(&self, kind: CounterKind) -> Duration {
        match kind {
            CounterKind::Follow => self.follows_interval,
            CounterKind::Sub => self.subs_interval,
        }
    }
}

struct Inner {
    config: PollingConfig,
    source: Arc<dyn CountSource>,
    board: Arc<CounterBoard>,
    scheduler: Scheduler,
    updates: mpsc::UnboundedSender<CounterUpdate>,
    mode: Mutex<PollingMode>,
}

/// Reconciliation loop over a [`CountSource`].
#[derive(Clone)]
pub struct PollingFallback {
    inner: Arc<Inner>,
}

impl PollingFallback {
    /// Stopped poller; call [`set_mode`](Self::set_mode) to start it.
    pub fn new(
        config: PollingConfig,
        source: Arc<dyn CountSource>,
        board: Arc<CounterBoard>,
        scheduler: Scheduler,
        updates: mpsc::UnboundedSender<CounterUpdate>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                source,
                board,
                scheduler,
                updates,
                mode: Mutex::new(PollingMode::Stopped),
            }),
        }
    }

    /// Current mode.
    pub fn mode(&self) -> PollingMode {
        *self.inner.mode.lock()
    }

    /// Switch mode, arming or cancelling timers as needed.
    ///
    /// Backup and Primary poll on the same intervals; switching between
    /// them only changes the reported role.
    pub fn set_mode(&self, mode: PollingMode) {
        let previous = std::mem::replace(&mut *self.inner.mode.lock(), mode);
        if previous == mode {
            return;
        }
        info!(?previous, ?mode, "polling mode changed");
        match (previous, mode) {
            (_, PollingMode::Stopped) => self.disarm(),
            (PollingMode::Stopped, _) => self.arm(),
            _ => {}
        }
    }

    /// Reconcile both counters now.
    pub async fn sync_now(&self, reason: &str) {
        debug!(reason, "immediate reconciliation requested");
        for kind in CounterKind::ALL {
            self.tick(kind).await;
        }
    }

    /// Fetch one total and apply it if it differs.
    ///
    /// Returns the emitted update, or `None` when the local value matched.
    pub async fn reconcile(&self, kind: CounterKind) -> Result<Option<CounterUpdate>, ReconcileError> {
        let remote = self.inner.source.fetch_total(kind).await?;
        let Some(old) = self.inner.board.replace(kind, remote) else {
            debug!(%kind, count = remote, "counter in sync");
            return Ok(None);
        };
        info!(%kind, old, new = remote, "counter reconciled");
        let update = CounterUpdate::reconcile(kind, old, remote);
        if self.inner.updates.send(update.clone()).is_err() {
            debug!(%kind, "update receiver dropped");
        }
        Ok(Some(update))
    }

    async fn tick(&self, kind: CounterKind) {
        if let Err(error) = self.reconcile(kind).await {
            warn!(%kind, %error, "reconciliation failed, keeping local value");
        }
    }

    fn arm(&self) {
        let this = self.clone();
        self.inner
            .scheduler
            .schedule(INITIAL_TIMER, self.inner.config.initial_delay, move || async move {
                this.sync_now("initial").await;
            });

        for kind in CounterKind::ALL {
            let this = self.clone();
            self.inner
                .scheduler
                .schedule_every(interval_timer(kind), self.inner.config.interval(kind), move || {
                    let this = this.clone();
                    async move { this.tick(kind).await }
                });
        }
    }

    fn disarm(&self) {
        let _ = self.inner.scheduler.cancel(INITIAL_TIMER);
        for kind in CounterKind::ALL {
            let _ = self.inner.scheduler.cancel(&interval_timer(kind));
        }
    }
}

fn interval_timer(kind: CounterKind) -> String {
    format!("poll:{kind}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use subcount_core::{Counters, UpdateOrigin};
    use tokio::time::sleep;

    #[derive(Default)]
    struct FakeSource {
        follows: Mutex<Option<u64>>,
        subs: Mutex<Option<u64>>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl CountSource for FakeSource {
        async fn fetch_total(&self, kind: CounterKind) -> Result<u64, ReconcileError> {
            let _ = self.calls.fetch_add(1, Ordering::SeqCst);
            let slot = match kind {
                CounterKind::Follow => &self.follows,
                CounterKind::Sub => &self.subs,
            };
            (*slot.lock()).ok_or_else(|| ReconcileError::Transport("offline".into()))
        }
    }

    fn poller(
        source: Arc<FakeSource>,
        counters: Counters,
    ) -> (PollingFallback, Arc<CounterBoard>, mpsc::UnboundedReceiver<CounterUpdate>, Scheduler) {
        let board = Arc::new(CounterBoard::load(Arc::new(MemoryStore::new(counters))));
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Scheduler::new();
        let polling = PollingFallback::new(
            PollingConfig::default(),
            source,
            Arc::clone(&board),
            scheduler.clone(),
            tx,
        );
        (polling, board, rx, scheduler)
    }

    #[tokio::test]
    async fn drift_is_replaced_directly() {
        let source = Arc::new(FakeSource::default());
        *source.follows.lock() = Some(120);
        let (polling, board, mut rx, _) = poller(source, Counters { follows: 115, subs: 0 });

        let update = polling.reconcile(CounterKind::Follow).await.unwrap().unwrap();
        assert_eq!(update.count, 120);
        assert_eq!(update.delta, 5);
        assert_eq!(update.origin, UpdateOrigin::Reconcile);
        assert_eq!(board.get(CounterKind::Follow), 120);
        assert_eq!(rx.try_recv().unwrap(), update);
    }

    #[tokio::test]
    async fn matching_count_emits_nothing() {
        let source = Arc::new(FakeSource::default());
        *source.subs.lock() = Some(4);
        let (polling, _board, mut rx, _) = poller(source, Counters { follows: 0, subs: 4 });

        assert_matches!(polling.reconcile(CounterKind::Sub).await, Ok(None));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn fetch_failure_keeps_local_value() {
        let (logs, _guard) = subcount_logging::capture_logs();
        let source = Arc::new(FakeSource::default());
        let (polling, board, mut rx, _) = poller(source, Counters { follows: 50, subs: 5 });

        polling.sync_now("test").await;
        assert_eq!(board.snapshot(), Counters { follows: 50, subs: 5 });
        assert!(rx.try_recv().is_err());
        assert!(logs.has_event(tracing::Level::WARN, "keeping local value"));
    }

    #[tokio::test(start_paused = true)]
    async fn intervals_follow_configuration() {
        let source = Arc::new(FakeSource::default());
        *source.follows.lock() = Some(1);
        *source.subs.lock() = Some(1);
        let (polling, _board, _rx, scheduler) = poller(Arc::clone(&source), Counters::default());

        polling.set_mode(PollingMode::Backup);
        assert_eq!(scheduler.names(), vec!["poll:follow", "poll:initial", "poll:sub"]);

        // initial sync at 5s (2 calls), follow ticks at 10s..60s (6), sub tick at 60s (1)
        sleep(Duration::from_millis(60_001)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_timers() {
        let source = Arc::new(FakeSource::default());
        let (polling, _board, _rx, scheduler) = poller(Arc::clone(&source), Counters::default());

        polling.set_mode(PollingMode::Primary);
        polling.set_mode(PollingMode::Backup);
        assert_eq!(polling.mode(), PollingMode::Backup);
        polling.set_mode(PollingMode::Stopped);
        assert!(scheduler.names().is_empty());

        sleep(Duration::from_secs(120)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }
}
