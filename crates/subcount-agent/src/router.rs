//! Routes session events to batching and polling.

use subcount_eventsub::SessionEvent;
use subcount_runtime::{BatchingEngine, PollingFallback, PollingMode};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct EventRouter {
    batching: BatchingEngine,
    polling: PollingFallback,
}

impl EventRouter {
    pub fn new(batching: BatchingEngine, polling: PollingFallback) -> Self {
        Self { batching, polling }
    }

    pub fn handle(&self, event: SessionEvent) {
        match event {
            SessionEvent::Count { direction, amount } => self.batching.add(direction, amount),
            SessionEvent::SyncRequested { reason } => {
                let polling = self.polling.clone();
                drop(tokio::spawn(async move { polling.sync_now(&reason).await }));
            }
            SessionEvent::Activated { session_id } => {
                info!(%session_id, "event session active");
            }
            SessionEvent::SubscriptionsReady { confirmed } => {
                info!(subscriptions = confirmed.len(), "event subscriptions live, polling as backup");
                self.polling.set_mode(PollingMode::Backup);
            }
            SessionEvent::SubscriptionsUnavailable { reason } => {
                warn!(%reason, "event subscriptions unavailable, polling is primary");
                self.polling.set_mode(PollingMode::Primary);
            }
            SessionEvent::Fatal(reason) => {
                error!(%reason, "event session terminated, polling is primary");
                self.polling.set_mode(PollingMode::Primary);
            }
        }
    }

    /// Route until the session drops its sender or `cancel` fires.
    pub fn spawn(
        self,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Some(event) => self.handle(event),
                        None => break,
                    },
                    () = cancel.cancelled() => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use subcount_core::{
        BatchDirection, CountSource, CounterKind, CounterUpdate, Counters, EventKind,
        FatalReason, ReconcileError, UpdateOrigin,
    };
    use subcount_runtime::{BatchingConfig, CounterBoard, MemoryStore, PollingConfig, Scheduler};

    struct FixedSource(Mutex<Counters>);

    #[async_trait]
    impl CountSource for FixedSource {
        async fn fetch_total(&self, kind: CounterKind) -> Result<u64, ReconcileError> {
            Ok(self.0.lock().get(kind))
        }
    }

    struct Fixture {
        router: EventRouter,
        polling: PollingFallback,
        board: Arc<CounterBoard>,
        updates: mpsc::UnboundedReceiver<CounterUpdate>,
    }

    fn fixture(remote: Counters) -> Fixture {
        let board = Arc::new(CounterBoard::load(Arc::new(MemoryStore::default())));
        let scheduler = Scheduler::new();
        let (tx, updates) = mpsc::unbounded_channel();
        let batching = BatchingEngine::new(
            BatchingConfig::default(),
            board.clone(),
            scheduler.clone(),
            tx.clone(),
        );
        let polling = PollingFallback::new(
            PollingConfig::default(),
            Arc::new(FixedSource(Mutex::new(remote))),
            board.clone(),
            scheduler,
            tx,
        );
        Fixture {
            router: EventRouter::new(batching, polling.clone()),
            polling,
            board,
            updates,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn counts_are_batched() {
        let mut f = fixture(Counters::default());
        f.router.handle(SessionEvent::Count {
            direction: BatchDirection::FollowAdd,
            amount: 1,
        });
        f.router.handle(SessionEvent::Count {
            direction: BatchDirection::FollowAdd,
            amount: 2,
        });

        let update = f.updates.recv().await.unwrap();
        assert_eq!(update.origin, UpdateOrigin::Batch);
        assert_eq!(update.delta, 3);
        assert_eq!(f.board.get(CounterKind::Follow), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn sync_request_reconciles() {
        let mut f = fixture(Counters { follows: 120, subs: 0 });
        f.router.handle(SessionEvent::SyncRequested {
            reason: "parse error".into(),
        });

        let update = f.updates.recv().await.unwrap();
        assert_eq!(update.origin, UpdateOrigin::Reconcile);
        assert_eq!(update.count, 120);
        assert_eq!(f.board.get(CounterKind::Follow), 120);
    }

    #[tokio::test(start_paused = true)]
    async fn subscription_state_drives_polling_mode() {
        let f = fixture(Counters::default());
        f.router.handle(SessionEvent::SubscriptionsReady {
            confirmed: BTreeSet::from([EventKind::Follow]),
        });
        assert_eq!(f.polling.mode(), PollingMode::Backup);

        f.router.handle(SessionEvent::SubscriptionsUnavailable {
            reason: "bootstrap failed".into(),
        });
        assert_eq!(f.polling.mode(), PollingMode::Primary);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_makes_polling_primary() {
        let f = fixture(Counters::default());
        f.polling.set_mode(PollingMode::Backup);
        f.router
            .handle(SessionEvent::Fatal(FatalReason::AuthorizationRevoked));
        assert_eq!(f.polling.mode(), PollingMode::Primary);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_router_stops_when_sender_drops() {
        let f = fixture(Counters::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = f.router.spawn(rx, CancellationToken::new());
        tx.send(SessionEvent::Count {
            direction: BatchDirection::SubAdd,
            amount: 5,
        })
        .unwrap();
        drop(tx);
        handle.await.unwrap();

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(f.board.get(CounterKind::Sub), 5);
    }
}
