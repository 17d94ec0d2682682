//! Turns counter updates into display payloads on the gate.

use std::sync::Arc;

use subcount_core::{CounterUpdate, GoalView};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::gate::BroadcastGate;
use crate::payload::DisplayPayload;

/// Forwards every [`CounterUpdate`] to the [`BroadcastGate`].
pub struct UpdatePublisher {
    gate: Arc<BroadcastGate>,
    goals: Arc<dyn GoalView>,
}

impl UpdatePublisher {
    /// Publisher over `gate`, annotating with `goals`.
    pub fn new(gate: Arc<BroadcastGate>, goals: Arc<dyn GoalView>) -> Self {
        Self { gate, goals }
    }

    /// Broadcast one update.
    pub async fn publish(&self, update: &CounterUpdate) {
        let payload = DisplayPayload::from_update(update, self.goals.as_ref());
        let report = self.gate.send(&payload).await;
        debug!(
            kind = %update.kind,
            count = update.count,
            delta = update.delta,
            recipients = report.recipients,
            dropped = report.dropped,
            "counter update broadcast"
        );
    }

    /// Consume `updates` until the channel closes or `cancel` fires.
    ///
    /// Updates already queued when `cancel` fires are still published.
    pub fn spawn(
        self,
        mut updates: mpsc::UnboundedReceiver<CounterUpdate>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    update = updates.recv() => match update {
                        Some(update) => self.publish(&update).await,
                        None => break,
                    },
                    () = cancel.cancelled() => {
                        while let Ok(update) = updates.try_recv() {
                            self.publish(&update).await;
                        }
                        break;
                    }
                }
            }
            info!("update publisher stopped");
        })
    }
}
