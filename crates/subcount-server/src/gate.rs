//! Fan-out of display payloads to connected clients.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::connection::ClientConnection;

/// Outcome of one [`BroadcastGate::send`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SendReport {
    /// Clients connected at send time.
    pub recipients: usize,
    /// Clients the message was queued for.
    pub delivered: usize,
    /// Clients skipped because of backpressure or a closed writer.
    pub dropped: usize,
}

/// Lifetime send counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GateStats {
    /// Per-client sends that were queued.
    pub sent: u64,
    /// Per-client sends that were dropped.
    pub dropped: u64,
}

/// Connected display clients and the per-client drop policy.
#[derive(Default)]
pub struct BroadcastGate {
    clients: RwLock<HashMap<String, Arc<ClientConnection>>>,
    sent: AtomicU64,
    dropped: AtomicU64,
}

impl BroadcastGate {
    /// Gate with no clients.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client.
    pub async fn add(&self, connection: Arc<ClientConnection>) {
        let mut clients = self.clients.write().await;
        let _ = clients.insert(connection.id.clone(), connection);
    }

    /// Unregister a client.
    pub async fn remove(&self, connection_id: &str) {
        let mut clients = self.clients.write().await;
        let _ = clients.remove(connection_id);
    }

    /// Number of registered clients.
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Lifetime counters.
    pub fn stats(&self) -> GateStats {
        GateStats {
            sent: self.sent.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    /// Serialize `payload` once and queue it for every client. Never fails;
    /// per-client refusals are logged and counted.
    pub async fn send<T: Serialize>(&self, payload: &T) -> SendReport {
        let json = match serde_json::to_string(payload) {
            Ok(json) => Arc::new(json),
            Err(e) => {
                warn!(error = %e, "failed to serialize display payload");
                return SendReport::default();
            }
        };

        let clients = self.clients.read().await;
        let mut report = SendReport {
            recipients: clients.len(),
            ..SendReport::default()
        };
        for conn in clients.values() {
            match conn.send(Arc::clone(&json)) {
                Ok(()) => report.delivered += 1,
                Err(reason) => {
                    report.dropped += 1;
                    warn!(
                        conn_id = %conn.id,
                        ?reason,
                        buffered = conn.buffered_bytes(),
                        "display client saturated, skipping send"
                    );
                }
            }
        }
        drop(clients);

        let _ = self.sent.fetch_add(report.delivered as u64, Ordering::Relaxed);
        let _ = self.dropped.fetch_add(report.dropped as u64, Ordering::Relaxed);
        debug!(
            delivered = report.delivered,
            recipients = report.recipients,
            "display update broadcast"
        );
        report
    }
}
