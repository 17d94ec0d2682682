//! A single display client, from upgrade through disconnect.
//!
//! The client is registered with the gate before its snapshot is queued, so
//! any update racing the snapshot is delivered too; the client may see the
//! same total twice but never misses one.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures::{SinkExt, StreamExt};
use subcount_core::CounterKind;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::connection::ClientConnection;
use crate::payload::DisplayPayload;
use crate::server::AppState;

/// Interval between server-initiated Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long without a Pong before the client is dropped.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

/// Run a display session until the client leaves or the server shuts down.
#[instrument(skip_all, fields(client_id = %client_id))]
pub async fn run_display_session(ws: WebSocket, client_id: String, state: AppState) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(state.config.channel_capacity);
    let connection = Arc::new(ClientConnection::new(
        client_id.clone(),
        send_tx,
        state.config.buffer_limit_bytes,
    ));

    state.gate.add(connection.clone()).await;
    let clients = state.gate.client_count().await;
    info!(clients, "display client connected");
    queue_snapshot(&connection, &state);

    let writer_conn = connection.clone();
    let shutdown = state.shutdown.clone();
    let mut writer = tokio::spawn(async move {
        let mut ping = tokio::time::interval(PING_INTERVAL);
        let _ = ping.tick().await;

        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    let Some(text) = msg else { break };
                    let len = text.len();
                    let result = ws_tx.send(Message::Text(text.as_str().into())).await;
                    writer_conn.mark_written(len);
                    if result.is_err() {
                        break;
                    }
                }
                _ = ping.tick() => {
                    if !writer_conn.check_alive() && writer_conn.last_pong_elapsed() > PONG_TIMEOUT {
                        warn!("client unresponsive for {:?}, disconnecting", PONG_TIMEOUT);
                        break;
                    }
                    if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
                () = shutdown.cancelled() => {
                    let frame = CloseFrame {
                        code: close_code::AWAY,
                        reason: "server shutting down".into(),
                    };
                    let _ = ws_tx.send(Message::Close(Some(frame))).await;
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => connection.mark_alive(),
                Some(Ok(Message::Text(_) | Message::Binary(_))) => {
                    connection.mark_alive();
                    debug!("ignoring inbound display client message");
                }
                Some(Ok(Message::Close(_))) => {
                    info!("client sent close frame");
                    break;
                }
                Some(Err(e)) => {
                    debug!(error = %e, "display socket error");
                    break;
                }
                None => break,
            },
            _ = &mut writer => break,
        }
    }

    writer.abort();
    state.gate.remove(&client_id).await;
    info!(
        dropped = connection.drop_count(),
        "display client disconnected"
    );
}

fn queue_snapshot(connection: &ClientConnection, state: &AppState) {
    let counters = state.board.snapshot();
    for kind in CounterKind::ALL {
        let payload = DisplayPayload::snapshot(kind, counters.get(kind), state.goals.as_ref());
        match serde_json::to_string(&payload) {
            Ok(json) => {
                if let Err(reason) = connection.send(Arc::new(json)) {
                    warn!(?reason, %kind, "failed to queue snapshot");
                }
            }
            Err(e) => warn!(error = %e, %kind, "failed to serialize snapshot"),
        }
    }
}
