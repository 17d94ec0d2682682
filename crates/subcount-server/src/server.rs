//! `DisplayServer`: axum router with the display `/ws` endpoint and `/health`.

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::{Json, Response};
use axum::routing::get;
use subcount_core::GoalView;
use subcount_runtime::CounterBoard;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::errors::ServerError;
use crate::gate::BroadcastGate;
use crate::health::{self, HealthResponse};
use crate::ws::run_display_session;

/// Listen address and per-client limits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayConfig {
    /// Bind host.
    pub host: String,
    /// Bind port; 0 picks a free one.
    pub port: u16,
    /// Per-client outbound queue length.
    pub channel_capacity: usize,
    /// Per-client queued bytes above which sends are dropped.
    pub buffer_limit_bytes: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            channel_capacity: 64,
            buffer_limit_bytes: 1024 * 1024,
        }
    }
}

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Connected display clients.
    pub gate: Arc<BroadcastGate>,
    /// Source of snapshots.
    pub board: Arc<CounterBoard>,
    /// Goal annotation.
    pub goals: Arc<dyn GoalView>,
    /// Per-client limits.
    pub config: Arc<DisplayConfig>,
    /// Cancelled when the process shuts down.
    pub shutdown: CancellationToken,
    /// When the server started.
    pub start_time: Instant,
}

/// The display endpoint.
pub struct DisplayServer {
    state: AppState,
}

impl DisplayServer {
    /// Server over `gate`, taking snapshots from `board`.
    pub fn new(
        config: DisplayConfig,
        gate: Arc<BroadcastGate>,
        board: Arc<CounterBoard>,
        goals: Arc<dyn GoalView>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            state: AppState {
                gate,
                board,
                goals,
                config: Arc::new(config),
                shutdown,
                start_time: Instant::now(),
            },
        }
    }

    /// Build the axum router.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/ws", get(ws_handler))
            .with_state(self.state.clone())
    }

    /// The broadcast gate.
    pub fn gate(&self) -> &Arc<BroadcastGate> {
        &self.state.gate
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let addr = format!("{}:{}", self.state.config.host, self.state.config.port);
        TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })
    }

    /// Serve on `listener` until the shutdown token fires and every display
    /// session has closed.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "display server listening");
        }
        let shutdown = self.state.shutdown.clone();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .map_err(ServerError::Serve)?;
        info!("display server stopped");
        Ok(())
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let clients = state.gate.client_count().await;
    Json(health::health_check(
        state.start_time,
        clients,
        state.board.snapshot(),
        state.gate.stats(),
    ))
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let client_id = Uuid::now_v7().to_string();
    ws.on_upgrade(move |socket| run_display_session(socket, client_id, state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use subcount_core::{Counters, GoalTable};
    use subcount_runtime::MemoryStore;
    use tower::ServiceExt;

    fn make_server() -> DisplayServer {
        let store = Arc::new(MemoryStore::new(Counters { follows: 42, subs: 3 }));
        DisplayServer::new(
            DisplayConfig::default(),
            Arc::new(BroadcastGate::new()),
            Arc::new(CounterBoard::load(store)),
            Arc::new(GoalTable::new()),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn health_endpoint_reports_counters() {
        let app = make_server().router();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["clients"], 0);
        assert_eq!(parsed["counters"]["follows"], 42);
    }

    #[tokio::test]
    async fn ws_requires_upgrade() {
        let app = make_server().router();
        let req = Request::builder().uri("/ws").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = make_server().router();
        let req = Request::builder().uri("/nonexistent").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let server = DisplayServer::new(
            DisplayConfig {
                host: "not a host".into(),
                ..DisplayConfig::default()
            },
            Arc::new(BroadcastGate::new()),
            Arc::new(CounterBoard::load(Arc::new(MemoryStore::default()))),
            Arc::new(GoalTable::new()),
            CancellationToken::new(),
        );
        assert_matches!(server.bind().await, Err(ServerError::Bind { .. }));
    }
}
