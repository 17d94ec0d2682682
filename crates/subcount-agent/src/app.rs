//! The application context: every component built once and wired together.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use subcount_core::{AuthProvider, GoalTable, GoalView};
use subcount_eventsub::{
    HelixClient, SessionContext, SessionHandle, SessionMachine, SubscriptionManager,
    TungsteniteConnector,
};
use subcount_runtime::{
    BatchingEngine, CounterBoard, JsonFileStore, PollingFallback, PollingMode, Scheduler,
};
use subcount_server::{BroadcastGate, DisplayServer, ShutdownCoordinator, UpdatePublisher};
use subcount_settings::SubcountSettings;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config;
use crate::router::EventRouter;

/// Start-up choices that do not live in the settings file.
#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    /// Skip the event socket and poll only.
    pub poll_only: bool,
}

pub struct App {
    board: Arc<CounterBoard>,
    batching: BatchingEngine,
    polling: PollingFallback,
    scheduler: Scheduler,
    session: Option<SessionHandle>,
    shutdown: ShutdownCoordinator,
    tasks: Vec<JoinHandle<()>>,
}

impl App {
    /// Build every component and start the background tasks.
    ///
    /// Returns the bound display listener address alongside the app.
    pub async fn start(
        settings: &SubcountSettings,
        auth: Arc<dyn AuthProvider>,
        options: &RunOptions,
    ) -> Result<(Self, std::net::SocketAddr)> {
        let shutdown = ShutdownCoordinator::new();
        let scheduler = Scheduler::new();
        let store = Arc::new(JsonFileStore::new(subcount_settings::state_file_path(settings)));
        let board = Arc::new(CounterBoard::load(store));
        let goals: Arc<dyn GoalView> = Arc::new(GoalTable::new());
        let gate = Arc::new(BroadcastGate::new());
        let mut tasks = Vec::new();

        let (update_tx, update_rx) = mpsc::unbounded_channel();
        tasks.push(
            UpdatePublisher::new(gate.clone(), goals.clone()).spawn(update_rx, shutdown.token()),
        );

        let batching = BatchingEngine::new(
            config::batching_config(settings),
            board.clone(),
            scheduler.clone(),
            update_tx.clone(),
        );
        let helix = Arc::new(
            HelixClient::new(
                settings.helix.base_url.clone(),
                Duration::from_millis(settings.helix.request_timeout_ms),
                auth.clone(),
            )
            .context("Failed to build provider API client")?,
        );
        let polling = PollingFallback::new(
            config::polling_config(settings),
            helix.clone(),
            board.clone(),
            scheduler.clone(),
            update_tx,
        );

        let server = DisplayServer::new(
            config::display_config(settings),
            gate,
            board.clone(),
            goals,
            shutdown.token(),
        );
        let listener: TcpListener = server.bind().await.context("Failed to bind display server")?;
        let addr = listener
            .local_addr()
            .context("Failed to read display server address")?;
        tasks.push(tokio::spawn(async move {
            if let Err(e) = server.serve(listener).await {
                error!(error = %e, "display server stopped with an error");
            }
        }));

        let session = if options.poll_only {
            info!("event socket disabled, polling is primary");
            polling.set_mode(PollingMode::Primary);
            None
        } else {
            polling.set_mode(PollingMode::Backup);
            let (event_tx, event_rx) = mpsc::unbounded_channel();
            let (_, mode_rx) = watch::channel(settings.counters.sub_count_mode);
            let ctx = SessionContext {
                connector: Arc::new(TungsteniteConnector::new(Duration::from_millis(
                    settings.eventsub.connect_timeout_ms,
                ))),
                bootstrap: Arc::new(SubscriptionManager::new(helix)),
                auth,
                scheduler: scheduler.clone(),
                mode: mode_rx,
                events: event_tx,
            };
            let (handle, join) = SessionMachine::spawn(config::session_config(settings), ctx);
            tasks.push(join);
            tasks.push(
                EventRouter::new(batching.clone(), polling.clone())
                    .spawn(event_rx, shutdown.token()),
            );
            let _ = handle.connect();
            Some(handle)
        };

        Ok((
            Self {
                board,
                batching,
                polling,
                scheduler,
                session,
                shutdown,
                tasks,
            },
            addr,
        ))
    }

    /// Stop the session, flush pending batches, and wait for every task.
    pub async fn stop(self, timeout: Option<Duration>) {
        if let Some(session) = &self.session {
            let _ = session.shutdown();
        }
        self.batching.drain();
        self.polling.set_mode(PollingMode::Stopped);
        self.scheduler.cancel_all();

        let counters = self.board.snapshot();
        info!(follows = counters.follows, subs = counters.subs, "final counters");
        self.shutdown.graceful_shutdown(self.tasks, timeout).await;
    }
}
