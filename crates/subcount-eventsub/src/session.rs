//! Event socket session state machine.
//!
//! A single actor task owns the connection lifecycle: connect, welcome,
//! keepalive supervision, subscription bootstrap, reconnect handoff,
//! revocation and backoff. Everything that can interleave with it (socket
//! frames, connect completions, timers, bootstrap results, commands) is
//! delivered as an [`Input`] on one channel and handled strictly in order.
//!
//! Every socket is tagged with a connection id. Inputs tagged with an id
//! that is neither the current nor the pending (handoff) connection are
//! discarded, so a superseded session never reaches the counters.
//!
//! ```text
//! Idle ─connect─▶ Connecting ─socket open─▶ AwaitingWelcome ─welcome─▶ Active
//!                     ▲                                                  │
//!                     └──── Reconnecting ◀── close / watchdog / reconnect┘
//!                                 │
//!                 fatal close, revoked, retries exhausted ─▶ Terminated
//! ```

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use subcount_core::{
    AuthProvider, BatchDirection, ConnectError, EventKind, FatalReason, ReconnectPolicy,
    ReconnectState, SubCountMode, is_protocol_fatal,
};
use subcount_runtime::Scheduler;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::classify::{Classification, classify};
use crate::connector::{Connector, SocketEvent, SocketLink};
use crate::frames::{InboundMessage, RevocationReason, parse_frame};
use crate::subscriptions::{BootstrapReport, SubscriptionBootstrap};

const KEEPALIVE_TIMER: &str = "eventsub:keepalive";
const BOOTSTRAP_TIMER: &str = "eventsub:bootstrap";
const HANDOFF_TIMER: &str = "eventsub:handoff";
const RECONNECT_TIMER: &str = "eventsub:reconnect";

// ─────────────────────────────────────────────────────────────────────────────
// Public surface
// ─────────────────────────────────────────────────────────────────────────────

/// Session timing and retry settings.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Default event socket URL.
    pub endpoint: String,
    /// Added to the provider keepalive to form the watchdog timeout.
    pub keepalive_grace: Duration,
    /// Keepalive assumed before a welcome announces one.
    pub default_keepalive: Duration,
    /// Delay between welcome and subscription bootstrap.
    pub bootstrap_delay: Duration,
    /// Delay before reconnecting when a reconnect request carries no URL.
    pub handoff_fallback_delay: Duration,
    /// Backoff policy.
    pub reconnect: ReconnectPolicy,
    /// Number of recent notification ids remembered for deduplication.
    pub dedup_window: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: "wss://eventsub.wss.twitch.tv/ws".to_owned(),
            keepalive_grace: Duration::from_millis(5000),
            default_keepalive: Duration::from_secs(10),
            bootstrap_delay: Duration::from_millis(1000),
            handoff_fallback_delay: Duration::from_millis(1000),
            reconnect: ReconnectPolicy::default(),
            dedup_window: 256,
        }
    }
}

/// Lifecycle phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Not connected and not trying to.
    #[default]
    Idle,
    /// Opening a socket.
    Connecting,
    /// Socket open, waiting for the welcome.
    AwaitingWelcome,
    /// Welcomed and receiving events.
    Active,
    /// Shutting a socket down.
    Closing,
    /// Waiting on a backoff timer or a handoff socket.
    Reconnecting,
    /// Stopped; only a manual reconnect restarts it.
    Terminated,
}

/// Observable session state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    /// Current phase.
    pub phase: SessionPhase,
    /// Provider session id of the current connection, once welcomed.
    pub session_id: Option<String>,
    /// Failed attempts since the last welcome.
    pub attempt: u32,
    /// When a session was last welcomed.
    pub last_success_at: Option<DateTime<Utc>>,
    /// Subscription types confirmed on the current session.
    pub subscriptions: BTreeSet<EventKind>,
    /// Why the session terminated, if it did.
    pub fatal: Option<FatalReason>,
}

/// What the session machine reports to the rest of the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// A classified notification.
    Count {
        /// Accumulator to feed.
        direction: BatchDirection,
        /// Amount to add.
        amount: u64,
    },
    /// A frame was lost; reconcile counters as a precaution.
    SyncRequested {
        /// Short cause, for logs.
        reason: String,
    },
    /// A session was welcomed.
    Activated {
        /// Provider session id.
        session_id: String,
    },
    /// Bootstrap confirmed at least one subscription.
    SubscriptionsReady {
        /// Confirmed kinds.
        confirmed: BTreeSet<EventKind>,
    },
    /// No subscription is live: bootstrap failed, or every subscription was
    /// revoked.
    SubscriptionsUnavailable {
        /// Short cause, for logs.
        reason: String,
    },
    /// The session stopped and will not retry on its own.
    Fatal(FatalReason),
}

/// Manual control of the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionCommand {
    /// Connect if idle or terminated.
    Connect,
    /// Drop any connection, reset backoff and connect immediately.
    Reconnect,
    /// Close every socket and go idle.
    Disconnect,
    /// Close every socket and stop the actor.
    Shutdown,
}

/// Collaborators the machine needs.
pub struct SessionContext {
    /// Socket factory.
    pub connector: Arc<dyn Connector>,
    /// Subscription creation.
    pub bootstrap: Arc<dyn SubscriptionBootstrap>,
    /// Receives fatal notices.
    pub auth: Arc<dyn AuthProvider>,
    /// Timer registry.
    pub scheduler: Scheduler,
    /// Sub counting mode, read at classification time.
    pub mode: watch::Receiver<SubCountMode>,
    /// Outgoing events.
    pub events: mpsc::UnboundedSender<SessionEvent>,
}

/// Cheap handle for commanding and observing a running machine.
#[derive(Clone)]
pub struct SessionHandle {
    input: mpsc::UnboundedSender<Input>,
    status: watch::Receiver<SessionStatus>,
}

impl SessionHandle {
    /// Send a command. Returns `false` once the machine has stopped.
    pub fn send(&self, command: SessionCommand) -> bool {
        self.input.send(Input::Command(command)).is_ok()
    }

    /// Connect if idle or terminated.
    pub fn connect(&self) -> bool {
        self.send(SessionCommand::Connect)
    }

    /// Manual reconnect, bypassing backoff and the attempt ceiling.
    pub fn reconnect(&self) -> bool {
        self.send(SessionCommand::Reconnect)
    }

    /// Close every socket and go idle.
    pub fn disconnect(&self) -> bool {
        self.send(SessionCommand::Disconnect)
    }

    /// Stop the machine.
    pub fn shutdown(&self) -> bool {
        self.send(SessionCommand::Shutdown)
    }

    /// Latest status.
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Status updates.
    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Actor
// ─────────────────────────────────────────────────────────────────────────────

enum Input {
    Command(SessionCommand),
    Connected {
        conn: u64,
        result: Result<CancellationToken, ConnectError>,
    },
    Socket {
        conn: u64,
        event: SocketEvent,
    },
    WatchdogExpired {
        conn: u64,
    },
    HandoffExpired {
        conn: u64,
    },
    BootstrapDue {
        epoch: u64,
    },
    BootstrapDone {
        epoch: u64,
        report: BootstrapReport,
    },
    ReconnectDue,
}

struct Connection {
    id: u64,
    close: Option<CancellationToken>,
    session_id: Option<String>,
    keepalive: Option<Duration>,
}

impl Connection {
    fn new(id: u64) -> Self {
        Self {
            id,
            close: None,
            session_id: None,
            keepalive: None,
        }
    }

    fn shut(&self) {
        if let Some(close) = &self.close {
            close.cancel();
        }
    }
}

/// Bounded set of recently seen notification ids.
struct RecentIds {
    order: VecDeque<String>,
    seen: HashSet<String>,
    capacity: usize,
}

impl RecentIds {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Record `id`. Returns `false` when it was already present.
    fn insert(&mut self, id: &str) -> bool {
        if self.capacity == 0 {
            return true;
        }
        if self.seen.contains(id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                let _ = self.seen.remove(&oldest);
            }
        }
        self.order.push_back(id.to_owned());
        let _ = self.seen.insert(id.to_owned());
        true
    }
}

/// The session actor. Create with [`SessionMachine::spawn`].
pub struct SessionMachine {
    config: SessionConfig,
    ctx: SessionContext,
    input: mpsc::UnboundedSender<Input>,
    status: watch::Sender<SessionStatus>,
    phase: SessionPhase,
    current: Option<Connection>,
    pending: Option<Connection>,
    next_conn: u64,
    epoch: u64,
    bootstrapped: bool,
    reconnect: ReconnectState,
    subscriptions: BTreeSet<EventKind>,
    recent: RecentIds,
    fatal: Option<FatalReason>,
}

impl SessionMachine {
    /// Start the actor. It stays idle until [`SessionHandle::connect`].
    pub fn spawn(config: SessionConfig, ctx: SessionContext) -> (SessionHandle, JoinHandle<()>) {
        let (input, rx) = mpsc::unbounded_channel();
        let (status, status_rx) = watch::channel(SessionStatus::default());
        let machine = Self {
            recent: RecentIds::new(config.dedup_window),
            config,
            ctx,
            input: input.clone(),
            status,
            phase: SessionPhase::Idle,
            current: None,
            pending: None,
            next_conn: 0,
            epoch: 0,
            bootstrapped: false,
            reconnect: ReconnectState::default(),
            subscriptions: BTreeSet::new(),
            fatal: None,
        };
        let task = tokio::spawn(machine.run(rx));
        let handle = SessionHandle {
            input,
            status: status_rx,
        };
        (handle, task)
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Input>) {
        while let Some(input) = rx.recv().await {
            let keep_running = self.handle(input);
            self.publish();
            if !keep_running {
                break;
            }
        }
        debug!("event session stopped");
    }

    fn handle(&mut self, input: Input) -> bool {
        match input {
            Input::Command(command) => return self.on_command(command),
            Input::Connected { conn, result } => self.on_connected(conn, result),
            Input::Socket { conn, event } => self.on_socket(conn, event),
            Input::WatchdogExpired { conn } => self.on_watchdog(conn),
            Input::HandoffExpired { conn } => self.on_handoff_expired(conn),
            Input::BootstrapDue { epoch } => self.on_bootstrap_due(epoch),
            Input::BootstrapDone { epoch, report } => self.on_bootstrap_done(epoch, &report),
            Input::ReconnectDue => self.on_reconnect_due(),
        }
        true
    }

    // ── commands ────────────────────────────────────────────────────────────

    fn on_command(&mut self, command: SessionCommand) -> bool {
        match command {
            SessionCommand::Connect => match self.phase {
                SessionPhase::Idle | SessionPhase::Terminated => {
                    self.fatal = None;
                    self.reconnect.reset();
                    self.start_connect(self.config.endpoint.clone());
                }
                phase => debug!(?phase, "connect ignored, session already running"),
            },
            SessionCommand::Reconnect => {
                info!("manual reconnect requested");
                let _ = self.ctx.scheduler.cancel(RECONNECT_TIMER);
                self.reconnect.reset();
                self.fatal = None;
                self.start_connect(self.config.endpoint.clone());
            }
            SessionCommand::Disconnect => {
                info!("disconnecting event session");
                self.stop_everything();
                self.phase = SessionPhase::Idle;
            }
            SessionCommand::Shutdown => {
                self.stop_everything();
                self.phase = SessionPhase::Idle;
                return false;
            }
        }
        true
    }

    // ── connections ─────────────────────────────────────────────────────────

    /// Open a fresh connection, dropping whatever was there.
    fn start_connect(&mut self, url: String) {
        self.close_all();
        self.epoch += 1;
        self.bootstrapped = false;
        self.subscriptions.clear();
        let id = self.open(url);
        self.current = Some(Connection::new(id));
        self.phase = SessionPhase::Connecting;
    }

    fn open(&mut self, url: String) -> u64 {
        let conn = self.next_conn;
        self.next_conn += 1;
        let connector = Arc::clone(&self.ctx.connector);
        let input = self.input.clone();
        debug!(conn, url = %url, "opening event socket");

        drop(tokio::spawn(async move {
            match connector.connect(&url).await {
                Ok(SocketLink { mut events, close }) => {
                    let result = Ok(close.clone());
                    if input.send(Input::Connected { conn, result }).is_err() {
                        close.cancel();
                        return;
                    }
                    while let Some(event) = events.recv().await {
                        if input.send(Input::Socket { conn, event }).is_err() {
                            close.cancel();
                            return;
                        }
                    }
                }
                Err(e) => {
                    let _ = input.send(Input::Connected { conn, result: Err(e) });
                }
            }
        }));
        conn
    }

    fn on_connected(&mut self, conn: u64, result: Result<CancellationToken, ConnectError>) {
        if self.is_current(conn) {
            match result {
                Ok(close) => {
                    if let Some(current) = self.current.as_mut() {
                        current.close = Some(close);
                    }
                    self.phase = SessionPhase::AwaitingWelcome;
                    self.arm_watchdog(conn, self.config.default_keepalive);
                }
                Err(e) => {
                    warn!(error = %e, attempt = self.reconnect.attempt, "event socket connect failed");
                    self.current = None;
                    self.schedule_retry();
                }
            }
        } else if self.is_pending(conn) {
            match result {
                Ok(close) => {
                    if let Some(pending) = self.pending.as_mut() {
                        pending.close = Some(close);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "handoff connect failed, keeping current session");
                    self.drop_pending();
                }
            }
        } else if let Ok(close) = result {
            debug!(conn, "closing socket for a superseded connect");
            close.cancel();
        }
    }

    fn on_socket(&mut self, conn: u64, event: SocketEvent) {
        if self.is_pending(conn) {
            self.on_pending_socket(event);
        } else if self.is_current(conn) {
            match event {
                SocketEvent::Text(text) => self.on_frame(conn, &text),
                SocketEvent::Closed { code, reason } => self.on_current_closed(code, reason),
            }
        } else {
            debug!(conn, "discarding input from superseded connection");
        }
    }

    fn on_pending_socket(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Text(text) => match parse_frame(&text) {
                Ok(InboundMessage::Welcome {
                    session_id,
                    keepalive_timeout_seconds,
                }) => self.promote_pending(session_id, keepalive_timeout_seconds),
                Ok(other) => debug!(?other, "discarding pre-welcome frame on handoff socket"),
                Err(e) => warn!(error = %e, "unparseable frame on handoff socket"),
            },
            SocketEvent::Closed { code, reason } => {
                warn!(code, reason = %reason, "handoff socket closed before welcome");
                self.drop_pending();
            }
        }
    }

    fn on_current_closed(&mut self, code: u16, reason: String) {
        let _ = self.ctx.scheduler.cancel(KEEPALIVE_TIMER);
        self.current = None;

        if self.pending.is_some() {
            info!(code, "old socket closed, waiting for handoff");
            self.phase = SessionPhase::Reconnecting;
            return;
        }
        if is_protocol_fatal(code) {
            self.fatal(FatalReason::ProtocolClose { code, reason });
            return;
        }
        warn!(code, reason = %reason, "event socket closed");
        self.schedule_retry();
    }

    fn on_watchdog(&mut self, conn: u64) {
        if !self.is_current(conn) {
            return;
        }
        if self.pending.is_some() {
            warn!(conn, "no frame within keepalive window, waiting for handoff");
            let _ = self.ctx.scheduler.cancel(KEEPALIVE_TIMER);
            if let Some(current) = self.current.take() {
                current.shut();
            }
            self.phase = SessionPhase::Reconnecting;
            return;
        }
        warn!(conn, "no frame within keepalive window, reconnecting");
        self.phase = SessionPhase::Closing;
        self.close_all();
        self.schedule_retry();
    }

    fn on_handoff_expired(&mut self, conn: u64) {
        if self.is_pending(conn) {
            warn!(conn, "handoff socket sent no welcome, abandoning it");
            self.drop_pending();
        }
    }

    fn on_reconnect_due(&mut self) {
        match self.phase {
            SessionPhase::Idle | SessionPhase::Terminated => {}
            _ => self.start_connect(self.config.endpoint.clone()),
        }
    }

    // ── frames ──────────────────────────────────────────────────────────────

    #[tracing::instrument(skip_all, fields(conn = conn))]
    fn on_frame(&mut self, conn: u64, text: &str) {
        let message = match parse_frame(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "dropping unparseable frame");
                self.emit(SessionEvent::SyncRequested {
                    reason: "unparseable frame".to_owned(),
                });
                return;
            }
        };
        let keepalive = self.keepalive_for(conn);
        self.arm_watchdog(conn, keepalive);

        let welcomed = self.current.as_ref().is_some_and(|c| c.session_id.is_some());
        if !welcomed
            && !matches!(
                message,
                InboundMessage::Welcome { .. } | InboundMessage::Keepalive
            )
        {
            debug!(?message, "discarding pre-welcome frame");
            return;
        }

        match message {
            InboundMessage::Welcome {
                session_id,
                keepalive_timeout_seconds,
            } => self.on_welcome(conn, session_id, keepalive_timeout_seconds),
            InboundMessage::Keepalive => {}
            InboundMessage::Notification {
                message_id,
                subscription_type,
                event,
            } => self.on_notification(message_id.as_deref(), &subscription_type, &event),
            InboundMessage::Reconnect { reconnect_url } => self.on_reconnect_request(reconnect_url),
            InboundMessage::Revocation {
                subscription_type,
                reason,
            } => self.on_revocation(subscription_type.as_deref(), reason),
            InboundMessage::Unknown(message_type) => {
                debug!(message_type = %message_type, "ignoring unknown message type");
            }
        }
    }

    fn on_welcome(&mut self, conn: u64, session_id: String, keepalive_secs: Option<u64>) {
        let Some(current) = self.current.as_mut() else {
            return;
        };
        if current.session_id.is_some() {
            warn!(session_id = %session_id, "duplicate welcome ignored");
            return;
        }
        let keepalive = keepalive_secs.map_or(self.config.default_keepalive, Duration::from_secs);
        current.session_id = Some(session_id.clone());
        current.keepalive = Some(keepalive);
        self.activate(conn, session_id, keepalive);
    }

    fn activate(&mut self, conn: u64, session_id: String, keepalive: Duration) {
        self.reconnect.record_success(Utc::now());
        self.phase = SessionPhase::Active;
        self.arm_watchdog(conn, keepalive);
        info!(session_id = %session_id, keepalive_secs = keepalive.as_secs(), "event session active");
        self.emit(SessionEvent::Activated { session_id });

        if !self.bootstrapped {
            self.bootstrapped = true;
            let epoch = self.epoch;
            let input = self.input.clone();
            self.ctx
                .scheduler
                .schedule(BOOTSTRAP_TIMER, self.config.bootstrap_delay, move || async move {
                    let _ = input.send(Input::BootstrapDue { epoch });
                });
        }
    }

    fn on_notification(
        &mut self,
        message_id: Option<&str>,
        subscription_type: &str,
        event: &serde_json::Value,
    ) {
        if let Some(id) = message_id {
            if !self.recent.insert(id) {
                debug!(message_id = id, "duplicate notification dropped");
                return;
            }
        }
        let mode = *self.ctx.mode.borrow();
        match classify(subscription_type, event, mode) {
            Classification::Count { direction, amount } => {
                debug!(subscription_type, %direction, amount, "notification counted");
                self.emit(SessionEvent::Count { direction, amount });
            }
            Classification::Ignored(reason) => {
                debug!(subscription_type, ?reason, "notification ignored");
            }
        }
    }

    fn on_reconnect_request(&mut self, reconnect_url: Option<String>) {
        match reconnect_url {
            Some(url) => {
                info!(url = %url, "provider requested reconnect, opening handoff socket");
                self.drop_pending();
                let id = self.open(url);
                self.pending = Some(Connection::new(id));
                self.phase = SessionPhase::Reconnecting;
                let input = self.input.clone();
                let window = self.config.default_keepalive + self.config.keepalive_grace;
                self.ctx.scheduler.schedule(HANDOFF_TIMER, window, move || async move {
                    let _ = input.send(Input::HandoffExpired { conn: id });
                });
            }
            None => {
                info!("provider requested reconnect without URL, reconnecting to default endpoint");
                self.close_all();
                self.phase = SessionPhase::Reconnecting;
                self.schedule_reconnect(self.config.handoff_fallback_delay);
            }
        }
    }

    fn promote_pending(&mut self, session_id: String, keepalive_secs: Option<u64>) {
        let Some(mut next) = self.pending.take() else {
            return;
        };
        let _ = self.ctx.scheduler.cancel(HANDOFF_TIMER);
        if let Some(old) = self.current.take() {
            old.shut();
        }
        let keepalive = keepalive_secs.map_or(self.config.default_keepalive, Duration::from_secs);
        next.session_id = Some(session_id.clone());
        next.keepalive = Some(keepalive);
        let conn = next.id;
        self.current = Some(next);
        info!(session_id = %session_id, "reconnect handoff complete");
        self.activate(conn, session_id, keepalive);
    }

    fn on_revocation(&mut self, subscription_type: Option<&str>, reason: RevocationReason) {
        if reason == RevocationReason::AuthorizationRevoked {
            self.fatal(FatalReason::AuthorizationRevoked);
            return;
        }
        error!(
            subscription_type = subscription_type.unwrap_or("unknown"),
            reason = ?reason,
            "subscription revoked"
        );
        let removed = subscription_type
            .and_then(EventKind::from_subscription_type)
            .is_some_and(|kind| self.subscriptions.remove(&kind));
        if removed && self.subscriptions.is_empty() {
            warn!("every subscription revoked, closing event session");
            self.stop_everything();
            self.phase = SessionPhase::Terminated;
            self.emit(SessionEvent::SubscriptionsUnavailable {
                reason: "all subscriptions revoked".to_owned(),
            });
        }
    }

    // ── bootstrap ───────────────────────────────────────────────────────────

    fn on_bootstrap_due(&mut self, epoch: u64) {
        if epoch != self.epoch {
            return;
        }
        let Some(session_id) = self.current.as_ref().and_then(|c| c.session_id.clone()) else {
            return;
        };
        let bootstrap = Arc::clone(&self.ctx.bootstrap);
        let input = self.input.clone();
        drop(tokio::spawn(async move {
            let report = bootstrap.bootstrap(&session_id).await;
            let _ = input.send(Input::BootstrapDone { epoch, report });
        }));
    }

    fn on_bootstrap_done(&mut self, epoch: u64, report: &BootstrapReport) {
        if epoch != self.epoch || self.current.is_none() {
            debug!("discarding bootstrap result for a superseded session");
            return;
        }
        self.subscriptions.clone_from(&report.confirmed);
        if report.is_failed() {
            let reason = report.failure_summary();
            warn!(reason = %reason, "no subscription could be created, polling becomes primary");
            self.emit(SessionEvent::SubscriptionsUnavailable { reason });
        } else {
            if !report.failures.is_empty() {
                warn!(failures = %report.failure_summary(), "some subscriptions could not be created");
            }
            self.emit(SessionEvent::SubscriptionsReady {
                confirmed: report.confirmed.clone(),
            });
        }
    }

    // ── retry and fatal ─────────────────────────────────────────────────────

    fn schedule_retry(&mut self) {
        let attempt = self.reconnect.attempt;
        if !self.config.reconnect.should_retry(attempt) {
            self.fatal(FatalReason::RetriesExhausted { attempts: attempt });
            return;
        }
        let delay = self.config.reconnect.delay(attempt);
        let _ = self.reconnect.record_failure();
        self.phase = SessionPhase::Reconnecting;
        info!(
            attempt = self.reconnect.attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "scheduling reconnect"
        );
        self.schedule_reconnect(delay);
    }

    fn schedule_reconnect(&self, delay: Duration) {
        let input = self.input.clone();
        self.ctx.scheduler.schedule(RECONNECT_TIMER, delay, move || async move {
            let _ = input.send(Input::ReconnectDue);
        });
    }

    fn fatal(&mut self, reason: FatalReason) {
        error!(%reason, "event session terminated");
        self.stop_everything();
        self.phase = SessionPhase::Terminated;
        if !matches!(reason, FatalReason::RetriesExhausted { .. }) {
            self.ctx.auth.on_revoked(&reason);
        }
        self.fatal = Some(reason.clone());
        self.emit(SessionEvent::Fatal(reason));
    }

    // ── helpers ─────────────────────────────────────────────────────────────

    fn is_current(&self, conn: u64) -> bool {
        self.current.as_ref().is_some_and(|c| c.id == conn)
    }

    fn is_pending(&self, conn: u64) -> bool {
        self.pending.as_ref().is_some_and(|c| c.id == conn)
    }

    fn keepalive_for(&self, conn: u64) -> Duration {
        self.current
            .as_ref()
            .filter(|c| c.id == conn)
            .and_then(|c| c.keepalive)
            .unwrap_or(self.config.default_keepalive)
    }

    fn arm_watchdog(&self, conn: u64, keepalive: Duration) {
        let input = self.input.clone();
        let timeout = keepalive + self.config.keepalive_grace;
        self.ctx.scheduler.schedule(KEEPALIVE_TIMER, timeout, move || async move {
            let _ = input.send(Input::WatchdogExpired { conn });
        });
    }

    fn drop_pending(&mut self) {
        let _ = self.ctx.scheduler.cancel(HANDOFF_TIMER);
        if let Some(pending) = self.pending.take() {
            pending.shut();
        }
        if self.phase != SessionPhase::Reconnecting {
            return;
        }
        match &self.current {
            Some(current) if current.session_id.is_some() => self.phase = SessionPhase::Active,
            Some(_) => {}
            None => self.schedule_retry(),
        }
    }

    fn close_all(&mut self) {
        for timer in [KEEPALIVE_TIMER, BOOTSTRAP_TIMER, HANDOFF_TIMER] {
            let _ = self.ctx.scheduler.cancel(timer);
        }
        if let Some(current) = self.current.take() {
            current.shut();
        }
        if let Some(pending) = self.pending.take() {
            pending.shut();
        }
    }

    fn stop_everything(&mut self) {
        let _ = self.ctx.scheduler.cancel(RECONNECT_TIMER);
        self.close_all();
        self.subscriptions.clear();
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.ctx.events.send(event);
    }

    fn publish(&self) {
        let next = SessionStatus {
            phase: self.phase,
            session_id: self.current.as_ref().and_then(|c| c.session_id.clone()),
            attempt: self.reconnect.attempt,
            last_success_at: self.reconnect.last_success_at,
            subscriptions: self.subscriptions.clone(),
            fatal: self.fatal.clone(),
        };
        let _ = self.status.send_if_modified(|status| {
            if *status == next {
                false
            } else {
                *status = next;
                true
            }
        });
    }
}
