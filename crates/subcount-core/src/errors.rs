//! Error taxonomy for the counter engine.
//!
//! Every failure is caught at the boundary of the async operation that
//! produced it and converted into one of the domain errors below:
//!
//! - [`ConnectError`]: socket could not be opened (retryable, backoff)
//! - [`FatalReason`]: protocol-fatal close code, authorization revoked, or
//!   the reconnect ceiling was reached (terminal, surfaced upward)
//! - [`ParseError`]: a single inbound frame could not be decoded
//! - [`SubscriptionError`]: one subscription-creation call failed
//! - [`ReconcileError`]: a full-count fetch failed
//! - [`AuthError`]: credentials unavailable from the auth collaborator
//! - [`StoreError`]: counter persistence failed
//!
//! [`CounterError`] gathers them for callers that only need the
//! retry/fatal classification.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Close codes the provider uses for errors that must not be retried.
pub const PROTOCOL_FATAL_CLOSE_CODES: RangeInclusive<u16> = 4000..=4007;

/// Whether a socket close code belongs to the protocol-fatal range.
pub fn is_protocol_fatal(code: u16) -> bool {
    PROTOCOL_FATAL_CLOSE_CODES.contains(&code)
}

// ─────────────────────────────────────────────────────────────────────────────
// Domain errors
// ─────────────────────────────────────────────────────────────────────────────

/// The event socket could not be opened.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The endpoint refused or failed the handshake.
    #[error("failed to connect to {url}: {message}")]
    Unreachable {
        /// Endpoint that was dialed.
        url: String,
        /// Transport error text.
        message: String,
    },
    /// The handshake did not complete in time.
    #[error("connect to {url} timed out after {timeout_ms}ms")]
    Timeout {
        /// Endpoint that was dialed.
        url: String,
        /// Timeout that elapsed.
        timeout_ms: u64,
    },
}

/// A single inbound frame could not be decoded.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The frame was not valid JSON or did not match the envelope shape.
    #[error("invalid frame JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A field required by the message type was absent.
    #[error("frame missing required field `{0}`")]
    MissingField(&'static str),
}

/// Credentials could not be obtained from the auth collaborator.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No access token is configured.
    #[error("no access token available")]
    MissingToken,
    /// No broadcaster id is configured.
    #[error("no broadcaster id configured")]
    MissingBroadcaster,
    /// The provider rejected the token.
    #[error("access token rejected by provider")]
    Unauthorized,
}

/// One subscription-creation call failed. Never fatal for the session.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// The provider answered with a non-2xx, non-409 status.
    #[error("subscription {subscription_type} rejected with status {status}: {body}")]
    Rejected {
        /// Provider subscription type, e.g. `channel.follow`.
        subscription_type: String,
        /// HTTP status code.
        status: u16,
        /// Response body, as returned.
        body: String,
    },
    /// The request never produced a response.
    #[error("subscription {subscription_type} request failed: {message}")]
    Transport {
        /// Provider subscription type.
        subscription_type: String,
        /// Transport error text.
        message: String,
    },
    /// Credentials were unavailable.
    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// A full-count fetch failed. The previous local value is retained.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The provider answered with a non-2xx status.
    #[error("count request failed with status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, as returned.
        body: String,
    },
    /// The request never produced a response.
    #[error("count request failed: {0}")]
    Transport(String),
    /// The response body did not carry a total.
    #[error("count response could not be decoded: {0}")]
    Decode(String),
    /// Credentials were unavailable or rejected.
    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Counter persistence failed.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("counter store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// The backing file held invalid JSON.
    #[error("counter store JSON invalid: {0}")]
    Json(#[from] serde_json::Error),
}

/// Why the event session stopped for good.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FatalReason {
    /// The socket closed with a code in [`PROTOCOL_FATAL_CLOSE_CODES`].
    #[error("socket closed with protocol-fatal code {code}: {reason}")]
    ProtocolClose {
        /// WebSocket close code.
        code: u16,
        /// Close reason text.
        reason: String,
    },
    /// The provider revoked the authorization behind the subscriptions.
    #[error("authorization revoked by provider")]
    AuthorizationRevoked,
    /// Automatic reconnection gave up.
    #[error("reconnect abandoned after {attempts} attempts")]
    RetriesExhausted {
        /// Attempts made before giving up.
        attempts: u32,
    },
}

impl FatalReason {
    /// Whether the account needs to be re-authorized to recover.
    pub fn requires_reauth(&self) -> bool {
        matches!(self, Self::AuthorizationRevoked)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CounterError: umbrella
// ─────────────────────────────────────────────────────────────────────────────

/// Coarse classification used for logging and retry decisions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transient network failure; retried with backoff.
    Network,
    /// Terminal for the session; needs outside action.
    ProtocolFatal,
    /// One frame dropped; the connection stays up.
    Parse,
    /// One subscription failed; bootstrap continues.
    Subscription,
    /// One reconciliation tick failed; the next tick retries.
    Reconcile,
    /// Credentials problem.
    Auth,
    /// Persistence problem.
    Store,
}

/// Any error raised by the engine.
#[derive(Debug, Error)]
pub enum CounterError {
    /// Socket connect failure.
    #[error(transparent)]
    Network(#[from] ConnectError),
    /// Terminal session failure.
    #[error(transparent)]
    ProtocolFatal(#[from] FatalReason),
    /// Frame decode failure.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Subscription creation failure.
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),
    /// Reconciliation failure.
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    /// Credentials failure.
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CounterError {
    /// Classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::Network,
            Self::ProtocolFatal(_) => ErrorKind::ProtocolFatal,
            Self::Parse(_) => ErrorKind::Parse,
            Self::Subscription(_) => ErrorKind::Subscription,
            Self::Reconcile(_) => ErrorKind::Reconcile,
            Self::Auth(_) => ErrorKind::Auth,
            Self::Store(_) => ErrorKind::Store,
        }
    }

    /// Whether the failing operation heals by being retried later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Network | ErrorKind::Reconcile | ErrorKind::Store
        )
    }

    /// Whether the caller must act (re-authenticate, alert an operator).
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ProtocolFatal(_))
    }
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, CounterError>;
