//! Interfaces the engine consumes but does not implement in full.
//!
//! - [`CounterStore`]: persistence of the raw counters
//! - [`AuthProvider`]: bearer credentials and the revocation notice
//! - [`GoalView`]: goal annotation for broadcast payloads
//! - [`CountSource`]: authoritative remote totals for reconciliation

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::error;

use crate::counters::{CounterKind, Counters};
use crate::errors::{AuthError, FatalReason, ReconcileError, StoreError};
use crate::goals::GoalInfo;

/// Durable storage for the two counters.
pub trait CounterStore: Send + Sync {
    /// Load the last saved counters. A missing store yields zeros.
    fn load(&self) -> Result<Counters, StoreError>;

    /// Persist the given counters.
    fn save(&self, counters: &Counters) -> Result<(), StoreError>;
}

/// Credentials for provider API calls.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Application client id, sent as `Client-Id`.
    pub client_id: String,
    /// OAuth access token, sent as `Authorization: Bearer`.
    pub access_token: String,
    /// Channel whose counters are tracked.
    pub broadcaster_id: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("access_token", &"<redacted>")
            .field("broadcaster_id", &self.broadcaster_id)
            .finish()
    }
}

/// Source of bearer credentials, notified when the provider revokes them.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Current credentials.
    async fn bearer(&self) -> Result<Credentials, AuthError>;

    /// The session was revoked or closed with a protocol-fatal code.
    fn on_revoked(&self, reason: &FatalReason);
}

/// Read-only goal lookup.
pub trait GoalView: Send + Sync {
    /// Goal for `kind` given its current value.
    fn next(&self, kind: CounterKind, current: u64) -> GoalInfo;
}

/// Authoritative remote totals.
#[async_trait]
pub trait CountSource: Send + Sync {
    /// Fetch the provider's current total for `kind`.
    async fn fetch_total(&self, kind: CounterKind) -> Result<u64, ReconcileError>;
}

/// [`AuthProvider`] over fixed credentials, for tokens supplied at start-up.
///
/// After a revocation every further [`bearer`](AuthProvider::bearer) call
/// fails with [`AuthError::Unauthorized`] until the process is restarted
/// with fresh credentials.
pub struct StaticAuth {
    credentials: Option<Credentials>,
    revoked: AtomicBool,
}

impl StaticAuth {
    /// Provider that always returns `credentials`.
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials: Some(credentials),
            revoked: AtomicBool::new(false),
        }
    }

    /// Provider with no credentials configured.
    pub fn unconfigured() -> Self {
        Self {
            credentials: None,
            revoked: AtomicBool::new(false),
        }
    }

    /// Whether a revocation notice has been received.
    pub fn is_revoked(&self) -> bool {
        self.revoked.load(Ordering::Acquire)
    }
}

#[async_trait]
impl AuthProvider for StaticAuth {
    async fn bearer(&self) -> Result<Credentials, AuthError> {
        if self.is_revoked() {
            return Err(AuthError::Unauthorized);
        }
        let creds = self.credentials.clone().ok_or(AuthError::MissingToken)?;
        if creds.access_token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        if creds.broadcaster_id.is_empty() {
            return Err(AuthError::MissingBroadcaster);
        }
        Ok(creds)
    }

    fn on_revoked(&self, reason: &FatalReason) {
        if reason.requires_reauth() {
            self.revoked.store(true, Ordering::Release);
            error!(%reason, "account authorization revoked, reconnect your account");
        } else {
            error!(%reason, "event session stopped, manual reconnect required");
        }
    }
}
