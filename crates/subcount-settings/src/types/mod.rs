//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and implement
//! [`Default`] with production values. Every section is `#[serde(default)]`,
//! so a partial JSON file only needs the keys it changes.

mod engine;
mod server;
mod session;

pub use engine::*;
pub use server::*;
pub use session::*;

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// Loaded from `~/.subcount/settings.json` with defaults applied for missing
/// fields. Environment variables can override specific values. Example:
///
/// ```json
/// {
///   "batching": { "debounceMs": 250 },
///   "broadcast": { "port": 9000 }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubcountSettings {
    /// Settings schema version.
    pub version: String,
    /// Event socket and reconnect behaviour.
    pub eventsub: EventSubSettings,
    /// Provider REST API.
    pub helix: HelixSettings,
    /// Debounce and animation windows.
    pub batching: BatchingSettings,
    /// Reconciliation intervals.
    pub polling: PollingSettings,
    /// Display-client endpoint.
    pub broadcast: BroadcastSettings,
    /// Counter policy and persistence.
    pub counters: CounterSettings,
    /// Non-secret account identifiers.
    pub auth: AuthSettings,
    /// Log level.
    pub logging: LoggingSettings,
}

impl Default for SubcountSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            eventsub: EventSubSettings::default(),
            helix: HelixSettings::default(),
            batching: BatchingSettings::default(),
            polling: PollingSettings::default(),
            broadcast: BroadcastSettings::default(),
            counters: CounterSettings::default(),
            auth: AuthSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}
