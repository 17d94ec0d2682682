//! Event socket and provider API settings.

use serde::{Deserialize, Serialize};
use subcount_core::ReconnectPolicy;

/// Default event socket endpoint.
pub const DEFAULT_EVENTSUB_URL: &str = "wss://eventsub.wss.twitch.tv/ws";
/// Default provider REST base URL.
pub const DEFAULT_HELIX_URL: &str = "https://api.twitch.tv/helix";

/// Event socket session settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventSubSettings {
    /// Endpoint dialed on connect and on a reconnect without URL.
    pub endpoint: String,
    /// Added to the provider keepalive before the watchdog fires.
    pub keepalive_grace_ms: u64,
    /// Keepalive assumed when the welcome omits it.
    pub default_keepalive_secs: u64,
    /// Delay between welcome and subscription bootstrap.
    pub bootstrap_delay_ms: u64,
    /// Socket handshake timeout.
    pub connect_timeout_ms: u64,
    /// Delay before dialing the default endpoint on a reconnect without URL.
    pub handoff_fallback_delay_ms: u64,
    /// Recent notification ids kept for duplicate suppression.
    pub dedup_window: usize,
    /// Backoff policy for unplanned disconnects.
    pub reconnect: ReconnectPolicy,
}

impl Default for EventSubSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_EVENTSUB_URL.to_string(),
            keepalive_grace_ms: 5000,
            default_keepalive_secs: 10,
            bootstrap_delay_ms: 1000,
            connect_timeout_ms: 10_000,
            handoff_fallback_delay_ms: 1000,
            dedup_window: 256,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Provider REST API settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HelixSettings {
    /// Base URL without trailing slash.
    pub base_url: String,
    /// Per-request timeout.
    pub request_timeout_ms: u64,
}

impl Default for HelixSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_HELIX_URL.to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eventsub_defaults() {
        let s = EventSubSettings::default();
        assert_eq!(s.endpoint, "wss://eventsub.wss.twitch.tv/ws");
        assert_eq!(s.keepalive_grace_ms, 5000);
        assert_eq!(s.default_keepalive_secs, 10);
        assert_eq!(s.bootstrap_delay_ms, 1000);
        assert_eq!(s.reconnect.max_attempts, 10);
    }

    #[test]
    fn nested_reconnect_policy_partial() {
        let s: EventSubSettings =
            serde_json::from_str(r#"{"reconnect": {"maxDelayMs": 30000}}"#).unwrap();
        assert_eq!(s.reconnect.max_delay_ms, 30_000);
        assert_eq!(s.reconnect.base_delay_ms, 1000);
    }
}
