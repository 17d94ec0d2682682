//! Display endpoint, account, and logging settings.

use serde::{Deserialize, Serialize};

/// Display-client WebSocket endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BroadcastSettings {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Per-client outbound queue length.
    pub channel_capacity: usize,
    /// Per-client queued bytes above which sends are dropped.
    pub buffer_limit_bytes: usize,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8083,
            channel_capacity: 64,
            buffer_limit_bytes: 1024 * 1024,
        }
    }
}

/// Account identifiers. The access token is never read from the file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// Application client id.
    pub client_id: String,
    /// Tracked channel id.
    pub broadcaster_id: String,
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_defaults() {
        let s = BroadcastSettings::default();
        assert_eq!(s.port, 8083);
        assert_eq!(s.buffer_limit_bytes, 1_048_576);
    }

    #[test]
    fn auth_has_no_token_field() {
        let json = serde_json::to_value(AuthSettings::default()).unwrap();
        assert!(json.get("accessToken").is_none());
    }
}
