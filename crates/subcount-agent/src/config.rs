//! Settings → component configuration.

use std::time::Duration;

use subcount_core::{Credentials, StaticAuth};
use subcount_eventsub::SessionConfig;
use subcount_runtime::{BatchingConfig, PollingConfig};
use subcount_server::DisplayConfig;
use subcount_settings::SubcountSettings;

pub fn session_config(settings: &SubcountSettings) -> SessionConfig {
    let s = &settings.eventsub;
    SessionConfig {
        endpoint: s.endpoint.clone(),
        keepalive_grace: Duration::from_millis(s.keepalive_grace_ms),
        default_keepalive: Duration::from_secs(s.default_keepalive_secs),
        bootstrap_delay: Duration::from_millis(s.bootstrap_delay_ms),
        handoff_fallback_delay: Duration::from_millis(s.handoff_fallback_delay_ms),
        reconnect: s.reconnect,
        dedup_window: s.dedup_window,
    }
}

pub fn batching_config(settings: &SubcountSettings) -> BatchingConfig {
    BatchingConfig {
        debounce: Duration::from_millis(settings.batching.debounce_ms),
        animation_window: Duration::from_millis(settings.batching.animation_window_ms),
    }
}

pub fn polling_config(settings: &SubcountSettings) -> PollingConfig {
    PollingConfig {
        follows_interval: Duration::from_millis(settings.polling.follows_interval_ms),
        subs_interval: Duration::from_millis(settings.polling.subs_interval_ms),
        initial_delay: Duration::from_millis(settings.polling.initial_delay_ms),
    }
}

pub fn display_config(settings: &SubcountSettings) -> DisplayConfig {
    let b = &settings.broadcast;
    DisplayConfig {
        host: b.host.clone(),
        port: b.port,
        channel_capacity: b.channel_capacity,
        buffer_limit_bytes: b.buffer_limit_bytes,
    }
}

/// Auth over the token from the environment, or an unconfigured provider.
pub fn static_auth(settings: &SubcountSettings, access_token: Option<String>) -> StaticAuth {
    match access_token {
        Some(access_token) => StaticAuth::new(Credentials {
            client_id: settings.auth.client_id.clone(),
            access_token,
            broadcaster_id: settings.auth.broadcaster_id.clone(),
        }),
        None => StaticAuth::unconfigured(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subcount_core::AuthProvider;

    #[test]
    fn session_config_from_defaults() {
        let config = session_config(&SubcountSettings::default());
        assert_eq!(config.keepalive_grace, Duration::from_millis(5000));
        assert_eq!(config.default_keepalive, Duration::from_secs(10));
        assert_eq!(config.bootstrap_delay, Duration::from_secs(1));
        assert_eq!(config.reconnect.max_attempts, 10);
        assert_eq!(config.dedup_window, 256);
    }

    #[test]
    fn engine_configs_from_settings() {
        let mut settings = SubcountSettings::default();
        settings.batching.debounce_ms = 250;
        settings.polling.subs_interval_ms = 30_000;
        settings.broadcast.port = 9100;

        assert_eq!(batching_config(&settings).debounce, Duration::from_millis(250));
        assert_eq!(
            batching_config(&settings).animation_window,
            Duration::from_millis(1500)
        );
        assert_eq!(polling_config(&settings).subs_interval, Duration::from_secs(30));
        assert_eq!(polling_config(&settings).follows_interval, Duration::from_secs(10));
        assert_eq!(display_config(&settings).port, 9100);
    }

    #[tokio::test]
    async fn auth_uses_settings_ids() {
        let mut settings = SubcountSettings::default();
        settings.auth.client_id = "app".into();
        settings.auth.broadcaster_id = "1234".into();

        let creds = static_auth(&settings, Some("token".into())).bearer().await.unwrap();
        assert_eq!(creds.client_id, "app");
        assert_eq!(creds.broadcaster_id, "1234");
        assert_eq!(creds.access_token, "token");

        assert!(static_auth(&settings, None).bearer().await.is_err());
    }
}
