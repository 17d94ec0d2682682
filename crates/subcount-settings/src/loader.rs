//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`SubcountSettings::default()`]
//! 2. If `~/.subcount/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `SUBCOUNT_*` environment variable overrides (highest priority)
//! 4. Validate cross-field constraints
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use subcount_core::SubCountMode;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::SubcountSettings;

/// Env var holding the bearer token. Tokens are never read from the file.
pub const ACCESS_TOKEN_ENV: &str = "SUBCOUNT_ACCESS_TOKEN";

/// Data directory (`~/.subcount`).
pub fn data_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".subcount")
}

/// Resolve the path to the settings file (`~/.subcount/settings.json`).
pub fn settings_path() -> PathBuf {
    data_dir().join("settings.json")
}

/// Resolve the counter state file, relative to [`data_dir`] unless absolute.
pub fn state_file_path(settings: &SubcountSettings) -> PathBuf {
    let configured = Path::new(&settings.counters.state_file);
    if configured.is_absolute() {
        configured.to_path_buf()
    } else {
        data_dir().join(configured)
    }
}

/// Bearer token from [`ACCESS_TOKEN_ENV`], if set and non-empty.
pub fn access_token_from_env() -> Option<String> {
    read_env_string(ACCESS_TOKEN_ENV)
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<SubcountSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<SubcountSettings> {
    let defaults = serde_json::to_value(SubcountSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: SubcountSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Reject values the engine cannot run with.
pub fn validate(settings: &SubcountSettings) -> Result<()> {
    let checks: [(bool, &str); 6] = [
        (settings.batching.debounce_ms > 0, "batching.debounceMs must be > 0"),
        (
            settings.batching.animation_window_ms > 0,
            "batching.animationWindowMs must be > 0",
        ),
        (
            settings.polling.follows_interval_ms > 0,
            "polling.followsIntervalMs must be > 0",
        ),
        (
            settings.polling.subs_interval_ms > 0,
            "polling.subsIntervalMs must be > 0",
        ),
        (
            settings.broadcast.channel_capacity > 0,
            "broadcast.channelCapacity must be > 0",
        ),
        (
            settings.eventsub.dedup_window > 0,
            "eventsub.dedupWindow must be > 0",
        ),
    ];
    match checks.iter().find(|(ok, _)| !ok) {
        Some((_, message)) => Err(SettingsError::InvalidValue((*message).to_string())),
        None => Ok(()),
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning (fall back to file/default).
pub fn apply_env_overrides(settings: &mut SubcountSettings) {
    // ── Event socket ────────────────────────────────────────────────
    if let Some(v) = read_env_string("SUBCOUNT_EVENTSUB_URL") {
        settings.eventsub.endpoint = v;
    }
    if let Some(v) = read_env_u32("SUBCOUNT_MAX_RECONNECT_ATTEMPTS", 0, 1000) {
        settings.eventsub.reconnect.max_attempts = v;
    }
    if let Some(v) = read_env_u64("SUBCOUNT_KEEPALIVE_GRACE_MS", 0, 60_000) {
        settings.eventsub.keepalive_grace_ms = v;
    }

    // ── Provider API ────────────────────────────────────────────────
    if let Some(v) = read_env_string("SUBCOUNT_HELIX_URL") {
        settings.helix.base_url = v;
    }

    // ── Batching / polling ──────────────────────────────────────────
    if let Some(v) = read_env_u64("SUBCOUNT_DEBOUNCE_MS", 1, 60_000) {
        settings.batching.debounce_ms = v;
    }
    if let Some(v) = read_env_u64("SUBCOUNT_ANIMATION_MS", 1, 60_000) {
        settings.batching.animation_window_ms = v;
    }
    if let Some(v) = read_env_u64("SUBCOUNT_POLL_FOLLOWS_MS", 1000, 3_600_000) {
        settings.polling.follows_interval_ms = v;
    }
    if let Some(v) = read_env_u64("SUBCOUNT_POLL_SUBS_MS", 1000, 3_600_000) {
        settings.polling.subs_interval_ms = v;
    }

    // ── Broadcast endpoint ──────────────────────────────────────────
    if let Some(v) = read_env_string("SUBCOUNT_HOST") {
        settings.broadcast.host = v;
    }
    if let Some(v) = read_env_u16("SUBCOUNT_PORT", 1, 65535) {
        settings.broadcast.port = v;
    }

    // ── Counters ────────────────────────────────────────────────────
    if let Some(v) = read_env_mode("SUBCOUNT_SUB_COUNT_MODE") {
        settings.counters.sub_count_mode = v;
    }
    if let Some(v) = read_env_string("SUBCOUNT_STATE_FILE") {
        settings.counters.state_file = v;
    }

    // ── Account / logging ───────────────────────────────────────────
    if let Some(v) = read_env_string("SUBCOUNT_CLIENT_ID") {
        settings.auth.client_id = v;
    }
    if let Some(v) = read_env_string("SUBCOUNT_BROADCASTER_ID") {
        settings.auth.broadcaster_id = v;
    }
    if let Some(v) = read_env_string("SUBCOUNT_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a sub counting mode (`realtime` or `session`, case-insensitive).
pub fn parse_mode(val: &str) -> Option<SubCountMode> {
    match val.to_lowercase().as_str() {
        "realtime" => Some(SubCountMode::Realtime),
        "session" => Some(SubCountMode::Session),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_mode(name: &str) -> Option<SubCountMode> {
    let val = std::env::var(name).ok()?;
    let result = parse_mode(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid counting mode env var, ignoring");
    }
    result
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_env_u32(name: &str, min: u32, max: u32) -> Option<u32> {
    let val = std::env::var(name).ok()?;
    let result = parse_u32_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u32 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"batching": {"debounceMs": 300, "animationWindowMs": 1500}});
        let source = serde_json::json!({"batching": {"debounceMs": 200}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["batching"]["debounceMs"], 200);
        assert_eq!(merged["batching"]["animationWindowMs"], 1500);
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4]});
        assert_eq!(deep_merge(target, source)["items"], serde_json::json!([4]));
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        assert_eq!(deep_merge(target, source)["a"], 42);
    }

    #[test]
    fn merge_new_keys_added() {
        let merged = deep_merge(serde_json::json!({"a": 1}), serde_json::json!({"b": 2}));
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = load_settings_from_path(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings.version, "0.1.0");
        assert_eq!(settings.broadcast.port, 8083);
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"eventsub": {"reconnect": {"maxAttempts": 3}}, "counters": {"subCountMode": "session"}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.eventsub.reconnect.max_attempts, 3);
        assert_eq!(settings.eventsub.reconnect.base_delay_ms, 1000);
        assert_eq!(settings.counters.sub_count_mode, SubCountMode::Session);
        assert_eq!(settings.polling.follows_interval_ms, 10_000);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        assert_matches!(load_settings_from_path(&path), Err(SettingsError::Json(_)));
    }

    #[test]
    fn load_rejects_zero_debounce() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"batching": {"debounceMs": 0}}"#).unwrap();

        assert_matches!(
            load_settings_from_path(&path),
            Err(SettingsError::InvalidValue(msg)) if msg.contains("debounceMs")
        );
    }

    #[test]
    fn zero_channel_capacity_is_invalid() {
        let mut settings = SubcountSettings::default();
        settings.broadcast.channel_capacity = 0;
        assert_matches!(validate(&settings), Err(SettingsError::InvalidValue(_)));
    }

    // ── paths ───────────────────────────────────────────────────────

    #[test]
    fn state_file_absolute_kept() {
        let mut settings = SubcountSettings::default();
        settings.counters.state_file = "/var/lib/subcount/counters.json".to_string();
        assert_eq!(
            state_file_path(&settings),
            PathBuf::from("/var/lib/subcount/counters.json")
        );
    }

    #[test]
    fn state_file_relative_joins_data_dir() {
        let settings = SubcountSettings::default();
        assert_eq!(state_file_path(&settings), data_dir().join("counters.json"));
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn parse_mode_variants() {
        assert_eq!(parse_mode("session"), Some(SubCountMode::Session));
        assert_eq!(parse_mode("REALTIME"), Some(SubCountMode::Realtime));
        assert_eq!(parse_mode("live"), None);
    }

    #[test]
    fn parse_u16_bounds() {
        assert_eq!(parse_u16_range("8083", 1, 65535), Some(8083));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u16_range("99999", 1, 65535), None);
    }

    #[test]
    fn parse_u32_bounds() {
        assert_eq!(parse_u32_range("0", 0, 1000), Some(0));
        assert_eq!(parse_u32_range("1001", 0, 1000), None);
        assert_eq!(parse_u32_range("-1", 0, 1000), None);
    }

    #[test]
    fn parse_u64_bounds() {
        assert_eq!(parse_u64_range("10000", 1000, 3_600_000), Some(10_000));
        assert_eq!(parse_u64_range("500", 1000, 3_600_000), None);
        assert_eq!(parse_u64_range("abc", 1000, 3_600_000), None);
    }
}
