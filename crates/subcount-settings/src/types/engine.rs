//! Batching, polling, and counter policy settings.

use serde::{Deserialize, Serialize};
use subcount_core::SubCountMode;

/// Debounce and animation window durations.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchingSettings {
    /// Quiet period after the last add before a flush.
    pub debounce_ms: u64,
    /// How long a flushed batch holds its direction locked.
    pub animation_window_ms: u64,
}

impl Default for BatchingSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            animation_window_ms: 1500,
        }
    }
}

/// Reconciliation intervals.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PollingSettings {
    /// Follower total fetch interval. Unfollows only show up here.
    pub follows_interval_ms: u64,
    /// Subscriber total fetch interval.
    pub subs_interval_ms: u64,
    /// Delay before the first reconciliation of both counters.
    pub initial_delay_ms: u64,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            follows_interval_ms: 10_000,
            subs_interval_ms: 60_000,
            initial_delay_ms: 5000,
        }
    }
}

/// Counter policy and persistence.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CounterSettings {
    /// Whether subscription end events decrement the sub counter.
    pub sub_count_mode: SubCountMode,
    /// Counter state file, relative to `~/.subcount` unless absolute.
    pub state_file: String,
}

impl Default for CounterSettings {
    fn default() -> Self {
        Self {
            sub_count_mode: SubCountMode::Realtime,
            state_file: "counters.json".to_string(),
        }
    }
}
