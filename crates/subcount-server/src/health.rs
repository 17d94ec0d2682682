//! `/health` endpoint body.

use std::time::Instant;

use serde::Serialize;
use subcount_core::Counters;

use crate::gate::GateStats;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Connected display clients.
    pub clients: usize,
    /// Current totals.
    pub counters: Counters,
    /// Lifetime broadcast counters.
    pub broadcast: GateStats,
}

/// Build a health response from live values.
pub fn health_check(
    start_time: Instant,
    clients: usize,
    counters: Counters,
    broadcast: GateStats,
) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        clients,
        counters,
        broadcast,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_counts_from_start() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        let resp = health_check(start, 0, Counters::default(), GateStats::default());
        assert!(resp.uptime_secs >= 59);
    }

    #[test]
    fn serialization() {
        let resp = health_check(
            Instant::now(),
            2,
            Counters { follows: 10, subs: 4 },
            GateStats { sent: 7, dropped: 1 },
        );
        let parsed = serde_json::to_value(&resp).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["clients"], 2);
        assert_eq!(parsed["counters"]["follows"], 10);
        assert_eq!(parsed["broadcast"]["dropped"], 1);
        assert!(parsed["uptimeSecs"].is_number());
    }
}
