//! Messages sent to display clients.
//!
//! ```json
//! {"type":"follow_update","count":120,"goal":{...},"batchCount":3,
//!  "isBatch":true,"isRemoval":false,"timestamp":"2024-05-01T12:00:00Z"}
//! ```
//!
//! Snapshots sent on connect omit the three animation fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use subcount_core::{CounterKind, CounterUpdate, GoalInfo, GoalView, UpdateOrigin};

/// Discriminator of a display message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadType {
    /// Follower total changed.
    #[serde(rename = "follow_update")]
    FollowUpdate,
    /// Subscriber total changed.
    #[serde(rename = "sub_update")]
    SubUpdate,
}

impl From<CounterKind> for PayloadType {
    fn from(kind: CounterKind) -> Self {
        match kind {
            CounterKind::Follow => Self::FollowUpdate,
            CounterKind::Sub => Self::SubUpdate,
        }
    }
}

/// One display message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayPayload {
    /// Which counter this is about.
    #[serde(rename = "type")]
    pub payload_type: PayloadType,
    /// New total.
    pub count: u64,
    /// Goal annotation for `count`.
    pub goal: GoalInfo,
    /// Signed delta to animate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_count: Option<i64>,
    /// More than one unit changed at once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_batch: Option<bool>,
    /// The delta is negative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_removal: Option<bool>,
    /// When the change happened.
    pub timestamp: DateTime<Utc>,
}

impl DisplayPayload {
    /// Payload for a counter update.
    pub fn from_update(update: &CounterUpdate, goals: &dyn GoalView) -> Self {
        let (batch_count, is_batch, is_removal) = match update.origin {
            UpdateOrigin::Batch => (
                Some(update.delta),
                Some(update.delta.unsigned_abs() > 1),
                Some(update.delta < 0),
            ),
            UpdateOrigin::Reconcile => (Some(update.delta), Some(false), Some(update.delta < 0)),
            UpdateOrigin::Snapshot => (None, None, None),
        };
        Self {
            payload_type: update.kind.into(),
            count: update.count,
            goal: goals.next(update.kind, update.count),
            batch_count,
            is_batch,
            is_removal,
            timestamp: update.at,
        }
    }

    /// Snapshot payload for a newly connected client.
    pub fn snapshot(kind: CounterKind, count: u64, goals: &dyn GoalView) -> Self {
        Self::from_update(&CounterUpdate::snapshot(kind, count), goals)
    }
}
