//! Counter vocabulary: the two counter kinds, the four batch directions,
//! the counter pair itself, and the update record a mutation produces.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which counter a change applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterKind {
    /// Follower total.
    Follow,
    /// Subscriber total.
    Sub,
}

impl CounterKind {
    /// Both kinds, in display order.
    pub const ALL: [Self; 2] = [Self::Follow, Self::Sub];

    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Follow => "follow",
            Self::Sub => "sub",
        }
    }
}

impl fmt::Display for CounterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `(counter kind, sign)` pair with its own independent accumulator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchDirection {
    /// New followers.
    FollowAdd,
    /// Lost followers.
    FollowRemove,
    /// New or gifted subscriptions.
    SubAdd,
    /// Ended subscriptions.
    SubEnd,
}

impl BatchDirection {
    /// All four directions.
    pub const ALL: [Self; 4] = [
        Self::FollowAdd,
        Self::FollowRemove,
        Self::SubAdd,
        Self::SubEnd,
    ];

    /// Counter this direction mutates.
    pub fn kind(self) -> CounterKind {
        match self {
            Self::FollowAdd | Self::FollowRemove => CounterKind::Follow,
            Self::SubAdd | Self::SubEnd => CounterKind::Sub,
        }
    }

    /// Whether flushing this direction decrements the counter.
    pub fn is_removal(self) -> bool {
        matches!(self, Self::FollowRemove | Self::SubEnd)
    }

    /// Signed delta for a flushed amount.
    #[allow(clippy::cast_possible_wrap)]
    pub fn signed(self, amount: u64) -> i64 {
        let magnitude = amount.min(i64::MAX as u64) as i64;
        if self.is_removal() { -magnitude } else { magnitude }
    }

    /// Dense index, used to address per-direction slots.
    pub fn index(self) -> usize {
        match self {
            Self::FollowAdd => 0,
            Self::FollowRemove => 1,
            Self::SubAdd => 2,
            Self::SubEnd => 3,
        }
    }

    /// Stable snake-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FollowAdd => "follow_add",
            Self::FollowRemove => "follow_remove",
            Self::SubAdd => "sub_add",
            Self::SubEnd => "sub_end",
        }
    }
}

impl fmt::Display for BatchDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether `subscription.end` decrements the sub counter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubCountMode {
    /// Every end event decrements.
    #[default]
    Realtime,
    /// End events are ignored for the duration of a stream session.
    Session,
}

/// The two live totals. Never negative.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    /// Follower total.
    pub follows: u64,
    /// Subscriber total.
    pub subs: u64,
}

impl Counters {
    /// Current value of one counter.
    pub fn get(&self, kind: CounterKind) -> u64 {
        match kind {
            CounterKind::Follow => self.follows,
            CounterKind::Sub => self.subs,
        }
    }

    /// Overwrite one counter.
    pub fn set(&mut self, kind: CounterKind, value: u64) {
        match kind {
            CounterKind::Follow => self.follows = value,
            CounterKind::Sub => self.subs = value,
        }
    }

    /// Apply a flushed amount for a direction, clamping decrements at zero.
    /// Returns the new value of the affected counter.
    pub fn apply(&mut self, direction: BatchDirection, amount: u64) -> u64 {
        let kind = direction.kind();
        let current = self.get(kind);
        let next = if direction.is_removal() {
            current.saturating_sub(amount)
        } else {
            current.saturating_add(amount)
        };
        self.set(kind, next);
        next
    }
}

/// What produced a counter update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOrigin {
    /// A batching flush.
    Batch,
    /// A reconciliation that replaced the local value.
    Reconcile,
    /// A read-only snapshot, e.g. for a newly connected client.
    Snapshot,
}

/// One mutation of one counter, ready to be broadcast.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterUpdate {
    /// Counter that changed.
    pub kind: CounterKind,
    /// New total.
    pub count: u64,
    /// Signed change: the flushed amount for batches, `new - old` for
    /// reconciliations, zero for snapshots.
    pub delta: i64,
    /// What produced this update.
    pub origin: UpdateOrigin,
    /// When the mutation happened.
    pub at: DateTime<Utc>,
}

impl CounterUpdate {
    /// Update produced by a batching flush.
    pub fn batch(direction: BatchDirection, amount: u64, count: u64) -> Self {
        Self {
            kind: direction.kind(),
            count,
            delta: direction.signed(amount),
            origin: UpdateOrigin::Batch,
            at: Utc::now(),
        }
    }

    /// Update produced by a reconciliation from `old` to `new`.
    #[allow(clippy::cast_possible_wrap)]
    pub fn reconcile(kind: CounterKind, old: u64, new: u64) -> Self {
        let delta = (new as i128 - old as i128).clamp(i64::MIN as i128, i64::MAX as i128) as i64;
        Self {
            kind,
            count: new,
            delta,
            origin: UpdateOrigin::Reconcile,
            at: Utc::now(),
        }
    }

    /// Read-only snapshot of a counter.
    pub fn snapshot(kind: CounterKind, count: u64) -> Self {
        Self {
            kind,
            count,
            delta: 0,
            origin: UpdateOrigin::Snapshot,
            at: Utc::now(),
        }
    }
}
