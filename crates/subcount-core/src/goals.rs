//! Goal annotation for broadcast payloads.
//!
//! A goal table maps thresholds to display messages. The engine only ever
//! queries it through [`GoalView`](crate::collaborators::GoalView); loading
//! and watching goal files belongs to the caller.

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};

use serde::{Deserialize, Serialize};

use crate::collaborators::GoalView;
use crate::counters::CounterKind;

/// The goal a counter is currently working towards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalInfo {
    /// Value the goal was computed for.
    pub current: u64,
    /// Next threshold, or `current` once every goal is passed.
    pub target: u64,
    /// Message attached to the target threshold.
    pub message: String,
    /// `target - current`.
    pub remaining: u64,
    /// Percent of the way to `target`, one decimal.
    pub progress: f64,
    /// No threshold remains above `current`.
    pub is_max_reached: bool,
}

impl GoalInfo {
    fn maxed(current: u64) -> Self {
        Self {
            current,
            target: current,
            message: current.to_string(),
            remaining: 0,
            progress: 100.0,
            is_max_reached: true,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn towards(current: u64, target: u64, message: &str) -> Self {
        let raw = current as f64 / target as f64 * 100.0;
        Self {
            current,
            target,
            message: message.to_string(),
            remaining: target - current,
            progress: (raw * 10.0).round() / 10.0,
            is_max_reached: false,
        }
    }
}

/// Sorted threshold → message maps, one per counter kind.
#[derive(Clone, Debug, Default)]
pub struct GoalTable {
    follows: BTreeMap<u64, String>,
    subs: BTreeMap<u64, String>,
}

impl GoalTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the goals of one kind.
    pub fn set_goals<I, S>(&mut self, kind: CounterKind, goals: I)
    where
        I: IntoIterator<Item = (u64, S)>,
        S: Into<String>,
    {
        let map = goals.into_iter().map(|(k, v)| (k, v.into())).collect();
        match kind {
            CounterKind::Follow => self.follows = map,
            CounterKind::Sub => self.subs = map,
        }
    }

    /// Builder form of [`set_goals`](Self::set_goals).
    #[must_use]
    pub fn with_goals<I, S>(mut self, kind: CounterKind, goals: I) -> Self
    where
        I: IntoIterator<Item = (u64, S)>,
        S: Into<String>,
    {
        self.set_goals(kind, goals);
        self
    }

    fn goals(&self, kind: CounterKind) -> &BTreeMap<u64, String> {
        match kind {
            CounterKind::Follow => &self.follows,
            CounterKind::Sub => &self.subs,
        }
    }
}

impl GoalView for GoalTable {
    fn next(&self, kind: CounterKind, current: u64) -> GoalInfo {
        let goals = self.goals(kind);
        match goals.range((Excluded(current), Unbounded)).next() {
            Some((target, message)) => GoalInfo::towards(current, *target, message),
            None => GoalInfo::maxed(current),
        }
    }
}
