//! Mapping from provider notifications to batch directions.
//!
//! | Provider event                 | Condition          | Result                   |
//! |--------------------------------|--------------------|--------------------------|
//! | `channel.follow`               | always             | follow add, 1            |
//! | `channel.subscribe`            | `is_gift == true`  | ignored                  |
//! | `channel.subscribe`            | otherwise          | sub add, 1               |
//! | `channel.subscription.gift`    |                    | sub add, `total` (≥ 1)   |
//! | `channel.subscription.message` |                    | ignored (resub)          |
//! | `channel.subscription.end`     | realtime mode      | sub end, 1               |
//! | `channel.subscription.end`     | session mode       | ignored                  |
//!
//! This is the only place counting semantics are decided.

use serde_json::Value;
use subcount_core::{BatchDirection, EventKind, SubCountMode};

/// Why a notification does not change any counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    /// A gifted sub; already counted through the gift event.
    GiftedSubscribe,
    /// A resub; the subscriber is already counted.
    Resub,
    /// A subscription end while counting in session mode.
    SessionMode,
    /// A subscription type this engine does not count.
    Unhandled,
}

/// Outcome of classifying one notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Classification {
    /// Feed `amount` into the accumulator for `direction`.
    Count {
        /// Target accumulator.
        direction: BatchDirection,
        /// Amount to add.
        amount: u64,
    },
    /// No counter changes.
    Ignored(IgnoreReason),
}

/// Classify a notification body under the given counting mode.
pub fn classify(subscription_type: &str, event: &Value, mode: SubCountMode) -> Classification {
    let Some(kind) = EventKind::from_subscription_type(subscription_type) else {
        return Classification::Ignored(IgnoreReason::Unhandled);
    };
    match kind {
        EventKind::Follow => count(BatchDirection::FollowAdd, 1),
        EventKind::Subscribe => {
            if event["is_gift"].as_bool().unwrap_or(false) {
                Classification::Ignored(IgnoreReason::GiftedSubscribe)
            } else {
                count(BatchDirection::SubAdd, 1)
            }
        }
        EventKind::SubscriptionGift => {
            let total = event["total"].as_u64().filter(|t| *t > 0).unwrap_or(1);
            count(BatchDirection::SubAdd, total)
        }
        EventKind::SubscriptionMessage => Classification::Ignored(IgnoreReason::Resub),
        EventKind::SubscriptionEnd => match mode {
            SubCountMode::Realtime => count(BatchDirection::SubEnd, 1),
            SubCountMode::Session => Classification::Ignored(IgnoreReason::SessionMode),
        },
    }
}

fn count(direction: BatchDirection, amount: u64) -> Classification {
    Classification::Count { direction, amount }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const RT: SubCountMode = SubCountMode::Realtime;

    #[test]
    fn follow_counts_one() {
        assert_eq!(
            classify("channel.follow", &json!({"user_name": "a"}), RT),
            count(BatchDirection::FollowAdd, 1)
        );
    }

    #[test]
    fn gifted_subscribe_is_ignored() {
        assert_eq!(
            classify("channel.subscribe", &json!({"is_gift": true}), RT),
            Classification::Ignored(IgnoreReason::GiftedSubscribe)
        );
    }

    #[test]
    fn plain_subscribe_counts_one() {
        assert_eq!(
            classify("channel.subscribe", &json!({"is_gift": false, "tier": "1000"}), RT),
            count(BatchDirection::SubAdd, 1)
        );
        assert_eq!(
            classify("channel.subscribe", &json!({}), RT),
            count(BatchDirection::SubAdd, 1)
        );
    }

    #[test]
    fn gift_counts_total() {
        assert_eq!(
            classify("channel.subscription.gift", &json!({"total": 5}), RT),
            count(BatchDirection::SubAdd, 5)
        );
    }

    #[test]
    fn gift_total_defaults_to_one() {
        assert_eq!(
            classify("channel.subscription.gift", &json!({}), RT),
            count(BatchDirection::SubAdd, 1)
        );
        assert_eq!(
            classify("channel.subscription.gift", &json!({"total": 0}), RT),
            count(BatchDirection::SubAdd, 1)
        );
    }

    #[test]
    fn gift_bomb_nets_total_only() {
        let events = [
            ("channel.subscribe", json!({"is_gift": true})),
            ("channel.subscription.gift", json!({"total": 5})),
        ];
        let net: u64 = events
            .iter()
            .filter_map(|(t, e)| match classify(t, e, RT) {
                Classification::Count { amount, .. } => Some(amount),
                Classification::Ignored(_) => None,
            })
            .sum();
        assert_eq!(net, 5);
    }

    #[test]
    fn resub_is_ignored() {
        assert_eq!(
            classify("channel.subscription.message", &json!({"cumulative_months": 3}), RT),
            Classification::Ignored(IgnoreReason::Resub)
        );
    }

    #[test]
    fn end_depends_on_mode() {
        assert_eq!(
            classify("channel.subscription.end", &json!({}), SubCountMode::Realtime),
            count(BatchDirection::SubEnd, 1)
        );
        assert_eq!(
            classify("channel.subscription.end", &json!({}), SubCountMode::Session),
            Classification::Ignored(IgnoreReason::SessionMode)
        );
    }

    #[test]
    fn unknown_type_is_unhandled() {
        assert_eq!(
            classify("channel.raid", &json!({}), RT),
            Classification::Ignored(IgnoreReason::Unhandled)
        );
    }
}
