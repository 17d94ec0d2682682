//! Provider event kinds the engine subscribes to.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A provider subscription type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// `channel.follow`
    Follow,
    /// `channel.subscribe`
    Subscribe,
    /// `channel.subscription.gift`
    SubscriptionGift,
    /// `channel.subscription.message` (resub)
    SubscriptionMessage,
    /// `channel.subscription.end`
    SubscriptionEnd,
}

impl EventKind {
    /// Every kind, in bootstrap order.
    pub const ALL: [Self; 5] = [
        Self::Follow,
        Self::Subscribe,
        Self::SubscriptionGift,
        Self::SubscriptionMessage,
        Self::SubscriptionEnd,
    ];

    /// Provider wire name.
    pub fn subscription_type(self) -> &'static str {
        match self {
            Self::Follow => "channel.follow",
            Self::Subscribe => "channel.subscribe",
            Self::SubscriptionGift => "channel.subscription.gift",
            Self::SubscriptionMessage => "channel.subscription.message",
            Self::SubscriptionEnd => "channel.subscription.end",
        }
    }

    /// Subscription version requested at bootstrap.
    pub fn version(self) -> &'static str {
        match self {
            Self::Follow => "2",
            _ => "1",
        }
    }

    /// Parse a provider wire name.
    pub fn from_subscription_type(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.subscription_type() == value)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.subscription_type())
    }
}
