//! Inbound event socket frames.
//!
//! Every frame is a JSON envelope `{metadata, payload}` dispatched on
//! `metadata.message_type`:
//!
//! | `message_type`      | Fields used                                        |
//! |---------------------|----------------------------------------------------|
//! | `session_welcome`   | `payload.session.id`, `.keepalive_timeout_seconds` |
//! | `session_keepalive` | none                                               |
//! | `notification`      | `metadata.message_id`, `.subscription_type`, `payload.event` |
//! | `session_reconnect` | `payload.session.reconnect_url` (optional)         |
//! | `revocation`        | `metadata.subscription_type`, `payload.subscription.status` |

use serde::Deserialize;
use serde_json::Value;
use subcount_core::ParseError;

#[derive(Deserialize)]
struct Envelope {
    metadata: Metadata,
    #[serde(default)]
    payload: Value,
}

#[derive(Deserialize)]
struct Metadata {
    #[serde(default)]
    message_id: Option<String>,
    message_type: String,
    #[serde(default)]
    subscription_type: Option<String>,
}

/// Why the provider revoked a subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RevocationReason {
    /// The user revoked the app's authorization. Fatal.
    AuthorizationRevoked,
    /// The broadcaster account no longer exists.
    UserRemoved,
    /// The subscription type or version was retired.
    VersionRemoved,
    /// Anything else, kept verbatim.
    Other(String),
}

impl RevocationReason {
    fn parse(status: &str) -> Self {
        match status {
            "authorization_revoked" => Self::AuthorizationRevoked,
            "user_removed" => Self::UserRemoved,
            "version_removed" => Self::VersionRemoved,
            other => Self::Other(other.to_owned()),
        }
    }
}

/// A decoded frame.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundMessage {
    /// The provider assigned a session.
    Welcome {
        /// Session id used for subscription creation.
        session_id: String,
        /// Provider keepalive, when announced.
        keepalive_timeout_seconds: Option<u64>,
    },
    /// Liveness ping.
    Keepalive,
    /// A subscribed event.
    Notification {
        /// Delivery id, stable across redeliveries.
        message_id: Option<String>,
        /// Provider subscription type.
        subscription_type: String,
        /// Raw event body.
        event: Value,
    },
    /// The provider asks the client to move to another connection.
    Reconnect {
        /// URL of the replacement connection, if supplied.
        reconnect_url: Option<String>,
    },
    /// A subscription was revoked.
    Revocation {
        /// Revoked subscription type, if known.
        subscription_type: Option<String>,
        /// Revocation status.
        reason: RevocationReason,
    },
    /// A message type this client does not handle.
    Unknown(String),
}

/// Decode one text frame.
pub fn parse_frame(text: &str) -> Result<InboundMessage, ParseError> {
    let Envelope { metadata, payload } = serde_json::from_str(text)?;

    let message = match metadata.message_type.as_str() {
        "session_welcome" => {
            let session = &payload["session"];
            let session_id = session["id"]
                .as_str()
                .filter(|id| !id.is_empty())
                .ok_or(ParseError::MissingField("payload.session.id"))?;
            InboundMessage::Welcome {
                session_id: session_id.to_owned(),
                keepalive_timeout_seconds: session["keepalive_timeout_seconds"]
                    .as_u64()
                    .filter(|secs| *secs > 0),
            }
        }
        "session_keepalive" => InboundMessage::Keepalive,
        "notification" => {
            let subscription_type = metadata
                .subscription_type
                .ok_or(ParseError::MissingField("metadata.subscription_type"))?;
            let event = match payload.get("event") {
                Some(event) if event.is_object() => event.clone(),
                _ => return Err(ParseError::MissingField("payload.event")),
            };
            InboundMessage::Notification {
                message_id: metadata.message_id,
                subscription_type,
                event,
            }
        }
        "session_reconnect" => InboundMessage::Reconnect {
            reconnect_url: payload["session"]["reconnect_url"]
                .as_str()
                .filter(|url| !url.is_empty())
                .map(str::to_owned),
        },
        "revocation" => {
            let subscription = &payload["subscription"];
            let status = subscription["status"]
                .as_str()
                .ok_or(ParseError::MissingField("payload.subscription.status"))?;
            InboundMessage::Revocation {
                subscription_type: metadata
                    .subscription_type
                    .or_else(|| subscription["type"].as_str().map(str::to_owned)),
                reason: RevocationReason::parse(status),
            }
        }
        other => InboundMessage::Unknown(other.to_owned()),
    };
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn frame(message_type: &str, payload: Value) -> String {
        json!({
            "metadata": {"message_id": "m1", "message_type": message_type, "message_timestamp": "2024-01-01T00:00:00Z"},
            "payload": payload,
        })
        .to_string()
    }

    #[test]
    fn welcome() {
        let text = frame(
            "session_welcome",
            json!({"session": {"id": "abc", "keepalive_timeout_seconds": 10, "reconnect_url": null}}),
        );
        assert_eq!(
            parse_frame(&text).unwrap(),
            InboundMessage::Welcome {
                session_id: "abc".into(),
                keepalive_timeout_seconds: Some(10)
            }
        );
    }

    #[test]
    fn welcome_without_id_is_error() {
        let text = frame("session_welcome", json!({"session": {}}));
        assert_matches!(
            parse_frame(&text),
            Err(ParseError::MissingField("payload.session.id"))
        );
    }

    #[test]
    fn keepalive_without_payload() {
        let text = json!({"metadata": {"message_type": "session_keepalive"}}).to_string();
        assert_eq!(parse_frame(&text).unwrap(), InboundMessage::Keepalive);
    }

    #[test]
    fn notification() {
        let text = json!({
            "metadata": {"message_id": "n1", "message_type": "notification", "subscription_type": "channel.follow"},
            "payload": {"subscription": {"type": "channel.follow"}, "event": {"user_name": "viewer"}},
        })
        .to_string();
        assert_matches!(
            parse_frame(&text).unwrap(),
            InboundMessage::Notification { message_id: Some(id), subscription_type, event }
                if id == "n1" && subscription_type == "channel.follow" && event["user_name"] == "viewer"
        );
    }

    #[test]
    fn notification_without_event_is_error() {
        let text = json!({
            "metadata": {"message_type": "notification", "subscription_type": "channel.follow"},
            "payload": {},
        })
        .to_string();
        assert_matches!(parse_frame(&text), Err(ParseError::MissingField("payload.event")));
    }

    #[test]
    fn reconnect_with_and_without_url() {
        let with = frame(
            "session_reconnect",
            json!({"session": {"id": "abc", "reconnect_url": "wss://example/ws?id=2"}}),
        );
        assert_eq!(
            parse_frame(&with).unwrap(),
            InboundMessage::Reconnect {
                reconnect_url: Some("wss://example/ws?id=2".into())
            }
        );
        let without = frame("session_reconnect", json!({"session": {"id": "abc"}}));
        assert_eq!(
            parse_frame(&without).unwrap(),
            InboundMessage::Reconnect { reconnect_url: None }
        );
    }

    #[test]
    fn revocation_reasons() {
        let text = frame(
            "revocation",
            json!({"subscription": {"type": "channel.follow", "status": "authorization_revoked"}}),
        );
        assert_matches!(
            parse_frame(&text).unwrap(),
            InboundMessage::Revocation { subscription_type: Some(t), reason: RevocationReason::AuthorizationRevoked }
                if t == "channel.follow"
        );
        let other = frame("revocation", json!({"subscription": {"status": "mystery"}}));
        assert_matches!(
            parse_frame(&other).unwrap(),
            InboundMessage::Revocation { reason: RevocationReason::Other(s), .. } if s == "mystery"
        );
    }

    #[test]
    fn unknown_type_is_not_an_error() {
        let text = frame("something_new", json!({}));
        assert_eq!(
            parse_frame(&text).unwrap(),
            InboundMessage::Unknown("something_new".into())
        );
    }

    #[test]
    fn garbage_is_json_error() {
        assert_matches!(parse_frame("{not json"), Err(ParseError::Json(_)));
        assert_matches!(parse_frame(r#"{"payload": {}}"#), Err(ParseError::Json(_)));
    }
}
