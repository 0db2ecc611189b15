//! hubsub_wire
//!
//! Protocol frame definitions shared by the broker core and the transports.
//! The protocol is JSON; every frame is an internally tagged object whose
//! `type` field selects the variant.
//!
//! Inbound frames (`ClientFrame`) arrive over the WebSocket and are parsed
//! before any broker state is touched, so malformed input never reaches the
//! core. Outbound frames (`ServerFrame`) all carry a UTC timestamp rendered
//! as RFC 3339 with millisecond precision and a trailing `Z`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Lifecycle notification sent to subscribers of a deleted topic.
pub const INFO_TOPIC_DELETED: &str = "topic_deleted";
/// Lifecycle notification broadcast to every subscriber during shutdown.
pub const INFO_SERVER_SHUTDOWN: &str = "server_shutdown";

/// A published message: client-supplied id plus an opaque JSON payload.
///
/// The id is typed as a `Uuid`; publish frames carry it as a string and the
/// transport validates it (see [`RawMessage`]) before constructing one of
/// these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub payload: Value,
}

/// Publish body exactly as it arrives on the wire. The id stays a plain
/// string until it has been checked to parse as a UUID, so a bad id can be
/// reported back with the client's `request_id` instead of failing frame
/// deserialization wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: String,
    pub payload: Value,
}

impl TryFrom<RawMessage> for Message {
    type Error = uuid::Error;

    fn try_from(raw: RawMessage) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&raw.id)?,
            payload: raw.payload,
        })
    }
}

/// Error codes carried by outbound `error` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    BadRequest,
    TopicNotFound,
    SlowConsumer,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: ErrorCode,
    pub message: String,
}

/// Client-to-server frames. Unknown `type` values or missing required
/// fields fail deserialization and are answered with a `bad_request` error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe {
        topic: String,
        client_id: String,
        #[serde(default)]
        last_n: usize,
        #[serde(default)]
        request_id: Option<String>,
    },
    Unsubscribe {
        topic: String,
        client_id: String,
        #[serde(default)]
        request_id: Option<String>,
    },
    Publish {
        topic: String,
        message: RawMessage,
        #[serde(default)]
        request_id: Option<String>,
    },
    Ping {
        #[serde(default)]
        request_id: Option<String>,
    },
}

/// Server-to-client frames. Optional fields are omitted from the JSON when
/// absent, matching the shape clients correlate on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Ack {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        topic: Option<String>,
        status: String,
        ts: String,
    },
    Event {
        topic: String,
        message: Message,
        ts: String,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        error: ErrorDetail,
        ts: String,
    },
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        ts: String,
    },
    Info {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        topic: Option<String>,
        msg: String,
        ts: String,
    },
}

impl ServerFrame {
    pub fn ack(topic: Option<String>, request_id: Option<String>) -> Self {
        Self::Ack {
            request_id,
            topic,
            status: "ok".to_string(),
            ts: now_ts(),
        }
    }

    /// An `event` frame keeps the timestamp assigned when the message was
    /// published, both for live deliveries and history replay.
    pub fn event(topic: String, message: Message, ts: DateTime<Utc>) -> Self {
        Self::Event {
            topic,
            message,
            ts: format_ts(ts),
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>, request_id: Option<String>) -> Self {
        Self::Error {
            request_id,
            error: ErrorDetail {
                code,
                message: message.into(),
            },
            ts: now_ts(),
        }
    }

    pub fn pong(request_id: Option<String>) -> Self {
        Self::Pong {
            request_id,
            ts: now_ts(),
        }
    }

    pub fn info(topic: Option<String>, msg: impl Into<String>) -> Self {
        Self::Info {
            topic,
            msg: msg.into(),
            ts: now_ts(),
        }
    }
}

/// Render a UTC timestamp the way every outbound frame carries it:
/// RFC 3339, millisecond precision, `Z` suffix.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_ts() -> String {
    format_ts(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn subscribe_frame_applies_defaults() {
        let frame: ClientFrame =
            serde_json::from_value(json!({"type": "subscribe", "topic": "t", "client_id": "c1"}))
                .unwrap();
        match frame {
            ClientFrame::Subscribe {
                topic,
                client_id,
                last_n,
                request_id,
            } => {
                assert_eq!(topic, "t");
                assert_eq!(client_id, "c1");
                assert_eq!(last_n, 0);
                assert!(request_id.is_none());
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn unknown_frame_type_is_rejected() {
        let result = serde_json::from_value::<ClientFrame>(json!({"type": "bogus"}));
        assert!(result.is_err());
    }

    #[test]
    fn subscribe_without_client_id_is_rejected() {
        let result = serde_json::from_value::<ClientFrame>(json!({"type": "subscribe", "topic": "t"}));
        assert!(result.is_err());
    }

    #[test]
    fn error_codes_serialize_snake_case() {
        assert_eq!(
            serde_json::to_value(ErrorCode::BadRequest).unwrap(),
            json!("bad_request")
        );
        assert_eq!(
            serde_json::to_value(ErrorCode::TopicNotFound).unwrap(),
            json!("topic_not_found")
        );
        assert_eq!(
            serde_json::to_value(ErrorCode::SlowConsumer).unwrap(),
            json!("slow_consumer")
        );
    }

    #[test]
    fn ack_omits_absent_optional_fields() {
        let value = serde_json::to_value(ServerFrame::ack(None, None)).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object["type"], "ack");
        assert_eq!(object["status"], "ok");
        assert!(!object.contains_key("request_id"));
        assert!(!object.contains_key("topic"));
        assert!(object.contains_key("ts"));
    }

    #[test]
    fn timestamps_are_rfc3339_utc_millis() {
        let ts = now_ts();
        assert!(ts.ends_with('Z'), "no Z suffix: {ts}");
        let parsed = DateTime::parse_from_rfc3339(&ts).unwrap();
        assert_eq!(parsed.timezone().utc_minus_local(), 0);
        // Millisecond precision keeps three fractional digits.
        let fraction = ts.split('.').nth(1).unwrap();
        assert_eq!(fraction.len(), "000Z".len());
    }

    #[test]
    fn raw_message_with_invalid_uuid_fails_conversion() {
        let raw = RawMessage {
            id: "123".to_string(),
            payload: json!({"n": 1}),
        };
        assert!(Message::try_from(raw).is_err());
    }

    #[test]
    fn event_frame_round_trips() {
        let message = Message {
            id: Uuid::new_v4(),
            payload: json!({"n": 1}),
        };
        let frame = ServerFrame::event("orders".to_string(), message.clone(), Utc::now());
        let text = serde_json::to_string(&frame).unwrap();
        match serde_json::from_str::<ServerFrame>(&text).unwrap() {
            ServerFrame::Event { topic, message: m, .. } => {
                assert_eq!(topic, "orders");
                assert_eq!(m, message);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}
