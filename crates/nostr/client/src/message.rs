//! Relay wire messages (NIP-01).
//!
//! - Client to relay: `EVENT`, `REQ`, `CLOSE`
//! - Relay to client: `EVENT`, `OK`, `EOSE`, `CLOSED`, `NOTICE`, `AUTH`, `COUNT`

use crate::filter::Filter;
use nostr::Event;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("frame is not a message array: {0}")]
    InvalidFormat(String),

    #[error("unrecognised frame label `{0}`")]
    UnknownType(String),

    #[error("frame json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame lacks {0}")]
    MissingField(String),
}

/// Messages sent from client to relay.
#[derive(Debug, Clone)]
pub enum ClientMessage {
    /// `["EVENT", <event>]`
    Event(Event),

    /// `["REQ", <subscription_id>, <filter>...]`
    Req {
        subscription_id: String,
        filters: Vec<Filter>,
    },

    /// `["CLOSE", <subscription_id>]`
    Close { subscription_id: String },
}

impl ClientMessage {
    /// Serialize to the JSON array sent over the socket.
    pub fn to_json(&self) -> Result<String, MessageError> {
        let value = match self {
            ClientMessage::Event(event) => serde_json::json!(["EVENT", event]),
            ClientMessage::Req {
                subscription_id,
                filters,
            } => {
                let mut frame = Vec::with_capacity(filters.len() + 2);
                frame.push(Value::from("REQ"));
                frame.push(Value::from(subscription_id.as_str()));
                for filter in filters {
                    frame.push(serde_json::to_value(filter)?);
                }
                Value::Array(frame)
            }
            ClientMessage::Close { subscription_id } => serde_json::json!(["CLOSE", subscription_id]),
        };
        Ok(value.to_string())
    }

    /// Parse a client frame. Used by relays and test doubles.
    pub fn from_json(json: &str) -> Result<Self, MessageError> {
        let frame = parse_frame(json)?;
        match frame_type(&frame)? {
            "EVENT" => Ok(ClientMessage::Event(serde_json::from_value(
                field(&frame, 1, "event")?.clone(),
            )?)),
            "REQ" => {
                let subscription_id = string_field(&frame, 1, "subscription_id")?;
                let filters = frame[2..]
                    .iter()
                    .map(|value| serde_json::from_value(value.clone()))
                    .collect::<Result<Vec<Filter>, _>>()?;
                Ok(ClientMessage::Req {
                    subscription_id,
                    filters,
                })
            }
            "CLOSE" => Ok(ClientMessage::Close {
                subscription_id: string_field(&frame, 1, "subscription_id")?,
            }),
            other => Err(MessageError::UnknownType(other.to_string())),
        }
    }
}

/// Messages sent from relay to client.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayMessage {
    /// `["EVENT", <subscription_id>, <event>]`
    Event {
        subscription_id: String,
        event: Event,
    },

    /// `["OK", <event_id>, <accepted>, <message>]`
    Ok {
        event_id: String,
        success: bool,
        message: String,
    },

    /// `["EOSE", <subscription_id>]`
    Eose { subscription_id: String },

    /// `["CLOSED", <subscription_id>, <message>]`
    Closed {
        subscription_id: String,
        message: String,
    },

    /// `["NOTICE", <message>]`
    Notice { message: String },

    /// `["AUTH", <challenge>]`
    Auth { challenge: String },

    /// `["COUNT", <subscription_id>, {"count": <n>}]`
    Count { subscription_id: String, count: u64 },
}

impl RelayMessage {
    /// Parse a JSON message from the relay.
    pub fn from_json(json: &str) -> Result<Self, MessageError> {
        let frame = parse_frame(json)?;

        match frame_type(&frame)? {
            "EVENT" => Ok(RelayMessage::Event {
                subscription_id: string_field(&frame, 1, "subscription_id")?,
                event: serde_json::from_value(field(&frame, 2, "event")?.clone())?,
            }),
            "OK" => {
                let success = field(&frame, 2, "accepted")?.as_bool().ok_or_else(|| {
                    MessageError::InvalidFormat("accepted flag not a boolean".to_string())
                })?;
                Ok(RelayMessage::Ok {
                    event_id: string_field(&frame, 1, "event_id")?,
                    success,
                    message: optional_string(&frame, 3),
                })
            }
            "EOSE" => Ok(RelayMessage::Eose {
                subscription_id: string_field(&frame, 1, "subscription_id")?,
            }),
            "CLOSED" => Ok(RelayMessage::Closed {
                subscription_id: string_field(&frame, 1, "subscription_id")?,
                message: optional_string(&frame, 2),
            }),
            "NOTICE" => Ok(RelayMessage::Notice {
                message: string_field(&frame, 1, "message")?,
            }),
            "AUTH" => Ok(RelayMessage::Auth {
                challenge: string_field(&frame, 1, "challenge")?,
            }),
            "COUNT" => {
                let count = field(&frame, 2, "count")?
                    .get("count")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| MessageError::MissingField("count value".to_string()))?;
                Ok(RelayMessage::Count {
                    subscription_id: string_field(&frame, 1, "subscription_id")?,
                    count,
                })
            }
            other => Err(MessageError::UnknownType(other.to_string())),
        }
    }

    /// Serialize to a JSON array. Used by relays and test doubles.
    pub fn to_json(&self) -> String {
        let value = match self {
            RelayMessage::Event {
                subscription_id,
                event,
            } => serde_json::json!(["EVENT", subscription_id, event]),
            RelayMessage::Ok {
                event_id,
                success,
                message,
            } => serde_json::json!(["OK", event_id, success, message]),
            RelayMessage::Eose { subscription_id } => serde_json::json!(["EOSE", subscription_id]),
            RelayMessage::Closed {
                subscription_id,
                message,
            } => serde_json::json!(["CLOSED", subscription_id, message]),
            RelayMessage::Notice { message } => serde_json::json!(["NOTICE", message]),
            RelayMessage::Auth { challenge } => serde_json::json!(["AUTH", challenge]),
            RelayMessage::Count {
                subscription_id,
                count,
            } => serde_json::json!(["COUNT", subscription_id, { "count": count }]),
        };
        value.to_string()
    }
}

fn parse_frame(json: &str) -> Result<Vec<Value>, MessageError> {
    let frame: Vec<Value> =
        serde_json::from_str(json).map_err(|e| MessageError::InvalidFormat(e.to_string()))?;
    if frame.is_empty() {
        return Err(MessageError::InvalidFormat("empty array".to_string()));
    }
    Ok(frame)
}

fn frame_type(frame: &[Value]) -> Result<&str, MessageError> {
    frame[0]
        .as_str()
        .ok_or_else(|| MessageError::InvalidFormat("first element not a string".to_string()))
}

fn field<'a>(frame: &'a [Value], index: usize, name: &str) -> Result<&'a Value, MessageError> {
    frame
        .get(index)
        .ok_or_else(|| MessageError::MissingField(name.to_string()))
}

fn string_field(frame: &[Value], index: usize, name: &str) -> Result<String, MessageError> {
    field(frame, index, name)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| MessageError::InvalidFormat(format!("{} not a string", name)))
}

fn optional_string(frame: &[Value], index: usize) -> String {
    frame
        .get(index)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> Event {
        Event {
            id: "f00d".repeat(16),
            pubkey: "beef".repeat(16),
            created_at: 1_700_000_000,
            kind: 42,
            tags: vec![vec!["t".to_string(), "nostr-forum".to_string()]],
            content: "first!".to_string(),
            sig: "00".repeat(64),
        }
    }

    #[test]
    fn test_client_message_event() {
        let json = ClientMessage::Event(event()).to_json().unwrap();
        assert!(json.starts_with(r#"["EVENT",{"#));
        assert!(json.contains(&"f00d".repeat(16)));
    }

    #[test]
    fn test_client_message_req_roundtrip() {
        let msg = ClientMessage::Req {
            subscription_id: "sub1".to_string(),
            filters: vec![
                Filter::new().kinds(vec![40]).limit(10),
                Filter::new().ids(vec!["x".to_string()]),
            ],
        };

        let json = msg.to_json().unwrap();
        assert_eq!(json, r#"["REQ","sub1",{"kinds":[40],"limit":10},{"ids":["x"]}]"#);

        match ClientMessage::from_json(&json).unwrap() {
            ClientMessage::Req {
                subscription_id,
                filters,
            } => {
                assert_eq!(subscription_id, "sub1");
                assert_eq!(filters.len(), 2);
                assert_eq!(filters[0].limit, Some(10));
            }
            other => panic!("wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_client_message_close() {
        let msg = ClientMessage::Close {
            subscription_id: "sub1".to_string(),
        };
        assert_eq!(msg.to_json().unwrap(), r#"["CLOSE","sub1"]"#);
    }

    #[test]
    fn test_relay_message_event() {
        let json = r#"["EVENT","threads",{"id":"e1","pubkey":"p1","created_at":1700000000,"kind":40,"tags":[["t","nostr-forum"]],"content":"{}","sig":"s1"}]"#;

        match RelayMessage::from_json(json).unwrap() {
            RelayMessage::Event {
                subscription_id,
                event,
            } => {
                assert_eq!(subscription_id, "threads");
                assert_eq!(event.id, "e1");
                assert_eq!(event.kind, 40);
                assert!(event.has_tag_value("t", "nostr-forum"));
            }
            other => panic!("wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_relay_message_ok() {
        assert_eq!(
            RelayMessage::from_json(r#"["OK","event123",true,""]"#).unwrap(),
            RelayMessage::Ok {
                event_id: "event123".to_string(),
                success: true,
                message: String::new(),
            }
        );

        match RelayMessage::from_json(r#"["OK","event123",false,"blocked: spam"]"#).unwrap() {
            RelayMessage::Ok {
                success, message, ..
            } => {
                assert!(!success);
                assert_eq!(message, "blocked: spam");
            }
            other => panic!("wrong message type: {:?}", other),
        }

        // Some relays omit the message
        assert!(RelayMessage::from_json(r#"["OK","event123",true]"#).is_ok());
        assert!(RelayMessage::from_json(r#"["OK","event123","yes",""]"#).is_err());
    }

    #[test]
    fn test_relay_message_control_frames() {
        assert_eq!(
            RelayMessage::from_json(r#"["EOSE","sub1"]"#).unwrap(),
            RelayMessage::Eose {
                subscription_id: "sub1".to_string()
            }
        );
        assert_eq!(
            RelayMessage::from_json(r#"["CLOSED","sub1","error: too many subscriptions"]"#)
                .unwrap(),
            RelayMessage::Closed {
                subscription_id: "sub1".to_string(),
                message: "error: too many subscriptions".to_string(),
            }
        );
        assert_eq!(
            RelayMessage::from_json(r#"["NOTICE","rate limited"]"#).unwrap(),
            RelayMessage::Notice {
                message: "rate limited".to_string()
            }
        );
        assert_eq!(
            RelayMessage::from_json(r#"["AUTH","challenge123"]"#).unwrap(),
            RelayMessage::Auth {
                challenge: "challenge123".to_string()
            }
        );
        assert_eq!(
            RelayMessage::from_json(r#"["COUNT","sub1",{"count":42}]"#).unwrap(),
            RelayMessage::Count {
                subscription_id: "sub1".to_string(),
                count: 42
            }
        );
    }

    #[test]
    fn test_relay_message_to_json_parses_back() {
        let messages = vec![
            RelayMessage::Event {
                subscription_id: "s".to_string(),
                event: event(),
            },
            RelayMessage::Ok {
                event_id: "abc123".to_string(),
                success: false,
                message: "invalid: bad signature".to_string(),
            },
            RelayMessage::Closed {
                subscription_id: "s".to_string(),
                message: "auth-required:".to_string(),
            },
        ];

        for msg in messages {
            assert_eq!(RelayMessage::from_json(&msg.to_json()).unwrap(), msg);
        }
    }

    #[test]
    fn test_invalid_message() {
        assert!(RelayMessage::from_json("not valid json").is_err());
        assert!(RelayMessage::from_json("[]").is_err());
        assert!(RelayMessage::from_json("[1]").is_err());
        assert!(RelayMessage::from_json(r#"["EVENT","sub1"]"#).is_err());
        assert!(matches!(
            RelayMessage::from_json(r#"["UNKNOWN"]"#),
            Err(MessageError::UnknownType(_))
        ));
    }
}
