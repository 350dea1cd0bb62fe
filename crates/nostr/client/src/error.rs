//! Errors surfaced by the relay connection.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("invalid relay url: {0}")]
    InvalidUrl(String),

    /// Failure while opening the socket or writing a frame.
    #[error("websocket: {0}")]
    WebSocket(String),

    #[error("no relay connection")]
    NotConnected,

    /// The connection ended, or was replaced, while the operation was in flight.
    #[error("relay connection closed")]
    ConnectionClosed,

    /// Relay answered `OK false`.
    #[error("event {event_id} rejected by relay: {reason}")]
    PublishRejected { event_id: String, reason: String },

    #[error("no matching event")]
    NotFound,

    /// Relay ended the subscription with `CLOSED`.
    #[error("subscription closed by relay: {0}")]
    SubscriptionClosed(String),

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("relay protocol violation: {0}")]
    Protocol(String),

    #[error("json: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        ClientError::InvalidUrl(err.to_string())
    }
}

impl From<crate::message::MessageError> for ClientError {
    fn from(err: crate::message::MessageError) -> Self {
        ClientError::Protocol(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
