//! Forum error types

use nostr::{KeyError, Nip01Error};
use nostr_client::ClientError;
use thiserror::Error;

/// Failures surfaced by forum operations.
#[derive(Debug, Error)]
pub enum ForumError {
    /// Caller-supplied value is unusable (bad key, bad id, empty text)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A single-result read found nothing
    #[error("not found: {0}")]
    NotFound(String),

    #[error("relay rejected event {event_id}: {reason}")]
    PublishRejected { event_id: String, reason: String },

    /// Connection-level failure
    #[error("transport error: {0}")]
    Transport(ClientError),

    /// Event content does not parse as the payload its kind requires
    #[error("malformed event {event_id}: {reason}")]
    MalformedEvent { event_id: String, reason: String },

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("config error: {0}")]
    Config(String),
}

impl ForumError {
    pub(crate) fn malformed(event_id: &str, reason: impl ToString) -> Self {
        ForumError::MalformedEvent {
            event_id: event_id.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<ClientError> for ForumError {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::PublishRejected { event_id, reason } => {
                ForumError::PublishRejected { event_id, reason }
            }
            ClientError::NotFound => ForumError::NotFound("no matching event".to_string()),
            ClientError::Timeout(message) => ForumError::Timeout(message),
            ClientError::InvalidUrl(message) => ForumError::InvalidInput(message),
            other => ForumError::Transport(other),
        }
    }
}

impl From<KeyError> for ForumError {
    fn from(error: KeyError) -> Self {
        ForumError::InvalidInput(error.to_string())
    }
}

impl From<Nip01Error> for ForumError {
    fn from(error: Nip01Error) -> Self {
        ForumError::InvalidInput(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ForumError>;
