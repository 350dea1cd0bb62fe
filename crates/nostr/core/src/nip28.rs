//! NIP-28: Public Chat, used here for forum threads.
//!
//! - kind 40 creates a thread; its content is JSON [`ThreadMetadata`]
//! - kind 41 updates a thread's metadata; it points at the thread with a
//!   `root` e-tag
//! - kind 42 is a message inside a thread (replies and comments)
//!
//! See: <https://github.com/nostr-protocol/nips/blob/master/28.md>

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Thread creation event kind
pub const KIND_THREAD_CREATION: u16 = 40;

/// Thread metadata update kind
pub const KIND_THREAD_METADATA: u16 = 41;

/// Thread message kind
pub const KIND_THREAD_MESSAGE: u16 = 42;

#[derive(Debug, Error)]
pub enum Nip28Error {
    #[error("invalid thread metadata: {0}")]
    InvalidMetadata(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Name, body and picture of a thread.
///
/// Missing fields deserialize as empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ThreadMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub about: String,
    #[serde(default)]
    pub picture: String,
}

impl ThreadMetadata {
    pub fn new(name: impl Into<String>, about: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            about: about.into(),
            picture: String::new(),
        }
    }

    pub fn with_picture(mut self, picture: impl Into<String>) -> Self {
        self.picture = picture.into();
        self
    }

    /// Parse thread content. The content must be a JSON object.
    pub fn from_json(json: &str) -> Result<Self, Nip28Error> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        if !value.is_object() {
            return Err(Nip28Error::InvalidMetadata(
                "content is not a JSON object".to_string(),
            ));
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_json(&self) -> Result<String, Nip28Error> {
        Ok(serde_json::to_string(self)?)
    }
}
