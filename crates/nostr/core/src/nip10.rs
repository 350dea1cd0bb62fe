//! NIP-10: e-tag and p-tag conventions for threading.
//!
//! Forum messages point at their parents with marked e-tags
//! (`["e", <id>, <relay>, <marker>]`) and at participants with p-tags.
//!
//! See: <https://github.com/nostr-protocol/nips/blob/master/10.md>

use crate::Event;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Nip10Error {
    #[error("malformed e-tag: {0}")]
    InvalidETag(String),
}

/// Role of a referenced event, the fourth e-tag element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ETagMarker {
    Root,
    Reply,
    /// Cited without being a parent.
    Mention,
}

impl ETagMarker {
    pub fn as_str(&self) -> &'static str {
        match self {
            ETagMarker::Root => "root",
            ETagMarker::Reply => "reply",
            ETagMarker::Mention => "mention",
        }
    }
}

impl FromStr for ETagMarker {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "root" => Ok(ETagMarker::Root),
            "reply" => Ok(ETagMarker::Reply),
            "mention" => Ok(ETagMarker::Mention),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventReference {
    pub event_id: String,
    /// Relay hint; `None` when the slot is missing or empty.
    pub relay_url: Option<String>,
    pub marker: Option<ETagMarker>,
}

impl EventReference {
    /// Plain reference without relay hint or marker.
    pub fn new(event_id: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            relay_url: None,
            marker: None,
        }
    }

    /// Marked reference with an optional relay hint.
    pub fn marked(event_id: impl Into<String>, relay_url: Option<String>, marker: ETagMarker) -> Self {
        Self {
            event_id: event_id.into(),
            relay_url,
            marker: Some(marker),
        }
    }

    /// Reads `["e", id, relay?, marker?]`. An empty relay slot or an
    /// unrecognised marker is treated as absent.
    pub fn from_tag(tag: &[String]) -> Result<Self, Nip10Error> {
        let [name, event_id, rest @ ..] = tag else {
            return Err(Nip10Error::InvalidETag(format!(
                "expected at least 2 elements, got {}",
                tag.len()
            )));
        };
        if name != "e" {
            return Err(Nip10Error::InvalidETag(format!("`{name}` is not an e-tag")));
        }

        Ok(Self {
            event_id: event_id.clone(),
            relay_url: rest.first().filter(|url| !url.is_empty()).cloned(),
            marker: rest.get(1).and_then(|marker| marker.parse().ok()),
        })
    }

    /// Convert to an e-tag array.
    ///
    /// A bare reference stays two elements long; relay and marker slots are
    /// only filled when a marker is present.
    pub fn to_tag(&self) -> Vec<String> {
        let mut tag = vec!["e".to_string(), self.event_id.clone()];

        if let Some(marker) = self.marker {
            tag.push(self.relay_url.clone().unwrap_or_default());
            tag.push(marker.as_str().to_string());
        } else if let Some(ref relay) = self.relay_url {
            tag.push(relay.clone());
        }

        tag
    }
}

/// A p-tag mentioning a participant.
pub fn pubkey_tag(pubkey: impl Into<String>) -> Vec<String> {
    vec!["p".to_string(), pubkey.into()]
}

/// Parsed e/p references of an event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ThreadReferences {
    pub event_references: Vec<EventReference>,
    pub mentioned_pubkeys: Vec<String>,
}

impl ThreadReferences {
    /// Collect references from an event, skipping malformed e-tags.
    pub fn from_event(event: &Event) -> Self {
        let event_references = event
            .tags_named("e")
            .filter_map(|tag| EventReference::from_tag(tag).ok())
            .collect();
        let mentioned_pubkeys = event
            .tags_named("p")
            .filter_map(|tag| tag.get(1).cloned())
            .collect();

        Self {
            event_references,
            mentioned_pubkeys,
        }
    }

    /// The reference marked `marker`, if any.
    pub fn marked(&self, marker: ETagMarker) -> Option<&EventReference> {
        self.event_references
            .iter()
            .find(|eref| eref.marker == Some(marker))
    }

    /// Root of the thread: the `root`-marked reference, otherwise the first e-tag.
    pub fn root(&self) -> Option<&EventReference> {
        self.marked(ETagMarker::Root)
            .or_else(|| self.event_references.first())
    }

    /// Immediate parent: the `reply`-marked reference, otherwise the last e-tag.
    pub fn reply_target(&self) -> Option<&EventReference> {
        self.marked(ETagMarker::Reply)
            .or_else(|| self.event_references.last())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_with(tags: Vec<Vec<String>>) -> Event {
        Event {
            id: "1".repeat(64),
            pubkey: "2".repeat(64),
            created_at: 1_700_000_000,
            kind: 42,
            tags,
            content: "same question here".to_string(),
            sig: "0".repeat(128),
        }
    }

    fn e_tag(id: &str, marker: &str) -> Vec<String> {
        vec!["e".to_string(), id.to_string(), String::new(), marker.to_string()]
    }

    #[test]
    fn test_etag_marker_from_str() {
        assert_eq!(ETagMarker::from_str("root"), Ok(ETagMarker::Root));
        assert_eq!(ETagMarker::from_str("reply"), Ok(ETagMarker::Reply));
        assert_eq!(ETagMarker::from_str("mention"), Ok(ETagMarker::Mention));
        assert!(ETagMarker::from_str("unknown").is_err());
    }

    #[test]
    fn test_event_reference_from_tag_minimal() {
        let tag = vec!["e".to_string(), "event123".to_string()];
        let eref = EventReference::from_tag(&tag).unwrap();

        assert_eq!(eref, EventReference::new("event123"));
    }

    #[test]
    fn test_event_reference_from_tag_with_marker() {
        let tag = vec![
            "e".to_string(),
            "event123".to_string(),
            "wss://relay.com".to_string(),
            "root".to_string(),
        ];
        let eref = EventReference::from_tag(&tag).unwrap();

        assert_eq!(eref.event_id, "event123");
        assert_eq!(eref.relay_url.as_deref(), Some("wss://relay.com"));
        assert_eq!(eref.marker, Some(ETagMarker::Root));
    }

    #[test]
    fn test_event_reference_rejects_other_tags() {
        assert!(EventReference::from_tag(&["p".to_string(), "x".to_string()]).is_err());
        assert!(EventReference::from_tag(&["e".to_string()]).is_err());
        assert!(EventReference::from_tag(&[]).is_err());
    }

    #[test]
    fn test_event_reference_to_tag() {
        let marked = EventReference::marked("event123", None, ETagMarker::Reply);
        assert_eq!(marked.to_tag(), vec!["e", "event123", "", "reply"]);

        let bare = EventReference::new("event123");
        assert_eq!(bare.to_tag(), vec!["e", "event123"]);
    }

    #[test]
    fn test_thread_references_with_markers() {
        let event = message_with(vec![
            e_tag("root123", "root"),
            e_tag("parent456", "reply"),
            pubkey_tag("someone"),
        ]);
        let refs = ThreadReferences::from_event(&event);

        assert_eq!(refs.root().unwrap().event_id, "root123");
        assert_eq!(refs.reply_target().unwrap().event_id, "parent456");
        assert_eq!(refs.mentioned_pubkeys, vec!["someone".to_string()]);
    }

    #[test]
    fn test_thread_references_positional_fallback() {
        let event = message_with(vec![
            vec!["e".to_string(), "first".to_string()],
            vec!["e".to_string(), "last".to_string()],
        ]);
        let refs = ThreadReferences::from_event(&event);

        assert_eq!(refs.root().unwrap().event_id, "first");
        assert_eq!(refs.reply_target().unwrap().event_id, "last");
    }

    #[test]
    fn test_thread_references_empty() {
        let refs = ThreadReferences::from_event(&message_with(vec![]));
        assert!(refs.root().is_none());
        assert!(refs.reply_target().is_none());
        assert!(refs.marked(ETagMarker::Reply).is_none());
    }
}
