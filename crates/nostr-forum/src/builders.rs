//! Forum actions as unsigned event templates.
//!
//! Every template carries `["t", namespace]`. References to threads and
//! replies use NIP-10 marked `e` tags with the session relay as the hint.

use crate::error::{ForumError, Result};
use nostr::{
    DELETION_REQUEST_KIND, ETagMarker, Event, EventReference, EventTemplate,
    KIND_METADATA, KIND_THREAD_CREATION, KIND_THREAD_MESSAGE, KIND_THREAD_METADATA, Metadata,
    REACTION_KIND, ThreadMetadata, Vote, ZAP_REQUEST_KIND, create_deletion_tags,
    create_reaction_tags, pubkey_tag, zap_request_tags,
};

/// Builds forum event templates for one namespace and relay.
#[derive(Debug, Clone)]
pub struct ForumEvents {
    namespace: String,
    relay_hint: Option<String>,
}

impl ForumEvents {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            relay_hint: None,
        }
    }

    /// Relay URL written into marked `e` tags.
    pub fn with_relay_hint(mut self, relay: Option<String>) -> Self {
        self.relay_hint = relay;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn namespace_tag(&self) -> Vec<String> {
        vec!["t".to_string(), self.namespace.clone()]
    }

    fn marked_ref(&self, event_id: &str, marker: ETagMarker) -> Vec<String> {
        EventReference::marked(event_id, self.relay_hint.clone(), marker).to_tag()
    }

    /// Kind 40 with `{name, about, picture}` content.
    pub fn create_thread(&self, metadata: &ThreadMetadata, created_at: u64) -> Result<EventTemplate> {
        if metadata.name.trim().is_empty() {
            return Err(ForumError::InvalidInput("thread name is empty".into()));
        }
        Ok(EventTemplate::new(
            KIND_THREAD_CREATION,
            vec![self.namespace_tag()],
            thread_content(metadata)?,
            created_at,
        ))
    }

    /// Kind 41 replacing the thread's metadata.
    pub fn update_thread(
        &self,
        thread_id: &str,
        metadata: &ThreadMetadata,
        created_at: u64,
    ) -> Result<EventTemplate> {
        require_hex_key("thread id", thread_id)?;
        Ok(EventTemplate::new(
            KIND_THREAD_METADATA,
            vec![
                self.marked_ref(thread_id, ETagMarker::Root),
                self.namespace_tag(),
            ],
            thread_content(metadata)?,
            created_at,
        ))
    }

    /// Kind 42 reply to a thread, plain-text content.
    pub fn post_reply(&self, thread_id: &str, text: &str, created_at: u64) -> Result<EventTemplate> {
        require_hex_key("thread id", thread_id)?;
        require_text(text)?;
        Ok(EventTemplate::new(
            KIND_THREAD_MESSAGE,
            vec![
                self.marked_ref(thread_id, ETagMarker::Root),
                self.namespace_tag(),
            ],
            text,
            created_at,
        ))
    }

    /// Kind 42 comment on a reply, mentioning the reply's author.
    pub fn post_comment(
        &self,
        reply_id: &str,
        reply_author: &str,
        text: &str,
        created_at: u64,
    ) -> Result<EventTemplate> {
        require_hex_key("reply id", reply_id)?;
        require_hex_key("reply author", reply_author)?;
        require_text(text)?;
        Ok(EventTemplate::new(
            KIND_THREAD_MESSAGE,
            vec![
                self.marked_ref(reply_id, ETagMarker::Reply),
                pubkey_tag(reply_author),
                self.namespace_tag(),
            ],
            text,
            created_at,
        ))
    }

    /// Kind 7 with content `+` or `-`.
    pub fn vote(
        &self,
        target_id: &str,
        target_author: &str,
        vote: Vote,
        created_at: u64,
    ) -> Result<EventTemplate> {
        require_hex_key("target id", target_id)?;
        require_hex_key("target author", target_author)?;
        let mut tags = create_reaction_tags(target_id, target_author);
        tags.push(self.namespace_tag());
        Ok(EventTemplate::new(REACTION_KIND, tags, vote.as_str(), created_at))
    }

    /// Kind 9734 zap request. Signed by the caller and handed off, never published.
    pub fn payment_request(
        &self,
        target_id: &str,
        recipient: &str,
        amount_msats: u64,
        relays: &[String],
        created_at: u64,
    ) -> Result<EventTemplate> {
        require_hex_key("target id", target_id)?;
        require_hex_key("recipient", recipient)?;
        if amount_msats == 0 {
            return Err(ForumError::InvalidInput("amount must be positive".into()));
        }
        let mut tags = zap_request_tags(target_id, recipient, amount_msats, relays);
        tags.push(self.namespace_tag());
        Ok(EventTemplate::new(ZAP_REQUEST_KIND, tags, "", created_at))
    }

    /// Kind 0, full replacement of the author's profile.
    pub fn update_profile(&self, metadata: &Metadata, created_at: u64) -> Result<EventTemplate> {
        let content = metadata
            .to_json()
            .map_err(|e| ForumError::InvalidInput(e.to_string()))?;
        Ok(EventTemplate::new(
            KIND_METADATA,
            vec![self.namespace_tag()],
            content,
            created_at,
        ))
    }

    /// Kind 5 deletion request for one event.
    pub fn delete(&self, target_id: &str, reason: Option<&str>, created_at: u64) -> Result<EventTemplate> {
        require_hex_key("target id", target_id)?;
        let mut tags = create_deletion_tags(&[target_id.to_string()])
            .map_err(|e| ForumError::InvalidInput(e.to_string()))?;
        tags.push(self.namespace_tag());
        Ok(EventTemplate::new(
            DELETION_REQUEST_KIND,
            tags,
            reason.unwrap_or_default(),
            created_at,
        ))
    }
}

fn thread_content(metadata: &ThreadMetadata) -> Result<String> {
    metadata
        .to_json()
        .map_err(|e| ForumError::InvalidInput(e.to_string()))
}

fn require_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(ForumError::InvalidInput("message text is empty".into()));
    }
    Ok(())
}

/// Event ids and public keys are 32 bytes of lowercase hex.
pub(crate) fn require_hex_key(label: &str, value: &str) -> Result<()> {
    let valid = value.len() == 64
        && value
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if valid {
        Ok(())
    } else {
        Err(ForumError::InvalidInput(format!(
            "{} must be 64 lowercase hex characters: {:?}",
            label, value
        )))
    }
}

/// A signed zap request ready for the payment collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequestBlob {
    event: Event,
}

impl PaymentRequestBlob {
    pub(crate) fn new(event: Event) -> Self {
        Self { event }
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn id(&self) -> &str {
        &self.event.id
    }

    /// JSON encoding of the signed event, the form LNURL servers accept as `nostr=`.
    pub fn as_json(&self) -> String {
        serde_json::to_string(&self.event).unwrap_or_default()
    }

    pub fn into_event(self) -> Event {
        self.event
    }
}
