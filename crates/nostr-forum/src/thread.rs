//! Threads, replies and comments projected from relay events.
//!
//! Nothing here is stored; every value is rebuilt from the events a query
//! returns. Single-event parsing fails with `MalformedEvent`; the listing
//! folds skip bad events instead.

use crate::error::{ForumError, Result};
use nostr::{
    ETagMarker, Event, KIND_THREAD_CREATION, KIND_THREAD_MESSAGE, KIND_THREAD_METADATA,
    ThreadMetadata, ThreadReferences, get_deletion_reason, should_delete_event,
};
use std::cmp::Ordering;
use tracing::{debug, warn};

/// A forum thread: a kind-40 event plus its latest metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thread {
    pub id: String,
    pub author: String,
    pub created_at: u64,
    pub metadata: ThreadMetadata,
    /// `created_at` of the kind-41 update currently applied
    pub updated_at: Option<u64>,
}

impl Thread {
    pub fn from_event(event: &Event) -> Result<Self> {
        if event.kind != KIND_THREAD_CREATION {
            return Err(ForumError::malformed(
                &event.id,
                format!("expected kind {}, got {}", KIND_THREAD_CREATION, event.kind),
            ));
        }
        let metadata = ThreadMetadata::from_json(&event.content)
            .map_err(|e| ForumError::malformed(&event.id, e))?;

        Ok(Self {
            id: event.id.clone(),
            author: event.pubkey.clone(),
            created_at: event.created_at,
            metadata,
            updated_at: None,
        })
    }

    /// Apply the newest valid kind-41 update written by the thread's author.
    ///
    /// Updates from other authors, for other threads, or with unparseable
    /// content are ignored.
    pub fn apply_updates(&mut self, updates: &[Event]) {
        let mut candidates: Vec<&Event> = updates
            .iter()
            .filter(|event| {
                event.kind == KIND_THREAD_METADATA
                    && event.pubkey == self.author
                    && ThreadReferences::from_event(event)
                        .root()
                        .is_some_and(|root| root.event_id == self.id)
            })
            .collect();
        candidates.sort_by(|a, b| newest_first(a, b));

        for update in candidates {
            match ThreadMetadata::from_json(&update.content) {
                Ok(metadata) => {
                    self.metadata = metadata;
                    self.updated_at = Some(update.created_at);
                    return;
                }
                Err(e) => warn!("Skipping malformed thread update {}: {}", update.id, e),
            }
        }
    }
}

/// A kind-42 message answering a thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub id: String,
    pub thread_id: String,
    pub author: String,
    pub created_at: u64,
    pub content: String,
}

impl Reply {
    /// Parse a reply. The event must carry a root-marked `e` tag.
    pub fn from_event(event: &Event) -> Result<Self> {
        require_message_kind(event)?;
        let references = ThreadReferences::from_event(event);
        let root = references
            .marked(ETagMarker::Root)
            .ok_or_else(|| ForumError::malformed(&event.id, "reply has no root reference"))?;

        Ok(Self {
            id: event.id.clone(),
            thread_id: root.event_id.clone(),
            author: event.pubkey.clone(),
            created_at: event.created_at,
            content: event.content.clone(),
        })
    }
}

/// A kind-42 message commenting on a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub id: String,
    pub reply_id: String,
    /// Author of the reply, from the `p` tag
    pub reply_author: Option<String>,
    pub author: String,
    pub created_at: u64,
    pub content: String,
}

impl Comment {
    /// Parse a comment. The event must carry a reply-marked `e` tag.
    pub fn from_event(event: &Event) -> Result<Self> {
        require_message_kind(event)?;
        let references = ThreadReferences::from_event(event);
        let target = references
            .marked(ETagMarker::Reply)
            .ok_or_else(|| ForumError::malformed(&event.id, "comment has no reply reference"))?;

        Ok(Self {
            id: event.id.clone(),
            reply_id: target.event_id.clone(),
            reply_author: references.mentioned_pubkeys.first().cloned(),
            author: event.pubkey.clone(),
            created_at: event.created_at,
            content: event.content.clone(),
        })
    }
}

fn require_message_kind(event: &Event) -> Result<()> {
    if event.kind == KIND_THREAD_MESSAGE {
        Ok(())
    } else {
        Err(ForumError::malformed(
            &event.id,
            format!("expected kind {}, got {}", KIND_THREAD_MESSAGE, event.kind),
        ))
    }
}

/// Newest first; equal timestamps put the larger id first.
fn newest_first(a: &Event, b: &Event) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.id.cmp(&a.id))
}

/// Whether the author of `target` asked for it to be deleted.
pub fn is_deleted(target: &Event, deletions: &[Event]) -> bool {
    match deletions
        .iter()
        .find(|deletion| should_delete_event(target, deletion))
    {
        Some(deletion) => {
            debug!(
                "Hiding {} (deleted: {})",
                target.id,
                get_deletion_reason(deletion).unwrap_or("no reason given")
            );
            true
        }
        None => false,
    }
}

/// Build the thread listing from creations, kind-41 updates and kind-5 deletions.
///
/// Malformed creations are skipped, deleted threads are hidden, duplicates
/// collapse, and the result is newest first.
pub fn project_threads(creations: &[Event], updates: &[Event], deletions: &[Event]) -> Vec<Thread> {
    let mut threads: Vec<Thread> = Vec::new();

    for event in creations {
        if threads.iter().any(|thread| thread.id == event.id) {
            continue;
        }
        if is_deleted(event, deletions) {
            continue;
        }
        match Thread::from_event(event) {
            Ok(mut thread) => {
                thread.apply_updates(updates);
                threads.push(thread);
            }
            Err(e) => warn!("Skipping thread: {}", e),
        }
    }

    threads.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
    threads
}

/// Replies to `thread_id`, oldest first. Comments and malformed or deleted
/// messages are left out.
pub fn project_replies(thread_id: &str, events: &[Event], deletions: &[Event]) -> Vec<Reply> {
    let mut replies: Vec<Reply> = Vec::new();

    for event in events {
        if replies.iter().any(|reply| reply.id == event.id) || is_deleted(event, deletions) {
            continue;
        }
        match Reply::from_event(event) {
            Ok(reply) if reply.thread_id == thread_id => replies.push(reply),
            Ok(_) => {}
            Err(e) => warn!("Skipping reply: {}", e),
        }
    }

    replies.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    replies
}

/// Comments on `reply_id`, oldest first.
pub fn project_comments(reply_id: &str, events: &[Event], deletions: &[Event]) -> Vec<Comment> {
    let mut comments: Vec<Comment> = Vec::new();

    for event in events {
        if comments.iter().any(|comment| comment.id == event.id) || is_deleted(event, deletions) {
            continue;
        }
        match Comment::from_event(event) {
            Ok(comment) if comment.reply_id == reply_id => comments.push(comment),
            Ok(_) => {}
            Err(e) => warn!("Skipping comment: {}", e),
        }
    }

    comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    comments
}
