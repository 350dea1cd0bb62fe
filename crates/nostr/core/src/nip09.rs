//! NIP-09: Event Deletion Request
//!
//! A kind 5 event lists the ids of events its author wants withdrawn. Relays
//! and clients may honor it; it is only a request. A deletion only applies
//! to events by the same author.
//!
//! See: <https://github.com/nostr-protocol/nips/blob/master/09.md>

use crate::nip01::Event;
use thiserror::Error;

/// Event kind for deletion requests
pub const DELETION_REQUEST_KIND: u16 = 5;

#[derive(Debug, Error)]
pub enum Nip09Error {
    #[error("no event ids to delete")]
    NoTargets,
}

/// Tags for a deletion request covering `event_ids`.
pub fn create_deletion_tags(event_ids: &[String]) -> Result<Vec<Vec<String>>, Nip09Error> {
    if event_ids.is_empty() {
        return Err(Nip09Error::NoTargets);
    }

    Ok(event_ids
        .iter()
        .map(|id| vec!["e".to_string(), id.clone()])
        .collect())
}

pub fn is_deletion_request(event: &Event) -> bool {
    event.kind == DELETION_REQUEST_KIND
}

/// Ids named by the `e` tags of a deletion request. Empty for other kinds.
pub fn get_deleted_event_ids(event: &Event) -> Vec<String> {
    if !is_deletion_request(event) {
        return Vec::new();
    }

    event
        .tags_named("e")
        .filter_map(|tag| tag.get(1).cloned())
        .collect()
}

/// The reason given in the request content, if any.
pub fn get_deletion_reason(event: &Event) -> Option<&str> {
    if is_deletion_request(event) && !event.content.is_empty() {
        Some(event.content.as_str())
    } else {
        None
    }
}

/// Whether `deletion` withdraws `target`.
///
/// Requires a kind 5 event by the same author that names the target id.
pub fn should_delete_event(target: &Event, deletion: &Event) -> bool {
    deletion.pubkey == target.pubkey
        && get_deleted_event_ids(deletion)
            .iter()
            .any(|id| *id == target.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str, pubkey: &str, kind: u16, tags: Vec<Vec<String>>, content: &str) -> Event {
        Event {
            id: id.to_string(),
            pubkey: pubkey.to_string(),
            created_at: 1_700_000_000,
            kind,
            tags,
            content: content.to_string(),
            sig: "sig".to_string(),
        }
    }

    #[test]
    fn test_create_deletion_tags() {
        let tags = create_deletion_tags(&["a".to_string(), "b".to_string()]).unwrap();
        assert_eq!(tags, vec![vec!["e", "a"], vec!["e", "b"]]);

        assert!(matches!(create_deletion_tags(&[]), Err(Nip09Error::NoTargets)));
    }

    #[test]
    fn test_get_deleted_event_ids() {
        let deletion = event(
            "del",
            "alice",
            DELETION_REQUEST_KIND,
            vec![
                vec!["e".to_string(), "a".to_string()],
                vec!["t".to_string(), "nostr-forum".to_string()],
            ],
            "spam",
        );

        assert_eq!(get_deleted_event_ids(&deletion), vec!["a".to_string()]);
        assert_eq!(get_deletion_reason(&deletion), Some("spam"));

        let not_deletion = event("x", "alice", 7, deletion.tags.clone(), "");
        assert!(get_deleted_event_ids(&not_deletion).is_empty());
    }

    #[test]
    fn test_should_delete_event_same_author_only() {
        let target = event("a", "alice", 40, vec![], "{}");
        let by_author = event(
            "d1",
            "alice",
            DELETION_REQUEST_KIND,
            vec![vec!["e".to_string(), "a".to_string()]],
            "",
        );
        let by_other = event(
            "d2",
            "mallory",
            DELETION_REQUEST_KIND,
            vec![vec!["e".to_string(), "a".to_string()]],
            "",
        );

        assert!(should_delete_event(&target, &by_author));
        assert!(!should_delete_event(&target, &by_other));
        assert_eq!(get_deletion_reason(&by_author), None);
    }
}
