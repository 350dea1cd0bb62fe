//! Test fixtures: fixed identities and signed events.

use nostr::{Event, EventTemplate, Keypair, finalize_event};

/// Deterministic identity number `n` (1..=255).
pub fn test_keypair(n: u8) -> Keypair {
    Keypair::from_secret_key([n; 32]).expect("fixed secret keys are in range")
}

/// Sign an event with `keys`.
pub fn signed_event(
    keys: &Keypair,
    kind: u16,
    tags: Vec<Vec<String>>,
    content: &str,
    created_at: u64,
) -> Event {
    let template = EventTemplate::new(kind, tags, content, created_at);
    finalize_event(&template, &keys.secret_key).expect("fixture keys sign")
}

/// Build a tag from string slices.
pub fn tag(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_keys_are_distinct_and_stable() {
        assert_eq!(test_keypair(1).public_key, test_keypair(1).public_key);
        assert_ne!(test_keypair(1).public_key, test_keypair(2).public_key);
    }

    #[test]
    fn test_signed_event_verifies() {
        let event = signed_event(&test_keypair(3), 42, vec![tag(&["t", "x"])], "hi", 10);
        assert!(nostr::verify_event(&event));
        assert_eq!(event.tags[0], vec!["t", "x"]);
    }
}
