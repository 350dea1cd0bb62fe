//! Integration tests for signing and parsing forum event payloads

use nostr::{
    ETagMarker, EventReference, EventTemplate, KIND_THREAD_CREATION, KIND_THREAD_MESSAGE,
    Keypair, ThreadMetadata, ThreadReferences, Vote, ZAP_REQUEST_KIND, ZapRequest,
    finalize_event, pubkey_tag, verify_event, vote_of, zap_request_tags,
};

fn keypair() -> Keypair {
    Keypair::from_secret_key_hex("d217c1ff2f8a65c3e3a1740db3b9f58b8c848bb45e26d00ed4714e4a0f4ceecf")
        .expect("valid key")
}

#[test]
fn test_thread_event_roundtrip() {
    let keys = keypair();
    let metadata = ThreadMetadata::new("Q1", "body");
    let template = EventTemplate::new(
        KIND_THREAD_CREATION,
        vec![vec!["t".to_string(), "nostr-forum".to_string()]],
        metadata.to_json().unwrap(),
        1_700_000_000,
    );

    let event = finalize_event(&template, &keys.secret_key).unwrap();
    assert!(verify_event(&event));
    assert_eq!(event.pubkey, keys.public_key);

    let parsed = ThreadMetadata::from_json(&event.content).unwrap();
    assert_eq!(parsed, metadata);
}

#[test]
fn test_comment_references() {
    let keys = keypair();
    let reply_id = "b".repeat(64);
    let reply_author = "c".repeat(64);
    let template = EventTemplate::new(
        KIND_THREAD_MESSAGE,
        vec![
            vec!["t".to_string(), "nostr-forum".to_string()],
            EventReference::marked(reply_id.clone(), None, ETagMarker::Reply).to_tag(),
            pubkey_tag(reply_author.clone()),
        ],
        "a comment",
        1_700_000_001,
    );

    let event = finalize_event(&template, &keys.secret_key).unwrap();
    let refs = ThreadReferences::from_event(&event);

    assert_eq!(refs.reply_target().unwrap().event_id, reply_id);
    assert_eq!(refs.mentioned_pubkeys, vec![reply_author]);
}

#[test]
fn test_vote_event() {
    let keys = keypair();
    let template = EventTemplate::new(
        nostr::REACTION_KIND,
        nostr::create_reaction_tags(&"d".repeat(64), &"e".repeat(64)),
        Vote::Down.as_str(),
        1_700_000_002,
    );

    let event = finalize_event(&template, &keys.secret_key).unwrap();
    assert_eq!(vote_of(&event), Some(Vote::Down));
}

#[test]
fn test_signed_zap_request_parses_back() {
    let keys = keypair();
    let template = EventTemplate::new(
        ZAP_REQUEST_KIND,
        zap_request_tags(
            &"d".repeat(64),
            &"e".repeat(64),
            21_000,
            &["wss://relay.example.com".to_string()],
        ),
        "",
        1_700_000_003,
    );

    let event = finalize_event(&template, &keys.secret_key).unwrap();
    let json = serde_json::to_string(&event).unwrap();
    let request = ZapRequest::from_json(&json).unwrap();

    assert_eq!(request.amount_msats, Some(21_000));
    assert_eq!(request.recipient_pubkey, "e".repeat(64));
    assert!(verify_event(&request.event));
}
