//! NIP-01 event codec: canonical hashing, BIP-340 signing and verification.
//!
//! The id of an event is the sha256 of `[0, pubkey, created_at, kind, tags, content]`
//! serialized as compact JSON. Tag order and the order of elements inside a tag
//! are part of the hash input.

use bitcoin::hashes::{Hash, sha256};
use bitcoin::key::Secp256k1;
use bitcoin::secp256k1::{Message, SecretKey, XOnlyPublicKey, schnorr};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Nip01Error {
    #[error("event is not well formed: {0}")]
    InvalidEvent(String),

    #[error("could not encode event: {0}")]
    Serialization(String),

    #[error("could not sign event: {0}")]
    Signing(String),

    #[error("secret key has no public key: {0}")]
    InvalidPublicKey(String),
}

/// Signed event as it travels over the wire.
///
/// `id`, `pubkey` and `sig` are lowercase hex (64, 64 and 128 characters).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub pubkey: String,
    /// Seconds since the unix epoch.
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    pub sig: String,
}

impl Event {
    /// First value (second element) of the first tag named `name`.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| tag.len() > 1 && tag[0] == name)
            .map(|tag| tag[1].as_str())
    }

    /// All tags named `name`, in event order.
    pub fn tags_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Vec<String>> + 'a {
        self.tags
            .iter()
            .filter(move |tag| tag.first().map(String::as_str) == Some(name))
    }

    /// Whether the event has a tag `[name, value, ...]`.
    pub fn has_tag_value(&self, name: &str, value: &str) -> bool {
        self.tags_named(name)
            .any(|tag| tag.get(1).map(String::as_str) == Some(value))
    }

    /// The signable part of the event.
    pub fn unsigned(&self) -> UnsignedEvent {
        UnsignedEvent {
            pubkey: self.pubkey.clone(),
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags.clone(),
            content: self.content.clone(),
        }
    }
}

/// The hashed fields of an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedEvent {
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

/// Event fields minus the author, which the signing key supplies.
///
/// Domain builders return templates; [`finalize_event`] turns one into a signed
/// [`Event`].
///
/// ```
/// use nostr::EventTemplate;
///
/// let template = EventTemplate::new(
///     40,
///     vec![vec!["t".to_string(), "nostr-forum".to_string()]],
///     r#"{"name":"Q1","about":"body","picture":""}"#,
///     1_700_000_000,
/// );
/// assert_eq!(template.kind, 40);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTemplate {
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

impl EventTemplate {
    pub fn new(
        kind: u16,
        tags: Vec<Vec<String>>,
        content: impl Into<String>,
        created_at: u64,
    ) -> Self {
        Self {
            created_at,
            kind,
            tags,
            content: content.into(),
        }
    }

    /// Attach the author key, producing the value that gets hashed.
    pub fn to_unsigned(&self, pubkey: impl Into<String>) -> UnsignedEvent {
        UnsignedEvent {
            pubkey: pubkey.into(),
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags.clone(),
            content: self.content.clone(),
        }
    }
}

/// Profile metadata.
pub const KIND_METADATA: u16 = 0;

/// Current unix time in seconds.
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Fresh random secret key, redrawn until it is a valid scalar.
pub fn generate_secret_key() -> [u8; 32] {
    loop {
        let mut key = [0u8; 32];
        rand::rng().fill_bytes(&mut key);
        if SecretKey::from_slice(&key).is_ok() {
            return key;
        }
    }
}

/// X-only public key of `secret_key`.
pub fn get_public_key(secret_key: &[u8; 32]) -> Result<[u8; 32], Nip01Error> {
    SecretKey::from_slice(secret_key)
        .map(|sk| sk.x_only_public_key(&Secp256k1::signing_only()).0.serialize())
        .map_err(|e| Nip01Error::InvalidPublicKey(e.to_string()))
}

/// Hex form of [`get_public_key`].
pub fn get_public_key_hex(secret_key: &[u8; 32]) -> Result<String, Nip01Error> {
    Ok(hex::encode(get_public_key(secret_key)?))
}

/// Compact JSON of `[0, pubkey, created_at, kind, tags, content]`.
pub fn serialize_event(event: &UnsignedEvent) -> Result<String, Nip01Error> {
    if !validate_unsigned_event(event) {
        return Err(Nip01Error::InvalidEvent(
            "pubkey must be 64 lowercase hex characters".to_string(),
        ));
    }

    serde_json::to_string(&(
        0,
        &event.pubkey,
        event.created_at,
        event.kind,
        &event.tags,
        &event.content,
    ))
    .map_err(|e| Nip01Error::Serialization(e.to_string()))
}

fn event_digest(event: &UnsignedEvent) -> Result<sha256::Hash, Nip01Error> {
    serialize_event(event).map(|json| sha256::Hash::hash(json.as_bytes()))
}

/// Event id: hex sha256 of [`serialize_event`].
pub fn get_event_hash(event: &UnsignedEvent) -> Result<String, Nip01Error> {
    Ok(hex::encode(event_digest(event)?.as_byte_array()))
}

fn is_lower_hex(value: &str, len: usize) -> bool {
    value.len() == len
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

/// Shape check only: the pubkey is well formed.
pub fn validate_unsigned_event(event: &UnsignedEvent) -> bool {
    is_lower_hex(&event.pubkey, 64)
}

/// Shape check of id, pubkey and sig. Does not verify the signature.
pub fn validate_event(event: &Event) -> bool {
    is_lower_hex(&event.id, 64) && is_lower_hex(&event.pubkey, 64) && is_lower_hex(&event.sig, 128)
}

/// Hash and sign `template` as the owner of `secret_key`.
///
/// Fails only when `secret_key` is not a valid scalar.
pub fn finalize_event(
    template: &EventTemplate,
    secret_key: &[u8; 32],
) -> Result<Event, Nip01Error> {
    let secp = Secp256k1::signing_only();
    let keypair = bitcoin::secp256k1::Keypair::from_seckey_slice(&secp, secret_key)
        .map_err(|e| Nip01Error::Signing(e.to_string()))?;

    let unsigned = template.to_unsigned(hex::encode(keypair.x_only_public_key().0.serialize()));
    let digest = event_digest(&unsigned)?;
    let message = Message::from_digest(digest.to_byte_array());
    let sig = secp.sign_schnorr_no_aux_rand(&message, &keypair);

    Ok(Event {
        id: hex::encode(digest.as_byte_array()),
        pubkey: unsigned.pubkey,
        created_at: unsigned.created_at,
        kind: unsigned.kind,
        tags: unsigned.tags,
        content: unsigned.content,
        sig: hex::encode(sig.serialize()),
    })
}

/// Verify an event's id and signature.
///
/// Returns `false` for any structural problem, id mismatch or bad signature.
pub fn verify_event(event: &Event) -> bool {
    if !validate_event(event) {
        return false;
    }

    match get_event_hash(&event.unsigned()) {
        Ok(computed) if computed == event.id => {}
        _ => return false,
    }

    let (Ok(id_bytes), Ok(sig_bytes), Ok(pubkey_bytes)) = (
        hex::decode(&event.id),
        hex::decode(&event.sig),
        hex::decode(&event.pubkey),
    ) else {
        return false;
    };

    let (Ok(message), Ok(sig), Ok(pubkey)) = (
        Message::from_digest_slice(&id_bytes),
        schnorr::Signature::from_slice(&sig_bytes),
        XOnlyPublicKey::from_slice(&pubkey_bytes),
    ) else {
        return false;
    };

    Secp256k1::verification_only()
        .verify_schnorr(&sig, &message, &pubkey)
        .is_ok()
}

/// Newest first; equal timestamps fall back to ascending id.
pub fn sort_events(events: &mut [Event]) {
    events.sort_by(|a, b| match b.created_at.cmp(&a.created_at) {
        std::cmp::Ordering::Equal => a.id.cmp(&b.id),
        other => other,
    });
}
