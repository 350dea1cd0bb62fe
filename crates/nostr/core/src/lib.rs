//! Nostr protocol pieces used by the forum client.
//!
//! This crate provides:
//! - NIP-01: Basic protocol (events, canonical serialization, signing, verification)
//! - Key handling and the [`KeyProvider`] seam for the acting identity
//! - NIP-09: Event Deletion Request
//! - NIP-10: e-tag references and markers
//! - NIP-25: Reactions (votes)
//! - NIP-28: Public Chat kinds, used for threads
//! - NIP-57: Lightning Zaps (payment requests and receipts)
//! - Profile metadata (kind 0 content)

mod keys;
mod metadata;
mod nip01;
mod nip09;
mod nip10;
mod nip25;
mod nip28;
mod nip57;

// NIP-01: Basic protocol
pub use nip01::{
    Event, EventTemplate, KIND_METADATA, Nip01Error, UnsignedEvent, finalize_event,
    generate_secret_key, get_event_hash, get_public_key, get_public_key_hex, serialize_event,
    sort_events, unix_timestamp, validate_event, validate_unsigned_event, verify_event,
};

// Keys
pub use keys::{KeyError, KeyProvider, Keypair, is_valid_secret_key, parse_secret_key};

// Profile metadata
pub use metadata::{Metadata, MetadataError};

// NIP-09: Event Deletion Request
pub use nip09::{
    DELETION_REQUEST_KIND, Nip09Error, create_deletion_tags, get_deleted_event_ids,
    get_deletion_reason, is_deletion_request, should_delete_event,
};

// NIP-10: e-tag references
pub use nip10::{ETagMarker, EventReference, Nip10Error, ThreadReferences, pubkey_tag};

// NIP-25: Reactions
pub use nip25::{
    Nip25Error, REACTION_KIND, Vote, create_reaction_tags, is_reaction_kind, reaction_target,
    vote_of,
};

// NIP-28: Threads
pub use nip28::{
    KIND_THREAD_CREATION, KIND_THREAD_MESSAGE, KIND_THREAD_METADATA, Nip28Error, ThreadMetadata,
};

// NIP-57: Lightning Zaps
pub use nip57::{
    Nip57Error, ZAP_RECEIPT_KIND, ZAP_REQUEST_KIND, ZapReceipt, ZapRequest,
    receipt_amount_msats, receipt_matches_invoice, zap_request_tags,
};
