//! NIP-57 zaps, as used for forum payments.
//!
//! A payment request (kind 9734) is signed by the payer and handed to the
//! recipient's wallet; it is never published. Once the invoice is paid the
//! wallet publishes a receipt (kind 9735) that embeds the request JSON in its
//! `description` tag.
//!
//! <https://github.com/nostr-protocol/nips/blob/master/57.md>

use crate::nip01::Event;
use thiserror::Error;

pub const ZAP_REQUEST_KIND: u16 = 9734;
pub const ZAP_RECEIPT_KIND: u16 = 9735;

#[derive(Debug, Error)]
pub enum Nip57Error {
    #[error("event {id} has kind {found}, expected {expected}")]
    WrongKind { id: String, expected: u16, found: u16 },

    #[error("zap event has no `{0}` tag")]
    Missing(&'static str),

    #[error("zap request carries more than one `{0}` tag")]
    Duplicate(&'static str),

    #[error("zap request amount `{0}` is not a millisat count")]
    BadAmount(String),

    #[error("embedded zap request is not an event: {0}")]
    Json(#[from] serde_json::Error),
}

fn expect_kind(event: &Event, expected: u16) -> Result<(), Nip57Error> {
    if event.kind == expected {
        Ok(())
    } else {
        Err(Nip57Error::WrongKind {
            id: event.id.clone(),
            expected,
            found: event.kind,
        })
    }
}

fn owned_tag(event: &Event, name: &'static str) -> Option<String> {
    event.tag_value(name).map(str::to_owned)
}

fn single_tag(event: &Event, name: &'static str) -> Result<Option<String>, Nip57Error> {
    let mut values = event.tags_named(name).filter_map(|tag| tag.get(1));
    let first = values.next().cloned();
    match values.next() {
        Some(_) => Err(Nip57Error::Duplicate(name)),
        None => Ok(first),
    }
}

/// Tags of a payment request for `event_id`, authored by `recipient_pubkey`.
///
/// Emitted as `e`, `p`, `amount`, then `relays` when any relay is given.
pub fn zap_request_tags(
    event_id: &str,
    recipient_pubkey: &str,
    amount_msats: u64,
    relays: &[String],
) -> Vec<Vec<String>> {
    let mut tags = Vec::with_capacity(4);
    tags.push(vec!["e".to_owned(), event_id.to_owned()]);
    tags.push(vec!["p".to_owned(), recipient_pubkey.to_owned()]);
    tags.push(vec!["amount".to_owned(), amount_msats.to_string()]);
    if !relays.is_empty() {
        tags.push(
            std::iter::once("relays".to_owned())
                .chain(relays.iter().cloned())
                .collect(),
        );
    }
    tags
}

/// Kind-9734 event viewed as a payment request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZapRequest {
    pub event: Event,
    pub recipient_pubkey: String,
    pub zapped_event: Option<String>,
    pub relays: Vec<String>,
    pub amount_msats: Option<u64>,
}

impl ZapRequest {
    /// Exactly one `p` tag is required; a second `p` or `e` tag is an error.
    pub fn from_event(event: Event) -> Result<Self, Nip57Error> {
        expect_kind(&event, ZAP_REQUEST_KIND)?;

        let recipient_pubkey = single_tag(&event, "p")?.ok_or(Nip57Error::Missing("p"))?;
        let zapped_event = single_tag(&event, "e")?;
        let amount_msats = match event.tag_value("amount") {
            Some(raw) => Some(
                raw.trim()
                    .parse()
                    .map_err(|_| Nip57Error::BadAmount(raw.to_owned()))?,
            ),
            None => None,
        };
        let relays = event
            .tags_named("relays")
            .flat_map(|tag| tag.iter().skip(1).cloned())
            .collect();

        Ok(Self {
            event,
            recipient_pubkey,
            zapped_event,
            relays,
            amount_msats,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, Nip57Error> {
        Self::from_event(serde_json::from_str(json)?)
    }

    pub fn message(&self) -> &str {
        &self.event.content
    }
}

/// Kind-9735 event viewed as a payment receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZapReceipt {
    pub event: Event,
    pub recipient_pubkey: String,
    /// `P` tag; wallets may leave it out.
    pub sender_pubkey: Option<String>,
    pub zapped_event: Option<String>,
    pub bolt11: String,
    pub description: String,
    pub preimage: Option<String>,
}

impl ZapReceipt {
    pub fn from_event(event: Event) -> Result<Self, Nip57Error> {
        expect_kind(&event, ZAP_RECEIPT_KIND)?;

        Ok(Self {
            recipient_pubkey: owned_tag(&event, "p").ok_or(Nip57Error::Missing("p"))?,
            bolt11: owned_tag(&event, "bolt11").ok_or(Nip57Error::Missing("bolt11"))?,
            description: owned_tag(&event, "description")
                .ok_or(Nip57Error::Missing("description"))?,
            sender_pubkey: owned_tag(&event, "P"),
            zapped_event: owned_tag(&event, "e"),
            preimage: owned_tag(&event, "preimage"),
            event,
        })
    }

    /// The request the payer signed, decoded from `description`.
    pub fn request(&self) -> Result<ZapRequest, Nip57Error> {
        ZapRequest::from_json(&self.description)
    }
}

/// Millisats paid by a receipt event, taken from its embedded request.
///
/// `None` unless the event parses as a [`ZapReceipt`] whose description is a
/// valid [`ZapRequest`] with an `amount` tag.
pub fn receipt_amount_msats(receipt: &Event) -> Option<u64> {
    ZapReceipt::from_event(receipt.clone())
        .and_then(|receipt| receipt.request())
        .ok()?
        .amount_msats
}

pub fn receipt_matches_invoice(receipt: &Event, bolt11: &str) -> bool {
    receipt.kind == ZAP_RECEIPT_KIND && receipt.tag_value("bolt11") == Some(bolt11)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYER: &str = "1f0a61c4f2b3b0a62cbbd2bb8e3a0ac23a9bd5f9c0a3a4f1c35e1d07b6e8b3a1";
    const AUTHOR: &str = "7c1d2a7f5e4f52ad3b1b0c8e1b8e3f4a1c0b9a8d7e6f5a4b3c2d1e0f9a8b7c6d";
    const REPLY: &str = "b5a4c3d2e1f0a9b8c7d6e5f4a3b2c1d0e9f8a7b6c5d4e3f2a1b0c9d8e7f6a5b4";
    const WALLET: &str = "2e3f4a5b6c7d8e9f0a1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d6e7f8a9b0c1d2e3f";

    fn tag(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|part| part.to_string()).collect()
    }

    fn request_event(amount: &str) -> Event {
        Event {
            id: "a".repeat(64),
            pubkey: PAYER.to_string(),
            created_at: 1_700_000_100,
            kind: ZAP_REQUEST_KIND,
            tags: vec![
                tag(&["e", REPLY]),
                tag(&["p", AUTHOR]),
                tag(&["amount", amount]),
                tag(&["relays", "wss://relay.one", "wss://relay.two"]),
            ],
            content: "thanks for the answer".to_string(),
            sig: "0".repeat(128),
        }
    }

    fn receipt_event(description: &str) -> Event {
        Event {
            id: "c".repeat(64),
            pubkey: WALLET.to_string(),
            created_at: 1_700_000_160,
            kind: ZAP_RECEIPT_KIND,
            tags: vec![
                tag(&["p", AUTHOR]),
                tag(&["P", PAYER]),
                tag(&["e", REPLY]),
                tag(&["bolt11", "lnbc80n1forum"]),
                tag(&["description", description]),
            ],
            content: String::new(),
            sig: "0".repeat(128),
        }
    }

    fn receipt_for(request: &Event) -> Event {
        receipt_event(&serde_json::to_string(request).unwrap())
    }

    #[test]
    fn test_zap_request_tags() {
        let tags = zap_request_tags(REPLY, AUTHOR, 8000, &["wss://relay.one".to_string()]);
        assert_eq!(
            tags,
            vec![
                tag(&["e", REPLY]),
                tag(&["p", AUTHOR]),
                tag(&["amount", "8000"]),
                tag(&["relays", "wss://relay.one"]),
            ]
        );

        let without_relays = zap_request_tags(REPLY, AUTHOR, 8000, &[]);
        assert!(without_relays.iter().all(|tag| tag[0] != "relays"));
    }

    #[test]
    fn test_zap_request_from_event() {
        let request = ZapRequest::from_event(request_event("8000")).unwrap();

        assert_eq!(request.recipient_pubkey, AUTHOR);
        assert_eq!(request.zapped_event.as_deref(), Some(REPLY));
        assert_eq!(request.amount_msats, Some(8000));
        assert_eq!(request.relays, vec!["wss://relay.one", "wss://relay.two"]);
        assert_eq!(request.message(), "thanks for the answer");
    }

    #[test]
    fn test_zap_request_rejects_bad_input() {
        let mut no_recipient = request_event("8000");
        no_recipient.tags.retain(|tag| tag[0] != "p");
        assert!(matches!(
            ZapRequest::from_event(no_recipient),
            Err(Nip57Error::Missing("p"))
        ));

        let mut reaction = request_event("8000");
        reaction.kind = 7;
        assert!(matches!(
            ZapRequest::from_event(reaction),
            Err(Nip57Error::WrongKind { found: 7, .. })
        ));

        let mut two_targets = request_event("8000");
        two_targets.tags.push(tag(&["e", "other"]));
        assert!(matches!(
            ZapRequest::from_event(two_targets),
            Err(Nip57Error::Duplicate("e"))
        ));

        assert!(matches!(
            ZapRequest::from_event(request_event("lots")),
            Err(Nip57Error::BadAmount(_))
        ));
    }

    #[test]
    fn test_zap_receipt_from_event() {
        let receipt = ZapReceipt::from_event(receipt_for(&request_event("8000"))).unwrap();

        assert_eq!(receipt.recipient_pubkey, AUTHOR);
        assert_eq!(receipt.sender_pubkey.as_deref(), Some(PAYER));
        assert_eq!(receipt.zapped_event.as_deref(), Some(REPLY));
        assert_eq!(receipt.bolt11, "lnbc80n1forum");
        assert_eq!(receipt.preimage, None);
        assert_eq!(receipt.request().unwrap().amount_msats, Some(8000));
    }

    #[test]
    fn test_zap_receipt_requires_invoice() {
        let mut event = receipt_event("{}");
        event.tags.retain(|tag| tag[0] != "bolt11");
        assert!(matches!(
            ZapReceipt::from_event(event),
            Err(Nip57Error::Missing("bolt11"))
        ));
    }

    #[test]
    fn test_receipt_amount_msats() {
        assert_eq!(receipt_amount_msats(&receipt_for(&request_event("8000"))), Some(8000));
        assert_eq!(receipt_amount_msats(&receipt_for(&request_event(" 900 "))), Some(900));
        assert_eq!(receipt_amount_msats(&receipt_event("not json")), None);
        assert_eq!(receipt_amount_msats(&receipt_for(&request_event("-5"))), None);

        let mut no_amount = request_event("8000");
        no_amount.tags.retain(|tag| tag[0] != "amount");
        assert_eq!(receipt_amount_msats(&receipt_for(&no_amount)), None);

        let mut not_a_request = request_event("8000");
        not_a_request.kind = 1;
        assert_eq!(receipt_amount_msats(&receipt_for(&not_a_request)), None);

        let mut no_invoice = receipt_for(&request_event("8000"));
        no_invoice.tags.retain(|tag| tag[0] != "bolt11");
        assert_eq!(receipt_amount_msats(&no_invoice), None);
    }

    #[test]
    fn test_receipt_matches_invoice() {
        let receipt = receipt_event("{}");
        assert!(receipt_matches_invoice(&receipt, "lnbc80n1forum"));
        assert!(!receipt_matches_invoice(&receipt, "lnbc80n1other"));

        let mut request = request_event("8000");
        request.tags.push(tag(&["bolt11", "lnbc80n1forum"]));
        assert!(!receipt_matches_invoice(&request, "lnbc80n1forum"));
    }
}
