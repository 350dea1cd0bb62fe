//! Vote tallies and zap totals folded from relay results.
//!
//! Relays may return duplicates, events out of order, and several votes by
//! the same author. Every fold here deduplicates by event id and orders by
//! `created_at` itself instead of trusting delivery order. Events that do not
//! parse contribute nothing.

use nostr::{
    Event, REACTION_KIND, ZAP_RECEIPT_KIND, reaction_target, receipt_amount_msats,
    receipt_matches_invoice, vote_of,
};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Signed vote score of `target_id`.
///
/// Each author's latest kind-7 event counts: `+` adds one, `-` subtracts
/// one, anything else counts zero. On equal `created_at` the larger event id
/// is the later vote.
pub fn vote_tally(target_id: &str, events: &[Event]) -> i64 {
    latest_votes(target_id, events)
        .values()
        .map(|event| vote_of(event).map(|vote| vote.weight()).unwrap_or(0))
        .sum()
}

/// Each author's latest vote event on `target_id`.
pub fn latest_votes<'a>(target_id: &str, events: &'a [Event]) -> HashMap<&'a str, &'a Event> {
    let mut latest: HashMap<&str, &Event> = HashMap::new();

    for event in unique(events) {
        if event.kind != REACTION_KIND || reaction_target(event) != Some(target_id) {
            continue;
        }
        latest
            .entry(event.pubkey.as_str())
            .and_modify(|current| {
                if (event.created_at, event.id.as_str()) > (current.created_at, current.id.as_str()) {
                    *current = event;
                }
            })
            .or_insert(event);
    }

    latest
}

/// Total sats zapped to `target_id`.
///
/// Each receipt contributes the `amount` (msats) of the zap request embedded
/// in its `description` tag, divided by 1000. Receipts without a readable
/// amount contribute zero. Receipts are folded in id order; one that would
/// overflow the total is left out.
pub fn payment_total(target_id: &str, events: &[Event]) -> u64 {
    let mut receipts: Vec<&Event> = unique(events)
        .filter(|event| event.kind == ZAP_RECEIPT_KIND && event.has_tag_value("e", target_id))
        .collect();
    receipts.sort_by(|a, b| a.id.cmp(&b.id));

    receipts.into_iter().fold(0u64, |total, receipt| {
        let sats = receipt_amount_msats(receipt).unwrap_or(0) / 1000;
        total.checked_add(sats).unwrap_or_else(|| {
            warn!("Ignoring receipt {}: {} sats overflows the total", receipt.id, sats);
            total
        })
    })
}

/// Whether `receipt` confirms payment of `bolt11` for `target_id`.
pub fn settles_payment(receipt: &Event, target_id: &str, bolt11: &str) -> bool {
    receipt_matches_invoice(receipt, bolt11) && receipt.has_tag_value("e", target_id)
}

fn unique<'a>(events: &'a [Event]) -> impl Iterator<Item = &'a Event> + 'a {
    let mut seen: HashSet<&'a str> = HashSet::new();
    events
        .iter()
        .filter(move |event| seen.insert(event.id.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TARGET: &str = "feedfeedfeedfeedfeedfeedfeedfeedfeedfeedfeedfeedfeedfeedfeedfeed";

    fn event(id: &str, pubkey: &str, kind: u16, tags: Vec<Vec<String>>, content: &str, at: u64) -> Event {
        Event {
            id: id.to_string(),
            pubkey: pubkey.to_string(),
            created_at: at,
            kind,
            tags,
            content: content.to_string(),
            sig: String::new(),
        }
    }

    fn vote(id: &str, author: &str, content: &str, at: u64) -> Event {
        event(
            id,
            author,
            7,
            vec![vec!["e".into(), TARGET.into()], vec!["p".into(), "x".into()]],
            content,
            at,
        )
    }

    fn receipt(id: &str, description: Option<String>, bolt11: &str) -> Event {
        let mut tags = vec![
            vec!["p".to_string(), "recipient".to_string()],
            vec!["e".to_string(), TARGET.to_string()],
            vec!["bolt11".to_string(), bolt11.to_string()],
        ];
        if let Some(description) = description {
            tags.push(vec!["description".to_string(), description]);
        }
        event(id, "wallet", 9735, tags, "", 100)
    }

    fn request_json(amount: &str) -> String {
        serde_json::json!({
            "id": "req",
            "pubkey": "sender",
            "created_at": 99,
            "kind": 9734,
            "tags": [["p", "recipient"], ["e", TARGET], ["amount", amount]],
            "content": "",
            "sig": ""
        })
        .to_string()
    }

    #[test]
    fn test_latest_vote_per_author_wins() {
        let events = vec![
            vote("a1", "alice", "+", 1),
            vote("a2", "alice", "-", 2),
            vote("b1", "bob", "+", 1),
        ];
        assert_eq!(vote_tally(TARGET, &events), 0);
    }

    #[test]
    fn test_delivery_order_does_not_matter() {
        let events = vec![
            vote("a2", "alice", "-", 2),
            vote("b1", "bob", "+", 1),
            vote("a1", "alice", "+", 1),
        ];
        assert_eq!(vote_tally(TARGET, &events), 0);
    }

    #[test]
    fn test_malformed_vote_counts_zero() {
        let events = vec![vote("a1", "alice", "x", 1), vote("b1", "bob", "+", 1)];
        assert_eq!(vote_tally(TARGET, &events), 1);

        // A later malformed vote still replaces the author's earlier one.
        let events = vec![vote("a1", "alice", "+", 1), vote("a2", "alice", "🔥", 2)];
        assert_eq!(vote_tally(TARGET, &events), 0);
    }

    #[test]
    fn test_equal_timestamps_larger_id_wins() {
        let events = vec![vote("ff", "alice", "-", 5), vote("0a", "alice", "+", 5)];
        assert_eq!(vote_tally(TARGET, &events), -1);

        let reversed = vec![vote("0a", "alice", "+", 5), vote("ff", "alice", "-", 5)];
        assert_eq!(vote_tally(TARGET, &reversed), -1);
    }

    #[test]
    fn test_duplicates_and_other_targets_ignored() {
        let mut elsewhere = vote("c1", "carol", "+", 1);
        elsewhere.tags[0][1] = "other".to_string();
        let events = vec![
            vote("b1", "bob", "-", 1),
            vote("b1", "bob", "-", 1),
            elsewhere,
            event("n1", "dave", 1, vec![vec!["e".into(), TARGET.into()]], "+", 1),
        ];
        assert_eq!(vote_tally(TARGET, &events), -1);
        assert_eq!(latest_votes(TARGET, &events).len(), 1);
    }

    #[test]
    fn test_unbounded_tally() {
        let events: Vec<Event> = (0..5)
            .map(|n| vote(&format!("d{}", n), &format!("user{}", n), "-", 1))
            .collect();
        assert_eq!(vote_tally(TARGET, &events), -5);
        assert_eq!(vote_tally(TARGET, &[]), 0);
    }

    #[test]
    fn test_payment_total_sums_sats() {
        let events = vec![
            receipt("r1", Some(request_json("3000")), "lnbc1"),
            receipt("r2", Some(request_json("5000")), "lnbc2"),
        ];
        assert_eq!(payment_total(TARGET, &events), 8);
    }

    #[test]
    fn test_payment_total_tolerates_bad_receipts() {
        let events = vec![
            receipt("r1", Some(request_json("3000")), "lnbc1"),
            receipt("r1", Some(request_json("3000")), "lnbc1"),
            receipt("r2", Some("{not json".to_string()), "lnbc2"),
            receipt("r3", None, "lnbc3"),
            receipt("r4", Some(request_json("lots")), "lnbc4"),
            receipt("r5", Some(request_json("999")), "lnbc5"),
        ];
        assert_eq!(payment_total(TARGET, &events), 3);
    }

    #[test]
    fn test_payment_total_survives_oversized_amounts() {
        let max = u64::MAX.to_string();
        let mut events: Vec<Event> = (0..1001)
            .map(|n| receipt(&format!("big{:04}", n), Some(request_json(&max)), "lnbc"))
            .collect();
        events.push(receipt("small", Some(request_json("3000")), "lnbc"));

        let per_receipt = u64::MAX / 1000;
        assert_eq!(payment_total(TARGET, &events), 1000 * per_receipt + 3);
    }

    #[test]
    fn test_vote_counts_only_for_its_last_e_tag() {
        let mut quoted = vote("q1", "erin", "+", 1);
        quoted.tags.push(vec!["e".into(), "other".into()]);
        assert_eq!(vote_tally(TARGET, &[quoted]), 0);
    }

    #[test]
    fn test_settles_payment_matches_exact_invoice() {
        let paid = receipt("r1", Some(request_json("1000")), "lnbc10n1abc");
        assert!(settles_payment(&paid, TARGET, "lnbc10n1abc"));
        assert!(!settles_payment(&paid, TARGET, "lnbc10n1abd"));
        assert!(!settles_payment(&paid, "other", "lnbc10n1abc"));
    }
}
