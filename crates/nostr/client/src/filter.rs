//! Query filters (NIP-01 `REQ` filters).
//!
//! A filter is a conjunction of the constraints that are present. A tag
//! constraint `"#x": [v1, v2]` matches when the event has any `x` tag whose
//! value is one of the listed values.

use nostr::Event;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Filter for subscription requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Event IDs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,

    /// Authors (pubkeys)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,

    /// Event kinds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u16>>,

    /// Events at or after this timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,

    /// Events at or before this timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<u64>,

    /// Maximum number of stored events the relay should return
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,

    /// Tag queries keyed `#<letter>`
    #[serde(flatten, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, Vec<String>>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(mut self, ids: Vec<String>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn authors(mut self, authors: Vec<String>) -> Self {
        self.authors = Some(authors);
        self
    }

    pub fn kinds(mut self, kinds: Vec<u16>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    pub fn since(mut self, timestamp: u64) -> Self {
        self.since = Some(timestamp);
        self
    }

    pub fn until(mut self, timestamp: u64) -> Self {
        self.until = Some(timestamp);
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Add a tag filter. The key is the tag letter (e.g. "e", "p").
    pub fn tag(mut self, key: impl Into<String>, values: Vec<String>) -> Self {
        self.tags.insert(format!("#{}", key.into()), values);
        self
    }

    /// Filter by #e (event reference) tags.
    pub fn event_refs(self, event_ids: Vec<String>) -> Self {
        self.tag("e", event_ids)
    }

    /// Filter by #p (pubkey mention) tags.
    pub fn pubkey_refs(self, pubkeys: Vec<String>) -> Self {
        self.tag("p", pubkeys)
    }

    /// Filter by #t (topic / namespace) tags.
    pub fn hashtags(self, topics: Vec<String>) -> Self {
        self.tag("t", topics)
    }

    /// True when the filter constrains nothing and would match every event.
    ///
    /// `limit` does not count as a constraint.
    pub fn is_empty(&self) -> bool {
        self.ids.is_none()
            && self.authors.is_none()
            && self.kinds.is_none()
            && self.since.is_none()
            && self.until.is_none()
            && self.tags.is_empty()
    }

    /// Evaluate the filter against an event locally.
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ids) = &self.ids
            && !ids.contains(&event.id)
        {
            return false;
        }
        if let Some(authors) = &self.authors
            && !authors.contains(&event.pubkey)
        {
            return false;
        }
        if let Some(kinds) = &self.kinds
            && !kinds.contains(&event.kind)
        {
            return false;
        }
        if self.since.is_some_and(|since| event.created_at < since) {
            return false;
        }
        if self.until.is_some_and(|until| event.created_at > until) {
            return false;
        }

        self.tags.iter().all(|(key, values)| match key.strip_prefix('#') {
            Some(name) => event
                .tags_named(name)
                .any(|tag| tag.get(1).is_some_and(|value| values.contains(value))),
            None => true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn event() -> Event {
        Event {
            id: "id1".to_string(),
            pubkey: "alice".to_string(),
            created_at: 1000,
            kind: 42,
            tags: vec![
                vec!["t".to_string(), "nostr-forum".to_string()],
                vec![
                    "e".to_string(),
                    "thread1".to_string(),
                    String::new(),
                    "root".to_string(),
                ],
            ],
            content: "hi".to_string(),
            sig: "sig".to_string(),
        }
    }

    #[test]
    fn test_filter_builder() {
        let filter = Filter::new()
            .kinds(vec![40, 41])
            .authors(vec!["author1".to_string()])
            .since(1000)
            .until(2000)
            .limit(100)
            .event_refs(vec!["event1".to_string()])
            .hashtags(vec!["nostr-forum".to_string()]);

        assert_eq!(filter.kinds, Some(vec![40, 41]));
        assert_eq!(filter.limit, Some(100));
        assert!(filter.tags.contains_key("#e"));
        assert!(filter.tags.contains_key("#t"));
        assert!(!filter.is_empty());
    }

    #[test]
    fn test_filter_serialization() {
        let filter = Filter::new()
            .kinds(vec![7])
            .event_refs(vec!["abc".to_string()])
            .limit(10);

        let json = serde_json::to_string(&filter).unwrap();
        assert_eq!(json, r##"{"kinds":[7],"limit":10,"#e":["abc"]}"##);

        let parsed: Filter = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, filter);
    }

    #[test]
    fn test_empty_filter() {
        assert!(Filter::new().is_empty());
        assert!(Filter::new().limit(5).is_empty());
        assert_eq!(serde_json::to_string(&Filter::new()).unwrap(), "{}");
        assert!(Filter::new().matches(&event()));
    }

    #[test]
    fn test_matches_conjunction() {
        let event = event();

        assert!(Filter::new().kinds(vec![42]).matches(&event));
        assert!(!Filter::new().kinds(vec![40]).matches(&event));
        assert!(
            !Filter::new()
                .kinds(vec![42])
                .authors(vec!["bob".to_string()])
                .matches(&event)
        );
        assert!(Filter::new().ids(vec!["id1".to_string()]).matches(&event));
        assert!(Filter::new().since(1000).until(1000).matches(&event));
        assert!(!Filter::new().since(1001).matches(&event));
        assert!(!Filter::new().until(999).matches(&event));
    }

    #[test]
    fn test_matches_tags() {
        let event = event();

        assert!(
            Filter::new()
                .event_refs(vec!["other".to_string(), "thread1".to_string()])
                .matches(&event)
        );
        assert!(!Filter::new().event_refs(vec!["other".to_string()]).matches(&event));
        assert!(!Filter::new().pubkey_refs(vec!["alice".to_string()]).matches(&event));
        assert!(
            Filter::new()
                .hashtags(vec!["nostr-forum".to_string()])
                .event_refs(vec!["thread1".to_string()])
                .matches(&event)
        );
    }
}
