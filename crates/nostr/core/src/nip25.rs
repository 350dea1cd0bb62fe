//! NIP-25: Reactions
//!
//! Forum votes are kind 7 reactions whose content is `"+"` (upvote) or
//! `"-"` (downvote). Any other content is a reaction that carries no vote.
//!
//! See: <https://github.com/nostr-protocol/nips/blob/master/25.md>

use crate::nip01::Event;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Event kind for reactions
pub const REACTION_KIND: u16 = 7;

#[derive(Debug, Error)]
pub enum Nip25Error {
    #[error("invalid vote: {0:?}")]
    InvalidVote(String),
}

/// Direction of a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vote {
    Up,
    Down,
}

impl Vote {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vote::Up => "+",
            Vote::Down => "-",
        }
    }

    /// Contribution to a tally: `+1` or `-1`.
    pub fn weight(&self) -> i64 {
        match self {
            Vote::Up => 1,
            Vote::Down => -1,
        }
    }
}

impl fmt::Display for Vote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Vote {
    type Err = Nip25Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "+" => Ok(Vote::Up),
            "-" => Ok(Vote::Down),
            other => Err(Nip25Error::InvalidVote(other.to_string())),
        }
    }
}

pub fn is_reaction_kind(kind: u16) -> bool {
    kind == REACTION_KIND
}

/// Tags for a reaction to `event_id` by `author_pubkey`'s post.
pub fn create_reaction_tags(event_id: &str, author_pubkey: &str) -> Vec<Vec<String>> {
    vec![
        vec!["e".to_string(), event_id.to_string()],
        vec!["p".to_string(), author_pubkey.to_string()],
    ]
}

/// The event a reaction targets: the last `e` tag.
pub fn reaction_target(event: &Event) -> Option<&str> {
    event
        .tags_named("e")
        .filter_map(|tag| tag.get(1))
        .last()
        .map(String::as_str)
}

/// Vote carried by a reaction event, or `None` for non-vote content.
pub fn vote_of(event: &Event) -> Option<Vote> {
    if !is_reaction_kind(event.kind) {
        return None;
    }
    event.content.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reaction(content: &str) -> Event {
        Event {
            id: "r".to_string(),
            pubkey: "voter".to_string(),
            created_at: 1,
            kind: REACTION_KIND,
            tags: create_reaction_tags("target", "author"),
            content: content.to_string(),
            sig: "sig".to_string(),
        }
    }

    #[test]
    fn test_vote_parse() {
        assert_eq!("+".parse::<Vote>().unwrap(), Vote::Up);
        assert_eq!("-".parse::<Vote>().unwrap(), Vote::Down);
        assert!("".parse::<Vote>().is_err());
        assert!("🤙".parse::<Vote>().is_err());
        assert_eq!(Vote::Up.to_string(), "+");
    }

    #[test]
    fn test_vote_of() {
        assert_eq!(vote_of(&reaction("+")), Some(Vote::Up));
        assert_eq!(vote_of(&reaction("-")), Some(Vote::Down));
        assert_eq!(vote_of(&reaction("like")), None);

        let mut wrong_kind = reaction("+");
        wrong_kind.kind = 1;
        assert_eq!(vote_of(&wrong_kind), None);
    }

    #[test]
    fn test_reaction_target() {
        let event = reaction("+");
        assert_eq!(reaction_target(&event), Some("target"));
        assert_eq!(Vote::Down.weight(), -1);
    }
}
