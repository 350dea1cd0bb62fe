//! Forum on a single Nostr relay.
//!
//! Threads are kind-40 events tagged with the forum namespace, replies and
//! comments are kind-42 messages, votes are kind-7 reactions, and payments
//! are NIP-57 zaps. Nothing is stored locally: every listing, tally and total
//! is folded from what the relay returns.
//!
//! # Example
//!
//! ```rust,no_run
//! use nostr::{Keypair, ThreadMetadata};
//! use nostr_forum::{ForumConfig, ForumSession};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), nostr_forum::ForumError> {
//!     let keys = Arc::new(Keypair::generate());
//!     let session = ForumSession::new(ForumConfig::default(), keys);
//!     session.connect("wss://relay.example.com").await?;
//!
//!     let id = session
//!         .create_thread(&ThreadMetadata::new("Q1", "body"))
//!         .await?;
//!     println!("score: {}", session.vote_tally(&id).await?);
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod builders;
pub mod config;
mod error;
pub mod session;
pub mod thread;

pub use aggregate::{latest_votes, payment_total, settles_payment, vote_tally};
pub use builders::{ForumEvents, PaymentRequestBlob};
pub use config::{DEFAULT_NAMESPACE, ForumConfig, RELAY_ENV_VAR};
pub use error::{ForumError, Result};
pub use session::{ForumSession, LoggedInProfile};
pub use thread::{Comment, Reply, Thread, project_comments, project_replies, project_threads};
