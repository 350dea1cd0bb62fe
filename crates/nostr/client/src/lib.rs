//! Nostr relay WebSocket client.
//!
//! This crate provides:
//! - A single persistent connection to one relay ([`RelayConnection`])
//! - Publish with `OK` correlation, stored-event queries and live subscriptions
//! - NIP-01 wire messages and query filters
//!
//! # Example
//!
//! ```rust,no_run
//! use nostr_client::{Filter, RelayConnection};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), nostr_client::ClientError> {
//!     let relay = RelayConnection::new();
//!     relay.connect("wss://relay.example.com").await?;
//!
//!     let threads = relay
//!         .list(vec![Filter::new().kinds(vec![40]).hashtags(vec!["nostr-forum".into()]).limit(20)])
//!         .await?;
//!     for event in threads {
//!         println!("{}: {}", event.id, event.content);
//!     }
//!
//!     relay.disconnect().await
//! }
//! ```

mod error;
mod filter;
mod message;
mod relay;
mod subscription;

pub use error::{ClientError, Result};
pub use filter::Filter;
pub use message::{ClientMessage, MessageError, RelayMessage};
pub use relay::{
    ConnectionState, PublishConfirmation, RelayConfig, RelayConnection, parse_relay_url,
};
pub use subscription::{EventCallback, Subscription, SubscriptionHandle, generate_subscription_id};
