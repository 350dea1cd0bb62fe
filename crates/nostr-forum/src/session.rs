//! Forum session: one relay connection, one identity, two observable outputs.
//!
//! `connectivity()` follows the transport's current connection only.
//! `logged_in_profile()` keeps the last value for late subscribers; it is
//! cleared when a connect starts and set once the self-query finishes.

use crate::aggregate::{payment_total, settles_payment, vote_tally};
use crate::builders::{ForumEvents, PaymentRequestBlob, require_hex_key};
use crate::config::ForumConfig;
use crate::error::{ForumError, Result};
use crate::thread::{
    Comment, Reply, Thread, is_deleted, project_comments, project_replies, project_threads,
};
use nostr::{
    DELETION_REQUEST_KIND, Event, EventTemplate, KIND_METADATA, KIND_THREAD_CREATION,
    KIND_THREAD_MESSAGE, KIND_THREAD_METADATA, KeyProvider, Metadata, REACTION_KIND,
    ThreadMetadata, Vote, ZAP_RECEIPT_KIND, finalize_event, unix_timestamp,
};
use nostr_client::{ClientError, ConnectionState, Filter, RelayConnection};
use std::sync::{Arc, OnceLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info};

/// Identity resolved after connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedInProfile {
    pub public_key: String,
    /// `None` when the relay has no kind-0 record for the identity
    pub metadata: Option<Metadata>,
}

pub struct ForumSession {
    config: ForumConfig,
    relay: RelayConnection,
    keys: Arc<dyn KeyProvider>,
    connectivity: Arc<watch::Sender<bool>>,
    profile: watch::Sender<Option<LoggedInProfile>>,
    connectivity_task: OnceLock<JoinHandle<()>>,
}

impl ForumSession {
    pub fn new(config: ForumConfig, keys: Arc<dyn KeyProvider>) -> Self {
        let relay = RelayConnection::with_config(config.relay_config());
        let (connectivity, _) = watch::channel(false);
        let (profile, _) = watch::channel(None);
        Self {
            config,
            relay,
            keys,
            connectivity: Arc::new(connectivity),
            profile,
            connectivity_task: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &ForumConfig {
        &self.config
    }

    pub fn relay(&self) -> &RelayConnection {
        &self.relay
    }

    pub fn public_key(&self) -> Result<String> {
        Ok(self.keys.current_public_key()?)
    }

    pub fn is_connected(&self) -> bool {
        self.relay.is_connected()
    }

    /// Whether the current connection is up.
    pub fn connectivity(&self) -> watch::Receiver<bool> {
        self.connectivity.subscribe()
    }

    /// Profile of the acting identity, replayed to late subscribers.
    pub fn logged_in_profile(&self) -> watch::Receiver<Option<LoggedInProfile>> {
        self.profile.subscribe()
    }

    /// Mirror transport state into the connectivity channel.
    fn watch_connectivity(&self) {
        self.connectivity_task.get_or_init(|| {
            let mut changes = self.relay.state_changes();
            let connectivity = Arc::clone(&self.connectivity);
            tokio::spawn(async move {
                loop {
                    let connected = *changes.borrow_and_update() == ConnectionState::Connected;
                    connectivity.send_replace(connected);
                    if changes.changed().await.is_err() {
                        break;
                    }
                }
            })
        });
    }

    /// Connect to the configured relay.
    pub async fn connect_default(&self) -> Result<LoggedInProfile> {
        let url = self.config.relay_url.clone();
        self.connect(&url).await
    }

    /// Connect to `url` (replacing any live connection) and resolve the
    /// identity's profile.
    pub async fn connect(&self, url: &str) -> Result<LoggedInProfile> {
        self.watch_connectivity();
        self.profile.send_replace(None);
        let public_key = self.public_key()?;

        self.relay.connect(url).await?;
        self.connectivity.send_replace(self.relay.is_connected());

        let metadata = match self
            .relay
            .get_one(
                Filter::new()
                    .kinds(vec![KIND_METADATA])
                    .authors(vec![public_key.clone()]),
            )
            .await
        {
            Ok(event) => Some(
                Metadata::from_json(&event.content)
                    .map_err(|e| ForumError::malformed(&event.id, e))?,
            ),
            Err(ClientError::NotFound) => None,
            Err(e) => return Err(e.into()),
        };

        let profile = LoggedInProfile {
            public_key,
            metadata,
        };
        info!(
            "Logged in as {} on {}",
            profile.public_key,
            self.relay.url().unwrap_or_default()
        );
        self.profile.send_replace(Some(profile.clone()));
        Ok(profile)
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.relay.disconnect().await?;
        self.connectivity.send_replace(false);
        Ok(())
    }

    fn events(&self) -> ForumEvents {
        ForumEvents::new(self.config.namespace.clone()).with_relay_hint(self.relay.url())
    }

    fn sign(&self, template: &EventTemplate) -> Result<Event> {
        let secret_key = self.keys.current_secret_key()?;
        Ok(finalize_event(template, &secret_key)?)
    }

    async fn sign_and_publish(&self, template: EventTemplate) -> Result<String> {
        let event = self.sign(&template)?;
        let id = self.relay.publish(&event).await?;
        debug!("Published kind {} event {}", event.kind, id);
        Ok(id)
    }

    // Writes

    pub async fn create_thread(&self, metadata: &ThreadMetadata) -> Result<String> {
        let template = self.events().create_thread(metadata, unix_timestamp())?;
        self.sign_and_publish(template).await
    }

    pub async fn update_thread(&self, thread_id: &str, metadata: &ThreadMetadata) -> Result<String> {
        let template = self
            .events()
            .update_thread(thread_id, metadata, unix_timestamp())?;
        self.sign_and_publish(template).await
    }

    pub async fn post_reply(&self, thread_id: &str, text: &str) -> Result<String> {
        let template = self.events().post_reply(thread_id, text, unix_timestamp())?;
        self.sign_and_publish(template).await
    }

    pub async fn post_comment(&self, reply_id: &str, reply_author: &str, text: &str) -> Result<String> {
        let template = self
            .events()
            .post_comment(reply_id, reply_author, text, unix_timestamp())?;
        self.sign_and_publish(template).await
    }

    pub async fn vote(&self, target_id: &str, target_author: &str, vote: Vote) -> Result<String> {
        let template = self
            .events()
            .vote(target_id, target_author, vote, unix_timestamp())?;
        self.sign_and_publish(template).await
    }

    /// Sign a zap request for the payment collaborator. Nothing is published.
    pub fn request_payment(
        &self,
        target_id: &str,
        recipient: &str,
        amount_msats: u64,
    ) -> Result<PaymentRequestBlob> {
        let template = self.events().payment_request(
            target_id,
            recipient,
            amount_msats,
            &self.config.zap_relays_or(self.relay.url()),
            unix_timestamp(),
        )?;
        Ok(PaymentRequestBlob::new(self.sign(&template)?))
    }

    /// Publish a full replacement profile.
    pub async fn update_profile(&self, metadata: &Metadata) -> Result<String> {
        let template = self.events().update_profile(metadata, unix_timestamp())?;
        let id = self.sign_and_publish(template).await?;

        let public_key = self.public_key()?;
        self.profile.send_if_modified(|current| match current {
            Some(profile) if profile.public_key == public_key => {
                profile.metadata = Some(metadata.clone());
                true
            }
            _ => false,
        });
        Ok(id)
    }

    /// Ask the relay and other clients to drop `target_id`.
    pub async fn delete(&self, target_id: &str, reason: Option<&str>) -> Result<String> {
        let template = self.events().delete(target_id, reason, unix_timestamp())?;
        self.sign_and_publish(template).await
    }

    // Reads

    /// Newest threads in the namespace, with author edits applied and
    /// author-deleted threads hidden.
    pub async fn list_threads(&self, limit: u64) -> Result<Vec<Thread>> {
        let creations = self
            .relay
            .list(vec![
                Filter::new()
                    .kinds(vec![KIND_THREAD_CREATION])
                    .hashtags(vec![self.config.namespace.clone()])
                    .limit(limit),
            ])
            .await?;
        if creations.is_empty() {
            return Ok(Vec::new());
        }

        let ids = creations.iter().map(|event| event.id.clone()).collect();
        let related = self
            .relay
            .list(vec![
                Filter::new()
                    .kinds(vec![KIND_THREAD_METADATA, DELETION_REQUEST_KIND])
                    .event_refs(ids),
            ])
            .await?;
        let (updates, deletions): (Vec<Event>, Vec<Event>) = related
            .into_iter()
            .partition(|event| event.kind == KIND_THREAD_METADATA);

        Ok(project_threads(&creations, &updates, &deletions))
    }

    pub async fn get_thread(&self, thread_id: &str) -> Result<Thread> {
        require_hex_key("thread id", thread_id)?;
        let event = self
            .relay
            .get_one(
                Filter::new()
                    .ids(vec![thread_id.to_string()])
                    .kinds(vec![KIND_THREAD_CREATION]),
            )
            .await
            .map_err(|e| not_found(e, "thread", thread_id))?;
        let mut thread = Thread::from_event(&event)?;

        let related = self
            .relay
            .list(vec![
                Filter::new()
                    .kinds(vec![KIND_THREAD_METADATA, DELETION_REQUEST_KIND])
                    .authors(vec![thread.author.clone()])
                    .event_refs(vec![thread_id.to_string()]),
            ])
            .await?;
        let (updates, deletions): (Vec<Event>, Vec<Event>) = related
            .into_iter()
            .partition(|event| event.kind == KIND_THREAD_METADATA);

        if is_deleted(&event, &deletions) {
            return Err(ForumError::NotFound(format!("thread {} was deleted", thread_id)));
        }
        thread.apply_updates(&updates);
        Ok(thread)
    }

    /// Replies to a thread, oldest first.
    pub async fn list_replies(&self, thread_id: &str) -> Result<Vec<Reply>> {
        require_hex_key("thread id", thread_id)?;
        let events = self
            .relay
            .list(vec![
                Filter::new()
                    .kinds(vec![KIND_THREAD_MESSAGE])
                    .event_refs(vec![thread_id.to_string()]),
            ])
            .await?;
        let deletions = self.deletions_for(&events).await?;
        Ok(project_replies(thread_id, &events, &deletions))
    }

    pub async fn get_reply(&self, reply_id: &str) -> Result<Reply> {
        require_hex_key("reply id", reply_id)?;
        let event = self
            .relay
            .get_one(
                Filter::new()
                    .ids(vec![reply_id.to_string()])
                    .kinds(vec![KIND_THREAD_MESSAGE]),
            )
            .await
            .map_err(|e| not_found(e, "reply", reply_id))?;
        let reply = Reply::from_event(&event)?;

        let deletions = self.deletions_for(std::slice::from_ref(&event)).await?;
        if is_deleted(&event, &deletions) {
            return Err(ForumError::NotFound(format!("reply {} was deleted", reply_id)));
        }
        Ok(reply)
    }

    /// Comments on a reply, oldest first.
    pub async fn list_comments(&self, reply_id: &str) -> Result<Vec<Comment>> {
        require_hex_key("reply id", reply_id)?;
        let events = self
            .relay
            .list(vec![
                Filter::new()
                    .kinds(vec![KIND_THREAD_MESSAGE])
                    .event_refs(vec![reply_id.to_string()]),
            ])
            .await?;
        let deletions = self.deletions_for(&events).await?;
        Ok(project_comments(reply_id, &events, &deletions))
    }

    /// Latest profile record of `pubkey`.
    pub async fn get_profile(&self, pubkey: &str) -> Result<Metadata> {
        require_hex_key("public key", pubkey)?;
        let event = self
            .relay
            .get_one(
                Filter::new()
                    .kinds(vec![KIND_METADATA])
                    .authors(vec![pubkey.to_string()]),
            )
            .await
            .map_err(|e| not_found(e, "profile", pubkey))?;
        Metadata::from_json(&event.content).map_err(|e| ForumError::malformed(&event.id, e))
    }

    async fn deletions_for(&self, targets: &[Event]) -> Result<Vec<Event>> {
        if targets.is_empty() {
            return Ok(Vec::new());
        }
        let ids = targets.iter().map(|event| event.id.clone()).collect();
        Ok(self
            .relay
            .list(vec![
                Filter::new()
                    .kinds(vec![DELETION_REQUEST_KIND])
                    .event_refs(ids),
            ])
            .await?)
    }

    // Aggregates

    /// Signed vote score of an event.
    pub async fn vote_tally(&self, target_id: &str) -> Result<i64> {
        require_hex_key("target id", target_id)?;
        let events = self
            .relay
            .list(vec![
                Filter::new()
                    .kinds(vec![REACTION_KIND])
                    .event_refs(vec![target_id.to_string()]),
            ])
            .await?;
        Ok(vote_tally(target_id, &events))
    }

    /// Sats zapped to an event.
    pub async fn payment_total(&self, target_id: &str) -> Result<u64> {
        require_hex_key("target id", target_id)?;
        let events = self
            .relay
            .list(vec![
                Filter::new()
                    .kinds(vec![ZAP_RECEIPT_KIND])
                    .event_refs(vec![target_id.to_string()]),
            ])
            .await?;
        Ok(payment_total(target_id, &events))
    }

    /// Wait for the zap receipt that pays `bolt11` for `target_id`.
    ///
    /// Watches stored and new receipts; the subscription is closed as soon as
    /// one matches. Bounded by `payment_wait_timeout_secs` when configured.
    pub async fn wait_for_payment(&self, target_id: &str, bolt11: &str) -> Result<Event> {
        require_hex_key("target id", target_id)?;
        if bolt11.trim().is_empty() {
            return Err(ForumError::InvalidInput("invoice is empty".into()));
        }

        let mut subscription = self
            .relay
            .subscribe(vec![
                Filter::new()
                    .kinds(vec![ZAP_RECEIPT_KIND])
                    .event_refs(vec![target_id.to_string()]),
            ])
            .await?;
        debug!(
            "Waiting for receipt of {} on subscription {}",
            target_id,
            subscription.id()
        );

        let wait = async {
            while let Some(receipt) = subscription.recv().await {
                if settles_payment(&receipt, target_id, bolt11) {
                    return Ok(receipt);
                }
                debug!("Receipt {} does not match the invoice", receipt.id);
            }
            Err(ForumError::Transport(ClientError::SubscriptionClosed(
                "receipt subscription ended before payment".to_string(),
            )))
        };

        let result = match self.config.payment_wait_timeout() {
            Some(limit) => timeout(limit, wait).await.unwrap_or_else(|_| {
                Err(ForumError::Timeout(format!(
                    "a receipt on {} after {:?}",
                    target_id, limit
                )))
            }),
            None => wait.await,
        };
        subscription.cancel();

        if let Ok(receipt) = &result {
            info!("Payment for {} confirmed by receipt {}", target_id, receipt.id);
        }
        result
    }
}

impl Drop for ForumSession {
    fn drop(&mut self) {
        if let Some(task) = self.connectivity_task.get() {
            task.abort();
        }
    }
}

fn not_found(error: ClientError, what: &str, id: &str) -> ForumError {
    match error {
        ClientError::NotFound => ForumError::NotFound(format!("{} {}", what, id)),
        other => other.into(),
    }
}
