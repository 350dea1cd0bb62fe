//! Live subscriptions.
//!
//! A live subscription stays open until cancelled. Cancelling removes the
//! route under the same lock the dispatcher holds while delivering, so once
//! `cancel` returns no further event reaches the subscriber. Dropping a
//! [`Subscription`] or [`SubscriptionHandle`] cancels it.

use crate::relay::Shared;
use nostr::Event;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Callback invoked for every event delivered to a callback subscription.
///
/// Runs on the connection's reader task while the route table is locked; it
/// must not call back into the connection.
pub type EventCallback = Arc<dyn Fn(Event) + Send + Sync>;

/// Generate a unique subscription ID.
pub fn generate_subscription_id() -> String {
    Uuid::new_v4().to_string()[..8].to_string()
}

/// Removes the route when dropped.
pub(crate) struct RouteGuard {
    id: String,
    shared: Arc<Shared>,
}

impl RouteGuard {
    pub(crate) fn new(id: String, shared: Arc<Shared>) -> Self {
        Self { id, shared }
    }
}

impl Drop for RouteGuard {
    fn drop(&mut self) {
        self.shared.cancel_route(&self.id);
    }
}

/// A live subscription delivering events through a channel.
pub struct Subscription {
    events: mpsc::UnboundedReceiver<Event>,
    guard: RouteGuard,
}

impl Subscription {
    pub(crate) fn new(events: mpsc::UnboundedReceiver<Event>, guard: RouteGuard) -> Self {
        Self { events, guard }
    }

    pub fn id(&self) -> &str {
        &self.guard.id
    }

    /// Next matching event. `None` once the relay closed the subscription or
    /// the connection ended.
    pub async fn recv(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    /// Stop the subscription and send `CLOSE` to the relay.
    pub fn cancel(self) {
        drop(self.guard);
    }
}

/// Handle to a callback subscription.
pub struct SubscriptionHandle {
    guard: RouteGuard,
}

impl SubscriptionHandle {
    pub(crate) fn new(guard: RouteGuard) -> Self {
        Self { guard }
    }

    pub fn id(&self) -> &str {
        &self.guard.id
    }

    /// Whether the route is still registered on the connection.
    pub fn is_active(&self) -> bool {
        self.guard.shared.has_route(&self.guard.id)
    }

    /// Stop the subscription. No callback runs after this returns.
    pub fn cancel(self) {
        drop(self.guard);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id()).finish()
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id())
            .finish()
    }
}
