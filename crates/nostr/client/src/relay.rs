//! Single relay connection management
//!
//! One persistent WebSocket connection at a time. Each live connection gets a
//! reader task and a writer task; outgoing frames go through an unbounded
//! channel to the writer. Publish acknowledgements are correlated by event id
//! and query results by subscription id, never by arrival order.
//!
//! Every connection carries a generation number. Pending publishes and routes
//! remember the generation they were registered on, and a reader can only
//! change the shared state while its generation is the current one.

use crate::error::{ClientError, Result};
use crate::filter::Filter;
use crate::message::{ClientMessage, MessageError, RelayMessage};
use crate::subscription::{
    EventCallback, RouteGuard, Subscription, SubscriptionHandle, generate_subscription_id,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use nostr::{Event, sort_events, verify_event};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Disconnected
    Disconnected,
    /// Currently connecting
    Connecting,
    /// Connected and ready
    Connected,
}

/// Relay's answer to a published event
#[derive(Debug, Clone)]
pub struct PublishConfirmation {
    /// Event ID that was published
    pub event_id: String,
    /// Whether the relay accepted the event
    pub accepted: bool,
    /// Message from the relay (empty if accepted, reason if rejected)
    pub message: String,
}

/// Relay connection configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Connection timeout
    pub connect_timeout: Duration,
    /// How long to wait for `OK` after publishing. `None` waits indefinitely.
    pub publish_timeout: Option<Duration>,
    /// How long to wait for `EOSE` on a query. `None` waits indefinitely.
    pub query_timeout: Option<Duration>,
    /// Drop incoming events whose id or signature does not verify
    pub verify_events: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            publish_timeout: None,
            query_timeout: None,
            verify_events: true,
        }
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Outgoing half of the live connection.
#[derive(Clone)]
struct Link {
    generation: u64,
    url: String,
    outgoing: mpsc::UnboundedSender<Message>,
}

struct PendingPublish {
    generation: u64,
    tx: oneshot::Sender<PublishConfirmation>,
}

/// What a one-shot query sees on its route.
pub(crate) enum QueryMessage {
    Event(Event),
    Eose,
    Closed(String),
}

pub(crate) enum RouteSink {
    Query(mpsc::UnboundedSender<QueryMessage>),
    Stream(mpsc::UnboundedSender<Event>),
    Callback(EventCallback),
}

pub(crate) struct Route {
    generation: u64,
    filters: Vec<Filter>,
    sink: RouteSink,
    outgoing: mpsc::UnboundedSender<Message>,
}

/// State shared between the connection handle, its tasks and subscription guards.
pub(crate) struct Shared {
    state: watch::Sender<ConnectionState>,
    link: Mutex<Option<Link>>,
    last_error: Mutex<Option<String>>,
    pending: Mutex<HashMap<String, Vec<PendingPublish>>>,
    routes: Mutex<HashMap<String, Route>>,
    verify_events: bool,
}

impl Shared {
    fn new(verify_events: bool) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            state,
            link: Mutex::new(None),
            last_error: Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
            routes: Mutex::new(HashMap::new()),
            verify_events,
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn current_link(&self) -> Result<Link> {
        self.link.lock().clone().ok_or(ClientError::NotConnected)
    }

    fn current_generation(&self) -> Option<u64> {
        self.link.lock().as_ref().map(|link| link.generation)
    }

    fn install_link(&self, link: Link) {
        *self.link.lock() = Some(link);
        *self.last_error.lock() = None;
        self.set_state(ConnectionState::Connected);
    }

    fn fail_connect(&self, error: String) {
        *self.last_error.lock() = Some(error);
        self.set_state(ConnectionState::Disconnected);
    }

    /// Tear down everything registered on `generation`.
    ///
    /// Dropping the pending senders and route sinks is what makes in-flight
    /// calls fail with `ConnectionClosed`.
    fn connection_ended(&self, generation: u64, error: Option<String>) {
        let ended = {
            let mut link = self.link.lock();
            if link.as_ref().map(|l| l.generation) == Some(generation) {
                link.take()
            } else {
                None
            }
        };

        if let Some(link) = ended {
            if let Some(error) = error {
                *self.last_error.lock() = Some(error);
            }
            self.set_state(ConnectionState::Disconnected);
            let _ = link.outgoing.send(Message::Close(None));
            info!("Connection to {} ended", link.url);
        }

        self.pending.lock().retain(|_, waiters| {
            waiters.retain(|waiter| waiter.generation != generation);
            !waiters.is_empty()
        });
        self.routes
            .lock()
            .retain(|_, route| route.generation != generation);
    }

    fn register_pending(
        &self,
        generation: u64,
        event_id: &str,
        tx: oneshot::Sender<PublishConfirmation>,
    ) -> Result<()> {
        let mut pending = self.pending.lock();
        if self.current_generation() != Some(generation) {
            return Err(ClientError::ConnectionClosed);
        }
        pending
            .entry(event_id.to_string())
            .or_default()
            .push(PendingPublish { generation, tx });
        Ok(())
    }

    /// Forget waiters whose caller has gone away.
    fn prune_pending(&self, event_id: &str) {
        let mut pending = self.pending.lock();
        if let Some(waiters) = pending.get_mut(event_id) {
            waiters.retain(|waiter| !waiter.tx.is_closed());
            if waiters.is_empty() {
                pending.remove(event_id);
            }
        }
    }

    fn register_route(&self, subscription_id: &str, route: Route) -> Result<()> {
        let mut routes = self.routes.lock();
        if self.current_generation() != Some(route.generation) {
            return Err(ClientError::ConnectionClosed);
        }
        routes.insert(subscription_id.to_string(), route);
        Ok(())
    }

    fn remove_route(&self, subscription_id: &str) -> Option<Route> {
        self.routes.lock().remove(subscription_id)
    }

    pub(crate) fn has_route(&self, subscription_id: &str) -> bool {
        self.routes.lock().contains_key(subscription_id)
    }

    /// Remove a live route and tell the relay to stop sending.
    pub(crate) fn cancel_route(&self, subscription_id: &str) {
        if let Some(route) = self.remove_route(subscription_id) {
            debug!("Cancelling subscription {}", subscription_id);
            send_close(&route.outgoing, subscription_id);
        }
    }

    fn handle_text(&self, generation: u64, text: &str) {
        let message = match RelayMessage::from_json(text) {
            Ok(message) => message,
            Err(MessageError::UnknownType(kind)) => {
                debug!("Ignoring unknown relay message type {}", kind);
                return;
            }
            Err(e) => {
                warn!("Failed to parse relay message: {}", e);
                return;
            }
        };

        match message {
            RelayMessage::Event {
                subscription_id,
                event,
            } => self.dispatch_event(generation, &subscription_id, event),
            RelayMessage::Ok {
                event_id,
                success,
                message,
            } => {
                let waiters = self.pending.lock().remove(&event_id);
                match waiters {
                    Some(waiters) => {
                        for waiter in waiters {
                            let _ = waiter.tx.send(PublishConfirmation {
                                event_id: event_id.clone(),
                                accepted: success,
                                message: message.clone(),
                            });
                        }
                    }
                    None => debug!("OK for unknown event {}", event_id),
                }
            }
            RelayMessage::Eose { subscription_id } => {
                let routes = self.routes.lock();
                match routes.get(&subscription_id).map(|route| &route.sink) {
                    Some(RouteSink::Query(tx)) => {
                        let _ = tx.send(QueryMessage::Eose);
                    }
                    Some(_) => debug!("Stored events done for {}", subscription_id),
                    None => {}
                }
            }
            RelayMessage::Closed {
                subscription_id,
                message,
            } => {
                if let Some(route) = self.remove_route(&subscription_id) {
                    warn!("Relay closed subscription {}: {}", subscription_id, message);
                    if let RouteSink::Query(tx) = route.sink {
                        let _ = tx.send(QueryMessage::Closed(message));
                    }
                }
            }
            RelayMessage::Notice { message } => info!("Relay notice: {}", message),
            RelayMessage::Auth { .. } => debug!("Ignoring AUTH challenge"),
            RelayMessage::Count {
                subscription_id,
                count,
            } => debug!("COUNT {} for {}", count, subscription_id),
        }
    }

    fn dispatch_event(&self, generation: u64, subscription_id: &str, event: Event) {
        if self.verify_events && !verify_event(&event) {
            warn!(
                "Dropping event {} on {}: id or signature does not verify",
                event.id, subscription_id
            );
            return;
        }

        let mut routes = self.routes.lock();
        let Some(route) = routes.get(subscription_id) else {
            debug!("Event for inactive subscription {}", subscription_id);
            return;
        };
        if route.generation != generation {
            return;
        }
        if !route.filters.iter().any(|filter| filter.matches(&event)) {
            debug!(
                "Dropping event {} on {}: does not match filters",
                event.id, subscription_id
            );
            return;
        }

        let delivered = match &route.sink {
            RouteSink::Query(tx) => tx.send(QueryMessage::Event(event)).is_ok(),
            RouteSink::Stream(tx) => tx.send(event).is_ok(),
            RouteSink::Callback(callback) => {
                callback(event);
                true
            }
        };

        if !delivered {
            debug!("Subscription {} receiver gone, removing", subscription_id);
            if let Some(route) = routes.remove(subscription_id) {
                send_close(&route.outgoing, subscription_id);
            }
        }
    }
}

fn send_close(outgoing: &mpsc::UnboundedSender<Message>, subscription_id: &str) {
    let close = ClientMessage::Close {
        subscription_id: subscription_id.to_string(),
    };
    if let Ok(frame) = close.to_json() {
        let _ = outgoing.send(Message::Text(frame.into()));
    }
}

fn warn_on_empty(filters: &[Filter]) {
    if filters.is_empty() || filters.iter().any(Filter::is_empty) {
        warn!("Sending a filter with no constraints; the relay may return everything");
    }
}

/// Validate a relay URL.
pub fn parse_relay_url(url: &str) -> Result<Url> {
    let url = Url::parse(url)?;
    if url.scheme() != "ws" && url.scheme() != "wss" {
        return Err(ClientError::InvalidUrl(format!(
            "URL must use ws:// or wss:// scheme, got: {}",
            url.scheme()
        )));
    }
    Ok(url)
}

async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(frame) = outgoing.recv().await {
        let closing = matches!(frame, Message::Close(_));
        if let Err(e) = sink.send(frame).await {
            debug!("WebSocket write failed: {}", e);
            break;
        }
        if closing {
            break;
        }
    }
    let _ = sink.close().await;
}

async fn read_loop(
    shared: Arc<Shared>,
    generation: u64,
    mut stream: SplitStream<WsStream>,
    outgoing: mpsc::UnboundedSender<Message>,
) {
    let mut error = None;

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => shared.handle_text(generation, text.as_str()),
            Ok(Message::Ping(data)) => {
                let _ = outgoing.send(Message::Pong(data));
            }
            Ok(Message::Close(_)) => {
                info!("Relay closed connection");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket error: {}", e);
                error = Some(e.to_string());
                break;
            }
        }
    }

    shared.connection_ended(generation, error);
}

struct LiveConnection {
    generation: u64,
    outgoing: mpsc::UnboundedSender<Message>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

/// Relay connection
pub struct RelayConnection {
    config: RelayConfig,
    shared: Arc<Shared>,
    live: tokio::sync::Mutex<Option<LiveConnection>>,
    generation: AtomicU64,
}

impl Default for RelayConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayConnection {
    /// Create a relay connection with default config (does not connect yet)
    pub fn new() -> Self {
        Self::with_config(RelayConfig::default())
    }

    pub fn with_config(config: RelayConfig) -> Self {
        Self {
            shared: Arc::new(Shared::new(config.verify_events)),
            config,
            live: tokio::sync::Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Connect to `url`, closing any existing connection first.
    pub async fn connect(&self, url: &str) -> Result<()> {
        let url = parse_relay_url(url)?;

        let mut live = self.live.lock().await;
        if let Some(previous) = live.take() {
            info!("Closing current connection before connecting to {}", url);
            self.teardown(previous).await;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.set_state(ConnectionState::Connecting);
        info!("Connecting to relay: {}", url);

        let stream = match timeout(self.config.connect_timeout, connect_async(url.as_str())).await
        {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => {
                self.shared.fail_connect(e.to_string());
                return Err(ClientError::WebSocket(e.to_string()));
            }
            Err(_) => {
                let message = format!(
                    "connection to open after {:?}",
                    self.config.connect_timeout
                );
                self.shared.fail_connect(message.clone());
                return Err(ClientError::Timeout(message));
            }
        };

        let (sink, stream) = stream.split();
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();

        self.shared.install_link(Link {
            generation,
            url: url.to_string(),
            outgoing: outgoing.clone(),
        });
        let writer = tokio::spawn(write_loop(sink, outgoing_rx));
        let reader = tokio::spawn(read_loop(
            Arc::clone(&self.shared),
            generation,
            stream,
            outgoing.clone(),
        ));

        *live = Some(LiveConnection {
            generation,
            outgoing,
            writer,
            reader,
        });

        info!("Connected to relay: {}", url);
        Ok(())
    }

    /// Close the current connection, if any.
    pub async fn disconnect(&self) -> Result<()> {
        let mut live = self.live.lock().await;
        if let Some(previous) = live.take() {
            info!("Disconnecting from relay");
            self.teardown(previous).await;
        }
        Ok(())
    }

    /// Send CLOSE, let the writer flush it, stop the reader, then fail
    /// everything still waiting on this connection.
    async fn teardown(&self, mut connection: LiveConnection) {
        let _ = connection.outgoing.send(Message::Close(None));
        if timeout(self.config.connect_timeout, &mut connection.writer)
            .await
            .is_err()
        {
            connection.writer.abort();
        }
        connection.reader.abort();
        self.shared.connection_ended(connection.generation, None);
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Watch connection state changes. Only the latest state is kept.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// URL of the live connection.
    pub fn url(&self) -> Option<String> {
        self.shared.link.lock().as_ref().map(|link| link.url.clone())
    }

    /// Most recent connection error, cleared on successful connect.
    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error.lock().clone()
    }

    /// Ids of subscriptions with a registered route.
    pub fn active_subscriptions(&self) -> Vec<String> {
        self.shared.routes.lock().keys().cloned().collect()
    }

    /// Publish an event and wait for the relay's `OK`.
    ///
    /// Returns the event id when accepted.
    pub async fn publish(&self, event: &Event) -> Result<String> {
        let link = self.shared.current_link()?;
        let frame = ClientMessage::Event(event.clone()).to_json()?;

        let (tx, rx) = oneshot::channel();
        self.shared.register_pending(link.generation, &event.id, tx)?;

        if link.outgoing.send(Message::Text(frame.into())).is_err() {
            drop(rx);
            self.shared.prune_pending(&event.id);
            return Err(ClientError::ConnectionClosed);
        }
        debug!("Published event {} to {}", event.id, link.url);

        let confirmation = match self.config.publish_timeout {
            Some(limit) => match timeout(limit, rx).await {
                Ok(result) => result,
                Err(_) => {
                    self.shared.prune_pending(&event.id);
                    return Err(ClientError::Timeout(format!(
                        "OK for {} after {:?}",
                        event.id, limit
                    )));
                }
            },
            None => rx.await,
        }
        .map_err(|_| ClientError::ConnectionClosed)?;

        if confirmation.accepted {
            Ok(confirmation.event_id)
        } else {
            Err(ClientError::PublishRejected {
                event_id: confirmation.event_id,
                reason: confirmation.message,
            })
        }
    }

    /// Fetch stored events matching any of `filters`.
    ///
    /// Collects until `EOSE`, then closes the subscription. Events are
    /// returned in arrival order with duplicate ids removed.
    pub async fn list(&self, filters: Vec<Filter>) -> Result<Vec<Event>> {
        let link = self.shared.current_link()?;
        warn_on_empty(&filters);

        let subscription_id = generate_subscription_id();
        let frame = ClientMessage::Req {
            subscription_id: subscription_id.clone(),
            filters: filters.clone(),
        }
        .to_json()?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        self.shared.register_route(
            &subscription_id,
            Route {
                generation: link.generation,
                filters,
                sink: RouteSink::Query(tx),
                outgoing: link.outgoing.clone(),
            },
        )?;

        if link.outgoing.send(Message::Text(frame.into())).is_err() {
            self.shared.remove_route(&subscription_id);
            return Err(ClientError::ConnectionClosed);
        }

        let collect = async {
            let mut seen = HashSet::new();
            let mut events = Vec::new();
            loop {
                match rx.recv().await {
                    Some(QueryMessage::Event(event)) => {
                        if seen.insert(event.id.clone()) {
                            events.push(event);
                        }
                    }
                    Some(QueryMessage::Eose) => return Ok(events),
                    Some(QueryMessage::Closed(reason)) => {
                        return Err(ClientError::SubscriptionClosed(reason));
                    }
                    None => return Err(ClientError::ConnectionClosed),
                }
            }
        };

        let result = match self.config.query_timeout {
            Some(limit) => timeout(limit, collect).await.unwrap_or_else(|_| {
                Err(ClientError::Timeout(format!(
                    "EOSE on {} after {:?}",
                    subscription_id, limit
                )))
            }),
            None => collect.await,
        };

        // Still routed means the relay has not closed it; tell it we are done.
        if self.shared.remove_route(&subscription_id).is_some() {
            send_close(&link.outgoing, &subscription_id);
        }

        if let Ok(events) = &result {
            debug!("Query {} returned {} events", subscription_id, events.len());
        }
        result
    }

    /// Fetch the single newest event matching `filter`.
    pub async fn get_one(&self, filter: Filter) -> Result<Event> {
        let mut events = self.list(vec![filter.limit(1)]).await?;
        sort_events(&mut events);
        events.into_iter().next().ok_or(ClientError::NotFound)
    }

    /// Open a live subscription delivering events through a channel.
    pub async fn subscribe(&self, filters: Vec<Filter>) -> Result<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        let guard = self.open_live(filters, RouteSink::Stream(tx))?;
        Ok(Subscription::new(rx, guard))
    }

    /// Open a live subscription invoking `callback` for each event.
    pub async fn subscribe_with_callback(
        &self,
        filters: Vec<Filter>,
        callback: EventCallback,
    ) -> Result<SubscriptionHandle> {
        let guard = self.open_live(filters, RouteSink::Callback(callback))?;
        Ok(SubscriptionHandle::new(guard))
    }

    fn open_live(&self, filters: Vec<Filter>, sink: RouteSink) -> Result<RouteGuard> {
        let link = self.shared.current_link()?;
        warn_on_empty(&filters);

        let subscription_id = generate_subscription_id();
        let frame = ClientMessage::Req {
            subscription_id: subscription_id.clone(),
            filters: filters.clone(),
        }
        .to_json()?;

        self.shared.register_route(
            &subscription_id,
            Route {
                generation: link.generation,
                filters,
                sink,
                outgoing: link.outgoing.clone(),
            },
        )?;

        if link.outgoing.send(Message::Text(frame.into())).is_err() {
            self.shared.remove_route(&subscription_id);
            return Err(ClientError::ConnectionClosed);
        }

        debug!("Opened subscription {} on {}", subscription_id, link.url);
        Ok(RouteGuard::new(subscription_id, Arc::clone(&self.shared)))
    }
}

impl Drop for RelayConnection {
    fn drop(&mut self) {
        if let Some(connection) = self.live.get_mut().take() {
            let _ = connection.outgoing.send(Message::Close(None));
            connection.reader.abort();
            self.shared.connection_ended(connection.generation, None);
        }
    }
}
