//! In-process NIP-01 relay for tests.
//!
//! Stores events in memory, answers `REQ` with stored matches then `EOSE`,
//! keeps live subscriptions open and fans newly accepted events out to them.
//! Switches let a test make the relay reject publishes, stay silent, close
//! subscriptions, or drop every socket.

use futures::{SinkExt, StreamExt};
use nostr::{Event, sort_events};
use nostr_client::{ClientMessage, Filter, RelayMessage};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::debug;

#[derive(Debug, Default, Clone)]
struct Behavior {
    reject_reason: Option<String>,
    silent: bool,
    close_reason: Option<String>,
}

struct Connection {
    outgoing: mpsc::UnboundedSender<Message>,
    subscriptions: HashMap<String, Vec<Filter>>,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct RelayState {
    events: Mutex<Vec<Event>>,
    received: Mutex<Vec<String>>,
    behavior: Mutex<Behavior>,
    connections: Mutex<HashMap<u64, Connection>>,
    accepted: AtomicU64,
}

impl RelayState {
    fn send(&self, connection_id: u64, message: RelayMessage) {
        if let Some(connection) = self.connections.lock().get(&connection_id) {
            let _ = connection
                .outgoing
                .send(Message::Text(message.to_json().into()));
        }
    }

    /// Store an event (unless already present) and deliver it to live subscriptions.
    fn accept_event(&self, event: Event) {
        {
            let mut events = self.events.lock();
            if events.iter().any(|stored| stored.id == event.id) {
                return;
            }
            events.push(event.clone());
        }

        let connections = self.connections.lock();
        for connection in connections.values() {
            for (subscription_id, filters) in &connection.subscriptions {
                if filters.iter().any(|filter| filter.matches(&event)) {
                    let frame = RelayMessage::Event {
                        subscription_id: subscription_id.clone(),
                        event: event.clone(),
                    };
                    let _ = connection
                        .outgoing
                        .send(Message::Text(frame.to_json().into()));
                }
            }
        }
    }

    fn stored_matches(&self, filters: &[Filter]) -> Vec<Event> {
        let mut stored = self.events.lock().clone();
        sort_events(&mut stored);

        let mut matches: Vec<Event> = Vec::new();
        for filter in filters {
            let limit = filter.limit.map(|n| n as usize).unwrap_or(usize::MAX);
            for event in stored.iter().filter(|e| filter.matches(e)).take(limit) {
                if !matches.iter().any(|m| m.id == event.id) {
                    matches.push(event.clone());
                }
            }
        }
        matches
    }

    fn handle_frame(&self, connection_id: u64, text: &str) {
        self.received.lock().push(text.to_string());
        let behavior = self.behavior.lock().clone();

        let message = match ClientMessage::from_json(text) {
            Ok(message) => message,
            Err(e) => {
                self.send(
                    connection_id,
                    RelayMessage::Notice {
                        message: format!("error: {}", e),
                    },
                );
                return;
            }
        };

        match message {
            ClientMessage::Event(event) => {
                if behavior.silent {
                    return;
                }
                if let Some(reason) = behavior.reject_reason {
                    self.send(
                        connection_id,
                        RelayMessage::Ok {
                            event_id: event.id,
                            success: false,
                            message: reason,
                        },
                    );
                    return;
                }

                let event_id = event.id.clone();
                let valid = nostr::verify_event(&event);
                if valid {
                    self.accept_event(event);
                }
                self.send(
                    connection_id,
                    RelayMessage::Ok {
                        event_id,
                        success: valid,
                        message: if valid {
                            String::new()
                        } else {
                            "invalid: bad signature".to_string()
                        },
                    },
                );
            }
            ClientMessage::Req {
                subscription_id,
                filters,
            } => {
                if let Some(reason) = behavior.close_reason {
                    self.send(
                        connection_id,
                        RelayMessage::Closed {
                            subscription_id,
                            message: reason,
                        },
                    );
                    return;
                }

                for event in self.stored_matches(&filters) {
                    self.send(
                        connection_id,
                        RelayMessage::Event {
                            subscription_id: subscription_id.clone(),
                            event,
                        },
                    );
                }
                if let Some(connection) = self.connections.lock().get_mut(&connection_id) {
                    connection
                        .subscriptions
                        .insert(subscription_id.clone(), filters);
                }
                if !behavior.silent {
                    self.send(connection_id, RelayMessage::Eose { subscription_id });
                }
            }
            ClientMessage::Close { subscription_id } => {
                if let Some(connection) = self.connections.lock().get_mut(&connection_id) {
                    connection.subscriptions.remove(&subscription_id);
                }
            }
        }
    }
}

/// A running mock relay bound to an ephemeral localhost port.
pub struct MockRelay {
    addr: SocketAddr,
    state: Arc<RelayState>,
    accept_task: JoinHandle<()>,
}

impl MockRelay {
    pub async fn start() -> Self {
        crate::init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock relay");
        let addr = listener.local_addr().expect("mock relay address");
        let state = Arc::new(RelayState::default());

        let accept_state = Arc::clone(&state);
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let connection_id = accept_state.accepted.fetch_add(1, Ordering::SeqCst);
                let state = Arc::clone(&accept_state);
                let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
                let mut connections = accept_state.connections.lock();
                let task = tokio::spawn(serve_connection(state, connection_id, stream, outgoing_rx));
                connections.insert(
                    connection_id,
                    Connection {
                        outgoing,
                        subscriptions: HashMap::new(),
                        task,
                    },
                );
            }
        });

        Self {
            addr,
            state,
            accept_task,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Seed an event as if another client had published it.
    pub fn insert(&self, event: Event) {
        self.state.accept_event(event);
    }

    pub fn stored_events(&self) -> Vec<Event> {
        self.state.events.lock().clone()
    }

    /// Raw frames received from clients, in arrival order.
    pub fn received_frames(&self) -> Vec<String> {
        self.state.received.lock().clone()
    }

    /// Number of frames received that start with `["<kind>"`.
    pub fn frames_of_type(&self, kind: &str) -> usize {
        let prefix = format!("[\"{}\"", kind);
        self.state
            .received
            .lock()
            .iter()
            .filter(|frame| frame.starts_with(&prefix))
            .count()
    }

    /// Answer every publish with `OK false` and this reason; `None` accepts again.
    pub fn reject_publishes(&self, reason: Option<&str>) {
        self.state.behavior.lock().reject_reason = reason.map(str::to_string);
    }

    /// Stop answering publishes and withhold `EOSE`.
    pub fn set_silent(&self, silent: bool) {
        self.state.behavior.lock().silent = silent;
    }

    /// Answer every `REQ` with `CLOSED` and this reason.
    pub fn close_subscriptions(&self, reason: Option<&str>) {
        self.state.behavior.lock().close_reason = reason.map(str::to_string);
    }

    /// Open client sockets.
    pub fn connection_count(&self) -> usize {
        self.state.connections.lock().len()
    }

    /// Live subscriptions across all connections.
    pub fn subscription_count(&self) -> usize {
        self.state
            .connections
            .lock()
            .values()
            .map(|connection| connection.subscriptions.len())
            .sum()
    }

    /// Drop every client socket without a close handshake.
    pub fn drop_connections(&self) {
        let connections: Vec<Connection> =
            self.state.connections.lock().drain().map(|(_, c)| c).collect();
        for connection in connections {
            connection.task.abort();
        }
    }
}

impl Drop for MockRelay {
    fn drop(&mut self) {
        self.accept_task.abort();
        self.drop_connections();
    }
}

async fn serve_connection(
    state: Arc<RelayState>,
    connection_id: u64,
    stream: TcpStream,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
) {
    let socket = match accept_async(stream).await {
        Ok(socket) => socket,
        Err(e) => {
            debug!("mock relay handshake failed: {}", e);
            state.connections.lock().remove(&connection_id);
            return;
        }
    };
    let (mut sink, mut frames) = socket.split();

    loop {
        tokio::select! {
            frame = frames.next() => match frame {
                Some(Ok(Message::Text(text))) => state.handle_frame(connection_id, text.as_str()),
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
            Some(message) = outgoing.recv() => {
                if sink.send(message).await.is_err() {
                    break;
                }
            }
        }
    }

    state.connections.lock().remove(&connection_id);
    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{signed_event, tag, test_keypair};
    use tokio_tungstenite::connect_async;

    #[tokio::test]
    async fn test_mock_relay_answers_req_with_eose() {
        let relay = MockRelay::start().await;
        let keys = test_keypair(1);
        relay.insert(signed_event(&keys, 40, vec![tag(&["t", "forum"])], "{}", 1));

        let (mut ws, _) = connect_async(relay.url()).await.unwrap();
        ws.send(Message::Text(r##"["REQ","s1",{"#t":["forum"]}]"##.into()))
            .await
            .unwrap();

        let first = ws.next().await.unwrap().unwrap();
        assert!(first.to_text().unwrap().starts_with(r#"["EVENT","s1""#));
        let second = ws.next().await.unwrap().unwrap();
        assert_eq!(second.to_text().unwrap(), r#"["EOSE","s1"]"#);
    }
}
