//! In-Process Fake Transport
//!
//! Feeds raw frames straight into the dispatcher and collects the
//! outbound stream into per-client mailboxes, bypassing the network
//! layer entirely. Exhibits the same observable
//! request -> response -> notification ordering as the WebSocket
//! transport, so tests written against one are valid against the other.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::error;

use crate::authoring::GameFactory;
use crate::backend::server::{ChimeraServer, ClientId, MessageSink};
use crate::backend::slug::SlugSource;
use crate::protocol::Outbound;

#[derive(Default)]
struct Mailbox {
    responses: VecDeque<Value>,
    notifications: VecDeque<Value>,
}

/// Handle to a fake connection: the client id plus its mailbox.
#[derive(Clone)]
pub struct FakeClient {
    /// Dispatcher-side id of this connection.
    pub id: ClientId,
    mailbox: Arc<Mutex<Mailbox>>,
}

impl FakeClient {
    fn mailbox(&self) -> std::sync::MutexGuard<'_, Mailbox> {
        // Mailbox poisoning only happens if a test already panicked.
        self.mailbox.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Pop the oldest undelivered response, if any.
    pub fn next_response(&self) -> Option<Value> {
        self.mailbox().responses.pop_front()
    }

    /// Pop the oldest undelivered notification, if any.
    pub fn next_notification(&self) -> Option<Value> {
        self.mailbox().notifications.pop_front()
    }

    /// Undelivered response count.
    pub fn num_responses(&self) -> usize {
        self.mailbox().responses.len()
    }

    /// Undelivered notification count.
    pub fn num_notifications(&self) -> usize {
        self.mailbox().notifications.len()
    }

    /// Drain every undelivered notification, oldest first.
    pub fn drain_notifications(&self) -> Vec<Value> {
        self.mailbox().notifications.drain(..).collect()
    }
}

struct FakeSink {
    mailbox: Arc<Mutex<Mailbox>>,
}

impl MessageSink for FakeSink {
    fn send(&mut self, msg: &Outbound) {
        let value = match serde_json::to_value(msg) {
            Ok(value) => value,
            Err(e) => {
                error!("failed to serialize outbound message: {e}");
                return;
            }
        };
        let mut mailbox = self.mailbox.lock().unwrap_or_else(|e| e.into_inner());
        match msg {
            Outbound::Response(_) => mailbox.responses.push_back(value),
            Outbound::Notification(_) => mailbox.notifications.push_back(value),
        }
    }
}

/// A match server without a network: the dispatcher plus fake clients.
pub struct FakeServer {
    server: ChimeraServer,
}

impl Default for FakeServer {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeServer {
    /// Fake server with the default slug source.
    pub fn new() -> Self {
        FakeServer {
            server: ChimeraServer::new(),
        }
    }

    /// Fake server with a caller-provided (usually deterministic) slug
    /// source.
    pub fn with_slug_source(slugs: SlugSource) -> Self {
        FakeServer {
            server: ChimeraServer::with_slug_source(slugs),
        }
    }

    /// Register a game with the underlying dispatcher.
    pub fn register_game(&mut self, game_id: &str, factory: GameFactory, description: &str) {
        self.server.register_game(game_id, factory, description);
    }

    /// Attach a fake connection.
    pub fn create_client(&mut self) -> FakeClient {
        let mailbox = Arc::new(Mutex::new(Mailbox::default()));
        let id = self.server.connect_client(Box::new(FakeSink {
            mailbox: mailbox.clone(),
        }));
        FakeClient { id, mailbox }
    }

    /// Detach a fake connection.
    pub fn disconnect(&mut self, client: &FakeClient) {
        self.server.disconnect_client(client.id);
    }

    /// Feed one raw frame from the given client into the dispatcher.
    /// Responses and notifications land in the mailboxes synchronously.
    pub fn send_message(&mut self, client: &FakeClient, raw: &str) {
        self.server.process_message(client.id, raw);
    }

    /// The underlying dispatcher, for state inspection.
    pub fn server(&self) -> &ChimeraServer {
        &self.server
    }
}
