//! Matching Client Runtime
//!
//! Blocking client API over a background receive loop. [`Chimera`]
//! talks to a real server over WebSocket; [`FakeChimera`] runs against
//! an in-process [`FakeServer`] with identical observable behavior, so
//! tests written against one hold for the other.

pub mod api;
pub mod connector;

pub use api::{ClientError, ErrorDetails, Game, Match, MatchNotification, NotificationCallback};
pub use connector::{Connector, FakeConnector, WebSocketConnector};

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::authoring::GameFactory;
use crate::backend::fake::FakeServer;
use api::ApiCore;

/// Client for a running Chimera server.
///
/// ```no_run
/// use chimera::client::Chimera;
///
/// let chimera = Chimera::connect("127.0.0.1", 14200)?;
/// let games = chimera.get_games()?;
/// let m = games["connectm"].create_match("Alex")?;
/// # Ok::<(), chimera::client::ClientError>(())
/// ```
pub struct Chimera {
    core: Arc<ApiCore>,
    connector: Arc<WebSocketConnector>,
}

impl fmt::Debug for Chimera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chimera").finish()
    }
}

impl Chimera {
    /// Connect to a server. See [`crate::protocol::DEFAULT_PORT`] for the
    /// conventional port.
    pub fn connect(host: &str, port: u16) -> Result<Self, ClientError> {
        Self::connect_with(host, port, None)
    }

    /// Connect with a notification callback installed from the start.
    /// When a callback is set, notifications bypass the per-match queues
    /// and are delivered on the receive context.
    pub fn connect_with(
        host: &str,
        port: u16,
        callback: Option<NotificationCallback>,
    ) -> Result<Self, ClientError> {
        let connector = WebSocketConnector::connect(host, port)?;
        let core = ApiCore::new(connector.clone());
        if callback.is_some() {
            core.set_notification_callback(callback);
        }
        connector.set_router(Arc::downgrade(&core));
        Ok(Chimera { core, connector })
    }

    /// Fetch the server's game catalog, keyed by game id.
    pub fn get_games(&self) -> Result<HashMap<String, Game>, ClientError> {
        ApiCore::get_games(&self.core)
    }

    /// Install or clear the notification callback.
    pub fn set_notification_callback(&self, callback: Option<NotificationCallback>) {
        self.core.set_notification_callback(callback);
    }

    /// Tear the connection down. Outstanding requests fail with
    /// [`ClientError::ConnectionClosed`].
    pub fn disconnect(&self) {
        self.connector.disconnect();
    }
}

impl Drop for Chimera {
    fn drop(&mut self) {
        self.connector.disconnect();
    }
}

/// Client API bound to an in-process fake server. Notifications are
/// collected until [`FakeChimera::process_notifications`] routes them.
pub struct FakeChimera {
    core: Arc<ApiCore>,
    connector: Arc<FakeConnector>,
}

impl Default for FakeChimera {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeChimera {
    /// Fake client with its own private fake server.
    pub fn new() -> Self {
        Self::with_server(Arc::new(Mutex::new(FakeServer::new())))
    }

    /// Fake client attached to a shared fake server, so several clients
    /// can play against each other.
    pub fn with_server(server: Arc<Mutex<FakeServer>>) -> Self {
        let connector = Arc::new(FakeConnector::new(server));
        let core = ApiCore::new(connector.clone());
        connector.set_router(Arc::downgrade(&core));
        FakeChimera { core, connector }
    }

    /// Like [`FakeChimera::with_server`], with a notification callback
    /// installed from the start.
    pub fn with_callback(server: Arc<Mutex<FakeServer>>, callback: NotificationCallback) -> Self {
        let client = Self::with_server(server);
        client.core.set_notification_callback(Some(callback));
        client
    }

    /// Register a game in the fake server.
    pub fn add_game(&self, game_id: &str, factory: GameFactory, description: &str) {
        self.connector.add_game(game_id, factory, description);
    }

    /// Fetch the game catalog, keyed by game id.
    pub fn get_games(&self) -> Result<HashMap<String, Game>, ClientError> {
        ApiCore::get_games(&self.core)
    }

    /// Install or clear the notification callback.
    pub fn set_notification_callback(&self, callback: Option<NotificationCallback>) {
        self.core.set_notification_callback(callback);
    }

    /// Route every notification the fake server has produced so far.
    /// With no real receive loop, delivery is explicit.
    pub fn process_notifications(&self) {
        self.connector.process_notifications();
    }
}
