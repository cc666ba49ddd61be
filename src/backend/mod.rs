//! Server Backend
//!
//! The transport-independent dispatcher plus its transports: the
//! WebSocket front door and the in-process fake used by tests.

pub mod fake;
pub mod matches;
pub mod server;
pub mod slug;
pub mod websocket;

pub use fake::{FakeClient, FakeServer};
pub use server::{ChimeraServer, ClientId, MessageSink, RegisteredGame};
pub use websocket::{WsServer, WsServerConfig, WsServerError};
