//! # Chimera Match Server
//!
//! Game-agnostic multiplayer match server and matching client runtime.
//! Clients discover games, create or join matches, submit game-specific
//! actions and receive asynchronous match-state notifications over one
//! duplex JSON channel; concrete games plug in through a small
//! authoring contract.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       CHIMERA SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  protocol.rs     - Wire envelope, validation, error codes    │
//! │  authoring.rs    - Plug-in game contract                     │
//! │                                                              │
//! │  backend/        - Server side                               │
//! │  ├── server.rs   - Dispatcher & match registries             │
//! │  ├── matches.rs  - Per-match lifecycle state                 │
//! │  ├── slug.rs     - Two-word match ids                        │
//! │  ├── websocket.rs- WebSocket transport                       │
//! │  └── fake.rs     - In-process transport for tests            │
//! │                                                              │
//! │  client/         - Client side                               │
//! │  ├── connector.rs- I/O loop, request/response correlation    │
//! │  └── api.rs      - Game/Match handles, notifications         │
//! │                                                              │
//! │  games/          - Built-in example games                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ordering Guarantee
//!
//! For any single request, the acting client observes its response
//! strictly before any notification that request caused, and fan-out to
//! subscribers follows action serialization order. Both transports (the
//! WebSocket one and the in-process fake) exhibit the same observable
//! ordering, so tests written against one hold for the other.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod authoring;
pub mod backend;
pub mod client;
pub mod games;
pub mod protocol;

// Re-export commonly used types
pub use authoring::{ActionOutcome, Game, GameError, GameOptions, Player, Seats, Turns};
pub use backend::{ChimeraServer, FakeServer, WsServer, WsServerConfig};
pub use client::{Chimera, ClientError, FakeChimera};
pub use protocol::{ErrorCode, MatchStatus, NotificationEvent};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
