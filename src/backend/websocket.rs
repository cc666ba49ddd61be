//! WebSocket Transport
//!
//! Async WebSocket front door for the dispatcher. One task per
//! connection reads frames and feeds them to the dispatcher; a writer
//! task drains the connection's outbound queue. Each frame is exactly
//! one JSON message (UTF-8 text).

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::backend::server::ChimeraServer;
use crate::backend::server::MessageSink;
use crate::protocol::{Outbound, DEFAULT_ADDR};

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct WsServerConfig {
    /// Bind address.
    pub addr: SocketAddr,
}

impl Default for WsServerConfig {
    fn default() -> Self {
        WsServerConfig {
            addr: DEFAULT_ADDR.parse().unwrap(),
        }
    }
}

/// Transport errors.
#[derive(Debug, thiserror::Error)]
pub enum WsServerError {
    /// Failed to bind the listen address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),
}

/// WebSocket server wrapping a [`ChimeraServer`] dispatcher.
pub struct WsServer {
    server: Arc<Mutex<ChimeraServer>>,
    config: WsServerConfig,
    shutdown_tx: broadcast::Sender<()>,
}

// The dispatcher never suspends while the lock is held, and sinks only
// enqueue, so holding a std mutex across dispatch is safe and preserves
// per-request response/notification ordering.
fn lock(server: &Arc<Mutex<ChimeraServer>>) -> MutexGuard<'_, ChimeraServer> {
    server.lock().unwrap_or_else(|e| e.into_inner())
}

impl WsServer {
    /// Wrap a dispatcher in a WebSocket transport.
    pub fn new(server: ChimeraServer, config: WsServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        WsServer {
            server: Arc::new(Mutex::new(server)),
            config,
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<(), WsServerError> {
        let listener = TcpListener::bind(self.config.addr).await?;
        info!("Chimera server listening on {}", self.config.addr);
        self.serve(listener).await
    }

    /// Serve connections from an already-bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), WsServerError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            info!("New connection from {addr}");
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {e}");
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Signal shutdown to the accept loop and every connection task.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let server = self.server.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {addr}: {e}");
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::unbounded_channel::<String>();

            let client_id = lock(&server).connect_client(Box::new(WsSink { tx: msg_tx }));

            // Writer task: drains the outbound queue in enqueue order.
            let sender_task = tokio::spawn(async move {
                while let Some(text) = msg_rx.recv().await {
                    debug!("{addr} SEND: {text}");
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                lock(&server).process_message(client_id, &text);
                            }
                            Some(Ok(Message::Binary(_))) => {
                                warn!("{addr} sent a binary frame, ignoring");
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {addr} disconnected");
                                break;
                            }
                            // Ping/pong is handled inside tungstenite.
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                error!("WebSocket error for {addr}: {e}");
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            sender_task.abort();
            lock(&server).disconnect_client(client_id);
            info!("Client {addr} cleaned up");
        });
    }
}

struct WsSink {
    tx: mpsc::UnboundedSender<String>,
}

impl MessageSink for WsSink {
    fn send(&mut self, msg: &Outbound) {
        match serde_json::to_string(msg) {
            // The connection may already be gone; dropping is fine then.
            Ok(text) => {
                let _ = self.tx.send(text);
            }
            Err(e) => error!("failed to serialize outbound message: {e}"),
        }
    }
}
