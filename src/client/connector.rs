//! Client Connectors
//!
//! A connector owns the duplex channel to the server: it allocates
//! request ids, writes framed requests, correlates responses back to the
//! blocked caller, and hands notifications to the API's router.
//!
//! The WebSocket connector runs a dedicated I/O thread; the fake
//! connector short-circuits into an in-process [`FakeServer`] with the
//! same observable ordering.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread::{self, JoinHandle, ThreadId};

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream};
use tracing::{debug, error, warn};

use crate::authoring::GameFactory;
use crate::backend::fake::{FakeClient, FakeServer};
use crate::client::api::{ApiCore, ClientError};

/// The request/notification channel the client API runs over.
pub trait Connector: Send + Sync {
    /// Allocate the next request id (unique for this connection's
    /// lifetime).
    fn next_request_id(&self) -> Value;

    /// Send a fully-formed request envelope and block until the
    /// correlated response arrives.
    fn exchange(&self, request: Value) -> Result<Value, ClientError>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Map a response id onto the pending-request key.
fn id_key(id: &Value) -> String {
    match id.as_str() {
        Some(s) => s.to_string(),
        None => id.to_string(),
    }
}

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<Value>>>>;
type RouterSlot = Arc<Mutex<Option<Weak<ApiCore>>>>;

// =============================================================================
// WEBSOCKET CONNECTOR
// =============================================================================

/// Connector over a real WebSocket. A dedicated I/O thread multiplexes
/// socket reads, outbound writes and shutdown in one loop; callers block
/// on a oneshot slot keyed by their request id.
pub struct WebSocketConnector {
    outgoing: mpsc::UnboundedSender<String>,
    pending: PendingMap,
    router: RouterSlot,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    io_thread: Mutex<Option<JoinHandle<()>>>,
    io_thread_id: ThreadId,
    local_addr: String,
    next_id: AtomicU64,
}

impl WebSocketConnector {
    /// Connect to `ws://host:port`. Blocks until the connection is
    /// established or refused.
    pub fn connect(host: &str, port: u16) -> Result<Arc<Self>, ClientError> {
        let url = format!("ws://{host}:{port}");
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel::<String>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<String, String>>();

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let router: RouterSlot = Arc::new(Mutex::new(None));

        let io_pending = pending.clone();
        let io_router = router.clone();
        let handle = thread::Builder::new()
            .name("chimera-client-io".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("failed to build runtime: {e}")));
                        return;
                    }
                };
                runtime.block_on(io_loop(
                    url,
                    outgoing_rx,
                    shutdown_rx,
                    io_pending,
                    io_router,
                    ready_tx,
                ));
            })
            .map_err(|e| ClientError::ConnectionRefused(e.to_string()))?;

        let io_thread_id = handle.thread().id();

        let local_addr = match ready_rx.recv() {
            Ok(Ok(addr)) => addr,
            Ok(Err(reason)) => {
                let _ = handle.join();
                return Err(ClientError::ConnectionRefused(reason));
            }
            Err(_) => {
                let _ = handle.join();
                return Err(ClientError::ConnectionRefused(
                    "connection thread terminated".to_string(),
                ));
            }
        };

        Ok(Arc::new(WebSocketConnector {
            outgoing: outgoing_tx,
            pending,
            router,
            shutdown: Mutex::new(Some(shutdown_tx)),
            io_thread: Mutex::new(Some(handle)),
            io_thread_id,
            local_addr,
            next_id: AtomicU64::new(1),
        }))
    }

    /// Point the receive loop at the API core that routes notifications.
    pub(crate) fn set_router(&self, core: Weak<ApiCore>) {
        *lock(&self.router) = Some(core);
    }

    /// Cancellation-safe teardown: stop the receive loop, close the
    /// transport, join the I/O thread. Outstanding requests fail with
    /// [`ClientError::ConnectionClosed`]. Idempotent.
    pub fn disconnect(&self) {
        if let Some(shutdown) = lock(&self.shutdown).take() {
            let _ = shutdown.send(());
        }
        if let Some(handle) = lock(&self.io_thread).take() {
            let _ = handle.join();
        }
    }
}

impl Drop for WebSocketConnector {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl Connector for WebSocketConnector {
    fn next_request_id(&self) -> Value {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        Value::String(format!("{}-{:08}", self.local_addr, n))
    }

    fn exchange(&self, request: Value) -> Result<Value, ClientError> {
        // A request from the receive context would wait on a response
        // only that same context could deliver.
        if thread::current().id() == self.io_thread_id {
            return Err(ClientError::CalledFromCallback);
        }

        let key = id_key(request.get("id").unwrap_or(&Value::Null));
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(key.clone(), tx);

        let text = request.to_string();
        debug!("SEND: {text}");
        if self.outgoing.send(text).is_err() {
            lock(&self.pending).remove(&key);
            return Err(ClientError::ConnectionClosed);
        }

        rx.blocking_recv().map_err(|_| ClientError::ConnectionClosed)
    }
}

async fn io_loop(
    url: String,
    mut outgoing_rx: mpsc::UnboundedReceiver<String>,
    mut shutdown_rx: oneshot::Receiver<()>,
    pending: PendingMap,
    router: RouterSlot,
    ready_tx: std::sync::mpsc::Sender<Result<String, String>>,
) {
    let (ws_stream, _) = match connect_async(&url).await {
        Ok(connected) => connected,
        Err(e) => {
            let _ = ready_tx.send(Err(e.to_string()));
            return;
        }
    };

    let local_addr = match ws_stream.get_ref() {
        MaybeTlsStream::Plain(tcp) => tcp
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "local".to_string()),
        _ => "local".to_string(),
    };
    let _ = ready_tx.send(Ok(local_addr));

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        debug!("RCVD: {text}");
                        handle_inbound(&text, &pending, &router);
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("server closed the connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("WebSocket read error: {e}");
                        break;
                    }
                }
            }
            Some(text) = outgoing_rx.recv() => {
                if write.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            _ = &mut shutdown_rx => {
                break;
            }
        }
    }

    // Fail every outstanding request: dropping the slots wakes the
    // blocked callers with a closed-connection error.
    lock(&pending).clear();
    let _ = write.close().await;
}

fn handle_inbound(text: &str, pending: &PendingMap, router: &RouterSlot) {
    let msg: Value = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("discarding unparseable frame: {e}");
            return;
        }
    };

    match msg.get("id").filter(|id| !id.is_null()).cloned() {
        Some(id) => {
            let key = id_key(&id);
            let slot = lock(pending).remove(&key);
            match slot {
                Some(slot) => {
                    let _ = slot.send(msg);
                }
                None => warn!("response for unknown request id {key}"),
            }
        }
        None => {
            let core = lock(router).clone().and_then(|weak| weak.upgrade());
            match core {
                Some(core) => core.route_notification(msg),
                None => debug!("dropping notification, API handle is gone"),
            }
        }
    }
}

// =============================================================================
// FAKE CONNECTOR
// =============================================================================

/// Connector that feeds requests straight into a shared [`FakeServer`]
/// and drains the responses synchronously. Notifications accumulate
/// until [`FakeConnector::process_notifications`] routes them.
pub struct FakeConnector {
    server: Arc<Mutex<FakeServer>>,
    client: FakeClient,
    router: Mutex<Option<Weak<ApiCore>>>,
    next_id: AtomicU64,
}

impl FakeConnector {
    /// Attach a new fake connection to the shared server.
    pub fn new(server: Arc<Mutex<FakeServer>>) -> Self {
        let client = lock(&server).create_client();
        FakeConnector {
            server,
            client,
            router: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn set_router(&self, core: Weak<ApiCore>) {
        *lock(&self.router) = Some(core);
    }

    /// Register a game with the underlying fake server.
    pub fn add_game(&self, game_id: &str, factory: GameFactory, description: &str) {
        lock(&self.server).register_game(game_id, factory, description);
    }

    /// Route every pending notification, in arrival order.
    pub fn process_notifications(&self) {
        let notifications = self.client.drain_notifications();
        let core = lock(&self.router).clone().and_then(|weak| weak.upgrade());
        if let Some(core) = core {
            for notification in notifications {
                core.route_notification(notification);
            }
        }
    }
}

impl Connector for FakeConnector {
    fn next_request_id(&self) -> Value {
        Value::from(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn exchange(&self, request: Value) -> Result<Value, ClientError> {
        lock(&self.server).send_message(&self.client, &request.to_string());
        self.client.next_response().ok_or(ClientError::ConnectionClosed)
    }
}
