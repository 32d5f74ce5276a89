//! WebSocket broadcast server
//!
//! Each subscriber gets a small bounded outbound channel served by its own
//! session task. [`WebSocketServer::send`] hands the payload to every session
//! and waits until each has written it to its socket, so one slow subscriber
//! slows the whole feed instead of buffering without limit. A subscriber whose
//! socket fails is disconnected; the others keep receiving.

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures::future::join_all;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::BroadcastTransport;
use crate::types::Payload;
use crate::{MotionError, Result};

/// How long `dispose` waits for the listener task to finish.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Listener settings for [`WebSocketServer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSettings {
    pub bind_address: SocketAddr,
    /// Route subscribers connect to, starting with `/`.
    pub path: String,
    /// Sub-protocol name, selected when the subscriber offers it.
    pub protocol: String,
    /// Outbound payload slots per subscriber.
    pub subscriber_buffer: usize,
}

struct Outbound {
    text: Utf8Bytes,
    done: oneshot::Sender<bool>,
}

/// Subscriber registry shared by the server and its session tasks.
struct Hub {
    protocol: String,
    buffer: usize,
    subscribers: Mutex<HashMap<u64, mpsc::Sender<Outbound>>>,
    next_id: AtomicU64,
    connections: watch::Sender<usize>,
    cancel: CancellationToken,
    failed: AtomicBool,
}

impl Hub {
    fn subscribers(&self) -> MutexGuard<'_, HashMap<u64, mpsc::Sender<Outbound>>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self) -> (u64, mpsc::Receiver<Outbound>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer);
        let count = {
            let mut subscribers = self.subscribers();
            subscribers.insert(id, tx);
            subscribers.len()
        };
        self.connections.send_replace(count);
        (id, rx)
    }

    fn unregister(&self, id: u64) -> bool {
        let (removed, count) = {
            let mut subscribers = self.subscribers();
            let removed = subscribers.remove(&id).is_some();
            (removed, subscribers.len())
        };
        if removed {
            self.connections.send_replace(count);
        }
        removed
    }

    fn clear(&self) {
        self.subscribers().clear();
        self.connections.send_replace(0);
    }

    fn targets(&self) -> Vec<(u64, mpsc::Sender<Outbound>)> {
        self.subscribers().iter().map(|(id, tx)| (*id, tx.clone())).collect()
    }
}

/// Broadcast transport serving subscribers over WebSocket.
pub struct WebSocketServer {
    settings: TransportSettings,
    hub: Arc<Hub>,
    local_addr: Mutex<Option<SocketAddr>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WebSocketServer {
    /// Create a server. Cancelling `cancel` stops it and fails its liveness predicate.
    pub fn new(settings: TransportSettings, cancel: CancellationToken) -> Self {
        let (connections, _) = watch::channel(0);
        let hub = Arc::new(Hub {
            protocol: settings.protocol.clone(),
            buffer: settings.subscriber_buffer.max(1),
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            connections,
            cancel,
            failed: AtomicBool::new(false),
        });
        Self { settings, hub, local_addr: Mutex::new(None), task: Mutex::new(None) }
    }

    /// Address the listener is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn connection_count(&self) -> usize {
        *self.hub.connections.borrow()
    }

    fn router(&self) -> Router {
        Router::new()
            .route(&self.settings.path, get(subscriber_upgrade))
            .with_state(Arc::clone(&self.hub))
    }
}

#[async_trait::async_trait]
impl BroadcastTransport for WebSocketServer {
    async fn start(&self) -> Result<()> {
        let running = self.task.lock().unwrap_or_else(PoisonError::into_inner).is_some();
        if running {
            return Ok(());
        }

        let address = self.settings.bind_address;
        let listener = TcpListener::bind(address)
            .await
            .map_err(|e| MotionError::bind_failed(address.to_string(), e))?;
        let local = listener
            .local_addr()
            .map_err(|e| MotionError::bind_failed(address.to_string(), e))?;
        *self.local_addr.lock().unwrap_or_else(PoisonError::into_inner) = Some(local);

        let app = self.router();
        let hub = Arc::clone(&self.hub);
        let shutdown = self.hub.cancel.clone();
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = served {
                error!("WebSocket listener failed: {}", e);
                hub.failed.store(true, Ordering::Release);
            }
            debug!("WebSocket listener stopped");
        });
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        info!("WebSocket server listening on {}", local);
        Ok(())
    }

    async fn dispose(&self) {
        self.hub.cancel.cancel();
        self.hub.clear();

        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
                Ok(_) => debug!("WebSocket server disposed"),
                Err(_) => warn!("WebSocket listener did not stop within {:?}", SHUTDOWN_GRACE),
            }
        }
    }

    async fn send(&self, payload: Payload) -> Result<()> {
        if self.hub.failed.load(Ordering::Acquire) {
            return Err(MotionError::send_failed("WebSocket listener is no longer running"));
        }

        let targets = self.hub.targets();
        if targets.is_empty() {
            trace!("No subscribers, payload discarded");
            return Ok(());
        }

        let text = String::from_utf8(payload.into_bytes().to_vec())
            .map_err(|e| MotionError::send_failed(format!("payload is not UTF-8: {e}")))?;
        let text = Utf8Bytes::from(text);

        let deliveries = targets.into_iter().map(|(id, tx)| {
            let text = text.clone();
            async move {
                let (done, delivered) = oneshot::channel();
                let accepted = tx.send(Outbound { text, done }).await.is_ok()
                    && delivered.await.unwrap_or(false);
                (id, accepted)
            }
        });

        for (id, accepted) in join_all(deliveries).await {
            if !accepted && self.hub.unregister(id) {
                warn!(subscriber = id, "Disconnected subscriber after failed delivery");
            }
        }
        Ok(())
    }

    fn keep_alive(&self) -> bool {
        !self.hub.cancel.is_cancelled() && !self.hub.failed.load(Ordering::Acquire)
    }

    fn endpoints(&self) -> Vec<String> {
        let address = self.local_addr().unwrap_or(self.settings.bind_address);
        let host = if address.ip().is_unspecified() {
            format!("localhost:{}", address.port())
        } else {
            address.to_string()
        };
        vec![format!("ws://{}{}", host, self.settings.path)]
    }

    fn protocol(&self) -> &str {
        &self.settings.protocol
    }

    fn connection_updates(&self) -> watch::Receiver<usize> {
        self.hub.connections.subscribe()
    }
}

async fn subscriber_upgrade(ws: WebSocketUpgrade, State(hub): State<Arc<Hub>>) -> impl IntoResponse {
    let protocol = hub.protocol.clone();
    ws.protocols([protocol]).on_upgrade(move |socket| subscriber_session(socket, hub))
}

async fn subscriber_session(mut socket: WebSocket, hub: Arc<Hub>) {
    let (id, mut outbound) = hub.register();
    info!(subscriber = id, "Subscriber connected");

    loop {
        tokio::select! {
            _ = hub.cancel.cancelled() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            next = outbound.recv() => match next {
                Some(Outbound { text, done }) => {
                    let delivered = socket.send(Message::Text(text)).await.is_ok();
                    let _ = done.send(delivered);
                    if !delivered {
                        break;
                    }
                }
                // Unregistered by the server.
                None => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Subscribers are receive-only.
                Some(Ok(_)) => {}
            },
        }
    }

    hub.unregister(id);
    info!(subscriber = id, "Subscriber disconnected");
}
