//! Broadcast transport capability
//!
//! The transport owns subscriber connections. The pipeline only needs to hand
//! it one payload at a time, ask whether it should keep running, and observe
//! the connection count for logging.

mod websocket;

pub use websocket::{TransportSettings, WebSocketServer};

use tokio::sync::watch;

use crate::Result;
use crate::types::Payload;

/// Trait for payload broadcast transports
#[async_trait::async_trait]
pub trait BroadcastTransport: Send + Sync {
    /// Start accepting subscribers.
    async fn start(&self) -> Result<()>;

    /// Disconnect every subscriber and stop listening. Safe to call repeatedly.
    async fn dispose(&self);

    /// Deliver one payload to every connected subscriber
    ///
    /// Completes once each subscriber has accepted the payload or has been
    /// disconnected for failing to. Returns an error only when the transport
    /// itself can no longer deliver.
    async fn send(&self, payload: Payload) -> Result<()>;

    /// Liveness predicate for the delivery loop.
    fn keep_alive(&self) -> bool;

    /// Advertised subscriber endpoints.
    fn endpoints(&self) -> Vec<String>;

    /// Protocol name advertised to operators and negotiated with subscribers.
    fn protocol(&self) -> &str;

    /// Current subscriber count, updated on every connect and disconnect.
    fn connection_updates(&self) -> watch::Receiver<usize>;
}
