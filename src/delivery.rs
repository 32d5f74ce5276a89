//! Delivery loop
//!
//! The single consumer of the [`DeliveryQueue`]. Payloads are forwarded to the
//! transport strictly in queue order, one at a time: each send completes before
//! the next starts, so a slow transport delays delivery while new payloads keep
//! accumulating in the queue.

use std::time::Duration;
use tracing::{debug, error, info, trace};

use crate::Result;
use crate::queue::DeliveryQueue;
use crate::transport::BroadcastTransport;

/// Counters reported when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub sent: u64,
    pub bytes: u64,
}

/// Run until the transport's liveness predicate fails.
///
/// Returns the delivery counters on a clean exit. A failed send is returned
/// as an error and ends the loop; no payload is retried.
pub async fn run_delivery_loop(
    queue: &DeliveryQueue,
    transport: &dyn BroadcastTransport,
    poll_interval: Duration,
) -> Result<DeliveryStats> {
    info!("Delivery loop started");
    let mut stats = DeliveryStats::default();

    while let Some(payload) = queue.drain_blocking(|| transport.keep_alive(), poll_interval).await {
        let len = payload.len() as u64;
        if let Err(e) = transport.send(payload).await {
            error!("Delivery failed after {} payloads: {}", stats.sent, e);
            return Err(e);
        }
        stats.sent += 1;
        stats.bytes += len;
        trace!("Delivered payload {} ({} bytes, {} queued)", stats.sent, len, queue.len());
    }

    debug!("Liveness predicate failed with {} payloads still queued", queue.len());
    info!("Delivery loop ended ({} payloads, {} bytes)", stats.sent, stats.bytes);
    Ok(stats)
}
