//! Pipeline lifecycle
//!
//! [`MotionServer`] is the explicit context for one pipeline instance: a frame
//! source, the ingestion task that owns it, the delivery queue and a broadcast
//! transport. Several instances can run side by side in one process.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ServerConfig, StartupOrder};
use crate::delivery::{DeliveryStats, run_delivery_loop};
use crate::ingest::FrameIngestor;
use crate::queue::{DeliveryQueue, QueuePolicy};
use crate::source::{FrameSource, ReaderHandle};
use crate::transport::{BroadcastTransport, WebSocketServer};
use crate::{MotionError, Result};

/// Runtime options for [`MotionServer::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerOptions {
    pub startup_order: StartupOrder,
    pub queue: QueuePolicy,
    pub liveness_poll: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for ServerOptions {
    fn from(config: &ServerConfig) -> Self {
        Self {
            startup_order: config.startup_order,
            queue: config.queue,
            liveness_poll: config.liveness_poll(),
        }
    }
}

type Ingestion = JoinHandle<(Box<dyn FrameSource>, Result<()>)>;

/// One running pipeline.
pub struct MotionServer {
    transport: Option<Arc<dyn BroadcastTransport>>,
    readers: Vec<ReaderHandle>,
    /// Held here only until the ingestion task takes ownership, and again after it returns.
    source: Option<Box<dyn FrameSource>>,
    ingestion: Option<Ingestion>,
    monitor: Option<JoinHandle<()>>,
    queue: Arc<DeliveryQueue>,
    cancel: CancellationToken,
    liveness_poll: Duration,
}

impl MotionServer {
    /// Serve `source` over a WebSocket listener built from `config`.
    ///
    /// The listener shares `cancel`, so cancelling it stops both ingestion
    /// and delivery.
    pub async fn from_config<S>(
        config: &ServerConfig,
        source: S,
        cancel: CancellationToken,
    ) -> Result<Self>
    where
        S: FrameSource,
    {
        let transport = Arc::new(WebSocketServer::new(config.transport_settings(), cancel.clone()));
        Self::start(source, transport, ServerOptions::from(config), cancel).await
    }

    /// Open readers, bring up the transport and the source in the configured
    /// order, and start ingesting.
    ///
    /// On failure everything that was already brought up is torn down again
    /// before the error is returned.
    pub async fn start<S>(
        source: S,
        transport: Arc<dyn BroadcastTransport>,
        options: ServerOptions,
        cancel: CancellationToken,
    ) -> Result<Self>
    where
        S: FrameSource,
    {
        let mut source: Box<dyn FrameSource> = Box::new(source);
        let queue = Arc::new(DeliveryQueue::new(options.queue));

        let readers = vec![source.open_body_reader(), source.open_body_index_reader()];
        let monitor = tokio::spawn(monitor_task(
            transport.connection_updates(),
            Arc::clone(&queue),
            cancel.clone(),
        ));

        let mut server = Self {
            transport: Some(Arc::clone(&transport)),
            readers,
            source: Some(source),
            ingestion: None,
            monitor: Some(monitor),
            queue,
            cancel,
            liveness_poll: options.liveness_poll,
        };

        if let Err(e) = server.bring_up(options.startup_order).await {
            error!("Startup failed: {}", e);
            if let Err(teardown) = server.shutdown().await {
                warn!("Teardown after failed startup reported: {}", teardown);
            }
            return Err(e);
        }

        let Some(source) = server.source.take() else {
            return Err(MotionError::source_failed("frame source missing after startup"));
        };
        let ingestor = FrameIngestor::new(
            source.depth_frame_description(),
            source.body_index_frame_description(),
            source.coordinate_mapper(),
        );
        server.ingestion = Some(tokio::spawn(ingestion_task(
            source,
            ingestor,
            Arc::clone(&server.queue),
            server.cancel.clone(),
        )));

        for endpoint in transport.endpoints() {
            info!("Listening on {}", endpoint);
        }
        info!("Protocol: {}", transport.protocol());
        Ok(server)
    }

    async fn bring_up(&mut self, order: StartupOrder) -> Result<()> {
        let (Some(transport), Some(source)) = (&self.transport, self.source.as_mut()) else {
            return Err(MotionError::transport("server is shut down"));
        };
        match order {
            StartupOrder::TransportFirst => {
                transport.start().await?;
                source.open()
            }
            StartupOrder::SourceFirst => {
                source.open()?;
                transport.start().await
            }
        }
    }

    /// Run the delivery loop until the transport's liveness predicate fails.
    pub async fn run(&self) -> Result<DeliveryStats> {
        let transport =
            self.transport.as_ref().ok_or_else(|| MotionError::transport("server is shut down"))?;
        run_delivery_loop(&self.queue, transport.as_ref(), self.liveness_poll).await
    }

    /// Release the transport, then every reader, then the source
    ///
    /// Safe to call repeatedly and after a partial startup. Returns the error
    /// that ended ingestion if it was fatal; other ingestion errors were
    /// already logged when they happened.
    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(transport) = self.transport.take() {
            debug!("Disposing transport");
            transport.dispose().await;
        }

        for reader in self.readers.drain(..) {
            debug!("Disposing {:?} reader", reader.kind());
            reader.dispose();
        }

        self.cancel.cancel();
        self.queue.close();

        let mut outcome = Ok(());
        if let Some(ingestion) = self.ingestion.take() {
            match ingestion.await {
                Ok((source, result)) => {
                    self.source = Some(source);
                    if let Err(e) = result
                        && e.is_fatal()
                    {
                        outcome = Err(e);
                    }
                }
                Err(e) => warn!("Ingestion task did not finish cleanly: {}", e),
            }
        }

        if let Some(mut source) = self.source.take() {
            debug!("Closing frame source");
            source.close();
        }

        if let Some(monitor) = self.monitor.take() {
            let _ = monitor.await;
        }
        outcome
    }

    pub fn queue(&self) -> &DeliveryQueue {
        &self.queue
    }

    /// Token that stops ingestion and delivery when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.transport.as_ref().map(|t| t.endpoints()).unwrap_or_default()
    }
}

impl Drop for MotionServer {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.queue.close();
    }
}

/// Ingestion task - owns the source and turns arrivals into payloads
///
/// Hands the source back when it ends so the lifecycle can close it.
async fn ingestion_task(
    mut source: Box<dyn FrameSource>,
    mut ingestor: FrameIngestor,
    queue: Arc<DeliveryQueue>,
    cancel: CancellationToken,
) -> (Box<dyn FrameSource>, Result<()>) {
    info!("Ingestion task started");
    let mut events = 0u64;

    let result = loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Ingestion cancelled");
                break Ok(());
            }
            next = source.next_event() => next,
        };

        match next {
            Ok(Some(event)) => {
                events += 1;
                if let Err(e) = ingestor.dispatch(event, &queue) {
                    error!("Stopping pipeline: {}", e);
                    cancel.cancel();
                    queue.close();
                    break Err(e);
                }
            }
            Ok(None) => {
                info!("Frame source ended");
                break Ok(());
            }
            Err(e) => {
                // Subscribers stay connected; they just stop receiving snapshots.
                error!("Frame source failed: {}", e);
                break Err(e);
            }
        }
    };

    info!("Ingestion task ended (handled {} events)", events);
    (source, result)
}

/// Logs connection count changes and closes the queue once cancelled.
async fn monitor_task(
    updates: watch::Receiver<usize>,
    queue: Arc<DeliveryQueue>,
    cancel: CancellationToken,
) {
    let mut counts = WatchStream::from_changes(updates);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = counts.next() => match next {
                Some(count) => info!("There are {} client connection(s).", count),
                None => {
                    cancel.cancelled().await;
                    break;
                }
            },
        }
    }
    queue.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::ChannelSource;
    use crate::test_utils::RecordingTransport;
    use crate::types::{Body, Payload};

    fn options() -> ServerOptions {
        ServerOptions { liveness_poll: Duration::from_millis(5), ..ServerOptions::default() }
    }

    async fn wait_for_queue(server: &MotionServer, len: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while server.queue().len() < len {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("payloads were not enqueued");
    }

    #[tokio::test]
    async fn body_frames_flow_to_the_transport() {
        let (source, handle) = ChannelSource::new();
        let transport = Arc::new(RecordingTransport::alive_for(1));
        let mut server =
            MotionServer::start(source, transport.clone(), options(), CancellationToken::new())
                .await
                .unwrap();

        handle.body_frame(vec![Body::tracked(1)]).unwrap();
        handle.body_frame(vec![Body::tracked(2)]).unwrap();
        wait_for_queue(&server, 2).await;

        let stats = server.run().await.unwrap();
        assert_eq!(stats.sent, 2);
        assert_eq!(transport.sent().len(), 2);

        server.shutdown().await.unwrap();
        assert!(handle.body_frame(Vec::new()).is_err());
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let (source, _handle) = ChannelSource::new();
        let transport = Arc::new(RecordingTransport::alive_for(0));
        let mut server =
            MotionServer::start(source, transport, options(), CancellationToken::new())
                .await
                .unwrap();

        server.shutdown().await.unwrap();
        server.shutdown().await.unwrap();
        assert!(server.endpoints().is_empty());
        assert!(server.run().await.is_err());
    }

    #[tokio::test]
    async fn cancellation_stops_delivery() {
        let (source, _handle) = ChannelSource::new();
        let transport = Arc::new(RecordingTransport::alive_for(usize::MAX));
        let cancel = CancellationToken::new();
        let mut server = MotionServer::start(source, transport, options(), cancel.clone())
            .await
            .unwrap();

        cancel.cancel();
        let stats = tokio::time::timeout(Duration::from_secs(5), server.run())
            .await
            .expect("delivery loop ignored cancellation")
            .unwrap();
        assert_eq!(stats.sent, 0);
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn unserializable_snapshot_stops_the_pipeline() {
        let (source, handle) = ChannelSource::new();
        let transport = Arc::new(RecordingTransport::alive_for(usize::MAX));
        let cancel = CancellationToken::new();
        let mut server = MotionServer::start(source, transport.clone(), options(), cancel.clone())
            .await
            .unwrap();

        let mut body = Body::tracked(1);
        body.lean.x = f32::INFINITY;
        handle.body_frame(vec![body]).unwrap();

        tokio::time::timeout(Duration::from_secs(5), cancel.cancelled())
            .await
            .expect("fatal error did not cancel the pipeline");
        server.run().await.unwrap();
        assert!(transport.sent().is_empty());

        let err = server.shutdown().await.unwrap_err();
        assert!(matches!(err, MotionError::Serialization { .. }));
    }

    #[tokio::test]
    async fn source_first_order_also_starts() {
        let (source, handle) = ChannelSource::new();
        let transport = Arc::new(RecordingTransport::alive_for(1));
        let options = ServerOptions { startup_order: StartupOrder::SourceFirst, ..options() };
        let mut server =
            MotionServer::start(source, transport.clone(), options, CancellationToken::new())
                .await
                .unwrap();

        handle.body_frame(vec![Body::default()]).unwrap();
        wait_for_queue(&server, 1).await;
        server.run().await.unwrap();

        let payload: &Payload = &transport.sent()[0];
        let value: serde_json::Value = serde_json::from_slice(payload.as_bytes()).unwrap();
        assert_eq!(value["bodies"][0]["isTracked"], false);
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn failed_bind_tears_down_partial_startup() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let config = ServerConfig {
            bind_address: occupied.local_addr().unwrap(),
            ..ServerConfig::default()
        };
        let (source, handle) = ChannelSource::new();

        let err = MotionServer::from_config(&config, source, CancellationToken::new())
            .await
            .err()
            .expect("bind should fail");

        assert!(matches!(err, MotionError::Bind { .. }));
        // The source was closed during teardown.
        assert!(handle.availability(true).is_err());
    }
}
