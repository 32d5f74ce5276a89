//! Streams Kinect body tracking to WebSocket subscribers.
//!
//! Every skeletal frame from a [`FrameSource`] becomes one [`Snapshot`]: the
//! tracked bodies, each joint projected into the depth image, and the most
//! recent body-index pixels. Snapshots are serialized to compact JSON and
//! broadcast, in arrival order, to every connected subscriber.
//!
//! # Pipeline
//!
//! ```text
//! FrameSource ──► FrameIngestor ──► DeliveryQueue ──► delivery loop ──► BroadcastTransport
//!                 (compose +                          (one send at a
//!                  serialize)                          time, FIFO)
//! ```
//!
//! # Example (replay)
//!
//! ```rust,no_run
//! use kinect_motion::{MotionServer, ReplaySource, ServerConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> kinect_motion::Result<()> {
//!     let config = ServerConfig::default();
//!     let source = ReplaySource::open_file("session.jsonl")?.looped(true);
//!
//!     let mut server = MotionServer::from_config(&config, source, CancellationToken::new()).await?;
//!     server.run().await?;
//!     server.shutdown().await
//! }
//! ```

pub mod compose;
pub mod config;
pub mod delivery;
mod error;
pub mod ingest;
pub mod queue;
pub mod serialize;
pub mod server;
pub mod source;
pub mod sources;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod transport;
pub mod types;

pub use error::*;
pub use types::*;

pub use compose::{Composition, compose_snapshot};
pub use config::{ReplaySettings, ServerConfig, StartupOrder};
pub use delivery::{DeliveryStats, run_delivery_loop};
pub use ingest::{FrameIngestor, Ingested};
pub use queue::{DeliveryQueue, QueuePolicy};
pub use serialize::serialize_snapshot;
pub use server::{MotionServer, ServerOptions};
pub use source::{CoordinateMapper, FrameSource, SourceEvent};
pub use sources::{ChannelSource, DepthIntrinsics, ReplaySource, SourceHandle};
pub use transport::{BroadcastTransport, TransportSettings, WebSocketServer};
