//! Channel-backed frame source
//!
//! Driver threads (or tests) push notifications through a [`SourceHandle`];
//! the ingestion task pulls them from the [`ChannelSource`] in arrival order.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::recorded::{DepthIntrinsics, FrameSlot, OwnedBodyFrame, OwnedBodyIndexFrame};
use crate::source::{
    BodyFrame, BodyIndexFrame, CoordinateMapper, FrameKind, FrameSource, ReaderHandle, ReaderSet,
    SourceEvent,
};
use crate::types::{Body, FrameDescription};
use crate::{MotionError, Result};

/// Frame source fed through an unbounded channel.
pub struct ChannelSource {
    events: mpsc::UnboundedReceiver<SourceEvent>,
    readers: ReaderSet,
    mapper: Arc<dyn CoordinateMapper>,
    depth: FrameDescription,
    body_index: FrameDescription,
    open: bool,
}

/// Sending side of a [`ChannelSource`]. Cheap to clone; usable from any thread.
#[derive(Clone)]
pub struct SourceHandle {
    events: mpsc::UnboundedSender<SourceEvent>,
}

impl ChannelSource {
    /// Create a source with the sensor's default geometry and intrinsics.
    pub fn new() -> (Self, SourceHandle) {
        Self::with_geometry(
            FrameDescription::DEPTH,
            FrameDescription::BODY_INDEX,
            Arc::new(DepthIntrinsics::default()),
        )
    }

    /// Create a source with explicit geometry and coordinate mapping.
    pub fn with_geometry(
        depth: FrameDescription,
        body_index: FrameDescription,
        mapper: Arc<dyn CoordinateMapper>,
    ) -> (Self, SourceHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let source = Self {
            events: rx,
            readers: ReaderSet::default(),
            mapper,
            depth,
            body_index,
            open: false,
        };
        (source, SourceHandle { events: tx })
    }
}

#[async_trait::async_trait]
impl FrameSource for ChannelSource {
    fn open(&mut self) -> Result<()> {
        debug!("Opening channel frame source");
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            debug!("Closing channel frame source");
        }
        self.open = false;
        self.events.close();
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn open_body_reader(&mut self) -> ReaderHandle {
        self.readers.open(FrameKind::Body)
    }

    fn open_body_index_reader(&mut self) -> ReaderHandle {
        self.readers.open(FrameKind::BodyIndex)
    }

    fn coordinate_mapper(&self) -> Arc<dyn CoordinateMapper> {
        Arc::clone(&self.mapper)
    }

    fn depth_frame_description(&self) -> FrameDescription {
        self.depth
    }

    fn body_index_frame_description(&self) -> FrameDescription {
        self.body_index
    }

    async fn next_event(&mut self) -> Result<Option<SourceEvent>> {
        while let Some(event) = self.events.recv().await {
            if self.open && self.readers.admits(&event) {
                return Ok(Some(event));
            }
            trace!("Discarding {:?} (source closed or reader not open)", event);
        }
        Ok(None)
    }
}

impl SourceHandle {
    /// Push a raw notification.
    pub fn push(&self, event: SourceEvent) -> Result<()> {
        self.events.send(event).map_err(|_| MotionError::SourceClosed)
    }

    /// Push a skeletal frame arrival.
    pub fn body_frame(&self, bodies: Vec<Body>) -> Result<()> {
        let frame: Box<dyn BodyFrame> = Box::new(OwnedBodyFrame::new(bodies));
        self.push(SourceEvent::BodyFrameArrived(Box::new(FrameSlot::ready(frame))))
    }

    /// Push a body-index frame arrival.
    pub fn body_index_frame(&self, description: FrameDescription, pixels: Vec<u8>) -> Result<()> {
        let frame: Box<dyn BodyIndexFrame> =
            Box::new(OwnedBodyIndexFrame::new(description, pixels));
        self.push(SourceEvent::BodyIndexFrameArrived(Box::new(FrameSlot::ready(frame))))
    }

    /// Push a skeletal arrival whose frame expires before acquisition.
    pub fn expired_body_frame(&self) -> Result<()> {
        self.push(SourceEvent::BodyFrameArrived(Box::new(FrameSlot::<dyn BodyFrame>::expired())))
    }

    /// Push a body-index arrival whose frame expires before acquisition.
    pub fn expired_body_index_frame(&self) -> Result<()> {
        self.push(SourceEvent::BodyIndexFrameArrived(Box::new(
            FrameSlot::<dyn BodyIndexFrame>::expired(),
        )))
    }

    /// Report a sensor availability change.
    pub fn availability(&self, is_available: bool) -> Result<()> {
        self.push(SourceEvent::AvailabilityChanged { is_available })
    }
}
