//! Frame source capability
//!
//! A [`FrameSource`] delivers arrival notifications for the two frame kinds the
//! pipeline consumes. Each notification carries a [`FrameReference`] that must
//! be acquired before the frame can be read; acquisition yields `None` when the
//! frame expired in the meantime. Dropping an acquired frame releases it back to
//! the source.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::Result;
use crate::types::{Body, CameraSpacePoint, DepthSpacePoint, FrameDescription};

/// Maps camera-space points into the depth image.
pub trait CoordinateMapper: Send + Sync {
    fn map_camera_point_to_depth_space(&self, point: CameraSpacePoint) -> DepthSpacePoint;
}

/// An acquired skeletal frame. Dropping it releases the frame.
pub trait BodyFrame: Send {
    /// Number of body slots the sensor reports.
    fn body_count(&self) -> usize;

    /// Refresh `bodies` in place. `bodies.len()` equals [`BodyFrame::body_count`].
    fn get_and_refresh_body_data(&self, bodies: &mut [Body]);
}

/// An acquired body-index frame. Dropping it releases the frame.
pub trait BodyIndexFrame: Send {
    fn frame_description(&self) -> FrameDescription;

    /// Copy the frame's pixels into `buffer`, which holds exactly
    /// `frame_description().length_in_pixels()` bytes.
    fn copy_frame_data(&self, buffer: &mut [u8]);
}

/// Handle to a frame that may already have expired.
pub trait FrameReference<F: ?Sized>: Send {
    /// Acquire the frame exclusively, or `None` if it is no longer available.
    fn acquire_frame(self: Box<Self>) -> Option<Box<F>>;
}

pub type BodyFrameReference = Box<dyn FrameReference<dyn BodyFrame>>;
pub type BodyIndexFrameReference = Box<dyn FrameReference<dyn BodyIndexFrame>>;

/// Notification produced by a frame source.
pub enum SourceEvent {
    BodyFrameArrived(BodyFrameReference),
    BodyIndexFrameArrived(BodyIndexFrameReference),
    AvailabilityChanged { is_available: bool },
}

impl std::fmt::Debug for SourceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceEvent::BodyFrameArrived(_) => f.write_str("BodyFrameArrived"),
            SourceEvent::BodyIndexFrameArrived(_) => f.write_str("BodyIndexFrameArrived"),
            SourceEvent::AvailabilityChanged { is_available } => {
                write!(f, "AvailabilityChanged({is_available})")
            }
        }
    }
}

/// The two frame kinds a reader can be opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Body,
    BodyIndex,
}

/// An open frame reader. Clones share the same open/closed state.
///
/// Sources only emit arrivals for kinds whose reader is still open.
#[derive(Debug, Clone)]
pub struct ReaderHandle {
    kind: FrameKind,
    open: Arc<AtomicBool>,
}

impl ReaderHandle {
    pub fn new(kind: FrameKind) -> Self {
        Self { kind, open: Arc::new(AtomicBool::new(true)) }
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Close the reader. Safe to call repeatedly.
    pub fn dispose(&self) {
        self.open.store(false, Ordering::Release);
    }
}

/// Readers a source has handed out, used to gate event delivery.
#[derive(Debug, Default)]
pub struct ReaderSet {
    body: Option<ReaderHandle>,
    body_index: Option<ReaderHandle>,
}

impl ReaderSet {
    /// Open (or reopen) the reader for `kind`.
    pub fn open(&mut self, kind: FrameKind) -> ReaderHandle {
        let handle = ReaderHandle::new(kind);
        match kind {
            FrameKind::Body => self.body = Some(handle.clone()),
            FrameKind::BodyIndex => self.body_index = Some(handle.clone()),
        }
        handle
    }

    /// Whether arrivals of `kind` should be delivered.
    pub fn accepts(&self, kind: FrameKind) -> bool {
        let reader = match kind {
            FrameKind::Body => &self.body,
            FrameKind::BodyIndex => &self.body_index,
        };
        reader.as_ref().is_some_and(ReaderHandle::is_open)
    }

    /// Whether `event` passes the reader gate. Availability always passes.
    pub fn admits(&self, event: &SourceEvent) -> bool {
        match event {
            SourceEvent::BodyFrameArrived(_) => self.accepts(FrameKind::Body),
            SourceEvent::BodyIndexFrameArrived(_) => self.accepts(FrameKind::BodyIndex),
            SourceEvent::AvailabilityChanged { .. } => true,
        }
    }
}

/// Trait for sensor frame sources
///
/// The ingestion task owns the source and pulls events one at a time, so both
/// frame kinds are handled on the same task without shared mutable state.
#[async_trait::async_trait]
pub trait FrameSource: Send + 'static {
    /// Start producing frames.
    fn open(&mut self) -> Result<()>;

    /// Stop producing frames. Safe to call repeatedly.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    fn open_body_reader(&mut self) -> ReaderHandle;

    fn open_body_index_reader(&mut self) -> ReaderHandle;

    /// Coordinate mapping for this sensor.
    fn coordinate_mapper(&self) -> Arc<dyn CoordinateMapper>;

    fn depth_frame_description(&self) -> FrameDescription;

    fn body_index_frame_description(&self) -> FrameDescription;

    /// Wait for the next notification
    ///
    /// Returns:
    /// - `Ok(Some(event))` - A frame arrived or availability changed
    /// - `Ok(None)` - The source ended (normal termination)
    /// - `Err(e)` - The source failed
    async fn next_event(&mut self) -> Result<Option<SourceEvent>>;
}
