//! Frame ingestion
//!
//! [`FrameIngestor`] owns the latest body-index pixels and the body slots.
//! Every arrival is acquired, copied out and released before anything else
//! happens; only skeletal arrivals go on to compose, serialize and enqueue a
//! payload. Both frame kinds are handled by the one task that owns the
//! ingestor, so the buffers are never read while being written.

use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::Result;
use crate::compose::{Composition, compose_snapshot};
use crate::queue::DeliveryQueue;
use crate::serialize::serialize_snapshot;
use crate::source::{BodyFrameReference, BodyIndexFrameReference, CoordinateMapper, SourceEvent};
use crate::types::{Body, FrameDescription, Snapshot};

/// Result of handling one source notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingested {
    /// Body-index pixels were refreshed.
    Pixels,
    /// A payload was enqueued for delivery.
    Payload,
    /// The frame expired before it could be acquired.
    Missed,
    /// Sensor availability changed.
    Availability(bool),
}

/// Latest frame state plus the composition inputs that come from the source.
pub struct FrameIngestor {
    pixels: Vec<u8>,
    bodies: Vec<Body>,
    depth_frame: FrameDescription,
    body_index_frame: FrameDescription,
    mapper: Arc<dyn CoordinateMapper>,
}

impl FrameIngestor {
    /// Size the pixel buffer from the body-index geometry; start with no body slots.
    pub fn new(
        depth_frame: FrameDescription,
        body_index_frame: FrameDescription,
        mapper: Arc<dyn CoordinateMapper>,
    ) -> Self {
        Self {
            pixels: vec![0; body_index_frame.length_in_pixels()],
            bodies: Vec::new(),
            depth_frame,
            body_index_frame,
            mapper,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    pub fn body_index_frame(&self) -> FrameDescription {
        self.body_index_frame
    }

    /// Copy a body-index frame into the pixel buffer.
    ///
    /// Returns `false` when the frame expired. Never triggers delivery.
    pub fn on_body_index_frame(&mut self, reference: BodyIndexFrameReference) -> bool {
        let Some(frame) = reference.acquire_frame() else {
            return false;
        };

        let description = frame.frame_description();
        if description.length_in_pixels() != self.pixels.len() {
            debug!(
                "Body index geometry changed to {}x{}, reallocating pixel buffer",
                description.width, description.height
            );
            self.pixels = vec![0; description.length_in_pixels()];
        }
        self.body_index_frame = description;
        frame.copy_frame_data(&mut self.pixels);
        true
    }

    /// Refresh the body slots from a skeletal frame and compose a snapshot.
    ///
    /// Returns `None` when the frame expired. The frame is released before
    /// composition starts.
    pub fn on_body_frame(&mut self, reference: BodyFrameReference) -> Option<Snapshot> {
        {
            let frame = reference.acquire_frame()?;
            let count = frame.body_count();
            if count != self.bodies.len() {
                debug!("Body count changed from {} to {}", self.bodies.len(), count);
                self.bodies = vec![Body::default(); count];
            }
            frame.get_and_refresh_body_data(&mut self.bodies);
        }

        Some(self.compose())
    }

    /// Compose a snapshot from the current state.
    pub fn compose(&self) -> Snapshot {
        compose_snapshot(Composition {
            bodies: &self.bodies,
            body_index_pixels: &self.pixels,
            depth_frame: self.depth_frame,
            body_index_frame: self.body_index_frame,
            mapper: self.mapper.as_ref(),
        })
    }

    /// Handle one notification, enqueueing a payload for each skeletal arrival.
    ///
    /// A serialization failure is returned and must end ingestion.
    pub fn dispatch(&mut self, event: SourceEvent, queue: &DeliveryQueue) -> Result<Ingested> {
        match event {
            SourceEvent::BodyIndexFrameArrived(reference) => {
                if self.on_body_index_frame(reference) {
                    trace!("Body index pixels refreshed");
                    Ok(Ingested::Pixels)
                } else {
                    Ok(Ingested::Missed)
                }
            }
            SourceEvent::BodyFrameArrived(reference) => {
                let Some(snapshot) = self.on_body_frame(reference) else {
                    return Ok(Ingested::Missed);
                };
                let payload = serialize_snapshot(&snapshot)?;
                trace!(
                    "Composed snapshot: {} tracked bodies, {} bytes",
                    snapshot.tracked_count(),
                    payload.len()
                );
                queue.enqueue(payload);
                Ok(Ingested::Payload)
            }
            SourceEvent::AvailabilityChanged { is_available } => {
                if is_available {
                    info!("Kinect sensor is now available.");
                } else {
                    warn!("Kinect sensor is not available.");
                }
                Ok(Ingested::Availability(is_available))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueuePolicy;
    use crate::source::{BodyFrame, BodyIndexFrame};
    use crate::sources::{FrameSlot, OwnedBodyFrame, OwnedBodyIndexFrame};
    use crate::test_utils::{FixedMapper, ReleaseProbe, tracked_body_with};
    use crate::types::{CameraSpacePoint, DepthSpacePoint, JointType};

    fn ingestor() -> FrameIngestor {
        FrameIngestor::new(
            FrameDescription::DEPTH,
            FrameDescription::with_size(2, 2, 1),
            Arc::new(FixedMapper(DepthSpacePoint::new(50.0, 60.0))),
        )
    }

    fn body_ref(bodies: Vec<Body>) -> BodyFrameReference {
        let frame: Box<dyn BodyFrame> = Box::new(OwnedBodyFrame::new(bodies));
        Box::new(FrameSlot::ready(frame))
    }

    fn index_ref(width: u32, height: u32, pixels: Vec<u8>) -> BodyIndexFrameReference {
        let frame: Box<dyn BodyIndexFrame> = Box::new(OwnedBodyIndexFrame::new(
            FrameDescription::with_size(width, height, 1),
            pixels,
        ));
        Box::new(FrameSlot::ready(frame))
    }

    #[test]
    fn pixel_arrivals_alone_enqueue_nothing() {
        let mut ingestor = ingestor();
        let queue = DeliveryQueue::new(QueuePolicy::Unbounded);

        for _ in 0..3 {
            let event = SourceEvent::BodyIndexFrameArrived(index_ref(2, 2, vec![0, 1, 2, 3]));
            assert_eq!(ingestor.dispatch(event, &queue).unwrap(), Ingested::Pixels);
        }

        assert!(queue.is_empty());
        assert_eq!(ingestor.pixels(), &[0, 1, 2, 3]);
    }

    #[test]
    fn expired_frames_are_silent_no_ops() {
        let mut ingestor = ingestor();
        let queue = DeliveryQueue::new(QueuePolicy::Unbounded);

        let missed_body = SourceEvent::BodyFrameArrived(Box::new(
            FrameSlot::<dyn BodyFrame>::expired(),
        ));
        let missed_index = SourceEvent::BodyIndexFrameArrived(Box::new(
            FrameSlot::<dyn BodyIndexFrame>::expired(),
        ));

        assert_eq!(ingestor.dispatch(missed_body, &queue).unwrap(), Ingested::Missed);
        assert_eq!(ingestor.dispatch(missed_index, &queue).unwrap(), Ingested::Missed);
        assert!(queue.is_empty());
        assert!(ingestor.bodies().is_empty());
        assert_eq!(ingestor.pixels(), &[0, 0, 0, 0]);
    }

    #[test]
    fn pixel_buffer_is_reused_until_geometry_changes() {
        let mut ingestor = ingestor();
        let before = ingestor.pixels().as_ptr();

        ingestor.on_body_index_frame(index_ref(2, 2, vec![1, 1, 1, 1]));
        assert_eq!(ingestor.pixels().as_ptr(), before);

        ingestor.on_body_index_frame(index_ref(3, 1, vec![4, 5, 6]));
        assert_eq!(ingestor.pixels(), &[4, 5, 6]);
        assert_eq!(ingestor.body_index_frame().width, 3);
    }

    #[test]
    fn body_count_change_leaves_no_stale_bodies() {
        let mut ingestor = ingestor();

        let three = (1..=3).map(Body::tracked).collect();
        let snapshot = ingestor.on_body_frame(body_ref(three)).unwrap();
        assert_eq!(snapshot.bodies.len(), 3);

        let snapshot = ingestor.on_body_frame(body_ref(vec![Body::tracked(9)])).unwrap();
        assert_eq!(snapshot.bodies.len(), 1);
        assert_eq!(snapshot.bodies[0].body.tracking_id, 9);
    }

    #[test]
    fn snapshot_uses_latest_pixels_seen_so_far() {
        let mut ingestor = ingestor();
        ingestor.on_body_index_frame(index_ref(2, 2, vec![0, 0, 0, 0]));
        ingestor.on_body_index_frame(index_ref(2, 2, vec![9, 9, 9, 9]));

        let snapshot = ingestor.on_body_frame(body_ref(vec![Body::default()])).unwrap();
        assert_eq!(snapshot.body_index_pixels, vec![9, 9, 9, 9]);
    }

    #[test]
    fn frames_are_released_before_composition() {
        let probe = ReleaseProbe::default();
        let mut ingestor = FrameIngestor::new(
            FrameDescription::DEPTH,
            FrameDescription::with_size(1, 1, 1),
            Arc::new(probe.mapper()),
        );
        let body = tracked_body_with(1, &[(JointType::Head, CameraSpacePoint::new(0.0, 0.0, 1.0))]);

        ingestor.on_body_frame(probe.body_frame(vec![body])).unwrap();

        assert_eq!(probe.released(), 1);
        assert_eq!(probe.released_at_first_mapping(), Some(1));
    }

    #[test]
    fn frames_are_released_on_every_path() {
        let probe = ReleaseProbe::default();
        let mut ingestor = ingestor();

        ingestor.on_body_index_frame(probe.body_index_frame(FrameDescription::with_size(2, 2, 1)));
        ingestor.on_body_frame(probe.body_frame(Vec::new()));

        assert_eq!(probe.released(), 2);
    }

    #[test]
    fn body_arrival_enqueues_exactly_one_payload() {
        let mut ingestor = ingestor();
        let queue = DeliveryQueue::new(QueuePolicy::Unbounded);

        let event = SourceEvent::BodyFrameArrived(body_ref(vec![Body::tracked(1)]));
        assert_eq!(ingestor.dispatch(event, &queue).unwrap(), Ingested::Payload);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn unrepresentable_snapshot_is_an_error() {
        let mut ingestor = ingestor();
        let queue = DeliveryQueue::new(QueuePolicy::Unbounded);
        let mut body = Body::tracked(1);
        body.lean.y = f32::NAN;

        let err = ingestor
            .dispatch(SourceEvent::BodyFrameArrived(body_ref(vec![body])), &queue)
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(queue.is_empty());
    }
}
