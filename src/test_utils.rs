//! Test utilities shared by unit tests and benches
//!
//! In-memory mappers, body builders, a frame wrapper that records when frames
//! are released, and a transport that records what it was asked to send.

#![cfg(any(test, feature = "benchmark"))]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use crate::source::{
    BodyFrame, BodyFrameReference, BodyIndexFrame, BodyIndexFrameReference, CoordinateMapper,
};
use crate::sources::{FrameSlot, OwnedBodyFrame, OwnedBodyIndexFrame};
use crate::transport::BroadcastTransport;
use crate::types::{
    Body, CameraSpacePoint, DepthSpacePoint, FrameDescription, Joint, JointType, Payload,
    TrackingState, Vector4,
};
use crate::{MotionError, Result};

/// Maps every point to the same depth-space position.
#[derive(Debug, Clone, Copy)]
pub struct FixedMapper(pub DepthSpacePoint);

impl CoordinateMapper for FixedMapper {
    fn map_camera_point_to_depth_space(&self, _point: CameraSpacePoint) -> DepthSpacePoint {
        self.0
    }
}

/// Records the camera-space points it is asked to map.
#[derive(Debug, Default)]
pub struct RecordingMapper {
    inputs: Mutex<Vec<CameraSpacePoint>>,
}

impl RecordingMapper {
    pub fn inputs(&self) -> Vec<CameraSpacePoint> {
        self.inputs.lock().unwrap().clone()
    }
}

impl CoordinateMapper for RecordingMapper {
    fn map_camera_point_to_depth_space(&self, point: CameraSpacePoint) -> DepthSpacePoint {
        self.inputs.lock().unwrap().push(point);
        DepthSpacePoint::new(point.x, point.y)
    }
}

/// A tracked body whose listed joints are all tracked.
pub fn tracked_body_with(tracking_id: u64, joints: &[(JointType, CameraSpacePoint)]) -> Body {
    joints.iter().fold(Body::tracked(tracking_id), |body, (joint_type, position)| {
        body.with_joint(
            *joint_type,
            Joint {
                position: *position,
                orientation: Vector4::IDENTITY,
                tracking_state: TrackingState::Tracked,
            },
        )
    })
}

#[derive(Debug, Default)]
struct ProbeState {
    released: AtomicUsize,
    released_at_first_mapping: Mutex<Option<usize>>,
}

/// Counts frame releases and remembers how many had happened by the time
/// composition first asked for a coordinate mapping.
#[derive(Debug, Clone, Default)]
pub struct ReleaseProbe {
    state: Arc<ProbeState>,
}

impl ReleaseProbe {
    pub fn released(&self) -> usize {
        self.state.released.load(Ordering::SeqCst)
    }

    pub fn released_at_first_mapping(&self) -> Option<usize> {
        *self.state.released_at_first_mapping.lock().unwrap()
    }

    pub fn mapper(&self) -> ProbeMapper {
        ProbeMapper { state: Arc::clone(&self.state) }
    }

    pub fn body_frame(&self, bodies: Vec<Body>) -> BodyFrameReference {
        let frame: Box<dyn BodyFrame> = Box::new(ProbeFrame {
            inner: OwnedBodyFrame::new(bodies),
            state: Arc::clone(&self.state),
        });
        Box::new(FrameSlot::ready(frame))
    }

    pub fn body_index_frame(&self, description: FrameDescription) -> BodyIndexFrameReference {
        let pixels = vec![0; description.length_in_pixels()];
        let frame: Box<dyn BodyIndexFrame> = Box::new(ProbeFrame {
            inner: OwnedBodyIndexFrame::new(description, pixels),
            state: Arc::clone(&self.state),
        });
        Box::new(FrameSlot::ready(frame))
    }
}

/// Mapper half of a [`ReleaseProbe`].
#[derive(Debug)]
pub struct ProbeMapper {
    state: Arc<ProbeState>,
}

impl CoordinateMapper for ProbeMapper {
    fn map_camera_point_to_depth_space(&self, point: CameraSpacePoint) -> DepthSpacePoint {
        let released = self.state.released.load(Ordering::SeqCst);
        self.state.released_at_first_mapping.lock().unwrap().get_or_insert(released);
        DepthSpacePoint::new(point.x, point.y)
    }
}

struct ProbeFrame<F> {
    inner: F,
    state: Arc<ProbeState>,
}

impl<F> Drop for ProbeFrame<F> {
    fn drop(&mut self) {
        self.state.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl<F: BodyFrame> BodyFrame for ProbeFrame<F> {
    fn body_count(&self) -> usize {
        self.inner.body_count()
    }

    fn get_and_refresh_body_data(&self, bodies: &mut [Body]) {
        self.inner.get_and_refresh_body_data(bodies)
    }
}

impl<F: BodyIndexFrame> BodyIndexFrame for ProbeFrame<F> {
    fn frame_description(&self) -> FrameDescription {
        self.inner.frame_description()
    }

    fn copy_frame_data(&self, buffer: &mut [u8]) {
        self.inner.copy_frame_data(buffer)
    }
}

/// In-memory transport that records successful sends.
#[derive(Debug)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Payload>>,
    live_checks: usize,
    fail_after: Option<usize>,
    checks: AtomicUsize,
    connections: watch::Sender<usize>,
}

impl RecordingTransport {
    /// `keep_alive` holds for the first `checks` calls and fails afterwards.
    pub fn alive_for(checks: usize) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            live_checks: checks,
            fail_after: None,
            checks: AtomicUsize::new(0),
            connections: watch::Sender::new(0),
        }
    }

    /// Every send after the first `successes` fails.
    pub fn failing_after(mut self, successes: usize) -> Self {
        self.fail_after = Some(successes);
        self
    }

    pub fn sent(&self) -> Vec<Payload> {
        self.sent.lock().unwrap().clone()
    }

    pub fn liveness_checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }

    pub fn set_connections(&self, count: usize) {
        self.connections.send_replace(count);
    }
}

#[async_trait::async_trait]
impl BroadcastTransport for RecordingTransport {
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn dispose(&self) {}

    async fn send(&self, payload: Payload) -> Result<()> {
        let mut sent = self.sent.lock().unwrap();
        if self.fail_after.is_some_and(|limit| sent.len() >= limit) {
            return Err(MotionError::send_failed("recording transport refused payload"));
        }
        sent.push(payload);
        Ok(())
    }

    fn keep_alive(&self) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst) < self.live_checks
    }

    fn endpoints(&self) -> Vec<String> {
        vec!["memory://recording".to_string()]
    }

    fn protocol(&self) -> &str {
        "kinect-motion.v1"
    }

    fn connection_updates(&self) -> watch::Receiver<usize> {
        self.connections.subscribe()
    }
}
