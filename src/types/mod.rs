//! Core types for body tracking data.
//!
//! The model mirrors what the sensor reports for one instant:
//! - [`Body`] is one skeleton slot with its [`Joint`] map keyed by [`JointType`]
//! - [`FrameDescription`] carries the geometry of a frame kind
//! - [`Snapshot`] combines bodies, projected joints and the body-index pixels
//! - [`Payload`] is the serialized wire form of one snapshot
//!
//! Every enumeration serializes by symbolic name and every map iterates in a
//! fixed order, so serializing the same snapshot twice yields identical bytes.
//!
//! ```rust
//! use kinect_motion::types::{Body, CameraSpacePoint, Joint, JointType, TrackingState};
//!
//! let body = Body::tracked(42).with_joint(
//!     JointType::Head,
//!     Joint {
//!         position: CameraSpacePoint::new(0.1, 0.6, 1.8),
//!         tracking_state: TrackingState::Tracked,
//!         ..Joint::default()
//!     },
//! );
//! assert_eq!(body.tracked_joints().count(), 1);
//! ```

mod body;
mod edges;
mod frame;
mod geometry;
mod snapshot;

pub use body::{Body, HandState, Joint, JointType, TrackingConfidence, TrackingState};
pub use edges::{FrameEdges, frame_edge};
pub use frame::FrameDescription;
pub use geometry::{CameraSpacePoint, DepthSpacePoint, PointF, Vector4};
pub use snapshot::{BodySnapshot, Payload, Snapshot};
