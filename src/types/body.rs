//! Skeletal body model

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{CameraSpacePoint, FrameEdges, PointF, Vector4};

/// Joints tracked by the sensor, in the sensor's native order.
///
/// Joint names are map keys on the wire and are rendered in camelCase
/// (`spineBase`, `handTipLeft`, ...). Ordering follows declaration order so
/// joint maps iterate deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JointType {
    SpineBase,
    SpineMid,
    Neck,
    Head,
    ShoulderLeft,
    ElbowLeft,
    WristLeft,
    HandLeft,
    ShoulderRight,
    ElbowRight,
    WristRight,
    HandRight,
    HipLeft,
    KneeLeft,
    AnkleLeft,
    FootLeft,
    HipRight,
    KneeRight,
    AnkleRight,
    FootRight,
    SpineShoulder,
    HandTipLeft,
    ThumbLeft,
    HandTipRight,
    ThumbRight,
}

impl JointType {
    /// All joints in native order.
    pub const ALL: [JointType; 25] = [
        JointType::SpineBase,
        JointType::SpineMid,
        JointType::Neck,
        JointType::Head,
        JointType::ShoulderLeft,
        JointType::ElbowLeft,
        JointType::WristLeft,
        JointType::HandLeft,
        JointType::ShoulderRight,
        JointType::ElbowRight,
        JointType::WristRight,
        JointType::HandRight,
        JointType::HipLeft,
        JointType::KneeLeft,
        JointType::AnkleLeft,
        JointType::FootLeft,
        JointType::HipRight,
        JointType::KneeRight,
        JointType::AnkleRight,
        JointType::FootRight,
        JointType::SpineShoulder,
        JointType::HandTipLeft,
        JointType::ThumbLeft,
        JointType::HandTipRight,
        JointType::ThumbRight,
    ];
}

/// Tracking quality of a joint or of the body lean.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackingState {
    #[default]
    NotTracked,
    Inferred,
    Tracked,
}

/// Gesture state of one hand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandState {
    #[default]
    Unknown,
    NotTracked,
    Open,
    Closed,
    Lasso,
}

/// Confidence of a hand state reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackingConfidence {
    #[default]
    Low,
    High,
}

/// Position, orientation and tracking state of one joint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Joint {
    pub position: CameraSpacePoint,
    #[serde(default)]
    pub orientation: Vector4,
    #[serde(default)]
    pub tracking_state: TrackingState,
}

/// One body slot of a skeletal frame.
///
/// The sensor reports a fixed number of slots per frame; untracked slots keep
/// `is_tracked == false` and an empty joint map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Body {
    pub lean: PointF,
    pub is_restricted: bool,
    pub is_tracked: bool,
    pub tracking_id: u64,
    pub clipped_edges: FrameEdges,
    pub joints: BTreeMap<JointType, Joint>,
    pub hand_right_state: HandState,
    pub hand_left_state: HandState,
    pub hand_right_confidence: TrackingConfidence,
    pub hand_left_confidence: TrackingConfidence,
    pub lean_tracking_state: TrackingState,
}

impl Body {
    /// A tracked body with the given tracking id and no joints yet.
    pub fn tracked(tracking_id: u64) -> Self {
        Self { is_tracked: true, tracking_id, ..Self::default() }
    }

    /// Builder-style helper that records one joint.
    pub fn with_joint(mut self, joint_type: JointType, joint: Joint) -> Self {
        self.joints.insert(joint_type, joint);
        self
    }

    /// Tracked joints only.
    pub fn tracked_joints(&self) -> impl Iterator<Item = (&JointType, &Joint)> {
        self.joints.iter().filter(|(_, joint)| joint.tracking_state == TrackingState::Tracked)
    }
}
