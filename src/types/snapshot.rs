//! Composed snapshots and their serialized payloads

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

use super::frame::FrameDescriptionWire;
use super::{Body, DepthSpacePoint, FrameDescription, JointType};

/// One body as captured for a snapshot, paired with its projected joints.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BodySnapshot {
    #[serde(flatten)]
    pub body: Body,
    pub joint_depth_space_positions: BTreeMap<JointType, DepthSpacePoint>,
}

/// Immutable, serialization-ready view of one skeletal frame arrival.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub bodies: Vec<BodySnapshot>,
    #[serde(serialize_with = "serialize_pixels")]
    pub body_index_pixels: Vec<u8>,
    #[serde(serialize_with = "serialize_description")]
    pub depth_frame: FrameDescription,
    #[serde(serialize_with = "serialize_description")]
    pub body_index_frame: FrameDescription,
}

impl Snapshot {
    /// Number of tracked bodies in the snapshot.
    pub fn tracked_count(&self) -> usize {
        self.bodies.iter().filter(|b| b.body.is_tracked).count()
    }
}

// Pixel buffers travel as a base64 string, matching how JSON clients decode byte arrays.
fn serialize_pixels<S: Serializer>(pixels: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(pixels))
}

fn serialize_description<S: Serializer>(
    description: &FrameDescription,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    FrameDescriptionWire::from(description).serialize(serializer)
}

/// Serialized wire form of exactly one [`Snapshot`].
///
/// Cloning shares the underlying buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload(Bytes);

impl Payload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}
