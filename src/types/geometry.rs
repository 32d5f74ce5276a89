//! Point and vector types shared by frames and snapshots

use serde::{Deserialize, Serialize};

/// A point in camera space, in meters, with the sensor at the origin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraSpacePoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl CameraSpacePoint {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// A point in the depth image, in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DepthSpacePoint {
    pub x: f32,
    pub y: f32,
}

impl DepthSpacePoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A 2-D vector, used for body lean.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PointF {
    pub x: f32,
    pub y: f32,
}

/// A quaternion orientation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector4 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Vector4 {
    /// The identity rotation.
    pub const IDENTITY: Vector4 = Vector4 { x: 0.0, y: 0.0, z: 0.0, w: 1.0 };
}
