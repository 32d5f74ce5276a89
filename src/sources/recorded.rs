//! Owned frames for sources that hold their data in memory

use crate::source::{BodyFrame, BodyIndexFrame, CoordinateMapper, FrameReference};
use crate::types::{Body, CameraSpacePoint, DepthSpacePoint, FrameDescription};

/// A skeletal frame whose bodies are already in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OwnedBodyFrame {
    pub bodies: Vec<Body>,
}

impl OwnedBodyFrame {
    pub fn new(bodies: Vec<Body>) -> Self {
        Self { bodies }
    }
}

impl BodyFrame for OwnedBodyFrame {
    fn body_count(&self) -> usize {
        self.bodies.len()
    }

    fn get_and_refresh_body_data(&self, bodies: &mut [Body]) {
        for (slot, body) in bodies.iter_mut().zip(&self.bodies) {
            slot.clone_from(body);
        }
    }
}

/// A body-index frame whose pixels are already in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnedBodyIndexFrame {
    pub description: FrameDescription,
    pub pixels: Vec<u8>,
}

impl OwnedBodyIndexFrame {
    pub fn new(description: FrameDescription, pixels: Vec<u8>) -> Self {
        Self { description, pixels }
    }
}

impl BodyIndexFrame for OwnedBodyIndexFrame {
    fn frame_description(&self) -> FrameDescription {
        self.description
    }

    fn copy_frame_data(&self, buffer: &mut [u8]) {
        let n = buffer.len().min(self.pixels.len());
        buffer[..n].copy_from_slice(&self.pixels[..n]);
        // Short captures leave the tail as "no body".
        buffer[n..].fill(NO_BODY);
    }
}

/// Body-index value for pixels that belong to no body.
pub const NO_BODY: u8 = 0xFF;

/// A frame reference that is either ready or already expired.
pub struct FrameSlot<F: ?Sized> {
    frame: Option<Box<F>>,
}

impl<F: ?Sized> FrameSlot<F> {
    pub fn ready(frame: Box<F>) -> Self {
        Self { frame: Some(frame) }
    }

    pub fn expired() -> Self {
        Self { frame: None }
    }
}

impl<F: ?Sized + Send> FrameReference<F> for FrameSlot<F> {
    fn acquire_frame(self: Box<Self>) -> Option<Box<F>> {
        self.frame
    }
}

/// Pinhole projection using depth camera intrinsics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthIntrinsics {
    pub focal_length_x: f32,
    pub focal_length_y: f32,
    pub principal_point_x: f32,
    pub principal_point_y: f32,
}

impl Default for DepthIntrinsics {
    /// Factory intrinsics of the sensor's 512x424 depth camera.
    fn default() -> Self {
        Self {
            focal_length_x: 365.456,
            focal_length_y: 365.456,
            principal_point_x: 254.878,
            principal_point_y: 205.395,
        }
    }
}

impl CoordinateMapper for DepthIntrinsics {
    fn map_camera_point_to_depth_space(&self, point: CameraSpacePoint) -> DepthSpacePoint {
        // Camera space is y-up, depth space is y-down.
        DepthSpacePoint::new(
            self.principal_point_x + self.focal_length_x * point.x / point.z,
            self.principal_point_y - self.focal_length_y * point.y / point.z,
        )
    }
}
