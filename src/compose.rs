//! Snapshot composition
//!
//! Combines the current body slots with the most recently stored body-index
//! pixels and projects every joint into depth space.

use std::collections::BTreeMap;

use crate::source::CoordinateMapper;
use crate::types::{
    Body, BodySnapshot, CameraSpacePoint, DepthSpacePoint, FrameDescription, Snapshot,
};

/// Smallest depth handed to the coordinate mapper, in meters.
pub const MIN_JOINT_DEPTH: f32 = 0.1;

/// Project one camera-space position into depth space.
///
/// Depth is clamped to [`MIN_JOINT_DEPTH`] so joints at or behind the sensor
/// plane still map to a finite point.
pub fn project_joint(position: CameraSpacePoint, mapper: &dyn CoordinateMapper) -> DepthSpacePoint {
    let point = CameraSpacePoint { z: position.z.max(MIN_JOINT_DEPTH), ..position };
    mapper.map_camera_point_to_depth_space(point)
}

/// Project every joint of `body`.
pub fn project_body(body: &Body, mapper: &dyn CoordinateMapper) -> BodySnapshot {
    let joint_depth_space_positions = body
        .joints
        .iter()
        .map(|(joint_type, joint)| (*joint_type, project_joint(joint.position, mapper)))
        .collect::<BTreeMap<_, _>>();

    BodySnapshot { body: body.clone(), joint_depth_space_positions }
}

/// Inputs for one composition.
pub struct Composition<'a> {
    pub bodies: &'a [Body],
    pub body_index_pixels: &'a [u8],
    pub depth_frame: FrameDescription,
    pub body_index_frame: FrameDescription,
    pub mapper: &'a dyn CoordinateMapper,
}

/// Compose one immutable snapshot. Runs on the ingestion task and never blocks.
pub fn compose_snapshot(input: Composition<'_>) -> Snapshot {
    Snapshot {
        bodies: input.bodies.iter().map(|body| project_body(body, input.mapper)).collect(),
        body_index_pixels: input.body_index_pixels.to_vec(),
        depth_frame: input.depth_frame,
        body_index_frame: input.body_index_frame,
    }
}
