//! Frame geometry reported by the sensor

use serde::{Deserialize, Serialize};

/// Geometry of one frame kind.
///
/// The depth and body-index streams share the sensor's 512x424 depth
/// resolution; the body-index stream uses one byte per pixel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameDescription {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub horizontal_field_of_view: f32,
    #[serde(default)]
    pub vertical_field_of_view: f32,
    #[serde(default)]
    pub diagonal_field_of_view: f32,
    #[serde(default = "default_bytes_per_pixel")]
    pub bytes_per_pixel: u32,
}

fn default_bytes_per_pixel() -> u32 {
    1
}

impl FrameDescription {
    /// Depth stream geometry of the sensor.
    pub const DEPTH: FrameDescription = FrameDescription {
        width: 512,
        height: 424,
        horizontal_field_of_view: 70.6,
        vertical_field_of_view: 60.0,
        diagonal_field_of_view: 89.5,
        bytes_per_pixel: 2,
    };

    /// Body-index stream geometry of the sensor.
    pub const BODY_INDEX: FrameDescription =
        FrameDescription { bytes_per_pixel: 1, ..FrameDescription::DEPTH };

    /// Geometry with only a size, fields of view left at zero.
    pub fn with_size(width: u32, height: u32, bytes_per_pixel: u32) -> Self {
        Self {
            width,
            height,
            horizontal_field_of_view: 0.0,
            vertical_field_of_view: 0.0,
            diagonal_field_of_view: 0.0,
            bytes_per_pixel,
        }
    }

    /// Number of pixels in one frame.
    pub fn length_in_pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

// The wire form carries the derived pixel count alongside the stored fields.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FrameDescriptionWire {
    width: u32,
    height: u32,
    horizontal_field_of_view: f32,
    vertical_field_of_view: f32,
    diagonal_field_of_view: f32,
    length_in_pixels: usize,
    bytes_per_pixel: u32,
}

impl From<&FrameDescription> for FrameDescriptionWire {
    fn from(d: &FrameDescription) -> Self {
        Self {
            width: d.width,
            height: d.height,
            horizontal_field_of_view: d.horizontal_field_of_view,
            vertical_field_of_view: d.vertical_field_of_view,
            diagonal_field_of_view: d.diagonal_field_of_view,
            length_in_pixels: d.length_in_pixels(),
            bytes_per_pixel: d.bytes_per_pixel,
        }
    }
}
