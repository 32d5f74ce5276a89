//! Clipped-edge flags for tracked bodies

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Edge flag bits as reported by the sensor.
pub mod frame_edge {
    pub const NONE: u8 = 0x00;
    pub const RIGHT: u8 = 0x01;
    pub const LEFT: u8 = 0x02;
    pub const TOP: u8 = 0x04;
    pub const BOTTOM: u8 = 0x08;
}

// Symbolic names in rendering order.
const EDGE_NAMES: [(u8, &str); 4] = [
    (frame_edge::RIGHT, "Right"),
    (frame_edge::LEFT, "Left"),
    (frame_edge::TOP, "Top"),
    (frame_edge::BOTTOM, "Bottom"),
];

/// Set of frame edges a body is clipped by.
///
/// Serialized by symbolic name: `"None"` when empty, otherwise the set flags
/// joined with `", "` (for example `"Left, Bottom"`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FrameEdges(pub u8);

impl FrameEdges {
    pub const NONE: FrameEdges = FrameEdges(frame_edge::NONE);

    /// Create a new flag set from raw bits.
    pub fn new(value: u8) -> Self {
        Self(value)
    }

    /// Check if a specific flag is set using a bitmask.
    pub fn has_flag(&self, flag: u8) -> bool {
        (self.0 & flag) != 0
    }

    /// Whether the body is fully inside the frame.
    pub fn is_empty(&self) -> bool {
        self.0 == frame_edge::NONE
    }

    fn parse_names(text: &str) -> Option<Self> {
        let mut bits = frame_edge::NONE;
        for name in text.split(',').map(str::trim) {
            if name == "None" {
                continue;
            }
            let (flag, _) = EDGE_NAMES.iter().find(|(_, n)| *n == name)?;
            bits |= flag;
        }
        Some(Self(bits))
    }
}

impl fmt::Display for FrameEdges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("None");
        }
        let mut first = true;
        for (flag, name) in EDGE_NAMES {
            if self.has_flag(flag) {
                if !first {
                    f.write_str(", ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl Serialize for FrameEdges {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FrameEdges {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EdgesVisitor;

        impl Visitor<'_> for EdgesVisitor {
            type Value = FrameEdges;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("edge names such as \"Left, Top\" or a flag integer")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<FrameEdges, E> {
                FrameEdges::parse_names(value)
                    .ok_or_else(|| E::custom(format!("unknown frame edge in '{value}'")))
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<FrameEdges, E> {
                u8::try_from(value)
                    .map(FrameEdges)
                    .map_err(|_| E::custom(format!("frame edge bits out of range: {value}")))
            }
        }

        deserializer.deserialize_any(EdgesVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_edges_render_as_none() {
        assert_eq!(FrameEdges::NONE.to_string(), "None");
        assert_eq!(serde_json::to_string(&FrameEdges::NONE).unwrap(), "\"None\"");
    }

    #[test]
    fn set_edges_render_in_fixed_order() {
        let edges = FrameEdges::new(frame_edge::BOTTOM | frame_edge::LEFT);
        assert_eq!(edges.to_string(), "Left, Bottom");
    }

    #[test]
    fn names_and_bits_both_deserialize() {
        let from_names: FrameEdges = serde_json::from_str("\"Right, Top\"").unwrap();
        assert_eq!(from_names, FrameEdges::new(frame_edge::RIGHT | frame_edge::TOP));

        let from_bits: FrameEdges = serde_json::from_str("8").unwrap();
        assert!(from_bits.has_flag(frame_edge::BOTTOM));

        assert!(serde_json::from_str::<FrameEdges>("\"Sideways\"").is_err());
    }
}
