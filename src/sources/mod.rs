//! Concrete frame sources
//!
//! - [`ChannelSource`]: notifications pushed from driver threads or tests
//! - [`ReplaySource`]: a recorded capture replayed at the sensor frame rate

pub mod channel;
pub mod recorded;
pub mod replay;

pub use channel::{ChannelSource, SourceHandle};
pub use recorded::{DepthIntrinsics, FrameSlot, NO_BODY, OwnedBodyFrame, OwnedBodyIndexFrame};
pub use replay::{CaptureFrame, CaptureRecord, ReplaySource, SENSOR_FRAME_RATE};
