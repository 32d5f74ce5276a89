//! Replay source for recorded captures
//!
//! A capture is a JSON-lines file, one notification per line:
//!
//! ```text
//! {"kind":"availability","isAvailable":true}
//! {"kind":"bodyIndex","width":512,"height":424,"pixels":"<base64>"}
//! {"kind":"body","bodies":[{"isTracked":true,"trackingId":7,"joints":{...}}]}
//! {"kind":"expired","frame":"body"}
//! ```
//!
//! Skeletal frames are paced at the capture frame rate scaled by the playback
//! speed; the other records are emitted right after the preceding frame. A
//! looped capture also waits one frame period at every restart.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tokio::time::{Duration, Interval, MissedTickBehavior, interval};
use tracing::{debug, info, trace};

use super::recorded::{DepthIntrinsics, FrameSlot, OwnedBodyFrame, OwnedBodyIndexFrame};
use crate::source::{
    BodyFrame, BodyIndexFrame, CoordinateMapper, FrameKind, FrameSource, ReaderHandle, ReaderSet,
    SourceEvent,
};
use crate::types::{Body, FrameDescription};
use crate::{MotionError, Result};

/// Native frame rate of the sensor's skeletal stream.
pub const SENSOR_FRAME_RATE: f64 = 30.0;

/// Which frame kind an `expired` record refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CaptureFrame {
    Body,
    BodyIndex,
}

/// One line of a capture file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CaptureRecord {
    Availability { is_available: bool },
    BodyIndex { width: u32, height: u32, pixels: String },
    Body { bodies: Vec<Body> },
    Expired { frame: CaptureFrame },
}

impl CaptureRecord {
    /// Parse a whole capture, skipping blank lines.
    pub fn parse_capture(text: &str) -> Result<Vec<CaptureRecord>> {
        text.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str(line)
                    .map_err(|e| MotionError::parse(format!("capture line {}", index + 1), e.to_string()))
            })
            .collect()
    }

    fn into_event(self) -> Result<SourceEvent> {
        let event = match self {
            CaptureRecord::Availability { is_available } => {
                SourceEvent::AvailabilityChanged { is_available }
            }
            CaptureRecord::BodyIndex { width, height, pixels } => {
                let pixels = STANDARD
                    .decode(pixels.as_bytes())
                    .map_err(|e| MotionError::parse("body index pixels", e.to_string()))?;
                let description =
                    FrameDescription { width, height, ..FrameDescription::BODY_INDEX };
                let frame: Box<dyn BodyIndexFrame> =
                    Box::new(OwnedBodyIndexFrame::new(description, pixels));
                SourceEvent::BodyIndexFrameArrived(Box::new(FrameSlot::ready(frame)))
            }
            CaptureRecord::Body { bodies } => {
                let frame: Box<dyn BodyFrame> = Box::new(OwnedBodyFrame::new(bodies));
                SourceEvent::BodyFrameArrived(Box::new(FrameSlot::ready(frame)))
            }
            CaptureRecord::Expired { frame: CaptureFrame::Body } => {
                SourceEvent::BodyFrameArrived(Box::new(FrameSlot::<dyn BodyFrame>::expired()))
            }
            CaptureRecord::Expired { frame: CaptureFrame::BodyIndex } => {
                SourceEvent::BodyIndexFrameArrived(Box::new(
                    FrameSlot::<dyn BodyIndexFrame>::expired(),
                ))
            }
        };
        Ok(event)
    }
}

/// Replay source that reads from a capture file
pub struct ReplaySource {
    records: Vec<CaptureRecord>,
    position: usize,

    /// Playback speed multiplier (1.0 = normal, 2.0 = double speed)
    speed: f64,

    /// Restart from the first record after the last one
    looped: bool,

    /// Frame pacing interval, created on the first paced record
    interval: Option<Interval>,

    readers: ReaderSet,
    mapper: Arc<dyn CoordinateMapper>,
    open: bool,
}

impl ReplaySource {
    /// Load a capture file.
    pub fn open_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| MotionError::file_error(path.to_path_buf(), e))?;
        let records = CaptureRecord::parse_capture(&text)?;
        info!("Loaded capture {}: {} records", path.display(), records.len());
        Ok(Self::from_records(records))
    }

    /// Replay records that are already in memory.
    pub fn from_records(records: Vec<CaptureRecord>) -> Self {
        Self {
            records,
            position: 0,
            speed: 1.0,
            looped: false,
            interval: None,
            readers: ReaderSet::default(),
            mapper: Arc::new(DepthIntrinsics::default()),
            open: false,
        }
    }

    /// Set playback speed
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed.clamp(0.1, 10.0);
        self.interval = None;
        debug!("Playback speed set to {}x", self.speed);
        self
    }

    /// Restart from the beginning when the capture ends.
    pub fn looped(mut self, looped: bool) -> Self {
        self.looped = looped;
        self
    }

    /// Number of records in the capture.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn pacing(speed: f64) -> Interval {
        let mut interval = interval(Duration::from_secs_f64(1.0 / (SENSOR_FRAME_RATE * speed)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    }

    /// Next record, and whether reaching it wrapped around to the start.
    fn next_record(&mut self) -> Option<(CaptureRecord, bool)> {
        let mut restarted = false;
        if self.position >= self.records.len() {
            if !self.looped || self.records.is_empty() {
                return None;
            }
            debug!("Capture ended, looping");
            self.position = 0;
            restarted = true;
        }
        let record = self.records[self.position].clone();
        self.position += 1;
        Some((record, restarted))
    }
}

#[async_trait::async_trait]
impl FrameSource for ReplaySource {
    fn open(&mut self) -> Result<()> {
        info!("Starting replay ({} records at {}x)", self.records.len(), self.speed);
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            debug!("Closing replay at record {}", self.position);
        }
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn open_body_reader(&mut self) -> ReaderHandle {
        self.readers.open(FrameKind::Body)
    }

    fn open_body_index_reader(&mut self) -> ReaderHandle {
        self.readers.open(FrameKind::BodyIndex)
    }

    fn coordinate_mapper(&self) -> Arc<dyn CoordinateMapper> {
        Arc::clone(&self.mapper)
    }

    fn depth_frame_description(&self) -> FrameDescription {
        FrameDescription::DEPTH
    }

    fn body_index_frame_description(&self) -> FrameDescription {
        FrameDescription::BODY_INDEX
    }

    async fn next_event(&mut self) -> Result<Option<SourceEvent>> {
        if !self.open {
            return Err(MotionError::SourceClosed);
        }

        while let Some((record, restarted)) = self.next_record() {
            // Each pass of a looped capture takes at least one frame period, even
            // when it holds no skeletal frames.
            if restarted || matches!(record, CaptureRecord::Body { .. }) {
                let speed = self.speed;
                self.interval.get_or_insert_with(|| Self::pacing(speed)).tick().await;
            } else {
                tokio::task::yield_now().await;
            }

            let event = record.into_event()?;
            if self.readers.admits(&event) {
                trace!("Replaying record {}/{}: {:?}", self.position, self.records.len(), event);
                return Ok(Some(event));
            }
        }

        debug!("Reached end of capture");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAPTURE: &str = r#"
{"kind":"availability","isAvailable":true}
{"kind":"bodyIndex","width":2,"height":1,"pixels":"AP8="}
{"kind":"body","bodies":[{"isTracked":true,"trackingId":7}]}
{"kind":"expired","frame":"bodyIndex"}
"#;

    #[test]
    fn capture_lines_parse_into_records() {
        let records = CaptureRecord::parse_capture(CAPTURE).unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0], CaptureRecord::Availability { is_available: true });
        match &records[2] {
            CaptureRecord::Body { bodies } => assert_eq!(bodies[0].tracking_id, 7),
            other => panic!("expected body record, got {other:?}"),
        }
    }

    #[test]
    fn malformed_line_reports_its_number() {
        let err = CaptureRecord::parse_capture("{\"kind\":\"body\",\"bodies\":[]}\nnot json")
            .unwrap_err();
        assert!(err.to_string().contains("capture line 2"), "{err}");
    }

    #[tokio::test]
    async fn replay_emits_records_then_ends() {
        let mut source = ReplaySource::from_records(CaptureRecord::parse_capture(CAPTURE).unwrap())
            .with_speed(10.0);
        source.open_body_reader();
        source.open_body_index_reader();
        source.open().unwrap();

        let mut count = 0;
        while let Some(_event) = source.next_event().await.unwrap() {
            count += 1;
        }
        assert_eq!(count, 4);
    }

    #[tokio::test]
    async fn looped_replay_restarts() {
        let records = vec![CaptureRecord::Availability { is_available: true }];
        let mut source = ReplaySource::from_records(records).looped(true);
        source.open().unwrap();

        for _ in 0..3 {
            assert!(source.next_event().await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn filtered_records_still_yield_to_the_runtime() {
        let records = CaptureRecord::parse_capture(
            r#"{"kind":"bodyIndex","width":2,"height":1,"pixels":"AP8="}"#,
        )
        .unwrap();
        let mut source = ReplaySource::from_records(records).looped(true);
        source.open_body_index_reader().dispose();
        source.open().unwrap();

        // Every record is filtered out, so the call never returns; it must still
        // let the timer fire on this single-threaded runtime.
        let result = tokio::time::timeout(Duration::from_millis(50), source.next_event()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn looped_capture_without_skeletal_frames_is_paced_per_pass() {
        let records = vec![CaptureRecord::Availability { is_available: true }];
        let mut source = ReplaySource::from_records(records).with_speed(10.0).looped(true);
        source.open().unwrap();

        let start = tokio::time::Instant::now();
        for _ in 0..4 {
            assert!(source.next_event().await.unwrap().is_some());
        }
        // First pass is immediate, then one frame period per restart.
        let period = Duration::from_secs_f64(1.0 / (SENSOR_FRAME_RATE * 10.0));
        assert!(start.elapsed() >= period * 2, "{:?}", start.elapsed());
    }

    #[tokio::test]
    async fn unopened_replay_is_closed() {
        let mut source = ReplaySource::from_records(Vec::new());
        assert!(matches!(source.next_event().await, Err(MotionError::SourceClosed)));
    }

    #[test]
    fn missing_capture_file_is_a_file_error() {
        let result = ReplaySource::open_file("/nonexistent/capture.jsonl");
        assert!(matches!(result, Err(MotionError::File { .. })));
    }
}
