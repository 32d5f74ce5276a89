#![allow(dead_code)]

use kinect_motion::types::{CameraSpacePoint, DepthSpacePoint, Payload};
use kinect_motion::{BroadcastTransport, CoordinateMapper, MotionServer, Result, ServerOptions};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Transport that keeps every payload in memory.
pub struct MemoryTransport {
    sent: Mutex<Vec<Payload>>,
    live_checks: usize,
    checks: AtomicUsize,
    connections: watch::Sender<usize>,
}

impl MemoryTransport {
    /// `keep_alive` holds for the first `checks` calls.
    pub fn alive_for(checks: usize) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            live_checks: checks,
            checks: AtomicUsize::new(0),
            connections: watch::Sender::new(0),
        })
    }

    pub fn payloads(&self) -> Vec<serde_json::Value> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|p| serde_json::from_slice(p.as_bytes()).unwrap())
            .collect()
    }

    pub fn liveness_checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl BroadcastTransport for MemoryTransport {
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn dispose(&self) {}

    async fn send(&self, payload: Payload) -> Result<()> {
        self.sent.lock().unwrap().push(payload);
        Ok(())
    }

    fn keep_alive(&self) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst) < self.live_checks
    }

    fn endpoints(&self) -> Vec<String> {
        vec!["memory://test".to_string()]
    }

    fn protocol(&self) -> &str {
        "kinect-motion.v1"
    }

    fn connection_updates(&self) -> watch::Receiver<usize> {
        self.connections.subscribe()
    }
}

/// Returns `(50, 60)` for points at the minimum joint depth and `(-1, -1)` otherwise.
pub struct ClampCheckingMapper;

impl CoordinateMapper for ClampCheckingMapper {
    fn map_camera_point_to_depth_space(&self, point: CameraSpacePoint) -> DepthSpacePoint {
        if point.z == 0.1 {
            DepthSpacePoint::new(50.0, 60.0)
        } else {
            DepthSpacePoint::new(-1.0, -1.0)
        }
    }
}

pub fn fast_options() -> ServerOptions {
    ServerOptions { liveness_poll: Duration::from_millis(5), ..ServerOptions::default() }
}

/// Wait until `len` payloads are queued.
pub async fn wait_for_queued(server: &MotionServer, len: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while server.queue().len() < len {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("expected {len} queued payloads, found {}", server.queue().len()));
}
