//! Server configuration
//!
//! Loaded from YAML; every field has a default so an empty document is a
//! valid configuration.
//!
//! ```yaml
//! bind_address: 0.0.0.0:8521
//! path: /
//! protocol: kinect-motion.v1
//! startup_order: transport_first
//! queue:
//!   policy: drop_oldest
//!   capacity: 120
//! replay:
//!   path: captures/session.jsonl
//!   speed: 1.0
//!   looped: true
//! ```

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::queue::QueuePolicy;
use crate::transport::TransportSettings;
use crate::{MotionError, Result};

pub const DEFAULT_PORT: u16 = 8521;
pub const DEFAULT_PROTOCOL: &str = "kinect-motion.v1";

/// Which side of the pipeline is brought up first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartupOrder {
    /// Start the transport, then open the source. Subscribers can connect
    /// before the first frame arrives.
    #[default]
    TransportFirst,
    /// Open the source, then start the transport.
    SourceFirst,
}

/// Recorded capture to serve instead of live hardware.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplaySettings {
    pub path: PathBuf,
    pub speed: f64,
    pub looped: bool,
}

impl Default for ReplaySettings {
    fn default() -> Self {
        Self { path: PathBuf::new(), speed: 1.0, looped: false }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: SocketAddr,
    pub path: String,
    pub protocol: String,
    pub startup_order: StartupOrder,
    pub queue: QueuePolicy,
    /// Longest the idle delivery loop waits before re-checking liveness.
    pub liveness_poll_ms: u64,
    pub subscriber_buffer: usize,
    pub replay: Option<ReplaySettings>,
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            path: "/".to_string(),
            protocol: DEFAULT_PROTOCOL.to_string(),
            startup_order: StartupOrder::default(),
            queue: QueuePolicy::default(),
            liveness_poll_ms: 250,
            subscriber_buffer: 4,
            replay: None,
            log_filter: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Read and validate a YAML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| MotionError::file_error(path.to_path_buf(), e))?;
        let config = Self::from_yaml(&text)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml(text: &str) -> Result<Self> {
        // An empty document deserializes as null, not as an empty mapping.
        let config: Self = if text.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml_ng::from_str(text)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.protocol.trim().is_empty() {
            return Err(MotionError::config("protocol must not be empty"));
        }
        if !self.path.starts_with('/') {
            return Err(MotionError::config(format!("path '{}' must start with '/'", self.path)));
        }
        if self.subscriber_buffer == 0 {
            return Err(MotionError::config("subscriber_buffer must be at least 1"));
        }
        if self.liveness_poll_ms == 0 {
            return Err(MotionError::config("liveness_poll_ms must be at least 1"));
        }
        if let QueuePolicy::DropOldest { capacity: 0 } = self.queue {
            return Err(MotionError::config("queue capacity must be at least 1"));
        }
        if let Some(replay) = &self.replay {
            if !(replay.speed.is_finite() && replay.speed > 0.0) {
                return Err(MotionError::config(format!(
                    "replay speed must be positive, got {}",
                    replay.speed
                )));
            }
            if replay.path.as_os_str().is_empty() {
                return Err(MotionError::config("replay path must not be empty"));
            }
        }
        Ok(())
    }

    pub fn liveness_poll(&self) -> Duration {
        Duration::from_millis(self.liveness_poll_ms)
    }

    pub fn transport_settings(&self) -> TransportSettings {
        TransportSettings {
            bind_address: self.bind_address,
            path: self.path.clone(),
            protocol: self.protocol.clone(),
            subscriber_buffer: self.subscriber_buffer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_yields_defaults() {
        let config = ServerConfig::from_yaml("").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.bind_address.port(), 8521);
        assert_eq!(config.queue, QueuePolicy::Unbounded);
        assert_eq!(config.startup_order, StartupOrder::TransportFirst);
    }

    #[test]
    fn parses_every_section() {
        let config = ServerConfig::from_yaml(
            r#"
bind_address: 127.0.0.1:9000
path: /motion
protocol: motion.test
startup_order: source_first
queue:
  policy: drop_oldest
  capacity: 8
liveness_poll_ms: 50
replay:
  path: capture.jsonl
  speed: 2.0
  looped: true
"#,
        )
        .unwrap();

        assert_eq!(config.bind_address, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.path, "/motion");
        assert_eq!(config.startup_order, StartupOrder::SourceFirst);
        assert_eq!(config.queue, QueuePolicy::DropOldest { capacity: 8 });
        assert_eq!(config.liveness_poll(), Duration::from_millis(50));
        assert_eq!(config.subscriber_buffer, 4);

        let replay = config.replay.unwrap();
        assert_eq!(replay.path, PathBuf::from("capture.jsonl"));
        assert!(replay.looped);
    }

    #[test]
    fn invalid_values_are_rejected() {
        for yaml in [
            "protocol: ''",
            "path: motion",
            "subscriber_buffer: 0",
            "queue: { policy: drop_oldest, capacity: 0 }",
            "replay: { path: capture.jsonl, speed: 0 }",
            "replay: { path: capture.jsonl, speed: -1.5 }",
        ] {
            let err = ServerConfig::from_yaml(yaml).unwrap_err();
            assert!(matches!(err, MotionError::Config { .. }), "{yaml}: {err}");
        }
    }

    #[test]
    fn malformed_yaml_is_a_config_error() {
        let err = ServerConfig::from_yaml("bind_address: [not, an, address]").unwrap_err();
        assert!(matches!(err, MotionError::Config { .. }));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "protocol: from.file").unwrap();

        let config = ServerConfig::load(file.path()).unwrap();
        assert_eq!(config.protocol, "from.file");

        let missing = ServerConfig::load(file.path().with_extension("missing")).unwrap_err();
        assert!(matches!(missing, MotionError::File { .. }));
    }

    #[test]
    fn transport_settings_follow_config() {
        let config = ServerConfig { subscriber_buffer: 16, ..ServerConfig::default() };
        let settings = config.transport_settings();
        assert_eq!(settings.subscriber_buffer, 16);
        assert_eq!(settings.protocol, DEFAULT_PROTOCOL);
        assert_eq!(settings.path, "/");
    }
}
