//! Error types for the motion streaming pipeline.
//!
//! All errors implement `std::error::Error` and carry enough context to tell
//! an operator what went wrong and whether the process can keep running.
//!
//! ## Error Categories
//!
//! - **Source Errors**: The frame source failed or was closed underneath us
//! - **Transport Errors**: Binding the listener or delivering a payload failed
//! - **Serialization Errors**: A snapshot held a value the wire format cannot carry
//! - **Configuration Errors**: Invalid or unreadable server configuration
//! - **Capture Errors**: Problems reading or parsing a recorded capture file
//!
//! A frame that expired before it could be acquired is *not* an error; the
//! ingestion adapter skips it silently.
//!
//! ## Fatal vs. Recoverable
//!
//! ```rust
//! use kinect_motion::MotionError;
//!
//! let error = MotionError::serialization("bodies[0].lean.x is NaN");
//! assert!(error.is_fatal());
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T, E = MotionError> = std::result::Result<T, E>;

/// Main error type for the motion pipeline.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MotionError {
    #[error("Frame source error: {reason}")]
    Source {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Frame source is closed")]
    SourceClosed,

    #[error("Failed to bind listener on {address}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Transport error: {reason}")]
    Transport { reason: String },

    #[error("Failed to deliver payload: {reason}")]
    Send { reason: String },

    #[error("Snapshot cannot be serialized: {details}")]
    Serialization { details: String },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Capture file error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },
}

impl MotionError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            MotionError::Source { .. } => true,
            MotionError::Bind { .. } => true,
            MotionError::Transport { .. } => true,
            MotionError::SourceClosed => false,
            MotionError::Send { .. } => false,
            MotionError::Serialization { .. } => false,
            MotionError::Config { .. } => false,
            MotionError::File { .. } => false,
            MotionError::Parse { .. } => false,
        }
    }

    /// Returns whether this error must terminate the delivery pipeline.
    ///
    /// Send failures and serialization failures end the process; everything
    /// else is either a startup failure or local to one component.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MotionError::Send { .. } | MotionError::Serialization { .. })
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            MotionError::Source { .. } => vec![
                "Check that the sensor is connected and powered",
                "Verify the sensor runtime is installed",
                "Restart the server after reconnecting the sensor",
            ],
            MotionError::SourceClosed => vec![
                "Keep the source handle alive while frames are pushed",
                "Restart the server to reopen the source",
            ],
            MotionError::Bind { .. } => vec![
                "Check that no other process is using the port",
                "Choose a different bind address in the configuration",
                "Verify permissions for binding privileged ports",
            ],
            MotionError::Transport { .. } => vec![
                "Check the network interface is up",
                "Restart the server",
            ],
            MotionError::Send { .. } => vec![
                "Inspect subscriber connectivity",
                "Restart the server to resume streaming",
            ],
            MotionError::Serialization { .. } => vec![
                "Inspect the frame source for invalid joint data",
                "Report the offending capture to the driver vendor",
            ],
            MotionError::Config { .. } => vec![
                "Check the configuration file syntax",
                "Compare against the documented defaults",
            ],
            MotionError::File { .. } => vec![
                "Check the capture file exists and is readable",
                "Check file permissions",
            ],
            MotionError::Parse { .. } => vec![
                "Verify the capture was recorded by a compatible version",
                "Check the capture file for truncated lines",
            ],
        }
    }

    /// Helper constructor for frame source errors.
    pub fn source_failed(reason: impl Into<String>) -> Self {
        MotionError::Source { reason: reason.into(), source: None }
    }

    /// Helper constructor for bind failures.
    pub fn bind_failed(address: impl Into<String>, source: std::io::Error) -> Self {
        MotionError::Bind { address: address.into(), source }
    }

    /// Helper constructor for transport errors.
    pub fn transport(reason: impl Into<String>) -> Self {
        MotionError::Transport { reason: reason.into() }
    }

    /// Helper constructor for payload delivery failures.
    pub fn send_failed(reason: impl Into<String>) -> Self {
        MotionError::Send { reason: reason.into() }
    }

    /// Helper constructor for serialization failures.
    pub fn serialization(details: impl Into<String>) -> Self {
        MotionError::Serialization { details: details.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        MotionError::Config { reason: reason.into() }
    }

    /// Helper constructor for capture file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        MotionError::File { path, source }
    }

    /// Helper constructor for parse errors.
    pub fn parse(context: impl Into<String>, details: impl Into<String>) -> Self {
        MotionError::Parse { context: context.into(), details: details.into() }
    }
}

impl From<std::io::Error> for MotionError {
    fn from(err: std::io::Error) -> Self {
        MotionError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}

impl From<serde_yaml_ng::Error> for MotionError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        MotionError::Config { reason: err.to_string() }
    }
}
