//! Error types for the inertial pipeline
//!
//! ```text
//! PipelineError
//! ├── InvalidState   (control operation not allowed in the current state)
//! ├── ConfigError    (settings validation)
//! ├── StorageError   (record file creation / writing)
//! └── Executor       (tick thread could not be spawned)
//!
//! ReplayError        (sensor CSV could not be loaded)
//! ```
//!
//! Unavailable or non-finite sensor streams are not errors: they are
//! zeroed at the boundary and flagged on the sample (see
//! [`Sample::unavailable`](crate::Sample::unavailable)).

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Lifecycle state of a [`PipelineController`](crate::PipelineController).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Idle => f.write_str("idle"),
            PipelineState::Running => f.write_str("running"),
        }
    }
}

/// Top-level error returned by controller operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The operation is not permitted in the current state. State is left
    /// untouched.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: PipelineState,
    },

    #[error("invalid settings: {0}")]
    Config(#[from] ConfigError),

    #[error("record storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("cannot start executor thread: {0}")]
    Executor(#[source] io::Error),
}

/// Settings validation failures.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("sample interval must be finite and positive, got {0}")]
    InvalidSampleInterval(f64),

    #[error("at least one channel is required")]
    NoChannels,

    #[error("channel name must not be empty")]
    EmptyChannelName,

    #[error("channel name `{0}` must not contain commas, quotes or control characters")]
    InvalidChannelName(String),

    #[error("duplicate channel name `{0}`")]
    DuplicateChannel(String),

    #[error("channel `{channel}`: gate threshold must be finite and non-negative, got {value}")]
    InvalidThreshold { channel: String, value: f64 },

    #[error("channel `{channel}`: scale must be finite (distance scale non-negative), got {value}")]
    InvalidScale { channel: String, value: f64 },

    #[error("channel `{channel}`: {reason}")]
    InvalidFilter {
        channel: String,
        reason: &'static str,
    },
}

/// Record store failures. Logging is disabled for the rest of the session
/// when one occurs; computation continues.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("cannot create record file {path:?}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot write record: {0}")]
    Write(#[from] csv::Error),

    #[error("cannot flush record file: {0}")]
    Flush(#[source] io::Error),

    #[error("cannot start record writer: {0}")]
    Spawn(#[source] io::Error),

    #[error("record writer stopped unexpectedly")]
    WorkerDisconnected,
}

/// Sensor replay loading failures.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("cannot read sensor record: {0}")]
    Csv(#[from] csv::Error),

    #[error("row {row}: time {time} is not a representable offset")]
    InvalidTime { row: usize, time: f64 },
}
