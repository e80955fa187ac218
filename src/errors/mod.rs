//! Error types shared across the pipeline.
//!
//! Per-item failures (decode, scan, upload, delete) are captured into the
//! cycle outcome and logged. Only the variants of `PipelineError` ever
//! reach the process boundary.

use std::time::Duration;

use crate::config::ConfigError;

/// Failure talking to an external collaborator (queue, blob store, workflow engine).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Blob store error: {0}")]
    BlobStore(String),

    #[error("Workflow error: {0}")]
    Workflow(String),

    #[error("{operation} timed out after {}s", .after.as_secs())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

/// Failure running the external scan tool.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("failed to launch {tool}: {source}")]
    Launch {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}")]
    Exit { tool: String, status: String },

    #[error("failed while waiting for {tool}: {source}")]
    Wait {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("scan timed out after {}", human_duration(.0))]
    Timeout(Duration),
}

/// A work-item body that cannot be interpreted as a scan task.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Malformed task JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid task: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

/// Failure serializing or deserializing a scan result.
#[derive(Debug, thiserror::Error)]
#[error("Result encoding error: {0}")]
pub struct EncodeError(#[from] pub serde_json::Error);

/// Failure storing a scan result. Logged by the consumer, never fatal.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("Upload failed: {0}")]
    Upload(#[from] ClientError),
}

/// Errors that terminate a binary with a non-zero status.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to receive work item: {0}")]
    Receive(#[source] ClientError),

    #[error("Failed to start workflow run: {0}")]
    Submit(#[source] ClientError),

    #[error("Failed to serialize workflow input: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Cycle exceeded its {}s budget", .0.as_secs())]
    CycleTimeout(Duration),

    #[error("Failed to read {path}: {source}")]
    Input {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Render a duration as whole minutes when it divides evenly, else seconds.
pub fn human_duration(d: &Duration) -> String {
    let secs = d.as_secs();
    let (n, unit) = if secs > 0 && secs % 60 == 0 {
        (secs / 60, "minute")
    } else {
        (secs, "second")
    };
    if n == 1 {
        format!("{n} {unit}")
    } else {
        format!("{n} {unit}s")
    }
}
