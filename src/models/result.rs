//! Scan outcome persisted to the blob store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of exactly one scan attempt.
///
/// `error` is present iff the scan did not finish cleanly; `output` keeps
/// whatever the tool printed either way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub target: String,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ScanResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
