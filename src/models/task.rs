//! Scan tasks and the workflow payload that fans them out.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::errors::DecodeError;

/// One unit of scan work: a target expression and the tool flags to use.
///
/// Serialized as the queue message body `{"target": ..., "options": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ScanTask {
    /// Host name, IP address or CIDR range.
    #[validate(custom(function = "not_blank"))]
    pub target: String,
    /// Free-form argument string handed to the scan tool. May be empty.
    #[serde(default)]
    pub options: String,
}

impl ScanTask {
    pub fn new(target: impl Into<String>, options: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            options: options.into(),
        }
    }

    /// Decode a queue message body into a validated task.
    pub fn from_message_body(body: &str) -> Result<Self, DecodeError> {
        let task: Self = serde_json::from_str(body)?;
        task.validate()?;
        Ok(task)
    }

    /// Argument list for the scan tool: the target, then each option token.
    pub fn arguments(&self) -> Vec<&str> {
        std::iter::once(self.target.as_str())
            .chain(self.options.split_whitespace())
            .collect()
    }
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank_target"));
    }
    Ok(())
}

/// Payload that starts one orchestration run over a batch of tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowInput {
    pub targets: Vec<ScanTask>,
}
