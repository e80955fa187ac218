//! Batch submission: parse a target list and start one workflow run.

use std::path::Path;

use tracing::info;

use crate::clients::{RunHandle, WorkflowTrigger};
use crate::errors::PipelineError;
use crate::models::WorkflowInput;
use crate::parsers::parse_targets;

/// Summary of one submitted batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProduceReport {
    pub run: RunHandle,
    pub submitted: usize,
}

/// Parse `input` and submit every task as a single orchestration run.
///
/// No chunking is done; any payload size limit is the workflow engine's.
pub async fn produce(
    input: &str,
    default_options: &str,
    trigger: &dyn WorkflowTrigger,
) -> Result<ProduceReport, PipelineError> {
    let targets = parse_targets(input, default_options);
    let submitted = targets.len();
    info!(count = submitted, "Parsed targets from input");

    let payload = serde_json::to_string(&WorkflowInput { targets })?;
    let run = trigger
        .start_run(&payload)
        .await
        .map_err(PipelineError::Submit)?;

    info!(run = %run, submitted, "Started scan workflow");
    Ok(ProduceReport { run, submitted })
}

/// Read a target file and submit it.
pub async fn produce_file(
    path: &Path,
    default_options: &str,
    trigger: &dyn WorkflowTrigger,
) -> Result<ProduceReport, PipelineError> {
    let input = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| PipelineError::Input {
            path: path.display().to_string(),
            source,
        })?;
    produce(&input, default_options, trigger).await
}
