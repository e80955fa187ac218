//! Step Functions workflow trigger.

use async_trait::async_trait;
use aws_sdk_sfn::error::DisplayErrorContext;
use aws_sdk_sfn::Client;

use super::{RunHandle, WorkflowTrigger};
use crate::errors::ClientError;

/// Starts executions of one state machine.
#[derive(Debug, Clone)]
pub struct StepFunctionsTrigger {
    client: Client,
    state_machine_arn: String,
}

impl StepFunctionsTrigger {
    pub fn new(sdk_config: &aws_config::SdkConfig, state_machine_arn: impl Into<String>) -> Self {
        Self {
            client: Client::new(sdk_config),
            state_machine_arn: state_machine_arn.into(),
        }
    }
}

#[async_trait]
impl WorkflowTrigger for StepFunctionsTrigger {
    async fn start_run(&self, payload: &str) -> Result<RunHandle, ClientError> {
        tracing::info!(state_machine_arn = %self.state_machine_arn, "Starting Step Functions execution");
        let output = self
            .client
            .start_execution()
            .state_machine_arn(&self.state_machine_arn)
            .input(payload)
            .send()
            .await
            .map_err(|e| ClientError::Workflow(DisplayErrorContext(&e).to_string()))?;
        Ok(RunHandle(output.execution_arn().to_string()))
    }
}
