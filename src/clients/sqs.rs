//! SQS-backed work queue.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::Client;

use super::{ReceiptHandle, WorkItem, WorkQueue};
use crate::config::MAX_RECEIVE_WAIT_SECS;
use crate::errors::ClientError;

/// Work queue bound to one SQS queue URL.
#[derive(Debug, Clone)]
pub struct SqsQueue {
    client: Client,
    queue_url: String,
}

impl SqsQueue {
    pub fn new(sdk_config: &aws_config::SdkConfig, queue_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(sdk_config),
            queue_url: queue_url.into(),
        }
    }
}

#[async_trait]
impl WorkQueue for SqsQueue {
    async fn receive(&self, max_wait: Duration) -> Result<Option<WorkItem>, ClientError> {
        let wait_secs = max_wait.as_secs().min(MAX_RECEIVE_WAIT_SECS) as i32;
        tracing::debug!(queue_url = %self.queue_url, wait_secs, "Receiving from SQS");

        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(1)
            .wait_time_seconds(wait_secs)
            .send()
            .await
            .map_err(|e| ClientError::Queue(DisplayErrorContext(&e).to_string()))?;

        let Some(message) = output.messages().first() else {
            return Ok(None);
        };

        let receipt = message
            .receipt_handle()
            .ok_or_else(|| ClientError::Queue("message has no receipt handle".to_string()))?;

        Ok(Some(WorkItem {
            message_id: message.message_id().map(str::to_string),
            body: message.body().unwrap_or_default().to_string(),
            receipt: ReceiptHandle(receipt.to_string()),
        }))
    }

    async fn delete(&self, receipt: &ReceiptHandle) -> Result<(), ClientError> {
        tracing::debug!(queue_url = %self.queue_url, "Deleting message from SQS");
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(&receipt.0)
            .send()
            .await
            .map_err(|e| ClientError::Queue(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }

    async fn send(&self, body: &str) -> Result<Option<String>, ClientError> {
        tracing::debug!(queue_url = %self.queue_url, "Sending message to SQS");
        let output = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| ClientError::Queue(DisplayErrorContext(&e).to_string()))?;
        Ok(output.message_id().map(str::to_string))
    }
}
