//! Narrow interfaces to the external services the pipeline depends on.
//!
//! Each trait is bound to a single queue, bucket or workflow definition at
//! construction time. AWS-backed implementations live next to in-memory ones
//! used by tests and local dry runs.

pub mod memory;
pub mod s3;
pub mod sfn;
pub mod sqs;

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::ClientError;

pub use memory::{MemoryBlobStore, MemoryQueue, MemoryWorkflow};
pub use s3::S3BlobStore;
pub use sfn::StepFunctionsTrigger;
pub use sqs::SqsQueue;

/// Acknowledgment token for one delivery of a work item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(pub String);

impl std::fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One queue delivery: the raw body plus the token needed to delete it.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub message_id: Option<String>,
    pub body: String,
    pub receipt: ReceiptHandle,
}

/// Opaque identifier of a started orchestration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHandle(pub String);

impl std::fmt::Display for RunHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// At-least-once work queue.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Long-poll for at most one item, waiting up to `max_wait`.
    async fn receive(&self, max_wait: Duration) -> Result<Option<WorkItem>, ClientError>;

    /// Acknowledge an item so it is never redelivered.
    async fn delete(&self, receipt: &ReceiptHandle) -> Result<(), ClientError>;

    /// Enqueue a new item, returning the service-assigned message id if any.
    async fn send(&self, body: &str) -> Result<Option<String>, ClientError>;
}

/// Durable object store. Writes overwrite on key collision.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), ClientError>;
}

/// External workflow engine that fans a batch out into individual scans.
#[async_trait]
pub trait WorkflowTrigger: Send + Sync {
    async fn start_run(&self, payload: &str) -> Result<RunHandle, ClientError>;
}

/// Load AWS settings from the standard provider chain.
///
/// Region, credentials and `AWS_ENDPOINT_URL` overrides all come from the
/// environment or the shared AWS profile files.
pub async fn load_aws_config() -> aws_config::SdkConfig {
    aws_config::defaults(aws_config::BehaviorVersion::latest())
        .load()
        .await
}
