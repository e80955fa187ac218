//! Single-shot queue consumer: receive, decode, scan, persist, acknowledge.
//!
//! One `run_cycle` handles at most one work item and then returns; the
//! external invoker is responsible for running the next cycle. Every step
//! records a `StepStatus`, and `ack_decision` alone decides from those
//! records whether the item is deleted. Scan and upload failures do not
//! block acknowledgment, so a bad target or a storage outage cannot make an
//! item redeliver forever. The guarantee is at-least-once: a failed delete
//! or an aborted cycle leaves the item to the queue's visibility timeout.

use chrono::Utc;
use tokio::time::timeout;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use crate::clients::{BlobStore, WorkItem, WorkQueue};
use crate::config::Deadlines;
use crate::errors::{ClientError, PersistError, PipelineError};
use crate::models::{ScanResult, ScanTask};
use crate::services::encoder::{encode, result_key};
use crate::services::scanner::Scanner;

/// Recorded status of one cycle step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StepStatus {
    #[default]
    NotAttempted,
    Succeeded,
    Failed(String),
}

impl StepStatus {
    pub fn attempted(&self) -> bool {
        !matches!(self, Self::NotAttempted)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed(message) => Some(message),
            _ => None,
        }
    }
}

/// Step records for one received work item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSteps {
    pub decode: StepStatus,
    pub scan: StepStatus,
    pub persist: StepStatus,
}

/// Whether a received item should be deleted from the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDecision {
    Acknowledge,
    /// Leave the item for redelivery once its visibility timeout expires.
    Hold,
}

/// The acknowledgment policy.
///
/// Undecodable items are acknowledged immediately. Decodable items are
/// acknowledged once both the scan and the persist step were attempted,
/// whatever their outcome. Anything else is held.
pub fn ack_decision(steps: &CycleSteps) -> AckDecision {
    match &steps.decode {
        StepStatus::Failed(_) => AckDecision::Acknowledge,
        StepStatus::Succeeded if steps.scan.attempted() && steps.persist.attempted() => {
            AckDecision::Acknowledge
        }
        _ => AckDecision::Hold,
    }
}

/// How one cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing arrived before the receive deadline. No queue mutation.
    NoMessage,
    /// The body was not a valid task; no scan or upload was attempted.
    ParseFailure {
        message_id: Option<String>,
        error: String,
        acknowledged: bool,
    },
    Processed {
        target: String,
        key: String,
        steps: CycleSteps,
        acknowledged: bool,
    },
}

impl CycleOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoMessage => "no_message",
            Self::ParseFailure { .. } => "parse_failure",
            Self::Processed { .. } => "processed",
        }
    }

    pub fn acknowledged(&self) -> bool {
        match self {
            Self::NoMessage => false,
            Self::ParseFailure { acknowledged, .. } | Self::Processed { acknowledged, .. } => {
                *acknowledged
            }
        }
    }
}

/// Composes the queue, scanner and blob store into one processing cycle.
pub struct Consumer<'a> {
    queue: &'a dyn WorkQueue,
    blobs: &'a dyn BlobStore,
    scanner: &'a dyn Scanner,
    deadlines: &'a Deadlines,
}

impl<'a> Consumer<'a> {
    pub fn new(
        queue: &'a dyn WorkQueue,
        blobs: &'a dyn BlobStore,
        scanner: &'a dyn Scanner,
        deadlines: &'a Deadlines,
    ) -> Self {
        Self {
            queue,
            blobs,
            scanner,
            deadlines,
        }
    }

    /// Process at most one work item under the overall cycle budget.
    ///
    /// Errors are limited to a failing queue receive and an exhausted cycle
    /// budget. In the latter case the in-flight scan is dropped (killing the
    /// child process) and the item is left unacknowledged.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, PipelineError> {
        let cycle_id = Uuid::new_v4();
        let span = tracing::info_span!("cycle", %cycle_id);

        match timeout(self.deadlines.cycle, self.process_next().instrument(span)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(
                    %cycle_id,
                    budget_secs = self.deadlines.cycle.as_secs(),
                    "Cycle budget exhausted, leaving work item for redelivery"
                );
                Err(PipelineError::CycleTimeout(self.deadlines.cycle))
            }
        }
    }

    async fn process_next(&self) -> Result<CycleOutcome, PipelineError> {
        let Some(item) = self.receive().await? else {
            return Ok(CycleOutcome::NoMessage);
        };
        info!(message_id = ?item.message_id, "Received work item");

        let mut steps = CycleSteps::default();

        let task = match ScanTask::from_message_body(&item.body) {
            Ok(task) => {
                steps.decode = StepStatus::Succeeded;
                task
            }
            Err(e) => {
                error!(message_id = ?item.message_id, error = %e, "Discarding malformed work item");
                steps.decode = StepStatus::Failed(e.to_string());
                let acknowledged = self.settle(&item, &steps).await;
                return Ok(CycleOutcome::ParseFailure {
                    message_id: item.message_id,
                    error: e.to_string(),
                    acknowledged,
                });
            }
        };

        let result = self.scanner.scan(&task).await;
        steps.scan = match &result.error {
            None => StepStatus::Succeeded,
            Some(message) => StepStatus::Failed(message.clone()),
        };

        let key = result_key(&task.target, Utc::now().timestamp());
        steps.persist = match self.persist(&key, &result).await {
            Ok(()) => {
                info!(key = %key, "Result uploaded");
                StepStatus::Succeeded
            }
            Err(e) => {
                error!(key = %key, error = %e, "Failed to store scan result");
                StepStatus::Failed(e.to_string())
            }
        };

        let acknowledged = self.settle(&item, &steps).await;
        Ok(CycleOutcome::Processed {
            target: task.target,
            key,
            steps,
            acknowledged,
        })
    }

    async fn receive(&self) -> Result<Option<WorkItem>, PipelineError> {
        info!(
            wait_secs = self.deadlines.receive_wait.as_secs(),
            "Waiting for work item"
        );
        let received = timeout(
            self.deadlines.receive,
            self.queue.receive(self.deadlines.receive_wait),
        )
        .await;

        match received {
            Ok(Ok(Some(item))) => Ok(Some(item)),
            Ok(Ok(None)) => {
                info!("No messages received within timeout period");
                Ok(None)
            }
            Ok(Err(e)) => {
                error!(error = %e, "Error receiving message");
                Err(PipelineError::Receive(e))
            }
            Err(_) => {
                warn!(
                    after_secs = self.deadlines.receive.as_secs(),
                    "Receive deadline elapsed without a message"
                );
                Ok(None)
            }
        }
    }

    async fn persist(&self, key: &str, result: &ScanResult) -> Result<(), PersistError> {
        let bytes = encode(result)?;
        match timeout(self.deadlines.upload, self.blobs.put(key, bytes)).await {
            Ok(uploaded) => Ok(uploaded?),
            Err(_) => Err(ClientError::Timeout {
                operation: "upload",
                after: self.deadlines.upload,
            }
            .into()),
        }
    }

    /// Apply the acknowledgment policy. Returns whether the item was deleted.
    async fn settle(&self, item: &WorkItem, steps: &CycleSteps) -> bool {
        if ack_decision(steps) == AckDecision::Hold {
            warn!(message_id = ?item.message_id, "Leaving work item for redelivery");
            return false;
        }

        match timeout(self.deadlines.delete, self.queue.delete(&item.receipt)).await {
            Ok(Ok(())) => {
                info!(message_id = ?item.message_id, "Deleted work item");
                true
            }
            Ok(Err(e)) => {
                error!(
                    message_id = ?item.message_id,
                    error = %e,
                    "Failed to delete work item, it will be redelivered after the visibility timeout"
                );
                false
            }
            Err(_) => {
                error!(
                    message_id = ?item.message_id,
                    after_secs = self.deadlines.delete.as_secs(),
                    "Delete timed out, the work item will be redelivered after the visibility timeout"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::clients::{MemoryBlobStore, MemoryQueue};
    use crate::services::encoder::decode;

    /// Scanner stub returning a canned outcome and counting calls.
    #[derive(Default)]
    struct StubScanner {
        error: Option<String>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Scanner for StubScanner {
        async fn scan(&self, task: &ScanTask) -> ScanResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            ScanResult {
                target: task.target.clone(),
                output: format!("scanned {} {}", task.target, task.options),
                error: self.error.clone(),
                timestamp: Utc::now(),
            }
        }
    }

    fn fast_deadlines() -> Deadlines {
        Deadlines {
            cycle: Duration::from_secs(5),
            scan: Duration::from_secs(1),
            receive_wait: Duration::from_millis(10),
            receive: Duration::from_millis(200),
            upload: Duration::from_millis(500),
            delete: Duration::from_millis(500),
        }
    }

    const TASK: &str = r#"{"target":"10.0.0.1","options":"-p 22"}"#;

    #[test]
    fn policy_acknowledges_undecodable_items() {
        let steps = CycleSteps {
            decode: StepStatus::Failed("bad json".into()),
            ..CycleSteps::default()
        };
        assert_eq!(ack_decision(&steps), AckDecision::Acknowledge);
    }

    #[test]
    fn policy_acknowledges_after_failed_scan_and_upload() {
        let steps = CycleSteps {
            decode: StepStatus::Succeeded,
            scan: StepStatus::Failed("exit status: 1".into()),
            persist: StepStatus::Failed("upload refused".into()),
        };
        assert_eq!(ack_decision(&steps), AckDecision::Acknowledge);
    }

    #[test]
    fn policy_holds_until_persist_attempted() {
        let steps = CycleSteps {
            decode: StepStatus::Succeeded,
            scan: StepStatus::Succeeded,
            persist: StepStatus::NotAttempted,
        };
        assert_eq!(ack_decision(&steps), AckDecision::Hold);
        assert_eq!(ack_decision(&CycleSteps::default()), AckDecision::Hold);
    }

    #[tokio::test]
    async fn empty_queue_is_no_message() {
        let queue = MemoryQueue::new();
        let blobs = MemoryBlobStore::new();
        let scanner = StubScanner::default();
        let deadlines = fast_deadlines();
        let consumer = Consumer::new(&queue, &blobs, &scanner, &deadlines);

        let outcome = consumer.run_cycle().await.unwrap();
        assert_eq!(outcome, CycleOutcome::NoMessage);
        assert_eq!(queue.delete_calls(), 0);
        assert_eq!(blobs.put_calls(), 0);
        assert_eq!(scanner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stalled_receive_is_no_message() {
        let queue = MemoryQueue::with_messages([TASK]);
        queue.stall_receive(true);
        let blobs = MemoryBlobStore::new();
        let scanner = StubScanner::default();
        let deadlines = fast_deadlines();
        let consumer = Consumer::new(&queue, &blobs, &scanner, &deadlines);

        let outcome = consumer.run_cycle().await.unwrap();
        assert_eq!(outcome, CycleOutcome::NoMessage);
        assert_eq!(queue.delete_calls(), 0);
        assert_eq!(blobs.put_calls(), 0);
    }

    #[tokio::test]
    async fn receive_error_is_fatal() {
        let queue = MemoryQueue::with_messages([TASK]);
        queue.fail_receive(true);
        let blobs = MemoryBlobStore::new();
        let scanner = StubScanner::default();
        let deadlines = fast_deadlines();
        let consumer = Consumer::new(&queue, &blobs, &scanner, &deadlines);

        let err = consumer.run_cycle().await.unwrap_err();
        assert!(matches!(err, PipelineError::Receive(_)));
        assert_eq!(queue.pending_len(), 1);
    }

    #[tokio::test]
    async fn malformed_body_is_deleted_without_scanning() {
        let queue = MemoryQueue::with_messages(["{not json"]);
        let blobs = MemoryBlobStore::new();
        let scanner = StubScanner::default();
        let deadlines = fast_deadlines();
        let consumer = Consumer::new(&queue, &blobs, &scanner, &deadlines);

        let outcome = consumer.run_cycle().await.unwrap();
        assert!(matches!(
            outcome,
            CycleOutcome::ParseFailure {
                acknowledged: true,
                ..
            }
        ));
        assert_eq!(queue.deleted(), vec!["msg-1".to_string()]);
        assert_eq!(scanner.calls.load(Ordering::SeqCst), 0);
        assert_eq!(blobs.put_calls(), 0);
    }

    #[tokio::test]
    async fn successful_cycle_stores_and_deletes() {
        let queue = MemoryQueue::with_messages([TASK]);
        let blobs = MemoryBlobStore::new();
        let scanner = StubScanner::default();
        let deadlines = fast_deadlines();
        let consumer = Consumer::new(&queue, &blobs, &scanner, &deadlines);

        let outcome = consumer.run_cycle().await.unwrap();
        let CycleOutcome::Processed {
            target,
            key,
            steps,
            acknowledged,
        } = outcome
        else {
            panic!("expected a processed cycle");
        };

        assert_eq!(target, "10.0.0.1");
        assert!(key.starts_with("scans/10.0.0.1_") && key.ends_with(".json"));
        assert_eq!(steps.scan, StepStatus::Succeeded);
        assert_eq!(steps.persist, StepStatus::Succeeded);
        assert!(acknowledged);

        let stored = decode(&blobs.get(&key).unwrap()).unwrap();
        assert_eq!(stored.output, "scanned 10.0.0.1 -p 22");
        assert!(stored.error.is_none());
        assert_eq!(queue.in_flight_len(), 0);
        assert_eq!(queue.pending_len(), 0);
    }

    #[tokio::test]
    async fn failed_scan_is_stored_and_acknowledged() {
        let queue = MemoryQueue::with_messages([TASK]);
        let blobs = MemoryBlobStore::new();
        let scanner = StubScanner {
            error: Some("nmap exited with exit status: 1".into()),
            ..StubScanner::default()
        };
        let deadlines = fast_deadlines();
        let consumer = Consumer::new(&queue, &blobs, &scanner, &deadlines);

        let outcome = consumer.run_cycle().await.unwrap();
        assert!(outcome.acknowledged());
        let key = blobs.keys().pop().unwrap();
        let stored = decode(&blobs.get(&key).unwrap()).unwrap();
        assert_eq!(
            stored.error.as_deref(),
            Some("nmap exited with exit status: 1")
        );
    }

    #[tokio::test]
    async fn upload_failure_still_acknowledges() {
        let queue = MemoryQueue::with_messages([TASK]);
        let blobs = MemoryBlobStore::new();
        blobs.fail_put(true);
        let scanner = StubScanner::default();
        let deadlines = fast_deadlines();
        let consumer = Consumer::new(&queue, &blobs, &scanner, &deadlines);

        let outcome = consumer.run_cycle().await.unwrap();
        let CycleOutcome::Processed {
            steps,
            acknowledged,
            ..
        } = outcome
        else {
            panic!("expected a processed cycle");
        };
        assert!(steps.persist.error().unwrap().contains("refused"));
        assert!(acknowledged);
        assert_eq!(queue.delete_calls(), 1);
    }

    #[tokio::test]
    async fn delete_failure_is_absorbed() {
        let queue = MemoryQueue::with_messages([TASK]);
        queue.fail_delete(true);
        let blobs = MemoryBlobStore::new();
        let scanner = StubScanner::default();
        let deadlines = fast_deadlines();
        let consumer = Consumer::new(&queue, &blobs, &scanner, &deadlines);

        let outcome = consumer.run_cycle().await.unwrap();
        assert_eq!(outcome.label(), "processed");
        assert!(!outcome.acknowledged());
        assert_eq!(queue.delete_calls(), 1);
        assert_eq!(queue.in_flight_len(), 1);
        assert_eq!(blobs.keys().len(), 1);
    }

    #[tokio::test]
    async fn exhausted_budget_leaves_item_unacknowledged() {
        let queue = MemoryQueue::with_messages([TASK]);
        let blobs = MemoryBlobStore::new();
        let scanner = StubScanner {
            delay: Some(Duration::from_secs(30)),
            ..StubScanner::default()
        };
        let deadlines = Deadlines {
            cycle: Duration::from_millis(300),
            ..fast_deadlines()
        };
        let consumer = Consumer::new(&queue, &blobs, &scanner, &deadlines);

        let err = consumer.run_cycle().await.unwrap_err();
        assert!(matches!(err, PipelineError::CycleTimeout(_)));
        assert_eq!(queue.delete_calls(), 0);
        assert_eq!(blobs.put_calls(), 0);
        assert_eq!(queue.in_flight_len(), 1);
    }
}
