//! End-to-end pipeline scenarios against the in-memory backends.
//!
//! The producer side submits to `MemoryWorkflow`; the consumer side pulls
//! from `MemoryQueue`, runs the real subprocess executor and stores into
//! `MemoryBlobStore`.
//!
//! Run with: `cargo test --test full_pipeline_test`

use std::time::Duration;

use scanflow::clients::{MemoryBlobStore, MemoryQueue, MemoryWorkflow, WorkQueue};
use scanflow::config::Deadlines;
use scanflow::models::{ScanTask, WorkflowInput};
use scanflow::services::encoder::decode;
use scanflow::services::{produce, Consumer, CycleOutcome, ScanExecutor, StepStatus};

fn deadlines() -> Deadlines {
    Deadlines {
        cycle: Duration::from_secs(20),
        scan: Duration::from_secs(5),
        receive_wait: Duration::from_millis(10),
        receive: Duration::from_millis(500),
        upload: Duration::from_secs(1),
        delete: Duration::from_secs(1),
    }
}

#[tokio::test]
async fn producer_submits_parsed_targets_in_order() {
    let workflow = MemoryWorkflow::new();
    let report = produce("10.0.0.1\n# comment\n10.0.0.2 -p 80,443\n", "-sS", &workflow)
        .await
        .unwrap();
    assert_eq!(report.submitted, 2);

    let runs = workflow.runs();
    assert_eq!(runs.len(), 1, "exactly one workflow run");

    let payload: serde_json::Value = serde_json::from_str(&runs[0]).unwrap();
    assert_eq!(
        payload,
        serde_json::json!({
            "targets": [
                {"target": "10.0.0.1", "options": "-sS"},
                {"target": "10.0.0.2", "options": "-p 80,443"}
            ]
        })
    );
}

#[tokio::test]
async fn fixture_file_round_trips_through_workflow_payload() {
    let workflow = MemoryWorkflow::new();
    let input = include_str!("fixtures/targets.txt");
    produce(input, "-sS", &workflow).await.unwrap();

    let parsed: WorkflowInput = serde_json::from_str(&workflow.runs()[0]).unwrap();
    assert_eq!(
        parsed.targets,
        vec![
            ScanTask::new("10.0.0.1", "-sS"),
            ScanTask::new("10.0.0.2", "-p 80,443"),
            ScanTask::new("10.0.1.0/24", "-sV -T4"),
            ScanTask::new("scanme.test", "-sS"),
        ]
    );
}

#[tokio::test]
async fn empty_queue_makes_no_mutations() {
    let queue = MemoryQueue::new();
    let blobs = MemoryBlobStore::new();
    let scanner = ScanExecutor::new("/nonexistent/scanflow-tool", Duration::from_secs(5));
    let deadlines = deadlines();

    let outcome = Consumer::new(&queue, &blobs, &scanner, &deadlines)
        .run_cycle()
        .await
        .unwrap();

    assert_eq!(outcome, CycleOutcome::NoMessage);
    assert_eq!(queue.receive_calls(), 1);
    assert_eq!(queue.delete_calls(), 0);
    assert_eq!(blobs.put_calls(), 0);
}

#[tokio::test]
async fn unavailable_tool_is_recorded_and_acknowledged() {
    let queue = MemoryQueue::with_messages([r#"{"target":"scanme.test","options":"-sS"}"#]);
    let blobs = MemoryBlobStore::new();
    let scanner = ScanExecutor::new("/nonexistent/scanflow-tool", Duration::from_secs(5));
    let deadlines = deadlines();

    let outcome = Consumer::new(&queue, &blobs, &scanner, &deadlines)
        .run_cycle()
        .await
        .unwrap();

    let CycleOutcome::Processed {
        target,
        key,
        steps,
        acknowledged,
    } = outcome
    else {
        panic!("expected a processed cycle");
    };
    assert_eq!(target, "scanme.test");
    assert!(matches!(steps.scan, StepStatus::Failed(_)));
    assert_eq!(steps.persist, StepStatus::Succeeded);
    assert!(acknowledged);
    assert_eq!(queue.deleted(), vec!["msg-1".to_string()]);

    let stored = decode(&blobs.get(&key).unwrap()).unwrap();
    assert_eq!(stored.target, "scanme.test");
    assert!(stored.output.is_empty());
    let error = stored.error.unwrap();
    assert!(
        error.starts_with("failed to launch /nonexistent/scanflow-tool"),
        "{error}"
    );
}

#[tokio::test]
async fn malformed_message_is_dropped_before_scanning() {
    let queue = MemoryQueue::with_messages([r#"{"options":"-sS"}"#]);
    let blobs = MemoryBlobStore::new();
    let scanner = ScanExecutor::new("/nonexistent/scanflow-tool", Duration::from_secs(5));
    let deadlines = deadlines();

    let outcome = Consumer::new(&queue, &blobs, &scanner, &deadlines)
        .run_cycle()
        .await
        .unwrap();

    assert_eq!(outcome.label(), "parse_failure");
    assert!(outcome.acknowledged());
    assert_eq!(queue.pending_len() + queue.in_flight_len(), 0);
    assert_eq!(blobs.put_calls(), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn queued_task_runs_real_tool_and_stores_output() {
    let queue = MemoryQueue::new();
    let task = ScanTask::new("10.0.0.9", "-p 8080");
    queue
        .send(&serde_json::to_string(&task).unwrap())
        .await
        .unwrap();
    let blobs = MemoryBlobStore::new();
    let scanner = ScanExecutor::new("echo", Duration::from_secs(5));
    let deadlines = deadlines();

    let outcome = Consumer::new(&queue, &blobs, &scanner, &deadlines)
        .run_cycle()
        .await
        .unwrap();
    assert!(outcome.acknowledged());

    let key = blobs.keys().pop().unwrap();
    assert!(key.starts_with("scans/10.0.0.9_"));
    let stored = decode(&blobs.get(&key).unwrap()).unwrap();
    assert_eq!(stored.output, "10.0.0.9 -p 8080\n");
    assert!(stored.error.is_none());
}

#[tokio::test]
async fn failed_delete_leads_to_redelivery() {
    let queue = MemoryQueue::with_messages([r#"{"target":"scanme.test","options":""}"#]);
    queue.fail_delete(true);
    let blobs = MemoryBlobStore::new();
    let scanner = ScanExecutor::new("/nonexistent/scanflow-tool", Duration::from_secs(5));
    let deadlines = deadlines();
    let consumer = Consumer::new(&queue, &blobs, &scanner, &deadlines);

    let first = consumer.run_cycle().await.unwrap();
    assert!(!first.acknowledged());

    queue.expire_in_flight();
    queue.fail_delete(false);

    let second = consumer.run_cycle().await.unwrap();
    assert!(second.acknowledged());
    assert_eq!(queue.deleted(), vec!["msg-1".to_string()]);
    assert!(blobs.put_calls() >= 2, "at-least-once: the target is stored twice");
}
