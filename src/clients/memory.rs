//! In-process backends with call recording and failure injection.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::{BlobStore, ReceiptHandle, RunHandle, WorkItem, WorkQueue, WorkflowTrigger};
use crate::errors::ClientError;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct QueueState {
    next_id: usize,
    deliveries: usize,
    pending: VecDeque<(String, String)>,
    in_flight: HashMap<ReceiptHandle, (String, String)>,
    deleted: Vec<String>,
}

/// Queue with SQS-like receipt semantics.
///
/// A received item moves to in-flight until deleted; deleting an unknown or
/// already-used receipt fails. `expire_in_flight` simulates the visibility
/// timeout by returning every in-flight item to the pending list.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    state: Mutex<QueueState>,
    fail_receive: AtomicBool,
    fail_delete: AtomicBool,
    stall_receive: AtomicBool,
    receive_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue pre-loaded with the given bodies, in delivery order.
    pub fn with_messages<I, S>(bodies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let queue = Self::new();
        for body in bodies {
            queue.push(body);
        }
        queue
    }

    pub fn push(&self, body: impl Into<String>) -> String {
        let mut state = lock(&self.state);
        state.next_id += 1;
        let id = format!("msg-{}", state.next_id);
        state.pending.push_back((id.clone(), body.into()));
        id
    }

    pub fn fail_receive(&self, fail: bool) {
        self.fail_receive.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    /// Make `receive` hang well past any caller deadline.
    pub fn stall_receive(&self, stall: bool) {
        self.stall_receive.store(stall, Ordering::SeqCst);
    }

    pub fn expire_in_flight(&self) {
        let mut state = lock(&self.state);
        let expired: Vec<_> = state.in_flight.drain().map(|(_, item)| item).collect();
        state.pending.extend(expired);
    }

    pub fn pending_len(&self) -> usize {
        lock(&self.state).pending.len()
    }

    pub fn in_flight_len(&self) -> usize {
        lock(&self.state).in_flight.len()
    }

    /// Message ids deleted so far, in order.
    pub fn deleted(&self) -> Vec<String> {
        lock(&self.state).deleted.clone()
    }

    pub fn receive_calls(&self) -> usize {
        self.receive_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkQueue for MemoryQueue {
    async fn receive(&self, max_wait: Duration) -> Result<Option<WorkItem>, ClientError> {
        self.receive_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_receive.load(Ordering::SeqCst) {
            return Err(ClientError::Queue("receive refused".to_string()));
        }
        if self.stall_receive.load(Ordering::SeqCst) {
            tokio::time::sleep(max_wait + Duration::from_secs(3600)).await;
        }

        let mut state = lock(&self.state);
        let Some((id, body)) = state.pending.pop_front() else {
            return Ok(None);
        };
        state.deliveries += 1;
        let receipt = ReceiptHandle(format!("receipt-{id}-{}", state.deliveries));
        state
            .in_flight
            .insert(receipt.clone(), (id.clone(), body.clone()));
        Ok(Some(WorkItem {
            message_id: Some(id),
            body,
            receipt,
        }))
    }

    async fn delete(&self, receipt: &ReceiptHandle) -> Result<(), ClientError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(ClientError::Queue("delete refused".to_string()));
        }
        let mut state = lock(&self.state);
        match state.in_flight.remove(receipt) {
            Some((id, _)) => {
                state.deleted.push(id);
                Ok(())
            }
            None => Err(ClientError::Queue(format!(
                "receipt handle {receipt} is not valid"
            ))),
        }
    }

    async fn send(&self, body: &str) -> Result<Option<String>, ClientError> {
        Ok(Some(self.push(body)))
    }
}

/// Blob store keeping objects in a sorted map.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    fail_put: AtomicBool,
    put_calls: AtomicUsize,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_put(&self, fail: bool) {
        self.fail_put.store(fail, Ordering::SeqCst);
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        lock(&self.objects).get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        lock(&self.objects).keys().cloned().collect()
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), ClientError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(ClientError::BlobStore(format!("put {key} refused")));
        }
        lock(&self.objects).insert(key.to_string(), bytes);
        Ok(())
    }
}

/// Workflow engine that records every payload it is started with.
#[derive(Debug, Default)]
pub struct MemoryWorkflow {
    runs: Mutex<Vec<String>>,
    fail_start: AtomicBool,
}

impl MemoryWorkflow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Payloads of every started run, in order.
    pub fn runs(&self) -> Vec<String> {
        lock(&self.runs).clone()
    }
}

#[async_trait]
impl WorkflowTrigger for MemoryWorkflow {
    async fn start_run(&self, payload: &str) -> Result<RunHandle, ClientError> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(ClientError::Workflow("start refused".to_string()));
        }
        let mut runs = lock(&self.runs);
        runs.push(payload.to_string());
        Ok(RunHandle(format!("run-{}", runs.len())))
    }
}
