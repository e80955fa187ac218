//! Domain records exchanged between the producer, the queue and the consumer.

pub mod result;
pub mod task;

pub use result::ScanResult;
pub use task::{ScanTask, WorkflowInput};
