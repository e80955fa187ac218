//! Pipeline services.

pub mod consumer;
pub mod encoder;
pub mod producer;
pub mod scanner;

pub use consumer::{ack_decision, AckDecision, Consumer, CycleOutcome, CycleSteps, StepStatus};
pub use producer::{produce, produce_file, ProduceReport};
pub use scanner::{ScanExecutor, Scanner};
