//! External scan tool execution under a hard deadline.
//!
//! One call spawns the tool exactly once. Stdout and stderr are drained
//! into a single buffer as they arrive, so the captured text is the
//! combined output and survives a timeout kill.

use std::process::Stdio;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::errors::ScanError;
use crate::models::{ScanResult, ScanTask};

/// Default ceiling for one scan (5 minutes).
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(300);

/// Anything that turns a task into a result without failing.
///
/// Tool failures are reported through `ScanResult::error`, never as `Err`.
#[async_trait]
pub trait Scanner: Send + Sync {
    async fn scan(&self, task: &ScanTask) -> ScanResult;
}

/// Runs the scan tool as a subprocess.
#[derive(Debug, Clone)]
pub struct ScanExecutor {
    tool: String,
    ceiling: Duration,
}

impl ScanExecutor {
    pub fn new(tool: impl Into<String>, ceiling: Duration) -> Self {
        Self {
            tool: tool.into(),
            ceiling,
        }
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }

    /// Run the tool against one task and classify the outcome.
    pub async fn run_scan(&self, task: &ScanTask) -> ScanResult {
        info!(scan_target = %task.target, options = %task.options, "Running scan");
        let args = task.arguments();
        debug!(command = %format!("{} {}", self.tool, args.join(" ")), "Executing scan tool");

        let (output, outcome) = self.execute(&args).await;

        let error = match outcome {
            Ok(()) => {
                info!(scan_target = %task.target, "Scan completed successfully");
                None
            }
            Err(e) => {
                error!(scan_target = %task.target, error = %e, "Scan failed");
                Some(e.to_string())
            }
        };

        ScanResult {
            target: task.target.clone(),
            output,
            error,
            timestamp: Utc::now(),
        }
    }

    async fn execute(&self, args: &[&str]) -> (String, Result<(), ScanError>) {
        let spawned = Command::new(&self.tool)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(source) => {
                let err = ScanError::Launch {
                    tool: self.tool.clone(),
                    source,
                };
                return (String::new(), Err(err));
            }
        };

        let captured = Mutex::new(Vec::new());
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let waited = {
            let run = async {
                let (_, _, status) = tokio::join!(
                    drain(stdout, &captured),
                    drain(stderr, &captured),
                    child.wait()
                );
                status
            };
            tokio::time::timeout(self.ceiling, run).await
        };

        let outcome = match waited {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => Err(ScanError::Exit {
                tool: self.tool.clone(),
                status: status.to_string(),
            }),
            Ok(Err(source)) => Err(ScanError::Wait {
                tool: self.tool.clone(),
                source,
            }),
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill timed-out scan");
                }
                Err(ScanError::Timeout(self.ceiling))
            }
        };

        let bytes = captured.into_inner().unwrap_or_else(PoisonError::into_inner);
        (String::from_utf8_lossy(&bytes).into_owned(), outcome)
    }
}

#[async_trait]
impl Scanner for ScanExecutor {
    async fn scan(&self, task: &ScanTask) -> ScanResult {
        self.run_scan(task).await
    }
}

async fn drain<R>(reader: Option<R>, sink: &Mutex<Vec<u8>>)
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return;
    };
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let mut captured = sink.lock().unwrap_or_else(PoisonError::into_inner);
                captured.extend_from_slice(&buf[..n]);
            }
        }
    }
}
