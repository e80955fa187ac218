//! Process configuration loaded once from environment variables.
//!
//! Both binaries build their config at startup and pass it down by
//! reference; nothing below this module reads the environment.

use std::env;
use std::time::Duration;

/// Longest long-poll wait the queue service accepts.
pub const MAX_RECEIVE_WAIT_SECS: u64 = 20;

/// Configuration errors are always fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {message}")]
    Invalid { name: &'static str, message: String },
}

/// Deadlines bounding one consumer cycle and each of its legs.
#[derive(Debug, Clone, PartialEq)]
pub struct Deadlines {
    /// Budget for the whole receive/scan/persist/acknowledge cycle.
    pub cycle: Duration,
    /// Hard ceiling on one scan subprocess.
    pub scan: Duration,
    /// Long-poll wait passed to the queue service.
    pub receive_wait: Duration,
    /// Deadline on the receive call, long-poll wait included.
    pub receive: Duration,
    pub upload: Duration,
    pub delete: Duration,
}

impl Default for Deadlines {
    fn default() -> Self {
        Self {
            cycle: Duration::from_secs(600),
            scan: Duration::from_secs(300),
            receive_wait: Duration::from_secs(20),
            receive: Duration::from_secs(30),
            upload: Duration::from_secs(60),
            delete: Duration::from_secs(30),
        }
    }
}

impl Deadlines {
    /// Time reserved inside the cycle budget for everything except the scan.
    pub fn overhead(&self) -> Duration {
        self.receive + self.upload + self.delete
    }

    /// Check that the nested deadlines fit inside the cycle budget.
    ///
    /// The scan ceiling must leave room for the receive, upload and delete
    /// legs, so a scan that runs to its ceiling can never push the cycle
    /// past its own budget.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.receive_wait > Duration::from_secs(MAX_RECEIVE_WAIT_SECS) {
            return Err(ConfigError::Invalid {
                name: "RECEIVE_WAIT_SECS",
                message: format!("must be at most {MAX_RECEIVE_WAIT_SECS}"),
            });
        }
        if self.receive < self.receive_wait {
            return Err(ConfigError::Invalid {
                name: "RECEIVE_TIMEOUT_SECS",
                message: format!(
                    "must be at least the long-poll wait ({}s)",
                    self.receive_wait.as_secs()
                ),
            });
        }
        if self.scan.is_zero() {
            return Err(ConfigError::Invalid {
                name: "SCAN_TIMEOUT_SECS",
                message: "must be greater than zero".to_string(),
            });
        }
        let available = self.cycle.saturating_sub(self.overhead());
        if self.scan > available {
            return Err(ConfigError::Invalid {
                name: "SCAN_TIMEOUT_SECS",
                message: format!(
                    "scan ceiling {}s exceeds cycle budget {}s minus {}s reserved for queue and upload",
                    self.scan.as_secs(),
                    self.cycle.as_secs(),
                    self.overhead().as_secs()
                ),
            });
        }
        Ok(())
    }
}

/// Consumer configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub queue_url: String,
    pub bucket: String,
    pub scan_tool: String,
    pub deadlines: Deadlines,
}

impl ConsumerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup. `from_env` delegates here.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Deadlines::default();
        let deadlines = Deadlines {
            cycle: secs(&lookup, "CYCLE_TIMEOUT_SECS", defaults.cycle)?,
            scan: secs(&lookup, "SCAN_TIMEOUT_SECS", defaults.scan)?,
            receive_wait: secs(&lookup, "RECEIVE_WAIT_SECS", defaults.receive_wait)?,
            receive: secs(&lookup, "RECEIVE_TIMEOUT_SECS", defaults.receive)?,
            upload: secs(&lookup, "UPLOAD_TIMEOUT_SECS", defaults.upload)?,
            delete: secs(&lookup, "DELETE_TIMEOUT_SECS", defaults.delete)?,
        };
        deadlines.validate()?;

        Ok(Self {
            queue_url: required(&lookup, "QUEUE_URL")?,
            bucket: required(&lookup, "S3_BUCKET")?,
            scan_tool: lookup("SCAN_TOOL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| "nmap".to_string()),
            deadlines,
        })
    }
}

/// Producer configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub state_machine_arn: String,
}

impl ProducerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            state_machine_arn: required(&lookup, "STATE_MACHINE_ARN")?,
        })
    }
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn secs<F>(lookup: &F, name: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::Invalid {
                name,
                message: format!("{raw:?} is not a whole number of seconds: {e}"),
            }),
    }
}
