//! Tracer configuration
//!
//! Defaults suit a process that ships events to a local analyzer socket.
//! Values can be overridden in code (`with_*`), from the environment
//! ([`TracerConfig::from_env`]) or from a TOML file:
//!
//! ```toml
//! [tracer]
//! transport_path = "/tmp/ucdbg.sock"
//! queue_capacity = 65536
//! batch_size = 256
//! drain_interval_ms = 1
//! retry_interval_ms = 100
//! ```

use crate::error::{Result, TraceError};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_TRANSPORT_PATH: &str = "/tmp/ucdbg.sock";
pub const DEFAULT_QUEUE_CAPACITY: usize = 65_536;
pub const DEFAULT_BATCH_SIZE: usize = 256;
pub const DEFAULT_DRAIN_INTERVAL: Duration = Duration::from_millis(1);
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

pub const ENV_TRANSPORT: &str = "UCDBG_TRANSPORT";
pub const ENV_QUEUE_CAPACITY: &str = "UCDBG_QUEUE_CAPACITY";
pub const ENV_BATCH_SIZE: &str = "UCDBG_BATCH_SIZE";

/// Runtime settings for a [`crate::Tracer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracerConfig {
    /// Socket or file the drain task writes to when `init` gets no path
    pub transport_path: String,
    /// Slots in the capture queue
    pub queue_capacity: usize,
    /// Records written per transport call
    pub batch_size: usize,
    /// Idle sleep of the drain task when the queue is empty
    pub drain_interval: Duration,
    /// Delay before reopening a failed transport
    pub retry_interval: Duration,
}

impl Default for TracerConfig {
    fn default() -> Self {
        TracerConfig {
            transport_path: DEFAULT_TRANSPORT_PATH.to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            batch_size: DEFAULT_BATCH_SIZE,
            drain_interval: DEFAULT_DRAIN_INTERVAL,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    tracer: TracerSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TracerSection {
    transport_path: Option<String>,
    queue_capacity: Option<usize>,
    batch_size: Option<usize>,
    drain_interval_ms: Option<u64>,
    retry_interval_ms: Option<u64>,
}

impl TracerConfig {
    pub fn with_transport_path(mut self, path: impl Into<String>) -> Self {
        self.transport_path = path.into();
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_drain_interval(mut self, interval: Duration) -> Self {
        self.drain_interval = interval;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Reject settings the runtime cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(TraceError::Config("queue_capacity must be > 0".into()));
        }
        if self.batch_size == 0 {
            return Err(TraceError::Config("batch_size must be > 0".into()));
        }
        if self.transport_path.is_empty() {
            return Err(TraceError::Config("transport_path must not be empty".into()));
        }
        Ok(())
    }

    /// Defaults overlaid with `UCDBG_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    fn overlay<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_TRANSPORT) {
            self.transport_path = path;
        }
        if let Some(raw) = lookup(ENV_QUEUE_CAPACITY) {
            self.queue_capacity = parse_count(ENV_QUEUE_CAPACITY, &raw)?;
        }
        if let Some(raw) = lookup(ENV_BATCH_SIZE) {
            self.batch_size = parse_count(ENV_BATCH_SIZE, &raw)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Parse a `[tracer]` table; missing keys keep their defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(text).map_err(|e| TraceError::Config(e.to_string()))?;
        let section = file.tracer;
        let defaults = Self::default();

        let config = TracerConfig {
            transport_path: section.transport_path.unwrap_or(defaults.transport_path),
            queue_capacity: section.queue_capacity.unwrap_or(defaults.queue_capacity),
            batch_size: section.batch_size.unwrap_or(defaults.batch_size),
            drain_interval: section
                .drain_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.drain_interval),
            retry_interval: section
                .retry_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_interval),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

fn parse_count(key: &str, raw: &str) -> Result<usize> {
    raw.trim()
        .parse()
        .map_err(|_| TraceError::Config(format!("{key}: expected a positive integer, got {raw:?}")))
}
