//! Configuration module for the reduction monitor
//!
//! The engine is configured through a single [`EngineConfig`] value. Callers
//! usually build it in code (pool size and transport are decided by whoever
//! launches the monitor), but it can also be loaded from a TOML file:
//!
//! ```toml
//! pool_size = 5
//! transport = "message_passing"
//!
//! [frames]
//! max_frames_per_event = 2
//! skip_frames = [0]
//!
//! [collector]
//! idle_backoff_ms = 1
//! progress_interval = 1000
//!
//! [logging]
//! filter = "info,reduction_monitor=debug"
//! ```
//!
//! Every section falls back to its defaults when omitted.

use crate::error::{MonitorError, Result};
use crate::types::NodePool;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default number of nodes (one collector + three workers)
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Default capacity of the shared worker-to-collector queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Default collector sleep when the transport is empty, in milliseconds
pub const DEFAULT_IDLE_BACKOFF_MS: u64 = 1;

/// Default number of collected messages between progress reports
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 1000;

// ==================== Engine Config ====================

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of nodes in the pool, collector included (>= 2)
    pub pool_size: usize,

    /// Which transport connects the workers to the collector
    pub transport: TransportKind,

    /// Capacity of the bounded data queue (queue transport only)
    pub queue_capacity: usize,

    /// Whether SIGINT on the collector triggers a forced shutdown
    pub handle_sigint: bool,

    /// Which frames of each event are processed
    pub frames: FrameSelection,

    /// Collector loop tuning
    pub collector: CollectorConfig,

    /// Logging setup used by the binary
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            transport: TransportKind::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            handle_sigint: true,
            frames: FrameSelection::default(),
            collector: CollectorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Create a config for the given pool size and transport, defaults elsewhere
    pub fn new(pool_size: usize, transport: TransportKind) -> Self {
        Self {
            pool_size,
            transport,
            ..Default::default()
        }
    }

    /// Parse a config from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| MonitorError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load a config file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MonitorError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        Self::from_toml_str(&content)
            .map_err(|e| e.with_context(format!("Invalid config file {:?}", path)))
    }

    /// Save the config to disk as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    MonitorError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| MonitorError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| {
            MonitorError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// Check the config and derive the node pool
    pub fn validate(&self) -> Result<NodePool> {
        if self.transport == TransportKind::Queue && self.queue_capacity == 0 {
            return Err(MonitorError::Config(
                "queue_capacity must be greater than zero".to_string(),
            ));
        }
        NodePool::new(self.pool_size).ok_or_else(|| {
            MonitorError::Config(format!(
                "pool_size must be at least 2 (one collector and one worker), got {}",
                self.pool_size
            ))
        })
    }
}

// ==================== Transport Kind ====================

/// Transport implementations selectable at `start()`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Shared multi-producer queue plus one control pipe per worker
    #[default]
    Queue,
    /// Tagged point-to-point messages over a communicator
    MessagePassing,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Queue => write!(f, "queue"),
            TransportKind::MessagePassing => write!(f, "message-passing"),
        }
    }
}

// ==================== Frame Selection ====================

/// Which frames of an event a worker processes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameSelection {
    /// Process only the last `k` frames of each event
    pub max_frames_per_event: Option<usize>,

    /// Frame indices that are never processed
    pub skip_frames: Vec<usize>,
}

impl FrameSelection {
    /// Frame indices to process for an event with `num_frames` frames
    ///
    /// Returns the last `min(num_frames, cap)` indices in ascending order,
    /// minus the skipped ones.
    pub fn indices(&self, num_frames: usize) -> Vec<usize> {
        let count = self
            .max_frames_per_event
            .map_or(num_frames, |cap| cap.min(num_frames));
        (num_frames - count..num_frames)
            .filter(|index| !self.skip_frames.contains(index))
            .collect()
    }
}

// ==================== Collector Config ====================

/// Collector loop tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// How long the collector waits on an empty transport before idling
    pub idle_backoff_ms: u64,

    /// Collected messages between progress reports (0 disables them)
    pub progress_interval: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            idle_backoff_ms: DEFAULT_IDLE_BACKOFF_MS,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl CollectorConfig {
    /// Idle backoff as a duration
    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }
}

// ==================== Logging Config ====================

/// Logging setup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive (overridden by `RUST_LOG`)
    pub filter: String,

    /// Directory for daily rolling log files (stdout only when unset)
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            log_dir: None,
        }
    }
}

// ==================== Tests ====================
