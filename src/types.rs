//! Core data types for the reduction monitor
//!
//! This module defines the vocabulary shared by the engine, the transports
//! and the plugin boundary:
//!
//! - [`NodePool`] - Pool geometry (collector at rank 0, workers at 1..size)
//! - [`DataMap`] - Key/value payload exchanged with plugins and event sources
//! - [`ProcessedMessage`] - Worker to collector messages (`Data | End | Stopped`)
//! - [`ControlMessage`] - Collector to worker messages (`Feedback | Stop`)
//! - [`ShutdownToken`] - How a run ended (graceful drain or forced stop)
//! - [`CollectionStats`] / [`WorkerStats`] / [`RunSummary`] - Bookkeeping

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Integer identity of a pool node
pub type Rank = usize;

/// Rank of the collecting node
pub const COLLECTOR_RANK: Rank = 0;

/// Destination rank in a feedback map meaning "every worker"
pub const BROADCAST_RANK: Rank = 0;

/// Key/value payload used at the plugin and event-source boundary
pub type DataMap = serde_json::Map<String, serde_json::Value>;

/// Feedback returned by the collect step, keyed by destination rank
///
/// A [`BROADCAST_RANK`] entry is delivered to every worker.
pub type Feedback = BTreeMap<Rank, DataMap>;

// ==================== Node Pool ====================

/// Geometry of the node pool
///
/// Rank 0 is always the collector; ranks `1..size` are workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodePool {
    size: usize,
}

impl NodePool {
    /// Create a pool of `size` nodes. Returns `None` when `size < 2`.
    pub fn new(size: usize) -> Option<Self> {
        (size >= 2).then_some(Self { size })
    }

    /// Total number of nodes, collector included
    pub fn size(&self) -> usize {
        self.size
    }

    /// Rank of the collecting node
    pub fn collector_rank(&self) -> Rank {
        COLLECTOR_RANK
    }

    /// Number of worker nodes
    pub fn worker_count(&self) -> usize {
        self.size - 1
    }

    /// Ranks of the worker nodes in ascending order
    pub fn worker_ranks(&self) -> impl Iterator<Item = Rank> {
        1..self.size
    }

    /// Check whether `rank` names a worker of this pool
    pub fn is_worker(&self, rank: Rank) -> bool {
        rank != COLLECTOR_RANK && rank < self.size
    }
}

// ==================== Messages ====================

/// Message sent from a worker to the collector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProcessedMessage {
    /// Result of processing one frame (or a final end-of-processing payload)
    Data { payload: DataMap, rank: Rank },
    /// The worker's event source is exhausted; no more messages follow
    End { rank: Rank },
    /// Acknowledges a forced stop; no more messages follow
    Stopped { rank: Rank },
}

impl ProcessedMessage {
    /// Rank of the worker that produced this message
    pub fn rank(&self) -> Rank {
        match self {
            ProcessedMessage::Data { rank, .. }
            | ProcessedMessage::End { rank }
            | ProcessedMessage::Stopped { rank } => *rank,
        }
    }

    /// Whether this message terminates the sender's stream
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProcessedMessage::Data { .. })
    }
}

/// Message sent from the collector to one worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ControlMessage {
    /// Feedback to merge into subsequently extracted frames
    Feedback(DataMap),
    /// Forced stop; the worker answers with `Stopped` and exits
    Stop,
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutdownToken {
    /// Every worker drained its source and sent `End`
    Drain,
    /// The collector forced a stop with the given reason
    Stop { reason: String },
}

impl std::fmt::Display for ShutdownToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownToken::Drain => write!(f, "drained"),
            ShutdownToken::Stop { reason } => write!(f, "stopped ({})", reason),
        }
    }
}

// ==================== Statistics ====================

/// Collector-side counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionStats {
    /// Number of data messages passed to the collect step
    pub collected: u64,
    /// Number of data messages discarded while draining during shutdown
    pub discarded: u64,
    /// Number of feedback maps delivered to worker control channels
    pub feedback_sent: u64,
    /// Number of idle polls (nothing available from the transport)
    pub idle_polls: u64,
}

/// Worker-side counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    /// Events fully processed
    pub events: u64,
    /// Events skipped because they could not be opened
    pub events_skipped: u64,
    /// Data messages sent for extracted frames
    pub frames_sent: u64,
    /// Frames skipped because extraction failed
    pub frames_failed: u64,
}

/// Outcome of a complete engine run, as seen by the collector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Wall-clock time the run started
    pub started_at: chrono::DateTime<chrono::Utc>,
    /// Time from start to the terminal state
    pub elapsed: Duration,
    /// How the run ended
    pub termination: ShutdownToken,
    /// Collector counters
    pub stats: CollectionStats,
    /// Workers that sent `End`
    pub workers_finished: usize,
    /// Workers counted as confirmed during a forced shutdown
    /// (`Stopped`, or an earlier `End` treated as an implicit `Stopped`)
    pub confirmations: usize,
}

impl RunSummary {
    /// Whether every worker drained its source
    pub fn drained(&self) -> bool {
        self.termination == ShutdownToken::Drain
    }

    /// Average collect rate over the whole run in Hz
    pub fn collect_rate_hz(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.stats.collected as f64 / secs
        } else {
            0.0
        }
    }
}
