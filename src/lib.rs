//! # reduction-monitor: parallel online data reduction
//!
//! A framework for monitoring a stream of experiment events in near real
//! time. A pool of worker nodes pulls events from an event source, extracts
//! per-frame data and runs it through a user-supplied analysis plugin; a
//! single collecting node aggregates the results and can send feedback back
//! to the workers.
//!
//! ## Architecture
//!
//! - **Event source** ([`source::EventSource`]): enumerates events for each
//!   worker's partition and extracts key/value data per frame
//! - **Plugin** ([`processing::Processing`]): per-frame processing on the
//!   workers, aggregation and feedback on the collector
//! - **Engine** ([`engine::ParallelizationEngine`]): spawns one thread per
//!   worker, runs the collector on the calling thread and owns the shutdown
//!   handshake
//! - **Transports**: a bounded shared queue or tagged message passing, both
//!   built on crossbeam channels
//!
//! ## Example
//!
//! ```no_run
//! use reduction_monitor::{
//!     config::{EngineConfig, TransportKind},
//!     engine::ParallelizationEngine,
//!     processing::Processing,
//!     source::MockEventSource,
//!     types::{DataMap, Feedback, Rank},
//! };
//!
//! #[derive(Clone, Default)]
//! struct FrameCounter {
//!     frames: u64,
//! }
//!
//! impl Processing for FrameCounter {
//!     fn process_data(&mut self, _rank: Rank, _size: usize, data: DataMap) -> (DataMap, Rank) {
//!         (data, 0)
//!     }
//!
//!     fn collect_data(&mut self, _rank: Rank, _size: usize, _msg: (DataMap, Rank)) -> Feedback {
//!         self.frames += 1;
//!         Feedback::new()
//!     }
//! }
//!
//! fn main() -> reduction_monitor::Result<()> {
//!     let config = EngineConfig::new(4, TransportKind::Queue);
//!     let source = MockEventSource::finite(100);
//!     let mut engine = ParallelizationEngine::new(config, source, FrameCounter::default())?;
//!
//!     let summary = engine.start()?;
//!     println!("{} frames, {}", engine.plugin().frames, summary.termination);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod processing;
pub mod source;
pub mod types;

// Re-export commonly used types
pub use config::{EngineConfig, TransportKind};
pub use engine::{ParallelizationEngine, ShutdownHandle};
pub use error::{MonitorError, Result};
pub use processing::Processing;
pub use source::{EventSource, ExtractionError};
pub use types::{DataMap, Feedback, NodePool, ProcessedMessage, Rank, RunSummary, ShutdownToken};
