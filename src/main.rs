//! Reduction monitor - demo entry point
//!
//! Runs the parallelization engine over a synthetic event source with a
//! frame-counting plugin and prints the run summary as JSON.
//!
//! ```text
//! reduction-monitor [config.toml] [events]
//! ```
//!
//! Press Ctrl-C to force a shutdown before the source is exhausted.

use anyhow::Context;
use reduction_monitor::{
    config::EngineConfig,
    engine::ParallelizationEngine,
    logging,
    processing::Processing,
    source::MockEventSource,
    types::{DataMap, Feedback, Rank, BROADCAST_RANK},
};
use serde_json::json;
use std::time::Duration;

const DEFAULT_EVENTS: u64 = 10_000;

/// Feedback is broadcast after this many collected frames
const FEEDBACK_INTERVAL: u64 = 500;

/// Counts frames per worker and periodically tells every worker the total
#[derive(Debug, Clone, Default)]
struct FrameCounter {
    total: u64,
    per_worker: std::collections::BTreeMap<Rank, u64>,
}

impl Processing for FrameCounter {
    fn process_data(&mut self, rank: Rank, _pool_size: usize, mut data: DataMap) -> (DataMap, Rank) {
        data.insert("processed_by".to_string(), json!(rank));
        (data, rank)
    }

    fn collect_data(&mut self, _rank: Rank, _pool_size: usize, (_, source): (DataMap, Rank)) -> Feedback {
        self.total += 1;
        *self.per_worker.entry(source).or_default() += 1;

        let mut feedback = Feedback::new();
        if self.total % FEEDBACK_INTERVAL == 0 {
            let mut map = DataMap::new();
            map.insert("collected_total".to_string(), json!(self.total));
            feedback.insert(BROADCAST_RANK, map);
        }
        feedback
    }

    fn end_processing_on_collecting_node(&mut self, _rank: Rank, _pool_size: usize) {
        for (rank, frames) in &self.per_worker {
            tracing::info!(rank, frames, "Frames collected from worker");
        }
    }
}

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => EngineConfig::load(&path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => EngineConfig::default(),
    };
    let events = match args.next() {
        Some(n) => n.parse::<u64>().context("Event count must be a number")?,
        None => DEFAULT_EVENTS,
    };

    let _guard = logging::init_logging(&config.logging)?;
    tracing::info!(events, "Starting reduction monitor");

    let source = MockEventSource::finite(events)
        .with_frames_per_event(3)
        .with_open_delay(Duration::from_micros(200))
        .with_failing_frame(7, 1);
    let mut engine = ParallelizationEngine::new(config, source, FrameCounter::default())?;

    let summary = engine.start()?;
    tracing::info!(
        frames = engine.plugin().total,
        termination = %summary.termination,
        "Reduction monitor finished"
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
