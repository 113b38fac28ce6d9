//! Integration tests for forced shutdown
//!
//! These tests validate the stop handshake:
//! - Requests from another thread and from plugin code
//! - Exactly one confirmation per worker
//! - A worker that already ended counts as confirmed

mod common;

use common::builders::ConfigBuilder;
use common::plugins::CountingPlugin;
use common::sources::PartitionedSource;
use common::{wait_until, TRANSPORTS};
use reduction_monitor::engine::ParallelizationEngine;
use reduction_monitor::source::MockEventSource;
use reduction_monitor::types::ShutdownToken;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

fn stopped(reason: &str) -> ShutdownToken {
    ShutdownToken::Stop {
        reason: reason.to_string(),
    }
}

#[test]
fn test_shutdown_from_another_thread() {
    for transport in TRANSPORTS {
        let config = ConfigBuilder::new(4, transport).build();
        let source = MockEventSource::infinite()
            .with_frames_per_event(2)
            .with_open_delay(Duration::from_millis(1));
        let plugin = CountingPlugin::new();
        let collected = plugin.collected_counter();

        let mut engine = ParallelizationEngine::new(config, source, plugin).unwrap();
        let handle = engine.shutdown_handle();
        let requester = thread::spawn(move || {
            wait_until("collected data", || collected.load(Ordering::SeqCst) >= 20);
            assert!(handle.shutdown("operator request"));
        });

        let summary = engine.start().unwrap();
        requester.join().unwrap();

        assert_eq!(summary.termination, stopped("operator request"));
        assert_eq!(summary.confirmations, 3);
        assert_eq!(summary.workers_finished, 0);
        assert!(summary.stats.collected >= 20);
        assert!(!engine.plugin().finished);
    }
}

#[test]
fn test_shutdown_requested_by_plugin() {
    for transport in TRANSPORTS {
        let config = ConfigBuilder::new(3, transport).build();
        let source = MockEventSource::infinite().with_open_delay(Duration::from_millis(1));

        let mut engine =
            ParallelizationEngine::new(config, source, CountingPlugin::new()).unwrap();
        let handle = engine.shutdown_handle();
        *engine.plugin_mut() = CountingPlugin::new().with_stop_after(10, handle);

        let summary = engine.start().unwrap();

        assert_eq!(summary.termination, stopped("enough data"));
        assert_eq!(summary.confirmations, 2);
        assert_eq!(summary.stats.collected, 10);
    }
}

#[test]
fn test_shutdown_before_start() {
    for transport in TRANSPORTS {
        let config = ConfigBuilder::new(3, transport).build();
        let source = MockEventSource::infinite().with_open_delay(Duration::from_millis(1));
        let mut engine =
            ParallelizationEngine::new(config, source, CountingPlugin::new()).unwrap();

        assert!(engine.shutdown("not needed"));
        let summary = engine.start().unwrap();

        assert_eq!(summary.termination, stopped("not needed"));
        assert_eq!(summary.confirmations, 2);
        assert_eq!(summary.stats.collected, 0);
    }
}

#[test]
fn test_end_counts_as_confirmation() {
    for transport in TRANSPORTS {
        // Worker 2 has nothing to do and ends at once
        let config = ConfigBuilder::new(3, transport).build();
        let source = PartitionedSource::new()
            .endless(1)
            .with_delay(Duration::from_millis(1));

        let mut engine =
            ParallelizationEngine::new(config, source, CountingPlugin::new()).unwrap();
        let handle = engine.shutdown_handle();
        *engine.plugin_mut() = CountingPlugin::new().with_stop_after(5, handle);

        let summary = engine.start().unwrap();

        assert_eq!(summary.termination, stopped("enough data"));
        assert_eq!(summary.confirmations, 2);
        assert_eq!(summary.workers_finished, 1);
        assert!(engine.plugin().from_rank(2).is_empty());
    }
}

#[test]
fn test_shutdown_after_partial_drain() {
    for transport in TRANSPORTS {
        let config = ConfigBuilder::new(4, transport).build();
        let source = PartitionedSource::new()
            .finite(1, 3)
            .endless(2)
            .endless(3)
            .with_delay(Duration::from_millis(1));
        let plugin = CountingPlugin::new();
        let collected = plugin.collected_counter();

        let mut engine = ParallelizationEngine::new(config, source, plugin).unwrap();
        let handle = engine.shutdown_handle();
        let requester = thread::spawn(move || {
            wait_until("collected data", || collected.load(Ordering::SeqCst) >= 30);
            handle.shutdown("operator request");
        });

        let summary = engine.start().unwrap();
        requester.join().unwrap();

        // Worker 1 ran dry long before the request
        assert_eq!(summary.confirmations, 3);
        assert_eq!(summary.workers_finished, 1);
        assert_eq!(engine.plugin().from_rank(1).len(), 3);
    }
}
