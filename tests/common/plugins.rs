//! Test plugins

use reduction_monitor::engine::ShutdownHandle;
use reduction_monitor::processing::Processing;
use reduction_monitor::types::{DataMap, Feedback, Rank, BROADCAST_RANK};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counts collected frames through a "count" field set by the workers
///
/// Optional behaviour is switched on with the builder methods.
#[derive(Clone, Default)]
pub struct CountingPlugin {
    /// Sum of the "count" fields seen by the collector
    pub total: i64,
    /// Every collected payload with the rank it came from
    pub received: Vec<(Rank, DataMap)>,
    /// Whether the collector's end-of-processing hook ran
    pub finished: bool,
    /// Broadcast once after the first collected message
    feedback_after_first: Option<DataMap>,
    /// Payload returned by each worker's end-of-processing hook
    end_payload: Option<DataMap>,
    /// Request a forced shutdown after this many collected messages
    stop_after: Option<(usize, ShutdownHandle)>,
    /// Shared count of collected messages, readable from other threads
    collected: Arc<AtomicU64>,
    panic_in_process: bool,
}

impl CountingPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feedback_after_first(mut self, feedback: DataMap) -> Self {
        self.feedback_after_first = Some(feedback);
        self
    }

    pub fn with_end_payload(mut self, payload: DataMap) -> Self {
        self.end_payload = Some(payload);
        self
    }

    pub fn with_stop_after(mut self, messages: usize, handle: ShutdownHandle) -> Self {
        self.stop_after = Some((messages, handle));
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panic_in_process = true;
        self
    }

    /// Counter shared by every clone of this plugin
    pub fn collected_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.collected)
    }

    /// Payloads received from one worker, in arrival order
    pub fn from_rank(&self, rank: Rank) -> Vec<&DataMap> {
        self.received
            .iter()
            .filter(|(source, _)| *source == rank)
            .map(|(_, payload)| payload)
            .collect()
    }
}

impl Processing for CountingPlugin {
    fn process_data(&mut self, rank: Rank, _pool_size: usize, mut data: DataMap) -> (DataMap, Rank) {
        if self.panic_in_process {
            panic!("plugin failure on worker {}", rank);
        }
        data.insert("count".to_string(), json!(1));
        (data, rank)
    }

    fn collect_data(
        &mut self,
        _rank: Rank,
        _pool_size: usize,
        (payload, source): (DataMap, Rank),
    ) -> Feedback {
        self.total += payload.get("count").and_then(|v| v.as_i64()).unwrap_or(0);
        self.received.push((source, payload));
        self.collected.fetch_add(1, Ordering::SeqCst);

        if let Some((after, handle)) = &self.stop_after {
            if self.received.len() == *after {
                handle.shutdown("enough data");
            }
        }

        let mut feedback = Feedback::new();
        if self.received.len() == 1 {
            if let Some(map) = &self.feedback_after_first {
                feedback.insert(BROADCAST_RANK, map.clone());
            }
        }
        feedback
    }

    fn end_processing_on_processing_node(&mut self, _rank: Rank, _pool_size: usize) -> Option<DataMap> {
        self.end_payload.clone()
    }

    fn end_processing_on_collecting_node(&mut self, _rank: Rank, _pool_size: usize) {
        self.finished = true;
    }
}

/// Build a one-key data map
pub fn map(key: &str, value: serde_json::Value) -> DataMap {
    let mut map = DataMap::new();
    map.insert(key.to_string(), value);
    map
}
