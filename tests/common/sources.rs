//! Test event sources

use reduction_monitor::source::{EventSource, ExtractionError};
use reduction_monitor::types::{DataMap, Rank};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;

/// Event source with an explicit event count per worker rank
///
/// Ranks without an entry get no events; `None` means endless.
#[derive(Debug, Clone, Default)]
pub struct PartitionedSource {
    events: BTreeMap<Rank, Option<u64>>,
    delay: Duration,
}

impl PartitionedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finite(mut self, rank: Rank, events: u64) -> Self {
        self.events.insert(rank, Some(events));
        self
    }

    pub fn endless(mut self, rank: Rank) -> Self {
        self.events.insert(rank, None);
        self
    }

    /// Sleep for `delay` when each event is opened
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl EventSource for PartitionedSource {
    type Event = u64;

    fn event_generator(&mut self, rank: Rank, _pool_size: usize) -> Box<dyn Iterator<Item = u64>> {
        match self.events.get(&rank) {
            Some(Some(n)) => Box::new(0..*n),
            Some(None) => Box::new(0..),
            None => Box::new(std::iter::empty()),
        }
    }

    fn open(&mut self, _event: &mut u64) -> Result<(), ExtractionError> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        Ok(())
    }

    fn close(&mut self, _event: &mut u64) {}

    fn num_frames(&self, _event: &u64) -> usize {
        1
    }

    fn extract_data(&mut self, event: &mut u64, frame: usize) -> Result<DataMap, ExtractionError> {
        let mut data = DataMap::new();
        data.insert("event_id".to_string(), json!(*event));
        data.insert("frame".to_string(), json!(frame));
        Ok(data)
    }
}
