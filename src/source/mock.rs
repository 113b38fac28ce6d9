//! Scripted in-memory event source
//!
//! Generates numbered events and splits them across workers round-robin:
//! with `W` workers, event `i` belongs to worker rank `i % W + 1`. Individual
//! frames or whole events can be scripted to fail, which makes the source
//! useful for exercising the engine's recovery paths.

use crate::source::{EventSource, ExtractionError};
use crate::types::{DataMap, Rank};
use serde_json::json;
use std::time::Duration;

/// One scripted event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockEvent {
    /// Global event number
    pub id: u64,
    /// Number of frames in the event
    pub frames: usize,
    /// Whether the event is currently open
    pub opened: bool,
}

impl MockEvent {
    fn label(&self) -> String {
        format!("mock-{}", self.id)
    }
}

/// Scripted event source
#[derive(Debug, Clone)]
pub struct MockEventSource {
    /// Number of events across all partitions (`None` = infinite)
    total_events: Option<u64>,
    /// Frames per generated event
    frames_per_event: usize,
    /// Simulated retrieval latency when an event is opened
    open_delay: Duration,
    /// (event id, frame) pairs whose extraction fails
    failing_frames: Vec<(u64, usize)>,
    /// Event ids that cannot be opened
    unopenable_events: Vec<u64>,
    /// Rank this instance generates for
    rank: Rank,
    /// Number of events opened and not yet closed
    open_events: usize,
}

impl MockEventSource {
    /// A source yielding `total_events` events in total, one frame each
    pub fn finite(total_events: u64) -> Self {
        Self {
            total_events: Some(total_events),
            frames_per_event: 1,
            open_delay: Duration::ZERO,
            failing_frames: Vec::new(),
            unopenable_events: Vec::new(),
            rank: 0,
            open_events: 0,
        }
    }

    /// A source that never runs out of events
    pub fn infinite() -> Self {
        Self {
            total_events: None,
            ..Self::finite(0)
        }
    }

    /// Set the number of frames in every event
    pub fn with_frames_per_event(mut self, frames: usize) -> Self {
        self.frames_per_event = frames;
        self
    }

    /// Sleep for `delay` whenever an event is opened
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// Make extraction of `frame` in event `event_id` fail
    pub fn with_failing_frame(mut self, event_id: u64, frame: usize) -> Self {
        self.failing_frames.push((event_id, frame));
        self
    }

    /// Make opening event `event_id` fail
    pub fn with_unopenable_event(mut self, event_id: u64) -> Self {
        self.unopenable_events.push(event_id);
        self
    }

    /// Number of events currently open on this instance
    pub fn open_events(&self) -> usize {
        self.open_events
    }
}

impl EventSource for MockEventSource {
    type Event = MockEvent;

    fn initialize_on_processing_node(
        &mut self,
        rank: Rank,
        _pool_size: usize,
    ) -> crate::error::Result<()> {
        self.rank = rank;
        Ok(())
    }

    fn event_generator(
        &mut self,
        rank: Rank,
        pool_size: usize,
    ) -> Box<dyn Iterator<Item = MockEvent>> {
        let workers = pool_size.saturating_sub(1).max(1) as u64;
        let offset = rank.saturating_sub(1) as u64;
        let frames = self.frames_per_event;
        let ids = (offset..).step_by(workers as usize);
        let events = ids.map(move |id| MockEvent {
            id,
            frames,
            opened: false,
        });

        match self.total_events {
            Some(total) => Box::new(events.take_while(move |event| event.id < total)),
            None => Box::new(events),
        }
    }

    fn open(&mut self, event: &mut MockEvent) -> Result<(), ExtractionError> {
        if !self.open_delay.is_zero() {
            std::thread::sleep(self.open_delay);
        }
        if self.unopenable_events.contains(&event.id) {
            return Err(ExtractionError::Unavailable {
                event: event.label(),
                reason: "scripted open failure".to_string(),
            });
        }
        event.opened = true;
        self.open_events += 1;
        Ok(())
    }

    fn close(&mut self, event: &mut MockEvent) {
        if event.opened {
            event.opened = false;
            self.open_events -= 1;
        }
    }

    fn num_frames(&self, event: &MockEvent) -> usize {
        event.frames
    }

    fn extract_data(
        &mut self,
        event: &mut MockEvent,
        frame: usize,
    ) -> Result<DataMap, ExtractionError> {
        if !event.opened {
            return Err(ExtractionError::Unavailable {
                event: event.label(),
                reason: "event is not open".to_string(),
            });
        }
        if frame >= event.frames {
            return Err(ExtractionError::MissingFrame {
                event: event.label(),
                frame,
            });
        }
        if self.failing_frames.contains(&(event.id, frame)) {
            return Err(ExtractionError::Corrupt {
                event: event.label(),
                frame,
                reason: "scripted extraction failure".to_string(),
            });
        }

        let mut data = DataMap::new();
        data.insert("event_id".to_string(), json!(event.id));
        data.insert("frame".to_string(), json!(frame));
        data.insert("source_rank".to_string(), json!(self.rank));
        Ok(data)
    }
}
