//! EventSource trait for unified event retrieval
//!
//! Facility-specific retrieval (files, instrument control, streaming brokers)
//! lives outside this crate. The engine only needs the operations below. Each
//! worker owns its own source instance and pulls from its own static
//! partition of the event stream.
//!
//! [`mock::MockEventSource`] is a scripted in-memory implementation used by
//! the demo binary, the integration tests and the benchmarks.

pub mod mock;

pub use mock::{MockEvent, MockEventSource};

use crate::error::Result;
use crate::types::{DataMap, Rank};
use thiserror::Error;

/// Failure to retrieve data for one frame (or to open one event)
///
/// Always recovered locally by the worker: the frame or event is skipped and
/// logged, never propagated to the collector.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    /// The requested frame does not exist in the event
    #[error("frame {frame} is missing from event {event}")]
    MissingFrame { event: String, frame: usize },

    /// The frame was retrieved but its content is unusable
    #[error("corrupt data in event {event}, frame {frame}: {reason}")]
    Corrupt {
        event: String,
        frame: usize,
        reason: String,
    },

    /// The data source could not deliver the event
    #[error("event {event} unavailable: {reason}")]
    Unavailable { event: String, reason: String },
}

/// Producer of a lazy, possibly infinite, non-restartable event stream
pub trait EventSource {
    /// Opaque handle to one unit of retrievable data
    type Event;

    /// Prepare the source on the collecting node
    fn initialize_on_collecting_node(&mut self, _rank: Rank, _pool_size: usize) -> Result<()> {
        Ok(())
    }

    /// Prepare the source on a processing node
    fn initialize_on_processing_node(&mut self, _rank: Rank, _pool_size: usize) -> Result<()> {
        Ok(())
    }

    /// Events for the partition owned by `rank`
    ///
    /// Called once per worker. The iterator may never end.
    fn event_generator(
        &mut self,
        rank: Rank,
        pool_size: usize,
    ) -> Box<dyn Iterator<Item = Self::Event>>;

    /// Acquire the resources of an event before its frames are extracted
    fn open(&mut self, event: &mut Self::Event) -> std::result::Result<(), ExtractionError>;

    /// Release the resources of an event
    fn close(&mut self, event: &mut Self::Event);

    /// Number of frames contained in an opened event
    fn num_frames(&self, event: &Self::Event) -> usize;

    /// Retrieve the data of one frame of an opened event
    fn extract_data(
        &mut self,
        event: &mut Self::Event,
        frame: usize,
    ) -> std::result::Result<DataMap, ExtractionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_error_display() {
        let err = ExtractionError::MissingFrame {
            event: "run-7/evt-3".to_string(),
            frame: 4,
        };
        assert_eq!(err.to_string(), "frame 4 is missing from event run-7/evt-3");

        let err = ExtractionError::Corrupt {
            event: "evt-1".to_string(),
            frame: 0,
            reason: "checksum mismatch".to_string(),
        };
        assert!(err.to_string().contains("checksum mismatch"));
    }
}
