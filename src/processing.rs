//! Processing trait: the per-experiment analysis contract
//!
//! A plugin is instantiated once per node: the engine clones the prototype
//! into every worker and keeps the original for the collector. Worker
//! instances only see the `*_processing_node` hooks and `process_data`; the
//! collector instance only sees the `*_collecting_node` hooks,
//! `collect_data` and `wait_for_data`.
//!
//! Plugin code is not guarded by the engine. A panic inside a hook takes
//! down the node that ran it.

use crate::types::{DataMap, Feedback, Rank};

/// Analysis logic driven by the parallelization engine
#[cfg_attr(test, mockall::automock)]
pub trait Processing {
    /// Called once on each worker before the first event
    fn initialize_processing_node(&mut self, _rank: Rank, _pool_size: usize) {}

    /// Called once on the collector before any message is received
    fn initialize_collecting_node(&mut self, _rank: Rank, _pool_size: usize) {}

    /// Reduce one frame of extracted data to a payload for the collector
    ///
    /// `data` already contains any feedback addressed to this worker.
    fn process_data(&mut self, rank: Rank, pool_size: usize, data: DataMap) -> (DataMap, Rank);

    /// Aggregate one payload received from worker `message.1`
    ///
    /// The returned map is routed back to workers: key `0` broadcasts to all
    /// of them, any other key addresses a single worker rank.
    fn collect_data(&mut self, rank: Rank, pool_size: usize, message: (DataMap, Rank))
        -> Feedback;

    /// Idle hook, called when the collector finds nothing to receive
    fn wait_for_data(&mut self, _rank: Rank, _pool_size: usize) {}

    /// Called on a worker once its events are exhausted
    ///
    /// A non-empty map is sent to the collector as a final data message.
    fn end_processing_on_processing_node(
        &mut self,
        _rank: Rank,
        _pool_size: usize,
    ) -> Option<DataMap> {
        None
    }

    /// Called on the collector once every worker has signalled the end of
    /// its stream
    fn end_processing_on_collecting_node(&mut self, _rank: Rank, _pool_size: usize) {}
}
