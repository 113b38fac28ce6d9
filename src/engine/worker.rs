//! Processing node driver loop
//!
//! This module contains the loop run by every worker. It pulls events from
//! the worker's partition of the event source, hands each selected frame to
//! the plugin and forwards the result to the collector.
//!
//! # Per-event sequence
//!
//! 1. Drain the control channel; a stop request ends the loop.
//! 2. Open the event (an open failure skips the event).
//! 3. For every selected frame: drain the control channel again, extract the
//!    frame (an extraction failure skips the frame), merge the latest
//!    feedback, run `process_data`, send the payload.
//! 4. Close the event.
//!
//! After the source is exhausted the plugin's end-of-processing payload (if
//! any) is sent, followed by `End`.
//!
//! # Feedback
//!
//! The most recent feedback map received from the collector replaces any
//! earlier one and is merged into every frame extracted afterwards. Feedback
//! keys take precedence over extracted keys.

use crate::config::FrameSelection;
use crate::engine::transport::WorkerLink;
use crate::error::{Result, ResultExt};
use crate::processing::Processing;
use crate::source::EventSource;
use crate::types::{ControlMessage, DataMap, ProcessedMessage, Rank, WorkerStats};

/// Why a worker loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The event source was exhausted and `End` was sent
    Drained,
    /// A stop request was acknowledged with `Stopped`
    Stopped,
}

/// Final state of a worker loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerReport {
    pub rank: Rank,
    pub exit: WorkerExit,
    pub stats: WorkerStats,
}

/// A worker node: owns its source, plugin instance and transport link
pub struct ProcessingNode<S, P, L> {
    rank: Rank,
    pool_size: usize,
    source: S,
    plugin: P,
    link: L,
    frames: FrameSelection,
    /// Latest feedback from the collector
    feedback: DataMap,
    stats: WorkerStats,
}

impl<S, P, L> ProcessingNode<S, P, L>
where
    S: EventSource,
    P: Processing,
    L: WorkerLink,
{
    /// Create a worker bound to `link`; its rank is the link's rank
    pub fn new(link: L, pool_size: usize, source: S, plugin: P, frames: FrameSelection) -> Self {
        Self {
            rank: link.rank(),
            pool_size,
            source,
            plugin,
            link,
            frames,
            feedback: DataMap::new(),
            stats: WorkerStats::default(),
        }
    }

    /// Run the worker loop to completion
    pub fn run(mut self) -> Result<WorkerReport> {
        let (rank, pool_size) = (self.rank, self.pool_size);
        tracing::debug!(rank, "Processing node started");

        self.source
            .initialize_on_processing_node(rank, pool_size)
            .with_context(|| format!("Failed to initialize event source on worker {}", rank))?;
        self.plugin.initialize_processing_node(rank, pool_size);

        let events = self.source.event_generator(rank, pool_size);
        for mut event in events {
            if self.drain_control()? {
                return self.acknowledge_stop();
            }

            if let Err(e) = self.source.open(&mut event) {
                tracing::warn!(rank, error = %e, "Skipping event that could not be opened");
                self.stats.events_skipped += 1;
                continue;
            }

            let num_frames = self.source.num_frames(&event);
            for frame in self.frames.indices(num_frames) {
                let outcome = match self.drain_control() {
                    Ok(true) => None,
                    Ok(false) => Some(self.process_frame(&mut event, frame)),
                    Err(e) => Some(Err(e)),
                };
                match outcome {
                    Some(Ok(())) => {}
                    Some(Err(e)) => {
                        self.source.close(&mut event);
                        return Err(e);
                    }
                    None => {
                        // Stop requested mid-event: release it unfinished
                        self.source.close(&mut event);
                        return self.acknowledge_stop();
                    }
                }
            }

            self.source.close(&mut event);
            self.stats.events += 1;
        }

        if let Some(payload) = self.plugin.end_processing_on_processing_node(rank, pool_size) {
            if !payload.is_empty() {
                self.link.send(ProcessedMessage::Data { payload, rank })?;
            }
        }
        self.link.send(ProcessedMessage::End { rank })?;

        tracing::info!(
            rank,
            events = self.stats.events,
            frames = self.stats.frames_sent,
            failed_frames = self.stats.frames_failed,
            "Processing node finished"
        );
        Ok(self.report(WorkerExit::Drained))
    }

    /// Extract, process and send one frame
    fn process_frame(&mut self, event: &mut S::Event, frame: usize) -> Result<()> {
        let rank = self.rank;
        let mut data = match self.source.extract_data(event, frame) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(rank, frame, error = %e, "Skipping frame");
                self.stats.frames_failed += 1;
                return Ok(());
            }
        };

        for (key, value) in &self.feedback {
            data.insert(key.clone(), value.clone());
        }

        let (processed, _) = self.plugin.process_data(rank, self.pool_size, data);
        self.link.send(ProcessedMessage::Data {
            payload: processed,
            rank,
        })?;
        self.stats.frames_sent += 1;
        Ok(())
    }

    /// Consume every pending control message. Returns true on a stop request.
    fn drain_control(&mut self) -> Result<bool> {
        while let Some(message) = self.link.poll_control()? {
            match message {
                ControlMessage::Stop => return Ok(true),
                ControlMessage::Feedback(feedback) => {
                    tracing::trace!(rank = self.rank, keys = feedback.len(), "Feedback received");
                    self.feedback = feedback;
                }
            }
        }
        Ok(false)
    }

    fn acknowledge_stop(mut self) -> Result<WorkerReport> {
        let rank = self.rank;
        self.link.send(ProcessedMessage::Stopped { rank })?;
        tracing::info!(rank, events = self.stats.events, "Processing node stopped on request");
        Ok(self.report(WorkerExit::Stopped))
    }

    fn report(&self, exit: WorkerExit) -> WorkerReport {
        WorkerReport {
            rank: self.rank,
            exit,
            stats: self.stats,
        }
    }
}
