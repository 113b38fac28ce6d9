//! Collecting node loop
//!
//! The collector receives every [`ProcessedMessage`] of the pool, hands data
//! to the plugin's collect step and routes the returned feedback back to the
//! workers. A run ends in one of two ways:
//!
//! - **Drain**: every worker sent `End`.
//! - **Forced stop**: a shutdown was requested. Every worker that has not
//!   already ended is sent a stop request and the collector waits until each
//!   worker has confirmed, either with `Stopped` or with an earlier `End`.
//!   Data still in flight is discarded.
//!
//! While idle the collector checks that no worker thread has exited without
//! ending its stream; such a worker would otherwise leave the collector
//! waiting forever.

use crate::config::CollectorConfig;
use crate::engine::shutdown::ShutdownSignal;
use crate::engine::transport::CollectorLink;
use crate::error::{MonitorError, Result};
use crate::processing::Processing;
use crate::types::{
    CollectionStats, DataMap, NodePool, ProcessedMessage, Rank, RunSummary, ShutdownToken,
    BROADCAST_RANK,
};
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

/// Tells the collector whether a worker's execution unit has terminated
pub trait WorkerLiveness {
    fn has_exited(&self, rank: Rank) -> bool;
}

/// The collecting node for one run
pub struct CollectingNode<'a, P, L> {
    pool: NodePool,
    plugin: &'a mut P,
    link: &'a mut L,
    config: CollectorConfig,
    signal: ShutdownSignal,
    liveness: &'a dyn WorkerLiveness,
    /// Workers that sent `End`
    ended: BTreeSet<Rank>,
    /// Workers counted as stopped during a forced shutdown
    confirmed: BTreeSet<Rank>,
    /// Workers whose stop request could not be delivered
    unreachable: BTreeMap<Rank, MonitorError>,
    stats: CollectionStats,
    started: Instant,
    started_at: chrono::DateTime<chrono::Utc>,
    last_progress: (Instant, u64),
}

impl<'a, P, L> CollectingNode<'a, P, L>
where
    P: Processing,
    L: CollectorLink,
{
    pub fn new(
        pool: NodePool,
        plugin: &'a mut P,
        link: &'a mut L,
        config: CollectorConfig,
        signal: ShutdownSignal,
        liveness: &'a dyn WorkerLiveness,
    ) -> Self {
        let started = Instant::now();
        Self {
            pool,
            plugin,
            link,
            config,
            signal,
            liveness,
            ended: BTreeSet::new(),
            confirmed: BTreeSet::new(),
            unreachable: BTreeMap::new(),
            stats: CollectionStats::default(),
            started,
            started_at: chrono::Utc::now(),
            last_progress: (started, 0),
        }
    }

    /// Run until every worker has ended or a forced shutdown completes
    pub fn run(mut self) -> Result<RunSummary> {
        let size = self.pool.size();
        tracing::debug!(workers = self.pool.worker_count(), "Collecting node started");

        loop {
            if let Some(reason) = self.signal.poll() {
                return self.shutdown(reason);
            }

            let message = match self.receive()? {
                Some(message) => message,
                None => {
                    self.stats.idle_polls += 1;
                    self.plugin.wait_for_data(self.pool.collector_rank(), size);
                    continue;
                }
            };

            match message {
                ProcessedMessage::Data { payload, rank } => self.collect(payload, rank),
                ProcessedMessage::End { rank } => {
                    if !self.pool.is_worker(rank) {
                        tracing::warn!(rank, "Ignoring end of stream from unknown rank");
                    } else if self.ended.insert(rank) {
                        tracing::info!(
                            rank,
                            finished = self.ended.len(),
                            workers = self.pool.worker_count(),
                            "Worker finished"
                        );
                    } else {
                        tracing::warn!(rank, "Duplicate end of stream");
                    }
                    if self.ended.len() == self.pool.worker_count() {
                        return Ok(self.finish());
                    }
                }
                ProcessedMessage::Stopped { rank } => {
                    tracing::warn!(rank, "Ignoring stop confirmation outside a shutdown");
                }
            }
        }
    }

    /// Hand one data message to the plugin and route its feedback
    fn collect(&mut self, payload: DataMap, rank: Rank) {
        let feedback =
            self.plugin
                .collect_data(self.pool.collector_rank(), self.pool.size(), (payload, rank));
        self.stats.collected += 1;
        self.report_progress();

        for (dest, map) in feedback {
            if dest == BROADCAST_RANK {
                for worker in self.pool.worker_ranks() {
                    self.deliver(worker, map.clone());
                }
            } else if self.pool.is_worker(dest) {
                self.deliver(dest, map);
            } else {
                tracing::warn!(rank = dest, "Dropping feedback for unknown rank");
            }
        }
    }

    fn deliver(&mut self, rank: Rank, feedback: DataMap) {
        // A worker that ended reads no more control messages
        if self.ended.contains(&rank) {
            tracing::trace!(rank, "Dropping feedback for finished worker");
            return;
        }
        match self.link.send_feedback(rank, feedback) {
            Ok(()) => self.stats.feedback_sent += 1,
            Err(e) => tracing::warn!(rank, error = %e, "Failed to deliver feedback"),
        }
    }

    fn report_progress(&mut self) {
        let interval = self.config.progress_interval;
        if interval == 0 || self.stats.collected % interval != 0 {
            return;
        }
        let now = Instant::now();
        let (since, count) = self.last_progress;
        let secs = now.duration_since(since).as_secs_f64();
        let rate = if secs > 0.0 {
            (self.stats.collected - count) as f64 / secs
        } else {
            0.0
        };
        tracing::info!(
            collected = self.stats.collected,
            rate_hz = %format!("{:.1}", rate),
            "Collecting"
        );
        self.last_progress = (now, self.stats.collected);
    }

    /// Receive the next message, checking worker liveness when idle
    fn receive(&mut self) -> Result<Option<ProcessedMessage>> {
        match self.link.try_receive(self.config.idle_backoff()) {
            Ok(Some(message)) => Ok(Some(message)),
            Ok(None) => {
                let Some(rank) = self.exited_unconfirmed() else {
                    return Ok(None);
                };
                // The exit happened before this receive, so anything the
                // worker sent is already visible
                match self.link.try_receive(Duration::ZERO)? {
                    Some(message) => Ok(Some(message)),
                    None => Err(self.lost(rank)),
                }
            }
            Err(e) => match self.exited_unconfirmed() {
                Some(rank) => Err(self.lost(rank)),
                None => Err(e),
            },
        }
    }

    /// First worker whose thread exited without ending or confirming
    fn exited_unconfirmed(&self) -> Option<Rank> {
        self.pool.worker_ranks().find(|rank| {
            !self.ended.contains(rank)
                && !self.confirmed.contains(rank)
                && self.liveness.has_exited(*rank)
        })
    }

    fn lost(&mut self, rank: Rank) -> MonitorError {
        match self.unreachable.remove(&rank) {
            Some(e) => e.with_context(format!("Failed to stop worker {}", rank)),
            None => MonitorError::WorkerLost { rank },
        }
    }

    fn finish(self) -> RunSummary {
        self.plugin
            .end_processing_on_collecting_node(self.pool.collector_rank(), self.pool.size());
        let summary = self.summary(ShutdownToken::Drain);
        tracing::info!(
            collected = summary.stats.collected,
            workers = summary.workers_finished,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            rate_hz = %format!("{:.1}", summary.collect_rate_hz()),
            "All workers finished"
        );
        summary
    }

    /// Stop every worker and wait for each confirmation
    fn shutdown(mut self, reason: String) -> Result<RunSummary> {
        tracing::warn!(%reason, "Forcing worker pool shutdown");

        // An earlier End counts as an implicit Stopped
        self.confirmed = self.ended.clone();
        let pending: Vec<Rank> = self
            .pool
            .worker_ranks()
            .filter(|rank| !self.confirmed.contains(rank))
            .collect();
        for rank in pending {
            if let Err(e) = self.link.request_stop(rank) {
                // Still confirmed if its End or Stopped is already in flight
                tracing::debug!(rank, error = %e, "Stop request not delivered");
                self.unreachable.insert(rank, e);
            }
        }

        while self.confirmed.len() < self.pool.worker_count() {
            let message = match self.receive()? {
                Some(message) => message,
                None => continue,
            };
            if !message.is_terminal() {
                self.stats.discarded += 1;
                continue;
            }
            let rank = message.rank();
            if !self.pool.is_worker(rank) {
                continue;
            }
            if matches!(message, ProcessedMessage::End { .. }) {
                self.ended.insert(rank);
            }
            if self.confirmed.insert(rank) {
                self.unreachable.remove(&rank);
                tracing::debug!(
                    rank,
                    confirmed = self.confirmed.len(),
                    workers = self.pool.worker_count(),
                    "Worker confirmed stop"
                );
            }
        }

        let summary = self.summary(ShutdownToken::Stop { reason });
        tracing::info!(
            collected = summary.stats.collected,
            discarded = summary.stats.discarded,
            confirmations = summary.confirmations,
            "Worker pool stopped"
        );
        Ok(summary)
    }

    fn summary(&self, termination: ShutdownToken) -> RunSummary {
        let confirmations = match termination {
            ShutdownToken::Drain => 0,
            ShutdownToken::Stop { .. } => self.confirmed.len(),
        };
        RunSummary {
            started_at: self.started_at,
            elapsed: self.started.elapsed(),
            termination,
            stats: self.stats.clone(),
            workers_finished: self.ended.len(),
            confirmations,
        }
    }
}
