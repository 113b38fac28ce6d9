//! Shared-queue transport
//!
//! All workers push into one bounded multi-producer/single-consumer queue
//! drained by the collector. A full queue blocks the sending worker until the
//! collector catches up. Each worker additionally owns a dedicated control
//! pipe carrying feedback and stop requests from the collector.

use crate::engine::transport::{CollectorLink, WorkerLink};
use crate::error::{MonitorError, Result};
use crate::types::{ControlMessage, DataMap, NodePool, ProcessedMessage, Rank};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::collections::BTreeMap;
use std::time::Duration;

/// Build the queue transport for a pool
///
/// Returns the collector end and one worker end per worker rank, in rank
/// order.
pub fn connect(pool: &NodePool, capacity: usize) -> (QueueCollectorLink, Vec<QueueWorkerLink>) {
    let (data_tx, data_rx) = bounded(capacity);
    let mut control_txs = BTreeMap::new();
    let mut workers = Vec::with_capacity(pool.worker_count());

    for rank in pool.worker_ranks() {
        // Unbounded so the collector never blocks on a single worker
        let (control_tx, control_rx) = unbounded();
        control_txs.insert(rank, control_tx);
        workers.push(QueueWorkerLink {
            rank,
            data_tx: data_tx.clone(),
            control_rx,
        });
    }

    let collector = QueueCollectorLink {
        data_rx,
        control_txs,
    };
    (collector, workers)
}

/// Worker end of the queue transport
pub struct QueueWorkerLink {
    rank: Rank,
    data_tx: Sender<ProcessedMessage>,
    control_rx: Receiver<ControlMessage>,
}

impl WorkerLink for QueueWorkerLink {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn send(&mut self, message: ProcessedMessage) -> Result<()> {
        self.data_tx
            .send(message)
            .map_err(|_| MonitorError::transport("data queue closed by the collector"))
    }

    fn poll_control(&mut self) -> Result<Option<ControlMessage>> {
        match self.control_rx.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(MonitorError::transport(format!(
                "control pipe of worker {} closed by the collector",
                self.rank
            ))),
        }
    }
}

/// Collector end of the queue transport
pub struct QueueCollectorLink {
    data_rx: Receiver<ProcessedMessage>,
    control_txs: BTreeMap<Rank, Sender<ControlMessage>>,
}

impl QueueCollectorLink {
    fn control(&self, rank: Rank, message: ControlMessage) -> Result<()> {
        let pipe = self
            .control_txs
            .get(&rank)
            .ok_or_else(|| MonitorError::transport(format!("no worker with rank {}", rank)))?;
        pipe.send(message).map_err(|_| {
            MonitorError::transport(format!("control pipe of worker {} is closed", rank))
        })
    }
}

impl CollectorLink for QueueCollectorLink {
    fn try_receive(&mut self, wait: Duration) -> Result<Option<ProcessedMessage>> {
        let received = if wait.is_zero() {
            self.data_rx.try_recv().map_err(|e| match e {
                TryRecvError::Empty => RecvTimeoutError::Timeout,
                TryRecvError::Disconnected => RecvTimeoutError::Disconnected,
            })
        } else {
            self.data_rx.recv_timeout(wait)
        };

        match received {
            Ok(message) => Ok(Some(message)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(MonitorError::transport(
                "data queue closed: every worker has exited",
            )),
        }
    }

    fn send_feedback(&mut self, rank: Rank, feedback: DataMap) -> Result<()> {
        self.control(rank, ControlMessage::Feedback(feedback))
    }

    fn request_stop(&mut self, rank: Rank) -> Result<()> {
        self.control(rank, ControlMessage::Stop)
    }
}
