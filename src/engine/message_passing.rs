//! Message-passing transport
//!
//! Runs the worker/collector protocol over a [`Communicator`]: rank 0 is the
//! collector and ranks `1..size` are workers.
//!
//! | Tag           | Direction          | Payload                          |
//! |---------------|--------------------|----------------------------------|
//! | `DATA_TAG`    | worker → collector | [`Upstream`] (`Data` or `End`)   |
//! | `DATA_TAG`    | collector → worker | [`Downstream`] (`Feedback`/`Stop`) |
//! | `STOP_TAG`    | collector → worker | empty                            |
//! | `STOPPED_TAG` | worker → collector | empty                            |
//!
//! Payloads are JSON encoded, so feedback and stop sharing the data tag are
//! told apart by the shape of the decoded value. The sender's rank comes from
//! the envelope. A stop request is sent on both `STOP_TAG` and `DATA_TAG`;
//! the worker leaves on whichever it reads first.

use crate::engine::comm::{Communicator, Envelope, DATA_TAG, STOPPED_TAG, STOP_TAG};
use crate::engine::transport::{CollectorLink, WorkerLink};
use crate::error::{MonitorError, Result, ResultExt};
use crate::types::{ControlMessage, DataMap, NodePool, ProcessedMessage, Rank, COLLECTOR_RANK};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Worker to collector payload on the data tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Upstream {
    Data(DataMap),
    End,
}

/// Collector to worker payload on the data tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Downstream {
    Feedback(DataMap),
    Stop,
}

/// Build the message-passing transport for a pool
///
/// Returns the collector end and one worker end per worker rank, in rank
/// order.
pub fn connect(pool: &NodePool) -> (MpCollectorLink, Vec<MpWorkerLink>) {
    let mut world = Communicator::world(pool.size());
    // A pool always has at least two ranks, rank 0 first
    let collector = MpCollectorLink {
        comm: world.remove(COLLECTOR_RANK),
    };
    let workers = world.into_iter().map(|comm| MpWorkerLink { comm }).collect();
    (collector, workers)
}

/// Worker end of the message-passing transport
pub struct MpWorkerLink {
    comm: Communicator,
}

impl WorkerLink for MpWorkerLink {
    fn rank(&self) -> Rank {
        self.comm.rank()
    }

    fn send(&mut self, message: ProcessedMessage) -> Result<()> {
        match message {
            ProcessedMessage::Data { payload, .. } => {
                let bytes = serde_json::to_vec(&Upstream::Data(payload))?;
                self.comm.send(COLLECTOR_RANK, DATA_TAG, bytes)
            }
            ProcessedMessage::End { .. } => {
                let bytes = serde_json::to_vec(&Upstream::End)?;
                self.comm.send(COLLECTOR_RANK, DATA_TAG, bytes)
            }
            ProcessedMessage::Stopped { .. } => {
                self.comm.send(COLLECTOR_RANK, STOPPED_TAG, Vec::new())
            }
        }
    }

    fn poll_control(&mut self) -> Result<Option<ControlMessage>> {
        if self.comm.has_message(STOP_TAG)? {
            if let Some(envelope) = self.comm.try_recv(STOP_TAG)? {
                if envelope.source == COLLECTOR_RANK {
                    return Ok(Some(ControlMessage::Stop));
                }
                tracing::warn!(
                    rank = self.comm.rank(),
                    source = envelope.source,
                    "Ignoring stop request from a non-collector rank"
                );
            }
        }

        match self.comm.try_recv(DATA_TAG)? {
            Some(envelope) => {
                let downstream: Downstream = decode(&envelope)?;
                Ok(Some(match downstream {
                    Downstream::Feedback(feedback) => ControlMessage::Feedback(feedback),
                    Downstream::Stop => ControlMessage::Stop,
                }))
            }
            None => Ok(None),
        }
    }
}

/// Collector end of the message-passing transport
pub struct MpCollectorLink {
    comm: Communicator,
}

impl CollectorLink for MpCollectorLink {
    fn try_receive(&mut self, wait: Duration) -> Result<Option<ProcessedMessage>> {
        if let Some(envelope) = self.comm.try_recv(STOPPED_TAG)? {
            return Ok(Some(ProcessedMessage::Stopped {
                rank: envelope.source,
            }));
        }

        let envelope = if wait.is_zero() {
            self.comm.try_recv(DATA_TAG)?
        } else {
            self.comm.recv_timeout(DATA_TAG, wait)?
        };

        match envelope {
            Some(envelope) => {
                let rank = envelope.source;
                let upstream: Upstream = decode(&envelope)?;
                Ok(Some(match upstream {
                    Upstream::Data(payload) => ProcessedMessage::Data { payload, rank },
                    Upstream::End => ProcessedMessage::End { rank },
                }))
            }
            None => Ok(None),
        }
    }

    fn send_feedback(&mut self, rank: Rank, feedback: DataMap) -> Result<()> {
        let bytes = serde_json::to_vec(&Downstream::Feedback(feedback))?;
        self.comm.send(rank, DATA_TAG, bytes)
    }

    fn request_stop(&mut self, rank: Rank) -> Result<()> {
        if rank == COLLECTOR_RANK {
            return Err(MonitorError::transport("cannot stop the collecting node"));
        }
        // The STOP signal overtakes queued feedback; the copy on the data
        // tag keeps the stop ordered after it
        self.comm.send(rank, STOP_TAG, Vec::new())?;
        let bytes = serde_json::to_vec(&Downstream::Stop)?;
        self.comm.send(rank, DATA_TAG, bytes)
    }
}

fn decode<'a, T: Deserialize<'a>>(envelope: &'a Envelope) -> Result<T> {
    serde_json::from_slice(&envelope.bytes)
        .map_err(MonitorError::from)
        .with_context(|| {
            format!(
                "Malformed message from rank {} (tag {})",
                envelope.source, envelope.tag
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pool(size: usize) -> NodePool {
        NodePool::new(size).unwrap()
    }

    fn payload(key: &str, value: i64) -> DataMap {
        let mut map = DataMap::new();
        map.insert(key.to_string(), json!(value));
        map
    }

    #[test]
    fn test_data_and_end_carry_sender_rank() {
        let (mut collector, mut workers) = connect(&pool(3));

        workers[1]
            .send(ProcessedMessage::Data {
                payload: payload("count", 1),
                rank: 2,
            })
            .unwrap();
        workers[1].send(ProcessedMessage::End { rank: 2 }).unwrap();

        assert_eq!(
            collector.try_receive(Duration::ZERO).unwrap(),
            Some(ProcessedMessage::Data {
                payload: payload("count", 1),
                rank: 2
            })
        );
        assert_eq!(
            collector.try_receive(Duration::ZERO).unwrap(),
            Some(ProcessedMessage::End { rank: 2 })
        );
        assert_eq!(collector.try_receive(Duration::ZERO).unwrap(), None);
    }

    #[test]
    fn test_stopped_uses_its_own_tag() {
        let (mut collector, mut workers) = connect(&pool(2));
        workers[0]
            .send(ProcessedMessage::Data {
                payload: payload("count", 1),
                rank: 1,
            })
            .unwrap();
        workers[0].send(ProcessedMessage::Stopped { rank: 1 }).unwrap();

        // The acknowledgement is seen ahead of pending data
        assert_eq!(
            collector.try_receive(Duration::ZERO).unwrap(),
            Some(ProcessedMessage::Stopped { rank: 1 })
        );
    }

    #[test]
    fn test_feedback_and_stop_reach_the_worker() {
        let (mut collector, mut workers) = connect(&pool(2));

        collector.send_feedback(1, payload("gain", 2)).unwrap();
        assert_eq!(
            workers[0].poll_control().unwrap(),
            Some(ControlMessage::Feedback(payload("gain", 2)))
        );

        collector.request_stop(1).unwrap();
        // Once from the STOP tag, once from the data tag
        assert_eq!(workers[0].poll_control().unwrap(), Some(ControlMessage::Stop));
        assert_eq!(workers[0].poll_control().unwrap(), Some(ControlMessage::Stop));
        assert_eq!(workers[0].poll_control().unwrap(), None);
    }

    #[test]
    fn test_stop_request_uses_both_tags() {
        let (mut collector, workers) = connect(&pool(2));
        let worker = &workers[0].comm;

        collector.send_feedback(1, payload("gain", 3)).unwrap();
        collector.request_stop(1).unwrap();

        assert!(worker.has_message(STOP_TAG).unwrap());
        let on_data_tag: Vec<Downstream> = std::iter::from_fn(|| worker.try_recv(DATA_TAG).unwrap())
            .map(|envelope| decode(&envelope).unwrap())
            .collect();
        assert_eq!(
            on_data_tag,
            vec![Downstream::Feedback(payload("gain", 3)), Downstream::Stop]
        );
    }

    #[test]
    fn test_stop_tag_is_seen_ahead_of_queued_feedback() {
        let (mut collector, mut workers) = connect(&pool(2));

        collector.send_feedback(1, payload("gain", 3)).unwrap();
        collector.request_stop(1).unwrap();

        assert_eq!(workers[0].poll_control().unwrap(), Some(ControlMessage::Stop));
        assert_eq!(
            workers[0].poll_control().unwrap(),
            Some(ControlMessage::Feedback(payload("gain", 3)))
        );
        assert_eq!(workers[0].poll_control().unwrap(), Some(ControlMessage::Stop));
        assert_eq!(workers[0].poll_control().unwrap(), None);
    }

    #[test]
    fn test_stop_on_data_tag_is_recognised_by_shape() {
        let world = Communicator::world(2);
        let mut worker = MpWorkerLink {
            comm: world[1].clone(),
        };
        let bytes = serde_json::to_vec(&Downstream::Stop).unwrap();
        world[0].send(1, DATA_TAG, bytes).unwrap();

        assert_eq!(worker.poll_control().unwrap(), Some(ControlMessage::Stop));
    }

    #[test]
    fn test_malformed_payload_is_an_error() {
        let world = Communicator::world(2);
        let mut collector = MpCollectorLink {
            comm: world[0].clone(),
        };
        world[1].send(0, DATA_TAG, b"not json".to_vec()).unwrap();

        let err = collector.try_receive(Duration::ZERO).unwrap_err();
        assert!(err.to_string().contains("Malformed message from rank 1"));
    }

    #[test]
    fn test_cannot_stop_collector() {
        let (mut collector, _workers) = connect(&pool(2));
        assert!(collector.request_stop(0).is_err());
    }
}
