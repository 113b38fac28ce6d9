//! Transport link traits
//!
//! A transport is split into one [`CollectorLink`] held by the collecting
//! node and one [`WorkerLink`] per processing node. The driver loops in
//! [`super::worker`] and [`super::collector`] are written against these
//! traits only, so the queue transport ([`super::queue`]) and the
//! message-passing transport ([`super::message_passing`]) are interchangeable.

use crate::error::Result;
use crate::types::{ControlMessage, DataMap, ProcessedMessage, Rank};
use std::time::Duration;

/// Worker end of a transport
pub trait WorkerLink {
    /// Rank of the worker owning this link
    fn rank(&self) -> Rank;

    /// Send a message to the collector
    ///
    /// Returns once the transport has accepted the message, so successive
    /// sends from one worker reach the collector in order.
    fn send(&mut self, message: ProcessedMessage) -> Result<()>;

    /// Take the next pending control message without blocking
    fn poll_control(&mut self) -> Result<Option<ControlMessage>>;
}

/// Collector end of a transport
pub trait CollectorLink {
    /// Receive the next message from any worker, waiting at most `wait`
    fn try_receive(&mut self, wait: Duration) -> Result<Option<ProcessedMessage>>;

    /// Deliver feedback to the worker with the given rank
    fn send_feedback(&mut self, rank: Rank, feedback: DataMap) -> Result<()>;

    /// Ask the worker with the given rank to stop
    fn request_stop(&mut self, rank: Rank) -> Result<()>;
}
