//! Tagged point-to-point communicator
//!
//! Every rank of the pool owns a mailbox with one FIFO per tag. A message is
//! an [`Envelope`] carrying the sender's rank, the tag and an encoded
//! payload. Sends are buffered and never block; receives select by tag and
//! accept any source. Messages from one sender with one tag are delivered in
//! the order they were sent; nothing is promised across senders or tags.

use crate::error::{MonitorError, Result};
use crate::types::Rank;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

/// Message tag
pub type Tag = u16;

/// Data upstream (`Data`/`End`) and feedback downstream
pub const DATA_TAG: Tag = 0;

/// Collector to worker forced-stop request
pub const STOP_TAG: Tag = 999;

/// Worker to collector forced-stop acknowledgement
pub const STOPPED_TAG: Tag = 1000;

const TAGS: [Tag; 3] = [DATA_TAG, STOP_TAG, STOPPED_TAG];

/// One message in flight
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Rank of the sender
    pub source: Rank,
    /// Tag the message was sent with
    pub tag: Tag,
    /// Encoded payload
    pub bytes: Vec<u8>,
}

struct TagQueue {
    tag: Tag,
    tx: Sender<Envelope>,
    rx: Receiver<Envelope>,
}

struct Mailbox {
    queues: Vec<TagQueue>,
}

impl Mailbox {
    fn new() -> Self {
        let queues = TAGS
            .iter()
            .map(|&tag| {
                let (tx, rx) = unbounded();
                TagQueue { tag, tx, rx }
            })
            .collect();
        Self { queues }
    }

    fn queue(&self, tag: Tag) -> Result<&TagQueue> {
        self.queues
            .iter()
            .find(|queue| queue.tag == tag)
            .ok_or_else(|| MonitorError::transport(format!("unknown message tag {}", tag)))
    }
}

/// One rank's view of the communicator
#[derive(Clone)]
pub struct Communicator {
    rank: Rank,
    mailboxes: Arc<[Mailbox]>,
}

impl Communicator {
    /// Create a communicator of `size` ranks
    ///
    /// Returns one handle per rank, index `i` being rank `i`.
    pub fn world(size: usize) -> Vec<Communicator> {
        let mailboxes: Arc<[Mailbox]> = (0..size).map(|_| Mailbox::new()).collect();
        (0..size)
            .map(|rank| Communicator {
                rank,
                mailboxes: Arc::clone(&mailboxes),
            })
            .collect()
    }

    /// Rank of this handle
    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// Number of ranks
    pub fn size(&self) -> usize {
        self.mailboxes.len()
    }

    fn mailbox(&self, rank: Rank) -> Result<&Mailbox> {
        self.mailboxes.get(rank).ok_or_else(|| {
            MonitorError::transport(format!(
                "rank {} outside communicator of size {}",
                rank,
                self.size()
            ))
        })
    }

    /// Buffered send to `dest` with `tag`
    pub fn send(&self, dest: Rank, tag: Tag, bytes: Vec<u8>) -> Result<()> {
        let envelope = Envelope {
            source: self.rank,
            tag,
            bytes,
        };
        self.mailbox(dest)?
            .queue(tag)?
            .tx
            .send(envelope)
            .map_err(|_| MonitorError::transport(format!("mailbox of rank {} is closed", dest)))
    }

    /// Whether a message with `tag` is waiting for this rank
    pub fn has_message(&self, tag: Tag) -> Result<bool> {
        Ok(!self.mailbox(self.rank)?.queue(tag)?.rx.is_empty())
    }

    /// Take a message with `tag` from any source without blocking
    pub fn try_recv(&self, tag: Tag) -> Result<Option<Envelope>> {
        Ok(self.mailbox(self.rank)?.queue(tag)?.rx.try_recv().ok())
    }

    /// Take a message with `tag` from any source, waiting at most `timeout`
    pub fn recv_timeout(&self, tag: Tag, timeout: Duration) -> Result<Option<Envelope>> {
        let queue = self.mailbox(self.rank)?.queue(tag)?;
        match queue.rx.recv_timeout(timeout) {
            Ok(envelope) => Ok(Some(envelope)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(MonitorError::transport(format!(
                "mailbox of rank {} is closed",
                self.rank
            ))),
        }
    }
}
