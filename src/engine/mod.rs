//! Parallelization engine
//!
//! The engine splits a pool of `N` nodes into one collecting node (rank 0)
//! and `N - 1` processing nodes. Each processing node runs on its own OS
//! thread with its own clone of the event source and the plugin; the
//! collecting node runs on the thread that calls
//! [`ParallelizationEngine::start`].
//!
//! Workers share the engine's process. A panicking plugin or source is
//! contained to its thread and reported as
//! [`MonitorError::WorkerFailed`], but one that aborts the process takes
//! the whole pool down with it, collector included.
//!
//! ```text
//!   worker-1 ──┐                      ┌── feedback / stop ──> worker-1
//!   worker-2 ──┼── Data | End | ... ──┤
//!   worker-N ──┘      (transport)     └── feedback / stop ──> worker-N
//!                         │
//!                    collector (caller thread)
//! ```
//!
//! Two interchangeable transports carry the messages: a bounded shared
//! queue ([`queue`]) and a tagged message-passing layer
//! ([`message_passing`]). The choice is made by
//! [`EngineConfig::transport`](crate::config::EngineConfig).

pub mod collector;
pub mod comm;
pub mod message_passing;
pub mod queue;
pub mod shutdown;
pub mod transport;
pub mod worker;

pub use collector::{CollectingNode, WorkerLiveness};
pub use shutdown::{ShutdownHandle, ShutdownSignal, INTERRUPT_REASON};
pub use transport::{CollectorLink, WorkerLink};
pub use worker::{ProcessingNode, WorkerExit, WorkerReport};

use crate::config::{EngineConfig, TransportKind};
use crate::error::{MonitorError, Result, ResultExt};
use crate::processing::Processing;
use crate::source::EventSource;
use crate::types::{NodePool, Rank, RunSummary};
use shutdown::SigintGuard;
use std::collections::BTreeMap;
use std::thread::{self, JoinHandle};

/// Drives one run of an event source and a plugin over a node pool
pub struct ParallelizationEngine<S, P> {
    config: EngineConfig,
    pool: NodePool,
    source: S,
    plugin: P,
    handle: ShutdownHandle,
    /// Taken by the first call to `start`
    signal: Option<ShutdownSignal>,
}

impl<S, P> ParallelizationEngine<S, P>
where
    S: EventSource + Clone + Send + 'static,
    P: Processing + Clone + Send + 'static,
{
    /// Create an engine; fails if the configuration is invalid
    pub fn new(config: EngineConfig, source: S, plugin: P) -> Result<Self> {
        let pool = config.validate()?;
        let (handle, signal) = ShutdownSignal::new();
        Ok(Self {
            config,
            pool,
            source,
            plugin,
            handle,
            signal: Some(signal),
        })
    }

    pub fn pool(&self) -> NodePool {
        self.pool
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Handle for forcing a shutdown from another thread or from plugin code
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.handle.clone()
    }

    /// Request a forced shutdown of the current or next run
    pub fn shutdown(&self, reason: impl Into<String>) -> bool {
        self.handle.shutdown(reason)
    }

    /// The collector's plugin instance
    pub fn plugin(&self) -> &P {
        &self.plugin
    }

    /// Mutable access to the plugin prototype
    ///
    /// Changes made before `start` are seen by every worker clone.
    pub fn plugin_mut(&mut self) -> &mut P {
        &mut self.plugin
    }

    /// Run the pool until every worker drained its source or a forced
    /// shutdown completed
    ///
    /// Blocks the calling thread, which acts as the collecting node. An
    /// engine can be started once.
    pub fn start(&mut self) -> Result<RunSummary> {
        let signal = self.signal.take().ok_or(MonitorError::AlreadyStarted)?;
        let _sigint = if self.config.handle_sigint {
            Some(SigintGuard::register(&signal)?)
        } else {
            None
        };

        let size = self.pool.size();
        tracing::info!(
            pool_size = size,
            workers = self.pool.worker_count(),
            transport = %self.config.transport,
            "Starting parallelization engine"
        );

        let collector = self.pool.collector_rank();
        self.source
            .initialize_on_collecting_node(collector, size)
            .context("Failed to initialize event source on the collecting node")?;
        self.plugin.initialize_collecting_node(collector, size);

        match self.config.transport {
            TransportKind::Queue => {
                let (link, workers) = queue::connect(&self.pool, self.config.queue_capacity);
                self.run_pool(link, workers, signal)
            }
            TransportKind::MessagePassing => {
                let (link, workers) = message_passing::connect(&self.pool);
                self.run_pool(link, workers, signal)
            }
        }
    }

    fn run_pool<C, W>(
        &mut self,
        mut link: C,
        worker_links: Vec<W>,
        signal: ShutdownSignal,
    ) -> Result<RunSummary>
    where
        C: CollectorLink,
        W: WorkerLink + Send + 'static,
    {
        let mut threads = WorkerThreads::default();
        for worker_link in worker_links {
            let rank = worker_link.rank();
            let node = ProcessingNode::new(
                worker_link,
                self.pool.size(),
                self.source.clone(),
                self.plugin.clone(),
                self.config.frames.clone(),
            );
            let spawned = thread::Builder::new()
                .name(format!("worker-{}", rank))
                .spawn(move || node.run());
            match spawned {
                Ok(handle) => threads.handles.push((rank, handle)),
                Err(e) => {
                    stop_all(&mut link, &threads);
                    drop(link);
                    let _ = threads.join();
                    return Err(MonitorError::from(e))
                        .with_context(|| format!("Failed to spawn worker {}", rank));
                }
            }
        }

        let outcome = CollectingNode::new(
            self.pool,
            &mut self.plugin,
            &mut link,
            self.config.collector.clone(),
            signal,
            &threads,
        )
        .run();

        if outcome.is_err() {
            // Workers still running would otherwise never finish
            stop_all(&mut link, &threads);
        }
        drop(link);
        let failures = threads.join();

        // A lost worker that left an error behind is reported with it
        let outcome = match outcome {
            Err(MonitorError::WorkerLost { rank }) => match failures.get(&rank) {
                Some(message) => Err(MonitorError::WorkerFailed {
                    rank,
                    message: message.clone(),
                }),
                None => Err(MonitorError::WorkerLost { rank }),
            },
            other => other,
        };

        match &outcome {
            Ok(summary) => tracing::info!(
                termination = %summary.termination,
                collected = summary.stats.collected,
                elapsed_ms = summary.elapsed.as_millis() as u64,
                "Parallelization engine finished"
            ),
            Err(e) => tracing::error!(error = %e, "Parallelization engine failed"),
        }
        outcome
    }
}

fn stop_all<C: CollectorLink>(link: &mut C, threads: &WorkerThreads) {
    for (rank, handle) in &threads.handles {
        if !handle.is_finished() {
            if let Err(e) = link.request_stop(*rank) {
                tracing::debug!(rank, error = %e, "Stop request not delivered");
            }
        }
    }
}

/// Join handles of the worker threads
#[derive(Default)]
struct WorkerThreads {
    handles: Vec<(Rank, JoinHandle<Result<WorkerReport>>)>,
}

impl WorkerThreads {
    /// Join every worker; returns the failure message of each failed one
    fn join(self) -> BTreeMap<Rank, String> {
        let mut failures = BTreeMap::new();
        for (rank, handle) in self.handles {
            match handle.join() {
                Ok(Ok(report)) => tracing::debug!(
                    rank,
                    exit = ?report.exit,
                    events = report.stats.events,
                    frames = report.stats.frames_sent,
                    "Worker joined"
                ),
                Ok(Err(e)) => {
                    tracing::error!(rank, error = %e, "Worker failed");
                    failures.insert(rank, e.to_string());
                }
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    tracing::error!(rank, %message, "Worker panicked");
                    failures.insert(rank, format!("panicked: {}", message));
                }
            }
        }
        failures
    }
}

impl WorkerLiveness for WorkerThreads {
    fn has_exited(&self, rank: Rank) -> bool {
        self.handles
            .iter()
            .find(|(r, _)| *r == rank)
            .map_or(true, |(_, handle)| handle.is_finished())
    }
}
