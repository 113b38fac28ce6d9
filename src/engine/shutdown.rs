//! Forced-shutdown requests
//!
//! A forced shutdown is requested through a [`ShutdownHandle`] (from any
//! thread, including plugin code) or by SIGINT on the collecting node. The
//! collector polls the matching [`ShutdownSignal`] once per loop iteration.

use crate::error::{MonitorError, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use signal_hook::consts::SIGINT;
use signal_hook::SigId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Reason recorded when the shutdown was triggered by SIGINT
pub const INTERRUPT_REASON: &str = "interrupted (SIGINT)";

/// Cloneable handle for requesting a forced shutdown
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Sender<String>,
}

impl ShutdownHandle {
    /// Ask the collector to stop every worker
    ///
    /// Returns false when the engine is gone. Only the first request of a run
    /// is acted upon.
    pub fn shutdown(&self, reason: impl Into<String>) -> bool {
        self.tx.send(reason.into()).is_ok()
    }
}

/// Collector side of the shutdown channel
#[derive(Debug)]
pub struct ShutdownSignal {
    rx: Receiver<String>,
    interrupted: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// Create a connected handle/signal pair
    pub fn new() -> (ShutdownHandle, ShutdownSignal) {
        let (tx, rx) = unbounded();
        let signal = ShutdownSignal {
            rx,
            interrupted: Arc::new(AtomicBool::new(false)),
        };
        (ShutdownHandle { tx }, signal)
    }

    /// Flag set asynchronously by the SIGINT handler
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    /// Take a pending shutdown request, if any
    pub fn poll(&self) -> Option<String> {
        if self.interrupted.swap(false, Ordering::SeqCst) {
            return Some(INTERRUPT_REASON.to_string());
        }
        self.rx.try_recv().ok()
    }
}

/// Routes SIGINT to a shutdown signal for as long as it is alive
pub struct SigintGuard {
    id: SigId,
}

impl SigintGuard {
    /// Register the handler; the process no longer terminates on SIGINT
    pub fn register(signal: &ShutdownSignal) -> Result<Self> {
        let id = signal_hook::flag::register(SIGINT, signal.interrupt_flag())
            .map_err(|e| MonitorError::Signal(format!("Failed to register SIGINT handler: {}", e)))?;
        Ok(Self { id })
    }
}

impl Drop for SigintGuard {
    fn drop(&mut self) {
        signal_hook::low_level::unregister(self.id);
    }
}
