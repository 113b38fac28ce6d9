//! Error handling for the reduction monitor
//!
//! This module defines the crate error type and a Result alias used by the
//! engine, the transports and the configuration layer. Per-frame extraction
//! failures have their own type in [`crate::source::ExtractionError`] because
//! they are recovered locally and never propagate.

use crate::types::Rank;
use thiserror::Error;

/// Main error type for monitor operations
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Errors related to configuration loading/validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors raised by a transport (closed link, unknown rank, bad tag)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Errors encoding or decoding wire payloads
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A worker exited without sending `End` or `Stopped`
    #[error("Worker {rank} exited without confirming end of stream")]
    WorkerLost { rank: Rank },

    /// A worker failed during initialization or while sending
    #[error("Worker {rank} failed: {message}")]
    WorkerFailed { rank: Rank, message: String },

    /// `start()` was called more than once on the same engine
    #[error("Engine has already been started")]
    AlreadyStarted,

    /// Signal handler registration failed
    #[error("Signal error: {0}")]
    Signal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<MonitorError>,
    },
}

impl MonitorError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        MonitorError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Shorthand for a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        MonitorError::Transport(message.into())
    }
}

/// Result type alias for monitor operations
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
