//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod plugins;
pub mod sources;

use reduction_monitor::config::TransportKind;
use std::time::{Duration, Instant};

/// Both transports, for tests that must hold on either
pub const TRANSPORTS: [TransportKind; 2] = [TransportKind::Queue, TransportKind::MessagePassing];

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Poll `condition` until it holds, panicking after [`test_timeout`]
pub fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + test_timeout();
    while !condition() {
        assert!(Instant::now() < deadline, "Timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(1));
    }
}
