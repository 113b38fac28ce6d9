//! Test configuration builders

use reduction_monitor::config::{EngineConfig, TransportKind};

/// Builder for engine configs used in integration tests
///
/// Defaults differ from `EngineConfig::default()`: SIGINT handling and
/// progress logging are off so parallel tests do not interfere.
pub struct ConfigBuilder {
    config: EngineConfig,
}

impl ConfigBuilder {
    pub fn new(pool_size: usize, transport: TransportKind) -> Self {
        let mut config = EngineConfig::new(pool_size, transport);
        config.handle_sigint = false;
        config.collector.progress_interval = 0;
        Self { config }
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    pub fn max_frames(mut self, max: usize) -> Self {
        self.config.frames.max_frames_per_event = Some(max);
        self
    }

    pub fn skip_frames(mut self, frames: &[usize]) -> Self {
        self.config.frames.skip_frames = frames.to_vec();
        self
    }

    pub fn handle_sigint(mut self, enabled: bool) -> Self {
        self.config.handle_sigint = enabled;
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new(3, TransportKind::MessagePassing)
            .max_frames(2)
            .skip_frames(&[0])
            .build();

        assert_eq!(config.pool_size, 3);
        assert!(!config.handle_sigint);
        assert_eq!(config.frames.max_frames_per_event, Some(2));
        assert!(config.validate().is_ok());
    }
}
