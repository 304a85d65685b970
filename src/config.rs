//! Configuration for the group coordinator.

use std::time::Duration;

/// Timing configuration for a group member coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// How long to wait before retrying a failed coordination store
    /// operation.
    pub retry_backoff: Duration,

    /// How long to wait after a membership change before reading the
    /// group's subscriptions. Absorbs the deregister/register bursts other
    /// members produce when they change their subscription, so a burst
    /// yields one rebalance instead of several.
    pub rebalance_delay: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            retry_backoff: Duration::from_secs(3),
            rebalance_delay: Duration::from_millis(250),
        }
    }
}

impl CoordinatorConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the retry backoff.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Set the rebalance delay.
    pub fn with_rebalance_delay(mut self, delay: Duration) -> Self {
        self.rebalance_delay = delay;
        self
    }

    /// Create a configuration with short intervals suitable for tests.
    pub fn fast_for_tests() -> Self {
        Self {
            retry_backoff: Duration::from_millis(25),
            rebalance_delay: Duration::from_millis(50),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.retry_backoff, Duration::from_secs(3));
        assert_eq!(config.rebalance_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_config_builder() {
        let config = CoordinatorConfig::new()
            .with_retry_backoff(Duration::from_millis(500))
            .with_rebalance_delay(Duration::from_millis(100));

        assert_eq!(config.retry_backoff, Duration::from_millis(500));
        assert_eq!(config.rebalance_delay, Duration::from_millis(100));
    }

    #[test]
    fn test_fast_config_is_faster() {
        let fast = CoordinatorConfig::fast_for_tests();
        let default = CoordinatorConfig::default();
        assert!(fast.retry_backoff < default.retry_backoff);
        assert!(fast.rebalance_delay < default.rebalance_delay);
    }
}
