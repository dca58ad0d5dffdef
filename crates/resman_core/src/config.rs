//! Resource manager configuration.

use std::time::Duration;

/// Configuration for a [`crate::ResourceManager`].
#[derive(Debug, Clone)]
pub struct Config {
    /// How long a transaction may hold locks before a conflicting
    /// transaction is allowed to evict it. Fixed when the transaction starts.
    pub max_lock_duration: Duration,

    /// Number of published events kept for [`crate::EventFeed::poll`].
    pub event_history: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_lock_duration: Duration::from_secs(5 * 60),
            event_history: 10_000,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum lock duration of new transactions.
    #[must_use]
    pub const fn max_lock_duration(mut self, duration: Duration) -> Self {
        self.max_lock_duration = duration;
        self
    }

    /// Sets how many events the feed keeps for polling.
    #[must_use]
    pub const fn event_history(mut self, events: usize) -> Self {
        self.event_history = events;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.max_lock_duration, Duration::from_secs(300));
        assert_eq!(config.event_history, 10_000);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .max_lock_duration(Duration::from_millis(5))
            .event_history(16);

        assert_eq!(config.max_lock_duration, Duration::from_millis(5));
        assert_eq!(config.event_history, 16);
    }
}
