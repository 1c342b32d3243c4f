use std::time::Duration;

use rand::Rng;

/// Default number of resident pages
pub const DEFAULT_PAGES: usize = 50;

const MIN_LOCK_TIMEOUT: Duration = Duration::from_millis(500);
const MAX_LOCK_TIMEOUT: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub capacity: usize,
    pub lock_timeout_min: Duration,
    pub lock_timeout_max: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_PAGES,
            lock_timeout_min: MIN_LOCK_TIMEOUT,
            lock_timeout_max: MAX_LOCK_TIMEOUT,
        }
    }
}

impl CacheConfig {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_lock_timeout(mut self, min: Duration, max: Duration) -> Self {
        self.lock_timeout_min = min;
        self.lock_timeout_max = max.max(min);
        self
    }

    /// Draws a lock budget from the configured range so that two transactions
    /// deadlocked on each other do not time out at the same instant
    pub fn lock_timeout(&self) -> Duration {
        if self.lock_timeout_max <= self.lock_timeout_min {
            return self.lock_timeout_min;
        }
        rand::thread_rng().gen_range(self.lock_timeout_min..=self.lock_timeout_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.capacity, DEFAULT_PAGES);
        assert_eq!(config.lock_timeout_min, Duration::from_millis(500));
        assert_eq!(config.lock_timeout_max, Duration::from_millis(2000));
    }

    #[test]
    fn test_lock_timeout_stays_in_range() {
        let config = CacheConfig::default()
            .with_lock_timeout(Duration::from_millis(10), Duration::from_millis(20));
        for _ in 0..100 {
            let budget = config.lock_timeout();
            assert!(budget >= Duration::from_millis(10));
            assert!(budget <= Duration::from_millis(20));
        }
    }

    #[test]
    fn test_inverted_range_is_clamped() {
        let config = CacheConfig::default()
            .with_lock_timeout(Duration::from_millis(30), Duration::from_millis(5));
        assert_eq!(config.lock_timeout(), Duration::from_millis(30));
    }
}
