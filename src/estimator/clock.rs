use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Time source for the estimator and the simulated meter.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> SystemTime;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Virtual time that only moves when told to. Starts at the unix epoch.
#[derive(Debug)]
pub struct MockClock {
    now: Mutex<SystemTime>,
}

impl MockClock {
    pub fn new() -> Self {
        Self::starting_at(UNIX_EPOCH)
    }

    pub fn starting_at(start: SystemTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, step: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += step;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Time elapsed from `since` to `now`, saturating at zero when `since` lies in the future.
pub fn elapsed_between(now: SystemTime, since: SystemTime) -> Duration {
    now.duration_since(since).unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_clock_advances_only_on_request() {
        let clock = MockClock::new();
        assert_eq!(clock.now(), UNIX_EPOCH);

        clock.advance(Duration::from_secs(90));

        assert_eq!(clock.now(), UNIX_EPOCH + Duration::from_secs(90));
    }

    #[test]
    fn elapsed_saturates_for_future_start() {
        let later = UNIX_EPOCH + Duration::from_secs(10);

        assert_eq!(elapsed_between(UNIX_EPOCH, later), Duration::ZERO);
        assert_eq!(elapsed_between(later, UNIX_EPOCH), Duration::from_secs(10));
    }
}
