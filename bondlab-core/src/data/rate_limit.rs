//! Minimum spacing between physical requests to one upstream.

use crate::clock::Clock;
use rand::Rng;
use std::time::{Duration, Instant};

/// Spaces physical attempts by `delay + uniform(0, jitter_max)`.
///
/// The limiter only remembers the previous attempt; callers serialize access
/// (the executor holds it behind its call gate).
#[derive(Debug, Clone)]
pub struct RateLimiter {
    delay: Duration,
    jitter_max: Duration,
    last_attempt: Option<Instant>,
}

impl RateLimiter {
    pub fn new(delay: Duration, jitter_max: Duration) -> Self {
        Self {
            delay,
            jitter_max,
            last_attempt: None,
        }
    }

    /// Sleep until the spacing since the previous attempt has elapsed, then
    /// stamp the current instant as the new previous attempt.
    ///
    /// Returns how long the call slept.
    pub fn wait(&mut self, clock: &dyn Clock) -> Duration {
        let mut waited = Duration::ZERO;
        if let Some(last) = self.last_attempt {
            let target = self.delay + uniform_jitter(self.jitter_max);
            let elapsed = clock.now().saturating_duration_since(last);
            if elapsed < target {
                waited = target - elapsed;
                clock.sleep(waited);
            }
        }
        self.last_attempt = Some(clock.now());
        waited
    }

    pub fn last_attempt(&self) -> Option<Instant> {
        self.last_attempt
    }
}

/// Uniform random duration in `[0, max]` at millisecond resolution.
pub fn uniform_jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn first_attempt_does_not_wait() {
        let clock = ManualClock::new();
        let mut limiter = RateLimiter::new(Duration::from_millis(500), Duration::ZERO);
        assert_eq!(limiter.wait(&clock), Duration::ZERO);
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn back_to_back_attempts_are_spaced() {
        let clock = ManualClock::new();
        let mut limiter = RateLimiter::new(Duration::from_millis(500), Duration::ZERO);
        limiter.wait(&clock);
        clock.advance(Duration::from_millis(200));
        assert_eq!(limiter.wait(&clock), Duration::from_millis(300));
    }

    #[test]
    fn slow_callers_are_not_delayed() {
        let clock = ManualClock::new();
        let mut limiter = RateLimiter::new(Duration::from_millis(500), Duration::ZERO);
        limiter.wait(&clock);
        clock.advance(Duration::from_secs(2));
        assert_eq!(limiter.wait(&clock), Duration::ZERO);
    }

    #[test]
    fn jitter_stays_in_bounds() {
        for _ in 0..200 {
            let j = uniform_jitter(Duration::from_millis(40));
            assert!(j <= Duration::from_millis(40));
        }
        assert_eq!(uniform_jitter(Duration::ZERO), Duration::ZERO);
    }
}
