//! Exponential backoff with jitter for command delivery retries.
//!
//! A flapping vehicle link should not turn into a tight resend loop or a
//! wall of identical warnings.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
    next_attempt_at: Instant,
    jitter_ratio: f64,
    failures: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let base = base.max(Duration::from_millis(1));
        let max = max.max(base);
        Self {
            base,
            max,
            current: base,
            next_attempt_at: Instant::now(),
            jitter_ratio: 0.2,
            failures: 0,
        }
    }

    pub fn ready(&self) -> bool {
        Instant::now() >= self.next_attempt_at
    }

    /// Time left before the next attempt is allowed.
    pub fn remaining(&self) -> Duration {
        self.next_attempt_at.saturating_duration_since(Instant::now())
    }

    /// Consecutive failures since the last reset.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn reset(&mut self) {
        self.current = self.base;
        self.next_attempt_at = Instant::now();
        self.failures = 0;
    }

    /// Record a failed attempt and return the delay until the next one.
    pub fn fail(&mut self) -> Duration {
        let delay = if self.failures == 0 {
            self.current
        } else {
            self.current = self.current.saturating_mul(2).min(self.max);
            add_jitter(self.current, self.jitter_ratio)
        };
        self.failures = self.failures.saturating_add(1);
        self.next_attempt_at = Instant::now() + delay;
        delay
    }
}

fn add_jitter(delay: Duration, ratio: f64) -> Duration {
    let delay_ms = delay.as_millis() as u64;
    let jitter_ms_max = (delay_ms as f64 * ratio.clamp(0.0, 1.0)) as u64;
    if jitter_ms_max == 0 {
        return delay;
    }

    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::from(d.subsec_nanos()))
        .unwrap_or(0);
    delay + Duration::from_millis(seed % (jitter_ms_max + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_failure_waits_the_base_delay() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(1));
        assert!(backoff.ready());

        assert_eq!(backoff.fail(), Duration::from_millis(100));
        assert!(!backoff.ready());
        assert!(backoff.remaining() <= Duration::from_millis(100));
        assert_eq!(backoff.failures(), 1);

        backoff.reset();
        assert!(backoff.ready());
        assert_eq!(backoff.failures(), 0);
    }

    #[test]
    fn repeated_failures_double_up_to_max() {
        let mut backoff = Backoff::new(Duration::from_millis(10), Duration::from_millis(40));
        backoff.fail();

        let second = backoff.fail();
        assert!(second >= Duration::from_millis(20));
        assert!(second <= Duration::from_millis(24));

        backoff.fail();
        let capped = backoff.fail();
        assert!(capped >= Duration::from_millis(40));
        assert!(capped <= Duration::from_millis(48));
    }
}
