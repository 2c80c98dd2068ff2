//! Exponential backoff controller (spec.md section 4.4), grounded on
//! `analyzer/util.Backoff`: doubling delay on failure, halving on success,
//! clamped to `[min, max]`.

use std::time::Duration;

/// Multiplier applied to the current delay on a call to [`BackoffController::failure`].
const GROWTH_FACTOR: u32 = 2;

/// Divisor applied to the current delay on a call to [`BackoffController::success`].
const SHRINK_DIVISOR: u32 = 2;

/// A single-threaded exponential backoff timer. Not safe for concurrent
/// mutation by multiple drivers on one instance (spec.md section 4.4); each
/// scheduler worker owns its own.
#[derive(Debug, Clone)]
pub struct BackoffController {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl BackoffController {
    /// Construct a controller starting at `min`. `min` must be <= `max`;
    /// callers in this workspace only ever pass compile-time-fixed bounds,
    /// so this is an assertion rather than a `Result`.
    pub fn new(min: Duration, max: Duration) -> Self {
        assert!(min <= max, "backoff min must not exceed max");
        Self { min, max, current: min }
    }

    /// The delay a caller should currently sleep for.
    pub fn timeout(&self) -> Duration {
        self.current
    }

    /// Move the delay toward `min` after a successful operation.
    pub fn success(&mut self) {
        self.current = (self.current / SHRINK_DIVISOR).max(self.min);
    }

    /// Move the delay toward `max` after a failed operation, saturating
    /// rather than overflowing on repeated failures.
    pub fn failure(&mut self) {
        self.current = self.current.saturating_mul(GROWTH_FACTOR).min(self.max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_grows_toward_max_and_saturates() {
        let mut b = BackoffController::new(Duration::from_millis(100), Duration::from_secs(6));
        for _ in 0..20 {
            b.failure();
        }
        assert_eq!(b.timeout(), Duration::from_secs(6));
    }

    #[test]
    fn success_shrinks_toward_min_and_floors() {
        let mut b = BackoffController::new(Duration::from_millis(100), Duration::from_secs(6));
        b.failure();
        b.failure();
        for _ in 0..20 {
            b.success();
        }
        assert_eq!(b.timeout(), Duration::from_millis(100));
    }

    #[test]
    fn is_monotone_single_step() {
        let mut b = BackoffController::new(Duration::from_millis(100), Duration::from_secs(6));
        let before = b.timeout();
        b.failure();
        assert!(b.timeout() >= before);
        let before = b.timeout();
        b.success();
        assert!(b.timeout() <= before);
    }
}
