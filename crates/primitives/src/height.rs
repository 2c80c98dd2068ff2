//! Monotonic block identifiers and the scheduler's bookkeeping record.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// A consensus-layer block height.
pub type Height = u64;

/// A runtime-layer round number. Each runtime has independent numbering.
pub type Round = u64;

/// `ProcessedBlockRecord` (spec.md section 3): the scheduler's sole
/// coordination point for a given analyzer.
///
/// Invariant: for a given analyzer there is at most one row per height;
/// `processed_at` is set exactly once and monotonically; `locked_until` is
/// advisory only and never gates correctness on its own.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedBlockRecord {
    /// Name of the analyzer that owns this row.
    pub analyzer_name: String,
    /// The height (or round, for runtime analyzers) this row tracks.
    pub height: Height,
    /// If `Some`, the row is leased until this instant.
    pub locked_until: Option<SystemTime>,
    /// If `Some`, the height has been committed and will never be retried.
    pub processed_at: Option<SystemTime>,
}

impl ProcessedBlockRecord {
    /// Construct a fresh, unprocessed, unlocked record.
    pub fn new(analyzer_name: impl Into<String>, height: Height) -> Self {
        Self { analyzer_name: analyzer_name.into(), height, locked_until: None, processed_at: None }
    }

    /// The height's current state, per spec.md section 4.5's invariant that a
    /// height is in exactly one of these three states at any time.
    pub fn state(&self, now: SystemTime) -> BlockState {
        if self.processed_at.is_some() {
            BlockState::Processed
        } else if let Some(until) = self.locked_until {
            if until > now {
                BlockState::Locked(until)
            } else {
                BlockState::Unprocessed
            }
        } else {
            BlockState::Unprocessed
        }
    }

    /// Lease this record until `now + lease`.
    pub fn lock(&mut self, now: SystemTime, lease: Duration) {
        self.locked_until = Some(now + lease);
    }

    /// Release the lease without marking the record processed.
    pub fn unlock(&mut self) {
        self.locked_until = None;
    }

    /// Mark the record processed as of `now`. Idempotent: calling this twice
    /// leaves `processed_at` at its first value is the caller's
    /// responsibility not to do (the scheduler never re-commits a height).
    pub fn mark_processed(&mut self, now: SystemTime) {
        self.processed_at = Some(now);
        self.locked_until = None;
    }
}

/// The three mutually exclusive states a height can be in for a given analyzer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockState {
    /// Not yet locked or processed.
    Unprocessed,
    /// Leased until the contained instant.
    Locked(SystemTime),
    /// Committed; never revisited.
    Processed,
}

/// An inclusive height/round range, with an optional open upper bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    /// First height/round in scope (inclusive).
    pub from: Height,
    /// Last height/round in scope (inclusive), or `None` for "follow the chain tip".
    pub to: Option<Height>,
}

impl BlockRange {
    /// Whether `height` falls within this range.
    pub fn contains(&self, height: Height) -> bool {
        height >= self.from && self.to.map(|to| height <= to).unwrap_or(true)
    }

    /// Whether the range is closed and its last height has already been reached.
    pub fn exhausted_at(&self, next_unprocessed: Height) -> bool {
        matches!(self.to, Some(to) if next_unprocessed > to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_transitions() {
        let now = SystemTime::now();
        let mut rec = ProcessedBlockRecord::new("test", 10);
        assert_eq!(rec.state(now), BlockState::Unprocessed);

        rec.lock(now, Duration::from_secs(300));
        assert!(matches!(rec.state(now), BlockState::Locked(_)));

        rec.mark_processed(now + Duration::from_secs(1));
        assert_eq!(rec.state(now + Duration::from_secs(2)), BlockState::Processed);
    }

    #[test]
    fn expired_lock_reverts_to_unprocessed() {
        let now = SystemTime::now();
        let mut rec = ProcessedBlockRecord::new("test", 10);
        rec.lock(now, Duration::from_secs(1));
        let later = now + Duration::from_secs(2);
        assert_eq!(rec.state(later), BlockState::Unprocessed);
    }

    #[test]
    fn range_exhaustion() {
        let r = BlockRange { from: 0, to: Some(100) };
        assert!(!r.exhausted_at(100));
        assert!(r.exhausted_at(101));
        let open = BlockRange { from: 0, to: None };
        assert!(!open.exhausted_at(u64::MAX));
    }
}
