//! # Supportdesk Testing
//!
//! Testing utilities and helpers for the Supportdesk reducer architecture.
//!
//! This crate provides:
//! - Deterministic implementations of Environment traits
//! - A journal that fails on demand, for exercising retry and dead-letter paths
//! - [`ReducerTest`], a Given/When/Then harness for reducers
//!
//! ## Example
//!
//! ```ignore
//! use supportdesk_testing::{test_clock, SequentialIds};
//!
//! let env = TicketEnvironment::new(
//!     Arc::new(test_clock()),
//!     Arc::new(SequentialIds::new()),
//!     Arc::new(InMemoryJournal::new()),
//!     WorkflowPolicy::default(),
//! );
//! ```


pub use mocks::{FailingJournal, FixedClock, SequentialIds, test_clock};
pub use reducer_test::{ReducerTest, assertions};

/// Mock implementations of Environment traits
pub mod mocks {
    use chrono::{DateTime, Duration, Utc};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use supportdesk_core::environment::{Clock, IdGenerator};
    use supportdesk_core::journal::{EventJournal, JournalError, JournalRecord, StoredRecord};
    use uuid::Uuid;

    /// Controllable clock for deterministic tests
    ///
    /// Returns the same time until moved with [`FixedClock::advance`] or
    /// [`FixedClock::set`]. Clones share the same time.
    ///
    /// # Example
    ///
    /// ```
    /// use supportdesk_testing::mocks::FixedClock;
    /// use supportdesk_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let before = clock.now();
    /// assert_eq!(before, clock.now());
    ///
    /// clock.advance(Duration::hours(2));
    /// assert_eq!(clock.now() - before, Duration::hours(2));
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock to `time`
        pub fn set(&self, time: DateTime<Utc>) {
            *self
                .time
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner) = time;
        }

        /// Move the clock forward by `by`
        pub fn advance(&self, by: Duration) {
            let mut time = self
                .time
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            *time += by;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self
                .time
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse, which cannot happen.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Predictable identifiers: `00000000-0000-0000-0000-000000000001`, `...02`, ...
    #[derive(Debug, Default)]
    pub struct SequentialIds {
        next: AtomicU64,
    }

    impl SequentialIds {
        /// Start at 1
        #[must_use]
        pub const fn new() -> Self {
            Self {
                next: AtomicU64::new(0),
            }
        }

        /// Start after `offset`, so separate generators never collide
        #[must_use]
        pub const fn starting_after(offset: u64) -> Self {
            Self {
                next: AtomicU64::new(offset),
            }
        }
    }

    impl IdGenerator for SequentialIds {
        fn next_id(&self) -> Uuid {
            let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
            Uuid::from_u128(u128::from(n))
        }
    }

    /// Journal that rejects the first `failures` appends, then accepts writes.
    ///
    /// [`FailingJournal::new`] never accepts a write.
    #[derive(Debug)]
    pub struct FailingJournal {
        remaining_failures: AtomicUsize,
        attempts: AtomicUsize,
        written: Mutex<Vec<StoredRecord>>,
    }

    impl FailingJournal {
        /// A journal that fails every append
        #[must_use]
        pub const fn new() -> Self {
            Self::failing_times(usize::MAX)
        }

        /// A journal that fails the first `failures` appends
        #[must_use]
        pub const fn failing_times(failures: usize) -> Self {
            Self {
                remaining_failures: AtomicUsize::new(failures),
                attempts: AtomicUsize::new(0),
                written: Mutex::new(Vec::new()),
            }
        }

        /// Number of append calls received
        #[must_use]
        pub fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }

        /// Records accepted so far
        #[must_use]
        pub fn written(&self) -> Vec<StoredRecord> {
            self.written
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clone()
        }
    }

    impl Default for FailingJournal {
        fn default() -> Self {
            Self::new()
        }
    }

    impl EventJournal for FailingJournal {
        fn append(
            &self,
            records: Vec<JournalRecord>,
        ) -> Pin<Box<dyn Future<Output = Result<i64, JournalError>> + Send + '_>> {
            Box::pin(async move {
                self.attempts.fetch_add(1, Ordering::SeqCst);

                let failing = self
                    .remaining_failures
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                        (left > 0).then(|| left.saturating_sub(1))
                    })
                    .is_ok();
                if failing {
                    return Err(JournalError::Unavailable("simulated outage".to_string()));
                }

                let mut written = self
                    .written
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                let mut sequence = written.last().map_or(0, |r| r.sequence);
                for record in records {
                    sequence += 1;
                    written.push(StoredRecord { sequence, record });
                }
                Ok(sequence)
            })
        }

        fn load_all(
            &self,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<StoredRecord>, JournalError>> + Send + '_>>
        {
            Box::pin(async move { Ok(self.written()) })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use supportdesk_core::environment::{Clock, IdGenerator};
    use supportdesk_core::journal::{EventJournal, JournalRecord};

    #[test]
    fn fixed_clock_is_stable_until_advanced() {
        let clock = test_clock();
        let shared = clock.clone();
        let start = clock.now();
        assert_eq!(start, clock.now());

        shared.advance(chrono::Duration::minutes(5));
        assert_eq!(clock.now() - start, chrono::Duration::minutes(5));
    }

    #[test]
    fn sequential_ids_count_up() {
        let ids = SequentialIds::new();
        assert_eq!(ids.next_id().as_u128(), 1);
        assert_eq!(ids.next_id().as_u128(), 2);
        assert_eq!(SequentialIds::starting_after(100).next_id().as_u128(), 101);
    }

    #[test]
    fn failing_journal_recovers_after_configured_failures() {
        let journal = FailingJournal::failing_times(1);
        let record = JournalRecord {
            stream_id: "s".to_string(),
            event_type: "e".to_string(),
            payload: serde_json::Value::Null,
            recorded_at: Utc::now(),
        };

        assert!(tokio_test::block_on(journal.append(vec![record.clone()])).is_err());
        assert_eq!(tokio_test::block_on(journal.append(vec![record])).unwrap(), 1);
        assert_eq!(journal.attempts(), 2);
        assert_eq!(journal.written().len(), 1);
    }
}
