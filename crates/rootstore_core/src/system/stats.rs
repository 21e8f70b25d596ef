//! Indexed session statistics.
//!
//! A fixed number of signed counters per session. Counters are plain
//! storage: they are not rolled back with scopes and never reach the log.
//!
//! ```
//! use rootstore_core::system::SessionStats;
//!
//! let stats = SessionStats::new(8);
//! stats.set(5, 5).unwrap();
//! assert_eq!(stats.increment(5).unwrap(), 6);
//! assert_eq!(stats.decrement(5, 2).unwrap(), 4);
//! ```

use crate::error::{CoreError, CoreResult};
use std::sync::atomic::{AtomicI64, Ordering};

/// Number of counters a session gets unless configured otherwise.
pub const DEFAULT_STAT_SLOTS: usize = 48;

/// One session's counters. All start at zero.
#[derive(Debug)]
pub struct SessionStats {
    slots: Vec<AtomicI64>,
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new(DEFAULT_STAT_SLOTS)
    }
}

impl SessionStats {
    /// Creates `len` zeroed counters.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| AtomicI64::new(0)).collect(),
        }
    }

    /// Number of counters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if there are no counters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Reads counter `index`.
    pub fn get(&self, index: usize) -> CoreResult<i64> {
        Ok(self.slot(index)?.load(Ordering::Relaxed))
    }

    /// Overwrites counter `index`.
    pub fn set(&self, index: usize, value: i64) -> CoreResult<()> {
        self.slot(index)?.store(value, Ordering::Relaxed);
        Ok(())
    }

    /// Adds one and returns the new value.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the counter would overflow; it keeps its value.
    pub fn increment(&self, index: usize) -> CoreResult<i64> {
        self.update(index, |current| current.checked_add(1))
    }

    /// Subtracts `amount` and returns the new value. May go below zero.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the counter would overflow; it keeps its value.
    pub fn decrement(&self, index: usize, amount: i64) -> CoreResult<i64> {
        self.update(index, |current| current.checked_sub(amount))
    }

    /// Zeroes every counter.
    pub fn reset(&self) {
        for slot in &self.slots {
            slot.store(0, Ordering::Relaxed);
        }
    }

    /// Copies all counters.
    #[must_use]
    pub fn snapshot(&self) -> Vec<i64> {
        self.slots.iter().map(|s| s.load(Ordering::Relaxed)).collect()
    }

    fn update(&self, index: usize, step: impl Fn(i64) -> Option<i64>) -> CoreResult<i64> {
        let mut updated = 0;
        self.slot(index)?
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                let next = step(current);
                if let Some(next) = next {
                    updated = next;
                }
                next
            })
            .map(|_| updated)
            .map_err(|current| {
                CoreError::invalid_argument(format!(
                    "session stat {index} would overflow from {current}"
                ))
            })
    }

    fn slot(&self, index: usize) -> CoreResult<&AtomicI64> {
        self.slots.get(index).ok_or_else(|| {
            CoreError::invalid_argument(format!(
                "session stat index {index} out of range (0..{})",
                self.slots.len()
            ))
        })
    }
}
