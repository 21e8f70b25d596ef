//! Store configuration.

use std::time::Duration;

/// Configuration for opening a store.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to error if the store already exists.
    pub error_if_exists: bool,

    /// Whether to fsync the commit log on every commit (safer but slower).
    pub sync_on_commit: bool,

    /// Format version to use for new stores.
    pub format_version: (u16, u16),

    /// How long a commit waits for the cross-process commit lock.
    pub lock_timeout: Duration,

    /// Pause between attempts to take the commit lock.
    pub lock_retry_interval: Duration,

    /// Number of slots in each session's statistics registry.
    pub stat_slots: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: false,
            sync_on_commit: true,
            format_version: (1, 0),
            lock_timeout: Duration::from_secs(10),
            lock_retry_interval: Duration::from_millis(5),
            stat_slots: 48,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the store if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to error if the store exists.
    #[must_use]
    pub const fn error_if_exists(mut self, value: bool) -> Self {
        self.error_if_exists = value;
        self
    }

    /// Sets whether to sync the log on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the format version written into new stores.
    #[must_use]
    pub const fn format_version(mut self, major: u16, minor: u16) -> Self {
        self.format_version = (major, minor);
        self
    }

    /// Sets the commit lock timeout.
    #[must_use]
    pub const fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Sets the commit lock retry interval.
    #[must_use]
    pub const fn lock_retry_interval(mut self, interval: Duration) -> Self {
        self.lock_retry_interval = interval;
        self
    }

    /// Sets the number of session statistics slots.
    #[must_use]
    pub const fn stat_slots(mut self, slots: usize) -> Self {
        self.stat_slots = slots;
        self
    }
}
