//! Stress tests for rootstore.
//!
//! Many sessions committing against one store, each on its own thread,
//! retrying on commit conflicts the way an application would.

use rootstore_core::{CoreError, CoreResult, PersistentStore, SessionView, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Root key incremented by [`stress_concurrent_increments`].
pub const COUNTER_KEY: &str = "counter";

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Commits rejected with a conflict and retried.
    pub conflicts: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            conflicts: 0,
            duration,
            ops_per_second,
        }
    }

    /// Sets the conflict count.
    #[must_use]
    pub fn with_conflicts(mut self, conflicts: usize) -> Self {
        self.conflicts = conflicts;
        self
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Conflicts retried: {}", self.conflicts);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations to perform.
    pub operations: usize,
    /// Number of concurrent sessions, one thread each.
    pub threads: usize,
    /// Number of distinct root keys written.
    pub key_count: usize,
    /// Attempts per operation before it counts as failed.
    pub max_attempts: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 1_000,
            threads: 4,
            key_count: 16,
            max_attempts: 1_000,
        }
    }
}

/// Runs `body` in a persistent scope and commits, refreshing and retrying
/// while the commit conflicts. Returns the number of conflicts seen.
///
/// # Errors
///
/// The first error that is not a conflict, or the last conflict once
/// `max_attempts` is used up.
pub fn commit_with_retry<F>(
    session: &mut SessionView,
    max_attempts: usize,
    mut body: F,
) -> CoreResult<usize>
where
    F: FnMut(&mut SessionView) -> CoreResult<()>,
{
    let mut conflicts = 0;
    loop {
        session.refresh()?;
        let result = session.enter_persistent(|s| {
            body(s)?;
            s.commit_transaction()
        });
        match result {
            Ok(_) => return Ok(conflicts),
            Err(CoreError::CommitConflict { .. }) if conflicts + 1 < max_attempts => {
                conflicts += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// One session writing keys round-robin, one commit per write.
pub fn stress_sequential_commits(store: &Arc<PersistentStore>, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    let Ok(mut session) = store.session() else {
        return StressTestResult::new(0, config.operations, start.elapsed());
    };
    for i in 0..config.operations {
        let key = format!("key_{}", i % config.key_count.max(1));
        let value = i as i64;
        match session.enter_persistent(|s| {
            s.write(key.as_str(), value)?;
            s.commit_transaction()
        }) {
            Ok(_) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Sessions on separate threads incrementing one shared counter.
///
/// Every increment reads the counter and writes it back, so a lost update
/// would leave the final count below `successful_ops`.
pub fn stress_concurrent_increments(store: Arc<PersistentStore>, config: &StressConfig) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let conflicts = Arc::new(AtomicUsize::new(0));
    let threads = config.threads.max(1);
    let ops_per_thread = config.operations / threads;

    let start = Instant::now();

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let store = Arc::clone(&store);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let conflicts = Arc::clone(&conflicts);
            let max_attempts = config.max_attempts;

            thread::spawn(move || {
                let Ok(mut session) = store.session() else {
                    failed.fetch_add(ops_per_thread, Ordering::Relaxed);
                    return;
                };
                for _ in 0..ops_per_thread {
                    let result = commit_with_retry(&mut session, max_attempts, |s| {
                        let current = s
                            .read(COUNTER_KEY)
                            .and_then(|v| v.as_integer())
                            .unwrap_or(0);
                        s.write(COUNTER_KEY, current + 1)
                    });
                    match result {
                        Ok(seen) => {
                            conflicts.fetch_add(seen, Ordering::Relaxed);
                            successful.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(_) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
    .with_conflicts(conflicts.load(Ordering::Relaxed))
}

/// Sessions on separate threads each writing their own keys. Nothing
/// overlaps, so no commit should conflict.
pub fn stress_disjoint_writers(store: Arc<PersistentStore>, config: &StressConfig) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let conflicts = Arc::new(AtomicUsize::new(0));
    let threads = config.threads.max(1);
    let ops_per_thread = config.operations / threads;

    let start = Instant::now();

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let store = Arc::clone(&store);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let conflicts = Arc::clone(&conflicts);
            let max_attempts = config.max_attempts;

            thread::spawn(move || {
                let Ok(mut session) = store.session() else {
                    failed.fetch_add(ops_per_thread, Ordering::Relaxed);
                    return;
                };
                for i in 0..ops_per_thread {
                    let key = format!("writer_{t}");
                    let value = Value::from(i as i64);
                    match commit_with_retry(&mut session, max_attempts, |s| {
                        s.write(key.as_str(), value.clone())
                    }) {
                        Ok(seen) => {
                            conflicts.fetch_add(seen, Ordering::Relaxed);
                            successful.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(_) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
    .with_conflicts(conflicts.load(Ordering::Relaxed))
}

/// Alternates committed scopes with scopes that fail on purpose.
pub fn stress_scope_aborts(store: &Arc<PersistentStore>, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    let Ok(mut session) = store.session() else {
        return StressTestResult::new(0, config.operations, start.elapsed());
    };
    for i in 0..config.operations {
        let key = format!("key_{}", i % config.key_count.max(1));
        let should_fail = i % 2 == 0;

        let result = session.enter_persistent(|s| {
            s.write(key.as_str(), i as i64)?;
            if should_fail {
                Err(CoreError::invalid_operation("intentional"))
            } else {
                s.commit_transaction().map(|_| ())
            }
        });

        match result {
            Ok(()) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}
