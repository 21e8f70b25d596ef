//! Process-level collaborators: session statistics and subprocesses.
//!
//! Neither takes part in transactions.

mod process;
mod stats;

pub use process::run_command;
pub use stats::{SessionStats, DEFAULT_STAT_SLOTS};
