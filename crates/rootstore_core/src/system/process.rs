//! Subprocess execution.

use crate::error::{CoreError, CoreResult};
use std::process::{Command, Stdio};
use tracing::debug;

/// Runs `parts[0]` with the remaining parts as arguments and waits for it.
///
/// Returns whether the process exited successfully. Output goes to the
/// caller's stdout and stderr.
///
/// # Errors
///
/// `InvalidArgument` if `parts` is empty; an I/O error if the program
/// cannot be started.
pub fn run_command<S: AsRef<str>>(parts: &[S]) -> CoreResult<bool> {
    let (program, args) = parts
        .split_first()
        .ok_or_else(|| CoreError::invalid_argument("command is empty"))?;

    let program: &str = program.as_ref();
    let status = Command::new(program)
        .args(args.iter().map(|arg| -> &str { arg.as_ref() }))
        .stdin(Stdio::null())
        .status()?;

    debug!(program, code = ?status.code(), "command finished");
    Ok(status.success())
}
