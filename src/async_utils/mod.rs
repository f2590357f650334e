//! Asynchronous utilities for use with Tokio.
//!
//! Everything we do runs one file at a time, but the model client and our
//! subprocesses are async, so we still need a little glue for blocking work
//! and external commands.

use std::sync::LazyLock;

use regex::Regex;

use crate::prelude::*;

pub mod io;

/// A default error regex for checking command output.
pub static DEFAULT_ERROR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)error").expect("failed to compile regex"));

/// Run a blocking closure on Tokio's blocking thread pool, propagating any
/// panics to the caller.
pub async fn spawn_blocking_propagating_panics<F, T>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(value) => value,
        Err(err) => std::panic::resume_unwind(err.into_panic()),
    }
}

/// Report any command failures, and include any error output.
///
/// The output of standard error and standard output will be logged at
/// appropriate levels. And standard error may be optionally checked against a
/// regex to determine if the command failed.
pub fn check_for_command_failure(
    command_name: &str,
    output: &std::process::Output,
    error_regex: Option<&Regex>,
) -> Result<()> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    debug!(
        command_name = command_name,
        output = %stdout,
        "Standard output from command"
    );
    if !stderr.trim().is_empty() {
        warn!(
            command_name = command_name,
            output = %stderr,
            "Standard error from command",
        );
    }

    if output.status.success() {
        if let Some(regex) = error_regex {
            if regex.is_match(&stderr) {
                return Err(anyhow!(
                    "{} printed error output:\n{}",
                    command_name,
                    stderr,
                ));
            }
        }
        Ok(())
    } else if let Some(exit_code) = output.status.code() {
        Err(anyhow!(
            "{} failed with exit code {} and error output:\n{}",
            command_name,
            exit_code,
            stderr,
        ))
    } else {
        Err(anyhow!(
            "{} failed with error output:\n{}",
            command_name,
            stderr,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::process::Command;

    use super::*;

    #[test]
    fn test_command_failure_reports_exit_code() {
        let output = Command::new("sh")
            .arg("-c")
            .arg("echo oops >&2; exit 3")
            .output()
            .unwrap();
        let err = check_for_command_failure("sh", &output, None).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("exit code 3"), "got: {msg}");
        assert!(msg.contains("oops"), "got: {msg}");
    }

    #[test]
    fn test_command_error_regex() {
        let output = Command::new("sh")
            .arg("-c")
            .arg("echo 'Error: bad page' >&2")
            .output()
            .unwrap();
        assert!(check_for_command_failure("sh", &output, None).is_ok());
        assert!(
            check_for_command_failure("sh", &output, Some(&DEFAULT_ERROR_REGEX)).is_err()
        );
    }
}
