//! Error taxonomy for pipeline runs.
//!
//! Three failure classes are surfaced to callers: configuration problems
//! ([`ValidationError`]), unresolved external tools ([`ToolNotFoundError`])
//! and nonzero subprocess exits ([`CommandFailedError`]). Everything else
//! (network, filesystem) propagates as a plain `anyhow` error. Nothing is
//! retried; capability probes are the only place an error is swallowed.

use std::fmt;
use thiserror::Error;

/// Malformed or inconsistent job configuration, or missing required input.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

/// No step of a tool's resolution chain produced a usable executable.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ToolNotFoundError(pub String);

/// An external tool exited nonzero.
///
/// Carries the command vector, the exit code and a bounded tail of the
/// interleaved stdout/stderr. The tail is deliberately the only diagnostic
/// payload so that failures of commands that ran for hours stay cheap to
/// report.
#[derive(Debug, Clone)]
pub struct CommandFailedError {
    pub command: Vec<String>,
    pub exit_code: i32,
    pub tail: String,
}

impl fmt::Display for CommandFailedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Command failed ({}): {}",
            self.exit_code,
            self.command.join(" ")
        )?;
        if !self.tail.is_empty() {
            write!(f, "\n\n--- output (tail) ---\n{}", self.tail)?;
        }
        Ok(())
    }
}

impl std::error::Error for CommandFailedError {}
