//! Blocking subprocess execution with line streaming and bounded tail capture.
//!
//! Every external tool invocation goes through [`CommandRunner`]. The runner
//! merges the caller's environment overlay onto the process environment,
//! collapses stdout and stderr into a single line stream, forwards each line
//! to the caller as it arrives and keeps only the most recent `tail_lines`
//! lines for failure reporting. The trait seam exists so tests can substitute
//! a fake runner and record the commands a pipeline would have executed.

use anyhow::{Context, Result};
use std::collections::{HashMap, VecDeque};
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use tracing::debug;

use crate::error::CommandFailedError;

/// Default number of output lines retained for failure diagnostics.
pub const DEFAULT_TAIL_LINES: usize = 200;

/// Options for a single subprocess invocation.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Working directory for the child process.
    pub cwd: Option<PathBuf>,

    /// Environment overlay, merged on top of the current process environment.
    pub env: HashMap<String, String>,

    /// How many trailing output lines to retain for failure reporting.
    pub tail_lines: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            cwd: None,
            env: HashMap::new(),
            tail_lines: DEFAULT_TAIL_LINES,
        }
    }
}

/// Executes external commands on behalf of the resolver and the pipeline.
pub trait CommandRunner: Send + Sync {
    /// Resolves an executable name to an absolute path via the platform's
    /// standard search mechanism. Returns `None` when not found.
    fn which(&self, exe: &str) -> Option<PathBuf>;

    /// Spawns `command`, streams combined stdout/stderr to `on_line` and
    /// blocks until the process exits. Fails with [`CommandFailedError`] on
    /// nonzero exit, carrying the retained output tail.
    fn run(
        &self,
        command: &[String],
        options: &RunOptions,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<()>;

    /// Same spawning semantics as [`run`](CommandRunner::run), but returns the
    /// full captured output instead of streaming it.
    fn run_capture(&self, command: &[String], options: &RunOptions) -> Result<String> {
        let mut captured = String::new();
        self.run(command, options, &mut |line| {
            captured.push_str(line);
            captured.push('\n');
        })?;
        Ok(captured)
    }
}

/// [`CommandRunner`] backed by real child processes.
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn which(&self, exe: &str) -> Option<PathBuf> {
        which::which(exe).ok()
    }

    fn run(
        &self,
        command: &[String],
        options: &RunOptions,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<()> {
        let (program, args) = command
            .split_first()
            .context("Cannot run an empty command")?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &options.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &options.env {
            cmd.env(key, value);
        }

        debug!(command = %command.join(" "), "Spawning command");
        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn command: {}", program))?;

        let stdout = child.stdout.take().context("Child stdout was not piped")?;
        let stderr = child.stderr.take().context("Child stderr was not piped")?;

        // Two reader threads feed one channel, collapsing both streams into a
        // single sequence ordered by arrival.
        let (tx, rx) = mpsc::channel::<String>();
        let readers = [
            spawn_line_reader(stdout, tx.clone()),
            spawn_line_reader(stderr, tx),
        ];

        let limit = options.tail_lines.max(1);
        let mut tail: VecDeque<String> = VecDeque::with_capacity(limit);
        for line in rx {
            if tail.len() == limit {
                tail.pop_front();
            }
            tail.push_back(line.clone());
            on_line(&line);
        }
        for reader in readers {
            let _ = reader.join();
        }

        let status = child
            .wait()
            .with_context(|| format!("Failed to wait for command: {}", program))?;
        if !status.success() {
            return Err(CommandFailedError {
                command: command.to_vec(),
                exit_code: status.code().unwrap_or(-1),
                tail: tail.into_iter().collect::<Vec<_>>().join("\n"),
            }
            .into());
        }
        Ok(())
    }
}

fn spawn_line_reader<R: Read + Send + 'static>(
    stream: R,
    tx: mpsc::Sender<String>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for line in BufReader::new(stream).lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    })
}
