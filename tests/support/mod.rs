//! Shared fakes for integration tests.

use anyhow::{bail, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use splatflow::error::CommandFailedError;
use splatflow::paths::AppPaths;
use splatflow::process::{CommandRunner, RunOptions};

/// Runner that never executes anything: `which` answers from a fixed map and
/// `run_capture` serves canned help text per subcommand. For builder and
/// resolution tests.
pub struct FakeRunner {
    which_map: HashMap<String, PathBuf>,
    help_map: HashMap<String, String>,
}

impl FakeRunner {
    pub fn new(which: &[(&str, &str)]) -> Self {
        Self {
            which_map: which
                .iter()
                .map(|(name, path)| (name.to_string(), PathBuf::from(path)))
                .collect(),
            help_map: HashMap::new(),
        }
    }

    pub fn with_help(mut self, subcommand: &str, help: &str) -> Self {
        self.help_map
            .insert(subcommand.to_string(), help.to_string());
        self
    }
}

impl CommandRunner for FakeRunner {
    fn which(&self, exe: &str) -> Option<PathBuf> {
        self.which_map.get(exe).cloned()
    }

    fn run(
        &self,
        command: &[String],
        _options: &RunOptions,
        _on_line: &mut dyn FnMut(&str),
    ) -> Result<()> {
        bail!("FakeRunner.run should not be called: {:?}", command)
    }

    fn run_capture(&self, command: &[String], _options: &RunOptions) -> Result<String> {
        let subcommand = command
            .iter()
            .position(|part| part == "-h")
            .and_then(|idx| idx.checked_sub(1))
            .and_then(|idx| command.get(idx));
        Ok(subcommand
            .and_then(|sub| self.help_map.get(sub))
            .cloned()
            .unwrap_or_default())
    }
}

/// Runner that records every command and simulates the side effects the
/// pipeline depends on: the mapper creates `sparse/0` and the frame sampler
/// writes fake frames into its output directory.
pub struct RecordingRunner {
    pub commands: Mutex<Vec<Vec<String>>>,
    fail_on: Option<String>,
    mapper_creates_model: bool,
    frames_per_sample: usize,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self {
            commands: Mutex::new(Vec::new()),
            fail_on: None,
            mapper_creates_model: true,
            frames_per_sample: 2,
        }
    }

    /// Makes any command containing `token` fail with exit code 1.
    pub fn failing_on(token: &str) -> Self {
        Self {
            fail_on: Some(token.to_string()),
            ..Self::new()
        }
    }

    /// The mapper exits zero but produces no sparse model, as when
    /// reconstruction diverges on a weak image set.
    pub fn without_mapper_output() -> Self {
        Self {
            mapper_creates_model: false,
            ..Self::new()
        }
    }

    pub fn recorded(&self) -> Vec<Vec<String>> {
        self.commands.lock().unwrap().clone()
    }

    pub fn commands_joined(&self) -> Vec<String> {
        self.recorded().iter().map(|c| c.join(" ")).collect()
    }
}

impl Default for RecordingRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner for RecordingRunner {
    fn which(&self, exe: &str) -> Option<PathBuf> {
        // Pretend every tool is installed.
        match exe {
            "colmap" => Some(PathBuf::from("/usr/bin/colmap")),
            "sharp-frames" => Some(PathBuf::from("/usr/bin/sharp-frames")),
            "LichtFeld-Studio" => Some(PathBuf::from("/usr/bin/LichtFeld-Studio")),
            "LichtFeld-Studio.exe" => Some(PathBuf::from("/usr/bin/LichtFeld-Studio.exe")),
            _ => None,
        }
    }

    fn run(
        &self,
        command: &[String],
        _options: &RunOptions,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<()> {
        self.commands.lock().unwrap().push(command.to_vec());

        if let Some(token) = &self.fail_on {
            if command.iter().any(|part| part.contains(token.as_str())) {
                return Err(CommandFailedError {
                    command: command.to_vec(),
                    exit_code: 1,
                    tail: format!("simulated failure in {}", token),
                }
                .into());
            }
        }

        // Simulate the mapper writing its first model.
        if self.mapper_creates_model && command.iter().any(|part| part == "mapper") {
            if let Some(idx) = command.iter().position(|part| part == "--output_path") {
                let sparse_dir = PathBuf::from(&command[idx + 1]);
                fs::create_dir_all(sparse_dir.join("0"))?;
            }
        }

        // Simulate the frame sampler producing frames: positional args are
        // input then output directory, right after the tool prefix.
        if command[0].contains("sharp-frames") {
            let out_dir = PathBuf::from(&command[2]);
            fs::create_dir_all(&out_dir)?;
            for i in 0..self.frames_per_sample {
                fs::write(out_dir.join(format!("frame_{:04}.jpg", i)), b"fake")?;
            }
        }

        on_line("ok");
        Ok(())
    }

    fn run_capture(&self, _command: &[String], _options: &RunOptions) -> Result<String> {
        // Capability probes see an empty help text.
        Ok(String::new())
    }
}

pub fn test_paths(root: &Path) -> AppPaths {
    AppPaths::with_overrides(root.join("data"), root.join("cfg"))
}
