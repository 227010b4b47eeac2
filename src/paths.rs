//! Per-user application directories.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "splatflow";

/// Locations for persistent application state.
///
/// Tool installations and per-run job workspaces live under the data
/// directory, settings under the config directory. Tests construct this with
/// explicit overrides so nothing touches the real user directories.
#[derive(Debug, Clone)]
pub struct AppPaths {
    data_dir: PathBuf,
    config_dir: PathBuf,
}

impl AppPaths {
    pub fn new() -> Result<Self> {
        let data_dir = dirs::data_dir()
            .context("Failed to resolve user data directory")?
            .join(APP_DIR_NAME);
        let config_dir = dirs::config_dir()
            .context("Failed to resolve user config directory")?
            .join(APP_DIR_NAME);
        Ok(Self {
            data_dir,
            config_dir,
        })
    }

    pub fn with_overrides(data_dir: PathBuf, config_dir: PathBuf) -> Self {
        Self {
            data_dir,
            config_dir,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn tools_dir(&self) -> PathBuf {
        self.data_dir.join("tools")
    }

    pub fn jobs_dir(&self) -> PathBuf {
        self.data_dir.join("jobs")
    }

    /// Creates all directories, returning `self` for chaining.
    pub fn ensure(&self) -> Result<&Self> {
        for dir in [
            self.data_dir.clone(),
            self.config_dir.clone(),
            self.tools_dir(),
            self.jobs_dir(),
        ] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        Ok(self)
    }
}
