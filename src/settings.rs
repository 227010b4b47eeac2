//! Persisted user settings for tool resolution.
//!
//! Settings are stored as JSON under the application config directory. The
//! pipeline core only consumes an already-loaded [`Settings`] value; the store
//! here is the thin load/save collaborator around it. A missing settings file
//! yields defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::paths::AppPaths;

/// Explicitly configured tool executables. A configured path is used
/// verbatim; if it does not exist, resolution fails instead of falling back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub colmap: Option<PathBuf>,
    pub lichtfeld: Option<PathBuf>,
}

/// Where auto-installed COLMAP comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColmapSource {
    /// Official release archive from the COLMAP project (Windows only).
    Official,
    /// conda-forge package inside a managed micromamba environment.
    Conda,
}

/// Which official build variant to download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColmapBuild {
    Cuda,
    Nocuda,
}

impl ColmapBuild {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColmapBuild::Cuda => "cuda",
            ColmapBuild::Nocuda => "nocuda",
        }
    }
}

/// How COLMAP should be obtained when it is not found in PATH.
///
/// The official Windows releases ship a `COLMAP.bat` wrapper that sets up the
/// required library paths, so that distribution is preferred by default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColmapInstall {
    pub source: ColmapSource,
    /// Release tag like "3.13.0", or "latest".
    pub version: String,
    pub build: ColmapBuild,
}

impl Default for ColmapInstall {
    fn default() -> Self {
        Self {
            source: ColmapSource::Official,
            version: "latest".to_string(),
            build: ColmapBuild::Cuda,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub tool_paths: ToolPaths,
    pub auto_install_tools: bool,
    pub colmap: ColmapInstall,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tool_paths: ToolPaths::default(),
            auto_install_tools: true,
            colmap: ColmapInstall::default(),
        }
    }
}

/// Loads and saves [`Settings`] under the application config directory.
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(paths: &AppPaths) -> Self {
        Self {
            path: paths.config_dir().join("settings.json"),
        }
    }

    pub fn load(&self) -> Result<Settings> {
        if !self.path.exists() {
            return Ok(Settings::default());
        }
        let data = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse settings file {}", self.path.display()))
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let data =
            serde_json::to_string_pretty(settings).context("Failed to serialize settings")?;
        fs::write(&self.path, data)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
