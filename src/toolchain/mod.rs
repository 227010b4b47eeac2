//! Tool resolution: locating, installing and probing the external tools.
//!
//! Each tool is resolved through an ordered fallback chain, first success
//! wins: an explicitly configured path (used verbatim, fatal if missing),
//! a PATH lookup, and finally managed auto-installation. COLMAP auto-installs
//! either from the official release archive (Windows) or into an isolated
//! micromamba environment; LichtFeld Studio is fetched from its GitHub
//! release assets. Every install path writes a marker file after success and
//! treats a stale marker (expected executable missing) as invalid.

pub mod downloads;

use anyhow::{Context, Result};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use tracing::{debug, info, warn};

use crate::error::ToolNotFoundError;
use crate::paths::AppPaths;
use crate::process::{CommandRunner, RunOptions};
use crate::settings::{ColmapSource, Settings};
use downloads::{download_file, extract_tar_bz2_member, extract_zip, find_files, http_client};

const COLMAP_RELEASES_LATEST: &str = "https://github.com/colmap/colmap/releases/latest";
const LICHTFELD_RELEASE_API: &str =
    "https://api.github.com/repos/MrNeRF/LichtFeld-Studio/releases/latest";
const MICROMAMBA_BASE_URL: &str = "https://micro.mamba.pm/api/micromamba";

const INSTALL_MARKER: &str = ".installed";
const ENV_MARKER: &str = ".created";

/// Returns the installed executable when `install_dir` carries a valid
/// install marker. A stale marker (present, but none of `exe_names` found)
/// is removed so the caller falls through to a reinstall.
fn existing_install(install_dir: &Path, exe_names: &[&str]) -> Option<PathBuf> {
    let marker = install_dir.join(INSTALL_MARKER);
    if !marker.exists() {
        return None;
    }
    if let Some(exe) = downloads::find_files(install_dir, exe_names).into_iter().next() {
        return Some(exe);
    }
    warn!(dir = %install_dir.display(), "Install marker present but executable missing, reinstalling");
    let _ = fs::remove_file(&marker);
    None
}

/// A tool ready to invoke: the executable, the full invocation prefix
/// (executable plus any interpreter or shell-wrapper tokens) and an
/// environment overlay such as injected library search paths.
#[derive(Debug, Clone)]
pub struct ResolvedTool {
    pub exe: PathBuf,
    pub prefix: Vec<String>,
    pub env: HashMap<String, String>,
}

impl ResolvedTool {
    /// A plainly invocable executable with no wrapper or environment.
    pub fn direct(exe: PathBuf) -> Self {
        let prefix = vec![exe.display().to_string()];
        Self {
            exe,
            prefix,
            env: HashMap::new(),
        }
    }
}

fn long_flag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\s*--([A-Za-z0-9_.\-]+)\b").unwrap())
}

/// Classifies the current OS/architecture into the tag used for platform
/// specific release assets.
pub fn platform_tag() -> Result<&'static str> {
    match (env::consts::OS, env::consts::ARCH) {
        ("windows", _) => Ok("win-64"),
        ("macos", "aarch64") => Ok("osx-arm64"),
        ("macos", _) => Ok("osx-64"),
        ("linux", "aarch64") => Ok("linux-aarch64"),
        ("linux", _) => Ok("linux-64"),
        (os, arch) => Err(ToolNotFoundError(format!(
            "Unsupported platform for auto-install: {} {}",
            os, arch
        ))
        .into()),
    }
}

fn micromamba_exe_name() -> &'static str {
    if cfg!(windows) {
        "micromamba.exe"
    } else {
        "micromamba"
    }
}

// The Windows micromamba tarball nests the binary under Library/bin.
fn micromamba_member() -> &'static str {
    if cfg!(windows) {
        "Library/bin/micromamba.exe"
    } else {
        "bin/micromamba"
    }
}

fn env_bin_dirs(env_prefix: &Path) -> Vec<PathBuf> {
    if cfg!(windows) {
        vec![env_prefix.join("Library").join("bin"), env_prefix.join("Scripts")]
    } else {
        vec![env_prefix.join("bin")]
    }
}

fn is_batch_script(path: &Path) -> bool {
    cfg!(windows)
        && path
            .extension()
            .map(|ext| {
                let ext = ext.to_string_lossy().to_lowercase();
                ext == "bat" || ext == "cmd"
            })
            .unwrap_or(false)
}

/// Wraps an executable path, adding a `cmd.exe` prefix for Windows batch
/// wrappers so they can be spawned directly.
fn wrap_executable(path: PathBuf) -> ResolvedTool {
    if is_batch_script(&path) {
        let prefix = vec![
            "cmd.exe".to_string(),
            "/c".to_string(),
            path.display().to_string(),
        ];
        ResolvedTool {
            exe: path,
            prefix,
            env: HashMap::new(),
        }
    } else {
        ResolvedTool::direct(path)
    }
}

/// Resolves the three external tools for one pipeline run.
///
/// Capability probes are cached for the lifetime of the instance; executable
/// resolution is not cached and may repeat filesystem/PATH lookups per call.
pub struct Toolchain {
    paths: AppPaths,
    settings: Settings,
    runner: Arc<dyn CommandRunner>,
    capability_cache: Mutex<HashMap<String, HashSet<String>>>,
}

impl Toolchain {
    pub fn new(paths: AppPaths, settings: Settings, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        paths.ensure()?;
        for sub in ["colmap", "envs", "micromamba", "lichtfeld"] {
            let dir = paths.tools_dir().join(sub);
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        Ok(Self {
            paths,
            settings,
            runner,
            capability_cache: Mutex::new(HashMap::new()),
        })
    }

    // -------------------------
    // Micromamba + managed environments
    // -------------------------

    /// Returns the micromamba executable, downloading the platform-tagged
    /// build on first use.
    pub fn ensure_micromamba(&self) -> Result<PathBuf> {
        let mm_dir = self.paths.tools_dir().join("micromamba");
        let exe = mm_dir.join(micromamba_exe_name());
        if exe.exists() {
            return Ok(exe);
        }

        if !self.settings.auto_install_tools {
            return Err(ToolNotFoundError(
                "micromamba not found. Enable auto_install_tools or install micromamba manually."
                    .to_string(),
            )
            .into());
        }

        let tag = platform_tag()?;
        let url = format!("{}/{}/latest", MICROMAMBA_BASE_URL, tag);
        let archive = mm_dir.join("micromamba.tar.bz2");
        download_file(&url, &archive)?;
        extract_tar_bz2_member(&archive, micromamba_member(), &exe)?;
        Ok(exe)
    }

    /// Creates (once) an isolated environment with the given conda-forge
    /// packages. A marker file in the environment directory short-circuits
    /// re-installation on subsequent calls.
    pub fn ensure_env(&self, name: &str, packages: &[&str]) -> Result<PathBuf> {
        let env_prefix = self.paths.tools_dir().join("envs").join(name);
        let marker = env_prefix.join(ENV_MARKER);
        if marker.exists() {
            return Ok(env_prefix);
        }

        if !self.settings.auto_install_tools {
            return Err(ToolNotFoundError(format!(
                "Managed environment '{}' not found. Enable auto_install_tools or install the required tools manually.",
                name
            ))
            .into());
        }

        let micromamba = self.ensure_micromamba()?;
        let root_prefix = self.paths.tools_dir().join("mamba_root");
        fs::create_dir_all(&root_prefix)
            .with_context(|| format!("Failed to create directory: {}", root_prefix.display()))?;

        let mut options = RunOptions::default();
        options.env.insert(
            "MAMBA_ROOT_PREFIX".to_string(),
            root_prefix.display().to_string(),
        );
        let mut command = vec![
            micromamba.display().to_string(),
            "create".to_string(),
            "-y".to_string(),
            "-p".to_string(),
            env_prefix.display().to_string(),
            "-c".to_string(),
            "conda-forge".to_string(),
        ];
        command.extend(packages.iter().map(|p| p.to_string()));

        info!(env = name, "Creating managed environment");
        self.runner
            .run(&command, &options, &mut |line| debug!("{}", line))?;

        fs::create_dir_all(&env_prefix)
            .with_context(|| format!("Failed to create directory: {}", env_prefix.display()))?;
        fs::write(&marker, "ok")
            .with_context(|| format!("Failed to write marker: {}", marker.display()))?;
        Ok(env_prefix)
    }

    fn with_path_overlay(&self, extra_dirs: &[PathBuf]) -> HashMap<String, String> {
        let mut parts: Vec<String> = extra_dirs
            .iter()
            .filter(|dir| dir.exists())
            .map(|dir| dir.display().to_string())
            .collect();
        let existing = env::var("PATH").unwrap_or_default();
        if !existing.is_empty() {
            parts.push(existing);
        }
        let separator = if cfg!(windows) { ";" } else { ":" };
        let mut overlay = HashMap::new();
        overlay.insert("PATH".to_string(), parts.join(separator));
        overlay
    }

    // -------------------------
    // COLMAP
    // -------------------------

    /// Resolves the "latest" release tag by following the redirect from the
    /// upstream release index.
    fn resolve_latest_colmap_release(&self) -> Result<String> {
        static TAG_PATTERN: OnceLock<Regex> = OnceLock::new();
        let pattern = TAG_PATTERN.get_or_init(|| Regex::new(r"/tag/([^/]+)$").unwrap());

        let response = http_client()?
            .get(COLMAP_RELEASES_LATEST)
            .send()
            .context("Failed to query the COLMAP release index")?
            .error_for_status()
            .context("COLMAP release index returned an error")?;

        let final_url = response.url().as_str().trim_end_matches('/').to_string();
        let tag = pattern
            .captures(&final_url)
            .map(|captures| captures[1].to_string())
            .or_else(|| final_url.rsplit('/').next().map(|s| s.to_string()))
            .context("Could not determine the latest COLMAP release tag")?;

        Ok(tag.strip_prefix('v').unwrap_or(&tag).to_string())
    }

    /// Downloads and unpacks the official COLMAP release archive, returning
    /// the path of the `COLMAP.bat` wrapper inside it. Windows only.
    pub fn ensure_colmap_official(&self) -> Result<PathBuf> {
        if env::consts::OS != "windows" {
            return Err(ToolNotFoundError(
                "Official COLMAP auto-download is currently supported on Windows only. \
                 Install COLMAP manually or switch to the conda source."
                    .to_string(),
            )
            .into());
        }

        if !self.settings.auto_install_tools {
            return Err(ToolNotFoundError(
                "COLMAP not found. Enable auto_install_tools or configure the COLMAP path in settings."
                    .to_string(),
            )
            .into());
        }

        let colmap_root = self.paths.tools_dir().join("colmap");
        let mut version = self.settings.colmap.version.trim().to_string();
        if version.is_empty() || version.eq_ignore_ascii_case("latest") {
            version = self.resolve_latest_colmap_release()?;
        }
        let build = self.settings.colmap.build.as_str();

        let asset = format!("colmap-x64-windows-{}.zip", build);
        let install_dir = colmap_root.join(&version).join(build);
        let marker = install_dir.join(INSTALL_MARKER);

        if let Some(existing) = existing_install(&install_dir, &["COLMAP.bat", "colmap.bat"]) {
            return Ok(existing);
        }

        let url = format!(
            "https://github.com/colmap/colmap/releases/download/{}/{}",
            version, asset
        );
        let archive = colmap_root.join(&version).join(&asset);
        download_file(&url, &archive)?;

        if install_dir.exists() {
            fs::remove_dir_all(&install_dir)
                .with_context(|| format!("Failed to clear {}", install_dir.display()))?;
        }
        extract_zip(&archive, &install_dir)?;

        let candidates = find_files(&install_dir, &["COLMAP.bat", "colmap.bat"]);
        let first = candidates.into_iter().next().ok_or_else(|| {
            ToolNotFoundError(
                "Downloaded COLMAP, but could not locate COLMAP.bat in the archive.".to_string(),
            )
        })?;

        fs::write(&marker, "ok")
            .with_context(|| format!("Failed to write marker: {}", marker.display()))?;
        Ok(first)
    }

    /// Resolves the COLMAP executable through the fallback chain.
    pub fn colmap(&self) -> Result<ResolvedTool> {
        // 1) explicit settings path
        if let Some(configured) = &self.settings.tool_paths.colmap {
            if configured.exists() {
                return Ok(wrap_executable(configured.clone()));
            }
            return Err(ToolNotFoundError(format!(
                "Configured COLMAP path does not exist: {}",
                configured.display()
            ))
            .into());
        }

        // 2) PATH
        if let Some(found) = self.runner.which("colmap") {
            return Ok(wrap_executable(found));
        }

        // 3) official release archive
        if self.settings.colmap.source == ColmapSource::Official {
            match self.ensure_colmap_official() {
                Ok(bat) => {
                    let prefix = vec![
                        "cmd.exe".to_string(),
                        "/d".to_string(),
                        "/s".to_string(),
                        "/c".to_string(),
                        bat.display().to_string(),
                    ];
                    return Ok(ResolvedTool {
                        exe: bat,
                        prefix,
                        env: HashMap::new(),
                    });
                }
                Err(err) => {
                    let not_found = err.downcast_ref::<ToolNotFoundError>().is_some();
                    if !not_found || !self.settings.auto_install_tools {
                        return Err(err);
                    }
                    debug!(error = %err, "Official COLMAP unavailable, trying managed environment");
                }
            }
        }

        // 4) managed conda-forge environment
        let env_prefix = self.ensure_env("colmap", &["colmap"])?;
        let micromamba = self.ensure_micromamba()?;
        let overlay = self.with_path_overlay(&env_bin_dirs(&env_prefix));
        let prefix = vec![
            micromamba.display().to_string(),
            "run".to_string(),
            "-p".to_string(),
            env_prefix.display().to_string(),
            "colmap".to_string(),
        ];
        Ok(ResolvedTool {
            exe: PathBuf::from("colmap"),
            prefix,
            env: overlay,
        })
    }

    /// The set of long-flag names the installed COLMAP supports for a
    /// subcommand, discovered from its help output.
    ///
    /// Results are cached per subcommand for the lifetime of this instance.
    /// Probe failures degrade to an empty set: callers must treat "flag
    /// absent" and "capability set empty" identically.
    pub fn colmap_capabilities(&self, subcommand: &str) -> HashSet<String> {
        if let Some(cached) = self
            .capability_cache
            .lock()
            .expect("capability cache poisoned")
            .get(subcommand)
        {
            return cached.clone();
        }

        let options = match self.probe_colmap_options(subcommand) {
            Ok(options) => options,
            Err(err) => {
                debug!(subcommand, error = %err, "Capability probe failed, assuming no options");
                HashSet::new()
            }
        };

        self.capability_cache
            .lock()
            .expect("capability cache poisoned")
            .insert(subcommand.to_string(), options.clone());
        options
    }

    fn probe_colmap_options(&self, subcommand: &str) -> Result<HashSet<String>> {
        let tool = self.colmap()?;
        let mut command = tool.prefix.clone();
        command.push(subcommand.to_string());
        command.push("-h".to_string());

        let options = RunOptions {
            env: tool.env,
            ..Default::default()
        };
        let help = self.runner.run_capture(&command, &options)?;

        let pattern = long_flag_pattern();
        Ok(help
            .lines()
            .filter_map(|line| pattern.captures(line).map(|captures| captures[1].to_string()))
            .collect())
    }

    // -------------------------
    // Sharp Frames
    // -------------------------

    /// Resolves the frame sampler: a `sharp-frames` binary on PATH, or the
    /// Python module run through an interpreter.
    pub fn sharp_frames(&self) -> Result<ResolvedTool> {
        if let Some(found) = self.runner.which("sharp-frames") {
            return Ok(ResolvedTool::direct(found));
        }

        for python in ["python3", "python"] {
            if let Some(interpreter) = self.runner.which(python) {
                let prefix = vec![
                    interpreter.display().to_string(),
                    "-m".to_string(),
                    "sharp_frames".to_string(),
                ];
                return Ok(ResolvedTool {
                    exe: interpreter,
                    prefix,
                    env: HashMap::new(),
                });
            }
        }

        Err(ToolNotFoundError(
            "sharp-frames not found. Install it with pip or make it available on PATH."
                .to_string(),
        )
        .into())
    }

    // -------------------------
    // LichtFeld Studio
    // -------------------------

    /// Resolves the LichtFeld Studio trainer through the fallback chain.
    pub fn lichtfeld(&self) -> Result<ResolvedTool> {
        // 1) explicit settings path
        if let Some(configured) = &self.settings.tool_paths.lichtfeld {
            if configured.exists() {
                return Ok(ResolvedTool::direct(configured.clone()));
            }
            return Err(ToolNotFoundError(format!(
                "Configured LichtFeld path does not exist: {}",
                configured.display()
            ))
            .into());
        }

        // 2) PATH
        for candidate in ["LichtFeld-Studio", "LichtFeld-Studio.exe"] {
            if let Some(found) = self.runner.which(candidate) {
                return Ok(ResolvedTool::direct(found));
            }
        }

        // 3) release-asset auto-download
        if !self.settings.auto_install_tools {
            return Err(ToolNotFoundError(
                "LichtFeld Studio not found. Please install it and configure its path."
                    .to_string(),
            )
            .into());
        }

        let exe = self.download_lichtfeld()?;
        Ok(ResolvedTool::direct(exe))
    }

    fn download_lichtfeld(&self) -> Result<PathBuf> {
        let tool_dir = self.paths.tools_dir().join("lichtfeld");
        fs::create_dir_all(&tool_dir)
            .with_context(|| format!("Failed to create directory: {}", tool_dir.display()))?;

        let marker = tool_dir.join(INSTALL_MARKER);
        let exe_names = ["LichtFeld-Studio.exe", "LichtFeld-Studio"];
        if let Some(existing) = existing_install(&tool_dir, &exe_names) {
            return Ok(existing);
        }

        let tag = platform_tag()?;
        let keywords = lichtfeld_keywords(tag);

        let release: serde_json::Value = http_client()?
            .get(LICHTFELD_RELEASE_API)
            .header("Accept", "application/vnd.github+json")
            .send()
            .context("Failed to query the LichtFeld Studio release API")?
            .error_for_status()
            .context("LichtFeld Studio release API returned an error")?
            .json()
            .context("Failed to parse the LichtFeld Studio release payload")?;

        let assets = release
            .get("assets")
            .and_then(|value| value.as_array())
            .cloned()
            .unwrap_or_default();

        let mut selected: Option<(String, String)> = None;
        for asset in &assets {
            let name = asset
                .get("name")
                .and_then(|value| value.as_str())
                .unwrap_or_default();
            let Some(url) = asset
                .get("browser_download_url")
                .and_then(|value| value.as_str())
            else {
                continue;
            };
            let lower = name.to_lowercase();
            if !lower.ends_with(".zip") {
                continue;
            }
            if keywords.iter().any(|keyword| lower.contains(keyword)) {
                selected = Some((name.to_string(), url.to_string()));
                break;
            }
        }

        let Some((name, url)) = selected else {
            return Err(ToolNotFoundError(
                "Could not auto-download LichtFeld Studio for this platform. \
                 Install it manually and set its path in settings."
                    .to_string(),
            )
            .into());
        };

        let archive = tool_dir.join(&name);
        download_file(&url, &archive)?;

        let extract_dir = tool_dir.join("extracted");
        if extract_dir.exists() {
            fs::remove_dir_all(&extract_dir)
                .with_context(|| format!("Failed to clear {}", extract_dir.display()))?;
        }
        extract_zip(&archive, &extract_dir)?;

        // Some releases wrap the payload in a second archive; recurse one level.
        let inner = walkdir::WalkDir::new(&extract_dir)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .find(|entry| {
                entry.file_type().is_file()
                    && entry
                        .path()
                        .extension()
                        .map(|ext| ext.eq_ignore_ascii_case("zip"))
                        .unwrap_or(false)
            })
            .map(|entry| entry.into_path());

        let mut search_roots = vec![extract_dir.clone()];
        if let Some(inner) = inner {
            let inner_dir = extract_dir.join("inner");
            if inner_dir.exists() {
                fs::remove_dir_all(&inner_dir)
                    .with_context(|| format!("Failed to clear {}", inner_dir.display()))?;
            }
            extract_zip(&inner, &inner_dir)?;
            search_roots.insert(0, inner_dir);
        }

        for root in &search_roots {
            if let Some(exe) = find_files(root, &exe_names).into_iter().next() {
                fs::write(&marker, "ok")
                    .with_context(|| format!("Failed to write marker: {}", marker.display()))?;
                return Ok(exe);
            }
        }

        Err(ToolNotFoundError(
            "Downloaded LichtFeld Studio, but couldn't locate the executable.".to_string(),
        )
        .into())
    }
}

fn lichtfeld_keywords(platform_tag: &str) -> Vec<&'static str> {
    if platform_tag.starts_with("win") {
        vec!["win", "windows", "portable", "x64", "64"]
    } else if platform_tag.starts_with("linux") {
        vec!["linux", "ubuntu", "x64", "64"]
    } else if platform_tag.starts_with("osx") {
        vec!["mac", "osx", "darwin", "arm64", "x64", "64"]
    } else {
        Vec::new()
    }
}
