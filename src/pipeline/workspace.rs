//! Per-run workspace layout and image file helpers.

use anyhow::{Context, Result};
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Image extensions the pipeline accepts, lowercase. Anything else in an
/// input directory is silently skipped.
pub const IMAGE_EXTS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tif", "tiff", "webp"];

/// Video container extensions accepted as pipeline input, lowercase.
pub const VIDEO_EXTS: &[&str] = &["mp4", "mov", "mkv", "avi", "m4v", "webm"];

/// Whether `path` is a file with one of the accepted video extensions.
pub fn is_video(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .map(|ext| {
                let ext = ext.to_string_lossy().to_lowercase();
                VIDEO_EXTS.contains(&ext.as_str())
            })
            .unwrap_or(false)
}

/// Scratch directory for one pipeline run.
///
/// All intermediate state lives under a single timestamped root so a failed
/// run can be inspected and a successful one removed in one step.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    pub fn colmap_dir(&self) -> PathBuf {
        self.root.join("colmap")
    }

    pub fn colmap_db(&self) -> PathBuf {
        self.colmap_dir().join("database.db")
    }

    pub fn colmap_sparse(&self) -> PathBuf {
        self.colmap_dir().join("sparse")
    }

    pub fn colmap_undistorted(&self) -> PathBuf {
        self.colmap_dir().join("undistorted")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn log_path(&self) -> PathBuf {
        self.logs_dir().join("pipeline.log")
    }

    pub fn ensure(self) -> Result<Self> {
        for dir in [
            self.root.clone(),
            self.images_dir(),
            self.colmap_dir(),
            self.logs_dir(),
        ] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        Ok(self)
    }

    /// Creates a fresh timestamped workspace under `jobs_dir`.
    pub fn create(jobs_dir: &Path, name: &str) -> Result<Self> {
        fs::create_dir_all(jobs_dir)
            .with_context(|| format!("Failed to create directory: {}", jobs_dir.display()))?;
        let safe = name.trim().replace(' ', "_");
        let timestamp = Local::now().format("%Y%m%d-%H%M%S");
        let root = jobs_dir.join(format!("{}-{}", safe, timestamp));
        Workspace { root }.ensure()
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            IMAGE_EXTS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Image files directly inside `directory`, sorted by name. Not recursive.
pub fn list_images(directory: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    let entries = fs::read_dir(directory)
        .with_context(|| format!("Failed to read directory: {}", directory.display()))?;
    for entry in entries {
        let entry = entry.context("Failed to read directory entry")?;
        let path = entry.path();
        if path.is_file() && is_image(&path) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

/// Copies all image files from `src_dir` into `dst_dir`, returning the count.
pub fn copy_images(src_dir: &Path, dst_dir: &Path) -> Result<usize> {
    fs::create_dir_all(dst_dir)
        .with_context(|| format!("Failed to create directory: {}", dst_dir.display()))?;
    let mut count = 0;
    for image in list_images(src_dir)? {
        let name = image
            .file_name()
            .context("Image path has no file name")?
            .to_owned();
        fs::copy(&image, dst_dir.join(&name))
            .with_context(|| format!("Failed to copy {}", image.display()))?;
        count += 1;
    }
    Ok(count)
}

/// Recursively copies `src` into `dst`, preserving relative layout.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry
            .with_context(|| format!("Failed to walk directory: {}", src.display()))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .context("Walked path escapes its root")?;
        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create directory: {}", target.display()))?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
            fs::copy(entry.path(), &target)
                .with_context(|| format!("Failed to copy {}", entry.path().display()))?;
        }
    }
    Ok(())
}
