//! Download and archive-extraction helpers for tool installation.

use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Fixed timeout for a single download or API call. No retries: a failed
/// download aborts resolution for that tool.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Receipt for a completed fetch.
#[derive(Debug, Clone)]
pub struct DownloadResult {
    pub url: String,
    pub path: PathBuf,
    pub bytes: u64,
}

pub fn http_client() -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .user_agent("splatflow")
        .timeout(DOWNLOAD_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")
}

/// Streams `url` to `dest`, creating parent directories as needed.
pub fn download_file(url: &str, dest: &Path) -> Result<DownloadResult> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    info!(url, dest = %dest.display(), "Downloading");
    let mut response = http_client()?
        .get(url)
        .send()
        .with_context(|| format!("Failed to download {} (check network connectivity)", url))?;
    if !response.status().is_success() {
        bail!("Download failed with HTTP {} from {}", response.status(), url);
    }

    let mut file = File::create(dest)
        .with_context(|| format!("Failed to create file: {}", dest.display()))?;
    let bytes = io::copy(&mut response, &mut file)
        .with_context(|| format!("Failed to write download to {}", dest.display()))?;
    if bytes == 0 {
        bail!("Downloaded file is empty (HTTP 200 but 0 bytes): {}", url);
    }

    debug!(bytes, "Download complete");
    Ok(DownloadResult {
        url: url.to_string(),
        path: dest.to_path_buf(),
        bytes,
    })
}

/// Extracts a single named member of a `.tar.bz2` archive to `dest` and marks
/// it executable.
pub fn extract_tar_bz2_member(archive: &Path, member: &str, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let file = File::open(archive)
        .with_context(|| format!("Failed to open archive: {}", archive.display()))?;
    let mut tar = tar::Archive::new(bzip2::read::BzDecoder::new(file));
    for entry in tar
        .entries()
        .with_context(|| format!("Failed to read tar entries from {}", archive.display()))?
    {
        let mut entry = entry.context("Failed to read tar entry")?;
        let path = entry.path().context("Failed to read tar entry path")?;
        if path.to_str() == Some(member) {
            let mut out = File::create(dest)
                .with_context(|| format!("Failed to create file: {}", dest.display()))?;
            io::copy(&mut entry, &mut out)
                .with_context(|| format!("Failed to extract {} to {}", member, dest.display()))?;
            make_executable(dest)?;
            return Ok(());
        }
    }
    bail!(
        "Archive {} does not contain member {}",
        archive.display(),
        member
    )
}

pub fn extract_zip(archive: &Path, dest_dir: &Path) -> Result<()> {
    fs::create_dir_all(dest_dir)
        .with_context(|| format!("Failed to create directory: {}", dest_dir.display()))?;
    let file = File::open(archive)
        .with_context(|| format!("Failed to open archive: {}", archive.display()))?;
    let mut zip = zip::ZipArchive::new(file)
        .with_context(|| format!("Invalid zip archive: {}", archive.display()))?;
    zip.extract(dest_dir)
        .with_context(|| format!("Failed to extract {} to {}", archive.display(), dest_dir.display()))
}

/// Case-insensitive recursive search for files with any of the given names.
pub fn find_files(root: &Path, names: &[&str]) -> Vec<PathBuf> {
    let wanted: HashSet<String> = names.iter().map(|n| n.to_lowercase()).collect();
    let mut matches: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| wanted.contains(&entry.file_name().to_string_lossy().to_lowercase()))
        .map(|entry| entry.into_path())
        .collect();
    matches.sort();
    matches
}

fn make_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)
            .with_context(|| format!("Failed to stat {}", path.display()))?
            .permissions();
        perms.set_mode(perms.mode() | 0o111);
        fs::set_permissions(path, perms)
            .with_context(|| format!("Failed to chmod {}", path.display()))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_find_files_is_case_insensitive_and_recursive() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("a/b/COLMAP.bat"), "x").unwrap();
        fs::write(dir.path().join("readme.txt"), "x").unwrap();

        let found = find_files(dir.path(), &["colmap.bat"]);
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("a/b/COLMAP.bat"));
    }

    #[test]
    fn test_find_files_empty_when_nothing_matches() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("other.txt"), "x").unwrap();
        assert!(find_files(dir.path(), &["colmap.bat"]).is_empty());
    }

    #[test]
    fn test_extract_tar_bz2_member_missing_member_fails() {
        let dir = TempDir::new().unwrap();

        // Build a tiny tar.bz2 with one unrelated file.
        let archive = dir.path().join("a.tar.bz2");
        let payload = dir.path().join("payload");
        fs::write(&payload, "data").unwrap();
        {
            let file = File::create(&archive).unwrap();
            let encoder = bzip2::write::BzEncoder::new(file, bzip2::Compression::fast());
            let mut builder = tar::Builder::new(encoder);
            builder
                .append_path_with_name(&payload, "other/file")
                .unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }

        let err = extract_tar_bz2_member(&archive, "bin/micromamba", &dir.path().join("out"))
            .unwrap_err();
        assert!(err.to_string().contains("does not contain member"));
    }

    #[test]
    fn test_extract_tar_bz2_member_extracts_named_member() {
        let dir = TempDir::new().unwrap();

        let archive = dir.path().join("a.tar.bz2");
        let payload = dir.path().join("payload");
        fs::write(&payload, "#!/bin/sh\n").unwrap();
        {
            let file = File::create(&archive).unwrap();
            let encoder = bzip2::write::BzEncoder::new(file, bzip2::Compression::fast());
            let mut builder = tar::Builder::new(encoder);
            builder
                .append_path_with_name(&payload, "bin/micromamba")
                .unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }

        let dest = dir.path().join("tools/micromamba");
        extract_tar_bz2_member(&archive, "bin/micromamba", &dest).unwrap();
        assert_eq!(fs::read_to_string(&dest).unwrap(), "#!/bin/sh\n");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&dest).unwrap().permissions().mode();
            assert_ne!(mode & 0o111, 0, "extracted binary should be executable");
        }
    }
}
