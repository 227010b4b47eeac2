//! COLMAP invocations for the reconstruction stage.
//!
//! COLMAP renamed several option groups between releases (SiftExtraction
//! became FeatureExtraction, SiftMatching became FeatureMatching). Builders
//! take the probed capability set for the subcommand and pick the first
//! supported spelling from a preference-ordered candidate list; if no variant
//! is supported the flag is omitted entirely rather than guessed.

use std::collections::HashSet;
use std::path::PathBuf;

use crate::config::{ColmapConfig, Matcher};
use crate::toolchain::ResolvedTool;

use super::ToolCommand;

/// On-disk layout of one COLMAP reconstruction inside a workspace.
#[derive(Debug, Clone)]
pub struct ColmapProject {
    pub images_dir: PathBuf,
    pub database_path: PathBuf,
    pub sparse_dir: PathBuf,
    pub undistorted_dir: PathBuf,
}

impl ColmapProject {
    /// The first (and for this pipeline, only accepted) model produced by the
    /// mapper.
    pub fn sparse_model_dir(&self) -> PathBuf {
        self.sparse_dir.join("0")
    }
}

fn pick_option<'a>(options: &HashSet<String>, candidates: &[&'a str]) -> Option<&'a str> {
    candidates.iter().copied().find(|c| options.contains(*c))
}

fn bool_flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

pub fn feature_extractor_cmd(
    tool: &ResolvedTool,
    options: &HashSet<String>,
    project: &ColmapProject,
    cfg: &ColmapConfig,
) -> ToolCommand {
    let mut cmd = tool.prefix.clone();
    cmd.extend([
        "feature_extractor".to_string(),
        "--database_path".to_string(),
        project.database_path.display().to_string(),
        "--image_path".to_string(),
        project.images_dir.display().to_string(),
        "--ImageReader.camera_model".to_string(),
        cfg.camera_model.clone(),
        "--ImageReader.single_camera".to_string(),
        bool_flag(cfg.single_camera).to_string(),
    ]);

    if let Some(gpu) = pick_option(
        options,
        &["FeatureExtraction.use_gpu", "SiftExtraction.use_gpu"],
    ) {
        cmd.push(format!("--{}", gpu));
        cmd.push(bool_flag(cfg.use_gpu).to_string());
    }

    if let Some(max_size) = pick_option(
        options,
        &[
            "FeatureExtraction.max_image_size",
            "SiftExtraction.max_image_size",
        ],
    ) {
        cmd.push(format!("--{}", max_size));
        cmd.push(cfg.max_image_size.to_string());
    }

    if let Some(threads) = pick_option(
        options,
        &[
            "FeatureExtraction.num_threads",
            "SiftExtraction.num_threads",
        ],
    ) {
        cmd.push(format!("--{}", threads));
        cmd.push(cfg.num_threads.to_string());
    }

    cmd.push("--SiftExtraction.max_num_features".to_string());
    cmd.push(cfg.sift_max_num_features.to_string());

    (cmd, tool.env.clone())
}

/// The COLMAP subcommand that implements the configured matcher.
pub fn matcher_subcommand(matcher: Matcher) -> &'static str {
    match matcher {
        Matcher::Exhaustive => "exhaustive_matcher",
        Matcher::Sequential => "sequential_matcher",
    }
}

pub fn matcher_cmd(
    tool: &ResolvedTool,
    options: &HashSet<String>,
    project: &ColmapProject,
    cfg: &ColmapConfig,
) -> ToolCommand {
    let mut cmd = tool.prefix.clone();
    cmd.extend([
        matcher_subcommand(cfg.matcher).to_string(),
        "--database_path".to_string(),
        project.database_path.display().to_string(),
    ]);

    if let Some(gpu) = pick_option(
        options,
        &["FeatureMatching.use_gpu", "SiftMatching.use_gpu"],
    ) {
        cmd.push(format!("--{}", gpu));
        cmd.push(bool_flag(cfg.use_gpu).to_string());
    }

    if cfg.matcher == Matcher::Sequential && options.contains("SequentialMatching.overlap") {
        cmd.push("--SequentialMatching.overlap".to_string());
        cmd.push(cfg.sequential_overlap.to_string());
    }

    (cmd, tool.env.clone())
}

pub fn mapper_cmd(tool: &ResolvedTool, project: &ColmapProject) -> ToolCommand {
    let mut cmd = tool.prefix.clone();
    cmd.extend([
        "mapper".to_string(),
        "--database_path".to_string(),
        project.database_path.display().to_string(),
        "--image_path".to_string(),
        project.images_dir.display().to_string(),
        "--output_path".to_string(),
        project.sparse_dir.display().to_string(),
    ]);
    (cmd, tool.env.clone())
}

pub fn undistort_cmd(
    tool: &ResolvedTool,
    project: &ColmapProject,
    cfg: &ColmapConfig,
) -> ToolCommand {
    let mut cmd = tool.prefix.clone();
    cmd.extend([
        "image_undistorter".to_string(),
        "--image_path".to_string(),
        project.images_dir.display().to_string(),
        "--input_path".to_string(),
        project.sparse_model_dir().display().to_string(),
        "--output_path".to_string(),
        project.undistorted_dir.display().to_string(),
        "--output_type".to_string(),
        "COLMAP".to_string(),
        "--max_image_size".to_string(),
        cfg.max_image_size.to_string(),
    ]);
    (cmd, tool.env.clone())
}
