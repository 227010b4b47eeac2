//! The staged pipeline run loop.
//!
//! Stages run strictly in order, each to completion, on the calling thread:
//! Validate, Ingest, Reconstruct, Export, Train. The first error aborts the
//! run; the workspace is kept for inspection on failure and removed on
//! success unless the job asks to keep intermediates.

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{InputType, PipelineConfig, SelectionMethod};
use crate::error::ValidationError;
use crate::paths::AppPaths;
use crate::process::{CommandRunner, RunOptions, SystemRunner};
use crate::progress::{ProgressEvent, ProgressHandler, Stage};
use crate::settings::SettingsStore;
use crate::toolchain::Toolchain;
use crate::tools::colmap::{
    feature_extractor_cmd, mapper_cmd, matcher_cmd, matcher_subcommand, undistort_cmd,
    ColmapProject,
};
use crate::tools::{LichtfeldTrainArgs, SharpFramesArgs, ToolCommand};

use super::workspace::{copy_images, copy_tree, is_video, list_images, Workspace};

#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub workspace_dir: PathBuf,
    pub output_dir: PathBuf,
}

/// Splits a total frame budget across `n` videos.
///
/// Quotas always sum to exactly `total`: each video gets `total / n` frames
/// and the first `total % n` videos one extra. With fewer frames than videos
/// the tail quotas are zero rather than rounded up.
pub fn split_frame_budget(total: u32, n: usize) -> Vec<u32> {
    let n32 = n as u32;
    let base = total / n32;
    let rem = total % n32;
    (0..n32).map(|i| base + u32::from(i < rem)).collect()
}

/// Drives one media-to-splat run end to end.
pub struct SplatPipeline {
    paths: AppPaths,
    runner: Arc<dyn CommandRunner>,
    settings_store: SettingsStore,
}

impl SplatPipeline {
    pub fn new() -> Result<Self> {
        let paths = AppPaths::new()?;
        Ok(Self::with_parts(paths, Arc::new(SystemRunner)))
    }

    pub fn with_parts(paths: AppPaths, runner: Arc<dyn CommandRunner>) -> Self {
        let settings_store = SettingsStore::new(&paths);
        Self {
            paths,
            runner,
            settings_store,
        }
    }

    pub fn run(
        &self,
        config: &PipelineConfig,
        handler: &dyn ProgressHandler,
    ) -> Result<PipelineResult> {
        // Validation happens before any filesystem state is created, so a
        // bad config never leaves an empty workspace behind.
        handler.on_progress(&ProgressEvent::StageStarted {
            stage: Stage::Validate,
        });
        if let Err(err) = config.validate() {
            handler.on_progress(&ProgressEvent::Failed {
                error: err.to_string(),
            });
            return Err(err.into());
        }

        self.paths.ensure()?;
        let workspace = Workspace::create(&self.paths.jobs_dir(), "splatflow")?;
        let log = RunLog {
            log_path: workspace.log_path(),
            handler,
        };

        match self.run_stages(config, &workspace, &log) {
            Ok(output_dir) => {
                log.stage(Stage::Done);
                log.emit("Done.");
                handler.on_progress(&ProgressEvent::Completed {
                    output_dir: output_dir.clone(),
                });
                if !config.output.keep_intermediates {
                    // Best effort; a busy file must not fail a finished run.
                    let _ = fs::remove_dir_all(workspace.root());
                }
                Ok(PipelineResult {
                    workspace_dir: workspace.root().to_path_buf(),
                    output_dir,
                })
            }
            Err(err) => {
                // The workspace is always kept on failure.
                log.stage(Stage::Failed);
                log.emit(&format!("Error: {:#}", err));
                handler.on_progress(&ProgressEvent::Failed {
                    error: format!("{:#}", err),
                });
                Err(err)
            }
        }
    }

    fn run_stages(
        &self,
        config: &PipelineConfig,
        workspace: &Workspace,
        log: &RunLog<'_>,
    ) -> Result<PathBuf> {
        let settings = self.settings_store.load()?;
        let toolchain = Toolchain::new(self.paths.clone(), settings, self.runner.clone())?;

        let output_root = &config.output.output_dir;
        let run_name = workspace
            .root()
            .file_name()
            .context("Workspace root has no name")?
            .to_owned();
        let output_dir = output_root.join(run_name);
        fs::create_dir_all(&output_dir)
            .with_context(|| format!("Failed to create directory: {}", output_dir.display()))?;

        log.stage(Stage::Ingest);
        self.ingest(config, workspace, &toolchain, log)?;

        log.stage(Stage::Reconstruct);
        self.reconstruct(config, workspace, &toolchain, log)?;

        log.stage(Stage::Export);
        self.export_artifacts(workspace, &output_dir, log)?;

        log.stage(Stage::Train);
        self.train(config, workspace, &toolchain, &output_dir, log)?;

        Ok(output_dir)
    }

    fn list_videos(&self, directory: &Path) -> Result<Vec<PathBuf>> {
        let mut videos = Vec::new();
        let entries = fs::read_dir(directory)
            .with_context(|| format!("Failed to read directory: {}", directory.display()))?;
        for entry in entries {
            let path = entry.context("Failed to read directory entry")?.path();
            if is_video(&path) {
                videos.push(path);
            }
        }
        videos.sort();
        Ok(videos)
    }

    fn ingest(
        &self,
        config: &PipelineConfig,
        workspace: &Workspace,
        toolchain: &Toolchain,
        log: &RunLog<'_>,
    ) -> Result<()> {
        let src = &config.input.path;

        if config.input.input_type == InputType::Video {
            if !config.frame_sampling.enabled {
                return Err(
                    ValidationError("Video input requires frame sampling to be enabled".into())
                        .into(),
                );
            }
            let videos = if src.is_file() {
                vec![src.clone()]
            } else {
                self.list_videos(src)?
            };
            if videos.is_empty() {
                return Err(ValidationError(format!(
                    "No video files found in: {}",
                    src.display()
                ))
                .into());
            }

            let tmp_root = workspace.root().join("tmp_frames");
            if tmp_root.exists() {
                fs::remove_dir_all(&tmp_root)
                    .with_context(|| format!("Failed to clear {}", tmp_root.display()))?;
            }
            fs::create_dir_all(&tmp_root)
                .with_context(|| format!("Failed to create directory: {}", tmp_root.display()))?;

            let n = videos.len();
            log.emit(&format!("Sampling frames from {} video(s)...", n));

            let split_budget = config.frame_sampling.selection_method == SelectionMethod::BestN
                && n > 1;
            let quotas = split_frame_budget(config.frame_sampling.num_frames, n);

            let sampler = toolchain.sharp_frames()?;
            for (i, video) in videos.iter().enumerate() {
                let out_dir = tmp_root.join(format!("v{:03}", i));
                fs::create_dir_all(&out_dir)
                    .with_context(|| format!("Failed to create directory: {}", out_dir.display()))?;

                let mut sampling = config.frame_sampling.clone();
                if split_budget {
                    // A zero quota has nothing to sample; don't invoke the
                    // sampler with a budget it would reject.
                    if quotas[i] == 0 {
                        continue;
                    }
                    sampling.num_frames = quotas[i];
                }

                let args = SharpFramesArgs {
                    input_path: video.clone(),
                    output_dir: out_dir.clone(),
                    input_type: config.input.input_type,
                    config: sampling,
                };
                self.run_command(args.to_command(&sampler), log)?;

                let stem = video
                    .file_stem()
                    .context("Video path has no file stem")?
                    .to_string_lossy()
                    .to_string();
                for (j, image) in list_images(&out_dir)?.iter().enumerate() {
                    let ext = image
                        .extension()
                        .map(|e| e.to_string_lossy().to_lowercase())
                        .unwrap_or_default();
                    let name = format!("{}_{:03}_{:06}.{}", stem, i, j, ext);
                    fs::copy(image, workspace.images_dir().join(name))
                        .with_context(|| format!("Failed to copy {}", image.display()))?;
                }
            }
            return self.ensure_images(workspace, log);
        }

        // images directory
        if config.frame_sampling.enabled {
            let sampler = toolchain.sharp_frames()?;
            let args = SharpFramesArgs {
                input_path: src.clone(),
                output_dir: workspace.images_dir(),
                input_type: config.input.input_type,
                config: config.frame_sampling.clone(),
            };
            self.run_command(args.to_command(&sampler), log)?;
        } else {
            let count = copy_images(src, &workspace.images_dir())?;
            log.emit(&format!("Copied {} images to workspace.", count));
        }
        self.ensure_images(workspace, log)
    }

    fn ensure_images(&self, workspace: &Workspace, log: &RunLog<'_>) -> Result<()> {
        let count = list_images(&workspace.images_dir())?.len();
        if count == 0 {
            return Err(ValidationError(
                "No images found after ingest. If you used iPhone HEIC photos, convert them to JPG/PNG first."
                    .into(),
            )
            .into());
        }
        log.emit(&format!("Using {} images.", count));
        Ok(())
    }

    fn reconstruct(
        &self,
        config: &PipelineConfig,
        workspace: &Workspace,
        toolchain: &Toolchain,
        log: &RunLog<'_>,
    ) -> Result<()> {
        for dir in [workspace.colmap_sparse(), workspace.colmap_undistorted()] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }

        let project = ColmapProject {
            images_dir: workspace.images_dir(),
            database_path: workspace.colmap_db(),
            sparse_dir: workspace.colmap_sparse(),
            undistorted_dir: workspace.colmap_undistorted(),
        };

        let tool = toolchain.colmap()?;
        let extractor_caps = toolchain.colmap_capabilities("feature_extractor");
        let matcher_caps =
            toolchain.colmap_capabilities(matcher_subcommand(config.colmap.matcher));

        let commands = [
            feature_extractor_cmd(&tool, &extractor_caps, &project, &config.colmap),
            matcher_cmd(&tool, &matcher_caps, &project, &config.colmap),
            mapper_cmd(&tool, &project),
            undistort_cmd(&tool, &project, &config.colmap),
        ];
        for command in commands {
            self.run_command(command, log)?;
        }

        if !project.sparse_model_dir().exists() {
            return Err(ValidationError(
                "COLMAP did not produce a sparse model (expected sparse/0). \
                 Try increasing image count, using exhaustive matcher, or improving overlap."
                    .into(),
            )
            .into());
        }
        Ok(())
    }

    fn export_artifacts(
        &self,
        workspace: &Workspace,
        output_dir: &Path,
        log: &RunLog<'_>,
    ) -> Result<()> {
        let dataset_dir = output_dir.join("dataset");
        let images_out = dataset_dir.join("images");
        let colmap_out = dataset_dir.join("colmap");

        if dataset_dir.exists() {
            fs::remove_dir_all(&dataset_dir)
                .with_context(|| format!("Failed to clear {}", dataset_dir.display()))?;
        }
        fs::create_dir_all(&dataset_dir)
            .with_context(|| format!("Failed to create directory: {}", dataset_dir.display()))?;

        copy_tree(&workspace.images_dir(), &images_out)?;
        copy_tree(&workspace.colmap_dir(), &colmap_out)?;
        log.emit(&format!("Exported images to: {}", images_out.display()));
        log.emit(&format!("Exported COLMAP data to: {}", colmap_out.display()));
        Ok(())
    }

    fn train(
        &self,
        config: &PipelineConfig,
        workspace: &Workspace,
        toolchain: &Toolchain,
        output_dir: &Path,
        log: &RunLog<'_>,
    ) -> Result<()> {
        let tool = toolchain.lichtfeld()?;
        let args = LichtfeldTrainArgs {
            data_path: workspace.colmap_undistorted(),
            output_path: output_dir.to_path_buf(),
            config: config.lichtfeld.clone(),
        };
        self.run_command(args.to_command(&tool), log)
    }

    fn run_command(&self, (command, env): ToolCommand, log: &RunLog<'_>) -> Result<()> {
        log.handler.on_progress(&ProgressEvent::CommandStarted {
            command: command.clone(),
        });
        log.emit(&format!("Running: {}", command.join(" ")));
        let options = RunOptions {
            env,
            ..Default::default()
        };
        self.runner
            .run(&command, &options, &mut |line| log.emit(line))
    }
}

/// Fans every emitted line out to the on-disk run log and the progress
/// handler. Log write failures are swallowed so logging can never fail a run.
struct RunLog<'a> {
    log_path: PathBuf,
    handler: &'a dyn ProgressHandler,
}

impl RunLog<'_> {
    fn emit(&self, line: &str) {
        if let Some(parent) = self.log_path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        if let Ok(mut file) = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
        {
            let _ = writeln!(file, "{}", line);
        }
        self.handler.on_progress(&ProgressEvent::Line {
            line: line.to_string(),
        });
    }

    fn stage(&self, stage: Stage) {
        self.emit(&format!("\n=== {} ===", stage));
        self.handler
            .on_progress(&ProgressEvent::StageStarted { stage });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_frame_budget_distributes_remainder_to_front() {
        assert_eq!(split_frame_budget(123, 5), vec![25, 25, 25, 24, 24]);
    }

    #[test]
    fn test_split_frame_budget_sums_to_total() {
        for (total, n) in [(123u32, 5usize), (2, 5), (300, 1), (7, 7), (0, 3), (10, 4)] {
            let quotas = split_frame_budget(total, n);
            assert_eq!(quotas.len(), n);
            assert_eq!(quotas.iter().sum::<u32>(), total, "total={} n={}", total, n);
        }
    }

    #[test]
    fn test_split_frame_budget_fewer_frames_than_videos() {
        // No per-video minimum: quotas past the remainder are zero.
        assert_eq!(split_frame_budget(2, 5), vec![1, 1, 0, 0, 0]);
    }

    #[test]
    fn test_split_frame_budget_even_division() {
        assert_eq!(split_frame_budget(300, 3), vec![100, 100, 100]);
    }
}
