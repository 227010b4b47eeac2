//! Command handlers translating CLI arguments into pipeline runs.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::error;

use crate::config::{InputType, PipelineConfig};
use crate::error::{CommandFailedError, ToolNotFoundError, ValidationError};
use crate::paths::AppPaths;
use crate::pipeline::workspace::is_video;
use crate::pipeline::SplatPipeline;
use crate::process::{CommandRunner, SystemRunner};
use crate::progress::{ProgressEvent, ProgressHandler};
use crate::settings::SettingsStore;
use crate::toolchain::Toolchain;

use super::commands::{DoctorArgs, RunArgs};

/// Prints run progress to the terminal. Quiet mode keeps stage headers and
/// the final result but drops per-line tool output.
struct ConsoleHandler {
    quiet: bool,
}

impl ProgressHandler for ConsoleHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::StageStarted { stage } => {
                println!("\n=== {} ===", stage);
            }
            ProgressEvent::Line { line } => {
                if !self.quiet {
                    println!("{}", line);
                }
            }
            ProgressEvent::CommandStarted { .. } => {}
            ProgressEvent::Completed { output_dir } => {
                println!("\nOutput written to: {}", output_dir.display());
            }
            ProgressEvent::Failed { error } => {
                eprintln!("\nError: {}", error);
            }
        }
    }
}

fn infer_input_type(path: &Path) -> InputType {
    if path.is_file() {
        return InputType::Video;
    }
    // A directory counts as video input when it holds at least one video.
    let has_videos = fs::read_dir(path)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .any(|entry| is_video(&entry.path()))
        })
        .unwrap_or(false);
    if has_videos {
        InputType::Video
    } else {
        InputType::Images
    }
}

fn build_config(args: &RunArgs) -> Result<PipelineConfig> {
    if let Some(config_path) = &args.config {
        let data = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file {}", config_path.display()))?;
        return serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse config file {}", config_path.display()));
    }

    let input = args
        .input
        .as_ref()
        .context("An input path is required unless --config is given")?;
    let input_type = args
        .input_type
        .map(InputType::from)
        .unwrap_or_else(|| infer_input_type(input));

    let mut config = PipelineConfig::defaults(input_type, input, &args.output);
    if let Some(matcher) = args.matcher {
        config.colmap.matcher = matcher.into();
    }
    if args.no_gpu {
        config.colmap.use_gpu = false;
    }
    if let Some(method) = args.selection_method {
        config.frame_sampling.selection_method = method.into();
    }
    if let Some(num_frames) = args.num_frames {
        config.frame_sampling.num_frames = num_frames;
    }
    if args.no_sampling {
        config.frame_sampling.enabled = false;
    }
    if let Some(iterations) = args.iterations {
        config.lichtfeld.iterations = iterations;
    }
    if args.discard_intermediates {
        config.output.keep_intermediates = false;
    }
    Ok(config)
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<ValidationError>().is_some() {
        2
    } else if err.downcast_ref::<ToolNotFoundError>().is_some() {
        3
    } else if err.downcast_ref::<CommandFailedError>().is_some() {
        4
    } else {
        1
    }
}

pub fn handle_run(args: &RunArgs, quiet: bool) -> i32 {
    let config = match build_config(args) {
        Ok(config) => config,
        Err(err) => {
            error!("{:#}", err);
            eprintln!("Error: {:#}", err);
            return 2;
        }
    };

    let pipeline = match SplatPipeline::new() {
        Ok(pipeline) => pipeline,
        Err(err) => {
            error!("{:#}", err);
            eprintln!("Error: {:#}", err);
            return 1;
        }
    };

    let handler = ConsoleHandler { quiet };
    match pipeline.run(&config, &handler) {
        Ok(_) => 0,
        Err(err) => {
            error!("{:#}", err);
            exit_code_for(&err)
        }
    }
}

pub fn handle_doctor(args: &DoctorArgs) -> i32 {
    match doctor(args) {
        Ok(all_found) => {
            if all_found {
                0
            } else {
                1
            }
        }
        Err(err) => {
            error!("{:#}", err);
            eprintln!("Error: {:#}", err);
            1
        }
    }
}

fn doctor(args: &DoctorArgs) -> Result<bool> {
    let paths = AppPaths::new()?;
    let mut settings = SettingsStore::new(&paths).load()?;
    // Doctor only reports; it must never trigger an installation.
    settings.auto_install_tools = false;

    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
    let toolchain = Toolchain::new(paths, settings, runner)?;

    let mut all_found = true;

    match toolchain.sharp_frames() {
        Ok(tool) => println!("sharp-frames:     {}", tool.prefix.join(" ")),
        Err(err) => {
            all_found = false;
            println!("sharp-frames:     not found ({})", err);
        }
    }

    let colmap_found = match toolchain.colmap() {
        Ok(tool) => {
            println!("COLMAP:           {}", tool.prefix.join(" "));
            true
        }
        Err(err) => {
            all_found = false;
            println!("COLMAP:           not found ({})", err);
            false
        }
    };

    match toolchain.lichtfeld() {
        Ok(tool) => println!("LichtFeld Studio: {}", tool.prefix.join(" ")),
        Err(err) => {
            all_found = false;
            println!("LichtFeld Studio: not found ({})", err);
        }
    }

    if args.probe && colmap_found {
        for subcommand in [
            "feature_extractor",
            "exhaustive_matcher",
            "sequential_matcher",
            "mapper",
            "image_undistorter",
        ] {
            let capabilities: HashSet<String> = toolchain.colmap_capabilities(subcommand);
            println!("  {}: {} options", subcommand, capabilities.len());
        }
    }

    Ok(all_found)
}
