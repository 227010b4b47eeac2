//! Sharp Frames invocation for the ingest stage.

use std::path::PathBuf;

use crate::config::{FrameSamplingConfig, InputType, SelectionMethod};
use crate::toolchain::ResolvedTool;

use super::ToolCommand;

/// One sampler invocation: a single video file or image directory in, a flat
/// directory of selected frames out.
#[derive(Debug, Clone)]
pub struct SharpFramesArgs {
    pub input_path: PathBuf,
    pub output_dir: PathBuf,
    pub input_type: InputType,
    pub config: FrameSamplingConfig,
}

impl SharpFramesArgs {
    /// Builds the sampler command. Exactly one selection-method parameter
    /// pair is emitted, matching the configured method; `--fps` only applies
    /// to video input.
    pub fn to_command(&self, tool: &ResolvedTool) -> ToolCommand {
        let cfg = &self.config;

        let mut cmd = tool.prefix.clone();
        cmd.push(self.input_path.display().to_string());
        cmd.push(self.output_dir.display().to_string());
        cmd.push("--selection-method".to_string());
        cmd.push(cfg.selection_method.as_str().to_string());

        if self.input_type == InputType::Video {
            cmd.push("--fps".to_string());
            cmd.push(cfg.fps.to_string());
        }

        cmd.push("--format".to_string());
        cmd.push(cfg.format.as_str().to_string());
        if cfg.width != 0 {
            cmd.push("--width".to_string());
            cmd.push(cfg.width.to_string());
        }
        if cfg.force_overwrite {
            cmd.push("--force-overwrite".to_string());
        }

        match cfg.selection_method {
            SelectionMethod::BestN => {
                cmd.push("--num-frames".to_string());
                cmd.push(cfg.num_frames.to_string());
                cmd.push("--min-buffer".to_string());
                cmd.push(cfg.min_buffer.to_string());
            }
            SelectionMethod::Batched => {
                cmd.push("--batch-size".to_string());
                cmd.push(cfg.batch_size.to_string());
                cmd.push("--batch-buffer".to_string());
                cmd.push(cfg.batch_buffer.to_string());
            }
            SelectionMethod::OutlierRemoval => {
                cmd.push("--outlier-window-size".to_string());
                cmd.push(cfg.outlier_window_size.to_string());
                cmd.push("--outlier-sensitivity".to_string());
                cmd.push(cfg.outlier_sensitivity.to_string());
            }
        }

        (cmd, tool.env.clone())
    }
}
