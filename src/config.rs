//! Job configuration for a pipeline run.
//!
//! A [`PipelineConfig`] is assembled from CLI flags or a JSON job file,
//! validated once at job start and treated as immutable afterwards (the one
//! exception is the per-video frame-budget override the ingest stage applies
//! to a clone of the sampling section). Every sub-configuration validates
//! independently; the aggregate is valid iff all parts are.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Images,
    Video,
}

/// Frame selection strategy understood by the Sharp Frames sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionMethod {
    #[serde(rename = "best-n")]
    BestN,
    #[serde(rename = "batched")]
    Batched,
    #[serde(rename = "outlier-removal")]
    OutlierRemoval,
}

impl SelectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionMethod::BestN => "best-n",
            SelectionMethod::Batched => "batched",
            SelectionMethod::OutlierRemoval => "outlier-removal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpg,
    Png,
}

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Jpg => "jpg",
            ImageFormat::Png => "png",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Matcher {
    Exhaustive,
    Sequential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Adc,
    Mcmc,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Adc => "adc",
            Strategy::Mcmc => "mcmc",
        }
    }
}

/// Image resize factor passed to the trainer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResizeFactor {
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "1")]
    X1,
    #[serde(rename = "2")]
    X2,
    #[serde(rename = "4")]
    X4,
    #[serde(rename = "8")]
    X8,
}

impl ResizeFactor {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResizeFactor::Auto => "auto",
            ResizeFactor::X1 => "1",
            ResizeFactor::X2 => "2",
            ResizeFactor::X4 => "4",
            ResizeFactor::X8 => "8",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    #[serde(rename = "type")]
    pub input_type: InputType,
    pub path: PathBuf,
}

impl InputConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.input_type {
            InputType::Images => {
                if !self.path.is_dir() {
                    return Err(ValidationError(format!(
                        "Input images path must be a directory: {}",
                        self.path.display()
                    )));
                }
            }
            InputType::Video => {
                if !self.path.exists() {
                    return Err(ValidationError(format!(
                        "Input video path does not exist: {}",
                        self.path.display()
                    )));
                }
                if !self.path.is_file() && !self.path.is_dir() {
                    return Err(ValidationError(format!(
                        "Input video path must be a file or directory: {}",
                        self.path.display()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Sharp Frames sampling parameters.
///
/// Only the parameter pair matching `selection_method` is ever emitted on the
/// command line; the other pairs are carried but ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameSamplingConfig {
    pub enabled: bool,
    pub selection_method: SelectionMethod,
    /// Sampling rate for video input, frames per second.
    pub fps: u32,
    pub format: ImageFormat,
    /// Output width in pixels; 0 keeps the native resolution.
    pub width: u32,
    pub force_overwrite: bool,

    // best-n
    pub num_frames: u32,
    pub min_buffer: u32,

    // batched
    pub batch_size: u32,
    pub batch_buffer: u32,

    // outlier removal
    pub outlier_window_size: u32,
    pub outlier_sensitivity: u32,
}

impl Default for FrameSamplingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            selection_method: SelectionMethod::BestN,
            fps: 10,
            format: ImageFormat::Jpg,
            width: 0,
            force_overwrite: false,
            num_frames: 300,
            min_buffer: 3,
            batch_size: 5,
            batch_buffer: 2,
            outlier_window_size: 15,
            outlier_sensitivity: 50,
        }
    }
}

impl FrameSamplingConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.enabled {
            return Ok(());
        }
        if self.fps == 0 {
            return Err(ValidationError(
                "Frame sampling FPS must be > 0".to_string(),
            ));
        }
        match self.selection_method {
            SelectionMethod::BestN => {
                if self.num_frames == 0 {
                    return Err(ValidationError(
                        "num_frames must be > 0 for best-n".to_string(),
                    ));
                }
            }
            SelectionMethod::Batched => {
                if self.batch_size == 0 {
                    return Err(ValidationError(
                        "batch_size must be > 0 for batched".to_string(),
                    ));
                }
            }
            SelectionMethod::OutlierRemoval => {
                if self.outlier_window_size == 0 {
                    return Err(ValidationError(
                        "outlier_window_size must be > 0 for outlier-removal".to_string(),
                    ));
                }
                if self.outlier_sensitivity > 100 {
                    return Err(ValidationError(
                        "outlier_sensitivity must be in [0, 100]".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// COLMAP reconstruction parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColmapConfig {
    pub matcher: Matcher,
    pub use_gpu: bool,
    pub camera_model: String,
    pub single_camera: bool,
    pub max_image_size: u32,

    // advanced
    pub sift_max_num_features: u32,
    pub num_threads: i32,
    /// Only used by the sequential matcher.
    pub sequential_overlap: u32,
}

impl Default for ColmapConfig {
    fn default() -> Self {
        Self {
            matcher: Matcher::Exhaustive,
            use_gpu: true,
            camera_model: "PINHOLE".to_string(),
            single_camera: true,
            max_image_size: 3200,
            sift_max_num_features: 8192,
            num_threads: -1,
            sequential_overlap: 10,
        }
    }
}

impl ColmapConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_image_size == 0 {
            return Err(ValidationError(
                "COLMAP max_image_size must be > 0".to_string(),
            ));
        }
        if self.sift_max_num_features == 0 {
            return Err(ValidationError(
                "COLMAP sift_max_num_features must be > 0".to_string(),
            ));
        }
        if self.matcher == Matcher::Sequential && self.sequential_overlap == 0 {
            return Err(ValidationError(
                "COLMAP sequential_overlap must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// LichtFeld Studio training parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LichtfeldConfig {
    pub iterations: u32,
    pub resize_factor: ResizeFactor,
    pub strategy: Strategy,
    /// Upper bound on the Gaussian count.
    pub max_cap: u32,
    pub headless: bool,

    // advanced feature toggles
    pub gut: bool,
    pub ppisp_controller: bool,
    pub mip_filter: bool,
    pub eval: bool,
    pub save_eval_images: bool,
    pub test_every: u32,
}

impl Default for LichtfeldConfig {
    fn default() -> Self {
        Self {
            iterations: 30_000,
            resize_factor: ResizeFactor::Auto,
            strategy: Strategy::Adc,
            max_cap: 1_000_000,
            headless: true,
            gut: false,
            ppisp_controller: false,
            mip_filter: false,
            eval: false,
            save_eval_images: false,
            test_every: 8,
        }
    }
}

impl LichtfeldConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.iterations == 0 {
            return Err(ValidationError(
                "LichtFeld iterations must be > 0".to_string(),
            ));
        }
        if self.max_cap == 0 {
            return Err(ValidationError("LichtFeld max_cap must be > 0".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub output_dir: PathBuf,
    #[serde(default = "default_keep_intermediates")]
    pub keep_intermediates: bool,
}

fn default_keep_intermediates() -> bool {
    true
}

impl OutputConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.output_dir.exists() && !self.output_dir.is_dir() {
            return Err(ValidationError(format!(
                "Output directory path exists and is not a directory: {}",
                self.output_dir.display()
            )));
        }
        Ok(())
    }
}

/// The full, validated description of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub input: InputConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub frame_sampling: FrameSamplingConfig,
    #[serde(default)]
    pub colmap: ColmapConfig,
    #[serde(default)]
    pub lichtfeld: LichtfeldConfig,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.input.validate()?;
        self.output.validate()?;
        self.frame_sampling.validate()?;
        self.colmap.validate()?;
        self.lichtfeld.validate()
    }

    /// Sensible defaults per input type: video enables sampling and sequential
    /// matching, an image directory skips sampling and matches exhaustively.
    pub fn defaults(input_type: InputType, input_path: &Path, output_dir: &Path) -> Self {
        let mut config = Self {
            input: InputConfig {
                input_type,
                path: input_path.to_path_buf(),
            },
            output: OutputConfig {
                output_dir: output_dir.to_path_buf(),
                keep_intermediates: true,
            },
            frame_sampling: FrameSamplingConfig::default(),
            colmap: ColmapConfig::default(),
            lichtfeld: LichtfeldConfig::default(),
        };
        match input_type {
            InputType::Video => {
                config.frame_sampling.enabled = true;
                config.colmap.matcher = Matcher::Sequential;
            }
            InputType::Images => {
                config.frame_sampling.enabled = false;
                config.colmap.matcher = Matcher::Exhaustive;
            }
        }
        config
    }
}
