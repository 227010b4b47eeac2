//! splatflow - media-to-splat reconstruction pipeline
//!
//! This library turns a video (or a directory of videos or photos) into a
//! trained Gaussian splat model by orchestrating three external tools:
//!
//! - **Sharp Frames** samples sharp frames out of the input media
//! - **COLMAP** reconstructs a sparse camera model and undistorts the images
//! - **LichtFeld Studio** trains the splat model on the reconstruction
//!
//! None of these tools is assumed to be installed. Each is resolved through
//! an ordered fallback chain (configured path, PATH lookup, auto-install into
//! a managed per-user directory), and COLMAP invocations are adapted to the
//! flags the installed version actually supports by probing its help output.
//!
//! # Project Structure
//!
//! - [`toolchain`]: tool resolution, auto-installation and capability probing
//! - [`tools`]: pure command-line builders for the three tools
//! - [`pipeline`]: workspace layout and the staged run loop
//! - [`process`]: blocking subprocess execution with line streaming
//! - [`progress`]: progress events for embedding hosts

pub mod cli;
pub mod config;
pub mod error;
pub mod paths;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod settings;
pub mod toolchain;
pub mod tools;

pub use config::PipelineConfig;
pub use error::{CommandFailedError, ToolNotFoundError, ValidationError};
pub use pipeline::{PipelineResult, SplatPipeline};
pub use progress::{NoOpHandler, ProgressEvent, ProgressHandler, Stage};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
