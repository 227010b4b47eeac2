//! Command-line builders for the external tools.
//!
//! Builders are pure: they take an already-resolved tool, the probed
//! capability set where relevant, and a configuration, and return the full
//! argument vector plus the environment overlay to run it with. Nothing here
//! touches the filesystem or spawns processes.

pub mod colmap;
pub mod lichtfeld;
pub mod sharp_frames;

pub use colmap::ColmapProject;
pub use lichtfeld::LichtfeldTrainArgs;
pub use sharp_frames::SharpFramesArgs;

use std::collections::HashMap;

/// An argument vector paired with the environment overlay it must run under.
pub type ToolCommand = (Vec<String>, HashMap<String, String>);
