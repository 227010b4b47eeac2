//! Pipeline orchestration: workspace layout and the staged run loop.

mod orchestrator;
pub mod workspace;

pub use orchestrator::{split_frame_budget, PipelineResult, SplatPipeline};
pub use workspace::Workspace;
