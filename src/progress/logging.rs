//! Logging-based progress handler

use super::{ProgressEvent, ProgressHandler};
use tracing::{debug, info, warn};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::StageStarted { stage } => {
                info!(stage = %stage, "Starting stage");
            }
            ProgressEvent::Line { line } => {
                debug!("{}", line);
            }
            ProgressEvent::CommandStarted { command } => {
                debug!(command = %command.join(" "), "Running command");
            }
            ProgressEvent::Completed { output_dir } => {
                info!(output_dir = %output_dir.display(), "Pipeline complete");
            }
            ProgressEvent::Failed { error } => {
                warn!(error = %error, "Pipeline failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::Stage;
    use std::path::PathBuf;

    #[test]
    fn test_logging_all_events() {
        let handler = LoggingHandler;

        // Test all event types to ensure they don't panic
        let events = vec![
            ProgressEvent::StageStarted {
                stage: Stage::Validate,
            },
            ProgressEvent::Line {
                line: "Sampling frames from 2 video(s)...".to_string(),
            },
            ProgressEvent::CommandStarted {
                command: vec!["colmap".to_string(), "mapper".to_string()],
            },
            ProgressEvent::Completed {
                output_dir: PathBuf::from("/out"),
            },
            ProgressEvent::Failed {
                error: "Test error".to_string(),
            },
        ];

        for event in events {
            handler.on_progress(&event);
        }
    }
}
