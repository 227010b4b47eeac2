//! Progress handler trait and events

use std::fmt;
use std::path::PathBuf;

/// The stages of a pipeline run, in execution order. `Done` and `Failed` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validate,
    Ingest,
    Reconstruct,
    Export,
    Train,
    Done,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validate => "Validate",
            Stage::Ingest => "Ingest",
            Stage::Reconstruct => "Reconstruct",
            Stage::Export => "Export",
            Stage::Train => "Train",
            Stage::Done => "Done",
            Stage::Failed => "Failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events emitted during a pipeline run
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A stage began
    StageStarted { stage: Stage },

    /// One line of merged tool output, or a pipeline status line
    Line { line: String },

    /// A tool command is about to run
    CommandStarted { command: Vec<String> },

    /// Run completed successfully
    Completed { output_dir: PathBuf },

    /// Run failed
    Failed { error: String },
}

/// Trait for handling progress events during a pipeline run
pub trait ProgressHandler: Send + Sync {
    /// Called when a progress event occurs
    fn on_progress(&self, event: &ProgressEvent);
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ProgressEvent) {
        // Intentionally empty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingHandler {
        count: Arc<AtomicUsize>,
    }

    impl ProgressHandler for CountingHandler {
        fn on_progress(&self, _event: &ProgressEvent) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_noop_handler() {
        let handler = NoOpHandler;
        handler.on_progress(&ProgressEvent::StageStarted {
            stage: Stage::Ingest,
        });
        // Should not panic or do anything
    }

    #[test]
    fn test_progress_events() {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = CountingHandler {
            count: count.clone(),
        };

        handler.on_progress(&ProgressEvent::StageStarted {
            stage: Stage::Validate,
        });
        handler.on_progress(&ProgressEvent::Line {
            line: "Using 42 images.".to_string(),
        });
        handler.on_progress(&ProgressEvent::Completed {
            output_dir: PathBuf::from("/out"),
        });

        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Reconstruct.to_string(), "Reconstruct");
        assert_eq!(Stage::Done.to_string(), "Done");
    }
}
