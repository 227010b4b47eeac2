use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::{InputType, Matcher, SelectionMethod};

/// Media-to-splat reconstruction pipeline
#[derive(Parser, Debug)]
#[command(
    name = "splatflow",
    about = "Turns videos or photo sets into trained Gaussian splat models",
    version,
    long_about = "splatflow drives the full media-to-splat workflow: frame sampling with \
                  Sharp Frames, sparse reconstruction and undistortion with COLMAP, and \
                  Gaussian splat training with LichtFeld Studio. Missing tools are \
                  auto-installed into a managed per-user directory where possible."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(
        short = 'v',
        long,
        global = true,
        help = "Increase verbosity (can be used multiple times)"
    )]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Run the full pipeline on a video or image directory",
        long_about = "Runs ingest, reconstruction, export and training end to end.\n\n\
                      Examples:\n  \
                      splatflow run clip.mp4\n  \
                      splatflow run ./photos --input-type images\n  \
                      splatflow run clip.mp4 -o ./models --matcher sequential\n  \
                      splatflow run --config job.json"
    )]
    Run(RunArgs),

    #[command(
        about = "Check which external tools can be resolved",
        long_about = "Resolves each external tool (sharp-frames, COLMAP, LichtFeld Studio) \
                      without installing anything and reports what was found.\n\n\
                      Example:\n  \
                      splatflow doctor"
    )]
    Doctor(DoctorArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputTypeArg {
    Video,
    Images,
}

impl From<InputTypeArg> for InputType {
    fn from(value: InputTypeArg) -> Self {
        match value {
            InputTypeArg::Video => InputType::Video,
            InputTypeArg::Images => InputType::Images,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatcherArg {
    Exhaustive,
    Sequential,
}

impl From<MatcherArg> for Matcher {
    fn from(value: MatcherArg) -> Self {
        match value {
            MatcherArg::Exhaustive => Matcher::Exhaustive,
            MatcherArg::Sequential => Matcher::Sequential,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMethodArg {
    BestN,
    Batched,
    OutlierRemoval,
}

impl From<SelectionMethodArg> for SelectionMethod {
    fn from(value: SelectionMethodArg) -> Self {
        match value {
            SelectionMethodArg::BestN => SelectionMethod::BestN,
            SelectionMethodArg::Batched => SelectionMethod::Batched,
            SelectionMethodArg::OutlierRemoval => SelectionMethod::OutlierRemoval,
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    #[arg(
        value_name = "INPUT",
        required_unless_present = "config",
        help = "Video file, directory of videos, or directory of images"
    )]
    pub input: Option<PathBuf>,

    #[arg(
        long,
        value_enum,
        help = "Input kind (inferred from the input path when omitted)"
    )]
    pub input_type: Option<InputTypeArg>,

    #[arg(
        short = 'o',
        long,
        value_name = "DIR",
        default_value = "splatflow-output",
        help = "Directory to place the exported dataset and trained model in"
    )]
    pub output: PathBuf,

    #[arg(
        long,
        value_name = "FILE",
        help = "Full job configuration as JSON; other flags are ignored"
    )]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum, help = "COLMAP matching strategy")]
    pub matcher: Option<MatcherArg>,

    #[arg(long, help = "Disable GPU use in COLMAP")]
    pub no_gpu: bool,

    #[arg(long, value_enum, help = "Frame selection method for sampling")]
    pub selection_method: Option<SelectionMethodArg>,

    #[arg(
        long,
        value_name = "N",
        help = "Total frame budget for best-n sampling (split across videos)"
    )]
    pub num_frames: Option<u32>,

    #[arg(long, help = "Skip frame sampling and use input images as-is")]
    pub no_sampling: bool,

    #[arg(long, value_name = "N", help = "Training iterations")]
    pub iterations: Option<u32>,

    #[arg(long, help = "Delete the run workspace after a successful run")]
    pub discard_intermediates: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct DoctorArgs {
    #[arg(long, help = "Also probe COLMAP subcommand capabilities")]
    pub probe: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run() {
        let args = CliArgs::parse_from(["splatflow", "run", "clip.mp4"]);
        match args.command {
            Commands::Run(run) => {
                assert_eq!(run.input, Some(PathBuf::from("clip.mp4")));
                assert_eq!(run.output, PathBuf::from("splatflow-output"));
                assert!(!run.discard_intermediates);
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_run_requires_input_or_config() {
        assert!(CliArgs::try_parse_from(["splatflow", "run"]).is_err());
        assert!(CliArgs::try_parse_from(["splatflow", "run", "--config", "job.json"]).is_ok());
    }

    #[test]
    fn test_cli_parses_doctor() {
        let args = CliArgs::parse_from(["splatflow", "doctor", "--probe"]);
        match args.command {
            Commands::Doctor(doctor) => assert!(doctor.probe),
            _ => panic!("expected doctor command"),
        }
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(CliArgs::try_parse_from(["splatflow", "-v", "-q", "doctor"]).is_err());
    }

    #[test]
    fn test_run_overrides() {
        let args = CliArgs::parse_from([
            "splatflow",
            "run",
            "clip.mp4",
            "--matcher",
            "sequential",
            "--num-frames",
            "150",
            "--no-gpu",
        ]);
        match args.command {
            Commands::Run(run) => {
                assert_eq!(run.matcher, Some(MatcherArg::Sequential));
                assert_eq!(run.num_frames, Some(150));
                assert!(run.no_gpu);
            }
            _ => panic!("expected run command"),
        }
    }
}
