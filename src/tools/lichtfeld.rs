//! LichtFeld Studio training invocation.

use std::path::PathBuf;

use crate::config::LichtfeldConfig;
use crate::toolchain::ResolvedTool;

use super::ToolCommand;

#[derive(Debug, Clone)]
pub struct LichtfeldTrainArgs {
    pub data_path: PathBuf,
    pub output_path: PathBuf,
    pub config: LichtfeldConfig,
}

impl LichtfeldTrainArgs {
    // Upstream mixes dash and underscore flag spellings; --resize_factor is
    // the one underscore holdout.
    pub fn to_command(&self, tool: &ResolvedTool) -> ToolCommand {
        let cfg = &self.config;

        let mut cmd = tool.prefix.clone();
        cmd.extend([
            "--data-path".to_string(),
            self.data_path.display().to_string(),
            "--output-path".to_string(),
            self.output_path.display().to_string(),
            "--iter".to_string(),
            cfg.iterations.to_string(),
            "--resize_factor".to_string(),
            cfg.resize_factor.as_str().to_string(),
            "--strategy".to_string(),
            cfg.strategy.as_str().to_string(),
            "--max-cap".to_string(),
            cfg.max_cap.to_string(),
            "--train".to_string(),
            "--no-splash".to_string(),
        ]);

        if cfg.gut {
            cmd.push("--gut".to_string());
        }
        if cfg.ppisp_controller {
            cmd.push("--ppisp-controller".to_string());
        }
        if cfg.mip_filter {
            cmd.push("--enable-mip".to_string());
        }
        if cfg.headless {
            cmd.push("--headless".to_string());
        }
        if cfg.eval {
            cmd.push("--eval".to_string());
        }
        if cfg.save_eval_images {
            cmd.push("--save-eval-images".to_string());
        }
        if cfg.test_every != 0 {
            cmd.push("--test-every".to_string());
            cmd.push(cfg.test_every.to_string());
        }

        (cmd, tool.env.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ResizeFactor, Strategy};

    fn tool() -> ResolvedTool {
        ResolvedTool::direct(PathBuf::from("/opt/LichtFeld-Studio"))
    }

    fn args(config: LichtfeldConfig) -> LichtfeldTrainArgs {
        LichtfeldTrainArgs {
            data_path: PathBuf::from("/ws/colmap/undistorted"),
            output_path: PathBuf::from("/out/model"),
            config,
        }
    }

    fn flag_value(cmd: &[String], flag: &str) -> Option<String> {
        cmd.iter()
            .position(|part| part == flag)
            .and_then(|idx| cmd.get(idx + 1))
            .cloned()
    }

    #[test]
    fn test_default_training_command() {
        let (cmd, _) = args(LichtfeldConfig::default()).to_command(&tool());
        assert_eq!(cmd[0], "/opt/LichtFeld-Studio");
        assert_eq!(flag_value(&cmd, "--iter"), Some("30000".into()));
        assert_eq!(flag_value(&cmd, "--resize_factor"), Some("auto".into()));
        assert_eq!(flag_value(&cmd, "--strategy"), Some("adc".into()));
        assert_eq!(flag_value(&cmd, "--max-cap"), Some("1000000".into()));
        assert!(cmd.contains(&"--train".to_string()));
        assert!(cmd.contains(&"--no-splash".to_string()));
        assert!(cmd.contains(&"--headless".to_string()));
        assert_eq!(flag_value(&cmd, "--test-every"), Some("8".into()));
    }

    #[test]
    fn test_disabled_toggles_are_absent() {
        let (cmd, _) = args(LichtfeldConfig::default()).to_command(&tool());
        for flag in ["--gut", "--ppisp-controller", "--enable-mip", "--eval", "--save-eval-images"] {
            assert!(!cmd.contains(&flag.to_string()), "unexpected {}", flag);
        }
    }

    #[test]
    fn test_enabled_toggles_are_present() {
        let config = LichtfeldConfig {
            gut: true,
            ppisp_controller: true,
            mip_filter: true,
            eval: true,
            save_eval_images: true,
            headless: false,
            ..Default::default()
        };
        let (cmd, _) = args(config).to_command(&tool());
        for flag in ["--gut", "--ppisp-controller", "--enable-mip", "--eval", "--save-eval-images"] {
            assert!(cmd.contains(&flag.to_string()), "missing {}", flag);
        }
        assert!(!cmd.contains(&"--headless".to_string()));
    }

    #[test]
    fn test_strategy_and_resize_spellings() {
        let config = LichtfeldConfig {
            strategy: Strategy::Mcmc,
            resize_factor: ResizeFactor::X4,
            ..Default::default()
        };
        let (cmd, _) = args(config).to_command(&tool());
        assert_eq!(flag_value(&cmd, "--strategy"), Some("mcmc".into()));
        assert_eq!(flag_value(&cmd, "--resize_factor"), Some("4".into()));
    }

    #[test]
    fn test_test_every_zero_is_omitted() {
        let config = LichtfeldConfig {
            test_every: 0,
            ..Default::default()
        };
        let (cmd, _) = args(config).to_command(&tool());
        assert!(!cmd.contains(&"--test-every".to_string()));
    }
}
