//! End-to-end command construction: resolve a tool through the toolchain,
//! probe its capabilities, and check the exact command the builders emit.

mod support;

use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

use splatflow::config::{ColmapConfig, FrameSamplingConfig, InputType, LichtfeldConfig};
use splatflow::config::{ResizeFactor, Strategy};
use splatflow::settings::{Settings, ToolPaths};
use splatflow::toolchain::Toolchain;
use splatflow::tools::colmap::feature_extractor_cmd;
use splatflow::tools::{ColmapProject, LichtfeldTrainArgs, SharpFramesArgs};

use support::{test_paths, FakeRunner};

fn toolchain(dir: &TempDir, settings: Settings, runner: FakeRunner) -> Toolchain {
    Toolchain::new(test_paths(dir.path()), settings, Arc::new(runner)).unwrap()
}

fn no_install_settings() -> Settings {
    Settings {
        auto_install_tools: false,
        ..Default::default()
    }
}

fn project() -> ColmapProject {
    ColmapProject {
        images_dir: PathBuf::from("images"),
        database_path: PathBuf::from("database.db"),
        sparse_dir: PathBuf::from("sparse"),
        undistorted_dir: PathBuf::from("undistorted"),
    }
}

#[test]
fn sharp_frames_builds_expected_command_for_video() {
    let dir = TempDir::new().unwrap();
    let tc = toolchain(
        &dir,
        no_install_settings(),
        FakeRunner::new(&[("sharp-frames", "/usr/bin/sharp-frames")]),
    );

    let config = FrameSamplingConfig {
        fps: 12,
        num_frames: 123,
        ..Default::default()
    };
    let args = SharpFramesArgs {
        input_path: PathBuf::from("in.mp4"),
        output_dir: PathBuf::from("out"),
        input_type: InputType::Video,
        config,
    };
    let (cmd, _) = args.to_command(&tc.sharp_frames().unwrap());

    assert_eq!(cmd[0], "/usr/bin/sharp-frames");
    assert!(cmd.contains(&"--fps".to_string()));
    assert!(cmd.contains(&"12".to_string()));
    assert!(cmd.contains(&"--num-frames".to_string()));
    assert!(cmd.contains(&"123".to_string()));
}

#[test]
fn feature_extractor_resolves_hybrid_flag_names() {
    let dir = TempDir::new().unwrap();
    let help = "
        --ImageReader.camera_model arg (=SIMPLE_RADIAL)
        --ImageReader.single_camera arg (=0)
        --FeatureExtraction.use_gpu arg (=1)
        --SiftExtraction.max_image_size arg (=3200)
        --SiftExtraction.num_threads arg (=-1)
        --SiftExtraction.max_num_features arg (=8192)
    ";
    let tc = toolchain(
        &dir,
        no_install_settings(),
        FakeRunner::new(&[("colmap", "/usr/bin/colmap")]).with_help("feature_extractor", help),
    );

    let config = ColmapConfig {
        use_gpu: false,
        camera_model: "OPENCV".to_string(),
        max_image_size: 4000,
        ..Default::default()
    };
    let tool = tc.colmap().unwrap();
    let caps = tc.colmap_capabilities("feature_extractor");
    let (cmd, _) = feature_extractor_cmd(&tool, &caps, &project(), &config);

    assert_eq!(cmd[0], "/usr/bin/colmap");
    assert!(cmd.contains(&"feature_extractor".to_string()));
    assert!(cmd.contains(&"--ImageReader.camera_model".to_string()));
    assert!(cmd.contains(&"OPENCV".to_string()));
    // Modern group name for the GPU toggle, legacy names for size/threads.
    assert!(cmd.contains(&"--FeatureExtraction.use_gpu".to_string()));
    assert!(cmd.contains(&"0".to_string()));
    assert!(cmd.contains(&"--SiftExtraction.max_image_size".to_string()));
    assert!(cmd.contains(&"4000".to_string()));
    assert!(cmd.contains(&"--SiftExtraction.num_threads".to_string()));
}

#[test]
fn feature_extractor_uses_modern_group_when_available() {
    let dir = TempDir::new().unwrap();
    let help = "
        --FeatureExtraction.max_image_size arg (=3200)
        --FeatureExtraction.num_threads arg (=-1)
        --FeatureExtraction.use_gpu arg (=1)
        --SiftExtraction.max_num_features arg (=8192)
    ";
    let tc = toolchain(
        &dir,
        no_install_settings(),
        FakeRunner::new(&[("colmap", "/usr/bin/colmap")]).with_help("feature_extractor", help),
    );

    let config = ColmapConfig {
        max_image_size: 1234,
        num_threads: 7,
        ..Default::default()
    };
    let tool = tc.colmap().unwrap();
    let caps = tc.colmap_capabilities("feature_extractor");
    let (cmd, _) = feature_extractor_cmd(&tool, &caps, &project(), &config);

    assert!(cmd.contains(&"--FeatureExtraction.use_gpu".to_string()));
    assert!(cmd.contains(&"--FeatureExtraction.max_image_size".to_string()));
    assert!(cmd.contains(&"1234".to_string()));
    assert!(cmd.contains(&"--FeatureExtraction.num_threads".to_string()));
    assert!(cmd.contains(&"7".to_string()));
}

#[test]
fn feature_extractor_omits_gpu_flag_when_unsupported() {
    let dir = TempDir::new().unwrap();
    let help = "
        --FeatureExtraction.max_image_size arg (=3200)
        --SiftExtraction.max_num_features arg (=8192)
    ";
    let tc = toolchain(
        &dir,
        no_install_settings(),
        FakeRunner::new(&[("colmap", "/usr/bin/colmap")]).with_help("feature_extractor", help),
    );

    let tool = tc.colmap().unwrap();
    let caps = tc.colmap_capabilities("feature_extractor");
    let (cmd, _) = feature_extractor_cmd(&tool, &caps, &project(), &ColmapConfig::default());

    assert!(!cmd.iter().any(|part| part.contains("use_gpu")));
}

#[test]
fn lichtfeld_train_has_required_args() {
    let dir = TempDir::new().unwrap();
    let lf = dir.path().join("LichtFeld-Studio");
    std::fs::write(&lf, "x").unwrap();

    let settings = Settings {
        tool_paths: ToolPaths {
            colmap: None,
            lichtfeld: Some(lf.clone()),
        },
        ..no_install_settings()
    };
    let tc = toolchain(&dir, settings, FakeRunner::new(&[]));

    let config = LichtfeldConfig {
        iterations: 111,
        max_cap: 222,
        strategy: Strategy::Mcmc,
        resize_factor: ResizeFactor::X2,
        ..Default::default()
    };
    let args = LichtfeldTrainArgs {
        data_path: PathBuf::from("dataset"),
        output_path: PathBuf::from("out"),
        config,
    };
    let (cmd, _) = args.to_command(&tc.lichtfeld().unwrap());

    assert_eq!(cmd[0], lf.display().to_string());
    assert!(cmd.contains(&"--data-path".to_string()));
    assert!(cmd.contains(&"dataset".to_string()));
    assert!(cmd.contains(&"--output-path".to_string()));
    assert!(cmd.contains(&"out".to_string()));
    assert!(cmd.contains(&"--iter".to_string()));
    assert!(cmd.contains(&"111".to_string()));
    assert!(cmd.contains(&"--max-cap".to_string()));
    assert!(cmd.contains(&"222".to_string()));
    assert!(cmd.contains(&"--strategy".to_string()));
    assert!(cmd.contains(&"mcmc".to_string()));
    assert!(cmd.contains(&"--resize_factor".to_string()));
    assert!(cmd.contains(&"2".to_string()));
}

#[test]
fn lichtfeld_train_includes_optional_flags_when_enabled() {
    let dir = TempDir::new().unwrap();
    let lf = dir.path().join("LichtFeld-Studio");
    std::fs::write(&lf, "x").unwrap();

    let settings = Settings {
        tool_paths: ToolPaths {
            colmap: None,
            lichtfeld: Some(lf),
        },
        ..no_install_settings()
    };
    let tc = toolchain(&dir, settings, FakeRunner::new(&[]));

    let config = LichtfeldConfig {
        gut: true,
        ppisp_controller: true,
        mip_filter: true,
        ..Default::default()
    };
    let args = LichtfeldTrainArgs {
        data_path: PathBuf::from("dataset"),
        output_path: PathBuf::from("out"),
        config,
    };
    let (cmd, _) = args.to_command(&tc.lichtfeld().unwrap());

    assert!(cmd.contains(&"--gut".to_string()));
    assert!(cmd.contains(&"--ppisp-controller".to_string()));
    assert!(cmd.contains(&"--enable-mip".to_string()));
}
