//! Integration tests for configuration system

use std::path::PathBuf;
use std::time::Duration;

use stereoglyph_core::config::{AcquireStrategy, ConfigFile, StereoConfig, sample_config};
use stereoglyph_core::render::RenderMode;
use stereoglyph_core::types::{FrameGeometry, PixelOrder};
use stereoglyph_core::StereoError;
use tempfile::TempDir;

#[test]
fn test_default_config() {
    let config = StereoConfig::default();
    assert_eq!(config.left_device, "/dev/video2");
    assert_eq!(config.right_device, "/dev/video0");
    assert_eq!(config.geometry, FrameGeometry::new(640, 480));
    assert_eq!(config.pixel_order, PixelOrder::Rgb);
    assert_eq!(config.buffer_count, 4);
    assert_eq!(config.timeout, Duration::from_secs(2));
    assert_eq!(config.fps, 30);
    assert_eq!(config.mode, RenderMode::OptimizedAnaglyph);
    assert_eq!(config.strategy, AcquireStrategy::Sequential);
    assert_eq!(config.acquire_retries, 0);
    assert!(config.monitor);
    assert!(config.raw_output.is_none());
    assert!(config.max_frames.is_none());
    assert!(config.validate_strict().is_ok());
    assert!(config.validate().is_empty());
}

#[test]
fn test_builder_chain() {
    let config = StereoConfig::new("/dev/video4", "/dev/video6")
        .with_geometry(320, 240)
        .with_pixel_order(PixelOrder::Bgr)
        .with_buffer_count(6)
        .with_timeout(Duration::from_millis(500))
        .with_fps(15)
        .with_mode(RenderMode::InterlaceRightLeft)
        .with_strategy(AcquireStrategy::Concurrent)
        .with_acquire_retries(2)
        .with_raw_output("/tmp/out.rgb")
        .with_max_frames(100);

    assert_eq!(config.geometry, FrameGeometry::new(320, 240));
    assert_eq!(config.capture_options().pixel_order, PixelOrder::Bgr);
    assert_eq!(config.capture_options().buffer_count, 6);
    assert_eq!(config.capture_options().timeout, Duration::from_millis(500));
    assert_eq!(config.frame_period(), Duration::from_secs(1) / 15);
    assert_eq!(config.raw_output, Some(PathBuf::from("/tmp/out.rgb")));
    assert_eq!(config.max_frames, Some(100));
}

#[test]
fn test_validate_warnings() {
    let config = StereoConfig::default()
        .with_fps(120)
        .with_timeout(Duration::from_millis(2));
    let warnings = config.validate();
    assert!(warnings.iter().any(|w| w.contains("120 fps")));
    assert!(warnings.iter().any(|w| w.contains("shorter than the frame period")));

    let big = StereoConfig::default().with_geometry(3840, 2160);
    assert_eq!(big.validate().len(), 1);

    let interlace_raw = StereoConfig::default()
        .with_mode(RenderMode::InterlaceLeftRight)
        .with_monitor(false)
        .with_raw_output("-");
    assert!(interlace_raw.validate().iter().any(|w| w.contains("parity")));
}

#[test]
fn test_validate_strict_errors() {
    let base = StereoConfig::default();

    let cases = [
        base.clone().with_geometry(0, 480),
        base.clone().with_fps(0),
        base.clone().with_fps(500),
        base.clone().with_buffer_count(1),
        base.clone().with_timeout(Duration::ZERO),
        StereoConfig::new("/dev/video0", "/dev/video0"),
        base.clone().with_monitor(false),
    ];
    for config in cases {
        let err = config.validate_strict().unwrap_err();
        assert!(
            matches!(err, StereoError::Configuration(_)),
            "unexpected {:?}",
            err
        );
    }

    assert!(
        base.with_monitor(false)
            .with_raw_output("-")
            .validate_strict()
            .is_ok()
    );
}

#[test]
fn test_sample_config_parses() {
    let file = ConfigFile::parse(&sample_config()).unwrap();
    assert_eq!(file.capture.left, "/dev/video2");
    assert_eq!(file.capture.right, "/dev/video0");
    assert_eq!(file.capture.width, 640);
    assert_eq!(file.capture.height, 480);
    assert_eq!(file.capture.timeout_ms, 2000);
    assert_eq!(file.render.mode, RenderMode::OptimizedAnaglyph);
    assert_eq!(file.render.fps, 30);
    assert!(file.output.monitor);
    assert!(file.output.raw_path.is_none());
    assert!(file.hotkeys.enabled);
    assert_eq!(file.hotkeys.cycle_mode, "ctrl+shift+m");

    // the sample mirrors the built-in defaults
    let from_sample = file.to_stereo_config();
    let defaults = StereoConfig::default();
    assert_eq!(from_sample.geometry, defaults.geometry);
    assert_eq!(from_sample.timeout, defaults.timeout);
    assert_eq!(from_sample.buffer_count, defaults.buffer_count);
}

#[test]
fn test_partial_file_uses_defaults() {
    let file = ConfigFile::parse(
        r#"
[capture]
left = "stub://a"
right = "stub://b"
strategy = "concurrent"

[render]
mode = "interlace-lr"
"#,
    )
    .unwrap();

    let config = file.to_stereo_config();
    assert_eq!(config.left_device, "stub://a");
    assert_eq!(config.strategy, AcquireStrategy::Concurrent);
    assert_eq!(config.mode, RenderMode::InterlaceLeftRight);
    assert_eq!(config.fps, 30);
    assert_eq!(config.buffer_count, 4);
    assert_eq!(file.hotkeys.quit, "ctrl+shift+q");
}

#[test]
fn test_unknown_mode_is_parse_error() {
    let err = ConfigFile::parse("[render]\nmode = \"sepia\"\n").unwrap_err();
    assert!(matches!(err, StereoError::Configuration(_)));
}

#[test]
fn test_empty_raw_path_ignored() {
    let file = ConfigFile::parse("[output]\nraw_path = \"\"\n").unwrap();
    assert!(file.to_stereo_config().raw_output.is_none());
}

#[test]
fn test_save_and_load_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut file = ConfigFile::default();
    file.capture.left = "/dev/video4".to_string();
    file.capture.pixel_order = PixelOrder::Bgr;
    file.render.mode = RenderMode::Dubois;
    file.render.fps = 24;
    file.output.raw_path = Some("/dev/video10".to_string());
    file.hotkeys.enabled = false;
    file.save_to(path.clone()).unwrap();

    let loaded = ConfigFile::load_from(path).unwrap();
    assert_eq!(loaded.capture.left, "/dev/video4");
    assert_eq!(loaded.capture.pixel_order, PixelOrder::Bgr);
    assert_eq!(loaded.render.mode, RenderMode::Dubois);
    assert_eq!(loaded.render.fps, 24);
    assert_eq!(loaded.output.raw_path.as_deref(), Some("/dev/video10"));
    assert!(!loaded.hotkeys.enabled);
}

#[test]
fn test_missing_file_gives_defaults() {
    let dir = TempDir::new().unwrap();
    let loaded = ConfigFile::load_from(dir.path().join("absent.toml")).unwrap();
    assert_eq!(loaded.render.fps, 30);
    assert_eq!(loaded.capture.buffers, 4);
}

#[test]
fn test_malformed_file_is_configuration_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[capture\nleft = ").unwrap();
    let err = ConfigFile::load_from(path).unwrap_err();
    assert!(matches!(err, StereoError::Configuration(_)));
    assert!(err.user_hint().is_some());
}

#[test]
fn test_strategy_display_roundtrip() {
    for strategy in [AcquireStrategy::Sequential, AcquireStrategy::Concurrent] {
        assert_eq!(strategy.to_string().parse::<AcquireStrategy>(), Ok(strategy));
    }
}
