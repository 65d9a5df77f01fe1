//! Integration tests for error handling

use std::io;
use std::time::Duration;

use stereoglyph_core::error::{ResultExt, StereoError};

fn timeout() -> StereoError {
    StereoError::Timeout {
        device: "/dev/video0".to_string(),
        waited: Duration::from_millis(500),
    }
}

#[test]
fn test_error_context_chaining() {
    let base_error = StereoError::resource("driver granted 1 buffer");
    let with_context = base_error.with_context("Initializing capture device /dev/video2");

    let msg = format!("{}", with_context);
    assert!(msg.contains("Initializing capture device /dev/video2"));
    assert!(msg.contains("driver granted 1 buffer"));
}

#[test]
fn test_error_context_preserves_hint() {
    let base_error = StereoError::configuration("camera answered 320x240");
    let hint_before = base_error.user_hint();

    let with_context = base_error.with_context("Opening left camera");
    let hint_after = with_context.user_hint();

    // Hint should be preserved through context
    assert_eq!(hint_before, hint_after);
    assert!(hint_after.is_some());
}

#[test]
fn test_result_ext_context() {
    let result: Result<(), StereoError> = Err(timeout());
    let with_context = result.context("Capturing right eye");

    let err = with_context.unwrap_err();
    let msg = format!("{}", err);
    assert!(msg.contains("Capturing right eye"));
    assert!(msg.contains("/dev/video0"));
    assert!(matches!(err.root(), StereoError::Timeout { .. }));
}

#[test]
fn test_only_timeouts_are_recoverable() {
    assert!(timeout().is_recoverable());
    assert!(timeout().with_context("a").with_context("b").is_recoverable());

    let fatal = [
        StereoError::configuration("x"),
        StereoError::resource("x"),
        StereoError::invalid_frame("x"),
        StereoError::sink("x"),
        StereoError::Unsupported("x".to_string()),
        StereoError::device_io("VIDIOC_DQBUF", io::Error::from(io::ErrorKind::InvalidData)),
    ];
    for err in fatal {
        assert!(!err.is_recoverable(), "{:?}", err);
    }
}

#[test]
fn test_user_hints() {
    assert!(timeout().user_hint().unwrap().contains("camera"));
    assert!(
        StereoError::resource("x")
            .user_hint()
            .unwrap()
            .contains("buffers")
    );

    let denied = StereoError::device_io("open", io::Error::from(io::ErrorKind::PermissionDenied));
    assert!(denied.user_hint().unwrap().contains("video"));

    let missing = StereoError::device_io("open", io::Error::from(io::ErrorKind::NotFound));
    assert!(missing.user_hint().unwrap().contains("list-devices"));

    assert!(StereoError::invalid_frame("x").user_hint().is_none());
}

#[test]
fn test_io_error_conversion() {
    fn write_fails() -> stereoglyph_core::Result<()> {
        Err(io::Error::from(io::ErrorKind::BrokenPipe))?;
        Ok(())
    }
    let err = write_fails().unwrap_err();
    assert!(matches!(err, StereoError::Io(_)));
    assert!(err.to_string().starts_with("I/O error"));
}

#[test]
fn test_device_io_display_names_operation() {
    let err = StereoError::device_io("VIDIOC_STREAMON", io::Error::from_raw_os_error(libc::EINVAL));
    assert!(err.to_string().contains("VIDIOC_STREAMON"));
}
