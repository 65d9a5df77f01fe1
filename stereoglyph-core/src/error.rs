//! Error types for Stereoglyph

use std::time::Duration;

use thiserror::Error;

/// Result type alias using StereoError
pub type Result<T> = std::result::Result<T, StereoError>;

/// Main error type for Stereoglyph operations
#[derive(Debug, Error)]
pub enum StereoError {
    /// Device cannot provide the required geometry or pixel format,
    /// or the configuration itself is unusable
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Buffer allocation or mapping failure
    #[error("Resource error: {0}")]
    Resource(String),

    /// A single acquire exceeded its wait budget
    #[error("Timed out after {waited:?} waiting for a frame from {device}")]
    Timeout {
        /// Device identifier
        device: String,
        /// How long we waited
        waited: Duration,
    },

    /// Any other driver call failure
    #[error("Device I/O error during {operation}: {source}")]
    DeviceIo {
        /// The failing driver operation (e.g. "VIDIOC_DQBUF")
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// Frame buffers do not match the expected geometry
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Frame sink rejected a frame
    #[error("Sink error: {0}")]
    Sink(String),

    /// Operation not valid in the current state
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<StereoError>,
    },
}

impl StereoError {
    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a resource error
    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }

    /// Create a device I/O error from the last OS error
    pub fn last_os_error(operation: impl Into<String>) -> Self {
        Self::device_io(operation, std::io::Error::last_os_error())
    }

    /// Create a device I/O error
    pub fn device_io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::DeviceIo {
            operation: operation.into(),
            source,
        }
    }

    /// Create an invalid frame error
    pub fn invalid_frame(msg: impl Into<String>) -> Self {
        Self::InvalidFrame(msg.into())
    }

    /// Create a sink error
    pub fn sink(msg: impl Into<String>) -> Self {
        Self::Sink(msg.into())
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, with all context layers stripped
    pub fn root(&self) -> &StereoError {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the caller may retry the operation that produced this error
    ///
    /// Only timeouts qualify; everything else is fatal for the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self.root(), Self::Timeout { .. })
    }

    /// An actionable hint for the user, if there is one
    pub fn user_hint(&self) -> Option<&'static str> {
        match self.root() {
            Self::Configuration(_) => Some(
                "Check that the camera supports the configured resolution and pixel format \
                 (v4l2-ctl --list-formats-ext), or adjust ~/.config/stereoglyph/config.toml",
            ),
            Self::Resource(_) => Some(
                "The driver could not provide enough capture buffers; close other \
                 applications using the camera or lower capture.buffers",
            ),
            Self::Timeout { .. } => Some(
                "The camera produced no frame in time; check the cable and that the \
                 device is not in use elsewhere",
            ),
            Self::DeviceIo { source, .. }
                if source.kind() == std::io::ErrorKind::PermissionDenied =>
            {
                Some("Add your user to the 'video' group to access /dev/video* devices")
            }
            Self::DeviceIo { .. } => Some("Run 'stereoglyph list-devices' to verify the device paths"),
            _ => None,
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_strips_context() {
        let err = StereoError::resource("mmap failed")
            .with_context("Mapping buffer 2")
            .with_context("Initializing left camera");
        assert!(matches!(err.root(), StereoError::Resource(_)));
    }

    #[test]
    fn test_permission_hint() {
        let err = StereoError::device_io(
            "open",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert!(err.user_hint().unwrap().contains("video"));
    }
}
