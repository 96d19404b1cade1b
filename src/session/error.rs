//! Session-level errors.

use thiserror::Error;

use super::SessionResult;
use crate::capture::{ConfigError, ConfigField, DeviceError};

/// Errors that end a session operation.
///
/// Frame timeouts and consumer failures are not here: they are counted in
/// [`SessionResult`] and the loop carries on.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// No camera is present, none matches the selector, or it cannot be
    /// opened.
    #[error("no camera available: {0}")]
    DeviceUnavailable(String),
    /// A configuration field is invalid or outside the device's range.
    #[error("configuration rejected: {field}: {reason}")]
    ConfigRejected {
        /// The rejected field.
        field: ConfigField,
        /// Why it was rejected.
        reason: String,
    },
    /// `run` was called before a configuration was applied.
    #[error("session is not configured")]
    NotConfigured,
    /// The device already has an active stream.
    #[error("device is already streaming")]
    AlreadyStreaming,
    /// The session's device has been closed.
    #[error("session is closed")]
    Closed,
    /// The stream failed. Raised only after the stream and device
    /// acquisition have been stopped; `partial` holds the counts reached.
    #[error("stream failed: {source}")]
    Stream {
        /// The backend failure.
        source: DeviceError,
        /// Counts up to the failure.
        partial: SessionResult,
    },
}

impl SessionError {
    pub(crate) fn config_rejected(error: ConfigError, fallback: ConfigField) -> Self {
        SessionError::ConfigRejected {
            field: error.field().unwrap_or(fallback),
            reason: error.to_string(),
        }
    }

    /// True for the kinds caused by missing or unusable hardware.
    pub fn is_device_unavailable(&self) -> bool {
        matches!(self, SessionError::DeviceUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_rejected_names_field() {
        let err = SessionError::ConfigRejected {
            field: ConfigField::ExposureUs,
            reason: "exposure_us must be positive (got -1)".into(),
        };
        assert!(err.to_string().contains("exposure_us"));
    }

    #[test]
    fn test_stream_error_has_source() {
        use std::error::Error as _;

        let err = SessionError::Stream {
            source: DeviceError::Stream("link lost".into()),
            partial: SessionResult::new(10),
        };
        assert_eq!(err.to_string(), "stream failed: stream error: link lost");
        assert!(err.source().is_some());
    }
}
