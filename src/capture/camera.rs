//! Camera abstraction for frame acquisition.
//!
//! Device discovery, property access, and the image stream all live in a
//! vendor SDK or OS driver. These traits are the only contact surface the
//! session has with them, so a backend is swapped by implementing them:
//!
//! - [`DeviceProvider`] enumerates and opens cameras,
//! - [`Device`] is one opened camera and accepts typed [`Setting`]s,
//! - [`Stream`] is the acquisition channel frames are waited on.

use std::fmt;
use std::time::Duration;

use super::{AcquisitionMode, ConfigField, Frame};
use thiserror::Error;

/// Errors reported by a camera backend.
#[derive(Debug, Clone, Error)]
pub enum DeviceError {
    /// The descriptor names no camera this provider knows.
    #[error("camera device not found: {0}")]
    DeviceNotFound(String),
    /// The camera exists but could not be opened.
    #[error("failed to open camera: {0}")]
    OpenFailed(String),
    /// The device refused a property write.
    #[error("{field} rejected by device: {reason}")]
    SettingRejected {
        /// Configuration field the write came from.
        field: ConfigField,
        /// Backend's explanation.
        reason: String,
    },
    /// A second stream was requested while one is alive.
    #[error("device already has an active stream")]
    AlreadyStreaming,
    /// The stream failed; acquisition cannot continue.
    #[error("stream error: {0}")]
    Stream(String),
    /// The device has been closed.
    #[error("camera not open")]
    NotOpen,
}

/// Identifies one enumerated camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Position in the provider's enumeration.
    pub index: usize,
    /// Human-readable device name.
    pub name: String,
    /// Model name reported by the backend.
    pub model: String,
    /// Serial number, or a backend-specific unique id.
    pub serial: String,
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({}, s/n {})", self.index, self.name, self.model, self.serial)
    }
}

/// One typed device property write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Setting {
    /// Single-frame or continuous acquisition.
    AcquisitionMode(AcquisitionMode),
    /// Exposure time in microseconds.
    ExposureTime(f64),
    /// Image width in pixels.
    Width(u32),
    /// Image height in pixels.
    Height(u32),
}

impl Setting {
    /// The [`AcquisitionConfig`](super::AcquisitionConfig) field this setting
    /// comes from.
    pub fn field(&self) -> ConfigField {
        match self {
            Setting::AcquisitionMode(_) => ConfigField::Mode,
            Setting::ExposureTime(_) => ConfigField::ExposureUs,
            Setting::Width(_) => ConfigField::Width,
            Setting::Height(_) => ConfigField::Height,
        }
    }
}

impl fmt::Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Setting::AcquisitionMode(mode) => write!(f, "mode={}", mode),
            Setting::ExposureTime(us) => write!(f, "exposure_us={}", us),
            Setting::Width(w) => write!(f, "width={}", w),
            Setting::Height(h) => write!(f, "height={}", h),
        }
    }
}

/// Enumerates and opens cameras.
pub trait DeviceProvider {
    /// The opened camera type.
    type Device: Device;

    /// Lists the cameras currently available.
    fn enumerate(&mut self) -> Result<Vec<DeviceDescriptor>, DeviceError>;

    /// Opens the camera described by `descriptor`.
    fn open(&mut self, descriptor: &DeviceDescriptor) -> Result<Self::Device, DeviceError>;
}

/// An opened camera.
pub trait Device {
    /// The acquisition stream type created by this device.
    type Stream: Stream;

    /// Returns the descriptor the device was opened from.
    fn descriptor(&self) -> &DeviceDescriptor;

    /// Writes one property to the camera.
    ///
    /// Fails with [`DeviceError::SettingRejected`] if the value is outside
    /// what the camera accepts.
    fn apply(&mut self, setting: Setting) -> Result<(), DeviceError>;

    /// Tells the camera to begin acquiring.
    fn start_acquisition(&mut self) -> Result<(), DeviceError>;

    /// Tells the camera to stop acquiring.
    fn stop_acquisition(&mut self) -> Result<(), DeviceError>;

    /// Creates the acquisition stream.
    ///
    /// Fails with [`DeviceError::AlreadyStreaming`] while another stream
    /// created by this device is still alive.
    fn create_stream(&mut self) -> Result<Self::Stream, DeviceError>;

    /// Releases the camera. Calling it on a closed device is an error the
    /// caller may ignore.
    fn close(&mut self) -> Result<(), DeviceError>;
}

/// An acquisition channel on an opened camera.
///
/// Dropping a stream releases it; a new one may be created afterwards.
pub trait Stream {
    /// Starts delivering frames into the stream.
    fn start(&mut self) -> Result<(), DeviceError>;

    /// Blocks for at most `timeout` waiting for the next frame.
    ///
    /// Returns `Ok(None)` if no frame arrived in time (or the camera dropped
    /// it). Any `Err` means the stream is no longer usable.
    fn wait_for_frame(&mut self, timeout: Duration) -> Result<Option<Frame>, DeviceError>;

    /// Stops delivering frames.
    fn stop(&mut self) -> Result<(), DeviceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setting_fields() {
        assert_eq!(Setting::ExposureTime(1.0).field(), ConfigField::ExposureUs);
        assert_eq!(Setting::Width(1).field(), ConfigField::Width);
        assert_eq!(
            Setting::AcquisitionMode(AcquisitionMode::SingleFrame).to_string(),
            "mode=SingleFrame"
        );
    }

    #[test]
    fn test_setting_rejected_message() {
        let err = DeviceError::SettingRejected {
            field: ConfigField::Width,
            reason: "8192 exceeds maximum 4096".into(),
        };
        assert_eq!(
            err.to_string(),
            "width rejected by device: 8192 exceeds maximum 4096"
        );
    }

    #[test]
    fn test_descriptor_display() {
        let descriptor = DeviceDescriptor {
            index: 0,
            name: "cam0".into(),
            model: "U3-3080CP".into(),
            serial: "4104123456".into(),
        };
        assert_eq!(descriptor.to_string(), "[0] cam0 (U3-3080CP, s/n 4104123456)");
    }
}
