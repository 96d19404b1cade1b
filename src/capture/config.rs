//! Acquisition configuration.
//!
//! Device properties are set through a typed [`AcquisitionConfig`] rather
//! than a string-keyed node map, so a misspelled property name is a compile
//! error instead of a runtime failure on the camera.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use super::Setting;

/// How the device produces frames once acquisition starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionMode {
    /// The device delivers one frame and then idles.
    SingleFrame,
    /// The device delivers frames until acquisition is stopped.
    #[default]
    Continuous,
}

impl fmt::Display for AcquisitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquisitionMode::SingleFrame => f.write_str("SingleFrame"),
            AcquisitionMode::Continuous => f.write_str("Continuous"),
        }
    }
}

/// Names a single [`AcquisitionConfig`] field in errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigField {
    /// [`AcquisitionConfig::mode`]
    Mode,
    /// [`AcquisitionConfig::exposure_us`]
    ExposureUs,
    /// [`AcquisitionConfig::width`]
    Width,
    /// [`AcquisitionConfig::height`]
    Height,
}

impl fmt::Display for ConfigField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConfigField::Mode => "mode",
            ConfigField::ExposureUs => "exposure_us",
            ConfigField::Width => "width",
            ConfigField::Height => "height",
        };
        f.write_str(name)
    }
}

/// Camera settings applied before the stream starts.
///
/// Once a stream is running the session holds the config immutably; to
/// change it the stream has to be stopped first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Acquisition mode.
    pub mode: AcquisitionMode,
    /// Exposure time in microseconds.
    pub exposure_us: f64,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            mode: AcquisitionMode::Continuous,
            exposure_us: 20_000.0, // 20ms
            width: 1920,
            height: 1080,
        }
    }
}

impl AcquisitionConfig {
    /// Creates a new configuration with the specified dimensions.
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Checks the device-independent constraints on every field.
    ///
    /// Range checks against a particular camera happen when the settings are
    /// applied to it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.exposure_us.is_finite() || self.exposure_us <= 0.0 {
            return Err(ConfigError::NotPositive {
                field: ConfigField::ExposureUs,
                value: self.exposure_us.to_string(),
            });
        }
        if self.width == 0 {
            return Err(ConfigError::NotPositive {
                field: ConfigField::Width,
                value: "0".into(),
            });
        }
        if self.height == 0 {
            return Err(ConfigError::NotPositive {
                field: ConfigField::Height,
                value: "0".into(),
            });
        }
        Ok(())
    }

    /// The settings in the order they are written to the device.
    ///
    /// Mode goes first because some cameras reset exposure limits when the
    /// acquisition mode changes.
    pub fn settings(&self) -> [Setting; 4] {
        [
            Setting::AcquisitionMode(self.mode),
            Setting::ExposureTime(self.exposure_us),
            Setting::Width(self.width),
            Setting::Height(self.height),
        ]
    }
}

/// Picks which enumerated device a session opens.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeviceSelector {
    /// The first device reported by the provider.
    #[default]
    First,
    /// The device at this enumeration index.
    Index(usize),
    /// The device whose name or serial number matches.
    Name(String),
}

impl FromStr for DeviceSelector {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("first") {
            return Ok(DeviceSelector::First);
        }
        Ok(match s.parse::<usize>() {
            Ok(index) => DeviceSelector::Index(index),
            Err(_) => DeviceSelector::Name(s.to_string()),
        })
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSelector::First => f.write_str("first"),
            DeviceSelector::Index(i) => write!(f, "{}", i),
            DeviceSelector::Name(name) => f.write_str(name),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// A numeric field is zero, negative, or not finite.
    #[error("{field} must be positive (got {value})")]
    NotPositive {
        /// The offending field.
        field: ConfigField,
        /// The value as written.
        value: String,
    },
    /// The per-frame timeout is zero.
    #[error("frame timeout must be at least 1 ms")]
    InvalidTimeout,
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    /// The file is not valid TOML for this format.
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

impl ConfigError {
    /// The offending field, if the error is about one.
    pub fn field(&self) -> Option<ConfigField> {
        match self {
            ConfigError::NotPositive { field, .. } => Some(*field),
            _ => None,
        }
    }
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// `[device]`: which camera to open.
    #[serde(default)]
    pub device: DeviceConfig,
    /// `[acquisition]`: settings written to the camera.
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    /// `[run]`: frame count and per-frame timeout.
    #[serde(default)]
    pub run: RunConfig,
    /// `[output]`: where frames and metrics go.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Device selection section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// `"first"`, an enumeration index, or a device name/serial.
    pub selector: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            selector: "first".into(),
        }
    }
}

impl DeviceConfig {
    /// Parses the selector string.
    pub fn selector(&self) -> DeviceSelector {
        match self.selector.parse() {
            Ok(selector) => selector,
            Err(never) => match never {},
        }
    }
}

/// Capture loop bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Number of frame waits performed by one session.
    pub frame_count: u32,
    /// Maximum time to wait for each frame, in milliseconds.
    pub frame_timeout_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            frame_count: 300,
            frame_timeout_ms: 1000,
        }
    }
}

impl RunConfig {
    /// Per-frame timeout as a [`Duration`].
    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    /// Validates the loop bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputConfig {
    /// Directory captured frames are written to. Frames are only logged when
    /// unset.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// Metrics server port (0 to disable).
    #[serde(default)]
    pub metrics_port: u16,
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.acquisition.validate()?;
        config.run.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = AcquisitionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.mode, AcquisitionMode::Continuous);
        assert_eq!((config.width, config.height), (1920, 1080));
    }

    #[test]
    fn test_negative_exposure_names_field() {
        let config = AcquisitionConfig {
            exposure_us: -1.0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.field(), Some(ConfigField::ExposureUs));
        assert!(err.to_string().contains("exposure_us"));
    }

    #[test]
    fn test_nan_exposure_invalid() {
        let config = AcquisitionConfig {
            exposure_us: f64::NAN,
            ..Default::default()
        };
        assert_eq!(config.validate().unwrap_err().field(), Some(ConfigField::ExposureUs));
    }

    #[test]
    fn test_zero_dimensions_invalid() {
        let config = AcquisitionConfig::with_dimensions(640, 0);
        assert_eq!(config.validate().unwrap_err().field(), Some(ConfigField::Height));

        let config = AcquisitionConfig::with_dimensions(0, 480);
        assert_eq!(config.validate().unwrap_err().field(), Some(ConfigField::Width));
    }

    #[test]
    fn test_settings_order() {
        let config = AcquisitionConfig::with_dimensions(64, 48);
        let fields: Vec<_> = config.settings().iter().map(|s| s.field()).collect();
        assert_eq!(
            fields,
            vec![
                ConfigField::Mode,
                ConfigField::ExposureUs,
                ConfigField::Width,
                ConfigField::Height
            ]
        );
    }

    #[test]
    fn test_selector_parsing() {
        assert_eq!("first".parse::<DeviceSelector>().unwrap(), DeviceSelector::First);
        assert_eq!("".parse::<DeviceSelector>().unwrap(), DeviceSelector::First);
        assert_eq!("2".parse::<DeviceSelector>().unwrap(), DeviceSelector::Index(2));
        assert_eq!(
            "U3-3080CP".parse::<DeviceSelector>().unwrap(),
            DeviceSelector::Name("U3-3080CP".into())
        );
    }

    #[test]
    fn test_file_config_parsing() {
        let toml = r#"
            [device]
            selector = "1"

            [acquisition]
            mode = "single_frame"
            exposure_us = 5000.0
            width = 640
            height = 480

            [run]
            frame_count = 10
            frame_timeout_ms = 250

            [output]
            directory = "captures"
        "#;
        let config = FileConfig::from_toml(toml).unwrap();
        assert_eq!(config.device.selector(), DeviceSelector::Index(1));
        assert_eq!(config.acquisition.mode, AcquisitionMode::SingleFrame);
        assert_eq!(config.run.frame_count, 10);
        assert_eq!(config.run.frame_timeout(), Duration::from_millis(250));
        assert_eq!(config.output.directory, Some(PathBuf::from("captures")));
        assert_eq!(config.output.metrics_port, 0);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = FileConfig::from_toml("").unwrap();
        assert_eq!(config.device.selector(), DeviceSelector::First);
        assert_eq!(config.run.frame_count, 300);
        assert_eq!(config.run.frame_timeout_ms, 1000);
        assert!(config.output.directory.is_none());
    }

    #[test]
    fn test_file_config_rejects_bad_values() {
        let toml = r#"
            [acquisition]
            exposure_us = -1.0
        "#;
        assert!(matches!(
            FileConfig::from_toml(toml),
            Err(ConfigError::NotPositive { field: ConfigField::ExposureUs, .. })
        ));

        let toml = r#"
            [run]
            frame_count = 1
            frame_timeout_ms = 0
        "#;
        assert!(matches!(
            FileConfig::from_toml(toml),
            Err(ConfigError::InvalidTimeout)
        ));
    }
}
