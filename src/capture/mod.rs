//! Camera devices, streams, and frame handling.
//!
//! This module defines the backend traits a session drives, the typed
//! acquisition configuration written to a device, and the frames a stream
//! produces. A synthetic mock backend is always available; the OS camera
//! backend needs the `camera` feature.

mod camera;
mod config;
mod frame;
mod mock;
#[cfg(feature = "camera")]
mod native;

pub use camera::{Device, DeviceDescriptor, DeviceError, DeviceProvider, Setting, Stream};
pub use config::{
    AcquisitionConfig, AcquisitionMode, ConfigError, ConfigField, DeviceConfig, DeviceSelector,
    FileConfig, OutputConfig, RunConfig,
};
pub use frame::{Frame, PixelFormat};
pub use mock::{CallLog, DeviceLimits, MockCall, MockDevice, MockOutcome, MockProvider, MockStream};
#[cfg(feature = "camera")]
pub use native::{NativeDevice, NativeProvider, NativeStream};
