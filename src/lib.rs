//! Camera Acquisition Library
//!
//! Opens one camera through a pluggable backend, applies a typed
//! acquisition configuration, pulls a fixed number of frames with a
//! per-frame timeout, and shuts the camera down again.
//!
//! # Architecture
//!
//! ```text
//! DeviceProvider → Device → Stream → FrameConsumer
//!        ↑__________ AcquisitionSession __________↑
//!                          ↓
//!                       metrics
//! ```
//!
//! # Design Principles
//!
//! - **Bounded**: a run performs exactly the requested number of waits, each
//!   bounded by the frame timeout
//! - **Ordered teardown**: the stream is stopped before device acquisition,
//!   on every exit path
//! - **Typed configuration**: settings are an enum, not string-keyed nodes
//! - **Backend-agnostic**: vendor SDKs plug in behind three traits
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use camera_acquire::{
//!     capture::{AcquisitionConfig, DeviceSelector, MockProvider},
//!     output::DirectoryWriter,
//!     session::AcquisitionSession,
//! };
//!
//! let mut provider = MockProvider::new();
//! let config = AcquisitionConfig::default();
//! let mut session =
//!     AcquisitionSession::open(&mut provider, &DeviceSelector::First, &config).unwrap();
//!
//! let mut writer = DirectoryWriter::new("captures");
//! let result = session
//!     .run(300, Duration::from_millis(1000), &mut writer)
//!     .unwrap();
//! assert!(result.is_complete());
//!
//! session.close();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod capture;
pub mod metrics;
pub mod output;
pub mod session;

// Re-export commonly used types at crate root
pub use capture::{AcquisitionConfig, AcquisitionMode, DeviceSelector, Frame, MockProvider};
pub use output::{DirectoryWriter, FrameConsumer, LogConsumer};
pub use session::{AcquisitionSession, SessionError, SessionResult};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
