//! Prometheus metrics exporter for acquisition monitoring.
//!
//! # Metrics Exposed
//!
//! - `camera_acquire_sessions_total` - Acquisition runs started
//! - `camera_acquire_stream_errors_total` - Runs aborted by a stream error
//! - `camera_acquire_streaming` - Current stream status (1=streaming, 0=idle)
//! - `camera_acquire_frames_requested_total` - Frames requested across runs
//! - `camera_acquire_frames_captured_total` - Frames delivered by the stream
//! - `camera_acquire_frames_timed_out_total` - Frame waits that timed out
//! - `camera_acquire_consumer_errors_total` - Frames the consumer failed on
//!
//! # Example
//!
//! ```no_run
//! use camera_acquire::metrics::MetricsRegistry;
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//! registry.run_started(300);
//! registry.frame_captured();
//! println!("{}", registry.encode().unwrap());
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, ServerError};
