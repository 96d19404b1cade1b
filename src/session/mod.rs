//! Acquisition sessions.
//!
//! An [`AcquisitionSession`] owns one opened camera. Each call to
//! [`AcquisitionSession::run`] creates a stream, performs a fixed number of
//! bounded frame waits, and tears the stream down again before returning,
//! whether the loop finished or a stream error cut it short.

mod acquisition;
mod error;

pub use acquisition::{AcquisitionSession, SessionResult, SessionState};
pub use error::SessionError;
