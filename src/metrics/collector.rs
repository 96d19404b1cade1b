//! Metrics collection and registry.

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Metric creation, registration, or encoding failed.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Prometheus metrics registry for acquisition monitoring.
///
/// Cloning is cheap; clones share the same underlying metrics, so one clone
/// can sit inside a session while another is served over HTTP.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,

    // Session metrics
    sessions_total: IntCounter,
    stream_errors_total: IntCounter,
    streaming: IntGauge,

    // Frame metrics
    frames_requested_total: IntCounter,
    frames_captured_total: IntCounter,
    frames_timed_out_total: IntCounter,
    consumer_errors_total: IntCounter,
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all acquisition metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let sessions_total = IntCounter::new(
            "camera_acquire_sessions_total",
            "Total number of acquisition runs started",
        )?;
        let stream_errors_total = IntCounter::new(
            "camera_acquire_stream_errors_total",
            "Total number of runs aborted by a stream error",
        )?;
        let streaming = IntGauge::new(
            "camera_acquire_streaming",
            "Whether a stream is currently running (1=streaming, 0=idle)",
        )?;

        let frames_requested_total = IntCounter::new(
            "camera_acquire_frames_requested_total",
            "Total number of frames requested across all runs",
        )?;
        let frames_captured_total = IntCounter::new(
            "camera_acquire_frames_captured_total",
            "Total number of frames received from the stream",
        )?;
        let frames_timed_out_total = IntCounter::new(
            "camera_acquire_frames_timed_out_total",
            "Total number of frame waits that timed out",
        )?;
        let consumer_errors_total = IntCounter::new(
            "camera_acquire_consumer_errors_total",
            "Total number of frames the consumer failed to handle",
        )?;

        // Register all metrics
        registry.register(Box::new(sessions_total.clone()))?;
        registry.register(Box::new(stream_errors_total.clone()))?;
        registry.register(Box::new(streaming.clone()))?;
        registry.register(Box::new(frames_requested_total.clone()))?;
        registry.register(Box::new(frames_captured_total.clone()))?;
        registry.register(Box::new(frames_timed_out_total.clone()))?;
        registry.register(Box::new(consumer_errors_total.clone()))?;

        Ok(Self {
            registry,
            sessions_total,
            stream_errors_total,
            streaming,
            frames_requested_total,
            frames_captured_total,
            frames_timed_out_total,
            consumer_errors_total,
        })
    }

    /// Records the start of a run requesting `frame_count` frames.
    pub fn run_started(&self, frame_count: u32) {
        self.sessions_total.inc();
        self.frames_requested_total.inc_by(u64::from(frame_count));
        self.streaming.set(1);
    }

    /// Records the end of a run, successful or not.
    pub fn run_finished(&self, stream_failed: bool) {
        self.streaming.set(0);
        if stream_failed {
            self.stream_errors_total.inc();
        }
    }

    /// Counts one delivered frame.
    pub fn frame_captured(&self) {
        self.frames_captured_total.inc();
    }

    /// Counts one wait that ended without a frame.
    pub fn frame_timed_out(&self) {
        self.frames_timed_out_total.inc();
    }

    /// Counts one frame the consumer failed on.
    pub fn consumer_failed(&self) {
        self.consumer_errors_total.inc();
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
