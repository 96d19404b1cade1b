//! Bounded, timeout-driven acquisition over one camera.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::SessionError;
use crate::capture::{
    AcquisitionConfig, ConfigField, Device, DeviceDescriptor, DeviceError, DeviceProvider,
    DeviceSelector, Stream,
};
use crate::metrics::MetricsRegistry;
use crate::output::FrameConsumer;

/// Lifecycle state of an [`AcquisitionSession`].
///
/// ```text
/// Closed -> Opened -> Configured <-> Streaming
///                         |
///                         +-> Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No device is held.
    Closed,
    /// A device is open but no configuration is applied.
    Opened,
    /// Configuration applied; ready to run.
    Configured,
    /// A run is in progress.
    Streaming,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Closed => "closed",
            SessionState::Opened => "opened",
            SessionState::Configured => "configured",
            SessionState::Streaming => "streaming",
        };
        f.write_str(name)
    }
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionResult {
    /// Frames the run was asked for.
    pub frames_requested: u32,
    /// Frames received and handed to the consumer.
    pub frames_captured: u32,
    /// Waits that ended without a frame, whether the camera was late or
    /// dropped the frame.
    pub frames_timed_out: u32,
    /// Captured frames the consumer failed to handle.
    pub consumer_errors: u32,
}

impl SessionResult {
    /// Empty counts for a run of `frames_requested` frames.
    pub fn new(frames_requested: u32) -> Self {
        Self {
            frames_requested,
            ..Default::default()
        }
    }

    /// Number of frame waits performed.
    pub fn waits(&self) -> u32 {
        self.frames_captured + self.frames_timed_out
    }

    /// True when every requested wait was performed.
    pub fn is_complete(&self) -> bool {
        self.waits() == self.frames_requested
    }
}

impl fmt::Display for SessionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} frames captured, {} timed out, {} consumer errors",
            self.frames_captured, self.frames_requested, self.frames_timed_out, self.consumer_errors
        )
    }
}

/// Owns one opened camera and drives acquisition runs on it.
///
/// The session is the only owner of the device and of the stream created
/// for each run. [`run`](Self::run) stops the stream and then the device's
/// acquisition on every exit path, so a failed run leaves the session back
/// in [`SessionState::Configured`], ready for another run or for
/// [`close`](Self::close).
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use camera_acquire::capture::{AcquisitionConfig, DeviceSelector, MockProvider};
/// use camera_acquire::output::LogConsumer;
/// use camera_acquire::session::AcquisitionSession;
///
/// let mut provider = MockProvider::new();
/// let config = AcquisitionConfig::with_dimensions(640, 480);
/// let mut session =
///     AcquisitionSession::open(&mut provider, &DeviceSelector::First, &config).unwrap();
///
/// let result = session
///     .run(300, Duration::from_millis(1000), &mut LogConsumer::new())
///     .unwrap();
/// println!("{}", result);
/// session.close();
/// ```
pub struct AcquisitionSession<D: Device> {
    device: Option<D>,
    descriptor: DeviceDescriptor,
    state: SessionState,
    config: Option<AcquisitionConfig>,
    metrics: Option<MetricsRegistry>,
}

fn select<'a>(
    descriptors: &'a [DeviceDescriptor],
    selector: &DeviceSelector,
) -> Result<&'a DeviceDescriptor, SessionError> {
    if descriptors.is_empty() {
        return Err(SessionError::DeviceUnavailable("no camera found".into()));
    }
    let found = match selector {
        DeviceSelector::First => descriptors.first(),
        DeviceSelector::Index(index) => descriptors.get(*index),
        DeviceSelector::Name(name) => descriptors
            .iter()
            .find(|d| d.name == *name || d.serial == *name),
    };
    found.ok_or_else(|| {
        SessionError::DeviceUnavailable(format!(
            "no camera matches '{}' ({} found)",
            selector,
            descriptors.len()
        ))
    })
}

impl<D: Device> AcquisitionSession<D> {
    /// Opens the selected camera and applies `config` to it.
    ///
    /// If the configuration is rejected the device is closed again before the
    /// error is returned.
    pub fn open<P>(
        provider: &mut P,
        selector: &DeviceSelector,
        config: &AcquisitionConfig,
    ) -> Result<Self, SessionError>
    where
        P: DeviceProvider<Device = D>,
    {
        let mut session = Self::open_device(provider, selector)?;
        if let Err(e) = session.configure(config) {
            session.close();
            return Err(e);
        }
        Ok(session)
    }

    /// Opens the selected camera without configuring it.
    pub fn open_device<P>(provider: &mut P, selector: &DeviceSelector) -> Result<Self, SessionError>
    where
        P: DeviceProvider<Device = D>,
    {
        let descriptors = provider
            .enumerate()
            .map_err(|e| SessionError::DeviceUnavailable(e.to_string()))?;
        let descriptor = select(&descriptors, selector)?.clone();
        let device = provider
            .open(&descriptor)
            .map_err(|e| SessionError::DeviceUnavailable(e.to_string()))?;

        info!(device = %descriptor.name, model = %descriptor.model, "Camera opened");

        Ok(Self {
            device: Some(device),
            descriptor,
            state: SessionState::Opened,
            config: None,
            metrics: None,
        })
    }

    /// Attaches a metrics registry updated live during runs.
    pub fn with_metrics(mut self, metrics: MetricsRegistry) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validates `config` and writes it to the device field by field.
    ///
    /// On failure the session is left in [`SessionState::Opened`]; the device
    /// may hold some of the new values.
    pub fn configure(&mut self, config: &AcquisitionConfig) -> Result<(), SessionError> {
        match self.state {
            SessionState::Opened | SessionState::Configured => {}
            SessionState::Streaming => return Err(SessionError::AlreadyStreaming),
            SessionState::Closed => return Err(SessionError::Closed),
        }
        config
            .validate()
            .map_err(|e| SessionError::config_rejected(e, ConfigField::ExposureUs))?;

        let device = self.device.as_mut().ok_or(SessionError::Closed)?;
        self.state = SessionState::Opened;
        self.config = None;

        for setting in config.settings() {
            device.apply(setting).map_err(|e| {
                warn!(%setting, error = %e, "Setting rejected");
                match e {
                    DeviceError::SettingRejected { field, reason } => {
                        SessionError::ConfigRejected { field, reason }
                    }
                    other => SessionError::ConfigRejected {
                        field: setting.field(),
                        reason: other.to_string(),
                    },
                }
            })?;
            debug!(%setting, "Setting applied");
        }

        self.config = Some(config.clone());
        self.state = SessionState::Configured;
        info!(
            mode = %config.mode,
            exposure_us = config.exposure_us,
            width = config.width,
            height = config.height,
            "Camera configured"
        );
        Ok(())
    }

    /// Acquires `frame_count` frames, waiting at most `frame_timeout` for
    /// each, and hands every captured frame to `consumer`.
    ///
    /// Timeouts and consumer failures are counted and skipped. A stream error
    /// ends the loop; the stream and the device acquisition are stopped, in
    /// that order, before it is returned as [`SessionError::Stream`]. The
    /// same teardown runs if the consumer panics.
    pub fn run<C>(
        &mut self,
        frame_count: u32,
        frame_timeout: Duration,
        consumer: &mut C,
    ) -> Result<SessionResult, SessionError>
    where
        C: FrameConsumer + ?Sized,
    {
        match self.state {
            SessionState::Configured => {}
            SessionState::Opened => return Err(SessionError::NotConfigured),
            SessionState::Streaming => return Err(SessionError::AlreadyStreaming),
            SessionState::Closed => return Err(SessionError::Closed),
        }
        let device = self.device.as_mut().ok_or(SessionError::Closed)?;
        let metrics = self.metrics.as_ref();
        let mut result = SessionResult::new(frame_count);

        device.start_acquisition().map_err(|source| SessionError::Stream {
            source,
            partial: result,
        })?;

        let stream = match device.create_stream() {
            Ok(stream) => stream,
            Err(e) => {
                let _ = stop_acquisition(device);
                return Err(match e {
                    DeviceError::AlreadyStreaming => SessionError::AlreadyStreaming,
                    source => SessionError::Stream {
                        source,
                        partial: result,
                    },
                });
            }
        };
        let mut run = ActiveRun {
            stream: Some(stream),
            device,
            state: &mut self.state,
            metrics,
        };
        if let Err(source) = run.start(frame_count) {
            // Teardown errors are already logged; the start failure is reported
            let _ = run.finish(true);
            return Err(SessionError::Stream {
                source,
                partial: result,
            });
        }
        info!(
            frame_count,
            timeout_ms = frame_timeout.as_millis() as u64,
            "Acquisition started"
        );

        let outcome = run.stream().and_then(|stream| {
            capture_frames(stream, frame_count, frame_timeout, consumer, &mut result, metrics)
        });
        let stopped = run.finish(outcome.is_err());

        match outcome.and(stopped) {
            Ok(()) => {
                info!(%result, "Acquisition finished");
                Ok(result)
            }
            Err(source) => {
                warn!(error = %source, %result, "Acquisition aborted");
                Err(SessionError::Stream {
                    source,
                    partial: result,
                })
            }
        }
    }

    /// Releases the camera.
    ///
    /// Safe to call more than once; later calls only log.
    pub fn close(&mut self) {
        match self.device.take() {
            Some(mut device) => match device.close() {
                Ok(()) => info!(device = %self.descriptor.name, "Camera closed"),
                Err(e) => warn!(device = %self.descriptor.name, error = %e, "Camera close failed"),
            },
            None => debug!(device = %self.descriptor.name, "Camera already closed"),
        }
        self.state = SessionState::Closed;
        self.config = None;
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The descriptor of the opened camera.
    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    /// The applied configuration, once configured.
    pub fn config(&self) -> Option<&AcquisitionConfig> {
        self.config.as_ref()
    }

    /// The opened device, until the session is closed.
    pub fn device(&self) -> Option<&D> {
        self.device.as_ref()
    }
}

impl<D: Device> Drop for AcquisitionSession<D> {
    fn drop(&mut self) {
        if self.device.is_some() {
            self.close();
        }
    }
}

/// The stream of one run, held together with what tearing it down needs.
///
/// [`finish`](Self::finish) is the normal teardown. If the capture loop
/// unwinds instead, dropping the guard runs the same teardown, so the stream
/// is still stopped before the device and the session goes back to
/// `Configured`.
struct ActiveRun<'a, D: Device> {
    stream: Option<D::Stream>,
    device: &'a mut D,
    state: &'a mut SessionState,
    metrics: Option<&'a MetricsRegistry>,
}

impl<D: Device> ActiveRun<'_, D> {
    fn stream(&mut self) -> Result<&mut D::Stream, DeviceError> {
        self.stream.as_mut().ok_or(DeviceError::NotOpen)
    }

    fn start(&mut self, frame_count: u32) -> Result<(), DeviceError> {
        self.stream()?.start()?;
        *self.state = SessionState::Streaming;
        if let Some(metrics) = self.metrics {
            metrics.run_started(frame_count);
        }
        Ok(())
    }

    /// Tears the run down and returns the first teardown failure.
    fn finish(mut self, stream_failed: bool) -> Result<(), DeviceError> {
        self.release(stream_failed)
    }

    fn release(&mut self, stream_failed: bool) -> Result<(), DeviceError> {
        let stream = match self.stream.take() {
            Some(stream) => stream,
            None => return Ok(()),
        };
        let stopped = teardown(stream, &mut *self.device);
        if *self.state == SessionState::Streaming {
            *self.state = SessionState::Configured;
            if let Some(metrics) = self.metrics {
                metrics.run_finished(stream_failed);
            }
        }
        stopped
    }
}

impl<D: Device> Drop for ActiveRun<'_, D> {
    fn drop(&mut self) {
        if self.stream.is_some() {
            warn!("Acquisition interrupted, tearing down");
            let _ = self.release(true);
        }
    }
}

fn capture_frames<S, C>(
    stream: &mut S,
    frame_count: u32,
    frame_timeout: Duration,
    consumer: &mut C,
    result: &mut SessionResult,
    metrics: Option<&MetricsRegistry>,
) -> Result<(), DeviceError>
where
    S: Stream,
    C: FrameConsumer + ?Sized,
{
    for index in 0..u64::from(frame_count) {
        match stream.wait_for_frame(frame_timeout)? {
            Some(mut frame) => {
                frame.set_index(index);
                result.frames_captured += 1;
                if let Some(metrics) = metrics {
                    metrics.frame_captured();
                }
                debug!(index, "Captured frame");

                if let Err(e) = consumer.accept(frame) {
                    result.consumer_errors += 1;
                    if let Some(metrics) = metrics {
                        metrics.consumer_failed();
                    }
                    warn!(index, error = %e, "Consumer failed on frame");
                }
            }
            None => {
                result.frames_timed_out += 1;
                if let Some(metrics) = metrics {
                    metrics.frame_timed_out();
                }
                warn!(
                    index,
                    timeout_ms = frame_timeout.as_millis() as u64,
                    "No frame before timeout"
                );
            }
        }
    }
    Ok(())
}

/// Stops the stream, releases it, then stops device acquisition.
///
/// Both stops always run; the first failure is returned.
fn teardown<D: Device>(mut stream: D::Stream, device: &mut D) -> Result<(), DeviceError> {
    let stream_stopped = stream.stop();
    if let Err(e) = &stream_stopped {
        warn!(error = %e, "Failed to stop stream");
    }
    drop(stream);
    let acquisition_stopped = stop_acquisition(device);
    stream_stopped.and(acquisition_stopped)
}

fn stop_acquisition<D: Device>(device: &mut D) -> Result<(), DeviceError> {
    let stopped = device.stop_acquisition();
    if let Err(e) = &stopped {
        warn!(error = %e, "Failed to stop device acquisition");
    }
    stopped
}
