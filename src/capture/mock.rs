//! Mock camera backend that generates synthetic frames.
//!
//! The mock stands in for a vendor SDK in tests and in the CLI demo. Each
//! stream wait follows a script of [`MockOutcome`]s (defaulting to a frame
//! once the script runs out), and every call made against the provider,
//! device, or stream is appended to a shared [`CallLog`] so the order of
//! lifecycle operations can be checked after the fact.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::ops::RangeInclusive;
use std::rc::Rc;
use std::time::Duration;

use super::{
    AcquisitionMode, ConfigField, Device, DeviceDescriptor, DeviceError, DeviceProvider, Frame,
    PixelFormat, Setting, Stream,
};

/// What a single stream wait produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
    /// A synthetic frame is delivered.
    Frame,
    /// The wait runs out without a frame.
    Timeout,
    /// The stream fails with the given message.
    Fail(String),
}

/// One recorded call against the mock backend.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    /// `DeviceProvider::enumerate`.
    Enumerate,
    /// `DeviceProvider::open` of the named camera.
    Open(String),
    /// `Device::apply`, recorded before the value is checked.
    Apply(Setting),
    /// `Device::start_acquisition`.
    StartAcquisition,
    /// `Device::stop_acquisition`.
    StopAcquisition,
    /// `Device::create_stream`.
    CreateStream,
    /// `Stream::start`.
    StreamStart,
    /// One `Stream::wait_for_frame`.
    Wait,
    /// `Stream::stop`.
    StreamStop,
    /// The stream was dropped.
    StreamDropped,
    /// `Device::close`.
    Close,
}

/// Shared, append-only journal of mock calls.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Rc<RefCell<Vec<MockCall>>>);

impl CallLog {
    fn record(&self, call: MockCall) {
        self.0.borrow_mut().push(call);
    }

    /// Returns a copy of every call recorded so far.
    pub fn calls(&self) -> Vec<MockCall> {
        self.0.borrow().clone()
    }

    /// Counts recorded calls equal to `call`.
    pub fn count(&self, call: &MockCall) -> usize {
        self.0.borrow().iter().filter(|c| *c == call).count()
    }

    /// Position of the first recorded call equal to `call`.
    pub fn position(&self, call: &MockCall) -> Option<usize> {
        self.0.borrow().iter().position(|c| c == call)
    }
}

/// Value ranges the mock device accepts.
#[derive(Debug, Clone)]
pub struct DeviceLimits {
    /// Accepted exposure times in microseconds.
    pub exposure_us: RangeInclusive<f64>,
    /// Accepted image widths in pixels.
    pub width: RangeInclusive<u32>,
    /// Accepted image heights in pixels.
    pub height: RangeInclusive<u32>,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            exposure_us: 10.0..=1_000_000.0,
            width: 16..=4096,
            height: 16..=3000,
        }
    }
}

fn check_range<T>(field: ConfigField, value: T, range: &RangeInclusive<T>) -> Result<(), DeviceError>
where
    T: PartialOrd + std::fmt::Display,
{
    if range.contains(&value) {
        Ok(())
    } else {
        Err(DeviceError::SettingRejected {
            field,
            reason: format!(
                "{} outside accepted range {}..={}",
                value,
                range.start(),
                range.end()
            ),
        })
    }
}

/// Lifecycle calls the mock is told to fail.
#[derive(Debug, Clone, Default)]
struct Faults {
    start_acquisition: bool,
    create_stream: Option<DeviceError>,
    stream_start: bool,
}

/// Provider of mock cameras.
#[derive(Debug)]
pub struct MockProvider {
    devices: Vec<DeviceDescriptor>,
    limits: DeviceLimits,
    script: Vec<MockOutcome>,
    fail_open: bool,
    faults: Faults,
    log: CallLog,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// A provider with a single mock camera.
    pub fn new() -> Self {
        Self::with_devices(1)
    }

    /// A provider that enumerates no cameras.
    pub fn empty() -> Self {
        Self::with_devices(0)
    }

    /// A provider with `count` mock cameras named `MockCamera0`, `MockCamera1`, ...
    pub fn with_devices(count: usize) -> Self {
        let devices = (0..count)
            .map(|index| DeviceDescriptor {
                index,
                name: format!("MockCamera{}", index),
                model: "Mock".into(),
                serial: format!("MOCK{:04}", index),
            })
            .collect();
        Self {
            devices,
            limits: DeviceLimits::default(),
            script: Vec::new(),
            fail_open: false,
            faults: Faults::default(),
            log: CallLog::default(),
        }
    }

    /// Sets the value ranges opened devices accept.
    pub fn limits(mut self, limits: DeviceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Sets the per-wait outcomes of the next opened device's streams.
    pub fn script(mut self, outcomes: impl IntoIterator<Item = MockOutcome>) -> Self {
        self.script = outcomes.into_iter().collect();
        self
    }

    /// Makes every `open` fail as if the device were held by another process.
    pub fn fail_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Makes `start_acquisition` fail on opened devices.
    pub fn fail_start_acquisition(mut self) -> Self {
        self.faults.start_acquisition = true;
        self
    }

    /// Makes `create_stream` on opened devices fail with `error`.
    pub fn fail_create_stream(mut self, error: DeviceError) -> Self {
        self.faults.create_stream = Some(error);
        self
    }

    /// Makes `start` fail on every stream of opened devices.
    pub fn fail_stream_start(mut self) -> Self {
        self.faults.stream_start = true;
        self
    }

    /// The journal shared with every device and stream this provider opens.
    pub fn log(&self) -> CallLog {
        self.log.clone()
    }
}

impl DeviceProvider for MockProvider {
    type Device = MockDevice;

    fn enumerate(&mut self) -> Result<Vec<DeviceDescriptor>, DeviceError> {
        self.log.record(MockCall::Enumerate);
        Ok(self.devices.clone())
    }

    fn open(&mut self, descriptor: &DeviceDescriptor) -> Result<MockDevice, DeviceError> {
        self.log.record(MockCall::Open(descriptor.name.clone()));
        if !self.devices.contains(descriptor) {
            return Err(DeviceError::DeviceNotFound(descriptor.name.clone()));
        }
        if self.fail_open {
            return Err(DeviceError::OpenFailed(format!(
                "{} is in use by another process",
                descriptor.name
            )));
        }
        tracing::debug!(device = %descriptor.name, "MockCamera opened");
        Ok(MockDevice {
            descriptor: descriptor.clone(),
            limits: self.limits.clone(),
            faults: self.faults.clone(),
            mode: AcquisitionMode::Continuous,
            exposure_us: 10_000.0,
            width: 640,
            height: 480,
            acquiring: false,
            closed: false,
            stream_alive: Rc::new(Cell::new(false)),
            script: Rc::new(RefCell::new(std::mem::take(&mut self.script).into())),
            log: self.log.clone(),
        })
    }
}

/// An opened mock camera.
#[derive(Debug)]
pub struct MockDevice {
    descriptor: DeviceDescriptor,
    limits: DeviceLimits,
    faults: Faults,
    mode: AcquisitionMode,
    exposure_us: f64,
    width: u32,
    height: u32,
    acquiring: bool,
    closed: bool,
    stream_alive: Rc<Cell<bool>>,
    script: Rc<RefCell<VecDeque<MockOutcome>>>,
    log: CallLog,
}

impl MockDevice {
    /// Current exposure time in microseconds.
    pub fn exposure_us(&self) -> f64 {
        self.exposure_us
    }

    /// Current image size.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// True between a successful `start_acquisition` and the next stop.
    pub fn is_acquiring(&self) -> bool {
        self.acquiring
    }

    /// True once `close` has succeeded.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<(), DeviceError> {
        if self.closed {
            Err(DeviceError::NotOpen)
        } else {
            Ok(())
        }
    }
}

impl Device for MockDevice {
    type Stream = MockStream;

    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn apply(&mut self, setting: Setting) -> Result<(), DeviceError> {
        self.log.record(MockCall::Apply(setting));
        self.ensure_open()?;
        if self.acquiring {
            return Err(DeviceError::SettingRejected {
                field: setting.field(),
                reason: "not writable while acquisition is running".into(),
            });
        }
        match setting {
            Setting::AcquisitionMode(mode) => self.mode = mode,
            Setting::ExposureTime(us) => {
                check_range(ConfigField::ExposureUs, us, &self.limits.exposure_us)?;
                self.exposure_us = us;
            }
            Setting::Width(w) => {
                check_range(ConfigField::Width, w, &self.limits.width)?;
                self.width = w;
            }
            Setting::Height(h) => {
                check_range(ConfigField::Height, h, &self.limits.height)?;
                self.height = h;
            }
        }
        Ok(())
    }

    fn start_acquisition(&mut self) -> Result<(), DeviceError> {
        self.log.record(MockCall::StartAcquisition);
        self.ensure_open()?;
        if self.faults.start_acquisition {
            return Err(DeviceError::Stream("acquisition start refused".into()));
        }
        self.acquiring = true;
        Ok(())
    }

    fn stop_acquisition(&mut self) -> Result<(), DeviceError> {
        self.log.record(MockCall::StopAcquisition);
        self.ensure_open()?;
        self.acquiring = false;
        Ok(())
    }

    fn create_stream(&mut self) -> Result<MockStream, DeviceError> {
        self.log.record(MockCall::CreateStream);
        self.ensure_open()?;
        if self.stream_alive.get() {
            return Err(DeviceError::AlreadyStreaming);
        }
        if let Some(error) = &self.faults.create_stream {
            return Err(error.clone());
        }
        self.stream_alive.set(true);
        Ok(MockStream {
            width: self.width,
            height: self.height,
            mode: self.mode,
            fail_start: self.faults.stream_start,
            started: false,
            delivered: 0,
            alive: Rc::clone(&self.stream_alive),
            script: Rc::clone(&self.script),
            log: self.log.clone(),
        })
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        self.log.record(MockCall::Close);
        self.ensure_open()?;
        self.closed = true;
        self.acquiring = false;
        tracing::debug!(device = %self.descriptor.name, "MockCamera closed");
        Ok(())
    }
}

/// Stream of synthetic frames from a [`MockDevice`].
#[derive(Debug)]
pub struct MockStream {
    width: u32,
    height: u32,
    mode: AcquisitionMode,
    fail_start: bool,
    started: bool,
    delivered: u64,
    alive: Rc<Cell<bool>>,
    script: Rc<RefCell<VecDeque<MockOutcome>>>,
    log: CallLog,
}

impl MockStream {
    fn synthesize(&self) -> Vec<u8> {
        let pixel_count = (self.width as usize) * (self.height as usize);
        // Deterministic pattern, shifted per frame so consecutive frames differ
        (0..pixel_count)
            .map(|i| ((i as u64 ^ self.delivered) % 256) as u8)
            .collect()
    }
}

impl Stream for MockStream {
    fn start(&mut self) -> Result<(), DeviceError> {
        self.log.record(MockCall::StreamStart);
        if self.fail_start {
            return Err(DeviceError::Stream("no buffers announced".into()));
        }
        self.started = true;
        Ok(())
    }

    fn wait_for_frame(&mut self, _timeout: Duration) -> Result<Option<Frame>, DeviceError> {
        self.log.record(MockCall::Wait);
        if !self.started {
            return Err(DeviceError::Stream("stream not started".into()));
        }
        let outcome = self
            .script
            .borrow_mut()
            .pop_front()
            .unwrap_or(MockOutcome::Frame);
        match outcome {
            // A single-frame acquisition has nothing more to deliver
            MockOutcome::Frame if self.mode == AcquisitionMode::SingleFrame && self.delivered > 0 => {
                Ok(None)
            }
            MockOutcome::Frame => {
                let pixels = self.synthesize();
                let frame = Frame::new(pixels, self.width, self.height, PixelFormat::Mono8, self.delivered);
                self.delivered += 1;
                Ok(Some(frame))
            }
            MockOutcome::Timeout => Ok(None),
            MockOutcome::Fail(msg) => Err(DeviceError::Stream(msg)),
        }
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        self.log.record(MockCall::StreamStop);
        self.started = false;
        Ok(())
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        self.alive.set(false);
        self.log.record(MockCall::StreamDropped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_first(provider: &mut MockProvider) -> MockDevice {
        let descriptors = provider.enumerate().unwrap();
        provider.open(&descriptors[0]).unwrap()
    }

    #[test]
    fn test_mock_device_lifecycle() {
        let mut provider = MockProvider::new();
        let mut device = open_first(&mut provider);

        device.apply(Setting::Width(64)).unwrap();
        device.apply(Setting::Height(32)).unwrap();
        device.start_acquisition().unwrap();

        let mut stream = device.create_stream().unwrap();
        stream.start().unwrap();
        let frame = stream.wait_for_frame(Duration::from_millis(10)).unwrap().unwrap();
        assert!(frame.is_valid());
        assert_eq!((frame.width(), frame.height()), (64, 32));
        assert_eq!(frame.index(), 0);

        let frame2 = stream.wait_for_frame(Duration::from_millis(10)).unwrap().unwrap();
        assert_eq!(frame2.index(), 1);
        assert_ne!(frame.pixels(), frame2.pixels());

        stream.stop().unwrap();
        drop(stream);
        device.stop_acquisition().unwrap();
        device.close().unwrap();
        assert!(device.is_closed());
    }

    #[test]
    fn test_empty_provider() {
        let mut provider = MockProvider::empty();
        assert!(provider.enumerate().unwrap().is_empty());
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut provider = MockProvider::new();
        let mut device = open_first(&mut provider);

        let err = device.apply(Setting::Width(8192)).unwrap_err();
        assert!(matches!(
            err,
            DeviceError::SettingRejected { field: ConfigField::Width, .. }
        ));
        assert_eq!(device.dimensions(), (640, 480));

        let err = device.apply(Setting::ExposureTime(1.0)).unwrap_err();
        assert!(matches!(
            err,
            DeviceError::SettingRejected { field: ConfigField::ExposureUs, .. }
        ));
    }

    #[test]
    fn test_settings_locked_while_acquiring() {
        let mut provider = MockProvider::new();
        let mut device = open_first(&mut provider);
        device.start_acquisition().unwrap();
        assert!(device.apply(Setting::Width(64)).is_err());
    }

    #[test]
    fn test_second_stream_rejected() {
        let mut provider = MockProvider::new();
        let mut device = open_first(&mut provider);

        let stream = device.create_stream().unwrap();
        assert!(matches!(
            device.create_stream(),
            Err(DeviceError::AlreadyStreaming)
        ));

        drop(stream);
        assert!(device.create_stream().is_ok());
    }

    #[test]
    fn test_scripted_outcomes() {
        let mut provider = MockProvider::new().script([
            MockOutcome::Timeout,
            MockOutcome::Frame,
            MockOutcome::Fail("link lost".into()),
        ]);
        let mut device = open_first(&mut provider);
        device.apply(Setting::Width(16)).unwrap();
        device.apply(Setting::Height(16)).unwrap();
        let mut stream = device.create_stream().unwrap();
        stream.start().unwrap();

        let timeout = Duration::from_millis(1);
        assert!(stream.wait_for_frame(timeout).unwrap().is_none());
        assert!(stream.wait_for_frame(timeout).unwrap().is_some());
        assert!(matches!(
            stream.wait_for_frame(timeout),
            Err(DeviceError::Stream(msg)) if msg == "link lost"
        ));
        // Script exhausted
        assert!(stream.wait_for_frame(timeout).unwrap().is_some());
    }

    #[test]
    fn test_single_frame_mode() {
        let mut provider = MockProvider::new();
        let mut device = open_first(&mut provider);
        device.apply(Setting::AcquisitionMode(AcquisitionMode::SingleFrame)).unwrap();
        device.apply(Setting::Width(16)).unwrap();
        device.apply(Setting::Height(16)).unwrap();
        let mut stream = device.create_stream().unwrap();
        stream.start().unwrap();

        let timeout = Duration::from_millis(1);
        assert!(stream.wait_for_frame(timeout).unwrap().is_some());
        assert!(stream.wait_for_frame(timeout).unwrap().is_none());
    }

    #[test]
    fn test_wait_before_start_fails() {
        let mut provider = MockProvider::new();
        let mut device = open_first(&mut provider);
        let mut stream = device.create_stream().unwrap();
        assert!(stream.wait_for_frame(Duration::from_millis(1)).is_err());
    }

    #[test]
    fn test_double_close_reports_not_open() {
        let mut provider = MockProvider::new();
        let mut device = open_first(&mut provider);
        device.close().unwrap();
        assert!(matches!(device.close(), Err(DeviceError::NotOpen)));
        assert_eq!(provider.log().count(&MockCall::Close), 2);
    }

    #[test]
    fn test_injected_lifecycle_failures() {
        let mut provider = MockProvider::new().fail_start_acquisition();
        let mut device = open_first(&mut provider);
        assert!(device.start_acquisition().is_err());
        assert!(!device.is_acquiring());

        let mut provider =
            MockProvider::new().fail_create_stream(DeviceError::Stream("no channel".into()));
        let mut device = open_first(&mut provider);
        assert!(matches!(
            device.create_stream(),
            Err(DeviceError::Stream(msg)) if msg == "no channel"
        ));

        let mut provider = MockProvider::new().fail_stream_start();
        let mut device = open_first(&mut provider);
        let mut stream = device.create_stream().unwrap();
        assert!(stream.start().is_err());
        assert!(stream.wait_for_frame(Duration::from_millis(1)).is_err());
    }

    #[test]
    fn test_narrowed_limits() {
        let limits = DeviceLimits {
            exposure_us: 100.0..=5_000.0,
            ..DeviceLimits::default()
        };
        let mut provider = MockProvider::new().limits(limits);
        let mut device = open_first(&mut provider);

        device.apply(Setting::ExposureTime(4_000.0)).unwrap();
        assert_eq!(device.exposure_us(), 4_000.0);
        assert!(matches!(
            device.apply(Setting::ExposureTime(20_000.0)),
            Err(DeviceError::SettingRejected { field: ConfigField::ExposureUs, .. })
        ));
        assert_eq!(device.exposure_us(), 4_000.0);
    }

    #[test]
    fn test_open_failure() {
        let mut provider = MockProvider::new().fail_open();
        let descriptors = provider.enumerate().unwrap();
        assert!(matches!(
            provider.open(&descriptors[0]),
            Err(DeviceError::OpenFailed(_))
        ));
    }
}
