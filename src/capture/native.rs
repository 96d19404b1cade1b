//! OS camera backend built on `nokhwa` (feature `camera`).
//!
//! `nokhwa` only offers a blocking `frame()` call, so each stream runs a
//! worker thread that owns the camera while acquiring and forwards frames
//! through a bounded channel. The session's wait is then a `recv_timeout`
//! on that channel. The camera is handed back to the device when the worker
//! exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, ControlValueSetter, KnownCameraControl,
    RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::Camera as NokhwaCamera;

use super::{
    AcquisitionMode, ConfigField, Device, DeviceDescriptor, DeviceError, DeviceProvider, Frame,
    PixelFormat, Setting, Stream,
};

type CameraSlot = Arc<Mutex<Option<NokhwaCamera>>>;

/// Frames buffered between the worker and the session.
const CHANNEL_DEPTH: usize = 2;

fn lock_slot(slot: &CameraSlot) -> Result<std::sync::MutexGuard<'_, Option<NokhwaCamera>>, DeviceError> {
    slot.lock()
        .map_err(|_| DeviceError::Stream("camera worker panicked".into()))
}

/// Enumerates cameras known to the OS.
#[derive(Debug, Default)]
pub struct NativeProvider {
    indices: Vec<CameraIndex>,
}

impl NativeProvider {
    /// A provider that has not queried the OS yet.
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeviceProvider for NativeProvider {
    type Device = NativeDevice;

    fn enumerate(&mut self) -> Result<Vec<DeviceDescriptor>, DeviceError> {
        let infos = nokhwa::query(ApiBackend::Auto)
            .map_err(|e| DeviceError::DeviceNotFound(e.to_string()))?;
        self.indices = infos.iter().map(|info| info.index().clone()).collect();
        Ok(infos
            .iter()
            .enumerate()
            .map(|(index, info)| DeviceDescriptor {
                index,
                name: info.human_name(),
                model: info.description().to_string(),
                serial: info.misc(),
            })
            .collect())
    }

    fn open(&mut self, descriptor: &DeviceDescriptor) -> Result<NativeDevice, DeviceError> {
        let index = self
            .indices
            .get(descriptor.index)
            .cloned()
            .ok_or_else(|| DeviceError::DeviceNotFound(descriptor.name.clone()))?;
        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
        let camera = NokhwaCamera::new(index, requested)
            .map_err(|e| DeviceError::OpenFailed(e.to_string()))?;
        let resolution = camera.resolution();
        tracing::info!(device = %descriptor.name, "native camera opened");
        Ok(NativeDevice {
            descriptor: descriptor.clone(),
            slot: Arc::new(Mutex::new(Some(camera))),
            mode: AcquisitionMode::Continuous,
            width: resolution.width(),
            height: resolution.height(),
            acquiring: false,
            stream_alive: Arc::new(AtomicBool::new(false)),
            closed: false,
        })
    }
}

/// Resolutions the camera lists. Empty when the driver does not say.
fn offered_resolutions(camera: &mut NokhwaCamera) -> Vec<Resolution> {
    camera
        .compatible_camera_formats()
        .map(|formats| formats.iter().map(CameraFormat::resolution).collect())
        .unwrap_or_default()
}

/// Checks a requested size against the offered resolutions.
///
/// A width no format offers is a `Width` rejection; an offered width paired
/// with a height no format offers is a `Height` rejection.
fn check_resolution(
    offered: &[Resolution],
    width: u32,
    height: Option<u32>,
) -> Result<(), DeviceError> {
    if offered.is_empty() {
        return Ok(());
    }
    if !offered.iter().any(|r| r.width() == width) {
        return Err(DeviceError::SettingRejected {
            field: ConfigField::Width,
            reason: format!("no format is {} pixels wide", width),
        });
    }
    match height {
        Some(h) if !offered.iter().any(|r| r.width() == width && r.height() == h) => {
            Err(DeviceError::SettingRejected {
                field: ConfigField::Height,
                reason: format!("no {} pixel wide format is {} pixels high", width, h),
            })
        }
        _ => Ok(()),
    }
}

/// A camera opened through `nokhwa`.
pub struct NativeDevice {
    descriptor: DeviceDescriptor,
    slot: CameraSlot,
    mode: AcquisitionMode,
    width: u32,
    height: u32,
    acquiring: bool,
    stream_alive: Arc<AtomicBool>,
    closed: bool,
}

impl NativeDevice {
    fn with_camera<T>(
        &self,
        f: impl FnOnce(&mut NokhwaCamera) -> Result<T, DeviceError>,
    ) -> Result<T, DeviceError> {
        let mut guard = lock_slot(&self.slot)?;
        let camera = guard.as_mut().ok_or(DeviceError::NotOpen)?;
        f(camera)
    }
}

impl Device for NativeDevice {
    type Stream = NativeStream;

    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn apply(&mut self, setting: Setting) -> Result<(), DeviceError> {
        let rejected = |field: ConfigField| {
            move |e: nokhwa::NokhwaError| DeviceError::SettingRejected {
                field,
                reason: e.to_string(),
            }
        };
        match setting {
            Setting::AcquisitionMode(mode) => self.mode = mode,
            Setting::ExposureTime(us) => {
                // UVC absolute exposure is expressed in 100 us units
                let units = (us / 100.0).round().max(1.0) as i64;
                self.with_camera(|camera| {
                    camera
                        .set_camera_control(
                            KnownCameraControl::Exposure,
                            ControlValueSetter::Integer(units),
                        )
                        .map_err(rejected(ConfigField::ExposureUs))
                })?;
            }
            // nokhwa sets both dimensions at once, so the width is checked
            // here and written together with the height
            Setting::Width(w) => {
                self.with_camera(|camera| check_resolution(&offered_resolutions(camera), w, None))?;
                self.width = w;
            }
            Setting::Height(h) => {
                let width = self.width;
                self.with_camera(|camera| {
                    check_resolution(&offered_resolutions(camera), width, Some(h))?;
                    camera
                        .set_resolution(Resolution::new(width, h))
                        .map_err(|e| DeviceError::SettingRejected {
                            field: ConfigField::Height,
                            reason: format!("resolution {}x{}: {}", width, h, e),
                        })
                })?;
                self.height = h;
            }
        }
        Ok(())
    }

    fn start_acquisition(&mut self) -> Result<(), DeviceError> {
        if self.closed {
            return Err(DeviceError::NotOpen);
        }
        self.acquiring = true;
        Ok(())
    }

    fn stop_acquisition(&mut self) -> Result<(), DeviceError> {
        self.acquiring = false;
        Ok(())
    }

    fn create_stream(&mut self) -> Result<NativeStream, DeviceError> {
        if self.closed {
            return Err(DeviceError::NotOpen);
        }
        if self.stream_alive.swap(true, Ordering::SeqCst) {
            return Err(DeviceError::AlreadyStreaming);
        }
        Ok(NativeStream {
            slot: Arc::clone(&self.slot),
            mode: self.mode,
            alive: Arc::clone(&self.stream_alive),
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
            frames: None,
            index: 0,
        })
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        if self.closed {
            return Err(DeviceError::NotOpen);
        }
        self.closed = true;
        // Dropping the camera releases the OS handle
        lock_slot(&self.slot)?.take();
        Ok(())
    }
}

/// Frame stream fed by a capture worker thread.
pub struct NativeStream {
    slot: CameraSlot,
    mode: AcquisitionMode,
    alive: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    frames: Option<Receiver<Result<Frame, DeviceError>>>,
    index: u64,
}

fn capture_worker(
    slot: CameraSlot,
    mut camera: NokhwaCamera,
    mode: AcquisitionMode,
    stop: Arc<AtomicBool>,
    tx: mpsc::SyncSender<Result<Frame, DeviceError>>,
) {
    if let Err(e) = camera.open_stream() {
        let _ = tx.send(Err(DeviceError::Stream(e.to_string())));
    } else {
        let mut index = 0;
        while !stop.load(Ordering::SeqCst) {
            let result = camera
                .frame()
                .and_then(|buffer| buffer.decode_image::<RgbFormat>())
                .map(|image| {
                    let (width, height) = (image.width(), image.height());
                    Frame::new(image.into_raw(), width, height, PixelFormat::Rgb8, index)
                })
                .map_err(|e| DeviceError::Stream(e.to_string()));
            let failed = result.is_err();
            if tx.send(result).is_err() || failed {
                break;
            }
            index += 1;
            if mode == AcquisitionMode::SingleFrame {
                break;
            }
        }
        if let Err(e) = camera.stop_stream() {
            tracing::warn!(error = %e, "failed to stop native stream");
        }
    }
    if let Ok(mut guard) = slot.lock() {
        *guard = Some(camera);
    }
}

impl Stream for NativeStream {
    fn start(&mut self) -> Result<(), DeviceError> {
        if self.worker.is_some() {
            return Err(DeviceError::AlreadyStreaming);
        }
        let camera = lock_slot(&self.slot)?.take().ok_or(DeviceError::NotOpen)?;
        let (tx, rx) = mpsc::sync_channel(CHANNEL_DEPTH);
        let slot = Arc::clone(&self.slot);
        let stop = Arc::clone(&self.stop);
        let mode = self.mode;
        self.stop.store(false, Ordering::SeqCst);
        self.worker = Some(std::thread::spawn(move || {
            capture_worker(slot, camera, mode, stop, tx)
        }));
        self.frames = Some(rx);
        Ok(())
    }

    fn wait_for_frame(&mut self, timeout: Duration) -> Result<Option<Frame>, DeviceError> {
        let frames = self
            .frames
            .as_ref()
            .ok_or_else(|| DeviceError::Stream("stream not started".into()))?;
        match frames.recv_timeout(timeout) {
            Ok(Ok(mut frame)) => {
                frame.set_index(self.index);
                self.index += 1;
                Ok(Some(frame))
            }
            Ok(Err(e)) => Err(e),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            // Single-frame worker finished; nothing more will arrive
            Err(RecvTimeoutError::Disconnected) if self.mode == AcquisitionMode::SingleFrame => {
                Ok(None)
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(DeviceError::Stream("capture worker exited".into()))
            }
        }
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        self.stop.store(true, Ordering::SeqCst);
        // Unblocks a worker stuck on a full channel
        self.frames = None;
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| DeviceError::Stream("camera worker panicked".into()))?;
        }
        Ok(())
    }
}

impl Drop for NativeStream {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!(error = %e, "native stream teardown failed");
        }
        self.alive.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offered() -> Vec<Resolution> {
        vec![Resolution::new(640, 480), Resolution::new(1280, 720)]
    }

    #[test]
    fn test_unknown_width_blames_width() {
        let err = check_resolution(&offered(), 1920, Some(1080)).unwrap_err();
        assert!(matches!(
            err,
            DeviceError::SettingRejected { field: ConfigField::Width, .. }
        ));
    }

    #[test]
    fn test_unknown_pair_blames_height() {
        assert!(check_resolution(&offered(), 640, None).is_ok());
        let err = check_resolution(&offered(), 640, Some(720)).unwrap_err();
        assert!(matches!(
            err,
            DeviceError::SettingRejected { field: ConfigField::Height, .. }
        ));
        assert!(check_resolution(&offered(), 1280, Some(720)).is_ok());
    }

    #[test]
    fn test_unlisted_formats_defer_to_driver() {
        assert!(check_resolution(&[], 1920, Some(1080)).is_ok());
    }
}
