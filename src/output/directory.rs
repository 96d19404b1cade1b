//! Writes frames to a directory as binary Netpbm images.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::{ConsumerError, FrameConsumer};
use crate::capture::{Frame, PixelFormat};

/// Saves every frame as `capture_<start>_<index>.pgm` (or `.ppm` for colour).
///
/// `<start>` is the time the writer was created, formatted
/// `YYYYMMDD_HHMMSS`, so all frames of one run share a prefix and sort by
/// index. The directory is created on the first frame.
#[derive(Debug)]
pub struct DirectoryWriter {
    directory: PathBuf,
    prefix: String,
    created: bool,
    written: u64,
}

impl DirectoryWriter {
    /// Creates a writer for `directory`, stamped with the current time.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self::with_start_time(directory, Utc::now())
    }

    /// Creates a writer whose file names use `started` as the run stamp.
    pub fn with_start_time(directory: impl Into<PathBuf>, started: DateTime<Utc>) -> Self {
        Self {
            directory: directory.into(),
            prefix: format!("capture_{}", started.format("%Y%m%d_%H%M%S")),
            created: false,
            written: 0,
        }
    }

    /// Directory frames are written to.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Number of frames written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Path the frame with `index` is written to.
    pub fn path_for(&self, index: u64, format: PixelFormat) -> PathBuf {
        let extension = match format {
            PixelFormat::Mono8 => "pgm",
            PixelFormat::Rgb8 => "ppm",
        };
        self.directory
            .join(format!("{}_{:06}.{}", self.prefix, index, extension))
    }
}

impl FrameConsumer for DirectoryWriter {
    fn accept(&mut self, frame: Frame) -> Result<(), ConsumerError> {
        if !frame.is_valid() {
            return Err(ConsumerError::Unsupported(format!(
                "frame {} holds {} bytes, expected {}",
                frame.index(),
                frame.pixels().len(),
                frame.expected_len()
            )));
        }
        if !self.created {
            fs::create_dir_all(&self.directory)?;
            self.created = true;
        }

        let path = self.path_for(frame.index(), frame.format());
        let magic = match frame.format() {
            PixelFormat::Mono8 => "P5",
            PixelFormat::Rgb8 => "P6",
        };
        let mut out = BufWriter::new(File::create(&path)?);
        write!(out, "{}\n{} {}\n255\n", magic, frame.width(), frame.height())?;
        out.write_all(frame.pixels())?;
        out.flush()?;

        self.written += 1;
        tracing::debug!(path = %path.display(), "Frame written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "camera-acquire-{}-{}",
            name,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_file_naming() {
        let started = Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
        let writer = DirectoryWriter::with_start_time("out", started);
        assert_eq!(
            writer.path_for(12, PixelFormat::Mono8),
            Path::new("out").join("capture_20240305_140709_000012.pgm")
        );
        assert_eq!(
            writer.path_for(0, PixelFormat::Rgb8),
            Path::new("out").join("capture_20240305_140709_000000.ppm")
        );
    }

    #[test]
    fn test_writes_pgm() {
        let dir = scratch_dir("pgm");
        let mut writer = DirectoryWriter::new(&dir);

        let frame = Frame::new(vec![1, 2, 3, 4, 5, 6], 3, 2, PixelFormat::Mono8, 7);
        writer.accept(frame).unwrap();
        assert_eq!(writer.written(), 1);

        let bytes = fs::read(writer.path_for(7, PixelFormat::Mono8)).unwrap();
        let header = b"P5\n3 2\n255\n";
        assert_eq!(&bytes[..header.len()], header);
        assert_eq!(&bytes[header.len()..], &[1, 2, 3, 4, 5, 6]);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_rejects_short_buffer() {
        let dir = scratch_dir("short");
        let mut writer = DirectoryWriter::new(&dir);
        let frame = Frame::new(vec![0u8; 5], 3, 2, PixelFormat::Mono8, 0);
        assert!(matches!(
            writer.accept(frame),
            Err(ConsumerError::Unsupported(_))
        ));
        assert_eq!(writer.written(), 0);
        assert!(!dir.exists());
    }
}
