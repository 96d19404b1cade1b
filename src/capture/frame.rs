//! Frame type representing a captured image with metadata.

use chrono::{DateTime, Utc};

/// Pixel layout of a frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// One byte per pixel.
    Mono8,
    /// Three bytes per pixel, red first.
    Rgb8,
}

impl PixelFormat {
    /// Bytes used by one pixel.
    #[inline]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Mono8 => 1,
            PixelFormat::Rgb8 => 3,
        }
    }
}

/// A single captured frame from the camera.
///
/// Frames are moved into the consumer once captured; the session keeps no
/// reference to them afterwards.
#[derive(Clone)]
pub struct Frame {
    /// Raw pixel data in `format` layout.
    pixels: Vec<u8>,
    /// Frame width in pixels.
    width: u32,
    /// Frame height in pixels.
    height: u32,
    format: PixelFormat,
    /// Host clock time at which the frame was received.
    timestamp: DateTime<Utc>,
    /// Index of the wait that produced this frame, counted from 0 per session.
    index: u64,
}

impl Frame {
    /// Creates a new frame stamped with the current time.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, format: PixelFormat, index: u64) -> Self {
        Self {
            pixels,
            width,
            height,
            format,
            timestamp: Utc::now(),
            index,
        }
    }

    /// Returns a reference to the raw pixel data.
    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Returns the frame width.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the frame height.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the pixel layout.
    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Returns the capture timestamp.
    #[inline]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the sequence index within the session.
    #[inline]
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Reassigns the sequence index.
    ///
    /// Backends number frames by their own counter; the session renumbers
    /// them by loop iteration before handing them on.
    pub(crate) fn set_index(&mut self, index: u64) {
        self.index = index;
    }

    /// Number of bytes the buffer should hold for these dimensions.
    #[inline]
    pub fn expected_len(&self) -> usize {
        (self.width as usize) * (self.height as usize) * self.format.bytes_per_pixel()
    }

    /// Validates that the pixel buffer size matches dimensions.
    pub fn is_valid(&self) -> bool {
        self.pixels.len() == self.expected_len()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("index", &self.index)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("timestamp", &self.timestamp)
            .field("pixel_bytes", &self.pixels.len())
            .finish()
    }
}
