//! The consumer trait and its simplest implementations.

use crate::capture::Frame;
use thiserror::Error;

/// Errors a consumer can report for a single frame.
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// Writing the frame failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// The consumer cannot handle this frame's layout.
    #[error("unsupported frame: {0}")]
    Unsupported(String),
    /// Any other consumer failure.
    #[error("{0}")]
    Other(String),
}

/// Receives frames from an acquisition session.
pub trait FrameConsumer {
    /// Takes ownership of one captured frame.
    fn accept(&mut self, frame: Frame) -> Result<(), ConsumerError>;
}

impl<F> FrameConsumer for F
where
    F: FnMut(Frame) -> Result<(), ConsumerError>,
{
    fn accept(&mut self, frame: Frame) -> Result<(), ConsumerError> {
        self(frame)
    }
}

/// Logs each frame and drops it.
#[derive(Debug, Default)]
pub struct LogConsumer {
    accepted: u64,
}

impl LogConsumer {
    /// Creates a consumer that has seen no frames.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames seen so far.
    pub fn accepted(&self) -> u64 {
        self.accepted
    }
}

impl FrameConsumer for LogConsumer {
    fn accept(&mut self, frame: Frame) -> Result<(), ConsumerError> {
        self.accepted += 1;
        tracing::info!(
            index = frame.index(),
            width = frame.width(),
            height = frame.height(),
            "Captured frame"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::PixelFormat;

    fn frame(index: u64) -> Frame {
        Frame::new(vec![0u8; 4], 2, 2, PixelFormat::Mono8, index)
    }

    #[test]
    fn test_closure_consumer() {
        let mut seen = Vec::new();
        let mut consumer = |f: Frame| -> Result<(), ConsumerError> {
            seen.push(f.index());
            Ok(())
        };
        consumer.accept(frame(3)).unwrap();
        consumer.accept(frame(4)).unwrap();
        assert_eq!(seen, vec![3, 4]);
    }

    #[test]
    fn test_log_consumer_counts() {
        let mut consumer = LogConsumer::new();
        consumer.accept(frame(0)).unwrap();
        consumer.accept(frame(1)).unwrap();
        assert_eq!(consumer.accepted(), 2);
    }
}
