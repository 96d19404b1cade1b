//! Frame consumers.
//!
//! A session hands every captured frame to a [`FrameConsumer`] and forgets
//! it. What happens next (writing to disk, feeding an encoder, logging) is
//! the consumer's business. A failing consumer never stops acquisition; the
//! session counts the error and moves on to the next frame.

mod consumer;
mod directory;

pub use consumer::{ConsumerError, FrameConsumer, LogConsumer};
pub use directory::DirectoryWriter;
