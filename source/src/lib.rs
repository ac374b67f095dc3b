//! Frame acquisition boundary.
//!
//! A sensor binding delivers two independent streams: per-frame motion block
//! grids, and full-resolution RGB frames. Consumers register one callback for
//! each and then drive the source with [`FrameSource::run`].

use std::sync::atomic::AtomicBool;

use scene_watch_common::frame::{FrameError, RawImage, RawMotionFrame};

pub mod replay;

pub use replay::ReplaySource;

/// Receives each motion frame. An error aborts the source.
pub type MotionCallback = Box<dyn FnMut(RawMotionFrame) -> Result<(), FrameError> + Send>;

/// Receives each full-resolution frame.
pub type ImageCallback = Box<dyn FnMut(RawImage) + Send>;

pub trait FrameSource: Send {
    fn on_motion(&mut self, callback: MotionCallback);

    fn on_image(&mut self, callback: ImageCallback);

    /// Deliver frames until the source is exhausted, `shutdown` is raised,
    /// or the motion callback fails. Blocks the calling thread.
    fn run(&mut self, shutdown: &AtomicBool) -> Result<(), SourceError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to open capture {0}: {1}")]
    Open(String, std::io::Error),
    #[error("failed to read capture: {0}")]
    Read(#[from] std::io::Error),
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("failed to load image {0}: {1}")]
    Image(String, String),
    #[error("frame rejected: {0}")]
    Frame(#[from] FrameError),
}
