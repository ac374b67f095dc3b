use scene_watch_common::config::Config;
use scene_watch_common::frame::{MotionGeometry, RawMotionFrame};

/// Decides whether a single motion frame shows enough movement to count.
///
/// A frame is triggered when more than `min_blocks` blocks have a magnitude
/// above `min_magnitude`. Stateless: the same grid always yields the same answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionClassifier {
    /// Strictly more than this many blocks must move.
    pub min_blocks: usize,
    /// A block moves when its magnitude is strictly above this many pixels.
    pub min_magnitude: u8,
}

impl MotionClassifier {
    pub fn new(min_blocks: usize, min_magnitude: u8) -> Self {
        Self {
            min_blocks,
            min_magnitude,
        }
    }

    /// `min_blocks = floor(block_fraction * blocks)`,
    /// `min_magnitude = floor(speed / fps * frame_width)`.
    pub fn from_config(config: &Config, geometry: &MotionGeometry) -> Self {
        let min_blocks = (config.detection.block_fraction * geometry.blocks() as f64).floor() as usize;
        let magnitude = (config.detection.speed / f64::from(config.camera.fps)
            * f64::from(config.camera.width))
        .floor();
        Self::new(min_blocks, magnitude.clamp(0.0, 255.0) as u8)
    }

    pub fn classify(&self, frame: &RawMotionFrame) -> bool {
        let moving = frame
            .magnitudes()
            .iter()
            .filter(|&&m| m > self.min_magnitude)
            .count();
        moving > self.min_blocks
    }
}
