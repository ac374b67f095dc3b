use std::io::Cursor;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use serde::Deserialize;

/// One block's aggregate motion as reported by the sensor's encoder.
///
/// Deserializes from either `{"dx":..,"dy":..,"sad":..}` or `[dx, dy, sad]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct BlockVector {
    /// Horizontal displacement in pixels.
    pub dx: i8,
    /// Vertical displacement in pixels.
    pub dy: i8,
    /// Sum of absolute differences for the block match.
    pub sad: u16,
}

impl BlockVector {
    pub fn new(dx: i8, dy: i8, sad: u16) -> Self {
        Self { dx, dy, sad }
    }

    /// Euclidean length of the vector, clipped into a byte.
    pub fn magnitude(&self) -> u8 {
        let x = f64::from(self.dx);
        let y = f64::from(self.dy);
        (x * x + y * y).sqrt().clamp(0.0, 255.0) as u8
    }
}

/// Shape of the motion block grid for a given sensor resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionGeometry {
    /// Blocks per row.
    pub width: usize,
    /// Blocks per column.
    pub height: usize,
    /// Frame width in pixels.
    pub frame_width: u32,
    /// Frame height in pixels.
    pub frame_height: u32,
}

impl MotionGeometry {
    /// The sensor reports one extra column and row beyond `resolution / block_size`.
    pub fn from_resolution(frame_width: u32, frame_height: u32, block_size: u32) -> Self {
        Self {
            width: (frame_width / block_size) as usize + 1,
            height: (frame_height / block_size) as usize + 1,
            frame_width,
            frame_height,
        }
    }

    pub fn blocks(&self) -> usize {
        self.width * self.height
    }
}

/// One frame's block grid with its derived magnitude grid. Row-major.
#[derive(Debug, Clone)]
pub struct RawMotionFrame {
    pub timestamp_ms: i64,
    width: usize,
    height: usize,
    blocks: Vec<BlockVector>,
    magnitudes: Vec<u8>,
}

impl RawMotionFrame {
    pub fn new(
        timestamp_ms: i64,
        width: usize,
        height: usize,
        blocks: Vec<BlockVector>,
    ) -> Result<Self, FrameError> {
        if blocks.len() != width * height {
            return Err(FrameError::BlockCount {
                expected: width * height,
                got: blocks.len(),
            });
        }
        let magnitudes = blocks.iter().map(BlockVector::magnitude).collect();
        Ok(Self {
            timestamp_ms,
            width,
            height,
            blocks,
            magnitudes,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn blocks(&self) -> &[BlockVector] {
        &self.blocks
    }

    pub fn magnitudes(&self) -> &[u8] {
        &self.magnitudes
    }

    /// Fails when the grid does not match the configured sensor geometry.
    pub fn check_shape(&self, geometry: &MotionGeometry) -> Result<(), FrameError> {
        if self.width != geometry.width || self.height != geometry.height {
            return Err(FrameError::ShapeMismatch {
                expected_width: geometry.width,
                expected_height: geometry.height,
                width: self.width,
                height: self.height,
                blocks: self.blocks.len(),
            });
        }
        Ok(())
    }
}

/// A full-resolution RGB8 frame. Pixels are shared so the latest frame can be
/// handed out without copying.
#[derive(Debug, Clone)]
pub struct RawImage {
    pub timestamp_ms: i64,
    pub width: u32,
    pub height: u32,
    pixels: Arc<Vec<u8>>,
}

impl RawImage {
    pub fn new(timestamp_ms: i64, width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * 3;
        if pixels.len() != expected {
            return Err(FrameError::PixelLength {
                expected,
                got: pixels.len(),
            });
        }
        Ok(Self {
            timestamp_ms,
            width,
            height,
            pixels: Arc::new(pixels),
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Encode to JPEG at the given quality (1-100).
    pub fn to_jpeg(&self, quality: u8) -> Result<Bytes, FrameError> {
        let img = RgbImage::from_raw(self.width, self.height, self.pixels.to_vec()).ok_or(
            FrameError::PixelLength {
                expected: self.width as usize * self.height as usize * 3,
                got: self.pixels.len(),
            },
        )?;
        let mut buf = Cursor::new(Vec::new());
        let encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
        img.write_with_encoder(encoder)
            .map_err(|e| FrameError::Encode(e.to_string()))?;
        Ok(Bytes::from(buf.into_inner()))
    }
}

/// ISO-8601 rendering of a Unix-millisecond timestamp, UTC, millisecond precision.
/// Timestamps outside chrono's range render as the Unix epoch.
pub fn iso_timestamp(ms: i64) -> String {
    let dt: DateTime<Utc> = Utc.timestamp_millis_opt(ms).single().unwrap_or_default();
    dt.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error(
        "motion grid is {width}x{height} ({blocks} blocks), expected {expected_width}x{expected_height}"
    )]
    ShapeMismatch {
        expected_width: usize,
        expected_height: usize,
        width: usize,
        height: usize,
        blocks: usize,
    },
    #[error("motion grid has {got} blocks, expected {expected}")]
    BlockCount { expected: usize, got: usize },
    #[error("image buffer has {got} bytes, expected {expected}")]
    PixelLength { expected: usize, got: usize },
    #[error("failed to encode JPEG: {0}")]
    Encode(String),
}
