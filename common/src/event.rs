use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;

use crate::frame::{iso_timestamp, FrameError, MotionGeometry, RawImage, RawMotionFrame};

/// Common view over everything that travels through a dispatch queue, so
/// drops and failures can be logged with enough context to reconstruct them.
pub trait Record: Send + 'static {
    /// Short label for log lines ("motion", "picture", "scene").
    fn kind(&self) -> &'static str;
    fn timestamp_ms(&self) -> i64;
}

/// A frame classified while a scene was active.
#[derive(Debug, Clone)]
pub struct MotionSample {
    pub timestamp_ms: i64,
    pub triggered: bool,
    pub frame: RawMotionFrame,
}

impl Record for MotionSample {
    fn kind(&self) -> &'static str {
        "motion"
    }
    fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }
}

/// Which scene edge a picture belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Start,
    End,
}

impl Edge {
    /// Suffix used in picture identifiers.
    pub fn suffix(self) -> &'static str {
        match self {
            Edge::Start => "on",
            Edge::End => "off",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictureKind {
    Raw,
    Encoded,
}

/// The still image carried by a [`PictureEvent`].
#[derive(Debug, Clone)]
pub enum PicturePayload {
    /// Uncompressed RGB frame, encoded lazily by whoever needs bytes.
    Raw(RawImage),
    /// JPEG bytes.
    Encoded(Bytes),
}

/// A still image tied to a scene edge.
#[derive(Debug, Clone)]
pub struct PictureEvent {
    /// Time of the scene edge, not of the image itself.
    pub timestamp_ms: i64,
    pub edge: Edge,
    pub payload: PicturePayload,
}

impl PictureEvent {
    pub fn raw(timestamp_ms: i64, edge: Edge, image: RawImage) -> Self {
        Self {
            timestamp_ms,
            edge,
            payload: PicturePayload::Raw(image),
        }
    }

    pub fn encoded(timestamp_ms: i64, edge: Edge, jpeg: Bytes) -> Self {
        Self {
            timestamp_ms,
            edge,
            payload: PicturePayload::Encoded(jpeg),
        }
    }

    pub fn kind(&self) -> PictureKind {
        match self.payload {
            PicturePayload::Raw(_) => PictureKind::Raw,
            PicturePayload::Encoded(_) => PictureKind::Encoded,
        }
    }

    /// JPEG bytes for this picture, encoding raw pixels if needed.
    pub fn jpeg(&self, quality: u8) -> Result<Bytes, FrameError> {
        match &self.payload {
            PicturePayload::Raw(image) => image.to_jpeg(quality),
            PicturePayload::Encoded(bytes) => Ok(bytes.clone()),
        }
    }

    /// Storage identifier: ISO timestamp with `:` replaced by `_`, then `_on`/`_off`.
    /// e.g. "2024-02-18T09_30_00.123_on"
    pub fn identifier(&self) -> String {
        format!(
            "{}_{}",
            iso_timestamp(self.timestamp_ms).replace(':', "_"),
            self.edge.suffix()
        )
    }
}

impl Record for Arc<PictureEvent> {
    fn kind(&self) -> &'static str {
        "picture"
    }
    fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }
}

/// A closed scene: the pictures taken at its rising and falling edges.
#[derive(Debug, Clone)]
pub struct SceneCapture {
    pub started_at_ms: i64,
    pub ended_at_ms: i64,
    pub start: Arc<PictureEvent>,
    pub end: Arc<PictureEvent>,
}

impl SceneCapture {
    pub fn duration_ms(&self) -> i64 {
        self.ended_at_ms - self.started_at_ms
    }
}

impl Record for SceneCapture {
    fn kind(&self) -> &'static str {
        "scene"
    }
    fn timestamp_ms(&self) -> i64 {
        self.ended_at_ms
    }
}

/// Normalized motion record with summary statistics, ready for telemetry.
#[derive(Debug, Clone, Serialize)]
pub struct MotionEvent {
    pub timestamp: String,
    pub triggered: bool,
    pub blocks_x: usize,
    pub blocks_y: usize,
    pub vectors_x: Vec<i8>,
    pub vectors_y: Vec<i8>,
    pub sad: Vec<u16>,
    /// Mean horizontal block displacement as a fraction of the frame width.
    pub avg_x: f64,
    /// Mean vertical block displacement as a fraction of the frame height.
    pub avg_y: f64,
    /// Mean block magnitude in pixels.
    pub mag: f64,
}

impl MotionEvent {
    pub fn from_sample(sample: &MotionSample, geometry: &MotionGeometry) -> Self {
        let frame = &sample.frame;
        let blocks = frame.blocks();
        let n = blocks.len().max(1) as f64;

        let sum_x: i64 = blocks.iter().map(|b| i64::from(b.dx)).sum();
        let sum_y: i64 = blocks.iter().map(|b| i64::from(b.dy)).sum();
        let sum_m: u64 = frame.magnitudes().iter().map(|&m| u64::from(m)).sum();

        Self {
            timestamp: iso_timestamp(sample.timestamp_ms),
            triggered: sample.triggered,
            blocks_x: frame.width(),
            blocks_y: frame.height(),
            vectors_x: blocks.iter().map(|b| b.dx).collect(),
            vectors_y: blocks.iter().map(|b| b.dy).collect(),
            sad: blocks.iter().map(|b| b.sad).collect(),
            avg_x: sum_x as f64 / n / f64::from(geometry.frame_width.max(1)),
            avg_y: sum_y as f64 / n / f64::from(geometry.frame_height.max(1)),
            mag: sum_m as f64 / n,
        }
    }
}

/// Normalized scene record: the interval plus what the captioning service saw.
#[derive(Debug, Clone, Serialize)]
pub struct SceneEvent {
    pub timestamp_on: String,
    pub timestamp_off: String,
    pub caption: String,
    pub caption_conf: f64,
    pub tags: Vec<String>,
}

impl SceneEvent {
    pub fn new(capture: &SceneCapture, caption: String, caption_conf: f64, tags: Vec<String>) -> Self {
        Self {
            timestamp_on: iso_timestamp(capture.started_at_ms),
            timestamp_off: iso_timestamp(capture.ended_at_ms),
            caption,
            caption_conf,
            tags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::BlockVector;

    fn sample(blocks: Vec<BlockVector>, w: usize, h: usize) -> MotionSample {
        MotionSample {
            timestamp_ms: 1_708_248_600_000,
            triggered: true,
            frame: RawMotionFrame::new(1_708_248_600_000, w, h, blocks).unwrap(),
        }
    }

    #[test]
    fn identifier_replaces_colons() {
        let pic = PictureEvent::encoded(1_708_248_600_123, Edge::Start, Bytes::new());
        assert_eq!(pic.identifier(), "2024-02-18T09_30_00.123_on");
        let pic = PictureEvent::encoded(1_708_248_600_123, Edge::End, Bytes::new());
        assert!(pic.identifier().ends_with("_off"));
        assert!(!pic.identifier().contains(':'));
    }

    #[test]
    fn encoded_payload_passes_through() {
        let pic = PictureEvent::encoded(0, Edge::End, Bytes::from_static(b"jpeg"));
        assert_eq!(pic.kind(), PictureKind::Encoded);
        assert_eq!(pic.jpeg(80).unwrap(), Bytes::from_static(b"jpeg"));
    }

    #[test]
    fn raw_payload_is_encoded_on_demand() {
        let img = RawImage::new(0, 8, 8, vec![10; 8 * 8 * 3]).unwrap();
        let pic = PictureEvent::raw(0, Edge::Start, img);
        assert_eq!(pic.kind(), PictureKind::Raw);
        let jpg = pic.jpeg(80).unwrap();
        assert_eq!(&jpg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn motion_event_means() {
        let geo = MotionGeometry {
            width: 2,
            height: 1,
            frame_width: 100,
            frame_height: 50,
        };
        let s = sample(
            vec![BlockVector::new(6, 8, 3), BlockVector::new(-2, 0, 5)],
            2,
            1,
        );
        let ev = MotionEvent::from_sample(&s, &geo);
        assert_eq!(ev.blocks_x, 2);
        assert_eq!(ev.vectors_x, vec![6, -2]);
        assert_eq!(ev.sad, vec![3, 5]);
        assert!((ev.avg_x - 0.02).abs() < 1e-9);
        assert!((ev.avg_y - 0.08).abs() < 1e-9);
        // magnitudes 10 and 2
        assert!((ev.mag - 6.0).abs() < 1e-9);
    }

    #[test]
    fn scene_event_uses_edge_times() {
        let start = Arc::new(PictureEvent::encoded(1_000, Edge::Start, Bytes::new()));
        let end = Arc::new(PictureEvent::encoded(4_000, Edge::End, Bytes::new()));
        let capture = SceneCapture {
            started_at_ms: 1_000,
            ended_at_ms: 4_000,
            start,
            end,
        };
        assert_eq!(capture.duration_ms(), 3_000);
        let ev = SceneEvent::new(&capture, "a cat".into(), 0.9, vec!["cat".into()]);
        assert_eq!(ev.timestamp_on, "1970-01-01T00:00:01.000");
        assert_eq!(ev.timestamp_off, "1970-01-01T00:00:04.000");
    }
}
