use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use scene_watch_common::frame::{BlockVector, RawImage, RawMotionFrame};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{FrameSource, ImageCallback, MotionCallback, SourceError};

/// Longest uninterrupted sleep while pacing a realtime replay.
const PACE_SLICE: Duration = Duration::from_millis(50);

/// Sleep for `gap`, waking every [`PACE_SLICE`] to check `shutdown`.
/// Returns `false` if shutdown was requested before the gap elapsed.
fn pace(gap: Duration, shutdown: &AtomicBool) -> bool {
    let deadline = Instant::now() + gap;
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep((deadline - now).min(PACE_SLICE));
    }
}

/// One line of a recorded capture.
///
/// ```text
/// {"kind":"motion","timestamp_ms":1708248600000,"width":41,"height":31,"blocks":[[0,0,12],...]}
/// {"kind":"image","timestamp_ms":1708248600010,"path":"frames/000001.jpg"}
/// ```
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum ReplayRecord {
    Motion {
        timestamp_ms: i64,
        width: usize,
        height: usize,
        blocks: Vec<BlockVector>,
    },
    Image {
        timestamp_ms: i64,
        path: PathBuf,
    },
}

impl ReplayRecord {
    fn timestamp_ms(&self) -> i64 {
        match self {
            ReplayRecord::Motion { timestamp_ms, .. } | ReplayRecord::Image { timestamp_ms, .. } => {
                *timestamp_ms
            }
        }
    }
}

/// Replays a JSON-lines capture recorded from a sensor.
///
/// Image paths are resolved relative to the capture file's directory. With
/// `realtime` set, records are paced by their recorded timestamps.
pub struct ReplaySource {
    path: PathBuf,
    realtime: bool,
    motion: Option<MotionCallback>,
    image: Option<ImageCallback>,
}

impl ReplaySource {
    pub fn new(path: impl Into<PathBuf>, realtime: bool) -> Self {
        Self {
            path: path.into(),
            realtime,
            motion: None,
            image: None,
        }
    }

    fn base_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    fn load_image(&self, timestamp_ms: i64, path: &Path) -> Result<RawImage, SourceError> {
        let full = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir().join(path)
        };
        let rgb = image::open(&full)
            .map_err(|e| SourceError::Image(full.display().to_string(), e.to_string()))?
            .to_rgb8();
        let (width, height) = rgb.dimensions();
        Ok(RawImage::new(timestamp_ms, width, height, rgb.into_raw())?)
    }
}

impl FrameSource for ReplaySource {
    fn on_motion(&mut self, callback: MotionCallback) {
        self.motion = Some(callback);
    }

    fn on_image(&mut self, callback: ImageCallback) {
        self.image = Some(callback);
    }

    fn run(&mut self, shutdown: &AtomicBool) -> Result<(), SourceError> {
        let file = File::open(&self.path)
            .map_err(|e| SourceError::Open(self.path.display().to_string(), e))?;
        let reader = BufReader::new(file);

        info!(path = self.path.display().to_string(), realtime = self.realtime, "replaying capture");

        let mut last_ts: Option<i64> = None;
        let mut motion_frames: u64 = 0;
        let mut images: u64 = 0;

        for (idx, line) in reader.lines().enumerate() {
            if shutdown.load(Ordering::SeqCst) {
                info!(line = idx + 1, "shutdown requested, stopping replay");
                break;
            }

            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let record: ReplayRecord =
                serde_json::from_str(trimmed).map_err(|e| SourceError::Parse {
                    line: idx + 1,
                    message: e.to_string(),
                })?;

            let ts = record.timestamp_ms();
            if self.realtime {
                if let Some(prev) = last_ts {
                    if ts > prev && !pace(Duration::from_millis((ts - prev) as u64), shutdown) {
                        info!(line = idx + 1, "shutdown requested, stopping replay");
                        break;
                    }
                }
            }
            last_ts = Some(ts);

            match record {
                ReplayRecord::Motion {
                    timestamp_ms,
                    width,
                    height,
                    blocks,
                } => {
                    let frame = RawMotionFrame::new(timestamp_ms, width, height, blocks)?;
                    motion_frames += 1;
                    if let Some(cb) = self.motion.as_mut() {
                        cb(frame)?;
                    }
                }
                ReplayRecord::Image { timestamp_ms, path } => {
                    if self.image.is_none() {
                        continue;
                    }
                    let image = match self.load_image(timestamp_ms, &path) {
                        Ok(image) => image,
                        Err(e) => {
                            warn!(line = idx + 1, ts = timestamp_ms, error = %e, "skipping unreadable image");
                            continue;
                        }
                    };
                    images += 1;
                    if let Some(cb) = self.image.as_mut() {
                        cb(image);
                    }
                }
            }

            if motion_frames > 0 && motion_frames % 300 == 0 {
                debug!(motion_frames, images, "replay progress");
            }
        }

        info!(motion_frames, images, "replay finished");
        Ok(())
    }

    fn name(&self) -> &str {
        "replay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scene_watch_common::frame::FrameError;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    fn write_capture(dir: &Path, lines: &[&str]) -> PathBuf {
        let path = dir.join("capture.jsonl");
        let mut f = File::create(&path).unwrap();
        for l in lines {
            writeln!(f, "{l}").unwrap();
        }
        path
    }

    #[test]
    fn replays_motion_frames_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_capture(
            dir.path(),
            &[
                r#"{"kind":"motion","timestamp_ms":10,"width":2,"height":1,"blocks":[[3,4,1],[0,0,0]]}"#,
                "",
                r#"{"kind":"motion","timestamp_ms":20,"width":2,"height":1,"blocks":[{"dx":0,"dy":0,"sad":7},[1,1,1]]}"#,
            ],
        );

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut source = ReplaySource::new(&path, false);
        source.on_motion(Box::new(move |frame| {
            sink.lock().unwrap().push((frame.timestamp_ms, frame.magnitudes().to_vec()));
            Ok(())
        }));
        source.run(&AtomicBool::new(false)).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (10, vec![5, 0]));
        assert_eq!(seen[1].0, 20);
    }

    #[test]
    fn parse_error_reports_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_capture(
            dir.path(),
            &[
                r#"{"kind":"motion","timestamp_ms":10,"width":1,"height":1,"blocks":[[0,0,0]]}"#,
                r#"{"kind":"telepathy"}"#,
            ],
        );
        let mut source = ReplaySource::new(&path, false);
        let err = source.run(&AtomicBool::new(false)).unwrap_err();
        assert!(matches!(err, SourceError::Parse { line: 2, .. }));
    }

    #[test]
    fn callback_error_aborts_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_capture(
            dir.path(),
            &[
                r#"{"kind":"motion","timestamp_ms":10,"width":1,"height":1,"blocks":[[0,0,0]]}"#,
                r#"{"kind":"motion","timestamp_ms":20,"width":1,"height":1,"blocks":[[0,0,0]]}"#,
            ],
        );
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        let mut source = ReplaySource::new(&path, false);
        source.on_motion(Box::new(move |_| {
            *counter.lock().unwrap() += 1;
            Err(FrameError::BlockCount { expected: 2, got: 1 })
        }));
        let err = source.run(&AtomicBool::new(false)).unwrap_err();
        assert!(matches!(err, SourceError::Frame(_)));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn shutdown_stops_before_first_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_capture(
            dir.path(),
            &[r#"{"kind":"motion","timestamp_ms":10,"width":1,"height":1,"blocks":[[0,0,0]]}"#],
        );
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        let mut source = ReplaySource::new(&path, false);
        source.on_motion(Box::new(move |_| {
            *counter.lock().unwrap() += 1;
            Ok(())
        }));
        source.run(&AtomicBool::new(true)).unwrap();
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[test]
    fn image_records_resolve_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let img = image::RgbImage::from_pixel(4, 2, image::Rgb([1, 2, 3]));
        img.save(dir.path().join("still.png")).unwrap();
        let path = write_capture(
            dir.path(),
            &[r#"{"kind":"image","timestamp_ms":33,"path":"still.png"}"#],
        );

        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let mut source = ReplaySource::new(&path, false);
        source.on_image(Box::new(move |image| {
            *sink.lock().unwrap() = Some(image);
        }));
        source.run(&AtomicBool::new(false)).unwrap();

        let image = seen.lock().unwrap().take().unwrap();
        assert_eq!(image.timestamp_ms, 33);
        assert_eq!((image.width, image.height), (4, 2));
        assert_eq!(&image.pixels()[..3], &[1, 2, 3]);
    }

    #[test]
    fn unreadable_image_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("corrupt.jpg"), b"not a jpeg").unwrap();
        let path = write_capture(
            dir.path(),
            &[
                r#"{"kind":"image","timestamp_ms":0,"path":"absent.jpg"}"#,
                r#"{"kind":"image","timestamp_ms":5,"path":"corrupt.jpg"}"#,
                r#"{"kind":"motion","timestamp_ms":10,"width":1,"height":1,"blocks":[[0,0,0]]}"#,
            ],
        );

        let images = Arc::new(Mutex::new(0));
        let frames = Arc::new(Mutex::new(0));
        let (image_count, frame_count) = (Arc::clone(&images), Arc::clone(&frames));
        let mut source = ReplaySource::new(&path, false);
        source.on_image(Box::new(move |_| *image_count.lock().unwrap() += 1));
        source.on_motion(Box::new(move |_| {
            *frame_count.lock().unwrap() += 1;
            Ok(())
        }));
        source.run(&AtomicBool::new(false)).unwrap();

        assert_eq!(*images.lock().unwrap(), 0);
        assert_eq!(*frames.lock().unwrap(), 1);
    }

    #[test]
    fn shutdown_interrupts_long_realtime_gap() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_capture(
            dir.path(),
            &[
                r#"{"kind":"motion","timestamp_ms":0,"width":1,"height":1,"blocks":[[0,0,0]]}"#,
                r#"{"kind":"motion","timestamp_ms":600000,"width":1,"height":1,"blocks":[[0,0,0]]}"#,
            ],
        );
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        let mut source = ReplaySource::new(&path, true);
        source.on_motion(Box::new(move |_| {
            *counter.lock().unwrap() += 1;
            Ok(())
        }));

        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            flag.store(true, Ordering::SeqCst);
        });

        let started = Instant::now();
        source.run(&shutdown).unwrap();
        stopper.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn pace_completes_short_gap() {
        let started = Instant::now();
        assert!(pace(Duration::from_millis(120), &AtomicBool::new(false)));
        assert!(started.elapsed() >= Duration::from_millis(120));
        assert!(!pace(Duration::from_secs(60), &AtomicBool::new(true)));
    }

    #[test]
    fn missing_file_is_open_error() {
        let mut source = ReplaySource::new("/nonexistent/capture.jsonl", false);
        assert!(matches!(
            source.run(&AtomicBool::new(false)),
            Err(SourceError::Open(..))
        ));
    }
}
