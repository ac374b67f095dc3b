use std::sync::{Arc, Mutex, PoisonError};

use scene_watch_common::event::{Edge, MotionSample, PictureEvent, SceneCapture};
use scene_watch_common::frame::{RawImage, RawMotionFrame};
use tracing::{debug, error, warn};

use crate::queue::QueueSender;
use crate::scene::Transition;

/// Most recent full-resolution frame, written by the image callback and read
/// by the capture path at scene edges. May lag the motion stream by a tick.
#[derive(Debug, Clone, Default)]
pub struct LatestImage {
    slot: Arc<Mutex<Option<RawImage>>>,
}

impl LatestImage {
    pub fn store(&self, image: RawImage) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(image);
    }

    /// Cheap: pixels are reference counted.
    pub fn latest(&self) -> Option<RawImage> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

pub struct RouterQueues {
    pub motion: QueueSender<MotionSample>,
    pub picture: QueueSender<Arc<PictureEvent>>,
    pub scene: QueueSender<SceneCapture>,
}

/// Turns state-machine transitions into records on the three dispatch queues.
pub struct EventRouter {
    queues: RouterQueues,
    latest: LatestImage,
    jpeg_quality: u8,
    pending_start: Option<Arc<PictureEvent>>,
}

impl EventRouter {
    pub fn new(queues: RouterQueues, latest: LatestImage, jpeg_quality: u8) -> Self {
        Self {
            queues,
            latest,
            jpeg_quality,
            pending_start: None,
        }
    }

    pub fn route(&mut self, transition: Transition, triggered: bool, frame: RawMotionFrame) {
        let t = frame.timestamp_ms;

        if transition.in_scene() {
            self.queues.motion.push(MotionSample {
                timestamp_ms: t,
                triggered,
                frame,
            });
        }

        match transition {
            Transition::Started => self.scene_started(t),
            Transition::Ended { started_at_ms } => self.scene_ended(started_at_ms, t),
            Transition::Quiet | Transition::Continued | Transition::OutOfOrder => {}
        }
    }

    fn scene_started(&mut self, t: i64) {
        let Some(image) = self.latest.latest() else {
            warn!(ts = t, "no image available at scene start, scene will not be captured");
            self.pending_start = None;
            return;
        };
        debug!(ts = t, image_ts = image.timestamp_ms, "start picture taken");
        let picture = Arc::new(PictureEvent::raw(t, Edge::Start, image));
        self.queues.picture.push(Arc::clone(&picture));
        self.pending_start = Some(picture);
    }

    fn scene_ended(&mut self, started_at_ms: i64, t: i64) {
        let start = self.pending_start.take();

        let Some(image) = self.latest.latest() else {
            warn!(ts = t, started_at_ms, "no image available at scene end, scene dropped");
            return;
        };
        let jpeg = match image.to_jpeg(self.jpeg_quality) {
            Ok(jpeg) => jpeg,
            Err(e) => {
                error!(error = %e, ts = t, started_at_ms, "failed to encode end picture, scene dropped");
                return;
            }
        };
        debug!(ts = t, image_ts = image.timestamp_ms, bytes = jpeg.len(), "end picture taken");
        let end = Arc::new(PictureEvent::encoded(t, Edge::End, jpeg));
        self.queues.picture.push(Arc::clone(&end));

        match start {
            Some(start) => {
                self.queues.scene.push(SceneCapture {
                    started_at_ms,
                    ended_at_ms: t,
                    start,
                    end,
                });
            }
            None => {
                warn!(ts = t, started_at_ms, "scene has no start picture, not captured");
            }
        }
    }
}
