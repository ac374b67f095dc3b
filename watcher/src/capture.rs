//! The synchronous capture path: frame arrival, classification, state
//! machine, enqueue. Runs on a dedicated blocking thread and never awaits.

use std::sync::atomic::AtomicBool;

use scene_watch_common::frame::{FrameError, MotionGeometry, RawMotionFrame};
use scene_watch_source::{FrameSource, SourceError};
use tracing::{error, info};

use crate::classifier::MotionClassifier;
use crate::router::{EventRouter, LatestImage};
use crate::scene::{SceneStateMachine, Transition};

pub struct CapturePath {
    geometry: MotionGeometry,
    classifier: MotionClassifier,
    machine: SceneStateMachine,
    router: EventRouter,
}

impl CapturePath {
    pub fn new(
        geometry: MotionGeometry,
        classifier: MotionClassifier,
        machine: SceneStateMachine,
        router: EventRouter,
    ) -> Self {
        Self {
            geometry,
            classifier,
            machine,
            router,
        }
    }

    /// Handle one motion frame. A grid that does not match the configured
    /// resolution is rejected and should stop the source.
    pub fn process(&mut self, frame: RawMotionFrame) -> Result<Transition, FrameError> {
        frame.check_shape(&self.geometry)?;
        let triggered = self.classifier.classify(&frame);
        let transition = self.machine.update(frame.timestamp_ms, triggered);
        self.router.route(transition, triggered, frame);
        Ok(transition)
    }
}

/// Wire `capture` to `source` and drive it until the source ends, `shutdown`
/// is raised, or a frame is rejected.
///
/// The source owns the capture path through its callbacks, so dropping the
/// source on return closes every queue and lets the dispatchers drain.
pub fn run(
    mut source: Box<dyn FrameSource>,
    mut capture: CapturePath,
    latest: LatestImage,
    shutdown: &AtomicBool,
) -> Result<(), SourceError> {
    let name = source.name().to_string();

    source.on_image(Box::new(move |image| latest.store(image)));
    source.on_motion(Box::new(move |frame| capture.process(frame).map(|_| ())));

    info!(source = name, "capture path started");
    let result = source.run(shutdown);
    drop(source);

    match &result {
        Ok(()) => info!(source = name, "capture path stopped, queues closed"),
        Err(e) => error!(source = name, error = %e, "capture path failed, queues closed"),
    }
    result
}
