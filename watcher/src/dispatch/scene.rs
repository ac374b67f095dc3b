use scene_watch_common::event::{SceneCapture, SceneEvent};
use tracing::info;

use super::{DispatchError, Handler};
use crate::sink::{CaptionClient, Endpoint, TelemetryClient};

/// Captions the end picture of each closed scene and reports the scene.
pub struct SceneDispatcher<C, T> {
    captioner: CaptionClient<C>,
    telemetry: TelemetryClient<T>,
    jpeg_quality: u8,
}

impl<C: Endpoint, T: Endpoint> SceneDispatcher<C, T> {
    pub fn new(captioner: CaptionClient<C>, telemetry: TelemetryClient<T>, jpeg_quality: u8) -> Self {
        Self {
            captioner,
            telemetry,
            jpeg_quality,
        }
    }
}

impl<C: Endpoint, T: Endpoint> Handler for SceneDispatcher<C, T> {
    type Item = SceneCapture;

    fn name(&self) -> &'static str {
        "scene"
    }

    async fn handle(&mut self, capture: SceneCapture) -> Result<(), DispatchError> {
        let jpeg = capture.end.jpeg(self.jpeg_quality)?;
        let caption = self.captioner.describe(jpeg).await?;
        info!(
            started_at_ms = capture.started_at_ms,
            duration_ms = capture.duration_ms(),
            caption = caption.text,
            confidence = caption.confidence,
            "scene captioned"
        );
        let event = SceneEvent::new(&capture, caption.text, caption.confidence, caption.tags);
        self.telemetry.send("scene", &event).await?;
        Ok(())
    }
}
