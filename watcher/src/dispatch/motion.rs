use scene_watch_common::event::{MotionEvent, MotionSample};
use scene_watch_common::frame::MotionGeometry;

use super::{DispatchError, Handler};
use crate::sink::{Endpoint, TelemetryClient};

/// Summarizes motion samples and forwards them to telemetry.
pub struct MotionDispatcher<E> {
    telemetry: TelemetryClient<E>,
    geometry: MotionGeometry,
}

impl<E: Endpoint> MotionDispatcher<E> {
    pub fn new(telemetry: TelemetryClient<E>, geometry: MotionGeometry) -> Self {
        Self {
            telemetry,
            geometry,
        }
    }
}

impl<E: Endpoint> Handler for MotionDispatcher<E> {
    type Item = MotionSample;

    fn name(&self) -> &'static str {
        "motion"
    }

    async fn handle(&mut self, sample: MotionSample) -> Result<(), DispatchError> {
        let event = MotionEvent::from_sample(&sample, &self.geometry);
        self.telemetry.send("motion", &event).await?;
        Ok(())
    }
}
