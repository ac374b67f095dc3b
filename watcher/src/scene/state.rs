use std::time::Duration;

use tracing::{debug, info, warn};

/// Hysteresis bookkeeping. Owned by the capture path only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SceneState {
    pub active: bool,
    pub last_triggered_at: Option<i64>,
    pub last_untriggered_at: Option<i64>,
    /// Timestamp of the rising edge of the current scene.
    pub started_at: Option<i64>,
    last_seen_at: Option<i64>,
}

/// Outcome of feeding one classified frame to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Idle, nothing moving.
    Quiet,
    /// Rising edge on this frame.
    Started,
    /// Scene still open: the frame moved, or the falloff window has not elapsed.
    Continued,
    /// Falling edge on this frame.
    Ended { started_at_ms: i64 },
    /// Frame older than one already processed; ignored.
    OutOfOrder,
}

impl Transition {
    /// Whether this frame was observed while a scene was already open, and
    /// so carries a motion sample.
    pub fn in_scene(&self) -> bool {
        matches!(self, Transition::Continued | Transition::Ended { .. })
    }
}

/// Turns a noisy per-frame triggered/untriggered stream into scene intervals.
///
/// A scene opens on the first triggered frame and closes on the first
/// untriggered frame arriving more than `falloff` after the last triggered one.
pub struct SceneStateMachine {
    state: SceneState,
    falloff_ms: i64,
}

impl SceneStateMachine {
    pub fn new(falloff: Duration) -> Self {
        Self {
            state: SceneState::default(),
            falloff_ms: falloff.as_millis() as i64,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &SceneState {
        &self.state
    }

    #[cfg(test)]
    pub fn is_active(&self) -> bool {
        self.state.active
    }

    pub fn update(&mut self, t: i64, triggered: bool) -> Transition {
        if let Some(prev) = self.state.last_seen_at {
            if t < prev {
                warn!(ts = t, previous = prev, "frame timestamp went backwards, ignoring frame");
                return Transition::OutOfOrder;
            }
        }
        self.state.last_seen_at = Some(t);

        if triggered {
            self.state.last_triggered_at = Some(t);
            if self.state.active {
                return Transition::Continued;
            }
            self.state.active = true;
            self.state.started_at = Some(t);
            info!(ts = t, last_quiet_at = ?self.state.last_untriggered_at, "IDLE→ACTIVE: motion detected");
            return Transition::Started;
        }

        self.state.last_untriggered_at = Some(t);
        if !self.state.active {
            return Transition::Quiet;
        }

        // A scene cannot close before a triggered frame has been recorded.
        let Some(last) = self.state.last_triggered_at else {
            return Transition::Continued;
        };

        let silent_ms = t - last;
        if silent_ms <= self.falloff_ms {
            debug!(ts = t, silent_ms, falloff_ms = self.falloff_ms, "ACTIVE: within falloff");
            return Transition::Continued;
        }

        self.state.active = false;
        let started_at_ms = self.state.started_at.take().unwrap_or(last);
        info!(
            ts = t,
            started_at_ms,
            duration_ms = t - started_at_ms,
            silent_ms,
            "ACTIVE→IDLE: motion vanished"
        );
        Transition::Ended { started_at_ms }
    }
}
