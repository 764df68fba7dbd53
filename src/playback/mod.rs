//! Playback state machine and host loop.
//!
//! `Controller` owns the open source, the detector and the display sink, and
//! advances one frame per `tick()`. It never sleeps or spawns: it records the
//! delay it wants before the next tick and the `EventLoop` honours it.
//!
//! Responsibilities:
//! - at most one pending tick (a single schedule slot, overwritten not queued)
//! - ticks are no-ops unless Running or Paused
//! - the source is released on stop, quit, end-of-stream and before a reopen
//!
//! MUST NOT:
//! - touch the controller from any thread but the host loop's
//! - let a detector or source failure escape as a panic or `Err` from `tick()`

mod controller;
mod event_loop;

pub use controller::Controller;
pub use event_loop::{Command, EventLoop};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Running,
    Paused,
    Ended,
}

impl PlaybackState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    /// Word stamped on displayed frames when the status overlay is enabled.
    pub fn overlay_label(&self) -> &'static str {
        match self {
            Self::Running => "PLAYING",
            Self::Paused => "PAUSED",
            Self::Stopped => "STOPPED",
            Self::Ended => "ENDED",
        }
    }
}

/// What a single `tick()` did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not playing; stale ticks land here and do nothing.
    Idle,
    /// A frame was detected, annotated and presented.
    Presented { detections: usize },
    /// Paused: the held frame was redrawn, nothing was pulled.
    Held,
    /// Camera had no frame; retry scheduled.
    Retry,
    /// Detector raised; back-off scheduled.
    DetectorFailed,
    /// File source ran out. Playback is now `Ended`.
    Ended,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    pub frames_processed: u64,
    pub detector_invocations: u64,
    pub detector_failures: u64,
    pub camera_retries: u64,
    pub detections_drawn: u64,
}
