//! Helmet Watch
//!
//! Plays a camera or a local video file through a helmet / no-helmet detector
//! and shows each frame with its detections drawn on top.
//!
//! # Pipeline
//!
//! Each controller tick runs one frame through:
//!
//! 1. **Source** (`ingest`): camera frames are mirrored and may be dropped
//!    transiently; file frames end with a sticky end-of-stream.
//! 2. **Detector** (`detect`): an offline backend returns raw results in
//!    whatever shape it produces; `detect::normalize` turns them into
//!    `Detection`s and silently drops malformed items.
//! 3. **Annotator** (`annotate`): one box and one caption per detection,
//!    green for a helmet label and red otherwise.
//! 4. **Display** (`display`): the annotated frame, resized to the viewport.
//!
//! # Module Structure
//!
//! - `playback`: the `Controller` state machine and the host `EventLoop`
//! - `config`: file + environment configuration
//! - `labels`: class id to display name resolution
//! - `error`: the pipeline failure taxonomy

pub mod annotate;
pub mod config;
pub mod detect;
pub mod display;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod labels;
pub mod playback;

pub use config::{AppConfig, PlaybackSettings};
pub use detect::{normalize, select_backend, Detection, DetectorBackend};
pub use display::{DisplaySink, HeadlessDisplay, SnapshotDisplay, Status, StatusLevel};
pub use error::PipelineError;
pub use frame::Frame;
pub use ingest::{DeviceOpener, FrameSource, SourceDescriptor, SourceOpener, SourceRead};
pub use labels::{ClassLabelMap, LabelTable, UNKNOWN_LABEL};
pub use playback::{Command, Controller, EventLoop, PlaybackState, PlaybackStats, TickOutcome};

/// Detections below this confidence are discarded by the detector.
pub const CONFIDENCE_THRESHOLD: f32 = 0.5;
