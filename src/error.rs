//! Pipeline failure taxonomy.
//!
//! Nothing in the playback pipeline is fatal to the process. Every variant here
//! degrades to a status message and a safe state transition.

use std::fmt;

/// Failures the playback pipeline can surface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineError {
    /// The camera or file could not be opened.
    SourceUnavailable { source: String, reason: String },
    /// Camera read failed this tick; retried after a short delay.
    TransientReadFailure,
    /// File source has no more frames. Terminal for the playback session.
    EndOfStream,
    /// The detector raised while processing a frame.
    DetectionInvocation(String),
    /// A raw detection item could not be converted. Dropped, never surfaced.
    MalformedDetectionItem(String),
    /// "Start video" was requested before any file was loaded.
    NoSourceLoaded,
    /// `reset()` only applies to file playback.
    ResetUnsupported,
}

impl PipelineError {
    pub(crate) fn unavailable(source: impl fmt::Display, reason: impl fmt::Display) -> Self {
        Self::SourceUnavailable {
            source: source.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceUnavailable { source, reason } => {
                write!(f, "failed to open {}: {}", source, reason)
            }
            Self::TransientReadFailure => write!(f, "camera read failed, retrying"),
            Self::EndOfStream => write!(f, "video ended"),
            Self::DetectionInvocation(msg) => write!(f, "inference error: {}", msg),
            Self::MalformedDetectionItem(msg) => write!(f, "malformed detection item: {}", msg),
            Self::NoSourceLoaded => write!(f, "no video loaded"),
            Self::ResetUnsupported => write!(f, "reset is only available for video files"),
        }
    }
}

impl std::error::Error for PipelineError {}
