//! Frame sources.
//!
//! This module provides the two kinds of source the player can open:
//! - Cameras: local capture devices (feature: ingest-v4l2) or `stub://` devices
//! - Files: local video files (feature: ingest-file-ffmpeg), directories of
//!   still images, or `stub://` clips
//!
//! Sources differ in how they fail:
//! - A camera read failure is transient. `next_frame()` yields `SourceRead::Retry`
//!   and the caller tries again shortly. Cameras never end on their own.
//! - A file read failure is end-of-stream, and end-of-stream is sticky: every
//!   later call yields `SourceRead::EndOfStream` as well.
//!
//! Camera frames are mirrored horizontally before they are returned; file
//! frames are not.
//!
//! Sources MUST NOT fetch remote URLs.

pub mod camera;
pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
#[cfg(feature = "ingest-v4l2")]
pub(crate) mod v4l2;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use camera::{CameraConfig, CameraSource};
pub use file::{FileConfig, FileSource};

use crate::config::{CameraSettings, FileSettings};
use crate::error::PipelineError;
use crate::frame::Frame;

/// Extensions offered when picking a video file.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "webm"];

/// What to open: a camera by index or a file by path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceDescriptor {
    Camera { index: u32 },
    File { path: PathBuf },
}

impl SourceDescriptor {
    pub fn camera(index: u32) -> Self {
        Self::Camera { index }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File { path: path.into() }
    }

    /// Camera frames are shown mirrored; file frames are not.
    pub fn is_mirrored(&self) -> bool {
        matches!(self, Self::Camera { .. })
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Self::File { .. })
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Camera { index } => write!(f, "camera {}", index),
            Self::File { path } => write!(f, "{}", path.display()),
        }
    }
}

/// Outcome of one read.
#[derive(Debug)]
pub enum SourceRead {
    Frame(Frame),
    /// Camera only: nothing this tick, try again shortly.
    Retry,
    /// File only: no more frames, ever.
    EndOfStream,
}

/// Statistics for an open source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_read: u64,
    pub failed_reads: u64,
}

/// An open, exclusively owned stream of frames.
pub trait FrameSource {
    fn descriptor(&self) -> &SourceDescriptor;

    /// Pull the next frame.
    fn next_frame(&mut self) -> SourceRead;

    /// Seek back to the first frame. Cameras cannot rewind.
    fn rewind(&mut self) -> Result<(), PipelineError> {
        Err(PipelineError::ResetUnsupported)
    }

    /// Native spacing between frames, when the source knows it.
    fn frame_interval(&self) -> Option<Duration> {
        None
    }

    /// Release the underlying device or file. Reads after close end the stream
    /// (files) or retry (cameras).
    fn close(&mut self);

    fn stats(&self) -> SourceStats;
}

/// Opens sources for the playback controller.
pub trait SourceOpener {
    fn open(&mut self, descriptor: &SourceDescriptor) -> Result<Box<dyn FrameSource>, PipelineError>;
}

/// Production opener: real devices and files, configured from settings.
#[derive(Clone, Debug, Default)]
pub struct DeviceOpener {
    camera: CameraSettings,
    file: FileSettings,
}

impl DeviceOpener {
    pub fn new(camera: CameraSettings, file: FileSettings) -> Self {
        Self { camera, file }
    }
}

impl SourceOpener for DeviceOpener {
    fn open(&mut self, descriptor: &SourceDescriptor) -> Result<Box<dyn FrameSource>, PipelineError> {
        match descriptor {
            SourceDescriptor::Camera { index } => {
                let config = CameraConfig {
                    device: self.camera.device_for(*index),
                    width: self.camera.width,
                    height: self.camera.height,
                    target_fps: self.camera.target_fps,
                };
                Ok(Box::new(CameraSource::open(descriptor.clone(), config)?))
            }
            SourceDescriptor::File { path } => {
                let config = FileConfig {
                    path: path.clone(),
                    fps_hint: self.file.fps_hint,
                };
                Ok(Box::new(FileSource::open(descriptor.clone(), config)?))
            }
        }
    }
}

/// True when `path` carries one of the video extensions in `VIDEO_EXTENSIONS`.
pub fn is_supported_video_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            VIDEO_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

pub(crate) fn is_stub(location: &str) -> bool {
    location.starts_with("stub://")
}

/// Rejects anything that looks like a network URL.
pub(crate) fn is_local_location(location: &str) -> bool {
    if location.trim().is_empty() {
        return false;
    }
    if is_stub(location) {
        return true;
    }
    !location.contains("://")
}

/// Largest width or height a synthetic source will generate.
pub(crate) const MAX_STUB_DIMENSION: u32 = 4096;

/// Read a `width=` / `height=` stub parameter, clamped to `1..=MAX_STUB_DIMENSION`.
pub(crate) fn stub_dimension(location: &str, key: &str) -> Option<u32> {
    stub_param(location, key).map(|v| {
        u32::try_from(v)
            .unwrap_or(MAX_STUB_DIMENSION)
            .clamp(1, MAX_STUB_DIMENSION)
    })
}

/// Read a numeric `key=value` query parameter from a `stub://name?k=v&...` location.
pub(crate) fn stub_param(location: &str, key: &str) -> Option<u64> {
    let (_, query) = location.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .and_then(|(_, v)| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_extensions_match_case_insensitively() {
        assert!(is_supported_video_path(Path::new("clips/site.MP4")));
        assert!(is_supported_video_path(Path::new("a.webm")));
        assert!(!is_supported_video_path(Path::new("a.txt")));
        assert!(!is_supported_video_path(Path::new("mp4")));
    }

    #[test]
    fn rejects_network_locations() {
        assert!(is_local_location("/var/video.mp4"));
        assert!(is_local_location("stub://clip"));
        assert!(!is_local_location("rtsp://camera/stream"));
        assert!(!is_local_location("  "));
    }

    #[test]
    fn reads_stub_parameters() {
        assert_eq!(stub_param("stub://clip?frames=10&width=64", "frames"), Some(10));
        assert_eq!(stub_param("stub://clip?frames=10&width=64", "width"), Some(64));
        assert_eq!(stub_param("stub://clip?frames=x", "frames"), None);
        assert_eq!(stub_param("stub://clip", "frames"), None);
    }

    #[test]
    fn stub_dimensions_never_wrap() {
        assert_eq!(stub_dimension("stub://clip?width=64", "width"), Some(64));
        assert_eq!(stub_dimension("stub://clip?width=0", "width"), Some(1));
        assert_eq!(
            stub_dimension("stub://clip?width=4294967297", "width"),
            Some(MAX_STUB_DIMENSION)
        );
        assert_eq!(
            stub_dimension("stub://clip?height=70000", "height"),
            Some(MAX_STUB_DIMENSION)
        );
        assert_eq!(stub_dimension("stub://clip", "width"), None);
    }

    #[test]
    fn only_cameras_are_mirrored() {
        assert!(SourceDescriptor::camera(0).is_mirrored());
        assert!(!SourceDescriptor::file("a.mp4").is_mirrored());
        assert_eq!(SourceDescriptor::camera(2).to_string(), "camera 2");
    }
}
