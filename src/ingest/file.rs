//! Local file frame source.
//!
//! This module provides `FileSource` for playing back local media. The file
//! source is responsible for:
//! - Reading frames from a local video file (feature: ingest-file-ffmpeg), a
//!   directory of still images, a single still image, or a `stub://` clip
//! - Turning any read failure into a sticky end-of-stream
//! - Rewinding to the first frame on request
//!
//! The file source MUST NOT fetch remote URLs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::{
    is_local_location, is_stub, stub_dimension, stub_param, FrameSource, SourceDescriptor,
    SourceRead, SourceStats,
};
use crate::error::PipelineError;
use crate::frame::{rgb_len, Frame};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Configuration for a local file source.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Local path, or `stub://name?frames=N`.
    pub path: PathBuf,
    /// Playback rate for sources with no native timing (image sequences).
    pub fps_hint: u32,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            fps_hint: 25,
        }
    }
}

/// Local file frame source.
pub struct FileSource {
    descriptor: SourceDescriptor,
    backend: Option<FileBackend>,
    ended: bool,
    stats: SourceStats,
}

enum FileBackend {
    Synthetic(SyntheticClip),
    Images(ImageSequence),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    /// Open the file. Fails with `SourceUnavailable` if it cannot be opened.
    pub fn open(descriptor: SourceDescriptor, config: FileConfig) -> Result<Self, PipelineError> {
        let backend = open_backend(&config).map_err(|err| PipelineError::unavailable(&descriptor, format!("{:#}", err)))?;
        log::info!("FileSource: opened {}", descriptor);
        Ok(Self {
            descriptor,
            backend: Some(backend),
            ended: false,
            stats: SourceStats::default(),
        })
    }

    fn end(&mut self) -> SourceRead {
        if !self.ended {
            log::info!(
                "FileSource: end of stream on {} after {} frames",
                self.descriptor,
                self.stats.frames_read
            );
        }
        self.ended = true;
        SourceRead::EndOfStream
    }
}

fn open_backend(config: &FileConfig) -> Result<FileBackend> {
    let location = config.path.to_string_lossy();
    if !is_local_location(&location) {
        return Err(anyhow!("file playback only supports local paths (no URL schemes)"));
    }
    if is_stub(&location) {
        return Ok(FileBackend::Synthetic(SyntheticClip::new(&location)));
    }
    let path = config.path.as_path();
    let metadata = std::fs::metadata(path).with_context(|| format!("cannot access {}", path.display()))?;
    if metadata.is_dir() || is_image_path(path) {
        return Ok(FileBackend::Images(ImageSequence::open(path, config.fps_hint)?));
    }
    open_video(config)
}

#[cfg(feature = "ingest-file-ffmpeg")]
fn open_video(config: &FileConfig) -> Result<FileBackend> {
    Ok(FileBackend::Ffmpeg(FfmpegFileSource::new(config.clone())?))
}

#[cfg(not(feature = "ingest-file-ffmpeg"))]
fn open_video(_config: &FileConfig) -> Result<FileBackend> {
    Err(anyhow!("video decoding requires the ingest-file-ffmpeg feature"))
}

fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

impl FrameSource for FileSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn next_frame(&mut self) -> SourceRead {
        if self.ended {
            return SourceRead::EndOfStream;
        }
        let sequence = self.stats.frames_read;
        let read = match self.backend.as_mut() {
            Some(FileBackend::Synthetic(clip)) => clip.read(sequence),
            Some(FileBackend::Images(images)) => images.read(sequence),
            #[cfg(feature = "ingest-file-ffmpeg")]
            Some(FileBackend::Ffmpeg(video)) => video.read(sequence),
            None => Ok(None),
        };
        match read {
            Ok(Some(frame)) => {
                self.stats.frames_read += 1;
                SourceRead::Frame(frame)
            }
            Ok(None) => self.end(),
            Err(err) => {
                log::warn!("FileSource: read failed on {}: {:#}", self.descriptor, err);
                self.stats.failed_reads += 1;
                self.end()
            }
        }
    }

    fn rewind(&mut self) -> Result<(), PipelineError> {
        let rewound = match self.backend.as_mut() {
            Some(FileBackend::Synthetic(clip)) => {
                clip.rewind();
                Ok(())
            }
            Some(FileBackend::Images(images)) => {
                images.rewind();
                Ok(())
            }
            #[cfg(feature = "ingest-file-ffmpeg")]
            Some(FileBackend::Ffmpeg(video)) => video.rewind(),
            None => Err(anyhow!("source already released")),
        };
        rewound.map_err(|err| PipelineError::unavailable(&self.descriptor, format!("{:#}", err)))?;
        self.ended = false;
        self.stats.frames_read = 0;
        log::info!("FileSource: rewound {}", self.descriptor);
        Ok(())
    }

    fn frame_interval(&self) -> Option<Duration> {
        match self.backend.as_ref()? {
            FileBackend::Synthetic(_) => None,
            FileBackend::Images(images) => images.frame_interval(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(video) => video.frame_interval(),
        }
    }

    fn close(&mut self) {
        if self.backend.take().is_some() {
            log::info!("FileSource: released {}", self.descriptor);
        }
    }

    fn stats(&self) -> SourceStats {
        self.stats.clone()
    }
}

// ----------------------------------------------------------------------------
// Synthetic clip (stub://) for tests
// ----------------------------------------------------------------------------

struct SyntheticClip {
    frames: u64,
    width: u32,
    height: u32,
    position: u64,
}

impl SyntheticClip {
    fn new(location: &str) -> Self {
        Self {
            frames: stub_param(location, "frames").unwrap_or(100),
            width: stub_dimension(location, "width").unwrap_or(320),
            height: stub_dimension(location, "height").unwrap_or(240),
            position: 0,
        }
    }

    fn read(&mut self, sequence: u64) -> Result<Option<Frame>> {
        if self.position >= self.frames {
            return Ok(None);
        }
        self.position += 1;
        let mut pixels = vec![0u8; rgb_len(self.width, self.height)?];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.position) % 256) as u8;
        }
        Ok(Some(Frame::from_rgb(pixels, self.width, self.height, sequence)?))
    }

    fn rewind(&mut self) {
        self.position = 0;
    }
}

// ----------------------------------------------------------------------------
// Still images: a directory (sorted by file name) or a single file
// ----------------------------------------------------------------------------

struct ImageSequence {
    paths: Vec<PathBuf>,
    position: usize,
    fps: u32,
}

impl ImageSequence {
    fn open(path: &Path, fps: u32) -> Result<Self> {
        let paths = if path.is_dir() {
            let mut paths = Vec::new();
            for entry in std::fs::read_dir(path).with_context(|| format!("cannot list {}", path.display()))? {
                let entry_path = entry?.path();
                if entry_path.is_file() && is_image_path(&entry_path) {
                    paths.push(entry_path);
                }
            }
            paths.sort();
            paths
        } else {
            vec![path.to_path_buf()]
        };
        if paths.is_empty() {
            return Err(anyhow!("{} contains no png/jpg frames", path.display()));
        }
        Ok(Self {
            paths,
            position: 0,
            fps,
        })
    }

    fn read(&mut self, sequence: u64) -> Result<Option<Frame>> {
        let Some(path) = self.paths.get(self.position) else {
            return Ok(None);
        };
        self.position += 1;
        let image = image::open(path)
            .with_context(|| format!("decode {}", path.display()))?
            .to_rgb8();
        Ok(Some(Frame::new(image, sequence)))
    }

    fn rewind(&mut self) {
        self.position = 0;
    }

    fn frame_interval(&self) -> Option<Duration> {
        (self.fps > 0).then(|| Duration::from_secs_f64(1.0 / self.fps as f64))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::MAX_STUB_DIMENSION;
    use image::{Rgb, RgbImage};

    fn open(path: impl Into<PathBuf>) -> Result<FileSource, PipelineError> {
        let path = path.into();
        FileSource::open(
            SourceDescriptor::file(path.clone()),
            FileConfig { path, fps_hint: 20 },
        )
    }

    #[test]
    fn synthetic_clip_ends_and_stays_ended() {
        let mut source = open("stub://clip?frames=3&width=8&height=4").unwrap();
        for expected in 0..3 {
            match source.next_frame() {
                SourceRead::Frame(frame) => {
                    assert_eq!(frame.sequence(), expected);
                    assert_eq!(frame.image().dimensions(), (8, 4));
                }
                other => panic!("expected frame, got {:?}", other),
            }
        }
        for _ in 0..3 {
            assert!(matches!(source.next_frame(), SourceRead::EndOfStream));
        }
    }

    #[test]
    fn synthetic_clip_clamps_oversized_dimensions() {
        let mut source = open("stub://clip?frames=1&width=4294967297&height=2").unwrap();
        match source.next_frame() {
            SourceRead::Frame(frame) => {
                assert_eq!(frame.image().dimensions(), (MAX_STUB_DIMENSION, 2));
            }
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn rewind_restarts_from_first_frame() {
        let mut source = open("stub://clip?frames=2").unwrap();
        while !matches!(source.next_frame(), SourceRead::EndOfStream) {}
        source.rewind().unwrap();
        match source.next_frame() {
            SourceRead::Frame(frame) => assert_eq!(frame.sequence(), 0),
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn missing_file_is_unavailable() {
        let err = open("missing.mp4").err().unwrap();
        assert!(matches!(err, PipelineError::SourceUnavailable { .. }));
        assert!(err.to_string().contains("missing.mp4"));
    }

    #[test]
    fn network_paths_are_unavailable() {
        assert!(open("http://example.com/clip.mp4").is_err());
    }

    #[test]
    fn plays_image_directory_in_name_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        for (name, shade) in [("b.png", 200u8), ("a.png", 100u8)] {
            RgbImage::from_pixel(4, 2, Rgb([shade, 0, 0])).save(dir.path().join(name))?;
        }
        std::fs::write(dir.path().join("notes.txt"), "not a frame")?;

        let mut source = open(dir.path()).map_err(anyhow::Error::from)?;
        assert_eq!(source.frame_interval(), Some(Duration::from_millis(50)));
        let mut shades = Vec::new();
        while let SourceRead::Frame(frame) = source.next_frame() {
            shades.push(frame.image().get_pixel(0, 0)[0]);
        }
        assert_eq!(shades, vec![100, 200]);
        assert!(matches!(source.next_frame(), SourceRead::EndOfStream));
        Ok(())
    }

    #[test]
    fn corrupt_image_ends_the_stream() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("0001.png"), b"not a png")?;
        let mut source = open(dir.path()).map_err(anyhow::Error::from)?;
        assert!(matches!(source.next_frame(), SourceRead::EndOfStream));
        assert!(matches!(source.next_frame(), SourceRead::EndOfStream));
        assert_eq!(source.stats().failed_reads, 1);
        Ok(())
    }

    #[test]
    fn empty_directory_is_unavailable() -> Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(open(dir.path()).is_err());
        Ok(())
    }

    #[test]
    fn closed_file_reports_end_of_stream() {
        let mut source = open("stub://clip?frames=5").unwrap();
        source.close();
        assert!(matches!(source.next_frame(), SourceRead::EndOfStream));
    }
}
