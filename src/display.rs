//! Display capability.
//!
//! The controller hands finished, viewport-sized RGB images and status lines
//! to a `DisplaySink`. Rendering to a window is a host concern; the sinks here
//! cover headless runs and frame dumps.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::RgbImage;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Success,
    Error,
}

/// One line of user-facing status text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    pub level: StatusLevel,
    pub message: String,
}

impl Status {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Error,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == StatusLevel::Error
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

pub trait DisplaySink {
    /// Target size for presented images. `None` keeps the frame size.
    fn viewport(&self) -> Option<(u32, u32)>;

    fn present(&mut self, image: &RgbImage) -> Result<()>;

    /// Blank the output after stop or end-of-stream.
    fn clear(&mut self);

    fn show_status(&mut self, status: &Status);
}

/// Counts presented frames and logs status lines.
#[derive(Debug, Default)]
pub struct HeadlessDisplay {
    viewport: Option<(u32, u32)>,
    presented: u64,
    cleared: u64,
    last_size: Option<(u32, u32)>,
    last_status: Option<Status>,
}

impl HeadlessDisplay {
    pub fn new(viewport: Option<(u32, u32)>) -> Self {
        Self {
            viewport,
            ..Self::default()
        }
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    pub fn cleared(&self) -> u64 {
        self.cleared
    }

    pub fn last_size(&self) -> Option<(u32, u32)> {
        self.last_size
    }

    pub fn last_status(&self) -> Option<&Status> {
        self.last_status.as_ref()
    }
}

impl DisplaySink for HeadlessDisplay {
    fn viewport(&self) -> Option<(u32, u32)> {
        self.viewport
    }

    fn present(&mut self, image: &RgbImage) -> Result<()> {
        self.presented += 1;
        self.last_size = Some(image.dimensions());
        Ok(())
    }

    fn clear(&mut self) {
        self.cleared += 1;
        self.last_size = None;
    }

    fn show_status(&mut self, status: &Status) {
        log_status(status);
        self.last_status = Some(status.clone());
    }
}

/// Writes every Nth presented frame to `dir` as `frame_000042.png`.
#[derive(Debug)]
pub struct SnapshotDisplay {
    dir: PathBuf,
    every: u32,
    viewport: Option<(u32, u32)>,
    presented: u64,
    written: u64,
}

impl SnapshotDisplay {
    pub fn new(dir: impl Into<PathBuf>, every: u32, viewport: Option<(u32, u32)>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create snapshot directory {}", dir.display()))?;
        log::info!(
            "SnapshotDisplay: writing every {} frame(s) to {}",
            every.max(1),
            dir.display()
        );
        Ok(Self {
            dir,
            every: every.max(1),
            viewport,
            presented: 0,
            written: 0,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl DisplaySink for SnapshotDisplay {
    fn viewport(&self) -> Option<(u32, u32)> {
        self.viewport
    }

    fn present(&mut self, image: &RgbImage) -> Result<()> {
        let index = self.presented;
        self.presented += 1;
        if index % u64::from(self.every) != 0 {
            return Ok(());
        }
        let path = self.dir.join(format!("frame_{:06}.png", index));
        image
            .save(&path)
            .with_context(|| format!("write snapshot {}", path.display()))?;
        self.written += 1;
        Ok(())
    }

    fn clear(&mut self) {}

    fn show_status(&mut self, status: &Status) {
        log_status(status);
    }
}

fn log_status(status: &Status) {
    match status.level {
        StatusLevel::Error => log::warn!("status: {}", status.message),
        _ => log::info!("status: {}", status.message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_tracks_frames_and_status() -> Result<()> {
        let mut display = HeadlessDisplay::new(Some((64, 48)));
        display.present(&RgbImage::new(64, 48))?;
        display.show_status(&Status::error("video ended"));
        assert_eq!(display.presented(), 1);
        assert_eq!(display.last_size(), Some((64, 48)));
        assert!(display.last_status().is_some_and(Status::is_error));
        display.clear();
        assert_eq!(display.last_size(), None);
        Ok(())
    }

    #[test]
    fn snapshot_writes_every_nth_frame() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut display = SnapshotDisplay::new(dir.path().join("shots"), 2, None)?;
        for _ in 0..5 {
            display.present(&RgbImage::new(4, 4))?;
        }
        assert_eq!(display.written(), 3);
        assert!(display.dir().join("frame_000000.png").exists());
        assert!(display.dir().join("frame_000004.png").exists());
        assert!(!display.dir().join("frame_000001.png").exists());
        Ok(())
    }
}
