//! Camera frame source.
//!
//! This module provides `CameraSource` for live capture. The camera source is
//! responsible for:
//! - Opening a local capture device (e.g., /dev/video0)
//! - Turning read failures into "no frame this tick" instead of end-of-stream
//! - Mirroring every frame horizontally
//!
//! `stub://` devices produce a synthetic moving gradient. `drop_every=N` makes
//! every Nth read fail, `width=` / `height=` override the configured size.

use anyhow::Result;

use super::{
    is_local_location, is_stub, stub_dimension, stub_param, FrameSource, SourceDescriptor,
    SourceRead, SourceStats, MAX_STUB_DIMENSION,
};
#[cfg(feature = "ingest-v4l2")]
use super::v4l2::DeviceV4l2Source;
use crate::error::PipelineError;
use crate::frame::{rgb_len, Frame};

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Device path (e.g., "/dev/video0") or `stub://` location.
    pub device: String,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
    /// Requested capture rate.
    pub target_fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            width: 640,
            height: 480,
            target_fps: 30,
        }
    }
}

/// Live camera source.
pub struct CameraSource {
    descriptor: SourceDescriptor,
    backend: Option<CameraBackend>,
    stats: SourceStats,
}

enum CameraBackend {
    Synthetic(SyntheticCamera),
    #[cfg(feature = "ingest-v4l2")]
    Device(DeviceV4l2Source),
}

impl CameraSource {
    /// Open the device. Fails with `SourceUnavailable` if it cannot be opened.
    pub fn open(descriptor: SourceDescriptor, config: CameraConfig) -> Result<Self, PipelineError> {
        if !is_local_location(&config.device) {
            return Err(PipelineError::unavailable(
                &descriptor,
                "camera capture only supports local devices",
            ));
        }
        let backend = if is_stub(&config.device) {
            CameraBackend::Synthetic(SyntheticCamera::new(config))
        } else {
            open_device(&descriptor, config)?
        };
        log::info!("CameraSource: opened {}", descriptor);
        Ok(Self {
            descriptor,
            backend: Some(backend),
            stats: SourceStats::default(),
        })
    }
}

#[cfg(feature = "ingest-v4l2")]
fn open_device(descriptor: &SourceDescriptor, config: CameraConfig) -> Result<CameraBackend, PipelineError> {
    let device = config.device.clone();
    DeviceV4l2Source::open(config)
        .map(CameraBackend::Device)
        .map_err(|err| PipelineError::unavailable(descriptor, format!("{} ({:#})", device, err)))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_device(descriptor: &SourceDescriptor, _config: CameraConfig) -> Result<CameraBackend, PipelineError> {
    Err(PipelineError::unavailable(
        descriptor,
        "camera capture requires the ingest-v4l2 feature",
    ))
}

impl FrameSource for CameraSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn next_frame(&mut self) -> SourceRead {
        let sequence = self.stats.frames_read;
        let read = match self.backend.as_mut() {
            Some(CameraBackend::Synthetic(camera)) => camera.read(sequence),
            #[cfg(feature = "ingest-v4l2")]
            Some(CameraBackend::Device(camera)) => camera.read(sequence),
            None => Err(anyhow::anyhow!("camera closed")),
        };
        match read {
            Ok(Some(mut frame)) => {
                frame.mirror();
                self.stats.frames_read += 1;
                SourceRead::Frame(frame)
            }
            Ok(None) => {
                self.stats.failed_reads += 1;
                SourceRead::Retry
            }
            Err(err) => {
                log::debug!("CameraSource: read failed on {}: {:#}", self.descriptor, err);
                self.stats.failed_reads += 1;
                SourceRead::Retry
            }
        }
    }

    fn close(&mut self) {
        if self.backend.take().is_some() {
            log::info!(
                "CameraSource: released {} after {} frames",
                self.descriptor,
                self.stats.frames_read
            );
        }
    }

    fn stats(&self) -> SourceStats {
        self.stats.clone()
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests and demos
// ----------------------------------------------------------------------------

struct SyntheticCamera {
    width: u32,
    height: u32,
    drop_every: u64,
    attempts: u64,
}

impl SyntheticCamera {
    fn new(config: CameraConfig) -> Self {
        Self {
            width: stub_dimension(&config.device, "width")
                .unwrap_or(config.width.min(MAX_STUB_DIMENSION))
                .max(1),
            height: stub_dimension(&config.device, "height")
                .unwrap_or(config.height.min(MAX_STUB_DIMENSION))
                .max(1),
            drop_every: stub_param(&config.device, "drop_every").unwrap_or(0),
            attempts: 0,
        }
    }

    /// `Ok(None)` simulates a dropped read.
    fn read(&mut self, sequence: u64) -> Result<Option<Frame>> {
        self.attempts += 1;
        if self.drop_every > 0 && self.attempts % self.drop_every == 0 {
            return Ok(None);
        }
        Ok(Some(Frame::from_rgb(
            self.generate_pixels(sequence)?,
            self.width,
            self.height,
            sequence,
        )?))
    }

    /// Horizontal red ramp (so mirroring is visible) with a drifting green band.
    fn generate_pixels(&self, sequence: u64) -> Result<Vec<u8>> {
        let mut pixels = vec![0u8; rgb_len(self.width, self.height)?];
        let w = self.width as usize;
        let ramp = w.saturating_sub(1).max(1);
        for (i, px) in pixels.chunks_exact_mut(3).enumerate() {
            let (x, y) = (i % w, i / w);
            px[0] = (x * 255 / ramp) as u8;
            px[1] = ((y as u64 + sequence) % 256) as u8;
            px[2] = 64;
        }
        Ok(pixels)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
