//! V4L2 capture device backend for `CameraSource`.
//!
//! Requests RGB24 and falls back to whatever the driver keeps (YUYV and NV12
//! are converted). Read errors are reported to the caller, which treats them as
//! transient.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use super::camera::CameraConfig;
use super::normalize::{normalize_to_rgb, PixelFormat};
use crate::frame::Frame;

pub(crate) struct DeviceV4l2Source {
    config: CameraConfig,
    state: DeviceV4l2State,
    format: PixelFormat,
    active_width: u32,
    active_height: u32,
}

#[self_referencing]
struct DeviceV4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl DeviceV4l2Source {
    pub(crate) fn open(config: CameraConfig) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&config.device)
            .with_context(|| format!("open v4l2 device {}", config.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = config.width;
        format.height = config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "CameraSource: failed to set format on {}: {}",
                    config.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        let pixel_format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            anyhow!(
                "unsupported pixel format {} on {}",
                format.fourcc,
                config.device
            )
        })?;

        if config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "CameraSource: failed to set fps on {}: {}",
                    config.device,
                    err
                );
            }
        }

        let state = DeviceV4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        log::info!(
            "CameraSource: {} streaming {}x{} {:?}",
            config.device,
            format.width,
            format.height,
            pixel_format
        );
        Ok(Self {
            config,
            state,
            format: pixel_format,
            active_width: format.width,
            active_height: format.height,
        })
    }

    /// Capture one frame. Errors are transient from the caller's point of view.
    pub(crate) fn read(&mut self, sequence: u64) -> Result<Option<Frame>> {
        use v4l::io::traits::CaptureStream;

        let raw = self
            .state
            .with_mut(|fields| fields.stream.next().map(|(buf, _meta)| buf.to_vec()))
            .with_context(|| format!("capture frame from {}", self.config.device))?;
        if raw.is_empty() {
            return Ok(None);
        }
        let rgb = normalize_to_rgb(&raw, self.active_width, self.active_height, self.format)?;
        Frame::from_rgb(rgb, self.active_width, self.active_height, sequence).map(Some)
    }
}
