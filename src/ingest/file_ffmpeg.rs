//! Local video decoding using FFmpeg.
//!
//! Frames are decoded in-memory and scaled to packed RGB24. Rewinding reopens
//! the input, which is cheap for local files and avoids codec-specific seek
//! quirks.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;

use super::file::FileConfig;
use crate::frame::Frame;

pub(crate) struct FfmpegFileSource {
    config: FileConfig,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    frame_interval: Option<Duration>,
    flushed: bool,
}

impl FfmpegFileSource {
    pub(crate) fn new(config: FileConfig) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&config.path).with_context(|| {
            format!("failed to open '{}' with ffmpeg", config.path.display())
        })?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("file has no video track"))?;
        let stream_index = input_stream.index();
        let rate = input_stream.avg_frame_rate();
        let frame_interval = (rate.numerator() > 0 && rate.denominator() > 0).then(|| {
            Duration::from_secs_f64(rate.denominator() as f64 / rate.numerator() as f64)
        });
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        log::info!(
            "FileSource: decoding {} ({}x{}) with ffmpeg",
            config.path.display(),
            decoder.width(),
            decoder.height()
        );
        Ok(Self {
            config,
            input,
            stream_index,
            decoder,
            scaler,
            frame_interval,
            flushed: false,
        })
    }

    /// `Ok(None)` once every packet has been decoded and drained.
    pub(crate) fn read(&mut self, sequence: u64) -> Result<Option<Frame>> {
        let mut decoded = ffmpeg::frame::Video::empty();

        if self.decoder.receive_frame(&mut decoded).is_ok() {
            return self.convert(&decoded, sequence).map(Some);
        }

        loop {
            let next = self
                .input
                .packets()
                .next()
                .map(|(stream, packet)| (stream.index(), packet));
            let Some((index, packet)) = next else {
                break;
            };
            if index != self.stream_index {
                continue;
            }
            self.decoder
                .send_packet(&packet)
                .context("send packet to ffmpeg decoder")?;
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return self.convert(&decoded, sequence).map(Some);
            }
        }

        if !self.flushed {
            self.decoder.send_eof().context("flush ffmpeg decoder")?;
            self.flushed = true;
        }
        if self.decoder.receive_frame(&mut decoded).is_ok() {
            return self.convert(&decoded, sequence).map(Some);
        }
        Ok(None)
    }

    pub(crate) fn rewind(&mut self) -> Result<()> {
        *self = Self::new(self.config.clone())?;
        Ok(())
    }

    pub(crate) fn frame_interval(&self) -> Option<Duration> {
        self.frame_interval
    }

    fn convert(&mut self, decoded: &ffmpeg::frame::Video, sequence: u64) -> Result<Frame> {
        let mut rgb_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(decoded, &mut rgb_frame)
            .context("scale frame to RGB")?;
        let (pixels, width, height) = frame_to_pixels(&rgb_frame)?;
        Frame::from_rgb(pixels, width, height, sequence)
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        return Ok((data[..row_bytes * height as usize].to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}
