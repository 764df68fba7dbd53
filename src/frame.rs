//! Decoded frames.
//!
//! - `Frame`: one RGB frame pulled from a source, tagged with its sequence number.
//!
//! Frames are transient: a source produces one per tick, the detector reads it,
//! the annotator consumes it and hands back the buffer for display.

use anyhow::{anyhow, Result};
use image::{imageops, RgbImage};

/// One decoded RGB frame.
///
/// `sequence` counts frames from the start of the stream (0-based) and restarts
/// at 0 when a file source is rewound.
pub struct Frame {
    pixels: RgbImage,
    sequence: u64,
}

/// Byte length of a packed RGB24 buffer, checked in `usize`.
pub(crate) fn rgb_len(width: u32, height: u32) -> Result<usize> {
    usize::try_from(width)
        .ok()
        .zip(usize::try_from(height).ok())
        .and_then(|(w, h)| w.checked_mul(h))
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("frame dimensions {}x{} overflow", width, height))
}

impl Frame {
    pub fn new(pixels: RgbImage, sequence: u64) -> Self {
        Self { pixels, sequence }
    }

    /// Build a frame from a packed RGB24 buffer.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        let pixels = RgbImage::from_raw(width, height, data)
            .ok_or_else(|| anyhow!("failed to build {}x{} RGB frame", width, height))?;
        Ok(Self::new(pixels, sequence))
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn image(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.pixels
    }

    pub fn into_image(self) -> RgbImage {
        self.pixels
    }

    /// Flip left/right in place (camera "mirror" view).
    pub fn mirror(&mut self) {
        imageops::flip_horizontal_in_place(&mut self.pixels);
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// Resize to the display viewport. Viewports of 1px or less are treated as
/// "not laid out yet" and leave the image untouched.
pub fn fit_to_viewport(image: RgbImage, viewport: Option<(u32, u32)>) -> RgbImage {
    match viewport {
        Some((w, h)) if w > 1 && h > 1 && (w, h) != image.dimensions() => {
            imageops::resize(&image, w, h, imageops::FilterType::Triangle)
        }
        _ => image,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn from_rgb_validates_length() {
        assert!(Frame::from_rgb(vec![0u8; 11], 2, 2, 0).is_err());
        let frame = Frame::from_rgb(vec![0u8; 12], 2, 2, 7).unwrap();
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.sequence(), 7);
    }

    #[test]
    fn rgb_len_is_checked() {
        assert_eq!(rgb_len(4, 2).unwrap(), 24);
        if usize::BITS == 32 {
            assert!(rgb_len(u32::MAX, u32::MAX).is_err());
        } else {
            assert_eq!(rgb_len(70_000, 70_000).unwrap(), 14_700_000_000);
        }
    }

    #[test]
    fn mirror_swaps_columns() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(1, 0, Rgb([0, 0, 255]));
        let mut frame = Frame::new(img, 0);
        frame.mirror();
        assert_eq!(frame.image().get_pixel(0, 0), &Rgb([0, 0, 255]));
        assert_eq!(frame.image().get_pixel(1, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn fit_to_viewport_ignores_unlaid_out_viewport() {
        let img = RgbImage::new(8, 6);
        assert_eq!(fit_to_viewport(img.clone(), Some((1, 1))).dimensions(), (8, 6));
        assert_eq!(fit_to_viewport(img.clone(), None).dimensions(), (8, 6));
        assert_eq!(fit_to_viewport(img, Some((4, 3))).dimensions(), (4, 3));
    }
}
