//! Overlay rendering.
//!
//! Draws one rectangle and one `"{label} {confidence:.2}"` caption per
//! detection. Box corners are clamped to the frame plus a small margin
//! before any rectangle is built, and caption glyphs are placed in 64-bit
//! arithmetic and skipped when they fall outside the frame, so any box the
//! adapter accepts can be drawn.

mod glyphs;

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use self::glyphs::{glyph, GLYPH_ADVANCE, GLYPH_HEIGHT, GLYPH_WIDTH};
use crate::detect::{BoundingBox, Detection};
use crate::frame::Frame;
use crate::labels::LabelTable;

const BOX_THICKNESS: i32 = 2;
const TEXT_SCALE: u32 = 2;
/// Caption baseline sits this many pixels above the box's top edge.
const CAPTION_OFFSET: i32 = 10;
/// Corners are clamped this far outside the frame. Larger than the caption
/// offset plus glyph height, so a clamped box draws exactly what the
/// unclamped one would.
const CLIP_MARGIN: i64 = 32;
const STATUS_ORIGIN: (i64, i64) = (10, 30);
const STATUS_COLOR: Rgb<u8> = Rgb([255, 255, 0]);

/// Overlay colour for one detection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverlayColor {
    Green,
    Red,
}

impl OverlayColor {
    pub fn rgb(&self) -> Rgb<u8> {
        match self {
            Self::Green => Rgb([0, 255, 0]),
            Self::Red => Rgb([255, 0, 0]),
        }
    }
}

const NEGATED_HELMET: &[&str] = &["no helmet", "no-helmet", "no_helmet", "nohelmet", "without"];

/// Green for a helmet label, red for "no helmet" and everything else.
///
/// Decided on the resolved label text, never the class id, because the id
/// orientation differs between label tables.
pub fn overlay_color(label: &str) -> OverlayColor {
    let label = label.to_lowercase();
    let negated = NEGATED_HELMET.iter().any(|neg| label.contains(neg));
    if label.contains("helmet") && !negated {
        OverlayColor::Green
    } else {
        OverlayColor::Red
    }
}

/// Caption text for one detection.
pub fn caption(label: &str, confidence: f32) -> String {
    format!("{} {:.2}", label, confidence)
}

/// Draw every detection onto the frame and hand the buffer back.
pub fn annotate(mut frame: Frame, detections: &[Detection], labels: &LabelTable) -> Frame {
    let image = frame.image_mut();
    for det in detections {
        let label = labels.resolve(det.class_id);
        let color = overlay_color(label).rgb();
        draw_box(image, &det.bbox, color);
        draw_text(
            image,
            i64::from(det.bbox.left()),
            i64::from(det.bbox.top()) - i64::from(CAPTION_OFFSET),
            &caption(label, det.confidence),
            color,
        );
    }
    frame
}

/// Stamp a playback status word ("PLAYING", "PAUSED") in the top-left corner.
pub fn overlay_status(image: &mut RgbImage, status: &str) {
    draw_text(image, STATUS_ORIGIN.0, STATUS_ORIGIN.1, status, STATUS_COLOR);
}

fn draw_box(image: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
    let Some((left, top, width, height)) = clip_to_frame(bbox, image.width(), image.height())
    else {
        return;
    };
    for inset in 0..BOX_THICKNESS {
        let w = width.saturating_sub(2 * inset as u32).max(1);
        let h = height.saturating_sub(2 * inset as u32).max(1);
        let rect = Rect::at(left + inset, top + inset).of_size(w, h);
        draw_hollow_rect_mut(image, rect, color);
    }
}

/// Box origin and size with every edge clamped to `[-CLIP_MARGIN, dim + CLIP_MARGIN]`.
/// `None` when no part of the box can land on the frame.
fn clip_to_frame(bbox: &BoundingBox, width: u32, height: u32) -> Option<(i32, i32, u32, u32)> {
    let (frame_w, frame_h) = (i64::from(width), i64::from(height));
    let left = i64::from(bbox.left());
    let top = i64::from(bbox.top());
    let right = left + i64::from(bbox.width());
    let bottom = top + i64::from(bbox.height());
    if right < 0 || bottom < 0 || left >= frame_w || top >= frame_h {
        return None;
    }
    let clamp_x = |v: i64| v.clamp(-CLIP_MARGIN, frame_w + CLIP_MARGIN);
    let clamp_y = |v: i64| v.clamp(-CLIP_MARGIN, frame_h + CLIP_MARGIN);
    let (left, right) = (clamp_x(left), clamp_x(right));
    let (top, bottom) = (clamp_y(top), clamp_y(bottom));
    Some((
        i32::try_from(left).ok()?,
        i32::try_from(top).ok()?,
        u32::try_from(right - left).ok()?,
        u32::try_from(bottom - top).ok()?,
    ))
}

/// Width in pixels of `text` rendered at overlay scale.
pub fn text_width(text: &str) -> u32 {
    text.chars().count() as u32 * GLYPH_ADVANCE * TEXT_SCALE
}

/// Draw `text` with its baseline at `baseline_y`.
fn draw_text(image: &mut RgbImage, x: i64, baseline_y: i64, text: &str, color: Rgb<u8>) {
    let scale = i64::from(TEXT_SCALE);
    let top = baseline_y - i64::from(GLYPH_HEIGHT * TEXT_SCALE);
    let mut pen_x = x;
    for ch in text.chars() {
        if pen_x >= i64::from(image.width()) {
            break;
        }
        if let Some(rows) = glyph(ch) {
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if (bits >> (GLYPH_WIDTH - 1 - col)) & 1 == 1 {
                        let px = pen_x + i64::from(col) * scale;
                        let py = top + row as i64 * scale;
                        fill_cell(image, px, py, color);
                    }
                }
            }
        }
        pen_x += i64::from(GLYPH_ADVANCE * TEXT_SCALE);
    }
}

/// One glyph pixel at overlay scale; cells entirely off the frame are skipped.
fn fill_cell(image: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    let size = i64::from(TEXT_SCALE);
    let visible = x + size > 0
        && y + size > 0
        && x < i64::from(image.width())
        && y < i64::from(image.height());
    if !visible {
        return;
    }
    let (Ok(x), Ok(y)) = (i32::try_from(x), i32::try_from(y)) else {
        return;
    };
    draw_filled_rect_mut(image, Rect::at(x, y).of_size(TEXT_SCALE, TEXT_SCALE), color);
}
