//! Normalizes raw detector output into canonical `Detection` records.
//!
//! Conversion never fails the frame: an item whose box cannot be read is
//! dropped, a missing or unreadable class becomes `None`, and a missing or
//! unreadable confidence becomes 0.0.

use crate::detect::result::{BoundingBox, Detection, RawBox, RawResult, RawValue};
use crate::error::PipelineError;

/// Flatten every raw result into canonical detections, in detector order.
pub fn normalize(results: &[RawResult]) -> Vec<Detection> {
    results
        .iter()
        .filter_map(|result| result.boxes.as_deref())
        .flatten()
        .filter_map(|raw| match normalize_box(raw) {
            Ok(detection) => Some(detection),
            Err(err) => {
                log::trace!("dropping detection: {}", err);
                None
            }
        })
        .collect()
}

/// Convert a single raw box.
pub fn normalize_box(raw: &RawBox) -> Result<Detection, PipelineError> {
    let bbox = extract_box(raw.xyxy.as_ref())?;
    let class_id = raw.cls.as_ref().and_then(scalar).and_then(to_class_id);
    let confidence = raw
        .conf
        .as_ref()
        .and_then(scalar)
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, 1.0) as f32)
        .unwrap_or(0.0);
    Ok(Detection {
        bbox,
        class_id,
        confidence,
    })
}

fn extract_box(value: Option<&RawValue>) -> Result<BoundingBox, PipelineError> {
    let value = value.ok_or_else(|| malformed("missing box coordinates"))?;
    let mut leaves = Vec::with_capacity(4);
    first_leaves(value, &mut leaves);
    if leaves.len() < 4 {
        return Err(malformed(format!(
            "expected 4 box coordinates, got {}",
            leaves.len()
        )));
    }
    let mut corners = [0i32; 4];
    for (slot, leaf) in corners.iter_mut().zip(&leaves) {
        *slot = truncate(coordinate(leaf)?)?;
    }
    let [x1, y1, x2, y2] = corners;
    Ok(BoundingBox { x1, y1, x2, y2 })
}

/// Collect the first four leaves in row-major order. Values past the fourth
/// are never looked at.
fn first_leaves<'a>(value: &'a RawValue, out: &mut Vec<&'a RawValue>) {
    match value {
        RawValue::Array(items) => {
            for item in items {
                if out.len() == 4 {
                    break;
                }
                first_leaves(item, out);
            }
        }
        RawValue::Wrapped { item } => first_leaves(item, out),
        leaf => {
            if out.len() < 4 {
                out.push(leaf);
            }
        }
    }
}

fn coordinate(leaf: &RawValue) -> Result<f64, PipelineError> {
    match leaf {
        RawValue::Number(n) => Ok(*n),
        RawValue::Text(text) => parse_number(text),
        other => Err(malformed(format!("unreadable coordinate {:?}", other))),
    }
}

/// Read one scalar: unwrap wrappers, take the first element of arrays.
fn scalar(value: &RawValue) -> Option<f64> {
    match value {
        RawValue::Number(n) => Some(*n),
        RawValue::Text(text) => parse_number(text).ok(),
        RawValue::Array(items) => items.first().and_then(scalar),
        RawValue::Wrapped { item } => scalar(item),
        RawValue::Other(_) => None,
    }
}

fn to_class_id(value: f64) -> Option<u32> {
    if !value.is_finite() || value < 0.0 || value > u32::MAX as f64 {
        return None;
    }
    Some(value.trunc() as u32)
}

fn truncate(value: f64) -> Result<i32, PipelineError> {
    if !value.is_finite() || value < i32::MIN as f64 || value > i32::MAX as f64 {
        return Err(malformed(format!("coordinate {} is not representable", value)));
    }
    Ok(value.trunc() as i32)
}

fn parse_number(text: &str) -> Result<f64, PipelineError> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| malformed(format!("'{}' is not a number", text)))
}

fn malformed(msg: impl Into<String>) -> PipelineError {
    PipelineError::MalformedDetectionItem(msg.into())
}
