#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops;
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{RawBox, RawResult, RawValue};
use crate::frame::Frame;
use crate::labels::ClassLabelMap;

const NMS_IOU_THRESHOLD: f32 = 0.45;

/// Tract-based backend for YOLO-style ONNX exports.
///
/// Expects a single input `[1, 3, S, S]` (RGB, 0..1) and a single output
/// `[1, 4 + classes, anchors]` whose first four rows are centre-x, centre-y,
/// width and height in input pixels. Frames are stretched to `S x S` and boxes
/// are scaled back to frame pixels.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_size: u32,
    names: Option<ClassLabelMap>,
}

struct Candidate {
    xyxy: [f32; 4],
    class_id: usize,
    score: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let size = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size,
            names: None,
        })
    }

    /// Attach the class names the model was exported with.
    pub fn with_names(mut self, names: ClassLabelMap) -> Self {
        self.names = Some(names).filter(|n| !n.is_empty());
        self
    }

    fn build_input(&self, frame: &Frame) -> Tensor {
        let size = self.input_size;
        let resized = imageops::resize(frame.image(), size, size, imageops::FilterType::Triangle);
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, size as usize, size as usize),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );
        input.into_tensor()
    }

    fn decode(
        &self,
        outputs: TVec<TValue>,
        frame: &Frame,
        confidence_threshold: f32,
    ) -> Result<Vec<Candidate>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape();
        if shape.len() != 3 || shape[0] != 1 || shape[1] < 5 {
            return Err(anyhow!("unexpected model output shape {:?}", shape));
        }
        let rows = shape[1];
        let anchors = shape[2];
        let sx = frame.width() as f32 / self.input_size as f32;
        let sy = frame.height() as f32 / self.input_size as f32;

        let mut candidates = Vec::new();
        for a in 0..anchors {
            let (class_id, score) = (4..rows)
                .map(|r| (r - 4, view[[0, r, a]]))
                .fold((0, f32::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best });
            if !score.is_finite() || score < confidence_threshold {
                continue;
            }
            let (cx, cy, w, h) = (
                view[[0, 0, a]],
                view[[0, 1, a]],
                view[[0, 2, a]],
                view[[0, 3, a]],
            );
            candidates.push(Candidate {
                xyxy: [
                    (cx - w / 2.0) * sx,
                    (cy - h / 2.0) * sy,
                    (cx + w / 2.0) * sx,
                    (cy + h / 2.0) * sy,
                ],
                class_id,
                score,
            });
        }
        Ok(non_max_suppression(candidates, NMS_IOU_THRESHOLD))
    }
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let iy = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = ix * iy;
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Class-aware greedy NMS, highest score first.
fn non_max_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut kept: Vec<Candidate> = Vec::new();
    for cand in candidates {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == cand.class_id && iou(&k.xyxy, &cand.xyxy) > iou_threshold);
        if !suppressed {
            kept.push(cand);
        }
    }
    kept
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn class_names(&self) -> Option<&ClassLabelMap> {
        self.names.as_ref()
    }

    fn detect(&mut self, frame: &Frame, confidence_threshold: f32) -> Result<Vec<RawResult>> {
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let boxes = self
            .decode(outputs, frame, confidence_threshold)?
            .into_iter()
            .map(|c| RawBox {
                xyxy: Some(RawValue::Array(vec![RawValue::array(
                    c.xyxy.iter().map(|v| *v as f64),
                )])),
                cls: Some(RawValue::array([c.class_id as f64])),
                conf: Some(RawValue::array([c.score as f64])),
            })
            .collect();
        Ok(vec![RawResult::with_boxes(boxes)])
    }

    fn warm_up(&mut self) -> Result<()> {
        let size = self.input_size as usize;
        let input = tract_ndarray::Array4::<f32>::zeros((1, 3, size, size)).into_tensor();
        self.model
            .run(tvec!(input.into()))
            .context("ONNX warm-up failed")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(xyxy: [f32; 4], class_id: usize, score: f32) -> Candidate {
        Candidate {
            xyxy,
            class_id,
            score,
        }
    }

    #[test]
    fn nms_keeps_best_overlapping_box_per_class() {
        let kept = non_max_suppression(
            vec![
                cand([0.0, 0.0, 10.0, 10.0], 0, 0.6),
                cand([1.0, 1.0, 10.0, 10.0], 0, 0.9),
                cand([1.0, 1.0, 10.0, 10.0], 1, 0.7),
                cand([50.0, 50.0, 60.0, 60.0], 0, 0.55),
            ],
            NMS_IOU_THRESHOLD,
        );
        let scores: Vec<f32> = kept.iter().map(|c| c.score).collect();
        assert_eq!(scores, vec![0.9, 0.7, 0.55]);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        assert_eq!(iou(&[0.0, 0.0, 1.0, 1.0], &[2.0, 2.0, 3.0, 3.0]), 0.0);
        assert!((iou(&[0.0, 0.0, 2.0, 2.0], &[0.0, 0.0, 2.0, 2.0]) - 1.0).abs() < 1e-6);
    }
}
