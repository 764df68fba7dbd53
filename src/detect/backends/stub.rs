use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{RawBox, RawResult, RawValue};
use crate::frame::Frame;

/// Offline stand-in detector.
///
/// Emits one box covering the middle third of every frame. The class id
/// alternates between 0 and 1 every `period` frames so both overlay colours
/// show up in a demo run.
pub struct StubBackend {
    period: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self { period: 30 }
    }

    pub fn with_period(period: u64) -> Self {
        Self {
            period: period.max(1),
        }
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, frame: &Frame, confidence_threshold: f32) -> Result<Vec<RawResult>> {
        let confidence = 0.9f32;
        if confidence < confidence_threshold {
            return Ok(vec![RawResult::with_boxes(Vec::new())]);
        }
        let w = frame.width() as f64;
        let h = frame.height() as f64;
        let class_id = ((frame.sequence() / self.period) % 2) as f64;

        Ok(vec![RawResult::with_boxes(vec![RawBox {
            xyxy: Some(RawValue::array([w / 3.0, h / 3.0, 2.0 * w / 3.0, 2.0 * h / 3.0])),
            cls: Some(RawValue::from(class_id)),
            conf: Some(RawValue::from(confidence)),
        }])])
    }
}
