use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::detect::adapter::normalize_box;
use crate::detect::backend::DetectorBackend;
use crate::detect::result::{RawBox, RawResult};
use crate::frame::Frame;
use crate::labels::ClassLabelMap;

#[derive(Debug, Deserialize)]
struct ReplayFile {
    #[serde(default)]
    names: Option<ClassLabelMap>,
    #[serde(default)]
    frames: Vec<Vec<RawBox>>,
}

/// Replays recorded raw detections.
///
/// The file holds the detector's raw per-frame boxes, indexed by frame
/// sequence number, plus optional model class names:
///
/// ```json
/// {"names": {"0": "No Helmet", "1": "Helmet"},
///  "frames": [[{"xyxy": [[10, 20, 110, 220]], "cls": [1], "conf": [0.91]}], []]}
/// ```
///
/// Frames past the end of the recording have no detections.
pub struct ReplayBackend {
    names: Option<ClassLabelMap>,
    frames: Vec<Vec<RawBox>>,
}

impl ReplayBackend {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read replay file {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("invalid replay file {}", path.display()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: ReplayFile = serde_json::from_str(json)?;
        Ok(Self {
            names: file.names,
            frames: file.frames,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

impl DetectorBackend for ReplayBackend {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn class_names(&self) -> Option<&ClassLabelMap> {
        self.names.as_ref()
    }

    fn detect(&mut self, frame: &Frame, confidence_threshold: f32) -> Result<Vec<RawResult>> {
        let Some(boxes) = usize::try_from(frame.sequence())
            .ok()
            .and_then(|idx| self.frames.get(idx))
        else {
            return Ok(vec![RawResult::with_boxes(Vec::new())]);
        };
        // Threshold on what the adapter would read; unreadable items pass
        // through so the adapter decides what to drop.
        let kept = boxes
            .iter()
            .filter(|raw| match normalize_box(raw) {
                Ok(det) => det.confidence >= confidence_threshold,
                Err(_) => true,
            })
            .cloned()
            .collect();
        Ok(vec![RawResult::with_boxes(kept)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::normalize;
    use image::RgbImage;

    const RECORDING: &str = r#"{
        "names": {"0": "No Helmet", "1": "Helmet"},
        "frames": [
            [{"xyxy": [[10, 20, 110, 220]], "cls": [1], "conf": [0.91]},
             {"xyxy": [0, 0, 5, 5], "cls": 0, "conf": 0.2}],
            [{"xyxy": [1, 2], "cls": 0, "conf": 0.8}]
        ]
    }"#;

    fn frame(seq: u64) -> Frame {
        Frame::new(RgbImage::new(4, 4), seq)
    }

    #[test]
    fn replays_frames_by_sequence() -> Result<()> {
        let mut backend = ReplayBackend::from_json(RECORDING)?;
        assert_eq!(backend.frame_count(), 2);
        assert_eq!(backend.class_names().and_then(|n| n.get(1)), Some("Helmet"));

        let first = normalize(&backend.detect(&frame(0), 0.5)?);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].bbox.x2, 110);
        assert_eq!(first[0].class_id, Some(1));

        // Short box survives the threshold filter and is dropped by the adapter.
        let second = backend.detect(&frame(1), 0.5)?;
        assert_eq!(second[0].boxes.as_ref().map(Vec::len), Some(1));
        assert!(normalize(&second).is_empty());

        assert!(normalize(&backend.detect(&frame(9), 0.5)?).is_empty());
        Ok(())
    }

    #[test]
    fn odd_values_drop_one_item_not_the_recording() -> Result<()> {
        let json = r#"{"frames": [[
            {"xyxy": [null, 2, 3, 4], "cls": 1, "conf": 0.9},
            {"xyxy": [10, 20, 30, 40], "cls": 0, "conf": 0.8, "track": {"id": 7}}
        ]]}"#;
        let mut backend = ReplayBackend::from_json(json)?;
        assert!(backend.class_names().is_none());
        let raw = backend.detect(&frame(0), 0.5)?;
        assert_eq!(raw[0].boxes.as_ref().map(Vec::len), Some(2));
        let detections = normalize(&raw);
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].bbox.x1, 10);
        assert_eq!(detections[0].class_id, Some(0));
        Ok(())
    }

    #[test]
    fn reads_recording_from_disk() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("recording.json");
        std::fs::write(&path, RECORDING)?;
        let backend = ReplayBackend::from_path(&path)?;
        assert_eq!(backend.frame_count(), 2);

        assert!(ReplayBackend::from_path(dir.path().join("missing.json")).is_err());
        Ok(())
    }
}
