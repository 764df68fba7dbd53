use serde::{Deserialize, Serialize};

/// One raw value as a detector hands it over.
///
/// Detectors expose box coordinates, class ids and confidences in several shapes:
/// tensors (possibly nested), objects wrapping a single scalar, plain numbers,
/// or numbers serialized as text. The adapter picks an extraction strategy by
/// matching on the variant.
///
/// `Other` catches anything else (null, booleans, foreign objects) so one odd
/// value only spoils the item that holds it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
    Array(Vec<RawValue>),
    Wrapped { item: Box<RawValue> },
    Other(serde_json::Value),
}

impl RawValue {
    pub fn array<I: IntoIterator<Item = f64>>(values: I) -> Self {
        Self::Array(values.into_iter().map(Self::Number).collect())
    }

    pub fn wrapped(value: RawValue) -> Self {
        Self::Wrapped {
            item: Box::new(value),
        }
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<f32> for RawValue {
    fn from(value: f32) -> Self {
        Self::Number(value as f64)
    }
}

/// One raw predicted box. Any field may be absent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawBox {
    #[serde(default)]
    pub xyxy: Option<RawValue>,
    #[serde(default)]
    pub cls: Option<RawValue>,
    #[serde(default)]
    pub conf: Option<RawValue>,
}

/// Per-image result from a detector. `boxes` is absent when the detector
/// produced no box head for the image.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawResult {
    #[serde(default)]
    pub boxes: Option<Vec<RawBox>>,
}

impl RawResult {
    pub fn with_boxes(boxes: Vec<RawBox>) -> Self {
        Self { boxes: Some(boxes) }
    }
}

/// Pixel box, corners truncated to integers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn left(&self) -> i32 {
        self.x1.min(self.x2)
    }

    pub fn top(&self) -> i32 {
        self.y1.min(self.y2)
    }

    pub fn width(&self) -> u32 {
        self.x1.abs_diff(self.x2)
    }

    pub fn height(&self) -> u32 {
        self.y1.abs_diff(self.y2)
    }
}

/// Canonical detection record. `class_id` is `None` when the detector did not
/// supply a usable class.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub class_id: Option<u32>,
    pub confidence: f32,
}
