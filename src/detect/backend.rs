use anyhow::Result;

use crate::detect::result::RawResult;
use crate::frame::Frame;
use crate::labels::ClassLabelMap;

/// Detector backend trait.
///
/// A backend is an opaque capability: given a frame it returns raw per-image
/// results in whatever shape it natively produces. The adapter turns those
/// into canonical detections. Backends must work offline.
pub trait DetectorBackend {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Class names shipped with the model, if any. These override the
    /// configured label table.
    fn class_names(&self) -> Option<&ClassLabelMap> {
        None
    }

    /// Run detection on a frame, keeping only boxes at or above `confidence_threshold`.
    fn detect(&mut self, frame: &Frame, confidence_threshold: f32) -> Result<Vec<RawResult>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
