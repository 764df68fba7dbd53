mod adapter;
mod backend;
mod backends;
mod registry;
mod result;

pub use adapter::{normalize, normalize_box};
pub use backend::DetectorBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use backends::{ReplayBackend, StubBackend};
pub use registry::{select_backend, BackendKind};
pub use result::{BoundingBox, Detection, RawBox, RawResult, RawValue};
