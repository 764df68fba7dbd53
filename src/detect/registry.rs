use std::str::FromStr;

use anyhow::{anyhow, Context, Result};

use super::backend::DetectorBackend;
use super::backends::{ReplayBackend, StubBackend};
use crate::config::DetectorSettings;

/// Detector backends this build knows how to construct.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Stub,
    Replay,
    Tract,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stub => "stub",
            Self::Replay => "replay",
            Self::Tract => "tract",
        }
    }
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "stub" => Ok(Self::Stub),
            "replay" => Ok(Self::Replay),
            "tract" | "onnx" => Ok(Self::Tract),
            other => Err(anyhow!(
                "unknown detector backend '{}' (expected stub, replay or tract)",
                other
            )),
        }
    }
}

/// Build the configured backend and run its warm-up hook.
pub fn select_backend(settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    let mut backend: Box<dyn DetectorBackend> = match settings.backend {
        BackendKind::Stub => Box::new(StubBackend::new()),
        BackendKind::Replay => {
            let path = settings
                .replay_path
                .as_ref()
                .ok_or_else(|| anyhow!("replay backend requires detector.replay_path"))?;
            Box::new(ReplayBackend::from_path(path)?)
        }
        BackendKind::Tract => build_tract(settings)?,
    };
    backend
        .warm_up()
        .with_context(|| format!("warm-up of '{}' backend failed", backend.name()))?;
    log::info!("detector backend '{}' ready", backend.name());
    Ok(backend)
}

#[cfg(feature = "backend-tract")]
fn build_tract(settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    let path = settings
        .model_path
        .as_ref()
        .ok_or_else(|| anyhow!("tract backend requires detector.model_path"))?;
    let mut backend = super::backends::TractBackend::new(path, settings.input_size)?;
    if let Some(names) = settings.model_names.clone() {
        backend = backend.with_names(names);
    }
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn build_tract(_settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    Err(anyhow!("tract backend requires the backend-tract feature"))
}
