//! Class-label tables.
//!
//! The helmet model has two classes but no agreed orientation: the same weights
//! have been shipped with `{0: "Helmet", 1: "No Helmet"}` and with
//! `{0: "No Helmet", 1: "Helmet"}`. There is deliberately no built-in default.
//! The fallback table comes from configuration and a detector-provided table,
//! when present, takes precedence.

use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Label shown for a class id that no table resolves.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Immutable mapping from class id to display name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassLabelMap {
    names: BTreeMap<u32, String>,
}

impl ClassLabelMap {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (u32, S)>,
        S: Into<String>,
    {
        Self {
            names: entries.into_iter().map(|(id, name)| (id, name.into())).collect(),
        }
    }

    /// Parse `"0=No Helmet,1=Helmet"`.
    pub fn parse(entries: &str) -> Result<Self> {
        let mut names = BTreeMap::new();
        for entry in entries.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (id, name) = entry
                .split_once('=')
                .ok_or_else(|| anyhow!("label entry '{}' must look like <id>=<name>", entry))?;
            let id: u32 = id
                .trim()
                .parse()
                .map_err(|_| anyhow!("label id '{}' must be a non-negative integer", id.trim()))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(anyhow!("label for class {} is empty", id));
            }
            if names.insert(id, name.to_string()).is_some() {
                return Err(anyhow!("class {} is labelled twice", id));
            }
        }
        if names.is_empty() {
            return Err(anyhow!("label mapping is empty"));
        }
        Ok(Self { names })
    }

    pub fn get(&self, class_id: u32) -> Option<&str> {
        self.names.get(&class_id).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.names.iter().map(|(id, name)| (*id, name.as_str()))
    }
}

/// Resolves class ids for display: detector table first, then fallback.
#[derive(Clone, Debug, Default)]
pub struct LabelTable {
    detector: Option<ClassLabelMap>,
    fallback: ClassLabelMap,
}

impl LabelTable {
    pub fn new(fallback: ClassLabelMap, detector: Option<ClassLabelMap>) -> Self {
        Self {
            detector: detector.filter(|names| !names.is_empty()),
            fallback,
        }
    }

    /// Build the table for a run. Fails when neither source supplies names.
    pub fn for_run(fallback: Option<ClassLabelMap>, detector: Option<ClassLabelMap>) -> Result<Self> {
        let detector = detector.filter(|names| !names.is_empty());
        match (fallback, detector) {
            (None, None) => Err(anyhow!(
                "no class label mapping: the detector provides none, so one must be configured \
                 (e.g. --labels '0=Helmet,1=No Helmet' or '0=No Helmet,1=Helmet'; \
                 both orientations exist for this model, pick the one it was trained with)"
            )),
            (fallback, detector) => {
                if let (Some(fallback), Some(detector)) = (&fallback, &detector) {
                    if fallback != detector {
                        log::warn!(
                            "configured labels {:?} differ from detector labels {:?}; using detector labels",
                            fallback,
                            detector
                        );
                    }
                }
                Ok(Self::new(fallback.unwrap_or_default(), detector))
            }
        }
    }

    pub fn resolve(&self, class_id: Option<u32>) -> &str {
        let Some(id) = class_id else {
            return UNKNOWN_LABEL;
        };
        self.detector
            .as_ref()
            .and_then(|names| names.get(id))
            .or_else(|| self.fallback.get(id))
            .unwrap_or(UNKNOWN_LABEL)
    }
}
