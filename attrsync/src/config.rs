use std::{fmt, path::Path};

use anyhow::{bail, Context, Result};
use attrsync_core::{config::ObjectConfig, engine::WriteModes, model::ObjectRef};
use serde::{Deserialize, Serialize};

/// The desired state file passed to `plan`, `apply` and `read`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DesiredFile {
    /// Overrides the write mode of each attribute family.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_modes: Option<WriteModes>,
    #[serde(default)]
    pub objects: Vec<ObjectEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ObjectEntry {
    #[serde(rename = "type")]
    pub object_type: String,
    pub id: String,
    #[serde(flatten)]
    pub config: ObjectConfig,
}

impl ObjectEntry {
    pub fn object(&self) -> ObjectRef {
        ObjectRef::new(self.object_type.clone(), self.id.clone())
    }
}

impl DesiredFile {
    pub fn load(path: &Path) -> Result<DesiredFile> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let file: DesiredFile = serde_json::from_str(&contents)
            .with_context(|| format!("Could not parse {}", path.display()))?;
        file.check_unique()?;
        Ok(file)
    }

    fn check_unique(&self) -> Result<()> {
        let mut seen = std::collections::BTreeSet::new();
        for entry in &self.objects {
            let object = entry.object();
            if !seen.insert(object.clone()) {
                bail!("object {} is configured more than once", object);
            }
        }
        Ok(())
    }

    /// The entries to work on: all of them, or those named in `only`.
    pub fn select(&self, only: &[ObjectRef]) -> Result<Vec<&ObjectEntry>> {
        if only.is_empty() {
            return Ok(self.objects.iter().collect());
        }
        only.iter()
            .map(|object| {
                self.objects
                    .iter()
                    .find(|entry| entry.object() == *object)
                    .with_context(|| format!("object {} is not in the configuration", object))
            })
            .collect()
    }
}

/// Parses `TYPE/ID`, e.g. `dcim.device/42`.
pub(crate) fn parse_object_ref(s: &str) -> Result<ObjectRef, String> {
    match s.split_once('/') {
        Some((object_type, id)) if !object_type.is_empty() && !id.is_empty() => {
            Ok(ObjectRef::new(object_type, id))
        }
        _ => Err(format!("expected TYPE/ID, got '{}'", s)),
    }
}

/// Wraps a value so it prints as compact JSON.
pub(crate) struct Json<'a, T>(pub &'a T);

impl<T: Serialize> fmt::Display for Json<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = serde_json::to_string(self.0).map_err(|_| fmt::Error)?;
        f.write_str(&s)
    }
}
