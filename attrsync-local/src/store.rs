use std::{
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use anyhow::{bail, Context as _, Result};
use attrsync_core::{codec, model::ObjectRef, value::FieldKind};
use serde_json::{Map, Value};

use crate::{
    document::{FieldDefinition, RemoteDocument, StoredObject, TagDefinition},
    state::{read_document, StateFile},
};

/// A state file holding a [`RemoteDocument`].
pub struct StateFileStore {
    path: PathBuf,
    state: Mutex<StateFile>,
}

impl StateFileStore {
    /// Creates a new state file. Fails if the file exists.
    pub fn init<P: AsRef<Path>>(path: P) -> Result<StateFileStore> {
        let path = path.as_ref();
        let document = serde_json::to_value(RemoteDocument::default())?;
        let state = StateFile::create(path, document)?;
        Ok(StateFileStore {
            path: path.to_path_buf(),
            state: Mutex::new(state),
        })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<StateFileStore> {
        let path = path.as_ref();
        let state = StateFile::open(path)?;
        Ok(StateFileStore {
            path: path.to_path_buf(),
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The current document, read without taking the lock.
    pub fn load(&self) -> Result<RemoteDocument> {
        let document = read_document(&self.path)?;
        serde_json::from_value(document)
            .with_context(|| format!("State file {} is not an attribute store", self.path.display()))
    }

    /// Changes the document under the write lock; see [`StateFile::update`].
    pub fn update<T>(
        &self,
        action: &str,
        f: impl FnOnce(&mut RemoteDocument) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let path = &self.path;
        state.update(serde_json::json!({ "action": action }), |raw| {
            let mut document: RemoteDocument = serde_json::from_value(raw.clone())
                .with_context(|| format!("State file {} is not an attribute store", path.display()))?;
            let result = f(&mut document)?;
            *raw = serde_json::to_value(&document)?;
            Ok(result)
        })
    }

    pub fn define_field(&self, name: &str, kind: FieldKind, object_types: Vec<String>) -> Result<()> {
        self.update("define-field", |doc| {
            if let Some(existing) = doc.field_definitions.get(name) {
                if existing.kind != kind {
                    bail!(
                        "custom field '{}' is already defined as {}",
                        name,
                        existing.kind
                    );
                }
            }
            doc.field_definitions.insert(
                name.to_string(),
                FieldDefinition { kind, object_types },
            );
            Ok(())
        })
    }

    pub fn define_tag(&self, slug: &str, description: Option<String>) -> Result<()> {
        self.update("define-tag", |doc| {
            doc.tag_definitions
                .insert(slug.to_string(), TagDefinition { description });
            Ok(())
        })
    }

    /// Creates or overwrites an object, bypassing the write modes. Values are
    /// wire JSON and must be defined for the object type.
    pub fn put_object(
        &self,
        object: &ObjectRef,
        custom_fields: Map<String, Value>,
        tags: Vec<String>,
    ) -> Result<()> {
        self.update("put-object", |doc| {
            for (name, value) in &custom_fields {
                let Some((_, definition)) = doc
                    .fields_for(&object.object_type)
                    .find(|(defined, _)| *defined == name)
                else {
                    bail!(
                        "custom field '{}' is not defined for {}",
                        name,
                        object.object_type
                    );
                };
                codec::decode(definition.kind, value)
                    .with_context(|| format!("Invalid value for custom field '{}'", name))?;
            }
            for slug in &tags {
                if !doc.tag_definitions.contains_key(slug) {
                    bail!("tag '{}' is not defined", slug);
                }
            }
            doc.objects
                .entry(object.object_type.clone())
                .or_default()
                .insert(
                    object.object_id.clone(),
                    StoredObject {
                        custom_fields: custom_fields.into_iter().collect(),
                        tags,
                    },
                );
            Ok(())
        })
    }
}
