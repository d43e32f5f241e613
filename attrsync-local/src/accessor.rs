use std::{collections::BTreeMap, path::Path};

use anyhow::Result;
use async_trait::async_trait;
use attrsync_core::{
    accessor::{AccessorError, ObjectPayload, RemoteObjectAccessor},
    codec,
    model::{AttributeName, ObjectRef, RemoteObject},
    reconcile::apply_payload,
    value::FieldKind,
};
use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    document::{RemoteDocument, StoredObject},
    store::StateFileStore,
};

/// Serves reads and writes from a state file, enforcing the write modes and
/// the field and tag definitions like a real remote would.
pub struct FileAccessor {
    store: StateFileStore,
}

impl FileAccessor {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<FileAccessor> {
        Ok(FileAccessor {
            store: StateFileStore::open(path)?,
        })
    }

    pub fn new(store: StateFileStore) -> Self {
        FileAccessor { store }
    }

    pub fn store(&self) -> &StateFileStore {
        &self.store
    }
}

fn field_kinds(doc: &RemoteDocument, object_type: &str) -> BTreeMap<AttributeName, FieldKind> {
    doc.fields_for(object_type)
        .map(|(name, def)| (AttributeName::from(name.as_str()), def.kind))
        .collect()
}

fn to_remote(
    doc: &RemoteDocument,
    object: &ObjectRef,
    stored: &StoredObject,
) -> Result<RemoteObject, AccessorError> {
    let kinds = field_kinds(doc, &object.object_type);
    let wire: Map<String, Value> = stored.custom_fields.clone().into_iter().collect();
    let custom_fields = codec::decode_all(&wire, |name| kinds.get(name).copied())
        .map_err(|e| {
            AccessorError::Other(anyhow::Error::new(e).context(format!("stored value of {object}")))
        })?;
    Ok(RemoteObject {
        custom_fields,
        field_kinds: kinds,
        tags: stored
            .tags
            .iter()
            .map(|slug| (AttributeName::from(slug.as_str()), ()))
            .collect(),
    })
}

/// Applies `payload` to the object in `doc`. Fails without touching `doc` if
/// the payload names an attribute the remote does not know.
fn apply_write(
    doc: &mut RemoteDocument,
    object: &ObjectRef,
    payload: &ObjectPayload,
) -> Result<(), AccessorError> {
    let not_found = || AccessorError::NotFound {
        object: object.clone(),
    };
    let stored = doc
        .object(&object.object_type, &object.object_id)
        .ok_or_else(not_found)?;
    let current = to_remote(doc, object, stored)?;

    let mut next = StoredObject::default();
    match &payload.custom_fields {
        Some(fields) => {
            if let Some(name) = fields
                .entries
                .keys()
                .find(|name| !current.field_kinds.contains_key(*name))
            {
                return Err(AccessorError::Rejected {
                    message: format!(
                        "custom field '{}' is not defined for {}",
                        name, object.object_type
                    ),
                });
            }
            next.custom_fields = apply_payload(&current.custom_fields, fields)
                .iter()
                .map(|(name, value)| (name.to_string(), codec::encode(value)))
                .collect();
        }
        None => next.custom_fields = stored.custom_fields.clone(),
    }
    match &payload.tags {
        Some(tags) => {
            if let Some(slug) = tags
                .entries
                .iter()
                .filter(|(_, present)| present.is_some())
                .map(|(slug, _)| slug)
                .find(|slug| !doc.tag_definitions.contains_key(slug.as_str()))
            {
                return Err(AccessorError::Rejected {
                    message: format!("tag '{}' is not defined", slug),
                });
            }
            next.tags = apply_payload(&current.tags, tags)
                .keys()
                .map(|slug| slug.to_string())
                .collect();
        }
        None => next.tags = stored.tags.clone(),
    }

    let slot = doc
        .object_mut(&object.object_type, &object.object_id)
        .ok_or_else(not_found)?;
    *slot = next;
    Ok(())
}

#[async_trait]
impl RemoteObjectAccessor for FileAccessor {
    async fn read_attributes(&self, object: &ObjectRef) -> Result<RemoteObject, AccessorError> {
        let doc = self.store.load()?;
        let stored = doc
            .object(&object.object_type, &object.object_id)
            .ok_or_else(|| AccessorError::NotFound {
                object: object.clone(),
            })?;
        to_remote(&doc, object, stored)
    }

    async fn write_attributes(
        &self,
        object: &ObjectRef,
        payload: &ObjectPayload,
    ) -> Result<(), AccessorError> {
        let outcome = self
            .store
            .update("write", |doc| Ok(apply_write(doc, object, payload)))?;
        if outcome.is_ok() {
            debug!(%object, path = %self.store.path().display(), "state file updated");
        }
        outcome
    }
}
