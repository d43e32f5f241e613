//! A [`RemoteObjectAccessor`] that keeps everything in memory.
//!
//! Useful for embedding and for exercising the engine; it honours the write
//! modes and refuses custom fields that are not declared for the object.

use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;

use crate::{
    accessor::{AccessorError, ObjectPayload, RemoteObjectAccessor},
    model::{ObjectRef, RemoteObject},
    reconcile::apply_payload,
};

#[derive(Debug, Default)]
struct Inner {
    objects: BTreeMap<ObjectRef, RemoteObject>,
    writes: Vec<(ObjectRef, ObjectPayload)>,
    fail_next_read: Option<String>,
    fail_next_write: Option<String>,
    fail_read_after_write: Option<String>,
}

#[derive(Debug, Default)]
pub struct InMemoryAccessor {
    inner: Mutex<Inner>,
}

impl InMemoryAccessor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, object: ObjectRef, state: RemoteObject) {
        self.lock().objects.insert(object, state);
    }

    /// Current state, bypassing the accessor interface.
    pub fn get(&self, object: &ObjectRef) -> Option<RemoteObject> {
        self.lock().objects.get(object).cloned()
    }

    /// Changes an object behind the engine's back, like another client would.
    pub fn modify(&self, object: &ObjectRef, f: impl FnOnce(&mut RemoteObject)) {
        if let Some(state) = self.lock().objects.get_mut(object) {
            f(state);
        }
    }

    /// Every payload written so far, oldest first.
    pub fn writes(&self) -> Vec<(ObjectRef, ObjectPayload)> {
        self.lock().writes.clone()
    }

    pub fn write_count(&self) -> usize {
        self.lock().writes.len()
    }

    pub fn fail_next_read(&self, message: impl Into<String>) {
        self.lock().fail_next_read = Some(message.into());
    }

    pub fn fail_next_write(&self, message: impl Into<String>) {
        self.lock().fail_next_write = Some(message.into());
    }

    /// Makes the first read after the next successful write fail.
    pub fn fail_read_after_write(&self, message: impl Into<String>) {
        self.lock().fail_read_after_write = Some(message.into());
    }
}

#[async_trait]
impl RemoteObjectAccessor for InMemoryAccessor {
    async fn read_attributes(&self, object: &ObjectRef) -> Result<RemoteObject, AccessorError> {
        let mut inner = self.lock();
        if let Some(message) = inner.fail_next_read.take() {
            return Err(AccessorError::Unavailable { message });
        }
        inner
            .objects
            .get(object)
            .cloned()
            .ok_or_else(|| AccessorError::NotFound {
                object: object.clone(),
            })
    }

    async fn write_attributes(
        &self,
        object: &ObjectRef,
        payload: &ObjectPayload,
    ) -> Result<(), AccessorError> {
        let mut inner = self.lock();
        if let Some(message) = inner.fail_next_write.take() {
            return Err(AccessorError::Unavailable { message });
        }
        let state = inner
            .objects
            .get(object)
            .ok_or_else(|| AccessorError::NotFound {
                object: object.clone(),
            })?;

        let mut next = state.clone();
        if let Some(fields) = &payload.custom_fields {
            if let Some(name) = fields
                .entries
                .keys()
                .find(|name| !state.field_kinds.contains_key(*name))
            {
                return Err(AccessorError::Rejected {
                    message: format!("custom field '{name}' is not defined for {}", object.object_type),
                });
            }
            next.custom_fields = apply_payload(&state.custom_fields, fields);
        }
        if let Some(tags) = &payload.tags {
            next.tags = apply_payload(&state.tags, tags);
        }

        inner.objects.insert(object.clone(), next);
        inner.writes.push((object.clone(), payload.clone()));
        if let Some(message) = inner.fail_read_after_write.take() {
            inner.fail_next_read = Some(message);
        }
        Ok(())
    }
}
