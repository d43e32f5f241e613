use async_trait::async_trait;
use thiserror::Error;

use crate::{
    model::{ObjectRef, ReconciledPayload, RemoteObject},
    value::AttributeValue,
};

/// One write, covering every family that changes.
///
/// A family that is `None` is not transmitted at all, whatever its mode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectPayload {
    pub custom_fields: Option<ReconciledPayload<AttributeValue>>,
    pub tags: Option<ReconciledPayload<()>>,
}

impl ObjectPayload {
    pub fn is_empty(&self) -> bool {
        self.custom_fields.is_none() && self.tags.is_none()
    }
}

#[derive(Debug, Error)]
pub enum AccessorError {
    #[error("object {object} does not exist")]
    NotFound { object: ObjectRef },

    /// The remote refused the payload, e.g. because it names an attribute
    /// that is not defined for the object type.
    #[error("remote rejected the write: {message}")]
    Rejected { message: String },

    #[error("remote unavailable: {message}")]
    Unavailable { message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The system that stores the objects. Reads are complete and current; a write
/// applies exactly the given payload under each family's mode.
///
/// Implementations must be safe to share between concurrent reconciliations of
/// different objects.
#[async_trait]
pub trait RemoteObjectAccessor: Send + Sync {
    async fn read_attributes(&self, object: &ObjectRef) -> Result<RemoteObject, AccessorError>;

    async fn write_attributes(
        &self,
        object: &ObjectRef,
        payload: &ObjectPayload,
    ) -> Result<(), AccessorError>;
}

#[async_trait]
impl<A: RemoteObjectAccessor + ?Sized> RemoteObjectAccessor for std::sync::Arc<A> {
    async fn read_attributes(&self, object: &ObjectRef) -> Result<RemoteObject, AccessorError> {
        (**self).read_attributes(object).await
    }

    async fn write_attributes(
        &self,
        object: &ObjectRef,
        payload: &ObjectPayload,
    ) -> Result<(), AccessorError> {
        (**self).write_attributes(object, payload).await
    }
}
