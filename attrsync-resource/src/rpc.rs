use async_trait::async_trait;
use attrsync_core::{
    accessor::{AccessorError, RemoteObjectAccessor},
    error::CodecError,
    model::ObjectRef,
};
use jsonrpsee::{
    core::RpcResult,
    proc_macros::rpc,
    types::{ErrorCode, ErrorObject, ErrorObjectOwned},
};

use crate::schema::v0;

/// The object does not exist.
pub const NOT_FOUND_CODE: i32 = -32001;
/// The store refused the write, e.g. an undefined custom field.
pub const REJECTED_CODE: i32 = -32002;
/// The store could not be reached.
pub const UNAVAILABLE_CODE: i32 = -32003;

#[rpc(client, server, namespace = "attributes")]
pub trait AttributesRpc {
    #[method(name = "read")]
    async fn read(
        &self,
        #[argument(rename = "type")] type_: String,
        id: String,
    ) -> RpcResult<v0::ReadAttributesResponse>;

    #[method(name = "write")]
    async fn write(&self, request: v0::WriteAttributesRequest) -> RpcResult<()>;
}

#[async_trait]
impl<T> AttributesRpcServer for T
where
    T: RemoteObjectAccessor + 'static,
{
    async fn read(&self, type_: String, id: String) -> RpcResult<v0::ReadAttributesResponse> {
        let object = ObjectRef::new(type_, id);
        let remote = self.read_attributes(&object).await.map_err(handle_error)?;
        Ok(v0::ReadAttributesResponse::from(&remote))
    }

    async fn write(&self, request: v0::WriteAttributesRequest) -> RpcResult<()> {
        let (object, payload) = request.into_parts().map_err(invalid_params)?;
        self.write_attributes(&object, &payload)
            .await
            .map_err(handle_error)
    }
}

/// Rejected and unavailable errors carry the store's own message, so that
/// clients can rebuild the same [`AccessorError`].
fn handle_error(error: AccessorError) -> ErrorObjectOwned {
    match error {
        AccessorError::NotFound { .. } => {
            ErrorObject::owned(NOT_FOUND_CODE, error.to_string(), None::<()>)
        }
        AccessorError::Rejected { message } => {
            ErrorObject::owned(REJECTED_CODE, message, None::<()>)
        }
        AccessorError::Unavailable { message } => {
            ErrorObject::owned(UNAVAILABLE_CODE, message, None::<()>)
        }
        AccessorError::Other(e) => {
            tracing::error!("attribute store error: {:?}", e);
            ErrorObject::owned(
                ErrorCode::InternalError.code(),
                "Attribute store encountered an error",
                Some(e.to_string()),
            )
        }
    }
}

fn invalid_params(error: CodecError) -> ErrorObjectOwned {
    ErrorObject::owned(
        ErrorCode::InvalidParams.code(),
        ErrorCode::InvalidParams.message(),
        Some(error.to_string()),
    )
}
