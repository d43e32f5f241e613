use anyhow::{Context as _, Result};
use async_trait::async_trait;
use attrsync_core::{
    accessor::{AccessorError, ObjectPayload, RemoteObjectAccessor},
    model::{ObjectRef, RemoteObject},
};
use jsonrpsee::{
    core::ClientError,
    http_client::{HttpClient, HttpClientBuilder},
};
use tracing::debug;

use crate::{
    rpc::{AttributesRpcClient, NOT_FOUND_CODE, REJECTED_CODE, UNAVAILABLE_CODE},
    schema::v0,
};

/// Reaches an attribute store served by [`crate::framework::run_server`].
pub struct RpcAccessor {
    url: String,
    client: HttpClient,
}

impl RpcAccessor {
    pub fn connect(url: &str) -> Result<RpcAccessor> {
        let client = HttpClientBuilder::default()
            .build(url)
            .with_context(|| format!("Could not create JSON-RPC client for {}", url))?;
        Ok(RpcAccessor {
            url: url.to_string(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RemoteObjectAccessor for RpcAccessor {
    async fn read_attributes(&self, object: &ObjectRef) -> Result<RemoteObject, AccessorError> {
        debug!(url = %self.url, %object, "reading attributes");
        let response = AttributesRpcClient::read(
            &self.client,
            object.object_type.clone(),
            object.object_id.clone(),
        )
        .await
        .map_err(|e| from_client_error(object, e))?;
        response
            .into_remote()
            .with_context(|| format!("Invalid attributes received for {}", object))
            .map_err(AccessorError::Other)
    }

    async fn write_attributes(
        &self,
        object: &ObjectRef,
        payload: &ObjectPayload,
    ) -> Result<(), AccessorError> {
        debug!(url = %self.url, %object, "writing attributes");
        AttributesRpcClient::write(&self.client, v0::WriteAttributesRequest::new(object, payload))
            .await
            .map_err(|e| from_client_error(object, e))
    }
}

/// Recovers the accessor error that the server encoded in its response.
fn from_client_error(object: &ObjectRef, error: ClientError) -> AccessorError {
    match error {
        ClientError::Call(err) => match err.code() {
            NOT_FOUND_CODE => AccessorError::NotFound {
                object: object.clone(),
            },
            REJECTED_CODE => AccessorError::Rejected {
                message: err.message().to_string(),
            },
            UNAVAILABLE_CODE => AccessorError::Unavailable {
                message: err.message().to_string(),
            },
            _ => AccessorError::Other(anyhow::Error::new(ClientError::Call(err))),
        },
        ClientError::Transport(_) | ClientError::RequestTimeout | ClientError::RestartNeeded(_) => {
            AccessorError::Unavailable {
                message: error.to_string(),
            }
        }
        other => AccessorError::Other(anyhow::Error::new(other)),
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, net::SocketAddr, sync::Arc};

    use attrsync_core::{
        config::ObjectConfig,
        engine::Reconciler,
        memory::InMemoryAccessor,
        value::{AttributeValue, FieldKind},
    };
    use jsonrpsee::server::ServerHandle;
    use serde_json::json;

    use super::*;
    use crate::framework::run_server;

    fn site() -> ObjectRef {
        ObjectRef::new("dcim.site", "1")
    }

    async fn serve() -> (Arc<InMemoryAccessor>, SocketAddr, ServerHandle) {
        let accessor = Arc::new(InMemoryAccessor::new());
        accessor.insert(
            site(),
            RemoteObject {
                custom_fields: BTreeMap::from([
                    ("env".into(), AttributeValue::Text("prod".into())),
                    ("owner".into(), AttributeValue::Text("team-a".into())),
                ]),
                field_kinds: BTreeMap::from([
                    ("env".into(), FieldKind::Text),
                    ("owner".into(), FieldKind::Text),
                ]),
                tags: BTreeMap::from([("core".into(), ())]),
            },
        );
        let (addr, handle) = run_server(accessor.clone(), "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        (accessor, addr, handle)
    }

    #[tokio::test]
    async fn reconciles_through_the_server() {
        let (accessor, addr, handle) = serve().await;
        let reconciler = Reconciler::new(RpcAccessor::connect(&format!("http://{addr}")).unwrap());
        let config: ObjectConfig = serde_json::from_value(json!({
            "custom_fields": [{"name": "env", "type": "text", "value": "staging"}],
            "tags": ["edge"]
        }))
        .unwrap();

        let outcome = reconciler.apply(&site(), &config).await.unwrap();
        assert!(outcome.written);
        assert!(outcome.view.in_sync());

        let state = accessor.get(&site()).unwrap();
        assert_eq!(
            state.custom_fields["env"],
            AttributeValue::Text("staging".into())
        );
        assert_eq!(
            state.custom_fields["owner"],
            AttributeValue::Text("team-a".into())
        );
        assert_eq!(
            state.tags.keys().map(|k| k.as_str()).collect::<Vec<_>>(),
            vec!["core", "edge"]
        );

        let again = reconciler.apply(&site(), &config).await.unwrap();
        assert!(!again.written);
        assert_eq!(accessor.write_count(), 1);

        handle.stop().unwrap();
        handle.stopped().await;
    }

    #[tokio::test]
    async fn server_errors_keep_their_class() {
        let (accessor, addr, handle) = serve().await;
        let client = RpcAccessor::connect(&format!("http://{addr}")).unwrap();

        let missing = ObjectRef::new("dcim.site", "9");
        match client.read_attributes(&missing).await {
            Err(AccessorError::NotFound { object }) => assert_eq!(object, missing),
            other => panic!("expected NotFound, got {other:?}"),
        }

        let payload = ObjectPayload {
            custom_fields: Some(attrsync_core::model::ReconciledPayload {
                mode: attrsync_core::model::WriteMode::PartialMerge,
                entries: BTreeMap::from([("rack".into(), Some(AttributeValue::Integer(2)))]),
            }),
            tags: None,
        };
        match client.write_attributes(&site(), &payload).await {
            Err(AccessorError::Rejected { message }) => {
                assert_eq!(message, "custom field 'rack' is not defined for dcim.site")
            }
            other => panic!("expected Rejected, got {other:?}"),
        }

        accessor.fail_next_read("maintenance");
        match client.read_attributes(&site()).await {
            Err(AccessorError::Unavailable { message }) => assert_eq!(message, "maintenance"),
            other => panic!("expected Unavailable, got {other:?}"),
        }

        handle.stop().unwrap();
        handle.stopped().await;
    }

    #[tokio::test]
    async fn unreachable_server_is_unavailable() {
        let (_accessor, addr, handle) = serve().await;
        handle.stop().unwrap();
        handle.stopped().await;

        let client = RpcAccessor::connect(&format!("http://{addr}")).unwrap();
        assert!(matches!(
            client.read_attributes(&site()).await,
            Err(AccessorError::Unavailable { .. })
        ));
    }
}
