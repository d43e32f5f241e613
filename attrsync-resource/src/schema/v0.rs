//! Version 0 of the attribute store wire format.
//!
//! Custom field values travel together with their type, so either side can
//! decode them without consulting the field definitions.

use std::collections::BTreeMap;

use attrsync_core::{
    accessor::ObjectPayload,
    codec,
    error::CodecError,
    model::{self, AttributeName, ReconciledPayload, RemoteObject, WriteMode},
    value::{AttributeValue, FieldKind},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    #[serde(rename = "type")]
    pub type_: String,
    pub id: String,
}

impl From<&model::ObjectRef> for ObjectRef {
    fn from(object: &model::ObjectRef) -> Self {
        ObjectRef {
            type_: object.object_type.clone(),
            id: object.object_id.clone(),
        }
    }
}

impl From<ObjectRef> for model::ObjectRef {
    fn from(object: ObjectRef) -> Self {
        model::ObjectRef::new(object.type_, object.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedValue {
    #[serde(rename = "type")]
    pub type_: FieldKind,
    pub value: Value,
}

impl From<&AttributeValue> for TypedValue {
    fn from(value: &AttributeValue) -> Self {
        TypedValue {
            type_: value.kind(),
            value: codec::encode(value),
        }
    }
}

impl TypedValue {
    /// `None` when the wire value is null.
    pub fn decode(&self) -> Result<Option<AttributeValue>, CodecError> {
        codec::decode(self.type_, &self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadAttributesResponse {
    pub custom_fields: BTreeMap<String, TypedValue>,
    /// Custom fields that may be set on the object, set or not.
    #[serde(default)]
    pub field_definitions: BTreeMap<String, FieldKind>,
    pub tags: Vec<String>,
}

impl From<&RemoteObject> for ReadAttributesResponse {
    fn from(remote: &RemoteObject) -> Self {
        ReadAttributesResponse {
            custom_fields: remote
                .custom_fields
                .iter()
                .map(|(name, value)| (name.to_string(), TypedValue::from(value)))
                .collect(),
            field_definitions: remote
                .field_kinds
                .iter()
                .map(|(name, kind)| (name.to_string(), *kind))
                .collect(),
            tags: remote.tags.keys().map(|slug| slug.to_string()).collect(),
        }
    }
}

impl ReadAttributesResponse {
    pub fn into_remote(self) -> Result<RemoteObject, CodecError> {
        let mut custom_fields = BTreeMap::new();
        for (name, typed) in self.custom_fields {
            if let Some(value) = typed.decode()? {
                custom_fields.insert(AttributeName::from(name), value);
            }
        }
        Ok(RemoteObject {
            custom_fields,
            field_kinds: self
                .field_definitions
                .into_iter()
                .map(|(name, kind)| (AttributeName::from(name), kind))
                .collect(),
            tags: self
                .tags
                .into_iter()
                .map(|slug| (AttributeName::from(slug), ()))
                .collect(),
        })
    }
}

/// Custom field entries of one write. A null entry clears the field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomFieldsPayload {
    pub mode: WriteMode,
    pub entries: BTreeMap<String, Option<TypedValue>>,
}

/// Tags of one write. `cleared` is only meaningful for partial-merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagsPayload {
    pub mode: WriteMode,
    pub present: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cleared: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteAttributesRequest {
    pub object: ObjectRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<CustomFieldsPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<TagsPayload>,
}

impl WriteAttributesRequest {
    pub fn new(object: &model::ObjectRef, payload: &ObjectPayload) -> Self {
        WriteAttributesRequest {
            object: object.into(),
            custom_fields: payload.custom_fields.as_ref().map(|p| CustomFieldsPayload {
                mode: p.mode,
                entries: p
                    .entries
                    .iter()
                    .map(|(name, value)| (name.to_string(), value.as_ref().map(TypedValue::from)))
                    .collect(),
            }),
            tags: payload.tags.as_ref().map(|p| TagsPayload {
                mode: p.mode,
                present: p
                    .entries
                    .iter()
                    .filter(|(_, v)| v.is_some())
                    .map(|(slug, _)| slug.to_string())
                    .collect(),
                cleared: p
                    .entries
                    .iter()
                    .filter(|(_, v)| v.is_none())
                    .map(|(slug, _)| slug.to_string())
                    .collect(),
            }),
        }
    }

    pub fn into_parts(self) -> Result<(model::ObjectRef, ObjectPayload), CodecError> {
        let custom_fields = match self.custom_fields {
            None => None,
            Some(p) => {
                let mut entries = BTreeMap::new();
                for (name, typed) in p.entries {
                    let value = match typed {
                        None => None,
                        Some(typed) => typed.decode()?,
                    };
                    entries.insert(AttributeName::from(name), value);
                }
                Some(ReconciledPayload {
                    mode: p.mode,
                    entries,
                })
            }
        };
        let tags = self.tags.map(|p| ReconciledPayload {
            mode: p.mode,
            entries: p
                .present
                .into_iter()
                .map(|slug| (AttributeName::from(slug), Some(())))
                .chain(
                    p.cleared
                        .into_iter()
                        .map(|slug| (AttributeName::from(slug), None)),
                )
                .collect(),
        });
        Ok((
            self.object.into(),
            ObjectPayload {
                custom_fields,
                tags,
            },
        ))
    }
}
