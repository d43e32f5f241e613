use std::collections::BTreeMap;

use attrsync_core::value::FieldKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DOCUMENT_TYPE: &str = "attrsyncRemote";

/// The folded contents of a state file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDocument {
    #[serde(rename = "_type")]
    pub type_: String,
    pub field_definitions: BTreeMap<String, FieldDefinition>,
    pub tag_definitions: BTreeMap<String, TagDefinition>,
    /// Object type → object id → object.
    pub objects: BTreeMap<String, BTreeMap<String, StoredObject>>,
}

impl Default for RemoteDocument {
    fn default() -> Self {
        RemoteDocument {
            type_: DOCUMENT_TYPE.to_string(),
            field_definitions: BTreeMap::new(),
            tag_definitions: BTreeMap::new(),
            objects: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    #[serde(rename = "type")]
    pub kind: FieldKind,
    /// Object types the field is enabled for; empty means all of them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub object_types: Vec<String>,
}

impl FieldDefinition {
    pub fn applies_to(&self, object_type: &str) -> bool {
        self.object_types.is_empty() || self.object_types.iter().any(|t| t == object_type)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Attributes of one object, as the remote would return them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredObject {
    #[serde(default)]
    pub custom_fields: BTreeMap<String, Value>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl RemoteDocument {
    pub fn object(&self, object_type: &str, object_id: &str) -> Option<&StoredObject> {
        self.objects.get(object_type)?.get(object_id)
    }

    pub fn object_mut(&mut self, object_type: &str, object_id: &str) -> Option<&mut StoredObject> {
        self.objects.get_mut(object_type)?.get_mut(object_id)
    }

    /// Field definitions enabled for `object_type`.
    pub fn fields_for<'a>(
        &'a self,
        object_type: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a FieldDefinition)> + 'a {
        self.field_definitions
            .iter()
            .filter(move |(_, def)| def.applies_to(object_type))
    }
}
