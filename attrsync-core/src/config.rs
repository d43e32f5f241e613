use serde::{Deserialize, Serialize};

use crate::{
    codec,
    error::{ConfigError, ReconcileError},
    model::{AttributeFamily, AttributeName, DesiredAttributeSet, DesiredValue},
    value::{AttributeValue, FieldKind},
};

/// The attribute blocks of one object's configuration, as written by the user.
///
/// A missing block and an empty block are equivalent: the apply owns nothing
/// in that family and leaves the remote collection alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<Vec<CustomFieldConfig>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<TagConfig>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomFieldConfig {
    pub name: AttributeName,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    /// String encoding of the value; empty means "remove".
    #[serde(default)]
    pub value: String,
}

/// Either a bare slug, or `{ "slug": ..., "absent": true }` to remove a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagConfig {
    Slug(AttributeName),
    Entry {
        slug: AttributeName,
        #[serde(default)]
        absent: bool,
    },
}

impl TagConfig {
    pub fn slug(&self) -> &AttributeName {
        match self {
            TagConfig::Slug(slug) | TagConfig::Entry { slug, .. } => slug,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, TagConfig::Entry { absent: true, .. })
    }
}

impl ObjectConfig {
    /// Names mentioned in the given family's block, in configuration order.
    pub fn names(&self, family: AttributeFamily) -> Vec<&AttributeName> {
        match family {
            AttributeFamily::CustomFields => self
                .custom_fields
                .iter()
                .flatten()
                .map(|cf| &cf.name)
                .collect(),
            AttributeFamily::Tags => self.tags.iter().flatten().map(TagConfig::slug).collect(),
        }
    }

    pub fn desired_custom_fields(
        &self,
    ) -> Result<DesiredAttributeSet<AttributeValue>, ReconcileError> {
        let mut desired = DesiredAttributeSet::new();
        for cf in self.custom_fields.iter().flatten() {
            let value = codec::parse_config_value(cf.kind, &cf.value).map_err(|source| {
                ReconcileError::InvalidValue {
                    name: cf.name.clone(),
                    source,
                }
            })?;
            if desired.insert(cf.name.clone(), value).is_some() {
                return Err(ConfigError::DuplicateAttribute {
                    family: AttributeFamily::CustomFields,
                    name: cf.name.clone(),
                }
                .into());
            }
        }
        Ok(desired)
    }

    pub fn desired_tags(&self) -> Result<DesiredAttributeSet<()>, ConfigError> {
        let mut desired = DesiredAttributeSet::new();
        for tag in self.tags.iter().flatten() {
            let value = if tag.is_absent() {
                DesiredValue::Unset
            } else {
                DesiredValue::Set(())
            };
            if desired.insert(tag.slug().clone(), value).is_some() {
                return Err(ConfigError::DuplicateAttribute {
                    family: AttributeFamily::Tags,
                    name: tag.slug().clone(),
                });
            }
        }
        Ok(desired)
    }
}
