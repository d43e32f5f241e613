use std::str::FromStr;

use crate::{
    codec,
    config::{CustomFieldConfig, ObjectConfig, TagConfig},
    error::{ConfigError, ReconcileError},
    model::{AttributeFamily, AttributeName, RemoteObject},
    value::FieldKind,
};

/// What to adopt when taking over an existing object.
///
/// `custom_fields: None` adopts no custom field block at all, which is not the
/// same configuration as an empty list, although both own nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportIdentity {
    pub object_id: String,
    pub custom_fields: Option<Vec<(AttributeName, FieldKind)>>,
}

impl ImportIdentity {
    pub fn new(object_id: impl Into<String>) -> Self {
        ImportIdentity {
            object_id: object_id.into(),
            custom_fields: None,
        }
    }

    /// Parses `name:type` items, e.g. `["env:text", "rack_units:integer"]`.
    pub fn with_items<S: AsRef<str>>(
        object_id: impl Into<String>,
        items: &[S],
    ) -> Result<Self, ConfigError> {
        let custom_fields = items
            .iter()
            .map(|item| parse_item(item.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ImportIdentity {
            object_id: object_id.into(),
            custom_fields: Some(custom_fields),
        })
    }
}

fn parse_item(item: &str) -> Result<(AttributeName, FieldKind), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidImportItem {
        item: item.to_string(),
        reason: reason.to_string(),
    };
    let (name, kind) = item
        .split_once(':')
        .ok_or_else(|| invalid("expected name:type"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(invalid("empty field name"));
    }
    let kind = FieldKind::from_str(kind.trim()).map_err(|e| invalid(&e.to_string()))?;
    Ok((AttributeName::from(name), kind))
}

/// The configuration an import produces: the listed custom fields with their
/// current values (empty when unset remotely), and every tag the object has.
pub fn build_import_config(
    remote: &RemoteObject,
    identity: &ImportIdentity,
) -> Result<ObjectConfig, ReconcileError> {
    let custom_fields = match &identity.custom_fields {
        None => None,
        Some(items) => {
            let mut fields = Vec::with_capacity(items.len());
            for (name, kind) in items {
                if let Some(declared) = remote.field_kinds.get(name) {
                    if declared != kind {
                        return Err(ReconcileError::TypeMismatch {
                            name: name.clone(),
                            declared: *declared,
                            desired: *kind,
                        });
                    }
                }
                if fields.iter().any(|f: &CustomFieldConfig| &f.name == name) {
                    return Err(ConfigError::DuplicateAttribute {
                        family: AttributeFamily::CustomFields,
                        name: name.clone(),
                    }
                    .into());
                }
                fields.push(CustomFieldConfig {
                    name: name.clone(),
                    kind: *kind,
                    value: remote
                        .custom_fields
                        .get(name)
                        .map(codec::format_config_value)
                        .unwrap_or_default(),
                });
            }
            Some(fields)
        }
    };
    let tags = remote
        .tags
        .keys()
        .cloned()
        .map(TagConfig::Slug)
        .collect();
    Ok(ObjectConfig {
        custom_fields,
        tags: Some(tags),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::AttributeValue;
    use std::collections::BTreeMap;

    fn remote() -> RemoteObject {
        RemoteObject {
            custom_fields: BTreeMap::from([
                ("env".into(), AttributeValue::Text("prod".into())),
                ("rack_units".into(), AttributeValue::Integer(4)),
                ("secret".into(), AttributeValue::Text("do not adopt".into())),
            ]),
            field_kinds: BTreeMap::from([
                ("env".into(), FieldKind::Text),
                ("rack_units".into(), FieldKind::Integer),
                ("owner".into(), FieldKind::Text),
            ]),
            tags: BTreeMap::from([("core".into(), ()), ("edge".into(), ())]),
        }
    }

    #[test]
    fn parses_items() {
        let identity =
            ImportIdentity::with_items("12", &["env:text", " rack_units : integer", "zones:multiple"])
                .unwrap();
        assert_eq!(
            identity.custom_fields.unwrap(),
            vec![
                ("env".into(), FieldKind::Text),
                ("rack_units".into(), FieldKind::Integer),
                ("zones".into(), FieldKind::Multiselect),
            ]
        );
    }

    #[test]
    fn rejects_malformed_items() {
        for item in ["env", ":text", "env:colour"] {
            assert!(
                ImportIdentity::with_items("1", &[item]).is_err(),
                "{item} should be rejected"
            );
        }
    }

    #[test]
    fn import_owns_exactly_the_listed_fields() {
        let identity = ImportIdentity::with_items("12", &["env:text", "owner:text"]).unwrap();
        let config = build_import_config(&remote(), &identity).unwrap();
        let fields = config.custom_fields.unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].value, "prod");
        assert_eq!(fields[1].name.as_str(), "owner");
        assert_eq!(fields[1].value, "");
        assert_eq!(
            config.tags.unwrap(),
            vec![TagConfig::Slug("core".into()), TagConfig::Slug("edge".into())]
        );
    }

    #[test]
    fn import_without_items_adopts_no_custom_fields() {
        let config = build_import_config(&remote(), &ImportIdentity::new("12")).unwrap();
        assert!(config.custom_fields.is_none());
        assert_eq!(config.tags.map(|t| t.len()), Some(2));
    }

    #[test]
    fn import_checks_declared_kind() {
        let identity = ImportIdentity::with_items("12", &["rack_units:text"]).unwrap();
        assert!(matches!(
            build_import_config(&remote(), &identity),
            Err(ReconcileError::TypeMismatch { .. })
        ));
    }
}
