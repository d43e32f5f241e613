use std::{fmt, str::FromStr};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Declared type of a custom field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Longtext,
    Integer,
    Decimal,
    Boolean,
    Date,
    Url,
    Json,
    Select,
    #[serde(alias = "multiple")]
    Multiselect,
    Object,
    Multiobject,
}

impl FieldKind {
    pub const ALL: [FieldKind; 12] = [
        FieldKind::Text,
        FieldKind::Longtext,
        FieldKind::Integer,
        FieldKind::Decimal,
        FieldKind::Boolean,
        FieldKind::Date,
        FieldKind::Url,
        FieldKind::Json,
        FieldKind::Select,
        FieldKind::Multiselect,
        FieldKind::Object,
        FieldKind::Multiobject,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Longtext => "longtext",
            FieldKind::Integer => "integer",
            FieldKind::Decimal => "decimal",
            FieldKind::Boolean => "boolean",
            FieldKind::Date => "date",
            FieldKind::Url => "url",
            FieldKind::Json => "json",
            FieldKind::Select => "select",
            FieldKind::Multiselect => "multiselect",
            FieldKind::Object => "object",
            FieldKind::Multiobject => "multiobject",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown custom field type '{0}'")]
pub struct UnknownFieldKind(pub String);

impl FromStr for FieldKind {
    type Err = UnknownFieldKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "multiple" {
            return Ok(FieldKind::Multiselect);
        }
        FieldKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownFieldKind(s.to_string()))
    }
}

/// A typed custom field value. The reconciliation engine never looks inside;
/// it only compares values for equality.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Text(String),
    LongText(String),
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    Date(NaiveDate),
    Url(String),
    Json(serde_json::Value),
    Select(String),
    MultiSelect(Vec<String>),
    /// Id of the referenced object.
    Object(u64),
    MultiObject(Vec<u64>),
}

impl AttributeValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            AttributeValue::Text(_) => FieldKind::Text,
            AttributeValue::LongText(_) => FieldKind::Longtext,
            AttributeValue::Integer(_) => FieldKind::Integer,
            AttributeValue::Decimal(_) => FieldKind::Decimal,
            AttributeValue::Boolean(_) => FieldKind::Boolean,
            AttributeValue::Date(_) => FieldKind::Date,
            AttributeValue::Url(_) => FieldKind::Url,
            AttributeValue::Json(_) => FieldKind::Json,
            AttributeValue::Select(_) => FieldKind::Select,
            AttributeValue::MultiSelect(_) => FieldKind::Multiselect,
            AttributeValue::Object(_) => FieldKind::Object,
            AttributeValue::MultiObject(_) => FieldKind::Multiobject,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::codec::format_config_value(self))
    }
}
