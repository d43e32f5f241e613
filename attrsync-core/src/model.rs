use std::{
    borrow::Borrow,
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use serde::{Deserialize, Serialize};

use crate::value::{AttributeValue, FieldKind};

/// Name of a custom field, or slug of a tag. Compared exactly.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeName(String);

impl AttributeName {
    pub fn new(name: impl Into<String>) -> Self {
        AttributeName(name.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AttributeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AttributeName {
    fn from(s: &str) -> Self {
        AttributeName(s.to_string())
    }
}

impl From<String> for AttributeName {
    fn from(s: String) -> Self {
        AttributeName(s)
    }
}

impl Borrow<str> for AttributeName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Identifies one remote object. The object type is opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    #[serde(rename = "type")]
    pub object_type: String,
    #[serde(rename = "id")]
    pub object_id: String,
}

impl ObjectRef {
    pub fn new(object_type: impl Into<String>, object_id: impl Into<String>) -> Self {
        ObjectRef {
            object_type: object_type.into(),
            object_id: object_id.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.object_type, self.object_id)
    }
}

/// The wire contract of a remote attribute collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriteMode {
    /// The remote merges a sparse payload; omitted keys are untouched.
    PartialMerge,
    /// The remote replaces the whole collection; omitted keys are deleted.
    FullReplace,
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteMode::PartialMerge => f.write_str("partial-merge"),
            WriteMode::FullReplace => f.write_str("full-replace"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttributeFamily {
    CustomFields,
    Tags,
}

impl AttributeFamily {
    /// Custom fields are merged key by key, tag lists are replaced wholesale.
    pub fn default_write_mode(self) -> WriteMode {
        match self {
            AttributeFamily::CustomFields => WriteMode::PartialMerge,
            AttributeFamily::Tags => WriteMode::FullReplace,
        }
    }
}

impl fmt::Display for AttributeFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeFamily::CustomFields => f.write_str("custom_fields"),
            AttributeFamily::Tags => f.write_str("tags"),
        }
    }
}

/// Current, authoritative remote state of one attribute family.
pub type RemoteAttributeSet<V> = BTreeMap<AttributeName, V>;

/// Remote entries restricted to the owned names.
pub type FilteredView<V> = BTreeMap<AttributeName, V>;

/// Everything the accessor reports about one object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteObject {
    pub custom_fields: RemoteAttributeSet<AttributeValue>,
    /// Declared kinds of the custom fields available on this object type.
    pub field_kinds: BTreeMap<AttributeName, FieldKind>,
    /// Tags are presence-only, keyed by slug.
    pub tags: RemoteAttributeSet<()>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DesiredValue<V> {
    Set(V),
    /// The configuration asks for the attribute to be removed.
    Unset,
}

impl<V> DesiredValue<V> {
    pub fn as_set(&self) -> Option<&V> {
        match self {
            DesiredValue::Set(v) => Some(v),
            DesiredValue::Unset => None,
        }
    }
}

/// The owned name → value pairs of one apply.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredAttributeSet<V> {
    entries: BTreeMap<AttributeName, DesiredValue<V>>,
}

impl<V> Default for DesiredAttributeSet<V> {
    fn default() -> Self {
        DesiredAttributeSet {
            entries: BTreeMap::new(),
        }
    }
}

impl<V> DesiredAttributeSet<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the previous entry, if the name was already present.
    pub fn insert(
        &mut self,
        name: impl Into<AttributeName>,
        value: DesiredValue<V>,
    ) -> Option<DesiredValue<V>> {
        self.entries.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<&DesiredValue<V>> {
        self.entries.get(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &AttributeName> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AttributeName, &DesiredValue<V>)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V, N: Into<AttributeName>> FromIterator<(N, DesiredValue<V>)> for DesiredAttributeSet<V> {
    fn from_iter<T: IntoIterator<Item = (N, DesiredValue<V>)>>(iter: T) -> Self {
        DesiredAttributeSet {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Names owned by the configuration being processed right now.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnershipSet(BTreeSet<AttributeName>);

impl OwnershipSet {
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }
    pub fn iter(&self) -> impl Iterator<Item = &AttributeName> {
        self.0.iter()
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<N: Into<AttributeName>> FromIterator<N> for OwnershipSet {
    fn from_iter<T: IntoIterator<Item = N>>(iter: T) -> Self {
        OwnershipSet(iter.into_iter().map(Into::into).collect())
    }
}

/// What is actually transmitted for one attribute family.
///
/// A `None` entry is an explicit clear; it only appears in
/// [`WriteMode::PartialMerge`] payloads.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledPayload<V> {
    pub mode: WriteMode,
    pub entries: BTreeMap<AttributeName, Option<V>>,
}

impl<V> ReconciledPayload<V> {
    pub fn empty(mode: WriteMode) -> Self {
        ReconciledPayload {
            mode,
            entries: BTreeMap::new(),
        }
    }
}
