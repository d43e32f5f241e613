//! The write path: turning a desired set into the payload that is transmitted.

use std::collections::BTreeMap;

use tracing::trace;

use crate::{
    codec,
    error::ReconcileError,
    model::{
        AttributeName, DesiredAttributeSet, DesiredValue, OwnershipSet, ReconciledPayload,
        RemoteAttributeSet, WriteMode,
    },
    value::{AttributeValue, FieldKind},
};

/// Computes what to send for one attribute family.
///
/// In [`WriteMode::PartialMerge`] only owned names appear in the payload. An
/// explicit unset becomes a clear, and only when the remote currently holds a
/// value.
///
/// In [`WriteMode::FullReplace`] the payload is the complete collection: every
/// unowned remote entry with its freshly read value, plus the owned entries
/// that are set. Unset entries are left out, which deletes them.
///
/// `desired` must only contain names from `owned`.
pub fn plan_write<V: Clone>(
    remote: &RemoteAttributeSet<V>,
    desired: &DesiredAttributeSet<V>,
    owned: &OwnershipSet,
    mode: WriteMode,
) -> ReconciledPayload<V> {
    debug_assert!(desired.keys().all(|k| owned.contains(k.as_str())));

    let mut entries = BTreeMap::new();
    match mode {
        WriteMode::PartialMerge => {
            for (name, value) in desired.iter() {
                match value {
                    DesiredValue::Set(v) => {
                        entries.insert(name.clone(), Some(v.clone()));
                    }
                    DesiredValue::Unset => {
                        if remote.contains_key(name) {
                            entries.insert(name.clone(), None);
                        }
                    }
                }
            }
        }
        WriteMode::FullReplace => {
            for (name, value) in remote {
                if !owned.contains(name.as_str()) {
                    trace!(%name, "preserving unowned attribute");
                    entries.insert(name.clone(), Some(value.clone()));
                }
            }
            for (name, value) in desired.iter() {
                if let DesiredValue::Set(v) = value {
                    entries.insert(name.clone(), Some(v.clone()));
                }
            }
        }
    }
    ReconciledPayload { mode, entries }
}

/// The remote state after `payload` has been applied under its mode.
pub fn apply_payload<V: Clone>(
    remote: &RemoteAttributeSet<V>,
    payload: &ReconciledPayload<V>,
) -> RemoteAttributeSet<V> {
    match payload.mode {
        WriteMode::PartialMerge => {
            let mut result = remote.clone();
            for (name, value) in &payload.entries {
                match value {
                    Some(v) => {
                        result.insert(name.clone(), v.clone());
                    }
                    None => {
                        result.remove(name);
                    }
                }
            }
            result
        }
        WriteMode::FullReplace => payload
            .entries
            .iter()
            .filter_map(|(name, value)| value.as_ref().map(|v| (name.clone(), v.clone())))
            .collect(),
    }
}

/// Rejects a desired value whose kind disagrees with the field.
///
/// The declared definition wins. Without one, the kind of the current remote
/// value is used; it was inferred from the wire, so all string-shaped kinds are
/// accepted for each other. Names unknown on both sides are left to the remote.
pub fn validate_kinds(
    desired: &DesiredAttributeSet<AttributeValue>,
    field_kinds: &BTreeMap<AttributeName, FieldKind>,
    remote: &RemoteAttributeSet<AttributeValue>,
) -> Result<(), ReconcileError> {
    for (name, value) in desired.iter() {
        let Some(value) = value.as_set() else {
            continue;
        };
        let desired_kind = value.kind();
        let compatible = if let Some(declared) = field_kinds.get(name) {
            *declared == desired_kind
        } else if let Some(current) = remote.get(name) {
            let inferred = current.kind();
            inferred == desired_kind || (is_string_shaped(inferred) && is_string_shaped(desired_kind))
        } else {
            true
        };
        if !compatible {
            let declared = field_kinds
                .get(name)
                .copied()
                .or_else(|| remote.get(name).map(AttributeValue::kind))
                .unwrap_or(desired_kind);
            return Err(ReconcileError::TypeMismatch {
                name: name.clone(),
                declared,
                desired: desired_kind,
            });
        }
    }
    Ok(())
}

/// Retypes undeclared string values the way the remote reports them back.
///
/// Without a definition the remote's kind is inferred from the wire on every
/// read, so `Text("https://wiki/x")` reads back as a url. Planning and drift
/// detection compare against that form. Run it after [`validate_kinds`].
pub fn align_undeclared(
    desired: &DesiredAttributeSet<AttributeValue>,
    field_kinds: &BTreeMap<AttributeName, FieldKind>,
) -> DesiredAttributeSet<AttributeValue> {
    desired
        .iter()
        .map(|(name, value)| {
            let value = match value {
                DesiredValue::Set(v)
                    if !field_kinds.contains_key(name) && is_string_shaped(v.kind()) =>
                {
                    DesiredValue::Set(codec::infer(&codec::encode(v)).unwrap_or_else(|| v.clone()))
                }
                other => other.clone(),
            };
            (name.clone(), value)
        })
        .collect()
}

fn is_string_shaped(kind: FieldKind) -> bool {
    matches!(
        kind,
        FieldKind::Text | FieldKind::Longtext | FieldKind::Url | FieldKind::Date | FieldKind::Select
    )
}
