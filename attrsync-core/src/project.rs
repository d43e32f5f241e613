//! The read path: what the caller gets to see of the remote state.

use std::fmt;

use crate::{
    model::{
        AttributeName, DesiredAttributeSet, DesiredValue, FilteredView, OwnershipSet,
        RemoteAttributeSet,
    },
    value::AttributeValue,
};

/// Restricts `remote` to the owned names.
///
/// Owned names that do not exist remotely are left out; nothing is
/// synthesized for them.
pub fn project_read<V: Clone>(remote: &RemoteAttributeSet<V>, owned: &OwnershipSet) -> FilteredView<V> {
    owned
        .iter()
        .filter_map(|name| remote.get(name).map(|v| (name.clone(), v.clone())))
        .collect()
}

/// An owned attribute whose remote state disagrees with the configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum Drift<V> {
    /// Configured, but not present remotely.
    Missing { name: AttributeName, expected: V },
    Differs {
        name: AttributeName,
        expected: V,
        actual: V,
    },
    /// Configured as absent, but present remotely.
    Unexpected { name: AttributeName, actual: V },
}

impl<V> Drift<V> {
    pub fn name(&self) -> &AttributeName {
        match self {
            Drift::Missing { name, .. } | Drift::Differs { name, .. } | Drift::Unexpected { name, .. } => {
                name
            }
        }
    }
}

impl fmt::Display for Drift<AttributeValue> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Drift::Missing { name, expected } => write!(f, "{name}: missing, expected {expected}"),
            Drift::Differs {
                name,
                expected,
                actual,
            } => write!(f, "{name}: is {actual}, expected {expected}"),
            Drift::Unexpected { name, actual } => {
                write!(f, "{name}: is {actual}, expected no value")
            }
        }
    }
}

impl fmt::Display for Drift<()> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Drift::Missing { name, .. } => write!(f, "{name}: missing"),
            Drift::Differs { name, .. } => write!(f, "{name}: differs"),
            Drift::Unexpected { name, .. } => write!(f, "{name}: present, expected absent"),
        }
    }
}

/// Compares a filtered view with the desired set it was filtered by.
pub fn detect_drift<V: Clone + PartialEq>(
    view: &FilteredView<V>,
    desired: &DesiredAttributeSet<V>,
) -> Vec<Drift<V>> {
    desired
        .iter()
        .filter_map(|(name, want)| match (want, view.get(name)) {
            (DesiredValue::Set(expected), None) => Some(Drift::Missing {
                name: name.clone(),
                expected: expected.clone(),
            }),
            (DesiredValue::Set(expected), Some(actual)) if actual != expected => {
                Some(Drift::Differs {
                    name: name.clone(),
                    expected: expected.clone(),
                    actual: actual.clone(),
                })
            }
            (DesiredValue::Unset, Some(actual)) => Some(Drift::Unexpected {
                name: name.clone(),
                actual: actual.clone(),
            }),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set<V: Clone>(entries: &[(&str, V)]) -> RemoteAttributeSet<V> {
        entries
            .iter()
            .map(|(k, v)| (AttributeName::from(*k), v.clone()))
            .collect()
    }

    #[test]
    fn projection_keeps_only_owned_present_names() {
        let remote = set(&[("a", 1), ("b", 2), ("c", 3)]);
        let owned: OwnershipSet = ["a", "c", "missing"].into_iter().collect();
        assert_eq!(project_read(&remote, &owned), set(&[("a", 1), ("c", 3)]));
    }

    #[test]
    fn projection_of_nothing_owned_is_empty() {
        let remote = set(&[("a", ())]);
        assert!(project_read(&remote, &OwnershipSet::default()).is_empty());
    }

    #[test]
    fn drift_covers_missing_differing_and_unexpected() {
        let view = set(&[("a", 1), ("b", 2), ("c", 3)]);
        let desired: DesiredAttributeSet<i32> = [
            ("a", DesiredValue::Set(1)),
            ("b", DesiredValue::Set(5)),
            ("c", DesiredValue::Unset),
            ("d", DesiredValue::Set(4)),
            ("e", DesiredValue::Unset),
        ]
        .into_iter()
        .collect();
        let drift = detect_drift(&view, &desired);
        assert_eq!(
            drift,
            vec![
                Drift::Differs {
                    name: "b".into(),
                    expected: 5,
                    actual: 2
                },
                Drift::Unexpected {
                    name: "c".into(),
                    actual: 3
                },
                Drift::Missing {
                    name: "d".into(),
                    expected: 4
                },
            ]
        );
    }

    #[test]
    fn drift_renders_values() {
        let drift = Drift::Differs {
            name: "env".into(),
            expected: AttributeValue::Text("prod".into()),
            actual: AttributeValue::Text("dev".into()),
        };
        assert_eq!(drift.to_string(), "env: is dev, expected prod");
    }
}
