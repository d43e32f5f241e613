use std::fmt;

use crate::{
    accessor::ObjectPayload,
    model::{AttributeName, ObjectRef, OwnershipSet, ReconciledPayload, RemoteAttributeSet},
    value::AttributeValue,
};

/// One observable difference between the current and the predicted remote state.
#[derive(Debug, Clone, PartialEq)]
pub enum Change<V> {
    Add { name: AttributeName, value: V },
    Update { name: AttributeName, from: V, to: V },
    Remove { name: AttributeName, value: V },
}

impl<V> Change<V> {
    pub fn name(&self) -> &AttributeName {
        match self {
            Change::Add { name, .. } | Change::Update { name, .. } | Change::Remove { name, .. } => {
                name
            }
        }
    }
}

impl fmt::Display for Change<AttributeValue> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Add { name, value } => write!(f, "+ {name} = {value}"),
            Change::Update { name, from, to } => write!(f, "~ {name}: {from} -> {to}"),
            Change::Remove { name, value } => write!(f, "- {name} (was {value})"),
        }
    }
}

impl fmt::Display for Change<()> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Add { name, .. } => write!(f, "+ {name}"),
            // Tags carry no value, so this cannot happen; render it anyway.
            Change::Update { name, .. } => write!(f, "~ {name}"),
            Change::Remove { name, .. } => write!(f, "- {name}"),
        }
    }
}

/// Differences between two states of one family, in name order.
pub fn diff<V: Clone + PartialEq>(
    before: &RemoteAttributeSet<V>,
    after: &RemoteAttributeSet<V>,
) -> Vec<Change<V>> {
    let mut changes = Vec::new();
    for (name, old) in before {
        match after.get(name) {
            None => changes.push(Change::Remove {
                name: name.clone(),
                value: old.clone(),
            }),
            Some(new) if new != old => changes.push(Change::Update {
                name: name.clone(),
                from: old.clone(),
                to: new.clone(),
            }),
            Some(_) => {}
        }
    }
    for (name, new) in after {
        if !before.contains_key(name) {
            changes.push(Change::Add {
                name: name.clone(),
                value: new.clone(),
            });
        }
    }
    changes.sort_by(|a, b| a.name().cmp(b.name()));
    changes
}

#[derive(Debug, Clone, PartialEq)]
pub struct FamilyPlan<V> {
    pub owned: OwnershipSet,
    pub payload: ReconciledPayload<V>,
    pub changes: Vec<Change<V>>,
}

impl<V> FamilyPlan<V> {
    pub fn is_noop(&self) -> bool {
        self.changes.is_empty()
    }

    fn payload_if_changed(&self) -> Option<ReconciledPayload<V>>
    where
        V: Clone,
    {
        (!self.is_noop()).then(|| self.payload.clone())
    }
}

/// The outcome of planning one object, before anything is written.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectPlan {
    pub object: ObjectRef,
    pub custom_fields: FamilyPlan<AttributeValue>,
    pub tags: FamilyPlan<()>,
}

impl ObjectPlan {
    pub fn is_noop(&self) -> bool {
        self.custom_fields.is_noop() && self.tags.is_noop()
    }

    /// The single write for this plan. Families without changes are omitted.
    pub fn payload(&self) -> ObjectPayload {
        ObjectPayload {
            custom_fields: self.custom_fields.payload_if_changed(),
            tags: self.tags.payload_if_changed(),
        }
    }
}

impl fmt::Display for ObjectPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_noop() {
            return write!(f, "{}: no changes", self.object);
        }
        write!(f, "{}:", self.object)?;
        for change in &self.custom_fields.changes {
            write!(f, "\n  custom_fields {change}")?;
        }
        for change in &self.tags.changes {
            write!(f, "\n  tags {change}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WriteMode;

    fn set<V: Clone>(entries: &[(&str, V)]) -> RemoteAttributeSet<V> {
        entries
            .iter()
            .map(|(k, v)| (AttributeName::from(*k), v.clone()))
            .collect()
    }

    #[test]
    fn diff_reports_each_kind_of_change() {
        let before = set(&[("a", 1), ("b", 2), ("c", 3)]);
        let after = set(&[("a", 1), ("b", 20), ("d", 4)]);
        assert_eq!(
            diff(&before, &after),
            vec![
                Change::Update {
                    name: "b".into(),
                    from: 2,
                    to: 20
                },
                Change::Remove {
                    name: "c".into(),
                    value: 3
                },
                Change::Add {
                    name: "d".into(),
                    value: 4
                },
            ]
        );
    }

    #[test]
    fn noop_plan_has_empty_payload() {
        let plan = ObjectPlan {
            object: ObjectRef::new("dcim.site", "1"),
            custom_fields: FamilyPlan {
                owned: ["env"].into_iter().collect(),
                payload: ReconciledPayload {
                    mode: WriteMode::PartialMerge,
                    entries: [("env".into(), Some(AttributeValue::Text("prod".into())))]
                        .into_iter()
                        .collect(),
                },
                changes: vec![],
            },
            tags: FamilyPlan {
                owned: OwnershipSet::default(),
                payload: ReconciledPayload::empty(WriteMode::FullReplace),
                changes: vec![],
            },
        };
        assert!(plan.is_noop());
        assert!(plan.payload().is_empty());
        assert_eq!(plan.to_string(), "dcim.site/1: no changes");
    }

    #[test]
    fn plan_renders_changes() {
        let plan = ObjectPlan {
            object: ObjectRef::new("dcim.site", "1"),
            custom_fields: FamilyPlan {
                owned: ["env"].into_iter().collect(),
                payload: ReconciledPayload::empty(WriteMode::PartialMerge),
                changes: vec![Change::Update {
                    name: "env".into(),
                    from: AttributeValue::Text("dev".into()),
                    to: AttributeValue::Text("prod".into()),
                }],
            },
            tags: FamilyPlan {
                owned: ["edge"].into_iter().collect(),
                payload: ReconciledPayload::empty(WriteMode::FullReplace),
                changes: vec![Change::Add {
                    name: "edge".into(),
                    value: (),
                }],
            },
        };
        assert!(!plan.is_noop());
        let payload = plan.payload();
        assert!(payload.custom_fields.is_some());
        assert!(payload.tags.is_some());
        assert_eq!(
            plan.to_string(),
            "dcim.site/1:\n  custom_fields ~ env: dev -> prod\n  tags + edge"
        );
    }
}
