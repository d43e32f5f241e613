use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, Instrument};

use crate::{
    accessor::RemoteObjectAccessor,
    config::ObjectConfig,
    error::ReconcileError,
    import::{build_import_config, ImportIdentity},
    model::{
        AttributeFamily, DesiredAttributeSet, FilteredView, ObjectRef, OwnershipSet,
        RemoteAttributeSet, RemoteObject, WriteMode,
    },
    ownership::extract_ownership,
    plan::{diff, FamilyPlan, ObjectPlan},
    project::{detect_drift, project_read, Drift},
    reconcile::{align_undeclared, apply_payload, plan_write, validate_kinds},
    value::AttributeValue,
};

/// The wire contract of each attribute family on the remote system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteModes {
    pub custom_fields: WriteMode,
    pub tags: WriteMode,
}

impl Default for WriteModes {
    fn default() -> Self {
        WriteModes {
            custom_fields: AttributeFamily::CustomFields.default_write_mode(),
            tags: AttributeFamily::Tags.default_write_mode(),
        }
    }
}

/// The owned part of an object's remote state.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectView {
    pub object: ObjectRef,
    pub custom_fields: FilteredView<AttributeValue>,
    pub tags: FilteredView<()>,
    pub custom_field_drift: Vec<Drift<AttributeValue>>,
    pub tag_drift: Vec<Drift<()>>,
}

impl ObjectView {
    pub fn in_sync(&self) -> bool {
        self.custom_field_drift.is_empty() && self.tag_drift.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApplyOutcome {
    pub plan: ObjectPlan,
    /// `false` when the plan was a no-op and nothing was sent.
    pub written: bool,
    pub view: ObjectView,
}

/// Reconciles objects against an accessor.
///
/// Every call reads the remote state afresh and derives ownership from the
/// configuration it is given; nothing is remembered between calls. Calls for
/// different objects may run concurrently.
pub struct Reconciler<A> {
    accessor: A,
    modes: WriteModes,
}

impl<A: RemoteObjectAccessor> Reconciler<A> {
    pub fn new(accessor: A) -> Self {
        Self::with_modes(accessor, WriteModes::default())
    }

    pub fn with_modes(accessor: A, modes: WriteModes) -> Self {
        Reconciler { accessor, modes }
    }

    pub fn accessor(&self) -> &A {
        &self.accessor
    }

    pub fn modes(&self) -> WriteModes {
        self.modes
    }

    async fn read_remote(&self, object: &ObjectRef) -> Result<RemoteObject, ReconcileError> {
        self.accessor
            .read_attributes(object)
            .await
            .map_err(|source| ReconcileError::RemoteRead {
                object: object.clone(),
                source,
            })
    }

    /// Computes what an apply would do, without writing.
    pub async fn plan(
        &self,
        object: &ObjectRef,
        config: &ObjectConfig,
    ) -> Result<ObjectPlan, ReconcileError> {
        async {
            let remote = self.read_remote(object).await?;
            self.plan_against(object, config, &remote)
        }
        .instrument(info_span!("plan", %object))
        .await
    }

    fn plan_against(
        &self,
        object: &ObjectRef,
        config: &ObjectConfig,
        remote: &RemoteObject,
    ) -> Result<ObjectPlan, ReconcileError> {
        let desired_fields = config.desired_custom_fields()?;
        let desired_tags = config.desired_tags()?;
        validate_kinds(&desired_fields, &remote.field_kinds, &remote.custom_fields)?;
        let desired_fields = align_undeclared(&desired_fields, &remote.field_kinds);

        let plan = ObjectPlan {
            object: object.clone(),
            custom_fields: plan_family(
                &remote.custom_fields,
                &desired_fields,
                extract_ownership(config, AttributeFamily::CustomFields),
                self.modes.custom_fields,
            ),
            tags: plan_family(
                &remote.tags,
                &desired_tags,
                extract_ownership(config, AttributeFamily::Tags),
                self.modes.tags,
            ),
        };
        for change in &plan.custom_fields.changes {
            debug!(%change, "planned custom field change");
        }
        for change in &plan.tags.changes {
            debug!(%change, "planned tag change");
        }
        Ok(plan)
    }

    /// Plans, writes a single payload if anything changes, and reports the
    /// owned state afterwards.
    pub async fn apply(
        &self,
        object: &ObjectRef,
        config: &ObjectConfig,
    ) -> Result<ApplyOutcome, ReconcileError> {
        async {
            let remote = self.read_remote(object).await?;
            let plan = self.plan_against(object, config, &remote)?;

            let written = if plan.is_noop() {
                debug!("no changes, skipping write");
                false
            } else {
                self.accessor
                    .write_attributes(object, &plan.payload())
                    .await
                    .map_err(|source| ReconcileError::RemoteWrite {
                        object: object.clone(),
                        source,
                    })?;
                info!(
                    custom_fields = plan.custom_fields.changes.len(),
                    tags = plan.tags.changes.len(),
                    "attributes written"
                );
                true
            };

            let after = if written {
                self.accessor.read_attributes(object).await.map_err(|source| {
                    ReconcileError::Unverified {
                        object: object.clone(),
                        source,
                    }
                })?
            } else {
                self.read_remote(object).await?
            };
            let view = view_of(object, config, &after)?;
            Ok::<_, ReconcileError>(ApplyOutcome {
                plan,
                written,
                view,
            })
        }
        .instrument(info_span!("apply", %object))
        .await
    }

    /// The owned part of the remote state, and how it deviates from `config`.
    pub async fn read(
        &self,
        object: &ObjectRef,
        config: &ObjectConfig,
    ) -> Result<ObjectView, ReconcileError> {
        async {
            let remote = self.read_remote(object).await?;
            view_of(object, config, &remote)
        }
        .instrument(info_span!("read", %object))
        .await
    }

    /// Builds a configuration that adopts an existing object.
    pub async fn import(
        &self,
        object_type: &str,
        identity: &ImportIdentity,
    ) -> Result<(ObjectRef, ObjectConfig), ReconcileError> {
        let object = ObjectRef::new(object_type, identity.object_id.clone());
        async {
            let remote = self.read_remote(&object).await?;
            let config = build_import_config(&remote, identity)?;
            Ok::<_, ReconcileError>((object.clone(), config))
        }
        .instrument(info_span!("import", %object))
        .await
    }
}

fn plan_family<V: Clone + PartialEq>(
    remote: &RemoteAttributeSet<V>,
    desired: &DesiredAttributeSet<V>,
    owned: OwnershipSet,
    mode: WriteMode,
) -> FamilyPlan<V> {
    let payload = plan_write(remote, desired, &owned, mode);
    let predicted = apply_payload(remote, &payload);
    let changes = diff(remote, &predicted);
    FamilyPlan {
        owned,
        payload,
        changes,
    }
}

fn view_of(
    object: &ObjectRef,
    config: &ObjectConfig,
    remote: &RemoteObject,
) -> Result<ObjectView, ReconcileError> {
    let desired_fields = align_undeclared(&config.desired_custom_fields()?, &remote.field_kinds);
    let desired_tags = config.desired_tags()?;
    let custom_fields = project_read(
        &remote.custom_fields,
        &extract_ownership(config, AttributeFamily::CustomFields),
    );
    let tags = project_read(&remote.tags, &extract_ownership(config, AttributeFamily::Tags));
    Ok(ObjectView {
        object: object.clone(),
        custom_field_drift: detect_drift(&custom_fields, &desired_fields),
        tag_drift: detect_drift(&tags, &desired_tags),
        custom_fields,
        tags,
    })
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, sync::Arc};

    use serde_json::json;

    use super::*;
    use crate::{
        accessor::AccessorError, memory::InMemoryAccessor, model::AttributeName, value::FieldKind,
    };

    fn device() -> ObjectRef {
        ObjectRef::new("dcim.device", "42")
    }

    fn text(s: &str) -> AttributeValue {
        AttributeValue::Text(s.to_string())
    }

    fn config(v: serde_json::Value) -> ObjectConfig {
        serde_json::from_value(v).unwrap()
    }

    fn names<V>(set: &RemoteAttributeSet<V>) -> Vec<&str> {
        set.keys().map(AttributeName::as_str).collect()
    }

    /// A device with two text fields, one integer and one boolean field defined,
    /// two of them set, and two tags.
    fn reconciler() -> Reconciler<InMemoryAccessor> {
        let accessor = InMemoryAccessor::new();
        accessor.insert(
            device(),
            RemoteObject {
                custom_fields: BTreeMap::from([
                    ("env".into(), text("prod")),
                    ("owner".into(), text("team-a")),
                ]),
                field_kinds: BTreeMap::from([
                    ("env".into(), FieldKind::Text),
                    ("owner".into(), FieldKind::Text),
                    ("rack_units".into(), FieldKind::Integer),
                    ("in_service".into(), FieldKind::Boolean),
                ]),
                tags: BTreeMap::from([("core".into(), ()), ("legacy".into(), ())]),
            },
        );
        Reconciler::new(accessor)
    }

    fn remote_state(r: &Reconciler<InMemoryAccessor>) -> RemoteObject {
        r.accessor().get(&device()).unwrap()
    }

    #[tokio::test]
    async fn round_trip_keeps_unowned_fields() {
        let r = reconciler();

        let first = config(json!({
            "custom_fields": [{"name": "env", "type": "text", "value": "staging"}]
        }));
        let outcome = r.apply(&device(), &first).await.unwrap();
        assert!(outcome.written);
        assert_eq!(
            remote_state(&r).custom_fields,
            BTreeMap::from([("env".into(), text("staging")), ("owner".into(), text("team-a"))])
        );
        assert_eq!(names(&outcome.view.custom_fields), vec!["env"]);

        let second = config(json!({
            "custom_fields": [
                {"name": "env", "type": "text", "value": "staging"},
                {"name": "owner", "type": "text", "value": "team-a"},
            ]
        }));
        let outcome = r.apply(&device(), &second).await.unwrap();
        assert!(outcome.plan.is_noop());
        assert!(!outcome.written);
        assert_eq!(r.accessor().write_count(), 1);
        assert_eq!(
            outcome.view.custom_fields,
            BTreeMap::from([("env".into(), text("staging")), ("owner".into(), text("team-a"))])
        );
        assert!(outcome.view.in_sync());
    }

    #[tokio::test]
    async fn partial_merge_payload_never_names_unowned() {
        let r = reconciler();
        let cfg = config(json!({
            "custom_fields": [{"name": "rack_units", "type": "integer", "value": "4"}]
        }));
        r.apply(&device(), &cfg).await.unwrap();

        let writes = r.accessor().writes();
        let fields = writes[0].1.custom_fields.as_ref().unwrap();
        assert_eq!(fields.mode, WriteMode::PartialMerge);
        assert_eq!(names(&fields.entries), vec!["rack_units"]);
        assert!(writes[0].1.tags.is_none());
    }

    #[tokio::test]
    async fn full_replace_forwards_unowned_tags() {
        let r = reconciler();
        let cfg = config(json!({"tags": ["edge"]}));
        r.apply(&device(), &cfg).await.unwrap();

        let writes = r.accessor().writes();
        let tags = writes[0].1.tags.as_ref().unwrap();
        assert_eq!(tags.mode, WriteMode::FullReplace);
        assert_eq!(names(&tags.entries), vec!["core", "edge", "legacy"]);
        assert_eq!(names(&remote_state(&r).tags), vec!["core", "edge", "legacy"]);
    }

    #[tokio::test]
    async fn ownership_is_not_sticky() {
        let r = reconciler();
        let both = config(json!({
            "custom_fields": [
                {"name": "env", "type": "text", "value": "prod"},
                {"name": "owner", "type": "text", "value": "team-a"},
            ],
            "tags": ["core", "legacy"]
        }));
        r.apply(&device(), &both).await.unwrap();

        let only_env = config(json!({
            "custom_fields": [{"name": "env", "type": "text", "value": "qa"}],
            "tags": ["core"]
        }));
        let outcome = r.apply(&device(), &only_env).await.unwrap();

        let state = remote_state(&r);
        assert_eq!(
            state.custom_fields,
            BTreeMap::from([("env".into(), text("qa")), ("owner".into(), text("team-a"))])
        );
        assert_eq!(names(&state.tags), vec!["core", "legacy"]);
        assert_eq!(names(&outcome.view.custom_fields), vec!["env"]);
        assert_eq!(names(&outcome.view.tags), vec!["core"]);
    }

    #[tokio::test]
    async fn owned_missing_fields_are_added() {
        let accessor = InMemoryAccessor::new();
        accessor.insert(
            device(),
            RemoteObject {
                field_kinds: BTreeMap::from([("x".into(), FieldKind::Text)]),
                ..Default::default()
            },
        );
        let r = Reconciler::new(accessor);
        let cfg = config(json!({
            "custom_fields": [{"name": "x", "type": "text", "value": "v"}],
            "tags": ["fresh"]
        }));
        let plan = r.plan(&device(), &cfg).await.unwrap();
        assert!(matches!(
            plan.custom_fields.changes.as_slice(),
            [crate::plan::Change::Add { .. }]
        ));
        r.apply(&device(), &cfg).await.unwrap();
        let state = r.accessor().get(&device()).unwrap();
        assert_eq!(state.custom_fields, BTreeMap::from([("x".into(), text("v"))]));
        assert_eq!(names(&state.tags), vec!["fresh"]);
    }

    #[tokio::test]
    async fn explicit_unset_clears_in_both_families() {
        let r = reconciler();
        let cfg = config(json!({
            "custom_fields": [{"name": "owner", "type": "text", "value": ""}],
            "tags": [{"slug": "legacy", "absent": true}]
        }));
        let outcome = r.apply(&device(), &cfg).await.unwrap();
        let state = remote_state(&r);
        assert_eq!(names(&state.custom_fields), vec!["env"]);
        assert_eq!(names(&state.tags), vec!["core"]);
        assert!(outcome.view.custom_fields.is_empty());
        assert!(outcome.view.in_sync());

        // Nothing left to clear.
        let again = r.apply(&device(), &cfg).await.unwrap();
        assert!(!again.written);
    }

    #[tokio::test]
    async fn type_mismatch_writes_nothing() {
        let r = reconciler();
        let before = remote_state(&r);
        let cfg = config(json!({
            "custom_fields": [{"name": "in_service", "type": "integer", "value": "1"}]
        }));
        let err = r.apply(&device(), &cfg).await.unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::TypeMismatch {
                declared: FieldKind::Boolean,
                desired: FieldKind::Integer,
                ..
            }
        ));
        assert_eq!(remote_state(&r), before);
        assert_eq!(r.accessor().write_count(), 0);
    }

    #[tokio::test]
    async fn read_failure_aborts_before_planning() {
        let r = reconciler();
        r.accessor().fail_next_read("connection reset");
        let cfg = config(json!({
            "custom_fields": [{"name": "env", "type": "text", "value": "qa"}]
        }));
        let err = r.apply(&device(), &cfg).await.unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::RemoteRead {
                source: AccessorError::Unavailable { .. },
                ..
            }
        ));
        assert_eq!(r.accessor().write_count(), 0);
    }

    #[tokio::test]
    async fn write_failure_is_surfaced() {
        let r = reconciler();
        r.accessor().fail_next_write("gateway timeout");
        let cfg = config(json!({"tags": ["edge"]}));
        let err = r.apply(&device(), &cfg).await.unwrap_err();
        assert!(matches!(err, ReconcileError::RemoteWrite { .. }));
        assert_eq!(names(&remote_state(&r).tags), vec!["core", "legacy"]);

        // Re-invoking is the recovery.
        assert!(r.apply(&device(), &cfg).await.unwrap().written);
    }

    #[tokio::test]
    async fn failed_read_back_still_reports_the_write() {
        let r = reconciler();
        r.accessor().fail_read_after_write("connection reset");
        let cfg = config(json!({"tags": ["edge"]}));
        let err = r.apply(&device(), &cfg).await.unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::Unverified {
                source: AccessorError::Unavailable { .. },
                ..
            }
        ));
        assert_eq!(r.accessor().write_count(), 1);
        assert_eq!(names(&remote_state(&r).tags), vec!["core", "edge", "legacy"]);
    }

    #[tokio::test]
    async fn undeclared_string_fields_settle_after_one_apply() {
        let accessor = InMemoryAccessor::new();
        accessor.insert(
            device(),
            RemoteObject {
                custom_fields: BTreeMap::from([(
                    "docs".into(),
                    AttributeValue::Url("https://wiki/x".into()),
                )]),
                ..Default::default()
            },
        );
        let r = Reconciler::new(accessor);
        let cfg = config(json!({
            "custom_fields": [{"name": "docs", "type": "text", "value": "https://wiki/x"}]
        }));

        let plan = r.plan(&device(), &cfg).await.unwrap();
        assert!(plan.is_noop(), "{plan}");
        let view = r.read(&device(), &cfg).await.unwrap();
        assert!(view.in_sync(), "{:?}", view.custom_field_drift);
        let outcome = r.apply(&device(), &cfg).await.unwrap();
        assert!(!outcome.written);
        assert_eq!(r.accessor().write_count(), 0);
    }

    #[tokio::test]
    async fn undefined_field_is_rejected_by_remote() {
        let r = reconciler();
        let cfg = config(json!({
            "custom_fields": [{"name": "nope", "type": "text", "value": "x"}]
        }));
        let err = r.apply(&device(), &cfg).await.unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::RemoteWrite {
                source: AccessorError::Rejected { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn read_filters_and_reports_drift() {
        let r = reconciler();
        r.accessor().modify(&device(), |state| {
            state.custom_fields.insert("env".into(), text("hotfix"));
        });
        let cfg = config(json!({
            "custom_fields": [
                {"name": "env", "type": "text", "value": "prod"},
                {"name": "rack_units", "type": "integer", "value": "2"},
            ],
            "tags": ["core"]
        }));
        let view = r.read(&device(), &cfg).await.unwrap();
        assert_eq!(names(&view.custom_fields), vec!["env"]);
        assert_eq!(names(&view.tags), vec!["core"]);
        assert_eq!(
            view.custom_field_drift
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>(),
            vec!["env: is hotfix, expected prod", "rack_units: missing, expected 2"]
        );
        assert!(view.tag_drift.is_empty());
    }

    #[tokio::test]
    async fn empty_configuration_touches_nothing() {
        let r = reconciler();
        let before = remote_state(&r);
        for cfg in [
            ObjectConfig::default(),
            config(json!({"custom_fields": [], "tags": []})),
        ] {
            let outcome = r.apply(&device(), &cfg).await.unwrap();
            assert!(!outcome.written);
            assert!(outcome.view.custom_fields.is_empty());
        }
        assert_eq!(remote_state(&r), before);
    }

    #[tokio::test]
    async fn overridden_modes_are_honoured() {
        let accessor = InMemoryAccessor::new();
        accessor.insert(
            device(),
            RemoteObject {
                tags: BTreeMap::from([("core".into(), ())]),
                ..Default::default()
            },
        );
        let r = Reconciler::with_modes(
            accessor,
            WriteModes {
                custom_fields: WriteMode::PartialMerge,
                tags: WriteMode::PartialMerge,
            },
        );
        r.apply(&device(), &config(json!({"tags": ["edge"]})))
            .await
            .unwrap();
        let writes = r.accessor().writes();
        assert_eq!(names(&writes[0].1.tags.as_ref().unwrap().entries), vec!["edge"]);
        assert_eq!(names(&r.accessor().get(&device()).unwrap().tags), vec!["core", "edge"]);
    }

    #[tokio::test]
    async fn import_then_apply_is_a_noop() {
        let r = reconciler();
        let identity = ImportIdentity::with_items("42", &["env:text", "rack_units:integer"]).unwrap();
        let (object, cfg) = r.import("dcim.device", &identity).await.unwrap();
        assert_eq!(object, device());

        let outcome = r.apply(&object, &cfg).await.unwrap();
        assert!(outcome.plan.is_noop());
        assert_eq!(names(&outcome.view.custom_fields), vec!["env"]);
        assert_eq!(names(&outcome.view.tags), vec!["core", "legacy"]);
    }

    #[tokio::test]
    async fn concurrent_objects_through_shared_accessor() {
        let accessor = Arc::new(InMemoryAccessor::new());
        let kinds = BTreeMap::from([("env".into(), FieldKind::Text)]);
        for id in ["1", "2", "3"] {
            accessor.insert(
                ObjectRef::new("dcim.site", id),
                RemoteObject {
                    field_kinds: kinds.clone(),
                    ..Default::default()
                },
            );
        }
        let r = Reconciler::new(accessor.clone());
        let cfg = config(json!({
            "custom_fields": [{"name": "env", "type": "text", "value": "prod"}]
        }));
        let objects: Vec<_> = ["1", "2", "3"]
            .into_iter()
            .map(|id| ObjectRef::new("dcim.site", id))
            .collect();
        let (a, b, c) = tokio::join!(
            r.apply(&objects[0], &cfg),
            r.apply(&objects[1], &cfg),
            r.apply(&objects[2], &cfg),
        );
        for outcome in [a, b, c] {
            assert!(outcome.unwrap().view.in_sync());
        }
        assert_eq!(accessor.write_count(), 3);
    }
}
