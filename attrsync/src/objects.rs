use std::path::PathBuf;

use anyhow::{bail, Result};
use attrsync_core::{
    accessor::RemoteObjectAccessor,
    codec,
    engine::{ApplyOutcome, ObjectView, Reconciler},
    error::ReconcileError,
    model::ObjectRef,
    plan::ObjectPlan,
};
use futures_util::future::join_all;
use serde_json::{json, Value};
use tracing::{error, warn};

use crate::{
    config::{parse_object_ref, DesiredFile, Json, ObjectEntry},
    open_accessor, Options, Store,
};

#[derive(clap::Parser, Debug)]
pub(crate) struct Args {
    /// The file describing the desired custom fields and tags
    #[arg(default_value = "attrsync.json")]
    pub desired: PathBuf,

    /// Only work on this object, given as TYPE/ID; may be repeated
    #[arg(long = "object", value_name = "TYPE/ID", value_parser = parse_object_ref)]
    pub objects: Vec<ObjectRef>,
}

struct Setup<A> {
    desired: DesiredFile,
    reconciler: Reconciler<A>,
}

fn set_up(options: &Options, args: &Args) -> Result<Setup<Store>> {
    let desired = DesiredFile::load(&args.desired)?;
    let accessor = open_accessor(options)?;
    let reconciler = Reconciler::with_modes(accessor, desired.write_modes.unwrap_or_default());
    Ok(Setup {
        desired,
        reconciler,
    })
}

/// Runs `f` for every selected object concurrently. Prints the successful
/// results in configuration order, then fails if any object failed.
async fn for_each_object<'a, A, T, Fut>(
    setup: &'a Setup<A>,
    only: &[ObjectRef],
    f: impl Fn(&'a Reconciler<A>, &'a ObjectEntry) -> Fut,
    mut report: impl FnMut(T),
) -> Result<()>
where
    A: RemoteObjectAccessor,
    Fut: std::future::Future<Output = Result<T, ReconcileError>>,
{
    let entries = setup.desired.select(only)?;
    if entries.is_empty() {
        warn!("no objects configured");
        return Ok(());
    }
    let total = entries.len();
    let results = join_all(entries.into_iter().map(|entry| {
        let fut = f(&setup.reconciler, entry);
        async move { (entry.object(), fut.await) }
    }))
    .await;

    let mut failed = 0;
    for (object, result) in results {
        match result {
            Ok(value) => report(value),
            Err(e) => {
                failed += 1;
                error!(%object, "{}", e);
            }
        }
    }
    if failed > 0 {
        bail!("{} of {} objects failed", failed, total);
    }
    Ok(())
}

pub(crate) async fn plan(options: &Options, args: &Args) -> Result<()> {
    let setup = set_up(options, args)?;
    for_each_object(
        &setup,
        &args.objects,
        |reconciler, entry| async move { reconciler.plan(&entry.object(), &entry.config).await },
        |plan: ObjectPlan| println!("{}", plan),
    )
    .await
}

pub(crate) async fn apply(options: &Options, args: &Args) -> Result<()> {
    let setup = set_up(options, args)?;
    for_each_object(
        &setup,
        &args.objects,
        |reconciler, entry| async move { reconciler.apply(&entry.object(), &entry.config).await },
        |outcome: ApplyOutcome| {
            println!("{}", outcome.plan);
            if !outcome.view.in_sync() {
                // The remote accepted the write but reads back differently.
                for line in drift_lines(&outcome.view) {
                    warn!(object = %outcome.view.object, "{}", line);
                }
            }
        },
    )
    .await
}

pub(crate) async fn read(options: &Options, args: &Args) -> Result<()> {
    let setup = set_up(options, args)?;
    for_each_object(
        &setup,
        &args.objects,
        |reconciler, entry| async move { reconciler.read(&entry.object(), &entry.config).await },
        |view: ObjectView| println!("{}", Json(&view_json(&view))),
    )
    .await
}

fn drift_lines(view: &ObjectView) -> Vec<String> {
    view.custom_field_drift
        .iter()
        .map(|d| format!("custom field {}", d))
        .chain(view.tag_drift.iter().map(|d| format!("tag {}", d)))
        .collect()
}

/// The JSON line `read` prints for one object.
fn view_json(view: &ObjectView) -> Value {
    let custom_fields: serde_json::Map<String, Value> = view
        .custom_fields
        .iter()
        .map(|(name, value)| (name.to_string(), codec::encode(value)))
        .collect();
    let tags: Vec<&str> = view.tags.keys().map(|slug| slug.as_str()).collect();
    json!({
        "object": view.object.to_string(),
        "customFields": custom_fields,
        "tags": tags,
        "inSync": view.in_sync(),
        "drift": drift_lines(view),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use attrsync_core::{
        memory::InMemoryAccessor,
        model::RemoteObject,
        value::{AttributeValue, FieldKind},
    };
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn view_json_reports_owned_state_and_drift() {
        let device = ObjectRef::new("dcim.device", "42");
        let accessor = InMemoryAccessor::new();
        accessor.insert(
            device.clone(),
            RemoteObject {
                custom_fields: BTreeMap::from([
                    ("env".into(), AttributeValue::Text("dev".into())),
                    ("owner".into(), AttributeValue::Text("team-a".into())),
                ]),
                field_kinds: BTreeMap::from([
                    ("env".into(), FieldKind::Text),
                    ("owner".into(), FieldKind::Text),
                ]),
                tags: BTreeMap::from([("core".into(), ())]),
            },
        );
        let config = serde_json::from_value(json!({
            "custom_fields": [{"name": "env", "type": "text", "value": "prod"}],
            "tags": ["core"]
        }))
        .unwrap();
        let view = Reconciler::new(accessor).read(&device, &config).await.unwrap();

        assert_eq!(
            view_json(&view),
            json!({
                "object": "dcim.device/42",
                "customFields": {"env": "dev"},
                "tags": ["core"],
                "inSync": false,
                "drift": ["custom field env: is dev, expected prod"],
            })
        );
    }
}
