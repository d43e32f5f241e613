use anyhow::Result;
use attrsync_core::{engine::Reconciler, import::ImportIdentity, model::ObjectRef};

use crate::{config::ObjectEntry, open_accessor, Options};

#[derive(clap::Parser, Debug)]
pub(crate) struct Args {
    /// The object type, e.g. `dcim.device`
    #[arg(long = "type")]
    object_type: String,

    /// The object id
    #[arg(long)]
    id: String,

    /// Custom fields to adopt, as NAME:TYPE. Without this flag the object
    /// gets no custom field block.
    #[arg(long = "custom-field", value_name = "NAME:TYPE", value_delimiter = ',')]
    custom_fields: Option<Vec<String>>,
}

impl Args {
    fn identity(&self) -> Result<ImportIdentity> {
        Ok(match &self.custom_fields {
            None => ImportIdentity::new(self.id.clone()),
            Some(items) => ImportIdentity::with_items(self.id.clone(), items.as_slice())?,
        })
    }
}

fn to_entry(object: ObjectRef, config: attrsync_core::config::ObjectConfig) -> ObjectEntry {
    ObjectEntry {
        object_type: object.object_type,
        id: object.object_id,
        config,
    }
}

/// Prints an `objects` entry that takes over the object as it is now.
pub(crate) async fn import(options: &Options, args: &Args) -> Result<()> {
    let identity = args.identity()?;
    let reconciler = Reconciler::new(open_accessor(options)?);
    let (object, config) = reconciler.import(&args.object_type, &identity).await?;
    println!("{}", serde_json::to_string_pretty(&to_entry(object, config))?);
    Ok(())
}
