use std::str::FromStr as _;

use anyhow::{Context as _, Result};
use attrsync_core::{model::ObjectRef, value::FieldKind};
use attrsync_local::store::StateFileStore;
use serde_json::{Map, Value};
use tracing::info;

use crate::{config::parse_object_ref, Options};

#[derive(clap::Subcommand, Debug)]
pub(crate) enum Command {
    /// Create an empty remote state file
    Init,

    /// Define a custom field, optionally limited to some object types
    DefineField {
        name: String,
        #[arg(long = "type", value_parser = parse_kind)]
        kind: FieldKind,
        /// Object types the field applies to; all types when omitted
        #[arg(long = "object-type")]
        object_types: Vec<String>,
    },

    /// Define a tag
    DefineTag {
        slug: String,
        #[arg(long)]
        description: Option<String>,
    },

    /// Create or overwrite an object, ignoring write modes
    Put {
        #[arg(value_parser = parse_object_ref, value_name = "TYPE/ID")]
        object: ObjectRef,
        /// A custom field value as NAME=JSON, e.g. `rack_units=4`
        #[arg(long = "field", value_name = "NAME=JSON", value_parser = parse_field)]
        fields: Vec<(String, Value)>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Print the remote document
    Show,
}

fn parse_kind(s: &str) -> Result<FieldKind, String> {
    FieldKind::from_str(s).map_err(|e| e.to_string())
}

fn parse_field(s: &str) -> Result<(String, Value), String> {
    let (name, json) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=JSON, got '{}'", s))?;
    let value = serde_json::from_str(json)
        .map_err(|e| format!("value of '{}' is not JSON: {}", name, e))?;
    Ok((name.to_string(), value))
}

pub(crate) fn run(options: &Options, command: &Command) -> Result<()> {
    let path = &options.state;
    if let Command::Init = command {
        StateFileStore::init(path)
            .with_context(|| format!("Could not create {}", path.display()))?;
        info!(path = %path.display(), "initialized remote state");
        return Ok(());
    }

    let store = StateFileStore::open(path)
        .with_context(|| format!("Could not open remote state {}", path.display()))?;
    match command {
        Command::Init => Ok(()),
        Command::DefineField {
            name,
            kind,
            object_types,
        } => store.define_field(name, *kind, object_types.clone()),
        Command::DefineTag { slug, description } => store.define_tag(slug, description.clone()),
        Command::Put {
            object,
            fields,
            tags,
        } => {
            let fields: Map<String, Value> = fields.iter().cloned().collect();
            store.put_object(object, fields, tags.clone())
        }
        Command::Show => {
            let document = store.load()?;
            println!("{}", serde_json::to_string_pretty(&document)?);
            Ok(())
        }
    }
}
