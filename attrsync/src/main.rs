mod config;
mod import;
mod logging;
mod objects;
mod remote;
mod serve;

use std::{future::Future, io::IsTerminal as _, path::PathBuf, process::exit};

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use attrsync_core::{
    accessor::{AccessorError, ObjectPayload, RemoteObjectAccessor},
    model::{ObjectRef, RemoteObject},
};
use attrsync_local::accessor::FileAccessor;
use attrsync_resource::client::RpcAccessor;
use clap::{CommandFactory as _, Parser, Subcommand};

fn main() {
    let args = Args::parse();
    handle_result(run_args(args));
}

fn run_args(args: Args) -> Result<()> {
    match &args.command {
        Commands::GenerateMan => (|| {
            let cmd = Args::command();
            let man = clap_mangen::Man::new(cmd);
            let mut buffer: Vec<u8> = Default::default();
            man.render(&mut buffer)?;
            println!("{}", String::from_utf8(buffer)?);
            Ok(())
        })(),
        Commands::GenerateMarkdown => {
            let opts = clap_markdown::MarkdownOptions::new().show_footer(false);
            let markdown: String = clap_markdown::help_markdown_custom::<Args>(&opts);
            println!("{}", markdown);
            Ok(())
        }
        Commands::GenerateCompletion { shell } => {
            let mut cmd = Args::command();
            clap_complete::generate(*shell, &mut cmd, "attrsync", &mut std::io::stdout());
            Ok(())
        }
        command => {
            let _logger = logging::set_up(logging::Options {
                verbose: args.options.verbose,
                color: args.options.color.unwrap_or_else(|| std::io::stderr().is_terminal()),
            })?;
            run_command(&args.options, command)
        }
    }
}

fn run_command(options: &Options, command: &Commands) -> Result<()> {
    match command {
        Commands::Plan(subargs) => block_on(objects::plan(options, subargs)),
        Commands::Apply(subargs) => block_on(objects::apply(options, subargs)),
        Commands::Read(subargs) => block_on(objects::read(options, subargs)),
        Commands::Import(subargs) => block_on(import::import(options, subargs)),
        Commands::Remote(sub) => remote::run(options, sub),
        Commands::Serve(subargs) => block_on(serve::serve(options, subargs)),
        Commands::GenerateMan | Commands::GenerateMarkdown | Commands::GenerateCompletion { .. } => {
            Ok(())
        }
    }
}

/// Runs `f` to completion on a single-threaded runtime.
fn block_on<F: Future<Output = Result<()>>>(f: F) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Could not start the async runtime")?;
    runtime.block_on(f)
}

/// Where the remote objects live.
enum Store {
    File(FileAccessor),
    Rpc(RpcAccessor),
}

#[async_trait]
impl RemoteObjectAccessor for Store {
    async fn read_attributes(&self, object: &ObjectRef) -> Result<RemoteObject, AccessorError> {
        match self {
            Store::File(accessor) => accessor.read_attributes(object).await,
            Store::Rpc(accessor) => accessor.read_attributes(object).await,
        }
    }

    async fn write_attributes(
        &self,
        object: &ObjectRef,
        payload: &ObjectPayload,
    ) -> Result<(), AccessorError> {
        match self {
            Store::File(accessor) => accessor.write_attributes(object, payload).await,
            Store::Rpc(accessor) => accessor.write_attributes(object, payload).await,
        }
    }
}

/// Opens the remote described by the global options: the server at
/// `--remote` if given, the state file otherwise.
fn open_accessor(options: &Options) -> Result<Store> {
    match &options.remote {
        Some(url) => Ok(Store::Rpc(RpcAccessor::connect(url)?)),
        None => FileAccessor::open(&options.state)
            .map(Store::File)
            .with_context(|| format!("Could not open remote state {}", options.state.display())),
    }
}

fn handle_result(r: Result<()>) {
    match r {
        Ok(()) => {}
        Err(e) => {
            eprintln!("attrsync error: {}, {}", e.root_cause(), e);
            exit(1);
        }
    }
}

/// attrsync: manage the custom fields and tags you declare, and nothing else
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    options: Options,
}

#[derive(Parser, Debug, Clone)]
struct Options {
    #[arg(short, long, global = true, default_value = "false")]
    verbose: bool,

    /// Colorize log output; defaults to whether stderr is a terminal
    #[arg(long, global = true)]
    color: Option<bool>,

    /// The state file that holds the remote objects
    #[arg(
        long,
        global = true,
        env = "ATTRSYNC_STATE",
        default_value = "attrsync-remote.json"
    )]
    state: PathBuf,

    /// URL of an `attrsync serve` endpoint to use instead of the state file
    #[arg(long, global = true, env = "ATTRSYNC_REMOTE", value_name = "URL")]
    remote: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the changes `apply` would make
    Plan(objects::Args),

    /// Write the configured custom fields and tags to the remote objects
    Apply(objects::Args),

    /// Show the owned attributes of the remote objects and any drift
    Read(objects::Args),

    /// Print a configuration that adopts an existing object
    Import(import::Args),

    /// Administer the remote state file
    #[command(subcommand)]
    Remote(remote::Command),

    /// Serve the remote state file over JSON-RPC
    Serve(serve::Args),

    /// Generate markdown documentation for attrsync
    #[command(hide = true)]
    GenerateMarkdown,

    /// Generate a manpage for attrsync
    #[command(hide = true)]
    GenerateMan,

    /// Generate shell completion for attrsync
    #[command(hide = true)]
    GenerateCompletion {
        /// The shell to generate completion for
        #[arg(long)]
        shell: clap_complete::Shell,
    },
}
