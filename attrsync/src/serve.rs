use std::net::SocketAddr;

use anyhow::{Context as _, Result};
use attrsync_resource::framework::run_server;
use tracing::{info, warn};

use crate::{open_accessor, Options};

#[derive(clap::Parser, Debug)]
pub(crate) struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8641")]
    listen: SocketAddr,
}

/// Serves `attributes_read` and `attributes_write` until interrupted.
pub(crate) async fn serve(options: &Options, args: &Args) -> Result<()> {
    let accessor = open_accessor(options)?;
    let (addr, handle) = run_server(accessor, args.listen).await?;
    eprintln!("Listening on http://{}", addr);

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Could not listen for interrupts")?;
            info!("interrupted, shutting down");
            if let Err(e) = handle.stop() {
                warn!("could not stop the server: {}", e);
            }
            handle.stopped().await;
        }
        _ = handle.clone().stopped() => {}
    }
    Ok(())
}
