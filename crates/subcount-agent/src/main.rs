//! # subcount-agent
//!
//! Live follower/subscriber counter: wires the event session, batching,
//! polling, and display server together and runs until Ctrl-C.

#![deny(unsafe_code)]

mod app;
mod config;
mod router;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use subcount_logging::LogFormat;

use crate::app::{App, RunOptions};

/// Live follower/subscriber counter.
#[derive(Parser, Debug)]
#[command(name = "subcount", about = "Live follower/subscriber counter")]
struct Cli {
    /// Settings file (defaults to `~/.subcount/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Display server host (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Display server port (overrides settings, 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Skip the event socket and keep counters current by polling only.
    #[arg(long)]
    poll_only: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(subcount_settings::settings_path);
    let mut settings = subcount_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    if let Some(host) = args.host {
        settings.broadcast.host = host;
    }
    if let Some(port) = args.port {
        settings.broadcast.port = port;
    }

    let format = if args.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    subcount_logging::init_subscriber(&settings.logging.level, format);

    let token = subcount_settings::access_token_from_env();
    if token.is_none() {
        tracing::warn!(
            "{} is not set, provider calls will fail until it is",
            subcount_settings::ACCESS_TOKEN_ENV
        );
    }
    let auth = Arc::new(config::static_auth(&settings, token));

    let options = RunOptions {
        poll_only: args.poll_only,
    };
    let (app, addr) = App::start(&settings, auth, &options).await?;
    tracing::info!("subcount display endpoint on ws://{addr}/ws");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    app.stop(None).await;
    tracing::info!("Shutdown complete");
    Ok(())
}
