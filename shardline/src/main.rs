//! Shardline client binary.
//!
//! Connects the configured shards, logs every event and stops on Ctrl-C.
//!
//! ```bash
//! shardline --config shardline.toml
//! shardline --token "$BOT_TOKEN" --shards 2 --log-level debug
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;

use clap::Parser;
use shardline::events::{Envelope, EventFilter, EventKind, ListenerError};
use shardline::{Client, ClientConfig};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Sharded gateway client.
#[derive(Parser, Debug)]
#[command(name = "shardline")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bot token; overrides the configuration file.
    #[arg(long)]
    token: Option<String>,

    /// Total shard count; overrides the configuration file. 0 runs a single
    /// shard.
    #[arg(long)]
    shards: Option<u32>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &args.config {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::default(),
    };
    if let Some(token) = args.token {
        config.token = token;
    }
    if let Some(shards) = args.shards {
        config.gateway.shards = shards;
    }

    let client = Client::new(config)?;
    client.subscribe(
        EventFilter::all(),
        |event: &Envelope| -> Result<(), ListenerError> {
            match event.kind() {
                EventKind::Unknown => {}
                kind => info!(
                    shard = event.shard,
                    seq = ?event.seq,
                    kind = %kind,
                    guild_id = ?event.event.guild_id().map(|g| g.get()),
                    "Event"
                ),
            }
            Ok(())
        },
    );
    client.start()?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Interrupted, shutting down");
        }
        Some(err) = client.shards().next_fatal_error() => {
            error!(error = %err, "Shard rejected by the gateway, shutting down");
        }
    }

    client.stop().await;
    Ok(())
}
