//! objcache CLI - inspect and manipulate a cache namespace from the shell.
//!
//! Opens one namespace under a storage root, runs a single command against
//! it, and flushes the metadata snapshot before exiting.

mod commands;

use anyhow::Result;
use clap::Parser;
use commands::Command;
use objcache::{CacheDefaults, CacheEngine, EngineOptions, FixedStorageRoot, SystemTempRoot};
use std::path::PathBuf;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "objcache")]
#[command(about = "Disk-backed object cache")]
struct Args {
    /// Storage root directory (defaults to the platform cache directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Cache namespace
    #[arg(short, long, global = true, default_value = CacheDefaults::NAMESPACE_ID)]
    namespace: String,

    /// Evict expired entries before every read
    #[arg(long, global = true)]
    evict_on_read: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries command output.
    let log_level = if args.debug { Level::DEBUG } else { Level::WARN };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let options = EngineOptions::new(&args.namespace).evict_on_read(args.evict_on_read);
    let cache = match &args.root {
        Some(root) => CacheEngine::open(options, &FixedStorageRoot::new(root)).await?,
        None => CacheEngine::open(options, &SystemTempRoot::default()).await?,
    };
    debug!("Using {:?}", cache);

    let mut stdout = std::io::stdout().lock();
    let outcome = commands::run(&cache, args.command, &mut stdout).await;

    cache.flush().await?;
    outcome
}
