//! Subcommands and their execution against an open cache.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use clap::Subcommand;
use objcache::{CacheEngine, CacheEntryMetadata};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncReadExt;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Store a file (or stdin with `-`) under an id
    Put {
        id: String,
        input: PathBuf,
        /// Expire after this many seconds
        #[arg(long)]
        ttl_secs: Option<u64>,
    },
    /// Print the content stored under an id
    Get {
        id: String,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Remove an id
    Rm { id: String },
    /// List cached entries
    Ls {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Remove every entry in the namespace
    Clear,
    /// Remove expired entries
    Evict,
}

#[derive(Debug, Serialize)]
struct ListedEntry {
    id: String,
    created: String,
    expires: Option<String>,
    expired: bool,
}

impl ListedEntry {
    fn new(entry: &CacheEntryMetadata, now: DateTime<Utc>) -> Self {
        Self {
            id: entry.id.clone(),
            created: entry.created.to_rfc3339_opts(SecondsFormat::Millis, true),
            expires: entry
                .expires
                .map(|e| e.to_rfc3339_opts(SecondsFormat::Millis, true)),
            expired: entry.is_expired_at(now),
        }
    }
}

async fn read_input(input: &PathBuf) -> Result<Vec<u8>> {
    if input.as_os_str() == "-" {
        let mut buf = Vec::new();
        tokio::io::stdin()
            .read_to_end(&mut buf)
            .await
            .context("Failed to read stdin")?;
        Ok(buf)
    } else {
        tokio::fs::read(input)
            .await
            .with_context(|| format!("Failed to read {}", input.display()))
    }
}

/// Execute `command`, writing any user-facing output to `out`.
pub async fn run<W: Write>(cache: &CacheEngine, command: Command, out: &mut W) -> Result<()> {
    match command {
        Command::Put {
            id,
            input,
            ttl_secs,
        } => {
            let data = read_input(&input).await?;
            cache
                .write_bytes(&id, &data, ttl_secs.map(Duration::from_secs))
                .await?;
            if !cache.contains(&id).await {
                bail!("Failed to store {id}; see log output");
            }
        }
        Command::Get { id, out: path } => {
            let Some(object) = cache.get(&id).await else {
                bail!("Cache miss: {id}");
            };
            match path {
                Some(path) => tokio::fs::write(&path, &object.bytes)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?,
                None => out.write_all(&object.bytes)?,
            }
        }
        Command::Rm { id } => cache.remove(&id).await,
        Command::Ls { json } => {
            let now = Utc::now();
            let mut entries = cache.entries().await;
            entries.sort_by(|a, b| a.id.cmp(&b.id));
            let listed: Vec<ListedEntry> =
                entries.iter().map(|e| ListedEntry::new(e, now)).collect();

            if json {
                serde_json::to_writer_pretty(&mut *out, &listed)?;
                writeln!(out)?;
            } else {
                for entry in &listed {
                    writeln!(
                        out,
                        "{}\t{}\t{}{}",
                        entry.id,
                        entry.created,
                        entry.expires.as_deref().unwrap_or("never"),
                        if entry.expired { "\texpired" } else { "" }
                    )?;
                }
            }
        }
        Command::Clear => cache.clear().await,
        Command::Evict => {
            let removed = cache.evict_expired_objects().await;
            writeln!(out, "evicted {removed}")?;
        }
    }
    Ok(())
}
