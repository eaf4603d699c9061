use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use optimistic_sync::storage::{decode_records, encode_records};
use optimistic_sync::{
    FilePersistence, OptimisticEntityRecord, RecordCodec, RecordPersistence, ScopeKey,
    build_optimistic_sync_state_by_id,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sync-tool")]
#[command(about = "Inspect and repair persisted optimistic proposal queues")]
struct Cli {
    /// Storage directory holding the queue files
    #[arg(long)]
    dir: PathBuf,

    #[arg(long, value_enum, default_value_t = CodecArg::Json)]
    codec: CodecArg,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum CodecArg {
    Json,
    Msgpack,
}

impl From<CodecArg> for RecordCodec {
    fn from(value: CodecArg) -> Self {
        match value {
            CodecArg::Json => RecordCodec::Json,
            CodecArg::Msgpack => RecordCodec::MessagePack,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// List partitions and their record counts
    List,
    /// Print the records and per-entity status of one partition
    Show {
        #[arg(long)]
        entity_type: String,
        #[arg(long)]
        scope: String,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Drop expired, unconfirmed proposals and rewrite the partition
    PurgeExpired {
        #[arg(long)]
        entity_type: String,
        #[arg(long)]
        scope: String,
        #[arg(long)]
        dry_run: bool,
    },
}

type AnyRecord = OptimisticEntityRecord<serde_json::Value>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let persistence = FilePersistence::new(&cli.dir).with_codec(cli.codec.into());

    match cli.command {
        Command::List => list(&persistence).await,
        Command::Show {
            entity_type,
            scope,
            json,
        } => show(&persistence, &scope_key(entity_type, scope)?, json).await,
        Command::PurgeExpired {
            entity_type,
            scope,
            dry_run,
        } => purge_expired(&persistence, &scope_key(entity_type, scope)?, dry_run).await,
    }
}

fn scope_key(entity_type: String, scope: String) -> Result<ScopeKey> {
    ScopeKey::new(entity_type, scope).context("Invalid partition")
}

async fn load(persistence: &FilePersistence, key: &ScopeKey) -> Result<Vec<AnyRecord>> {
    let raw = persistence
        .load_records(key)
        .await
        .with_context(|| format!("Failed to load '{}'", persistence.queue_path(key).display()))?;
    Ok(decode_records(key, raw))
}

async fn list(persistence: &FilePersistence) -> Result<()> {
    let keys = persistence
        .list_scopes()
        .await
        .with_context(|| format!("Failed to read '{}'", persistence.root_dir().display()))?;
    if keys.is_empty() {
        println!("No queues in {}", persistence.root_dir().display());
        return Ok(());
    }

    for key in keys {
        let records = load(persistence, &key).await?;
        let errors = records
            .iter()
            .filter(|record| record.last_error.is_some())
            .count();
        println!(
            "{:<20} {:<36} {:>5} records {:>5} with errors",
            key.entity_type,
            key.scope_id,
            records.len(),
            errors
        );
    }
    Ok(())
}

async fn show(persistence: &FilePersistence, key: &ScopeKey, json: bool) -> Result<()> {
    let records = load(persistence, key).await?;
    let states = build_optimistic_sync_state_by_id(&records);

    if json {
        let output = serde_json::json!({
            "scope": key,
            "records": records,
            "syncStateById": states,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{} ({} records)", key, records.len());
    for record in &records {
        println!(
            "  {:<44} {:<7} {:<8} {:<24} expires {}{}",
            record.local_id,
            record.operation,
            record.status,
            record.entity_id,
            record.expires_at.to_rfc3339(),
            record
                .last_error
                .as_ref()
                .map(|error| format!("  [{}]", error))
                .unwrap_or_default()
        );
    }
    println!("status by entity:");
    for (entity_id, state) in &states {
        println!("  {:<24} {} {}", entity_id, state.operation, state.status);
    }
    Ok(())
}

async fn purge_expired(persistence: &FilePersistence, key: &ScopeKey, dry_run: bool) -> Result<()> {
    let records = load(persistence, key).await?;
    let now = Utc::now();
    let (expired, kept): (Vec<_>, Vec<_>) = records
        .into_iter()
        .partition(|record| record.should_purge_at(now));

    for record in &expired {
        println!(
            "expired: {} {} {} (expired {})",
            record.local_id,
            record.operation,
            record.entity_id,
            record.expires_at.to_rfc3339()
        );
    }

    if expired.is_empty() {
        println!("nothing to purge ({} records)", kept.len());
        return Ok(());
    }
    if dry_run {
        println!("{} of {} records would be purged", expired.len(), expired.len() + kept.len());
        return Ok(());
    }

    let encoded = encode_records(&kept)?;
    persistence
        .save_records(key, encoded)
        .await
        .with_context(|| format!("Failed to rewrite '{}'", persistence.queue_path(key).display()))?;
    println!("purged {} records, {} kept", expired.len(), kept.len());
    Ok(())
}
