#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]

//! `ss-admin` - maintenance utilities for Slidecast state and storage.
//!
//! Exit codes: `0` on success, `1` when the target was not found, `2` on
//! operational failure.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use uuid::Uuid;

use slidecast_config::AppConfig;
use slidecast_core::TaskType;
use slidecast_state::{KeyValue, RedisKv, StateRef, StateStore};
use slidecast_storage::{backfill_legacy_objects, provider_from_config, BackfillTarget};

#[derive(Parser)]
#[command(name = "ss-admin", about = "Slidecast admin CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Remove legacy file-scoped state records that have a task binding.
    PurgeLegacyFileStates,
    /// Set the task type and output flags for one task's state.
    SetType(SetTypeArgs),
    /// Copy legacy flat storage objects onto the canonical key layout.
    BackfillStorage(BackfillArgs),
}

#[derive(Args)]
struct SetTypeArgs {
    /// Target task id.
    #[arg(long)]
    task_id: Uuid,
    /// Explicit task type label.
    #[arg(long, value_parser = ["video", "podcast", "both"])]
    task_type: Option<String>,
    /// Enable video output.
    #[arg(long, overrides_with = "no_generate_video")]
    generate_video: bool,
    /// Disable video output.
    #[arg(long)]
    no_generate_video: bool,
    /// Enable podcast output.
    #[arg(long, overrides_with = "no_generate_podcast")]
    generate_podcast: bool,
    /// Disable podcast output.
    #[arg(long)]
    no_generate_podcast: bool,
}

impl SetTypeArgs {
    fn video_flag(&self) -> Option<bool> {
        flag_value(self.generate_video, self.no_generate_video)
    }

    fn podcast_flag(&self) -> Option<bool> {
        flag_value(self.generate_podcast, self.no_generate_podcast)
    }
}

const fn flag_value(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (false, true) => Some(false),
        (false, false) => None,
    }
}

#[derive(Args)]
struct BackfillArgs {
    /// Delete the legacy object after a successful copy.
    #[arg(long)]
    delete_legacy: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = AppConfig::from_env().context("failed to load configuration")?;
    let kv: Arc<dyn KeyValue> = Arc::new(
        RedisKv::connect(&config.redis.url())
            .await
            .context("failed to connect to redis")?,
    );
    let store = StateStore::new(kv.clone());

    match cli.command {
        Command::PurgeLegacyFileStates => {
            let report = store
                .purge_legacy_file_states()
                .await
                .context("legacy state purge failed")?;
            println!(
                "{}",
                json!({ "checked": report.checked, "removed": report.removed })
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::SetType(args) => set_type(&store, &args).await,
        Command::BackfillStorage(args) => backfill(&config, &kv, &args).await,
    }
}

async fn set_type(store: &StateStore, args: &SetTypeArgs) -> Result<ExitCode> {
    let target = StateRef::Task(args.task_id);
    let Some(mut state) = store.load(target).await.context("state lookup failed")? else {
        println!("{}", json!({ "updated": false, "error": "state_not_found" }));
        return Ok(ExitCode::FAILURE);
    };

    if let Some(label) = &args.task_type {
        state.task_type = match label.as_str() {
            "podcast" => TaskType::Podcast,
            "both" => TaskType::Both,
            _ => TaskType::Video,
        };
    }
    if let Some(video) = args.video_flag() {
        state.knobs.generate_video = video;
    }
    if let Some(podcast) = args.podcast_flag() {
        state.knobs.generate_podcast = podcast;
    }
    state.task_id = Some(args.task_id);
    store.save_state(&state).await.context("state save failed")?;

    println!(
        "{}",
        json!({ "updated": true, "task_id": args.task_id.to_string() })
    );
    Ok(ExitCode::SUCCESS)
}

/// Walk the state keyspace for known task/file identifiers and migrate
/// their legacy flat objects to the canonical layout.
async fn backfill(
    config: &AppConfig,
    kv: &Arc<dyn KeyValue>,
    args: &BackfillArgs,
) -> Result<ExitCode> {
    tracing::info!(provider = config.storage_provider.scheme(), "starting storage backfill");
    let storage = provider_from_config(config)
        .await
        .context("failed to construct storage provider")?;

    let locales: Vec<String> = ["en", "zh", "ja", "ko", "es", "fr", "de"]
        .iter()
        .map(|locale| (*locale).to_string())
        .collect();
    let mut targets = Vec::new();
    for key in kv
        .scan_prefix("ss:state:")
        .await
        .context("state keyspace scan failed")?
    {
        let base_id = key
            .trim_start_matches("ss:state:task:")
            .trim_start_matches("ss:state:")
            .to_string();
        if base_id.is_empty() {
            continue;
        }
        targets.push(BackfillTarget {
            base_id,
            locales: locales.clone(),
        });
    }

    let report = backfill_legacy_objects(storage.as_ref(), &targets, args.delete_legacy)
        .await
        .context("storage backfill failed")?;
    println!(
        "{}",
        json!({
            "targets": targets.len(),
            "migrated": report.migrated.len(),
            "skipped": report.skipped,
            "deleted": report.deleted,
        })
    );
    Ok(ExitCode::SUCCESS)
}
