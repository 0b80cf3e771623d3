//! Dependency wiring and process lifecycle.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{info, warn};

use slidecast_api::{build_router, ApiState};
use slidecast_config::AppConfig;
use slidecast_data::TaskRepository;
use slidecast_pipeline::{stub_engines, Coordinator, PipelineContext};
use slidecast_queue::TaskQueue;
use slidecast_state::{KeyValue, MemoryKv, RedisKv, SessionStore, StateStore};
use slidecast_storage::provider_from_config;
use slidecast_worker::Worker;

/// Build every shared dependency, start the worker pool and the API server,
/// and run until interrupted.
pub(crate) async fn run() -> Result<()> {
    let config = AppConfig::from_env().context("failed to load configuration")?;
    info!(
        storage = config.storage_provider.scheme(),
        standalone = config.standalone,
        workers = config.worker_count,
        "starting slidecast"
    );

    let kv: Arc<dyn KeyValue> = if config.standalone {
        Arc::new(MemoryKv::new())
    } else {
        Arc::new(
            RedisKv::connect(&config.redis.url())
                .await
                .context("failed to connect to redis")?,
        )
    };
    let state = StateStore::new(kv.clone());
    let sessions = SessionStore::new(kv.clone());
    let queue = TaskQueue::new(kv.clone());
    let storage = provider_from_config(&config)
        .await
        .context("failed to construct storage provider")?;

    let repo = match (&config.database_url, config.standalone) {
        (Some(url), false) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(8)
                .connect(url)
                .await
                .context("failed to connect to postgres")?;
            Some(
                TaskRepository::new(pool)
                    .await
                    .context("failed to initialise task repository")?
                    .with_cache(kv.clone()),
            )
        }
        _ => {
            warn!("no database configured; listings and ownership fall back to queue records");
            None
        }
    };

    // External provider clients plug in behind the engine traits; until they
    // are wired, the deterministic stubs keep the pipeline runnable.
    let engines = stub_engines();
    if !config.standalone {
        warn!("engine providers not configured; running with stub engines");
    }

    let pipeline_ctx = PipelineContext {
        state: state.clone(),
        queue: queue.clone(),
        storage: storage.clone(),
        engines,
        output_dir: config.output_dir.clone(),
        plan_options: plan_options_from(&config),
    };
    let coordinator = Coordinator::new(pipeline_ctx);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut worker_handles = Vec::with_capacity(config.worker_count);
    for index in 0..config.worker_count {
        let mut worker = Worker::new(queue.clone(), coordinator.clone());
        if let Some(repo) = repo.clone() {
            worker = worker.with_repository(repo);
        }
        let rx = shutdown_rx.clone();
        worker_handles.push(tokio::spawn(async move {
            if let Err(error) = worker.run(rx).await {
                warn!(worker = index, error = %error, "worker loop terminated with error");
            }
        }));
    }

    let api_state = ApiState {
        repo,
        state,
        sessions,
        queue,
        storage,
        uploads_dir: config.uploads_dir.clone(),
        output_dir: config.output_dir.clone(),
        proxy_cloud_media: config.proxy_cloud_media,
        plan_options: plan_options_from(&config),
    };
    let router = build_router(api_state);

    let listener = tokio::net::TcpListener::bind(config.api_bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.api_bind_addr))?;
    info!(addr = %config.api_bind_addr, "api listening");

    let shutdown_signal = async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
    };
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("api server terminated unexpectedly")?;

    let _ = shutdown_tx.send(true);
    for handle in worker_handles {
        let _ = handle.await;
    }
    info!("slidecast stopped");
    Ok(())
}

fn plan_options_from(config: &AppConfig) -> slidecast_core::PlanOptions {
    slidecast_core::PlanOptions {
        visual_analysis_enabled: config.enable_visual_analysis,
    }
}
