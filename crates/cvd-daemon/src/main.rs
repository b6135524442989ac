//! cvd-daemon entry point.
//!
//! Thin: loads config, opens and migrates the store, starts the refresh
//! scheduler, and serves the read API. Route handlers live in `routes.rs`;
//! shared state in `state.rs`.
//!
//! Usage: `cvd-daemon [config.yaml ...]` (later files override earlier ones).

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use cvd_daemon::{routes, state};
use cvd_db::{GenerationStore, PgStore};
use cvd_feeds::{ArcGisSnapshotFeed, GitHubSeriesFeed};
use cvd_runtime::{run_on_interval, Pipeline};
use tokio::sync::broadcast;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let paths: Vec<&str> = args.iter().map(String::as_str).collect();
    let cfg = cvd_config::load_pipeline_config(&paths).context("load config")?;
    let pipeline_cfg = &cfg.pipeline;
    info!(config_hash = %cfg.loaded.config_hash, "config loaded");

    let db_url = pipeline_cfg.resolve_database_url()?;
    let pg = PgStore::open(&db_url, pipeline_cfg.database.max_connections).await?;
    cvd_db::migrate(pg.pool()).await?;
    let store: Arc<dyn GenerationStore> = Arc::new(pg.clone());

    let snapshot = ArcGisSnapshotFeed::new(
        pipeline_cfg.feeds.snapshot_base_url.clone(),
        pipeline_cfg.fetch_timeout(),
    )?;
    let series = GitHubSeriesFeed::new(
        pipeline_cfg.feeds.series_base_url.clone(),
        pipeline_cfg.fetch_timeout(),
    )?;
    let pipeline = Arc::new(Pipeline::new(
        Arc::new(snapshot),
        Arc::new(series),
        Arc::clone(&store),
    ));

    let shared = Arc::new(state::AppState::new(
        store,
        pipeline_cfg.cache_ttl(),
        pipeline_cfg.api.no_province_exceptions.clone(),
    ));
    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(15));

    let (runs_tx, runs_rx) = broadcast::channel(16);
    let forwarder = state::spawn_run_forwarder(Arc::clone(&shared), runs_rx);
    let scheduler = tokio::spawn(run_on_interval(
        pipeline,
        pipeline_cfg.interval(),
        shared.shutdown.subscribe(),
        runs_tx,
    ));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = pipeline_cfg.bind_addr()?;
    info!("cvd-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&shared)))
        .await
        .context("server crashed")?;

    // Let an in-flight run finish (commit or roll back) before closing the pool.
    shared.begin_shutdown();
    scheduler.await.context("scheduler task panicked")?;
    forwarder.await.context("run forwarder task panicked")?;
    pg.close().await;
    info!("cvd-daemon stopped");

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// Resolves on ctrl-c and ends every open SSE stream, so graceful shutdown
/// does not wait on clients that never disconnect.
async fn shutdown_signal(shared: Arc<state::AppState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler failed; shutting down");
    }
    info!("shutdown requested");
    shared.begin_shutdown();
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET])
        .allow_headers(tower_http::cors::Any)
}
