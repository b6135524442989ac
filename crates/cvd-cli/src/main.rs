use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use cvd_config::EffectiveConfig;
use cvd_db::{GenerationStore, PgStore};
use cvd_feeds::{ArcGisSnapshotFeed, GitHubSeriesFeed};
use cvd_runtime::{Pipeline, RunOutcome};

#[derive(Parser)]
#[command(name = "cvd")]
#[command(about = "Case-data refresh pipeline CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands (URL from CVD_DATABASE_URL)
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Run the pipeline once: fetch, reconcile, validate, publish
    Refresh {
        /// Layered config paths in merge order
        #[arg(long = "config")]
        config_paths: Vec<String>,
    },

    /// Compute the effective config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> local...)
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations.
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = cvd_db::connect_from_env(cvd_db::ENV_DB_URL, 2).await?;
            match cmd {
                DbCmd::Status => {
                    let s = cvd_db::status(&pool).await?;
                    println!(
                        "db_ok={} has_totals_table={} has_locations_table={}",
                        s.ok, s.has_totals_table, s.has_locations_table
                    );
                }
                DbCmd::Migrate => {
                    cvd_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
            pool.close().await;
        }

        Commands::Refresh { config_paths } => {
            let cfg = load_config(&config_paths)?;
            refresh(&cfg).await?;
        }

        Commands::ConfigHash { paths } => {
            let cfg = load_config(&paths)?;
            println!("config_hash={}", cfg.loaded.config_hash);
            println!("{}", cfg.loaded.canonical_json);
        }
    }

    Ok(())
}

fn load_config(paths: &[String]) -> Result<EffectiveConfig> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    cvd_config::load_pipeline_config(&path_refs)
}

async fn refresh(cfg: &EffectiveConfig) -> Result<()> {
    let p = &cfg.pipeline;
    let db_url = p.resolve_database_url()?;
    let pg = PgStore::open(&db_url, p.database.max_connections).await?;
    let store: Arc<dyn GenerationStore> = Arc::new(pg.clone());

    let snapshot = ArcGisSnapshotFeed::new(p.feeds.snapshot_base_url.clone(), p.fetch_timeout())?;
    let series = GitHubSeriesFeed::new(p.feeds.series_base_url.clone(), p.fetch_timeout())?;
    let pipeline = Pipeline::new(Arc::new(snapshot), Arc::new(series), store);

    let result = pipeline.run_once(Utc::now()).await;
    pg.close().await;

    match result.context("refresh failed")? {
        RunOutcome::Published(s) => {
            println!("outcome=published");
            println!("locations_written={}", s.locations_written);
            println!("generated_at={}", s.generated_at.to_rfc3339());
        }
        RunOutcome::Rejected { reasons } => {
            println!("outcome=rejected");
            for r in reasons {
                println!("reason={r}");
            }
        }
    }
    Ok(())
}

/// Diagnostics go to stderr so stdout stays parseable.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
