use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

use lectern::{config, db, notify, outbox, routes, AppState};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(args.config.as_path()))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    // Spawn outbox worker (single-threaded)
    let notifier = notify::from_config(&cfg)?;
    tokio::spawn(outbox::run_worker(
        pool.clone(),
        notifier,
        Duration::from_millis(cfg.app.poll_interval_ms),
        cfg.app.max_backoff_seconds as i64,
    ));

    let state = Arc::new(AppState::new(pool, &cfg.payment.key_secret));
    let app = routes::create_router(state);

    let listener = TcpListener::bind(&cfg.app.listen).await?;
    info!(addr = %cfg.app.listen, "lectern listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    Ok(())
}
