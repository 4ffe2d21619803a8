use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

use lectern::{config, db, enrollment};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Repair enrollments missing for completed purchases and report unbacked ones"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Exit with a non-zero status when unbacked enrollments are found
    #[arg(long)]
    strict: bool,
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

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let report = enrollment::reconcile(&pool).await?;
    info!(
        repaired = report.repaired,
        unbacked = report.unbacked,
        "reconciliation finished"
    );

    if args.strict && report.unbacked > 0 {
        warn!("unbacked enrollments present");
        std::process::exit(2);
    }
    Ok(())
}
