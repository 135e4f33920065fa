//! Rolling exporter runtime
//!
//! Opens the exporter database, applies schema migrations and runs the
//! background scheduler: every poll interval the exported head is read from
//! the fact table and all aggregate tables are advanced to it.
//!
//! Usage:
//!   cargo run --release --bin rolling_exporter
//!
//! Environment variables:
//!   STAKEFLOW_DB_PATH      - SQLite database path
//!   ENABLE_ROLLING_EXPORTER - master switch (default: false)
//!   EPOCHS_PER_DAY         - network epoch geometry (default: 225)
//!   HEAD_POLL_INTERVAL_MS  - scheduler tick (default: 60000)

use dotenv::dotenv;
use log::info;
use stakeflow::config::ExporterConfig;
use stakeflow::db::{open_connection, run_schema_migrations};
use stakeflow::rolling::{
    export_scheduler_task, ExportCoordinator, FactTableHeadSource, NetworkSpec,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::init();

    info!("🚀 Stakeflow rolling exporter");

    let config = ExporterConfig::from_env();
    if !config.enabled {
        info!("⚠️  exporter is DISABLED (set ENABLE_ROLLING_EXPORTER=true to activate)");
        return Ok(());
    }

    info!("📊 Configuration:");
    info!("   ├─ database: {}", config.db_path);
    info!("   ├─ epochs per day: {}", config.epochs_per_day);
    info!("   ├─ poll interval: {}ms", config.poll_interval_ms);
    info!(
        "   └─ retention: {} day / {} hour buckets",
        config.day_bucket_retention, config.hour_bucket_retention
    );

    let mut conn = open_connection(&config.db_path)?;
    run_schema_migrations(&mut conn, &config.schema_dir)?;
    let conn = Arc::new(Mutex::new(conn));

    let network = NetworkSpec::new(config.epochs_per_day);
    let mut coordinator = ExportCoordinator::new(conn.clone(), network)
        .with_retention(config.day_bucket_retention, config.hour_bucket_retention);
    if let Some(path) = &config.status_path {
        coordinator = coordinator.with_status_path(PathBuf::from(path));
    }
    let coordinator = Arc::new(coordinator);
    let head_source = Arc::new(FactTableHeadSource::new(conn));

    info!("✅ exporter configured, entering scheduler loop");
    tokio::select! {
        _ = export_scheduler_task(coordinator, head_source, config.poll_interval_ms) => {
            info!("scheduler exited");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("👋 shutdown requested");
        }
    }

    Ok(())
}
