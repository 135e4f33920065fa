//! Background export scheduling
//!
//! Polls a head source on a fixed interval and drives the coordinator
//! whenever the exported head advances. A head that fails to fully advance
//! is retried on the next tick; the engine itself never retries.

use super::coordinator::ExportCoordinator;
use super::error::AggregationError;
use super::facts;
use async_trait::async_trait;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tokio::time::{interval, Duration};

/// Where the current exported head comes from. The production source reads
/// the fact table; tests substitute a scripted one.
#[async_trait]
pub trait HeadSource: Send + Sync {
    /// Highest fully exported epoch, or `None` before the first export.
    async fn latest_head(&self) -> Result<Option<u64>, AggregationError>;
}

/// Head source backed by the fact table itself.
pub struct FactTableHeadSource {
    conn: Arc<Mutex<Connection>>,
}

impl FactTableHeadSource {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl HeadSource for FactTableHeadSource {
    async fn latest_head(&self) -> Result<Option<u64>, AggregationError> {
        let guard = self.conn.lock().unwrap();
        facts::latest_fact_epoch(&guard)
    }
}

/// Runs until cancelled. Each tick reads the head; a new head (or one whose
/// previous advance left failures behind) goes through the coordinator.
pub async fn export_scheduler_task(
    coordinator: Arc<ExportCoordinator>,
    head_source: Arc<dyn HeadSource>,
    poll_interval_ms: u64,
) {
    log::info!("⏰ starting export scheduler (interval: {poll_interval_ms}ms)");

    let mut timer = interval(Duration::from_millis(poll_interval_ms));
    let mut completed_head: Option<u64> = None;

    loop {
        timer.tick().await;

        let head = match head_source.latest_head().await {
            Ok(Some(head)) => head,
            Ok(None) => continue,
            Err(e) => {
                log::warn!("⚠️  head source unavailable: {e}");
                continue;
            }
        };

        if completed_head == Some(head) {
            continue;
        }

        let outcome = coordinator.on_head(head).await;
        if outcome.fully_advanced() {
            completed_head = Some(head);
        } else {
            for (table, error) in &outcome.failed {
                log::error!("❌ {table} stuck at head {head}: {error}");
            }
        }
    }
}
