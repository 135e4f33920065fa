//! Export coordination across all aggregate tables
//!
//! One coordinator owns the database connection and drives every maintained
//! table whenever the exported head advances: coarse hour/day buckets first
//! (the window bootstraps read them), then each rolling window, then the
//! total. Each table advances in its own transaction and a failing table is
//! recorded and skipped, so one stuck window does not starve the others.

use super::aggregator::RollingAggregator;
use super::bootstrap::{DayTableBootstrap, HourTableBootstrap};
use super::buckets::{self, BucketSpec};
use super::error::AggregationError;
use super::status;
use super::total;
use super::types::{NetworkSpec, WindowKind};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Day buckets to retain: the 90d bootstrap plus slack.
const DEFAULT_DAY_BUCKET_RETENTION: u64 = 92;
/// Hour buckets to retain: the 24h bootstrap plus slack.
const DEFAULT_HOUR_BUCKET_RETENTION: u64 = 26;

/// What one head advance did: which tables moved and which failed with what.
#[derive(Debug)]
pub struct AdvanceOutcome {
    pub head: u64,
    pub advanced: Vec<&'static str>,
    pub failed: Vec<(&'static str, AggregationError)>,
}

impl AdvanceOutcome {
    pub fn fully_advanced(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct ExportCoordinator {
    conn: Arc<Mutex<Connection>>,
    network: NetworkSpec,
    keep_day_buckets: u64,
    keep_hour_buckets: u64,
    status_path: Option<PathBuf>,
}

impl ExportCoordinator {
    pub fn new(conn: Arc<Mutex<Connection>>, network: NetworkSpec) -> Self {
        Self {
            conn,
            network,
            keep_day_buckets: DEFAULT_DAY_BUCKET_RETENTION,
            keep_hour_buckets: DEFAULT_HOUR_BUCKET_RETENTION,
            status_path: None,
        }
    }

    pub fn with_retention(mut self, day_buckets: u64, hour_buckets: u64) -> Self {
        self.keep_day_buckets = day_buckets;
        self.keep_hour_buckets = hour_buckets;
        self
    }

    pub fn with_status_path(mut self, path: PathBuf) -> Self {
        self.status_path = Some(path);
        self
    }

    fn aggregator_for(&self, kind: WindowKind) -> RollingAggregator {
        match kind {
            WindowKind::Hours24 => RollingAggregator::new(
                self.network,
                Box::new(HourTableBootstrap::new(self.network)),
            ),
            _ => RollingAggregator::new(
                self.network,
                Box::new(DayTableBootstrap::new(self.network)),
            ),
        }
    }

    /// Advances every maintained table to `head`, the highest exported
    /// epoch. Never gives up early: failures are collected per table.
    pub async fn on_head(&self, head: u64) -> AdvanceOutcome {
        let mut guard = self.conn.lock().unwrap();
        let conn = &mut *guard;
        let mut outcome = AdvanceOutcome {
            head,
            advanced: Vec::new(),
            failed: Vec::new(),
        };

        let hour_spec = BucketSpec::hour(self.network);
        let day_spec = BucketSpec::day(self.network);

        // coarse tables first: a window bootstrap in this same pass must see
        // buckets reaching the head
        for spec in [&hour_spec, &day_spec] {
            match buckets::aggregate_to_head(conn, spec, head) {
                Ok(()) => outcome.advanced.push(spec.table),
                Err(e) => {
                    log::error!("❌ {} failed to reach epoch {head}: {e}", spec.table);
                    outcome.failed.push((spec.table, e));
                }
            }
        }

        for kind in WindowKind::rolling() {
            let days = match kind.days() {
                Some(days) => days,
                None => continue,
            };
            let table = kind.table_name();
            match self
                .aggregator_for(kind)
                .aggregate(conn, days, table, head)
            {
                Ok(()) => outcome.advanced.push(table),
                Err(e) => {
                    log::error!("❌ rolling {} failed at epoch {head}: {e}", kind.as_str());
                    outcome.failed.push((table, e));
                }
            }
        }

        match total::aggregate_to_head(conn, head) {
            Ok(()) => outcome.advanced.push(total::TOTAL_TABLE),
            Err(e) => {
                log::error!("❌ total aggregate failed at epoch {head}: {e}");
                outcome.failed.push((total::TOTAL_TABLE, e));
            }
        }

        // retention and the status snapshot are best effort
        if let Err(e) = buckets::prune(conn, &hour_spec, self.keep_hour_buckets) {
            log::warn!("⚠️  pruning {} failed: {e}", hour_spec.table);
        }
        if let Err(e) = buckets::prune(conn, &day_spec, self.keep_day_buckets) {
            log::warn!("⚠️  pruning {} failed: {e}", day_spec.table);
        }
        if let Some(path) = &self.status_path {
            if let Err(e) =
                status::collect(conn, head).and_then(|s| status::write_snapshot(&s, path))
            {
                log::warn!("⚠️  status snapshot failed: {e}");
            }
        }

        log::info!(
            "✅ head {head}: {} tables advanced, {} failed",
            outcome.advanced.len(),
            outcome.failed.len()
        );
        outcome
    }

    /// Tail epochs the next advance of `kind` to `intended_head` would
    /// need, filtered to those missing from the fact store, so upstream can
    /// backfill before the advance is attempted. The total table has no
    /// tail.
    pub async fn missing_tail_epochs(
        &self,
        kind: WindowKind,
        intended_head: u64,
    ) -> Result<Vec<u64>, AggregationError> {
        let guard = self.conn.lock().unwrap();
        match kind.days() {
            Some(days) => self.aggregator_for(kind).missing_tail_epochs(
                &guard,
                days,
                kind.table_name(),
                intended_head,
            ),
            None => Ok(Vec::new()),
        }
    }
}
