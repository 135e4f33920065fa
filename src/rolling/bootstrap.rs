//! Bootstrap strategies backed by the coarse bucket tables
//!
//! A window that is empty or too far behind is rebuilt wholesale from the
//! next-finer aggregate: the day table for the 7d/31d/90d windows, the hour
//! table for the 24h window. The rebuild covers the largest run of complete
//! buckets ending at or before the exported head; every row gets the same
//! global bounds.

use super::aggregator::BootstrapStrategy;
use super::columns;
use super::error::AggregationError;
use super::store;
use super::types::{EpochBounds, NetworkSpec};
use rusqlite::{params, Connection};

/// Rebuilds a window from `source_table`, whose rows are bucketed by
/// `bucket_column` with `bucket_width` epochs per bucket. `bounds` must be
/// bucket-aligned on both ends.
fn rebuild_from_buckets(
    conn: &Connection,
    source_table: &str,
    bucket_column: &str,
    bucket_width: u64,
    window_table: &str,
    bounds: EpochBounds,
) -> Result<(), AggregationError> {
    store::truncate(conn, window_table)?;
    if bounds.epoch_end <= bounds.epoch_start {
        // no complete bucket yet; the window grows incrementally instead
        return Ok(());
    }

    let first_bucket = bounds.epoch_start / bucket_width;
    let end_bucket = bounds.epoch_end / bucket_width;
    let expected = end_bucket - first_bucket;

    // a bucket gap would silently drop epochs from the rebuilt window
    let covered: i64 = conn
        .query_row(
            &format!(
                "SELECT COUNT(DISTINCT {bucket_column}) FROM {source_table}
                 WHERE {bucket_column} >= ?1 AND {bucket_column} < ?2"
            ),
            params![first_bucket as i64, end_bucket as i64],
            |row| row.get(0),
        )
        .map_err(|e| AggregationError::from_storage(e, window_table))?;
    if covered as u64 != expected {
        return Err(AggregationError::BootstrapFailed {
            table: window_table.to_string(),
            covered: covered as u64,
            expected,
        });
    }

    let sql = format!(
        "INSERT INTO {window_table} (
            epoch_start,
            epoch_end,
            validator_index,
            {metric_columns},
            balance_start,
            balance_end
        )
        SELECT
            ?3 AS epoch_start,
            ?4 AS epoch_end,
            agg.validator_index AS validator_index,
            {metric_values},
            first_rows.balance_start AS balance_start,
            last_rows.balance_end AS balance_end
        FROM (
            SELECT
            validator_index,
            {aggregate_select},
            MIN({bucket_column}) AS first_idx,
            MAX({bucket_column}) AS last_idx
            FROM {source_table}
            WHERE {bucket_column} >= ?1 AND {bucket_column} < ?2
            GROUP BY validator_index
        ) agg
        LEFT JOIN {source_table} first_rows
            ON first_rows.validator_index = agg.validator_index
            AND first_rows.{bucket_column} = agg.first_idx
        LEFT JOIN {source_table} last_rows
            ON last_rows.validator_index = agg.validator_index
            AND last_rows.{bucket_column} = agg.last_idx",
        metric_columns = columns::metric_column_list(),
        metric_values = columns::metric_value_list("agg"),
        aggregate_select = columns::aggregate_select_list(),
    );

    let inserted = conn
        .execute(
            &sql,
            params![
                first_bucket as i64,
                end_bucket as i64,
                bounds.epoch_start as i64,
                bounds.epoch_end as i64,
            ],
        )
        .map_err(|e| AggregationError::from_storage(e, window_table))?;
    log::info!(
        "🔁 rebuilt {window_table} from {source_table}: {} - {} ({inserted} validators)",
        bounds.epoch_start,
        bounds.epoch_end
    );
    Ok(())
}

/// Bootstrap for the day-table-backed windows (7d, 31d, 90d).
pub struct DayTableBootstrap {
    network: NetworkSpec,
}

impl DayTableBootstrap {
    pub fn new(network: NetworkSpec) -> Self {
        Self { network }
    }
}

impl BootstrapStrategy for DayTableBootstrap {
    fn bootstrap(
        &self,
        conn: &Connection,
        days: u64,
        table: &str,
    ) -> Result<(), AggregationError> {
        let epd = self.network.epochs_per_day;
        // highest epoch the day table has absorbed, aligned down to the last
        // complete day (a partial trailing bucket never reaches the boundary)
        let progress = store::progress_epoch(conn, "validator_day_agg")?;
        let epoch_end = progress / epd * epd;
        let epoch_start = epoch_end.saturating_sub(days * epd);
        rebuild_from_buckets(
            conn,
            "validator_day_agg",
            "day",
            epd,
            table,
            EpochBounds {
                epoch_start,
                epoch_end,
            },
        )
    }

    fn bootstrap_on_epochs_behind(&self) -> u64 {
        // one day bucket: beyond that, replaying days beats replaying epochs
        self.network.epochs_per_day
    }

    fn bootstrap_bounds(&self, head: u64, days: u64) -> EpochBounds {
        let epd = self.network.epochs_per_day;
        let epoch_end = (head + 1) / epd * epd;
        EpochBounds {
            epoch_start: epoch_end.saturating_sub(days * epd),
            epoch_end,
        }
    }
}

/// Bootstrap for the 24h window, backed by the hour table.
pub struct HourTableBootstrap {
    network: NetworkSpec,
}

impl HourTableBootstrap {
    pub fn new(network: NetworkSpec) -> Self {
        Self { network }
    }
}

impl BootstrapStrategy for HourTableBootstrap {
    fn bootstrap(
        &self,
        conn: &Connection,
        days: u64,
        table: &str,
    ) -> Result<(), AggregationError> {
        let width = self.network.hour_bucket_width();
        let progress = store::progress_epoch(conn, "validator_hour_agg")?;
        let epoch_end = progress / width * width;
        let epoch_start = epoch_end.saturating_sub(self.network.window_epochs(days));
        rebuild_from_buckets(
            conn,
            "validator_hour_agg",
            "hour",
            width,
            table,
            EpochBounds {
                epoch_start,
                epoch_end,
            },
        )
    }

    fn bootstrap_on_epochs_behind(&self) -> u64 {
        self.network.hour_bucket_width()
    }

    fn bootstrap_bounds(&self, head: u64, days: u64) -> EpochBounds {
        let width = self.network.hour_bucket_width();
        let epoch_end = (head + 1) / width * width;
        EpochBounds {
            epoch_start: epoch_end.saturating_sub(self.network.window_epochs(days)),
            epoch_end,
        }
    }
}
