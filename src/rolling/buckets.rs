//! Day and hour bucket aggregation
//!
//! The bucket tables are coarser materializations of the fact rows: one row
//! per validator per bucket, advanced through the same additive upsert as
//! the rolling windows with the partition column set. They exist to feed
//! the window bootstraps, so retention only has to cover the deepest
//! bootstrap consumer.

use super::custom::{add_to_rolling_custom, CustomRolling};
use super::error::AggregationError;
use super::facts::{self, FACTS_TABLE};
use super::store;
use super::types::NetworkSpec;
use rusqlite::{params, Connection};

/// Geometry of one bucket table.
#[derive(Debug, Clone, Copy)]
pub struct BucketSpec {
    pub table: &'static str,
    pub column: &'static str,
    /// Epochs per bucket.
    pub width: u64,
}

impl BucketSpec {
    pub fn day(network: NetworkSpec) -> Self {
        Self {
            table: "validator_day_agg",
            column: "day",
            width: network.epochs_per_day,
        }
    }

    pub fn hour(network: NetworkSpec) -> Self {
        Self {
            table: "validator_hour_agg",
            column: "hour",
            width: network.hour_bucket_width(),
        }
    }
}

/// Absorbs every epoch in `(progress, head]` into the bucket table, one
/// upsert per touched bucket, in a single transaction. Safe to re-run for
/// the same head.
pub fn aggregate_to_head(
    conn: &mut Connection,
    spec: &BucketSpec,
    head: u64,
) -> Result<(), AggregationError> {
    let tx = conn
        .transaction()
        .map_err(|e| AggregationError::from_storage(e, spec.table))?;

    // exclusive epoch up to which the table is already aggregated
    let progress = store::progress_epoch(&tx, spec.table)?;
    if progress > head {
        return Ok(());
    }

    let missing = facts::missing_epochs_between(&tx, progress as i64, head as i64)?;
    if !missing.is_empty() {
        return Err(AggregationError::MissingEpochs {
            table: spec.table.to_string(),
            section: "head",
            epochs: missing,
        });
    }

    let conflict = format!("(validator_index, {})", spec.column);
    for bucket in (progress / spec.width)..=(head / spec.width) {
        let bucket_start = bucket * spec.width;
        let lo = progress.max(bucket_start);
        let hi = head.min(bucket_start + spec.width - 1);
        if lo > hi {
            continue;
        }

        let (balance_cte, balance_join, balance_column) = balance_start_snippets(lo);
        add_to_rolling_custom(
            &tx,
            CustomRolling {
                start_epoch: lo,
                end_epoch: hi,
                start_bound_epoch: bucket_start,
                table_from: FACTS_TABLE,
                table_to: spec.table,
                table_from_epoch_column: "epoch",
                table_conflict: &conflict,
                tail_balances_query: balance_cte,
                tail_balances_join_query: balance_join,
                tail_balances_insert_column_query: balance_column,
                table_day_column: format!("{},", spec.column),
                table_day_value: format!("{bucket} AS {},", spec.column),
            },
        )?;
    }

    tx.commit()
        .map_err(|e| AggregationError::from_storage(e, spec.table))?;
    Ok(())
}

/// Snippets wiring the inserted `balance_start` to the closing balance of
/// the epoch before the first aggregated one. At genesis there is no such
/// epoch and the default null column applies.
fn balance_start_snippets(lo: u64) -> (String, String, String) {
    if lo == 0 {
        return (String::new(), String::new(), String::new());
    }
    (
        format!(
            "tail_balance_starts AS (
                SELECT validator_index, balance_end AS balance_start
                FROM {FACTS_TABLE} WHERE epoch = {}
            ),",
            lo - 1
        ),
        "LEFT JOIN tail_balance_starts
            ON tail_balance_starts.validator_index = aggregate_head.validator_index"
            .to_string(),
        "tail_balance_starts.balance_start AS balance_start,".to_string(),
    )
}

/// Drops buckets older than the newest `keep` bucket indices. Returns the
/// number of rows removed.
pub fn prune(
    conn: &Connection,
    spec: &BucketSpec,
    keep: u64,
) -> Result<usize, AggregationError> {
    let progress = store::progress_epoch(conn, spec.table)?;
    if progress == 0 {
        return Ok(0);
    }
    let newest_bucket = (progress - 1) / spec.width;
    let cutoff = match newest_bucket.checked_sub(keep.saturating_sub(1)) {
        Some(cutoff) => cutoff,
        None => return Ok(0),
    };

    let removed = conn
        .execute(
            &format!("DELETE FROM {} WHERE {} < ?1", spec.table, spec.column),
            params![cutoff as i64],
        )
        .map_err(|e| AggregationError::from_storage(e, spec.table))?;
    if removed > 0 {
        log::debug!(
            "🧹 pruned {removed} rows below bucket {cutoff} from {}",
            spec.table
        );
    }
    Ok(removed)
}
