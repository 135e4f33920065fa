//! Unbounded total aggregate
//!
//! The total table is a rolling window that never evicts: every advance adds
//! the newly exported epochs through the shared additive upsert and the
//! coverage starts at genesis for every validator.

use super::custom::{add_to_rolling_custom, CustomRolling};
use super::error::AggregationError;
use super::facts::{self, FACTS_TABLE};
use super::store;
use rusqlite::Connection;

pub const TOTAL_TABLE: &str = "validator_rolling_total";

/// Absorbs every epoch in `(progress, head]` into the total table. Safe to
/// re-run for the same head.
pub fn aggregate_to_head(conn: &mut Connection, head: u64) -> Result<(), AggregationError> {
    let tx = conn
        .transaction()
        .map_err(|e| AggregationError::from_storage(e, TOTAL_TABLE))?;

    let progress = store::progress_epoch(&tx, TOTAL_TABLE)?;
    if progress > head {
        return Ok(());
    }

    let missing = facts::missing_epochs_between(&tx, progress as i64, head as i64)?;
    if !missing.is_empty() {
        return Err(AggregationError::MissingEpochs {
            table: TOTAL_TABLE.to_string(),
            section: "head",
            epochs: missing,
        });
    }

    add_to_rolling_custom(
        &tx,
        CustomRolling {
            start_epoch: progress,
            end_epoch: head,
            start_bound_epoch: 0,
            table_from: FACTS_TABLE,
            table_to: TOTAL_TABLE,
            table_from_epoch_column: "epoch",
            table_conflict: "(validator_index)",
            ..Default::default()
        },
    )?;

    tx.commit()
        .map_err(|e| AggregationError::from_storage(e, TOTAL_TABLE))?;
    Ok(())
}
