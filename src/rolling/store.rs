//! Window table access helpers
//!
//! Thin read/maintenance layer over the aggregate tables. The heavy
//! arithmetic lives in the add/remove SQL; this module only reads bounds,
//! tracks per-table progress and truncates for bootstrap.

use super::error::AggregationError;
use super::types::EpochBounds;
use rusqlite::{Connection, OptionalExtension};

/// Reads the global bounds of a window table from any single row. Returns
/// `None` for an empty table, which marks the bootstrap path.
pub fn current_bounds(
    conn: &Connection,
    table: &str,
) -> Result<Option<EpochBounds>, AggregationError> {
    let bounds = conn
        .query_row(
            &format!("SELECT epoch_start, epoch_end FROM {table} LIMIT 1"),
            [],
            |row| {
                Ok(EpochBounds {
                    epoch_start: row.get::<_, i64>(0)? as u64,
                    epoch_end: row.get::<_, i64>(1)? as u64,
                })
            },
        )
        .optional()
        .map_err(|e| AggregationError::from_storage(e, table))?;
    Ok(bounds)
}

/// Highest `epoch_end` written to a bucketed table (day/hour/total), i.e.
/// the exclusive epoch up to which it has been aggregated. 0 for an empty
/// table.
pub fn progress_epoch(conn: &Connection, table: &str) -> Result<u64, AggregationError> {
    let progress: i64 = conn
        .query_row(
            &format!("SELECT COALESCE(MAX(epoch_end), 0) FROM {table}"),
            [],
            |row| row.get(0),
        )
        .map_err(|e| AggregationError::from_storage(e, table))?;
    Ok(progress as u64)
}

/// Drops every row of a window table. Used by the bootstrap strategies
/// before a full rebuild.
pub fn truncate(conn: &Connection, table: &str) -> Result<(), AggregationError> {
    conn.execute(&format!("DELETE FROM {table}"), [])
        .map_err(|e| AggregationError::from_storage(e, table))?;
    Ok(())
}

pub fn row_count(conn: &Connection, table: &str) -> Result<u64, AggregationError> {
    let count: i64 = conn
        .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })
        .map_err(|e| AggregationError::from_storage(e, table))?;
    Ok(count as u64)
}
