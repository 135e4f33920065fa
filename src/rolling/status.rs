//! Exporter status snapshot
//!
//! After every advance the coordinator can persist a small JSON document
//! with the head and the bounds of each maintained table, for operators and
//! dashboards that want the exporter state without querying the aggregate
//! tables themselves.

use super::error::AggregationError;
use super::store;
use super::types::WindowKind;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableStatus {
    pub table: String,
    pub epoch_start: Option<u64>,
    pub epoch_end: Option<u64>,
    pub validators: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportStatus {
    pub updated_at: DateTime<Utc>,
    pub head: u64,
    pub tables: Vec<TableStatus>,
}

/// Reads bounds and row counts for every maintained window table.
pub fn collect(conn: &Connection, head: u64) -> Result<ExportStatus, AggregationError> {
    let mut tables = Vec::new();
    for kind in WindowKind::rolling()
        .iter()
        .chain(std::iter::once(&WindowKind::Total))
    {
        let table = kind.table_name();
        let bounds = store::current_bounds(conn, table)?;
        tables.push(TableStatus {
            table: table.to_string(),
            epoch_start: bounds.map(|b| b.epoch_start),
            epoch_end: bounds.map(|b| b.epoch_end),
            validators: store::row_count(conn, table)?,
        });
    }
    Ok(ExportStatus {
        updated_at: Utc::now(),
        head,
        tables,
    })
}

/// Writes the snapshot as pretty JSON, replacing any previous one.
pub fn write_snapshot(status: &ExportStatus, path: &Path) -> Result<(), AggregationError> {
    let json = serde_json::to_string_pretty(status)?;
    std::fs::write(path, json)?;
    Ok(())
}
