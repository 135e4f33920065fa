//! SQLite connection setup and schema migrations

use crate::rolling::AggregationError;
use rusqlite::Connection;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Opens the exporter database with WAL journaling and a busy timeout so a
/// concurrent reader never turns a write into a hard failure.
pub fn open_connection(db_path: &str) -> Result<Connection, AggregationError> {
    let conn = Connection::open(db_path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    log::info!("📘 SQLite: WAL mode enabled");
    Ok(conn)
}

/// Run schema migrations from SQL files
///
/// Reads all .sql files from the specified directory, sorted by name so the
/// numeric prefixes order them, and executes each. All schema files use
/// `IF NOT EXISTS` clauses, so re-running is harmless.
pub fn run_schema_migrations(
    conn: &mut Connection,
    schema_dir: &str,
) -> Result<(), AggregationError> {
    let schema_path = Path::new(schema_dir);
    if !schema_path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("schema directory not found: {schema_dir}"),
        )
        .into());
    }

    let mut sql_files: Vec<_> = fs::read_dir(schema_path)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().and_then(|s| s.to_str()) == Some("sql"))
        .collect();
    sql_files.sort_by_key(|entry| entry.file_name());

    log::info!("🔧 running schema migrations from: {schema_dir}");
    for entry in sql_files {
        let path = entry.path();
        let sql = fs::read_to_string(&path)?;
        conn.execute_batch(&sql)?;
        log::info!("   ├─ applied {}", path.display());
    }
    log::info!("✅ schema up to date");

    Ok(())
}
