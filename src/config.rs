//! Exporter configuration from environment variables

use std::env;

/// Configuration for the rolling exporter runtime.
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// Path to the SQLite database file
    pub db_path: String,

    /// Directory holding the schema migration files
    pub schema_dir: String,

    /// Epochs per UTC day on the target network
    pub epochs_per_day: u64,

    /// Head poll interval in milliseconds
    pub poll_interval_ms: u64,

    /// Day buckets retained for the wide-window bootstraps
    pub day_bucket_retention: u64,

    /// Hour buckets retained for the 24h bootstrap
    pub hour_bucket_retention: u64,

    /// Optional path for the JSON status snapshot
    pub status_path: Option<String>,

    /// Master enable flag for the exporter
    pub enabled: bool,
}

impl ExporterConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `STAKEFLOW_DB_PATH` (default: /var/lib/stakeflow/stakeflow.db)
    /// - `STAKEFLOW_SCHEMA_DIR` (default: sql)
    /// - `EPOCHS_PER_DAY` (default: 225)
    /// - `HEAD_POLL_INTERVAL_MS` (default: 60000)
    /// - `DAY_BUCKET_RETENTION` (default: 92)
    /// - `HOUR_BUCKET_RETENTION` (default: 26)
    /// - `STAKEFLOW_STATUS_PATH` (default: unset)
    /// - `ENABLE_ROLLING_EXPORTER` (default: false)
    pub fn from_env() -> Self {
        Self {
            db_path: env::var("STAKEFLOW_DB_PATH")
                .unwrap_or_else(|_| "/var/lib/stakeflow/stakeflow.db".to_string()),

            schema_dir: env::var("STAKEFLOW_SCHEMA_DIR").unwrap_or_else(|_| "sql".to_string()),

            epochs_per_day: env::var("EPOCHS_PER_DAY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(225),

            poll_interval_ms: env::var("HEAD_POLL_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60_000),

            day_bucket_retention: env::var("DAY_BUCKET_RETENTION")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(92),

            hour_bucket_retention: env::var("HOUR_BUCKET_RETENTION")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(26),

            status_path: env::var("STAKEFLOW_STATUS_PATH").ok(),

            enabled: env::var("ENABLE_ROLLING_EXPORTER")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        // defaults with nothing set
        env::remove_var("STAKEFLOW_DB_PATH");
        env::remove_var("EPOCHS_PER_DAY");
        env::remove_var("HEAD_POLL_INTERVAL_MS");
        env::remove_var("ENABLE_ROLLING_EXPORTER");

        let config = ExporterConfig::from_env();
        assert_eq!(config.db_path, "/var/lib/stakeflow/stakeflow.db");
        assert_eq!(config.schema_dir, "sql");
        assert_eq!(config.epochs_per_day, 225);
        assert_eq!(config.poll_interval_ms, 60_000);
        assert_eq!(config.day_bucket_retention, 92);
        assert_eq!(config.hour_bucket_retention, 26);
        assert_eq!(config.status_path, None);
        assert!(!config.enabled);

        // overrides
        env::set_var("STAKEFLOW_DB_PATH", "/tmp/test.db");
        env::set_var("EPOCHS_PER_DAY", "32");
        env::set_var("HEAD_POLL_INTERVAL_MS", "2000");
        env::set_var("ENABLE_ROLLING_EXPORTER", "true");

        let config = ExporterConfig::from_env();
        assert_eq!(config.db_path, "/tmp/test.db");
        assert_eq!(config.epochs_per_day, 32);
        assert_eq!(config.poll_interval_ms, 2_000);
        assert!(config.enabled);

        env::remove_var("STAKEFLOW_DB_PATH");
        env::remove_var("EPOCHS_PER_DAY");
        env::remove_var("HEAD_POLL_INTERVAL_MS");
        env::remove_var("ENABLE_ROLLING_EXPORTER");
    }
}
