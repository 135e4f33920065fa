//! Error kinds surfaced by the aggregation engine
//!
//! Every failure rolls the enclosing transaction back (dropped without
//! commit) and leaves the window table at its previous bounds. Nothing is
//! retried inside the engine; the coordinator re-invokes on the next tick.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AggregationError {
    /// Required epoch facts are absent; the caller should trigger a backfill
    /// before retrying the advance.
    #[error("missing epochs in facts for {table} {section}: {epochs:?}")]
    MissingEpochs {
        table: String,
        section: &'static str,
        epochs: Vec<u64>,
    },

    /// The coarse aggregate source could not produce a complete window.
    #[error("bootstrap for {table} incomplete: {covered} of {expected} source buckets present")]
    BootstrapFailed {
        table: String,
        covered: u64,
        expected: u64,
    },

    /// Post-advance width inconsistent with the window invariants and not
    /// explainable by warm-up. Corruption signal; not auto-healed.
    #[error(
        "window bounds out of shape for {table}: {epoch_start}-{epoch_end}, want width {expected_width}"
    )]
    BoundsViolation {
        table: String,
        epoch_start: u64,
        epoch_end: u64,
        expected_width: u64,
    },

    /// An additive column went negative after tail eviction. Sums of fact
    /// rows cannot underflow unless something upstream double-inserted.
    #[error("additive column underflow in {table} for validators {validators:?}")]
    AggregateUnderflow { table: String, validators: Vec<u64> },

    /// Another writer holds the window table; retry on the next tick.
    #[error("concurrent aggregation detected for {table}")]
    Conflict { table: String },

    #[error(transparent)]
    Storage(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl AggregationError {
    /// Maps a busy/locked storage error onto the `Conflict` kind so the
    /// coordinator can tell "try again later" from "broken".
    pub fn from_storage(err: rusqlite::Error, table: &str) -> Self {
        use rusqlite::ffi::ErrorCode;
        if let rusqlite::Error::SqliteFailure(inner, _) = &err {
            if matches!(
                inner.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ) {
                return AggregationError::Conflict {
                    table: table.to_string(),
                };
            }
        }
        AggregationError::Storage(err)
    }
}
