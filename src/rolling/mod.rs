//! # Rolling aggregation engine
//!
//! Maintains materialized windowed aggregates over per-validator per-epoch
//! metric rows: fixed-width rolling windows (24h, 7d, 31d, 90d), an
//! unbounded total, and the coarse day/hour bucket tables the window
//! bootstraps are built from.
//!
//! ## How a window advances
//!
//! Every advance works against a single head epoch supplied by the caller:
//! 1. The newly exported epochs are summed per validator and merged into the
//!    window table at the head (additive upsert).
//! 2. The epochs that fell out of the window are summed and subtracted at
//!    the tail, moving `epoch_start` and the `balance_start` snapshot
//!    forward.
//! 3. Both run inside one transaction; readers only ever see the pre- or
//!    post-advance window.
//!
//! A window that is empty or too far behind is instead rebuilt from the
//! next-finer bucket table and then advanced incrementally.
//!
//! ## Module organization
//!
//! - `types` - epoch geometry, bounds, window kinds, fact records
//! - `columns` - metric column registry and SQL fragment builders
//! - `error` - structured error kinds
//! - `facts` - fact table view (missing-epoch scan, head lookup)
//! - `store` - window table access (bounds, truncate, progress)
//! - `custom` - the shared additive upsert
//! - `aggregator` - window advancement and tail eviction
//! - `bootstrap` - day/hour-backed bootstrap strategies
//! - `buckets` - day/hour bucket maintenance and retention
//! - `total` - the unbounded total table
//! - `coordinator` - drives every table per exported head
//! - `scheduler` - background polling loop
//! - `status` - JSON status snapshot

pub mod aggregator;
pub mod bootstrap;
pub mod buckets;
pub mod columns;
pub mod coordinator;
pub mod custom;
pub mod error;
pub mod facts;
pub mod scheduler;
pub mod status;
pub mod store;
pub mod total;
pub mod types;

#[cfg(test)]
pub mod testutil;

// Re-export commonly used types
pub use aggregator::{BootstrapStrategy, RollingAggregator};
pub use bootstrap::{DayTableBootstrap, HourTableBootstrap};
pub use coordinator::{AdvanceOutcome, ExportCoordinator};
pub use custom::{add_to_rolling_custom, CustomRolling};
pub use error::AggregationError;
pub use scheduler::{export_scheduler_task, FactTableHeadSource, HeadSource};
pub use status::ExportStatus;
pub use types::{EpochBounds, NetworkSpec, ValidatorEpochFact, WindowKind};
