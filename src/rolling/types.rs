//! Core data types for the rolling aggregation engine

use serde::{Deserialize, Serialize};

/// Network-level epoch geometry.
///
/// All window widths are expressed in whole days of epochs. The hour bucket
/// width is `epochs_per_day / 24` (floored, minimum 1); for mainnet's 225
/// epochs per day that is 9, which divides 225 so hour-aligned bootstrap
/// bounds stay day-aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub epochs_per_day: u64,
}

impl NetworkSpec {
    pub fn new(epochs_per_day: u64) -> Self {
        Self {
            epochs_per_day: epochs_per_day.max(1),
        }
    }

    /// Ethereum mainnet geometry: 225 epochs per UTC day.
    pub fn mainnet() -> Self {
        Self::new(225)
    }

    /// Window width in epochs for a `days`-wide rolling window.
    pub fn window_epochs(&self, days: u64) -> u64 {
        self.epochs_per_day * days
    }

    /// Width of one hour bucket in epochs.
    pub fn hour_bucket_width(&self) -> u64 {
        (self.epochs_per_day / 24).max(1)
    }

    /// Day bucket index containing `epoch`.
    pub fn day_of(&self, epoch: u64) -> u64 {
        epoch / self.epochs_per_day
    }

    /// Hour bucket index containing `epoch`.
    pub fn hour_of(&self, epoch: u64) -> u64 {
        epoch / self.hour_bucket_width()
    }
}

impl Default for NetworkSpec {
    fn default() -> Self {
        Self::mainnet()
    }
}

/// Global epoch range of a window table: `epoch_start` inclusive,
/// `epoch_end` exclusive. Every row of a healthy window table carries the
/// same pair, so reading any single row yields the table bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EpochBounds {
    pub epoch_start: u64,
    pub epoch_end: u64,
}

impl EpochBounds {
    pub fn width(&self) -> u64 {
        self.epoch_end.saturating_sub(self.epoch_start)
    }
}

/// The maintained aggregate tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WindowKind {
    Hours24,
    Days7,
    Days31,
    Days90,
    Total,
}

impl WindowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowKind::Hours24 => "24h",
            WindowKind::Days7 => "7d",
            WindowKind::Days31 => "31d",
            WindowKind::Days90 => "90d",
            WindowKind::Total => "total",
        }
    }

    pub fn table_name(&self) -> &'static str {
        match self {
            WindowKind::Hours24 => "validator_rolling_24h",
            WindowKind::Days7 => "validator_rolling_7d",
            WindowKind::Days31 => "validator_rolling_31d",
            WindowKind::Days90 => "validator_rolling_90d",
            WindowKind::Total => "validator_rolling_total",
        }
    }

    /// Window width in days; `None` for the unbounded total.
    pub fn days(&self) -> Option<u64> {
        match self {
            WindowKind::Hours24 => Some(1),
            WindowKind::Days7 => Some(7),
            WindowKind::Days31 => Some(31),
            WindowKind::Days90 => Some(90),
            WindowKind::Total => None,
        }
    }

    /// The fixed-width rolling windows, coarsest bootstrap consumers last.
    pub fn rolling() -> [WindowKind; 4] {
        [
            WindowKind::Hours24,
            WindowKind::Days7,
            WindowKind::Days31,
            WindowKind::Days90,
        ]
    }
}

/// One `validator_epoch_facts` row. Metric fields are nullable: the upstream
/// exporter writes null where a duty did not apply that epoch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidatorEpochFact {
    pub epoch: u64,
    pub validator_index: u64,

    pub attestations_source_reward: Option<i64>,
    pub attestations_target_reward: Option<i64>,
    pub attestations_head_reward: Option<i64>,
    pub attestations_inactivity_reward: Option<i64>,
    pub attestations_inclusion_reward: Option<i64>,
    pub attestations_reward: Option<i64>,
    pub attestations_ideal_source_reward: Option<i64>,
    pub attestations_ideal_target_reward: Option<i64>,
    pub attestations_ideal_head_reward: Option<i64>,
    pub attestations_ideal_inactivity_reward: Option<i64>,
    pub attestations_ideal_inclusion_reward: Option<i64>,
    pub attestations_ideal_reward: Option<i64>,
    pub attestations_scheduled: Option<i64>,
    pub attestations_executed: Option<i64>,
    pub attestation_head_executed: Option<i64>,
    pub attestation_source_executed: Option<i64>,
    pub attestation_target_executed: Option<i64>,
    pub inclusion_delay_sum: Option<i64>,
    pub optimal_inclusion_delay_sum: Option<i64>,
    pub blocks_scheduled: Option<i64>,
    pub blocks_proposed: Option<i64>,
    pub blocks_cl_reward: Option<i64>,
    pub block_chance: Option<i64>,
    pub sync_scheduled: Option<i64>,
    pub sync_executed: Option<i64>,
    pub sync_rewards: Option<i64>,
    pub slasher_reward: Option<i64>,
    pub deposits_count: Option<i64>,
    pub deposits_amount: Option<i64>,
    pub withdrawals_count: Option<i64>,
    pub withdrawals_amount: Option<i64>,

    pub slashed: Option<bool>,
    pub slashed_by: Option<i64>,
    pub slashed_violation: Option<i64>,
    pub last_executed_duty_epoch: Option<i64>,
    pub balance_end: Option<i64>,
}
