//! Metric column registry and SQL fragment builders
//!
//! The additive upsert, the tail eviction and the bootstrap statements all
//! touch the same ~35 metric columns. Keeping the column list in one place
//! and deriving every statement fragment from it keeps the six SQL sites
//! from drifting apart.

/// Columns that are summed per validator over an epoch range and merged
/// additively on conflict (subtractively on tail eviction).
pub const ADDITIVE_COLUMNS: &[&str] = &[
    "attestations_source_reward",
    "attestations_target_reward",
    "attestations_head_reward",
    "attestations_inactivity_reward",
    "attestations_inclusion_reward",
    "attestations_reward",
    "attestations_ideal_source_reward",
    "attestations_ideal_target_reward",
    "attestations_ideal_head_reward",
    "attestations_ideal_inactivity_reward",
    "attestations_ideal_inclusion_reward",
    "attestations_ideal_reward",
    "attestations_scheduled",
    "attestations_executed",
    "attestation_head_executed",
    "attestation_source_executed",
    "attestation_target_executed",
    "inclusion_delay_sum",
    "optimal_inclusion_delay_sum",
    "blocks_scheduled",
    "blocks_proposed",
    "blocks_cl_reward",
    "block_chance",
    "sync_scheduled",
    "sync_executed",
    "sync_rewards",
    "slasher_reward",
    "deposits_count",
    "deposits_amount",
    "withdrawals_count",
    "withdrawals_amount",
];

/// Columns merged by taking the maximum, with nulls ignored. `slashed` rides
/// along here: stored as 0/1, its max is the logical OR across the window.
pub const MAX_MERGED_COLUMNS: &[&str] = &[
    "slashed",
    "slashed_by",
    "slashed_violation",
    "last_executed_duty_epoch",
];

/// `SUM(col) AS col, ... MAX(col) AS col, ...` for a per-validator GROUP BY
/// over an epoch range. Covers both column groups.
pub fn aggregate_select_list() -> String {
    let mut parts: Vec<String> = ADDITIVE_COLUMNS
        .iter()
        .map(|c| format!("SUM({c}) AS {c}"))
        .collect();
    parts.extend(MAX_MERGED_COLUMNS.iter().map(|c| format!("MAX({c}) AS {c}")));
    parts.join(",\n        ")
}

/// Plain column name list for an INSERT column clause, additive then
/// max-merged, in registry order.
pub fn metric_column_list() -> String {
    ADDITIVE_COLUMNS
        .iter()
        .chain(MAX_MERGED_COLUMNS.iter())
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(",\n    ")
}

/// Value list matching [`metric_column_list`], reading from `alias`. Additive
/// columns are null-coalesced to 0 so fresh rows never carry null counters;
/// max-merged columns keep their nulls.
pub fn metric_value_list(alias: &str) -> String {
    let mut parts: Vec<String> = ADDITIVE_COLUMNS
        .iter()
        .map(|c| format!("COALESCE({alias}.{c}, 0) AS {c}"))
        .collect();
    parts.extend(MAX_MERGED_COLUMNS.iter().map(|c| format!("{alias}.{c} AS {c}")));
    parts.join(",\n    ")
}

/// `col = COALESCE(table.col, 0) + excluded.col, ...` assignments for the
/// DO UPDATE arm of the additive upsert.
pub fn conflict_add_assignments(table: &str) -> String {
    ADDITIVE_COLUMNS
        .iter()
        .map(|c| format!("{c} = COALESCE({table}.{c}, 0) + excluded.{c}"))
        .collect::<Vec<_>>()
        .join(",\n        ")
}

/// Null-ignoring max merges for the DO UPDATE arm: the incoming value wins
/// only when it is non-null and larger; a null on either side defers to the
/// other side.
pub fn conflict_max_assignments(table: &str) -> String {
    MAX_MERGED_COLUMNS
        .iter()
        .map(|c| {
            format!(
                "{c} = MAX(COALESCE({table}.{c}, excluded.{c}), COALESCE(excluded.{c}, {table}.{c}))"
            )
        })
        .collect::<Vec<_>>()
        .join(",\n        ")
}

/// `col = COALESCE(w.col, 0) - tail.col, ...` assignments for the tail
/// eviction UPDATE. Only additive columns are subtracted; the max-merged
/// group is never un-merged.
pub fn subtract_assignments() -> String {
    ADDITIVE_COLUMNS
        .iter()
        .map(|c| format!("{c} = COALESCE(w.{c}, 0) - tail.{c}"))
        .collect::<Vec<_>>()
        .join(",\n        ")
}

/// `col < 0 OR ...` predicate over the additive columns. Sums of
/// non-negative fact deltas can only go negative if something upstream
/// double-inserted; the debug-build underflow scan uses this.
pub fn negative_value_predicate() -> String {
    ADDITIVE_COLUMNS
        .iter()
        .map(|c| format!("{c} < 0"))
        .collect::<Vec<_>>()
        .join(" OR ")
}
