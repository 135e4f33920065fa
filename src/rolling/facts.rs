//! Read-side view over the per-epoch fact rows
//!
//! The fact table is written by the upstream exporter; the engine only scans
//! it. `insert_epoch_fact` exists for in-process producers and the tests.

use super::error::AggregationError;
use super::types::ValidatorEpochFact;
use rusqlite::{params, Connection, OptionalExtension};

pub const FACTS_TABLE: &str = "validator_epoch_facts";

/// Epochs in the inclusive range `[lo, hi]` that have no fact rows at all.
/// An empty result means the range is fully covered and an advance over it
/// is safe. Negative or inverted ranges scan nothing.
pub fn missing_epochs_between(
    conn: &Connection,
    lo: i64,
    hi: i64,
) -> Result<Vec<u64>, AggregationError> {
    let lo = lo.max(0);
    if hi < lo {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(
        "WITH RECURSIVE wanted(epoch) AS (
            SELECT ?1
            UNION ALL
            SELECT epoch + 1 FROM wanted WHERE epoch < ?2
        )
        SELECT wanted.epoch
        FROM wanted
        LEFT JOIN (
            SELECT DISTINCT epoch FROM validator_epoch_facts
            WHERE epoch >= ?1 AND epoch <= ?2
        ) present ON present.epoch = wanted.epoch
        WHERE present.epoch IS NULL
        ORDER BY wanted.epoch",
    )?;
    let missing = stmt
        .query_map(params![lo, hi], |row| row.get::<_, i64>(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(missing.into_iter().map(|e| e as u64).collect())
}

/// Whether any fact row exists for `epoch`.
pub fn has_epoch(conn: &Connection, epoch: u64) -> Result<bool, AggregationError> {
    let mut stmt =
        conn.prepare("SELECT 1 FROM validator_epoch_facts WHERE epoch = ?1 LIMIT 1")?;
    Ok(stmt.exists(params![epoch as i64])?)
}

/// Highest epoch present in the fact table; the scheduler treats this as the
/// current exported head. `None` while the table is empty.
pub fn latest_fact_epoch(conn: &Connection) -> Result<Option<u64>, AggregationError> {
    let head: Option<i64> = conn
        .query_row("SELECT MAX(epoch) FROM validator_epoch_facts", [], |row| {
            row.get(0)
        })
        .optional()?
        .flatten();
    Ok(head.map(|e| e as u64))
}

/// Writes one fact row. Replaces on key conflict so a producer can re-export
/// an epoch idempotently.
pub fn insert_epoch_fact(
    conn: &Connection,
    fact: &ValidatorEpochFact,
) -> Result<(), AggregationError> {
    conn.execute(
        "INSERT OR REPLACE INTO validator_epoch_facts (
            epoch, validator_index,
            attestations_source_reward, attestations_target_reward,
            attestations_head_reward, attestations_inactivity_reward,
            attestations_inclusion_reward, attestations_reward,
            attestations_ideal_source_reward, attestations_ideal_target_reward,
            attestations_ideal_head_reward, attestations_ideal_inactivity_reward,
            attestations_ideal_inclusion_reward, attestations_ideal_reward,
            attestations_scheduled, attestations_executed,
            attestation_head_executed, attestation_source_executed,
            attestation_target_executed,
            inclusion_delay_sum, optimal_inclusion_delay_sum,
            blocks_scheduled, blocks_proposed, blocks_cl_reward, block_chance,
            sync_scheduled, sync_executed, sync_rewards,
            slasher_reward,
            deposits_count, deposits_amount,
            withdrawals_count, withdrawals_amount,
            slashed, slashed_by, slashed_violation, last_executed_duty_epoch,
            balance_end
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
            ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28,
            ?29, ?30, ?31, ?32, ?33, ?34, ?35, ?36, ?37, ?38
        )",
        params![
            fact.epoch as i64,
            fact.validator_index as i64,
            fact.attestations_source_reward,
            fact.attestations_target_reward,
            fact.attestations_head_reward,
            fact.attestations_inactivity_reward,
            fact.attestations_inclusion_reward,
            fact.attestations_reward,
            fact.attestations_ideal_source_reward,
            fact.attestations_ideal_target_reward,
            fact.attestations_ideal_head_reward,
            fact.attestations_ideal_inactivity_reward,
            fact.attestations_ideal_inclusion_reward,
            fact.attestations_ideal_reward,
            fact.attestations_scheduled,
            fact.attestations_executed,
            fact.attestation_head_executed,
            fact.attestation_source_executed,
            fact.attestation_target_executed,
            fact.inclusion_delay_sum,
            fact.optimal_inclusion_delay_sum,
            fact.blocks_scheduled,
            fact.blocks_proposed,
            fact.blocks_cl_reward,
            fact.block_chance,
            fact.sync_scheduled,
            fact.sync_executed,
            fact.sync_rewards,
            fact.slasher_reward,
            fact.deposits_count,
            fact.deposits_amount,
            fact.withdrawals_count,
            fact.withdrawals_amount,
            fact.slashed,
            fact.slashed_by,
            fact.slashed_violation,
            fact.last_executed_duty_epoch,
            fact.balance_end,
        ],
    )?;
    Ok(())
}
