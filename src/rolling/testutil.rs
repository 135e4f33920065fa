//! Shared helpers for the engine tests: in-memory databases with the real
//! schema and deterministic fact seeding.
//!
//! Fact values are distinct per (epoch, validator, column) so a transposed
//! or dropped column shows up as a sum mismatch, not a silent pass.

use super::columns::ADDITIVE_COLUMNS;
use super::facts::insert_epoch_fact;
use super::types::ValidatorEpochFact;
use rusqlite::Connection;

/// Opens an in-memory database with the full schema applied.
pub fn open_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("in-memory db");
    conn.execute_batch(include_str!("../../sql/01_validator_epoch_facts.sql"))
        .expect("facts schema");
    conn.execute_batch(include_str!("../../sql/02_rolling_windows.sql"))
        .expect("rolling schema");
    conn.execute_batch(include_str!("../../sql/03_day_aggregate.sql"))
        .expect("day schema");
    conn.execute_batch(include_str!("../../sql/04_hour_aggregate.sql"))
        .expect("hour schema");
    conn
}

/// Deterministic fact row. Every additive column gets a distinct value
/// derived from (epoch, validator, column ordinal); the balance walks with
/// the epoch so boundary snapshots are checkable.
pub fn fact(epoch: u64, validator_index: u64) -> ValidatorEpochFact {
    let e = epoch as i64;
    let v = validator_index as i64;
    let m = |k: i64| Some(e * 31 + v * 7 + k);

    ValidatorEpochFact {
        epoch,
        validator_index,
        attestations_source_reward: m(1),
        attestations_target_reward: m(2),
        attestations_head_reward: m(3),
        attestations_inactivity_reward: m(4),
        attestations_inclusion_reward: m(5),
        attestations_reward: m(6),
        attestations_ideal_source_reward: m(7),
        attestations_ideal_target_reward: m(8),
        attestations_ideal_head_reward: m(9),
        attestations_ideal_inactivity_reward: m(10),
        attestations_ideal_inclusion_reward: m(11),
        attestations_ideal_reward: m(12),
        attestations_scheduled: m(13),
        attestations_executed: m(14),
        attestation_head_executed: m(15),
        attestation_source_executed: m(16),
        attestation_target_executed: m(17),
        inclusion_delay_sum: m(18),
        optimal_inclusion_delay_sum: m(19),
        blocks_scheduled: m(20),
        blocks_proposed: m(21),
        blocks_cl_reward: m(22),
        block_chance: m(23),
        sync_scheduled: m(24),
        sync_executed: m(25),
        sync_rewards: m(26),
        slasher_reward: m(27),
        deposits_count: m(28),
        deposits_amount: m(29),
        withdrawals_count: m(30),
        withdrawals_amount: m(31),
        slashed: Some(false),
        slashed_by: None,
        slashed_violation: None,
        last_executed_duty_epoch: Some(e),
        balance_end: Some(32_000_000_000 + e * 1_000 + v),
    }
}

/// Seeds one fact row per validator for every epoch in `[lo, hi]`.
pub fn seed_epochs(conn: &Connection, lo: u64, hi: u64, validators: &[u64]) {
    let tx = conn.unchecked_transaction().expect("seed tx");
    for epoch in lo..=hi {
        for &validator in validators {
            insert_epoch_fact(&tx, &fact(epoch, validator)).expect("seed fact");
        }
    }
    tx.commit().expect("seed commit");
}

/// Asserts that, for each validator, every additive column of `table` equals
/// the fact sums over `[lo, hi]` (restricted to that validator), and that
/// `balance_end` matches the closing balance of `hi`.
pub fn assert_window_matches_fact_sums(
    conn: &Connection,
    table: &str,
    lo: u64,
    hi: u64,
    validators: &[u64],
) {
    for &validator in validators {
        for column in ADDITIVE_COLUMNS {
            let expected: i64 = conn
                .query_row(
                    &format!(
                        "SELECT COALESCE(SUM({column}), 0) FROM validator_epoch_facts
                         WHERE epoch >= ?1 AND epoch <= ?2 AND validator_index = ?3"
                    ),
                    rusqlite::params![lo as i64, hi as i64, validator as i64],
                    |row| row.get(0),
                )
                .unwrap();
            let actual: i64 = conn
                .query_row(
                    &format!(
                        "SELECT COALESCE({column}, 0) FROM {table} WHERE validator_index = ?1"
                    ),
                    rusqlite::params![validator as i64],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(
                actual, expected,
                "column {column} for validator {validator} in {table} (range {lo}-{hi})"
            );
        }

        let balance_end: Option<i64> = conn
            .query_row(
                &format!("SELECT balance_end FROM {table} WHERE validator_index = ?1"),
                rusqlite::params![validator as i64],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(
            balance_end,
            fact(hi, validator).balance_end,
            "balance_end for validator {validator} in {table}"
        );
    }
}

/// Reads a single nullable integer column of a window row.
pub fn read_cell(conn: &Connection, table: &str, validator: u64, column: &str) -> Option<i64> {
    conn.query_row(
        &format!("SELECT {column} FROM {table} WHERE validator_index = ?1"),
        rusqlite::params![validator as i64],
        |row| row.get(0),
    )
    .unwrap()
}
