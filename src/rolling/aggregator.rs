//! Rolling window advancement
//!
//! Keeps a fixed-width window table in sync with the exported head by adding
//! newly exported epochs at the head and subtracting the evicted epochs at
//! the tail, both inside one transaction. When the table is empty or has
//! fallen too far behind, the window is rebuilt from a coarser aggregate via
//! the per-window bootstrap strategy and then advanced incrementally.

use super::columns;
use super::custom::{add_to_rolling_custom, CustomRolling};
use super::error::AggregationError;
use super::facts::{self, FACTS_TABLE};
use super::store;
use super::types::{EpochBounds, NetworkSpec};
use rusqlite::{params, Connection};

/// Per-window bootstrap capability: rebuild the table from a coarser
/// aggregate, report the lag at which rebuilding beats re-exporting, and
/// predict the bounds a rebuild would land on for a given head.
pub trait BootstrapStrategy: Send + Sync {
    /// Replaces the entire window table from the coarse source so that its
    /// bounds cover the largest complete coarse prefix ending at or before
    /// the exported head.
    fn bootstrap(&self, conn: &Connection, days: u64, table: &str)
        -> Result<(), AggregationError>;

    /// Lag in epochs at which an advance switches to a bootstrap.
    fn bootstrap_on_epochs_behind(&self) -> u64;

    /// Bounds a bootstrap would produce for `head`, without running one.
    fn bootstrap_bounds(&self, head: u64, days: u64) -> EpochBounds;
}

pub struct RollingAggregator {
    network: NetworkSpec,
    strategy: Box<dyn BootstrapStrategy>,
}

impl RollingAggregator {
    pub fn new(network: NetworkSpec, strategy: Box<dyn BootstrapStrategy>) -> Self {
        Self { network, strategy }
    }

    /// Advances `table` (a `days`-wide window) to `head`, the highest epoch
    /// exported so far. Idempotent for a repeated head; atomic per call.
    pub fn aggregate(
        &self,
        conn: &mut Connection,
        days: u64,
        table: &str,
        head: u64,
    ) -> Result<(), AggregationError> {
        let tx = conn
            .transaction()
            .map_err(|e| AggregationError::from_storage(e, table))?;
        self.aggregate_in_tx(&tx, days, table, head)?;
        tx.commit()
            .map_err(|e| AggregationError::from_storage(e, table))?;
        Ok(())
    }

    fn aggregate_in_tx(
        &self,
        tx: &Connection,
        days: u64,
        table: &str,
        head: u64,
    ) -> Result<(), AggregationError> {
        let width = self.network.window_epochs(days);
        let mut bounds = store::current_bounds(tx, table)?;

        let mut bootstrap = bounds.is_none();
        if bootstrap {
            log::info!("🔁 bootstrapping {table}: table is empty");
        }

        if let Some(b) = bounds {
            // epoch_end is exclusive, so head + 1 is the would-be end
            let lag = head as i64 + 1 - b.epoch_end as i64;
            let threshold = self
                .strategy
                .bootstrap_on_epochs_behind()
                .min(i64::MAX as u64) as i64;
            if lag >= threshold {
                log::info!(
                    "🔁 bootstrapping {table}: {lag} epochs behind (threshold {threshold})"
                );
                bootstrap = true;
            }
        }

        if bootstrap {
            self.strategy.bootstrap(tx, days, table)?;
            bounds = store::current_bounds(tx, table)?;

            if let Some(b) = bounds {
                log::info!(
                    "✅ bootstrap of {table} finished: {} - {} (head {head})",
                    b.epoch_start,
                    b.epoch_end
                );
                if head + 1 == b.epoch_end && b.width() == width {
                    // the coarse source landed exactly on the head
                    return Ok(());
                }
            }
        }

        let started_empty = bounds.is_none();
        let bounds = bounds.unwrap_or_default();

        if !bootstrap && bounds.width() != width {
            log::warn!(
                "⚠️  {table} bounds out of shape ({} - {}, width {}); expected right after a bootstrap only",
                bounds.epoch_start,
                bounds.epoch_end,
                bounds.width()
            );
        }

        // head range to add, inclusive on both ends
        let head_start = bounds.epoch_end;
        let head_end = head;
        let add_head = head_end >= head_start;

        // tail range to evict, inclusive; negative while the window is still
        // warming up (chain younger than the window)
        let tail_start = bounds.epoch_start as i64;
        let tail_end = head as i64 - width as i64;
        let evict_tail = tail_end >= tail_start && tail_end >= 0;

        log::info!(
            "⏩ {table}: head {head_start} - {head_end}, tail {tail_start} - {tail_end}"
        );

        if evict_tail {
            let missing = facts::missing_epochs_between(tx, tail_start, tail_end)?;
            if !missing.is_empty() {
                return Err(AggregationError::MissingEpochs {
                    table: table.to_string(),
                    section: "tail",
                    epochs: missing,
                });
            }
        }
        if add_head {
            let missing =
                facts::missing_epochs_between(tx, head_start as i64, head_end as i64)?;
            if !missing.is_empty() {
                return Err(AggregationError::MissingEpochs {
                    table: table.to_string(),
                    section: "head",
                    epochs: missing,
                });
            }
        }

        // The global epoch_start after this advance. A table that started
        // empty keeps the naive start so the width sanity check below can
        // catch an impossible single-shot catch-up.
        let new_start = if evict_tail && !started_empty {
            (tail_end + 1) as u64
        } else {
            bounds.epoch_start
        };

        // Evict before adding: the head may hold validators that have no row
        // in the tail range, and those must not see stale tail values.
        if evict_tail {
            self.remove_from_rolling(tx, table, tail_start.max(0), tail_end)?;
        }
        if add_head {
            add_to_rolling_custom(
                tx,
                CustomRolling {
                    start_epoch: head_start,
                    end_epoch: head_end,
                    start_bound_epoch: new_start,
                    table_from: FACTS_TABLE,
                    table_to: table,
                    table_from_epoch_column: "epoch",
                    table_conflict: "(validator_index)",
                    ..Default::default()
                },
            )?;
        }
        if evict_tail && !started_empty {
            // validators without facts in the tail range (joined mid-window)
            // are not touched by the eviction; align them to the new global
            // start so all rows agree on the bounds
            tx.execute(
                &format!("UPDATE {table} SET epoch_start = ?1 WHERE epoch_start <> ?1"),
                params![new_start as i64],
            )
            .map_err(|e| AggregationError::from_storage(e, table))?;
        }

        #[cfg(debug_assertions)]
        if evict_tail {
            self.scan_for_underflow(tx, table)?;
        }

        if let Some(after) = store::current_bounds(tx, table)? {
            if after.width() != width && tail_start >= 0 && tail_end >= 0 {
                return Err(AggregationError::BoundsViolation {
                    table: table.to_string(),
                    epoch_start: after.epoch_start,
                    epoch_end: after.epoch_end,
                    expected_width: width,
                });
            }
        }

        Ok(())
    }

    /// Subtracts the per-validator sums over `[start_epoch, end_epoch]` from
    /// the window rows, moves `epoch_start` past the evicted range and
    /// replaces `balance_start` with the closing balance of the last evicted
    /// epoch (the opening balance of the shrunk window).
    fn remove_from_rolling(
        &self,
        conn: &Connection,
        table: &str,
        start_epoch: i64,
        end_epoch: i64,
    ) -> Result<usize, AggregationError> {
        let sql = format!(
            "WITH
            tail_balance_starts AS (
                SELECT validator_index, balance_end AS balance_start
                FROM {facts} WHERE epoch = ?2
            ),
            aggregate_tail AS (
                SELECT
                validator_index,
                {aggregate_select}
                FROM {facts}
                WHERE epoch >= ?1 AND epoch <= ?2
                GROUP BY validator_index
            ),
            tail AS (
                SELECT
                    aggregate_tail.validator_index AS validator_index,
                    {metric_values},
                    tail_balance_starts.balance_start AS balance_start
                FROM aggregate_tail
                LEFT JOIN tail_balance_starts
                    ON tail_balance_starts.validator_index = aggregate_tail.validator_index
            )
            UPDATE {table} AS w SET
                {subtract_assignments},
                epoch_start = ?2 + 1,
                balance_start = COALESCE(tail.balance_start, w.balance_start),
                last_executed_duty_epoch =
                    COALESCE(tail.last_executed_duty_epoch, w.last_executed_duty_epoch)
            FROM tail
            WHERE w.validator_index = tail.validator_index",
            facts = FACTS_TABLE,
            table = table,
            aggregate_select = columns::aggregate_select_list(),
            metric_values = columns::metric_value_list("aggregate_tail"),
            subtract_assignments = columns::subtract_assignments(),
        );

        let affected = conn
            .execute(&sql, params![start_epoch, end_epoch])
            .map_err(|e| AggregationError::from_storage(e, table))?;
        log::debug!(
            "🧮 evicted epochs {start_epoch} - {end_epoch} from {table} ({affected} rows)"
        );
        Ok(affected)
    }

    /// Tail epochs the next advance to `intended_head` would need, filtered
    /// down to those absent from the fact store. When the table is empty or
    /// the lag would trigger a bootstrap, the predicted bootstrap bounds
    /// stand in for the stored ones.
    pub fn missing_tail_epochs(
        &self,
        conn: &Connection,
        days: u64,
        table: &str,
        intended_head: u64,
    ) -> Result<Vec<u64>, AggregationError> {
        let stored = store::current_bounds(conn, table)?;
        let threshold = self
            .strategy
            .bootstrap_on_epochs_behind()
            .min(i64::MAX as u64) as i64;

        let bounds = match stored {
            Some(b) if (intended_head as i64 - b.epoch_end as i64) < threshold => b,
            _ => {
                let predicted = self.strategy.bootstrap_bounds(intended_head, days);
                log::debug!(
                    "predicted bootstrap bounds for {table}: {} - {}",
                    predicted.epoch_start,
                    predicted.epoch_end
                );
                predicted
            }
        };

        let tail_start = bounds.epoch_start as i64;
        let tail_end = intended_head as i64 - self.network.window_epochs(days) as i64;
        facts::missing_epochs_between(conn, tail_start, tail_end)
    }

    #[cfg(debug_assertions)]
    fn scan_for_underflow(
        &self,
        conn: &Connection,
        table: &str,
    ) -> Result<(), AggregationError> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT validator_index FROM {table} WHERE {}",
                columns::negative_value_predicate()
            ))
            .map_err(|e| AggregationError::from_storage(e, table))?;
        let validators = stmt
            .query_map([], |row| row.get::<_, i64>(0))
            .map_err(|e| AggregationError::from_storage(e, table))?
            .collect::<Result<Vec<i64>, _>>()
            .map_err(|e| AggregationError::from_storage(e, table))?;
        if !validators.is_empty() {
            return Err(AggregationError::AggregateUnderflow {
                table: table.to_string(),
                validators: validators.into_iter().map(|v| v as u64).collect(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rolling::facts::insert_epoch_fact;
    use crate::rolling::testutil::{
        assert_window_matches_fact_sums, fact, open_test_db, read_cell, seed_epochs,
    };

    const TABLE: &str = "validator_rolling_24h";

    /// Strategy for incremental-only tests: never able to bootstrap, huge
    /// lag threshold, naive predicted bounds.
    struct NoBootstrap;

    impl BootstrapStrategy for NoBootstrap {
        fn bootstrap(
            &self,
            _conn: &Connection,
            _days: u64,
            _table: &str,
        ) -> Result<(), AggregationError> {
            Ok(())
        }

        fn bootstrap_on_epochs_behind(&self) -> u64 {
            1 << 40
        }

        fn bootstrap_bounds(&self, head: u64, days: u64) -> EpochBounds {
            let width = NetworkSpec::mainnet().window_epochs(days);
            EpochBounds {
                epoch_start: (head + 1).saturating_sub(width),
                epoch_end: head + 1,
            }
        }
    }

    fn incremental_aggregator() -> RollingAggregator {
        RollingAggregator::new(NetworkSpec::mainnet(), Box::new(NoBootstrap))
    }

    fn bounds_of(conn: &Connection, table: &str) -> EpochBounds {
        store::current_bounds(conn, table).unwrap().unwrap()
    }

    #[test]
    fn test_warming_build_from_genesis() {
        // d = 1, empty table, head 224: the window covers 0..=224 and is one
        // epoch short of steady
        let mut conn = open_test_db();
        seed_epochs(&conn, 0, 224, &[1, 2]);

        incremental_aggregator()
            .aggregate(&mut conn, 1, TABLE, 224)
            .unwrap();

        let bounds = bounds_of(&conn, TABLE);
        assert_eq!(bounds, EpochBounds { epoch_start: 0, epoch_end: 225 });
        assert_window_matches_fact_sums(&conn, TABLE, 0, 224, &[1, 2]);
        assert_eq!(read_cell(&conn, TABLE, 1, "balance_start"), None);
    }

    #[test]
    fn test_steady_advance_evicts_tail() {
        // continuing from the warming window: head 225 pushes epoch 0 out
        let mut conn = open_test_db();
        seed_epochs(&conn, 0, 225, &[1, 2]);
        let aggregator = incremental_aggregator();

        aggregator.aggregate(&mut conn, 1, TABLE, 224).unwrap();
        aggregator.aggregate(&mut conn, 1, TABLE, 225).unwrap();

        let bounds = bounds_of(&conn, TABLE);
        assert_eq!(bounds, EpochBounds { epoch_start: 1, epoch_end: 226 });
        assert_eq!(bounds.width(), 225);
        assert_window_matches_fact_sums(&conn, TABLE, 1, 225, &[1, 2]);

        // balance_start becomes the closing balance of evicted epoch 0
        assert_eq!(
            read_cell(&conn, TABLE, 1, "balance_start"),
            fact(0, 1).balance_end
        );
    }

    #[test]
    fn test_multi_epoch_advance_seven_day_window() {
        // previous bounds (0, 1575), head 1800: head adds 1575..=1800, tail
        // evicts 0..=225, landing on (226, 1801)
        let mut conn = open_test_db();
        seed_epochs(&conn, 0, 1800, &[1]);
        let aggregator = incremental_aggregator();

        aggregator.aggregate(&mut conn, 7, TABLE, 1574).unwrap();
        assert_eq!(
            bounds_of(&conn, TABLE),
            EpochBounds { epoch_start: 0, epoch_end: 1575 }
        );

        aggregator.aggregate(&mut conn, 7, TABLE, 1800).unwrap();
        let bounds = bounds_of(&conn, TABLE);
        assert_eq!(bounds, EpochBounds { epoch_start: 226, epoch_end: 1801 });
        assert_window_matches_fact_sums(&conn, TABLE, 226, 1800, &[1]);
        assert_eq!(
            read_cell(&conn, TABLE, 1, "balance_start"),
            fact(225, 1).balance_end
        );
    }

    #[test]
    fn test_repeated_head_is_a_no_op() {
        let mut conn = open_test_db();
        seed_epochs(&conn, 0, 300, &[1, 2]);
        let aggregator = incremental_aggregator();

        aggregator.aggregate(&mut conn, 1, TABLE, 224).unwrap();
        aggregator.aggregate(&mut conn, 1, TABLE, 300).unwrap();
        let before = bounds_of(&conn, TABLE);
        let reward_before = read_cell(&conn, TABLE, 1, "attestations_reward");

        aggregator.aggregate(&mut conn, 1, TABLE, 300).unwrap();
        assert_eq!(bounds_of(&conn, TABLE), before);
        assert_eq!(before, EpochBounds { epoch_start: 76, epoch_end: 301 });
        assert_eq!(
            read_cell(&conn, TABLE, 1, "attestations_reward"),
            reward_before
        );
        assert_window_matches_fact_sums(&conn, TABLE, 76, 300, &[1, 2]);
    }

    #[test]
    fn test_single_shot_catchup_from_empty_is_rejected() {
        // an empty table with a head beyond the window width cannot be built
        // incrementally in one shot; the width check must refuse it rather
        // than persist a mislabelled window
        let mut conn = open_test_db();
        seed_epochs(&conn, 0, 300, &[1]);

        let err = incremental_aggregator()
            .aggregate(&mut conn, 1, TABLE, 300)
            .unwrap_err();
        assert!(matches!(err, AggregationError::BoundsViolation { .. }));
        assert_eq!(store::current_bounds(&conn, TABLE).unwrap(), None);
    }

    #[test]
    fn test_missing_tail_epoch_fails_fast() {
        // epoch 150 absent: a short advance that keeps 150 out of the tail
        // succeeds, a longer one naming it in the tail fails
        let mut conn = open_test_db();
        seed_epochs(&conn, 0, 149, &[1]);
        seed_epochs(&conn, 151, 375, &[1]);
        let aggregator = incremental_aggregator();

        // warming build over 0..=149 only (gap stays outside the ranges)
        aggregator.aggregate(&mut conn, 1, TABLE, 149).unwrap();

        let err = aggregator
            .aggregate(&mut conn, 1, TABLE, 375)
            .unwrap_err();
        match err {
            AggregationError::MissingEpochs { section, epochs, .. } => {
                assert_eq!(section, "tail");
                assert_eq!(epochs, vec![150]);
            }
            other => panic!("expected MissingEpochs, got {other:?}"),
        }

        // failed advance left the window untouched
        assert_eq!(
            bounds_of(&conn, TABLE),
            EpochBounds { epoch_start: 0, epoch_end: 150 }
        );
    }

    #[test]
    fn test_missing_head_epoch_fails_fast() {
        let mut conn = open_test_db();
        seed_epochs(&conn, 0, 100, &[1]);
        seed_epochs(&conn, 102, 110, &[1]);
        let aggregator = incremental_aggregator();

        aggregator.aggregate(&mut conn, 1, TABLE, 100).unwrap();
        let err = aggregator.aggregate(&mut conn, 1, TABLE, 110).unwrap_err();
        match err {
            AggregationError::MissingEpochs { section, epochs, .. } => {
                assert_eq!(section, "head");
                assert_eq!(epochs, vec![101]);
            }
            other => panic!("expected MissingEpochs, got {other:?}"),
        }
    }

    #[test]
    fn test_validator_joining_mid_window() {
        // validator 9 first reports at epoch 230; after the advance all rows
        // share the global bounds and 9 carries only its own facts
        let mut conn = open_test_db();
        seed_epochs(&conn, 0, 229, &[1]);
        seed_epochs(&conn, 230, 260, &[1, 9]);
        let aggregator = incremental_aggregator();

        aggregator.aggregate(&mut conn, 1, TABLE, 229).unwrap();
        aggregator.aggregate(&mut conn, 1, TABLE, 260).unwrap();

        let bounds = bounds_of(&conn, TABLE);
        assert_eq!(bounds, EpochBounds { epoch_start: 36, epoch_end: 261 });
        assert_window_matches_fact_sums(&conn, TABLE, 36, 260, &[1, 9]);

        // every row, including the late joiner, agrees on epoch_start
        let distinct: i64 = conn
            .query_row(
                &format!("SELECT COUNT(DISTINCT epoch_start) FROM {TABLE}"),
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(distinct, 1);

        // joined after the window opened: no opening balance to snapshot
        assert_eq!(read_cell(&conn, TABLE, 9, "balance_start"), None);
    }

    #[test]
    fn test_validator_leaving_window_zeroes_out() {
        // validator 9 stops reporting at epoch 100; once the tail passes its
        // last fact, its additive columns return to zero
        let mut conn = open_test_db();
        seed_epochs(&conn, 0, 100, &[1, 9]);
        seed_epochs(&conn, 101, 450, &[1]);
        let aggregator = incremental_aggregator();

        aggregator.aggregate(&mut conn, 1, TABLE, 224).unwrap();
        aggregator.aggregate(&mut conn, 1, TABLE, 450).unwrap();

        assert_eq!(
            bounds_of(&conn, TABLE),
            EpochBounds { epoch_start: 226, epoch_end: 451 }
        );
        assert_eq!(read_cell(&conn, TABLE, 9, "attestations_reward"), Some(0));
        assert_eq!(read_cell(&conn, TABLE, 9, "deposits_amount"), Some(0));
        assert_window_matches_fact_sums(&conn, TABLE, 226, 450, &[1]);
    }

    #[test]
    fn test_slashing_survives_later_epochs() {
        let mut conn = open_test_db();
        seed_epochs(&conn, 0, 50, &[1]);
        let mut slashed = fact(51, 1);
        slashed.slashed = Some(true);
        slashed.slashed_by = Some(7);
        slashed.slashed_violation = Some(1);
        insert_epoch_fact(&conn, &slashed).unwrap();
        seed_epochs(&conn, 52, 120, &[1]);

        let aggregator = incremental_aggregator();
        aggregator.aggregate(&mut conn, 1, TABLE, 60).unwrap();
        aggregator.aggregate(&mut conn, 1, TABLE, 120).unwrap();

        assert_eq!(read_cell(&conn, TABLE, 1, "slashed"), Some(1));
        assert_eq!(read_cell(&conn, TABLE, 1, "slashed_by"), Some(7));
        assert_eq!(read_cell(&conn, TABLE, 1, "slashed_violation"), Some(1));
    }

    #[test]
    fn test_missing_tail_prediction_incremental() {
        let mut conn = open_test_db();
        seed_epochs(&conn, 0, 149, &[1]);
        seed_epochs(&conn, 151, 375, &[1]);
        let aggregator = incremental_aggregator();

        aggregator.aggregate(&mut conn, 1, TABLE, 149).unwrap();

        // next advance to 375 would evict 0..=150, and 150 is absent
        let missing = aggregator
            .missing_tail_epochs(&conn, 1, TABLE, 375)
            .unwrap();
        assert_eq!(missing, vec![150]);

        // advance to 300 keeps the gap out of the tail
        let missing = aggregator
            .missing_tail_epochs(&conn, 1, TABLE, 300)
            .unwrap();
        assert_eq!(missing, Vec::<u64>::new());
    }

    /// Day-aligned bounds math with a one-day lag threshold, no actual
    /// coarse source behind it.
    struct AlignedBounds;

    impl BootstrapStrategy for AlignedBounds {
        fn bootstrap(
            &self,
            _conn: &Connection,
            _days: u64,
            _table: &str,
        ) -> Result<(), AggregationError> {
            Ok(())
        }

        fn bootstrap_on_epochs_behind(&self) -> u64 {
            225
        }

        fn bootstrap_bounds(&self, head: u64, days: u64) -> EpochBounds {
            let epd = 225;
            let epoch_end = (head + 1) / epd * epd;
            EpochBounds {
                epoch_start: epoch_end.saturating_sub(days * epd),
                epoch_end,
            }
        }
    }

    #[test]
    fn test_missing_tail_prediction_uses_bootstrap_bounds_when_lagging() {
        let mut conn = open_test_db();
        // stale window far behind the intended head
        seed_epochs(&conn, 0, 325, &[1]);
        let aggregator = incremental_aggregator();
        aggregator.aggregate(&mut conn, 1, TABLE, 224).unwrap();
        aggregator.aggregate(&mut conn, 1, TABLE, 325).unwrap();

        // facts around the future head, with one hole in the predicted tail
        seed_epochs(&conn, 9675, 9699, &[1]);
        seed_epochs(&conn, 9701, 10000, &[1]);

        let aggregator =
            RollingAggregator::new(NetworkSpec::mainnet(), Box::new(AlignedBounds));
        // lag >= one day, so the predictor assumes post-bootstrap bounds
        // (9675, 9900) and a tail of 9675..=9775
        let missing = aggregator
            .missing_tail_epochs(&conn, 1, TABLE, 10000)
            .unwrap();
        assert_eq!(missing, vec![9700]);
    }
}
