//! Parameterised additive upsert
//!
//! One statement drives every head-side aggregation in the engine: the
//! rolling windows, the unbounded total, and the day/hour bucket tables all
//! add epochs through `add_to_rolling_custom`, differing only in the
//! parameter record. The optional snippets inject a balance-start subquery
//! and a partition column; rendering is pure text substitution with no
//! control flow.

use super::columns;
use super::error::AggregationError;
use rusqlite::{params, Connection};

/// Parameters for one additive upsert. The epoch range is inclusive on both
/// ends. Optional snippet fields default to empty; non-empty snippets must
/// carry their own trailing comma (or, for the join, be a complete JOIN
/// clause) since they are spliced into the statement verbatim.
#[derive(Debug, Clone, Default)]
pub struct CustomRolling<'a> {
    /// First epoch to aggregate, inclusive.
    pub start_epoch: u64,
    /// Last epoch to aggregate, inclusive. Becomes `epoch_end - 1`.
    pub end_epoch: u64,
    /// `epoch_start` written for validators inserted by this statement.
    /// Existing rows never have their `epoch_start` touched here; that
    /// belongs to the tail accounting.
    pub start_bound_epoch: u64,
    pub table_from: &'a str,
    pub table_to: &'a str,
    pub table_from_epoch_column: &'a str,
    /// Conflict target, e.g. `(validator_index)` or `(validator_index, day)`.
    pub table_conflict: &'a str,

    /// Optional CTE providing `tail_balance_starts(validator_index,
    /// balance_start)`, ending with a comma.
    pub tail_balances_query: String,
    /// Optional JOIN clause attaching the CTE to `aggregate_head`.
    pub tail_balances_join_query: String,
    /// Optional value expression for the inserted `balance_start`, ending
    /// with a comma. Defaults to a null column.
    pub tail_balances_insert_column_query: String,
    /// Optional partition column, e.g. `day,`.
    pub table_day_column: String,
    /// Optional partition value expression, e.g. `5 AS day,`.
    pub table_day_value: String,
}

/// Aggregates the fact range per validator and upserts it into the
/// destination: fresh validators are inserted with the supplied bounds,
/// existing rows are merged additively (max-merged for the slashing fields,
/// overwritten for `epoch_end` and `balance_end`). Returns the number of
/// rows written.
pub fn add_to_rolling_custom(
    conn: &Connection,
    custom: CustomRolling<'_>,
) -> Result<usize, AggregationError> {
    let balance_start_column = if custom.tail_balances_insert_column_query.is_empty() {
        "null AS balance_start,"
    } else {
        custom.tail_balances_insert_column_query.as_str()
    };

    let sql = format!(
        "WITH
        head_balance_ends AS (
            SELECT validator_index, balance_end FROM {table_from}
            WHERE {epoch_column} = ?2
        ),
        {tail_balances_query}
        aggregate_head AS (
            SELECT
            validator_index,
            {aggregate_select}
            FROM {table_from}
            WHERE {epoch_column} >= ?1 AND {epoch_column} <= ?2
            GROUP BY validator_index
        )
        INSERT INTO {table_to} (
            {day_column}
            epoch_start,
            epoch_end,
            validator_index,
            {metric_columns},
            balance_start,
            balance_end
        )
        SELECT
            {day_value}
            ?3 AS epoch_start,
            ?2 + 1 AS epoch_end,
            aggregate_head.validator_index AS validator_index,
            {metric_values},
            {balance_start_column}
            head_balance_ends.balance_end AS balance_end
        FROM aggregate_head
        {tail_balances_join}
        LEFT JOIN head_balance_ends
            ON head_balance_ends.validator_index = aggregate_head.validator_index
        WHERE true
        ON CONFLICT {conflict} DO UPDATE SET
            {add_assignments},
            {max_assignments},
            epoch_end = excluded.epoch_end,
            balance_end = COALESCE(excluded.balance_end, {table_to}.balance_end)",
        table_from = custom.table_from,
        table_to = custom.table_to,
        epoch_column = custom.table_from_epoch_column,
        conflict = custom.table_conflict,
        tail_balances_query = custom.tail_balances_query,
        tail_balances_join = custom.tail_balances_join_query,
        day_column = custom.table_day_column,
        day_value = custom.table_day_value,
        balance_start_column = balance_start_column,
        aggregate_select = columns::aggregate_select_list(),
        metric_columns = columns::metric_column_list(),
        metric_values = columns::metric_value_list("aggregate_head"),
        add_assignments = columns::conflict_add_assignments(custom.table_to),
        max_assignments = columns::conflict_max_assignments(custom.table_to),
    );

    let affected = conn
        .execute(
            &sql,
            params![
                custom.start_epoch as i64,
                custom.end_epoch as i64,
                custom.start_bound_epoch as i64,
            ],
        )
        .map_err(|e| AggregationError::from_storage(e, custom.table_to))?;

    log::debug!(
        "📝 added epochs {} - {} into {} ({} rows)",
        custom.start_epoch,
        custom.end_epoch,
        custom.table_to,
        affected
    );
    Ok(affected)
}
