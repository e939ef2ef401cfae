//! Per-table query functions plus the table-generic primitives shared by
//! every level of the hierarchy.
//!
//! Table and column names interpolated into SQL always come from
//! [`PlanKind`], never from caller input.

pub mod daily_plans;
pub mod meal_plans;
pub mod weekly_plans;

use anyhow::{Context, Result};
use sqlx::{PgConnection, PgExecutor};

use crate::models::{PlanId, PlanKind};

/// Count the rows of a hierarchy table.
pub async fn count(executor: impl PgExecutor<'_>, kind: PlanKind) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", kind.table());
    let count: i64 = sqlx::query_scalar(&sql)
        .fetch_one(executor)
        .await
        .with_context(|| format!("failed to count rows in {kind}"))?;

    Ok(count)
}

/// Current maximum primary-key value of a table, `0` when the table is empty.
pub async fn max_id(executor: impl PgExecutor<'_>, kind: PlanKind) -> Result<PlanId> {
    let sql = format!(
        "SELECT COALESCE(MAX({pk}), 0)::BIGINT FROM {table}",
        pk = kind.primary_key(),
        table = kind.table(),
    );
    let max: PlanId = sqlx::query_scalar(&sql)
        .fetch_one(executor)
        .await
        .with_context(|| format!("failed to read max {} from {kind}", kind.primary_key()))?;

    Ok(max)
}

/// Take the transaction-scoped advisory lock guarding writes to `kind`'s
/// table.
///
/// Blocks until any other transaction holding the same lock finishes. The
/// lock is released by PostgreSQL when the enclosing transaction commits or
/// rolls back, so `conn` must be inside a transaction.
pub async fn lock_table(conn: &mut PgConnection, kind: PlanKind) -> Result<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext('mealplan:' || $1))")
        .bind(kind.table())
        .execute(conn)
        .await
        .with_context(|| format!("failed to lock {kind}"))?;

    Ok(())
}
