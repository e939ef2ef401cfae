//! Database query functions for the `weekly_meal_plans` table.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::PgExecutor;

use crate::models::{PlanId, WeeklyPlan};

/// Insert a weekly plan under an already-allocated id.
pub async fn insert_weekly_plan(
    executor: impl PgExecutor<'_>,
    week_plan_id: PlanId,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<WeeklyPlan> {
    let week = sqlx::query_as::<_, WeeklyPlan>(
        "INSERT INTO weekly_meal_plans (week_plan_id, start_date, end_date) \
         VALUES ($1, $2, $3) \
         RETURNING *",
    )
    .bind(week_plan_id)
    .bind(start_date)
    .bind(end_date)
    .fetch_one(executor)
    .await
    .context("failed to insert weekly plan")?;

    Ok(week)
}

/// Fetch a weekly plan by its id.
pub async fn get_weekly_plan(
    executor: impl PgExecutor<'_>,
    week_plan_id: PlanId,
) -> Result<Option<WeeklyPlan>> {
    let week =
        sqlx::query_as::<_, WeeklyPlan>("SELECT * FROM weekly_meal_plans WHERE week_plan_id = $1")
            .bind(week_plan_id)
            .fetch_optional(executor)
            .await
            .context("failed to fetch weekly plan")?;

    Ok(week)
}

/// List one page of weekly plans ordered by id.
pub async fn list_weekly_plans(
    executor: impl PgExecutor<'_>,
    skip: i64,
    limit: i64,
) -> Result<Vec<WeeklyPlan>> {
    let weeks = sqlx::query_as::<_, WeeklyPlan>(
        "SELECT * FROM weekly_meal_plans ORDER BY week_plan_id LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(skip)
    .fetch_all(executor)
    .await
    .context("failed to list weekly plans")?;

    Ok(weeks)
}

/// All weekly plans whose `[start_date, end_date]` range contains `date`.
///
/// More than one row means buckets overlap; callers decide how to treat it.
pub async fn weekly_plans_containing(
    executor: impl PgExecutor<'_>,
    date: NaiveDate,
) -> Result<Vec<WeeklyPlan>> {
    let weeks = sqlx::query_as::<_, WeeklyPlan>(
        "SELECT * FROM weekly_meal_plans \
         WHERE $1 BETWEEN start_date AND end_date \
         ORDER BY week_plan_id",
    )
    .bind(date)
    .fetch_all(executor)
    .await
    .with_context(|| format!("failed to look up weekly plans containing {date}"))?;

    Ok(weeks)
}

/// Move a weekly plan's range. Returns `None` when no row has `week_plan_id`.
pub async fn update_weekly_plan_range(
    executor: impl PgExecutor<'_>,
    week_plan_id: PlanId,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<Option<WeeklyPlan>> {
    let week = sqlx::query_as::<_, WeeklyPlan>(
        "UPDATE weekly_meal_plans \
         SET start_date = $2, end_date = $3 \
         WHERE week_plan_id = $1 \
         RETURNING *",
    )
    .bind(week_plan_id)
    .bind(start_date)
    .bind(end_date)
    .fetch_optional(executor)
    .await
    .context("failed to update weekly plan")?;

    Ok(week)
}

/// Delete a weekly plan row. Returns the number of rows removed.
pub async fn delete_weekly_plan(executor: impl PgExecutor<'_>, week_plan_id: PlanId) -> Result<u64> {
    let result = sqlx::query("DELETE FROM weekly_meal_plans WHERE week_plan_id = $1")
        .bind(week_plan_id)
        .execute(executor)
        .await
        .context("failed to delete weekly plan")?;

    Ok(result.rows_affected())
}
