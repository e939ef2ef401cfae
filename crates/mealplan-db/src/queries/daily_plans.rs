//! Database query functions for the `daily_meal_plans` table.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::PgExecutor;

use crate::models::{DailyPlan, DailyPlanWithMeal, PlanId};

/// Insert a daily plan under an already-allocated id.
pub async fn insert_daily_plan(
    executor: impl PgExecutor<'_>,
    day_plan_id: PlanId,
    week_plan_id: PlanId,
    date: NaiveDate,
    meal_id: PlanId,
) -> Result<DailyPlan> {
    let day = sqlx::query_as::<_, DailyPlan>(
        "INSERT INTO daily_meal_plans (day_plan_id, week_plan_id, date, meal_id) \
         VALUES ($1, $2, $3, $4) \
         RETURNING *",
    )
    .bind(day_plan_id)
    .bind(week_plan_id)
    .bind(date)
    .bind(meal_id)
    .fetch_one(executor)
    .await
    .context("failed to insert daily plan")?;

    Ok(day)
}

/// Fetch a daily plan by its id.
pub async fn get_daily_plan(
    executor: impl PgExecutor<'_>,
    day_plan_id: PlanId,
) -> Result<Option<DailyPlan>> {
    let day =
        sqlx::query_as::<_, DailyPlan>("SELECT * FROM daily_meal_plans WHERE day_plan_id = $1")
            .bind(day_plan_id)
            .fetch_optional(executor)
            .await
            .context("failed to fetch daily plan")?;

    Ok(day)
}

/// List one page of daily plans ordered by id.
pub async fn list_daily_plans(
    executor: impl PgExecutor<'_>,
    skip: i64,
    limit: i64,
) -> Result<Vec<DailyPlan>> {
    let days = sqlx::query_as::<_, DailyPlan>(
        "SELECT * FROM daily_meal_plans ORDER BY day_plan_id LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(skip)
    .fetch_all(executor)
    .await
    .context("failed to list daily plans")?;

    Ok(days)
}

/// All daily plans owned by a weekly plan, in date order.
pub async fn list_daily_plans_for_week(
    executor: impl PgExecutor<'_>,
    week_plan_id: PlanId,
) -> Result<Vec<DailyPlan>> {
    let days = sqlx::query_as::<_, DailyPlan>(
        "SELECT * FROM daily_meal_plans \
         WHERE week_plan_id = $1 \
         ORDER BY date, day_plan_id",
    )
    .bind(week_plan_id)
    .fetch_all(executor)
    .await
    .context("failed to list daily plans for week")?;

    Ok(days)
}

/// Daily plans scheduled on `date`, joined with their meal plan recipes.
pub async fn list_daily_plans_with_meals_on(
    executor: impl PgExecutor<'_>,
    date: NaiveDate,
) -> Result<Vec<DailyPlanWithMeal>> {
    let days = sqlx::query_as::<_, DailyPlanWithMeal>(
        "SELECT d.day_plan_id, d.week_plan_id, d.date, d.meal_id, \
                m.breakfast_recipe, m.lunch_recipe, m.dinner_recipe \
         FROM daily_meal_plans d \
         JOIN meal_plans m ON m.meal_id = d.meal_id \
         WHERE d.date = $1 \
         ORDER BY d.day_plan_id",
    )
    .bind(date)
    .fetch_all(executor)
    .await
    .with_context(|| format!("failed to list daily plans on {date}"))?;

    Ok(days)
}

/// Count the daily plans of a week whose date would fall outside
/// `[start_date, end_date]`.
pub async fn count_daily_plans_outside(
    executor: impl PgExecutor<'_>,
    week_plan_id: PlanId,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM daily_meal_plans \
         WHERE week_plan_id = $1 AND (date < $2 OR date > $3)",
    )
    .bind(week_plan_id)
    .bind(start_date)
    .bind(end_date)
    .fetch_one(executor)
    .await
    .context("failed to count daily plans outside week range")?;

    Ok(count)
}

/// Read the meal plan referenced by a daily plan, locking the daily row for
/// the rest of the transaction. Returns `None` when the daily plan is absent.
pub async fn lock_daily_plan_meal_id(
    executor: impl PgExecutor<'_>,
    day_plan_id: PlanId,
) -> Result<Option<PlanId>> {
    let meal_id: Option<PlanId> = sqlx::query_scalar(
        "SELECT meal_id FROM daily_meal_plans WHERE day_plan_id = $1 FOR UPDATE",
    )
    .bind(day_plan_id)
    .fetch_optional(executor)
    .await
    .context("failed to look up meal plan of daily plan")?;

    Ok(meal_id)
}

/// Move a daily plan to another date. Returns `None` when no row has
/// `day_plan_id`.
pub async fn update_daily_plan_date(
    executor: impl PgExecutor<'_>,
    day_plan_id: PlanId,
    date: NaiveDate,
) -> Result<Option<DailyPlan>> {
    let day = sqlx::query_as::<_, DailyPlan>(
        "UPDATE daily_meal_plans SET date = $2 WHERE day_plan_id = $1 RETURNING *",
    )
    .bind(day_plan_id)
    .bind(date)
    .fetch_optional(executor)
    .await
    .context("failed to update daily plan")?;

    Ok(day)
}

/// Delete a daily plan row. Returns the number of rows removed.
pub async fn delete_daily_plan(executor: impl PgExecutor<'_>, day_plan_id: PlanId) -> Result<u64> {
    let result = sqlx::query("DELETE FROM daily_meal_plans WHERE day_plan_id = $1")
        .bind(day_plan_id)
        .execute(executor)
        .await
        .context("failed to delete daily plan")?;

    Ok(result.rows_affected())
}

/// Delete every daily plan owned by a weekly plan. Returns the number of rows
/// removed.
pub async fn delete_daily_plans_for_week(
    executor: impl PgExecutor<'_>,
    week_plan_id: PlanId,
) -> Result<u64> {
    let result = sqlx::query("DELETE FROM daily_meal_plans WHERE week_plan_id = $1")
        .bind(week_plan_id)
        .execute(executor)
        .await
        .context("failed to delete daily plans for week")?;

    Ok(result.rows_affected())
}
