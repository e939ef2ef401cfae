//! Database query functions for the `meal_plans` table.

use anyhow::{Context, Result};
use sqlx::PgExecutor;

use crate::models::{MealPlan, MealPlanPatch, NewMealPlan, PlanId};

/// Insert a meal plan under an already-allocated id.
pub async fn insert_meal_plan(
    executor: impl PgExecutor<'_>,
    meal_id: PlanId,
    new: &NewMealPlan,
) -> Result<MealPlan> {
    let plan = sqlx::query_as::<_, MealPlan>(
        "INSERT INTO meal_plans (meal_id, breakfast_recipe, lunch_recipe, dinner_recipe) \
         VALUES ($1, $2, $3, $4) \
         RETURNING *",
    )
    .bind(meal_id)
    .bind(new.breakfast_recipe)
    .bind(new.lunch_recipe)
    .bind(new.dinner_recipe)
    .fetch_one(executor)
    .await
    .context("failed to insert meal plan")?;

    Ok(plan)
}

/// Fetch a meal plan by its id.
pub async fn get_meal_plan(executor: impl PgExecutor<'_>, meal_id: PlanId) -> Result<Option<MealPlan>> {
    let plan = sqlx::query_as::<_, MealPlan>("SELECT * FROM meal_plans WHERE meal_id = $1")
        .bind(meal_id)
        .fetch_optional(executor)
        .await
        .context("failed to fetch meal plan")?;

    Ok(plan)
}

/// List one page of meal plans ordered by id.
pub async fn list_meal_plans(
    executor: impl PgExecutor<'_>,
    skip: i64,
    limit: i64,
) -> Result<Vec<MealPlan>> {
    let plans = sqlx::query_as::<_, MealPlan>(
        "SELECT * FROM meal_plans ORDER BY meal_id LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(skip)
    .fetch_all(executor)
    .await
    .context("failed to list meal plans")?;

    Ok(plans)
}

/// Apply a field-level patch. Returns `None` when no row has `meal_id`.
pub async fn update_meal_plan(
    executor: impl PgExecutor<'_>,
    meal_id: PlanId,
    patch: &MealPlanPatch,
) -> Result<Option<MealPlan>> {
    let plan = sqlx::query_as::<_, MealPlan>(
        "UPDATE meal_plans \
         SET breakfast_recipe = COALESCE($2, breakfast_recipe), \
             lunch_recipe = COALESCE($3, lunch_recipe), \
             dinner_recipe = COALESCE($4, dinner_recipe) \
         WHERE meal_id = $1 \
         RETURNING *",
    )
    .bind(meal_id)
    .bind(patch.breakfast_recipe)
    .bind(patch.lunch_recipe)
    .bind(patch.dinner_recipe)
    .fetch_optional(executor)
    .await
    .context("failed to update meal plan")?;

    Ok(plan)
}

/// Delete a meal plan row. Returns the number of rows removed.
pub async fn delete_meal_plan(executor: impl PgExecutor<'_>, meal_id: PlanId) -> Result<u64> {
    let result = sqlx::query("DELETE FROM meal_plans WHERE meal_id = $1")
        .bind(meal_id)
        .execute(executor)
        .await
        .context("failed to delete meal plan")?;

    Ok(result.rows_affected())
}
