//! Cascading deletes across the hierarchy.
//!
//! | Deleted      | Also deleted                         |
//! |--------------|--------------------------------------|
//! | weekly plan  | every daily plan of the week         |
//! | daily plan   | the meal plan it references          |
//! | meal plan    | nothing                              |
//!
//! Deleting a weekly plan does not remove the meal plans of its days; those
//! rows are left in place.
//!
//! Every call runs in one transaction. A failure at any step drops the
//! transaction, which rolls back every delete already issued.

use anyhow::Context;
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use tracing::{info, warn};

use mealplan_db::models::{PlanId, PlanKind};
use mealplan_db::queries::{self, daily_plans, meal_plans, weekly_plans};

use crate::error::PlanError;

/// Rows removed by one cascading delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    pub weekly_plans: u64,
    pub daily_plans: u64,
    pub meal_plans: u64,
}

/// Delete `kind`/`id` and everything that exists only because of it.
///
/// Returns [`PlanError::NotFound`] when the row does not exist (nothing is
/// changed). Any other failure is rolled back and reported as
/// [`PlanError::DeletionFailed`] wrapping the cause.
pub async fn delete(pool: &PgPool, kind: PlanKind, id: PlanId) -> Result<CascadeReport, PlanError> {
    let result = async {
        let mut tx = pool.begin().await.context("failed to begin transaction")?;
        let report = cascade(&mut *tx, kind, id).await?;
        tx.commit().await.context("failed to commit transaction")?;
        Ok::<_, PlanError>(report)
    }
    .await;

    match result {
        Ok(report) => {
            info!(
                table = %kind,
                id,
                weekly_plans = report.weekly_plans,
                daily_plans = report.daily_plans,
                meal_plans = report.meal_plans,
                "cascade delete committed"
            );
            Ok(report)
        }
        Err(err @ PlanError::NotFound { .. }) => Err(err),
        Err(err) => {
            warn!(table = %kind, id, error = %err, "cascade delete rolled back");
            Err(PlanError::DeletionFailed {
                kind,
                id,
                source: Box::new(err),
            })
        }
    }
}

/// Issue the deletes for one cascade on `conn` without committing.
pub async fn cascade(
    conn: &mut PgConnection,
    kind: PlanKind,
    id: PlanId,
) -> Result<CascadeReport, PlanError> {
    let mut report = CascadeReport::default();

    match kind {
        PlanKind::WeeklyPlan => {
            // Serialize with bucket resolution so a day cannot be attached to
            // a week that is being deleted.
            queries::lock_table(&mut *conn, PlanKind::WeeklyPlan).await?;
            report.daily_plans = daily_plans::delete_daily_plans_for_week(&mut *conn, id).await?;
            report.weekly_plans = weekly_plans::delete_weekly_plan(&mut *conn, id).await?;
            if report.weekly_plans == 0 {
                return Err(PlanError::NotFound { kind, id });
            }
        }
        PlanKind::DailyPlan => {
            let meal_id = daily_plans::lock_daily_plan_meal_id(&mut *conn, id)
                .await?
                .ok_or(PlanError::NotFound { kind, id })?;
            // The daily row goes first: it holds the foreign key to the meal.
            report.daily_plans = daily_plans::delete_daily_plan(&mut *conn, id).await?;
            report.meal_plans = meal_plans::delete_meal_plan(&mut *conn, meal_id).await?;
        }
        PlanKind::MealPlan => {
            report.meal_plans = meal_plans::delete_meal_plan(&mut *conn, id).await?;
            if report.meal_plans == 0 {
                return Err(PlanError::NotFound { kind, id });
            }
        }
    }

    Ok(report)
}
