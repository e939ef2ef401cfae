//! Planner service layer.
//!
//! The operation set behind the HTTP surface: create, get, update, delete
//! and paginated listing for each level of the hierarchy, plus
//! resolve-or-create of daily plans by date. Every write runs in a single
//! transaction; every operation is bounded by the planner's optional
//! deadline, and a timed-out operation drops its transaction, rolling it
//! back.

use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use chrono::NaiveDate;
use serde::Serialize;
use sqlx::PgPool;
use tracing::info;

use mealplan_db::models::{
    DailyPlan, DailyPlanPatch, DailyPlanWithMeal, MealPlan, MealPlanPatch, NewDailyPlan,
    NewMealPlan, PlanId, PlanKind, WeeklyPlan, WeeklyPlanPatch,
};
use mealplan_db::queries::{self, daily_plans, meal_plans, weekly_plans};

use crate::allocator;
use crate::cascade::{self, CascadeReport};
use crate::error::PlanError;
use crate::pagination::{Page, PageRequest, build_links};
use crate::resolver::{self, ResolvedDay};

/// Everything planned for one date.
#[derive(Debug, Clone, Serialize)]
pub struct DatePlans {
    /// Weekly plans whose range contains the date.
    pub weekly_plans: Vec<WeeklyPlan>,
    /// Daily plans on the date, with their recipes.
    pub meals: Vec<DailyPlanWithMeal>,
}

impl DatePlans {
    pub fn is_empty(&self) -> bool {
        self.weekly_plans.is_empty() && self.meals.is_empty()
    }
}

/// Entry point for every hierarchy operation.
#[derive(Debug, Clone)]
pub struct Planner {
    pool: PgPool,
    deadline: Option<Duration>,
}

impl Planner {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            deadline: None,
        }
    }

    /// Bound every operation by `deadline` (`None` disables the bound).
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn within<T>(
        &self,
        op: impl Future<Output = Result<T, PlanError>>,
    ) -> Result<T, PlanError> {
        match self.deadline {
            Some(limit) => tokio::time::timeout(limit, op)
                .await
                .map_err(|_| PlanError::DeadlineExceeded(limit))?,
            None => op.await,
        }
    }

    async fn page<T>(
        &self,
        kind: PlanKind,
        base_url: &str,
        page: PageRequest,
        items: Vec<T>,
    ) -> Result<Page<T>, PlanError> {
        let total = queries::count(&self.pool, kind).await?;
        Ok(Page {
            items,
            links: build_links(base_url, page.skip, page.limit, total),
        })
    }

    /// Delete any entity through the cascade coordinator.
    pub async fn delete(&self, kind: PlanKind, id: PlanId) -> Result<CascadeReport, PlanError> {
        self.within(cascade::delete(&self.pool, kind, id)).await
    }

    // -----------------------------------------------------------------------
    // Meal plans
    // -----------------------------------------------------------------------

    pub async fn create_meal_plan(&self, new: &NewMealPlan) -> Result<MealPlan, PlanError> {
        self.within(async {
            let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
            let meal_id = allocator::next_id(&mut *tx, PlanKind::MealPlan).await?;
            let plan = meal_plans::insert_meal_plan(&mut *tx, meal_id, new).await?;
            tx.commit().await.context("failed to commit transaction")?;

            info!(meal_id, "created meal plan");
            Ok(plan)
        })
        .await
    }

    pub async fn get_meal_plan(&self, meal_id: PlanId) -> Result<Option<MealPlan>, PlanError> {
        self.within(async { Ok(meal_plans::get_meal_plan(&self.pool, meal_id).await?) })
            .await
    }

    pub async fn list_meal_plans(
        &self,
        page: PageRequest,
        base_url: &str,
    ) -> Result<Page<MealPlan>, PlanError> {
        self.within(async {
            let items = meal_plans::list_meal_plans(&self.pool, page.skip, page.limit).await?;
            self.page(PlanKind::MealPlan, base_url, page, items).await
        })
        .await
    }

    pub async fn update_meal_plan(
        &self,
        meal_id: PlanId,
        patch: &MealPlanPatch,
    ) -> Result<MealPlan, PlanError> {
        self.within(async {
            meal_plans::update_meal_plan(&self.pool, meal_id, patch)
                .await?
                .ok_or(PlanError::NotFound {
                    kind: PlanKind::MealPlan,
                    id: meal_id,
                })
        })
        .await
    }

    pub async fn delete_meal_plan(&self, meal_id: PlanId) -> Result<CascadeReport, PlanError> {
        self.delete(PlanKind::MealPlan, meal_id).await
    }

    // -----------------------------------------------------------------------
    // Weekly plans
    // -----------------------------------------------------------------------

    /// Create a weekly plan spanning `start_date ..= start_date + 6 days`.
    ///
    /// Does not check for overlap with existing weekly plans.
    pub async fn create_weekly_plan(&self, start_date: NaiveDate) -> Result<WeeklyPlan, PlanError> {
        self.within(async {
            let (start_date, end_date) = resolver::bucket_range(start_date)?;
            let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
            let id = allocator::next_id(&mut *tx, PlanKind::WeeklyPlan).await?;
            let week = weekly_plans::insert_weekly_plan(&mut *tx, id, start_date, end_date).await?;
            tx.commit().await.context("failed to commit transaction")?;

            info!(week_plan_id = id, %start_date, %end_date, "created weekly plan");
            Ok(week)
        })
        .await
    }

    pub async fn get_weekly_plan(&self, week_plan_id: PlanId) -> Result<Option<WeeklyPlan>, PlanError> {
        self.within(async { Ok(weekly_plans::get_weekly_plan(&self.pool, week_plan_id).await?) })
            .await
    }

    pub async fn list_weekly_plans(
        &self,
        page: PageRequest,
        base_url: &str,
    ) -> Result<Page<WeeklyPlan>, PlanError> {
        self.within(async {
            let items = weekly_plans::list_weekly_plans(&self.pool, page.skip, page.limit).await?;
            self.page(PlanKind::WeeklyPlan, base_url, page, items).await
        })
        .await
    }

    /// Move a weekly plan to a new start date.
    ///
    /// Fails with [`PlanError::IntegrityViolation`] if any of its daily plans
    /// would fall outside the new range.
    pub async fn update_weekly_plan(
        &self,
        week_plan_id: PlanId,
        patch: &WeeklyPlanPatch,
    ) -> Result<WeeklyPlan, PlanError> {
        self.within(async {
            let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
            queries::lock_table(&mut *tx, PlanKind::WeeklyPlan).await?;

            let current = weekly_plans::get_weekly_plan(&mut *tx, week_plan_id)
                .await?
                .ok_or(PlanError::NotFound {
                    kind: PlanKind::WeeklyPlan,
                    id: week_plan_id,
                })?;
            let Some(start_date) = patch.start_date else {
                return Ok(current);
            };
            let (start_date, end_date) = resolver::bucket_range(start_date)?;

            let stranded =
                daily_plans::count_daily_plans_outside(&mut *tx, week_plan_id, start_date, end_date)
                    .await?;
            if stranded > 0 {
                return Err(PlanError::IntegrityViolation(format!(
                    "moving weekly plan {week_plan_id} to {start_date}..{end_date} \
                     would leave {stranded} daily plan(s) outside the week"
                )));
            }

            let week = weekly_plans::update_weekly_plan_range(&mut *tx, week_plan_id, start_date, end_date)
                .await?
                .ok_or(PlanError::NotFound {
                    kind: PlanKind::WeeklyPlan,
                    id: week_plan_id,
                })?;
            tx.commit().await.context("failed to commit transaction")?;
            Ok(week)
        })
        .await
    }

    pub async fn delete_weekly_plan(&self, week_plan_id: PlanId) -> Result<CascadeReport, PlanError> {
        self.delete(PlanKind::WeeklyPlan, week_plan_id).await
    }

    /// Daily plans of a weekly plan, or `None` when the week does not exist.
    pub async fn daily_plans_for_week(
        &self,
        week_plan_id: PlanId,
    ) -> Result<Option<Vec<DailyPlan>>, PlanError> {
        self.within(async {
            if weekly_plans::get_weekly_plan(&self.pool, week_plan_id)
                .await?
                .is_none()
            {
                return Ok(None);
            }
            let days = daily_plans::list_daily_plans_for_week(&self.pool, week_plan_id).await?;
            Ok(Some(days))
        })
        .await
    }

    /// Weekly plans containing `date` and the meals planned on it.
    pub async fn plans_for_date(&self, date: NaiveDate) -> Result<DatePlans, PlanError> {
        self.within(async {
            let weekly_plans = weekly_plans::weekly_plans_containing(&self.pool, date).await?;
            let meals = daily_plans::list_daily_plans_with_meals_on(&self.pool, date).await?;
            Ok(DatePlans {
                weekly_plans,
                meals,
            })
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Daily plans
    // -----------------------------------------------------------------------

    /// Resolve-or-create: insert a daily plan for `date`, reusing the weekly
    /// plan containing it or creating one that starts on `date`.
    pub async fn resolve_daily_plan(
        &self,
        date: NaiveDate,
        meal_id: PlanId,
    ) -> Result<ResolvedDay, PlanError> {
        self.within(async {
            let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
            let resolved = resolver::create_daily_plan_for_date(&mut *tx, date, meal_id).await?;
            tx.commit().await.context("failed to commit transaction")?;
            Ok(resolved)
        })
        .await
    }

    /// Create a daily plan, resolving its week from the date unless an
    /// explicit `week_plan_id` is given.
    pub async fn create_daily_plan(&self, new: &NewDailyPlan) -> Result<DailyPlan, PlanError> {
        let Some(week_plan_id) = new.week_plan_id else {
            return Ok(self.resolve_daily_plan(new.date, new.meal_id).await?.day);
        };

        self.within(async {
            let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
            queries::lock_table(&mut *tx, PlanKind::WeeklyPlan).await?;

            let week = weekly_plans::get_weekly_plan(&mut *tx, week_plan_id)
                .await?
                .ok_or_else(|| {
                    PlanError::IntegrityViolation(format!("weekly plan {week_plan_id} does not exist"))
                })?;
            if !week.contains(new.date) {
                return Err(PlanError::IntegrityViolation(format!(
                    "date {} is outside weekly plan {week_plan_id} ({}..{})",
                    new.date, week.start_date, week.end_date
                )));
            }

            let day_plan_id = allocator::next_id(&mut *tx, PlanKind::DailyPlan).await?;
            let day = daily_plans::insert_daily_plan(
                &mut *tx,
                day_plan_id,
                week_plan_id,
                new.date,
                new.meal_id,
            )
            .await?;
            tx.commit().await.context("failed to commit transaction")?;

            info!(day_plan_id, week_plan_id, date = %new.date, "created daily plan");
            Ok(day)
        })
        .await
    }

    pub async fn get_daily_plan(&self, day_plan_id: PlanId) -> Result<Option<DailyPlan>, PlanError> {
        self.within(async { Ok(daily_plans::get_daily_plan(&self.pool, day_plan_id).await?) })
            .await
    }

    pub async fn list_daily_plans(
        &self,
        page: PageRequest,
        base_url: &str,
    ) -> Result<Page<DailyPlan>, PlanError> {
        self.within(async {
            let items = daily_plans::list_daily_plans(&self.pool, page.skip, page.limit).await?;
            self.page(PlanKind::DailyPlan, base_url, page, items).await
        })
        .await
    }

    /// Move a daily plan to another date inside its weekly plan.
    pub async fn update_daily_plan(
        &self,
        day_plan_id: PlanId,
        patch: &DailyPlanPatch,
    ) -> Result<DailyPlan, PlanError> {
        self.within(async {
            let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
            queries::lock_table(&mut *tx, PlanKind::WeeklyPlan).await?;

            let current = daily_plans::get_daily_plan(&mut *tx, day_plan_id)
                .await?
                .ok_or(PlanError::NotFound {
                    kind: PlanKind::DailyPlan,
                    id: day_plan_id,
                })?;
            let Some(date) = patch.date else {
                return Ok(current);
            };

            let week = weekly_plans::get_weekly_plan(&mut *tx, current.week_plan_id)
                .await?
                .ok_or_else(|| {
                    PlanError::IntegrityViolation(format!(
                        "daily plan {day_plan_id} references missing weekly plan {}",
                        current.week_plan_id
                    ))
                })?;
            if !week.contains(date) {
                return Err(PlanError::IntegrityViolation(format!(
                    "date {date} is outside weekly plan {} ({}..{})",
                    week.week_plan_id, week.start_date, week.end_date
                )));
            }

            let day = daily_plans::update_daily_plan_date(&mut *tx, day_plan_id, date)
                .await?
                .ok_or(PlanError::NotFound {
                    kind: PlanKind::DailyPlan,
                    id: day_plan_id,
                })?;
            tx.commit().await.context("failed to commit transaction")?;
            Ok(day)
        })
        .await
    }

    pub async fn delete_daily_plan(&self, day_plan_id: PlanId) -> Result<CascadeReport, PlanError> {
        self.delete(PlanKind::DailyPlan, day_plan_id).await
    }
}
