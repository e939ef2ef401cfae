use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Primary-key type shared by every hierarchy table.
pub type PlanId = i64;

// ---------------------------------------------------------------------------
// Entity kind
// ---------------------------------------------------------------------------

/// The three levels of the planning hierarchy.
///
/// Carries the table metadata for each level so that table dispatch is a
/// `match` instead of string comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    MealPlan,
    WeeklyPlan,
    DailyPlan,
}

impl PlanKind {
    /// Every kind, leaves first.
    pub const ALL: [PlanKind; 3] = [Self::MealPlan, Self::WeeklyPlan, Self::DailyPlan];

    /// Name of the backing table.
    pub const fn table(self) -> &'static str {
        match self {
            Self::MealPlan => "meal_plans",
            Self::WeeklyPlan => "weekly_meal_plans",
            Self::DailyPlan => "daily_meal_plans",
        }
    }

    /// Primary-key column of the backing table.
    pub const fn primary_key(self) -> &'static str {
        match self {
            Self::MealPlan => "meal_id",
            Self::WeeklyPlan => "week_plan_id",
            Self::DailyPlan => "day_plan_id",
        }
    }

    /// Human-readable label used in error messages.
    pub const fn label(self) -> &'static str {
        match self {
            Self::MealPlan => "meal plan",
            Self::WeeklyPlan => "weekly plan",
            Self::DailyPlan => "daily plan",
        }
    }
}

impl fmt::Display for PlanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// Breakfast, lunch and dinner recipe references for one day.
///
/// Recipe ids point into an external catalog and are not checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct MealPlan {
    pub meal_id: PlanId,
    pub breakfast_recipe: Option<i64>,
    pub lunch_recipe: Option<i64>,
    pub dinner_recipe: Option<i64>,
}

/// A seven-day bucket grouping daily plans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct WeeklyPlan {
    pub week_plan_id: PlanId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl WeeklyPlan {
    /// Whether `date` falls inside `[start_date, end_date]`.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

/// A single date bound to a meal plan, owned by a weekly plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct DailyPlan {
    pub day_plan_id: PlanId,
    pub week_plan_id: PlanId,
    pub date: NaiveDate,
    pub meal_id: PlanId,
}

/// A daily plan joined with the recipes of its meal plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct DailyPlanWithMeal {
    pub day_plan_id: PlanId,
    pub week_plan_id: PlanId,
    pub date: NaiveDate,
    pub meal_id: PlanId,
    pub breakfast_recipe: Option<i64>,
    pub lunch_recipe: Option<i64>,
    pub dinner_recipe: Option<i64>,
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Recipe references for a new meal plan. The id is allocated on insert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMealPlan {
    #[serde(default)]
    pub breakfast_recipe: Option<i64>,
    #[serde(default)]
    pub lunch_recipe: Option<i64>,
    #[serde(default)]
    pub dinner_recipe: Option<i64>,
}

/// A daily plan to create.
///
/// Without `week_plan_id` the owning weekly plan is resolved (or created)
/// from `date`. With it, the daily plan is attached to that week directly and
/// `date` must fall inside the week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDailyPlan {
    pub date: NaiveDate,
    pub meal_id: PlanId,
    #[serde(default)]
    pub week_plan_id: Option<PlanId>,
}

/// Field-level update of a meal plan. Absent fields are left unchanged.
///
/// There is no `meal_id` field: identifiers are immutable once assigned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealPlanPatch {
    #[serde(default)]
    pub breakfast_recipe: Option<i64>,
    #[serde(default)]
    pub lunch_recipe: Option<i64>,
    #[serde(default)]
    pub dinner_recipe: Option<i64>,
}

/// Field-level update of a weekly plan.
///
/// Only the start date can move; the end date is always recomputed as
/// `start_date + 6 days`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyPlanPatch {
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
}

/// Field-level update of a daily plan.
///
/// `week_plan_id` and `meal_id` are foreign keys and cannot be changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyPlanPatch {
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
