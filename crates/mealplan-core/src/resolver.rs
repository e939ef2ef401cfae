//! Resolve-or-create of weekly buckets.
//!
//! A date is resolved to the weekly plan whose `[start_date, end_date]`
//! range contains it. When no bucket contains the date, a new seven-day
//! bucket is created starting on that exact date. Buckets are not snapped
//! to a weekday, so buckets created from unrelated dates can be gapped or
//! overlap; a date covered by more than one bucket is reported as
//! [`PlanError::BucketOverlap`].

use chrono::{Days, NaiveDate};
use sqlx::PgConnection;
use tracing::{debug, info, warn};

use mealplan_db::models::{DailyPlan, PlanId, PlanKind, WeeklyPlan};
use mealplan_db::queries::{self, daily_plans, weekly_plans};

use crate::allocator;
use crate::error::PlanError;

/// Days between a bucket's start and end date (inclusive seven-day span).
pub const BUCKET_SPAN_DAYS: u64 = 6;

/// Outcome of resolving a date to its weekly bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekResolution {
    pub week: WeeklyPlan,
    /// `true` when the bucket was created by this resolution.
    pub created: bool,
}

/// A daily plan inserted through the resolver, with the bucket it landed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDay {
    pub day: DailyPlan,
    pub week: WeeklyPlan,
    pub week_created: bool,
}

/// The `[start, start + 6 days]` range of a bucket starting on `start`.
pub fn bucket_range(start: NaiveDate) -> Result<(NaiveDate, NaiveDate), PlanError> {
    let end = start
        .checked_add_days(Days::new(BUCKET_SPAN_DAYS))
        .ok_or_else(|| {
            PlanError::IntegrityViolation(format!("a week starting on {start} ends past the calendar"))
        })?;
    Ok((start, end))
}

/// Find the weekly plan containing `date`, creating one that starts on
/// `date` if none does.
///
/// `conn` must be inside a transaction. The weekly table's advisory lock is
/// taken before the lookup and held until the transaction ends, so two
/// concurrent resolutions of an uncovered date cannot both create a bucket.
pub async fn resolve_week_for(
    conn: &mut PgConnection,
    date: NaiveDate,
) -> Result<WeekResolution, PlanError> {
    queries::lock_table(&mut *conn, PlanKind::WeeklyPlan).await?;

    let mut matches = weekly_plans::weekly_plans_containing(&mut *conn, date).await?;
    match matches.len() {
        0 => {
            let (start_date, end_date) = bucket_range(date)?;
            let id = allocator::next_id(&mut *conn, PlanKind::WeeklyPlan).await?;
            let week = weekly_plans::insert_weekly_plan(&mut *conn, id, start_date, end_date).await?;
            info!(
                week_plan_id = week.week_plan_id,
                start_date = %week.start_date,
                end_date = %week.end_date,
                "created weekly plan"
            );
            Ok(WeekResolution {
                week,
                created: true,
            })
        }
        1 => {
            let week = matches.remove(0);
            debug!(week_plan_id = week.week_plan_id, %date, "reusing weekly plan");
            Ok(WeekResolution {
                week,
                created: false,
            })
        }
        _ => {
            let week_plan_ids: Vec<PlanId> = matches.iter().map(|w| w.week_plan_id).collect();
            warn!(%date, ?week_plan_ids, "weekly plans overlap");
            Err(PlanError::BucketOverlap {
                date,
                week_plan_ids,
            })
        }
    }
}

/// Insert a daily plan for `date`, resolving (or creating) its weekly plan.
///
/// Runs entirely on `conn`; the caller owns the transaction and commits it.
pub async fn create_daily_plan_for_date(
    conn: &mut PgConnection,
    date: NaiveDate,
    meal_id: PlanId,
) -> Result<ResolvedDay, PlanError> {
    let resolution = resolve_week_for(&mut *conn, date).await?;

    let day_plan_id = allocator::next_id(&mut *conn, PlanKind::DailyPlan).await?;
    let day = daily_plans::insert_daily_plan(
        &mut *conn,
        day_plan_id,
        resolution.week.week_plan_id,
        date,
        meal_id,
    )
    .await?;

    info!(
        day_plan_id = day.day_plan_id,
        week_plan_id = day.week_plan_id,
        %date,
        meal_id,
        "created daily plan"
    );

    Ok(ResolvedDay {
        day,
        week: resolution.week,
        week_created: resolution.created,
    })
}
