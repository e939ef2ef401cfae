//! Error taxonomy of the hierarchy engine.
//!
//! Gateway functions return `anyhow::Error` with context; conversion into
//! [`PlanError`] inspects the underlying `sqlx::Error` to tell constraint
//! violations apart from connection or transaction failures.

use std::time::Duration;

use chrono::NaiveDate;
use thiserror::Error;

use mealplan_db::models::{PlanId, PlanKind};

#[derive(Debug, Error)]
pub enum PlanError {
    /// Update or delete targeted a row that does not exist.
    #[error("{} {id} not found", .kind.label())]
    NotFound { kind: PlanKind, id: PlanId },

    /// The store rejected a write (duplicate key, foreign key, check), or
    /// the write would break a hierarchy invariant.
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    /// More than one weekly bucket contains `date`.
    #[error("date {date} falls inside {} weekly plans {week_plan_ids:?}; weekly ranges overlap", .week_plan_ids.len())]
    BucketOverlap {
        date: NaiveDate,
        week_plan_ids: Vec<PlanId>,
    },

    /// Connection or transaction failure not tied to the data.
    #[error("store error: {0}")]
    TransientStore(String),

    /// A key could not be coerced to an integer identifier.
    #[error("invalid key {0:?}: expected an integer identifier")]
    InvalidKey(String),

    /// A cascading delete failed and was rolled back.
    #[error("failed to delete {} {id}", .kind.label())]
    DeletionFailed {
        kind: PlanKind,
        id: PlanId,
        #[source]
        source: Box<PlanError>,
    },

    /// The operation did not finish before its deadline and was rolled back.
    #[error("operation exceeded its {0:?} deadline")]
    DeadlineExceeded(Duration),
}

impl PlanError {
    /// Whether a caller may reasonably retry the same operation.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TransientStore(_) | Self::DeadlineExceeded(_) => true,
            Self::DeletionFailed { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

/// Whether a sqlx error is a constraint violation reported by the store.
fn is_constraint_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.is_unique_violation() || db.is_foreign_key_violation() || db.is_check_violation()
        }
        _ => false,
    }
}

impl From<anyhow::Error> for PlanError {
    fn from(err: anyhow::Error) -> Self {
        let message = format!("{err:#}");
        match err.downcast_ref::<sqlx::Error>() {
            Some(sqlx_err) if is_constraint_violation(sqlx_err) => Self::IntegrityViolation(message),
            _ => Self::TransientStore(message),
        }
    }
}

impl From<sqlx::Error> for PlanError {
    fn from(err: sqlx::Error) -> Self {
        if is_constraint_violation(&err) {
            Self::IntegrityViolation(err.to_string())
        } else {
            Self::TransientStore(err.to_string())
        }
    }
}
