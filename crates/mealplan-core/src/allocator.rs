//! Identity allocation: the next primary key of a table is `max + 1`.
//!
//! Reading the maximum and inserting the new row are two statements, so the
//! allocator takes the table's transaction-scoped advisory lock before
//! reading. Any other transaction allocating on the same table blocks until
//! this one commits or rolls back, which makes allocate-then-insert atomic
//! per table. The primary-key constraint backs this up: a row inserted
//! outside the allocator surfaces as an integrity violation, never as a
//! silently duplicated id.

use sqlx::PgConnection;
use tracing::debug;

use mealplan_db::models::{PlanId, PlanKind};
use mealplan_db::queries;

use crate::error::PlanError;

/// Allocate the next identifier for `kind`'s table.
///
/// `conn` must be inside a transaction; the allocation is only reserved
/// until that transaction ends, so the caller inserts the row with the
/// returned id before committing. An empty table yields `1`.
pub async fn next_id(conn: &mut PgConnection, kind: PlanKind) -> Result<PlanId, PlanError> {
    queries::lock_table(&mut *conn, kind).await?;
    let max = queries::max_id(&mut *conn, kind).await?;
    let id = max + 1;

    debug!(table = %kind, id, "allocated identifier");
    Ok(id)
}
