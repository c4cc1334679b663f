use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::schema::points_ledger;

/// One credit applied to a user's balance. `idempotency_key` is unique, so a
/// given payment session can produce at most one entry.
#[derive(Debug, Clone, Queryable, Selectable, Serialize, ToSchema)]
#[diesel(table_name = points_ledger)]
pub struct PointsLedgerEntry {
    pub id: i64,
    pub idempotency_key: String,
    pub user_id: String,
    pub session_id: String,
    pub amount: i64,
    pub balance_after: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = points_ledger)]
pub struct NewLedgerEntry<'a> {
    pub idempotency_key: &'a str,
    pub user_id: &'a str,
    pub session_id: &'a str,
    pub amount: i64,
    pub balance_after: i64,
    pub created_at: DateTime<Utc>,
}
