use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::schema::payment_sessions;
use crate::payments::status::PaymentStatus;

/// One purchase attempt. Amount, currency, quantity and points are fixed at
/// creation; only the status columns move afterwards.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize, ToSchema)]
#[diesel(table_name = payment_sessions)]
pub struct PaymentSession {
    pub id: String,
    pub merchant_uid: String,
    pub user_id: String,
    pub item_id: String,
    pub quantity: i32,
    pub amount: i64,
    pub currency: String,
    pub points: i64,
    pub buyer_name: String,
    pub buyer_email: String,
    pub buyer_tel: String,
    pub buyer_addr: Option<String>,
    pub buyer_postcode: Option<String>,
    pub status: PaymentStatus,
    pub provider_payment_key: Option<String>,
    pub failure_reason: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Buyer contact details forwarded to the payment provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct BuyerInfo {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub tel: String,
    #[serde(default)]
    pub addr: Option<String>,
    #[serde(default)]
    pub postcode: Option<String>,
}
