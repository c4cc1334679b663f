use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

use arcade_common::Money;

use crate::db::schema::items;

#[derive(Debug, Clone, Queryable, Selectable, Serialize, ToSchema)]
#[diesel(table_name = items)]
pub struct Item {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// Price of one unit in minor currency units.
    pub unit_price: i64,
    pub currency: String,
    /// Points credited per unit purchased.
    pub points_per_unit: i64,
    pub purchasable: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    pub fn unit_price(&self) -> Money {
        Money::new(self.unit_price, self.currency.clone())
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = items)]
pub struct NewItem<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub unit_price: i64,
    pub currency: &'a str,
    pub points_per_unit: i64,
    pub purchasable: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
