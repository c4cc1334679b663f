//! Item catalogue.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::error::{ApiError, ApiErrorBody};
use crate::models::item::Item;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/items", get(list_items))
}

#[utoipa::path(
    get,
    path = "/api/v1/items",
    tag = "Items",
    responses(
        (status = 200, description = "Purchasable items, cheapest first", body = Vec<Item>),
        (status = 500, description = "Internal error", body = ApiErrorBody),
    ),
)]
pub async fn list_items(State(state): State<AppState>) -> Result<Json<Vec<Item>>, ApiError> {
    Ok(Json(state.payments.list_items().await?))
}
