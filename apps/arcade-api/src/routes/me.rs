//! The caller's own payment history and points balance.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, ApiErrorBody};
use crate::models::payment_session::PaymentSession;
use crate::AppState;

const DEFAULT_PAGE_SIZE: i64 = 20;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me/payments", get(list_payments))
        .route("/me/points", get(get_points))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct HistoryParams {
    /// Page size, 1-100 (default 20).
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentHistoryResponse {
    pub data: Vec<PaymentSession>,
    pub limit: i64,
    pub offset: i64,
}

#[utoipa::path(
    get,
    path = "/api/v1/me/payments",
    tag = "Me",
    security(("bearer" = [])),
    params(HistoryParams),
    responses(
        (status = 200, description = "Payment sessions, newest first", body = PaymentHistoryResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn list_payments(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<PaymentHistoryResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, 100);
    let offset = params.offset.unwrap_or(0).max(0);
    let data = state
        .payments
        .payment_history(&user_id, limit, offset)
        .await?;
    Ok(Json(PaymentHistoryResponse {
        data,
        limit,
        offset,
    }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PointsResponse {
    pub user_id: String,
    pub balance: i64,
}

#[utoipa::path(
    get,
    path = "/api/v1/me/points",
    tag = "Me",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Current balance", body = PointsResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn get_points(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<PointsResponse>, ApiError> {
    let balance = state.payments.points_balance(&user_id).await?;
    Ok(Json(PointsResponse { user_id, balance }))
}
