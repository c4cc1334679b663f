//! Payment session endpoints and the provider webhook.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, ApiErrorBody};
use crate::hub::{Delivery, Hub, ServerMessage};
use crate::models::payment_session::{BuyerInfo, PaymentSession};
use crate::payments::{Confirmation, PaymentError, WebhookEvent, WebhookOutcome};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/payments/sessions", post(create_session))
        .route("/payments/sessions/{session_id}", get(get_session))
        .route("/payments/sessions/{session_id}/prepare", post(prepare_session))
        .route("/payments/sessions/{session_id}/confirm", post(confirm_session))
        .route("/payments/sessions/{session_id}/cancel", post(cancel_session))
        .route("/payments/webhook", post(webhook))
}

/// Tell the buyer's live connections about a credit. Best effort.
async fn notify_credit(hub: &Hub, session: &PaymentSession, balance: i64) {
    let event = ServerMessage::PointsCredited {
        session_id: session.id.clone(),
        points: session.points,
        balance,
        timestamp: Utc::now(),
    };
    match hub.send_to_user(&session.user_id, event.to_frame()).await {
        Ok(Delivery::Delivered(connections)) => {
            tracing::debug!(session_id = %session.id, connections, "credit pushed to user");
        }
        Ok(_) => {}
        Err(err) => tracing::warn!(session_id = %session.id, %err, "credit push skipped"),
    }
}

// ---------------------------------------------------------------------------
// POST /api/v1/payments/sessions
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSessionRequest {
    pub item_id: String,
    pub quantity: i32,
    pub buyer_info: BuyerInfo,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateSessionResponse {
    pub session: PaymentSession,
    /// Merchant store id the client SDK needs to open the payment window.
    pub store_id: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/sessions",
    tag = "Payments",
    security(("bearer" = [])),
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Session created", body = CreateSessionResponse),
        (status = 400, description = "Validation failed", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 404, description = "Item not found", body = ApiErrorBody),
    ),
)]
pub async fn create_session(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), ApiError> {
    let session = state
        .payments
        .create_session(&user_id, &body.item_id, body.quantity, body.buyer_info)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session,
            store_id: state.config.portone.store_id.clone(),
        }),
    ))
}

// ---------------------------------------------------------------------------
// GET /api/v1/payments/sessions/:session_id
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/payments/sessions/{session_id}",
    tag = "Payments",
    security(("bearer" = [])),
    params(("session_id" = String, Path, description = "Payment session ID")),
    responses(
        (status = 200, description = "Session", body = PaymentSession),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 404, description = "Not found", body = ApiErrorBody),
    ),
)]
pub async fn get_session(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<PaymentSession>, ApiError> {
    Ok(Json(state.payments.get_session(&session_id, &user_id).await?))
}

// ---------------------------------------------------------------------------
// POST /api/v1/payments/sessions/:session_id/prepare
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/payments/sessions/{session_id}/prepare",
    tag = "Payments",
    security(("bearer" = [])),
    params(("session_id" = String, Path, description = "Payment session ID")),
    responses(
        (status = 200, description = "Amount registered with the provider", body = PaymentSession),
        (status = 404, description = "Not found", body = ApiErrorBody),
        (status = 409, description = "Session already finalized", body = ApiErrorBody),
        (status = 502, description = "Provider unavailable", body = ApiErrorBody),
    ),
)]
pub async fn prepare_session(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<PaymentSession>, ApiError> {
    Ok(Json(
        state.payments.prepare_payment(&session_id, &user_id).await?,
    ))
}

// ---------------------------------------------------------------------------
// POST /api/v1/payments/sessions/:session_id/confirm
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConfirmRequest {
    /// Provider payment key (`imp_uid`).
    #[serde(alias = "imp_uid")]
    pub payment_key: String,
    /// Amount the client believes it paid. Compared, never trusted.
    pub amount: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConfirmResponse {
    /// `credited` when this call applied the points, `already_finalized` otherwise.
    pub result: String,
    pub session: PaymentSession,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<i64>,
}

impl From<Confirmation> for ConfirmResponse {
    fn from(confirmation: Confirmation) -> Self {
        match confirmation {
            Confirmation::Credited { session, balance } => Self {
                result: "credited".to_string(),
                session,
                balance: Some(balance),
            },
            Confirmation::AlreadyFinalized(session) => Self {
                result: "already_finalized".to_string(),
                session,
                balance: None,
            },
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/sessions/{session_id}/confirm",
    tag = "Payments",
    security(("bearer" = [])),
    params(("session_id" = String, Path, description = "Payment session ID")),
    request_body = ConfirmRequest,
    responses(
        (status = 200, description = "Payment verified", body = ConfirmResponse),
        (status = 400, description = "Amount mismatch", body = ApiErrorBody),
        (status = 402, description = "Payment failed or did not match", body = ApiErrorBody),
        (status = 404, description = "Not found", body = ApiErrorBody),
        (status = 409, description = "Payment not completed yet", body = ApiErrorBody),
        (status = 502, description = "Provider unavailable", body = ApiErrorBody),
    ),
)]
pub async fn confirm_session(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<ConfirmRequest>,
) -> Result<Json<ConfirmResponse>, ApiError> {
    if body.payment_key.trim().is_empty() {
        return Err(ApiError::bad_request("payment_key is required"));
    }
    // Ownership check; the coordinator itself is caller-agnostic.
    state.payments.get_session(&session_id, &user_id).await?;

    let confirmation = state
        .payments
        .confirm_payment(&session_id, body.payment_key.trim(), body.amount)
        .await?;
    if let Confirmation::Credited { session, balance } = &confirmation {
        notify_credit(&state.hub, session, *balance).await;
    }
    Ok(Json(confirmation.into()))
}

// ---------------------------------------------------------------------------
// POST /api/v1/payments/sessions/:session_id/cancel
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/payments/sessions/{session_id}/cancel",
    tag = "Payments",
    security(("bearer" = [])),
    params(("session_id" = String, Path, description = "Payment session ID")),
    responses(
        (status = 200, description = "Session after cancellation", body = PaymentSession),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 404, description = "Not found", body = ApiErrorBody),
    ),
)]
pub async fn cancel_session(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<PaymentSession>, ApiError> {
    let outcome = state.payments.cancel_session(&session_id, &user_id).await?;
    Ok(Json(outcome.session().clone()))
}

// ---------------------------------------------------------------------------
// POST /api/v1/payments/webhook
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub status: String,
}

impl WebhookAck {
    fn new(status: &str) -> Json<Self> {
        Json(Self {
            status: status.to_string(),
        })
    }
}

/// Provider notification. Answers 200 for anything the provider should not
/// retry; store and transport failures surface as 5xx so it tries again.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    tag = "Payments",
    request_body = WebhookEvent,
    responses(
        (status = 200, description = "Acknowledged", body = WebhookAck),
        (status = 502, description = "Provider unavailable, retry", body = ApiErrorBody),
        (status = 500, description = "Internal error, retry", body = ApiErrorBody),
    ),
)]
pub async fn webhook(
    State(state): State<AppState>,
    Json(event): Json<WebhookEvent>,
) -> Result<Json<WebhookAck>, ApiError> {
    match state.payments.handle_webhook(&event).await {
        Ok(WebhookOutcome::Reconciled(Confirmation::Credited { session, balance })) => {
            notify_credit(&state.hub, &session, balance).await;
            Ok(WebhookAck::new("ok"))
        }
        Ok(WebhookOutcome::Reconciled(Confirmation::AlreadyFinalized(_))) => {
            Ok(WebhookAck::new("ok"))
        }
        Ok(WebhookOutcome::UnknownMerchantUid) => Ok(WebhookAck::new("ignored")),
        Err(PaymentError::PaymentPending) => Ok(WebhookAck::new("pending")),
        Err(
            err @ (PaymentError::ProviderMismatch { .. }
            | PaymentError::PaymentRejected { .. }
            | PaymentError::ForeignPayment { .. }),
        ) => {
            tracing::warn!(merchant_uid = %event.merchant_uid, %err, "webhook payment rejected");
            Ok(WebhookAck::new("rejected"))
        }
        Err(err) => Err(err.into()),
    }
}
