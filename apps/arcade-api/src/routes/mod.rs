pub mod health;
pub mod items;
pub mod me;
pub mod payments;

use axum::Router;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::hub::server::router())
        .nest(
            "/api/v1",
            items::router()
                .merge(payments::router())
                .merge(me::router()),
        )
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        items::list_items,
        payments::create_session,
        payments::get_session,
        payments::prepare_session,
        payments::confirm_session,
        payments::cancel_session,
        payments::webhook,
        me::list_payments,
        me::get_points,
    ),
    components(
        schemas(
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            crate::error::FieldError,
            crate::hub::HubStats,
            crate::models::item::Item,
            crate::models::payment_session::PaymentSession,
            crate::models::payment_session::BuyerInfo,
            crate::models::points::PointsLedgerEntry,
            crate::payments::PaymentStatus,
            crate::payments::WebhookEvent,
            health::HealthResponse,
            payments::CreateSessionRequest,
            payments::CreateSessionResponse,
            payments::ConfirmRequest,
            payments::ConfirmResponse,
            payments::WebhookAck,
            me::PaymentHistoryResponse,
            me::PointsResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Items", description = "Item catalogue"),
        (name = "Payments", description = "Payment sessions and provider webhook"),
        (name = "Me", description = "Caller's payments and points"),
    )
)]
pub struct ApiDoc;
