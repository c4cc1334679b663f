use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::hub::HubError;
use crate::payments::{PaymentError, ProviderError, StoreError};

/// Structured API error returned to clients.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Application-level error type that converts into an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub details: Option<Vec<FieldError>>,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "CONFLICT", message)
    }

    /// The provider declined or disagreed; the session is now terminal.
    pub fn payment_required(message: impl Into<String>) -> Self {
        Self::new(StatusCode::PAYMENT_REQUIRED, "PAYMENT_FAILED", message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "PROVIDER_ERROR", message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            message,
        )
    }

    pub fn validation(details: Vec<FieldError>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "VALIDATION_ERROR".to_string(),
            message: "Validation failed".to_string(),
            details: Some(details),
        }
    }

    fn with_code(mut self, code: &str) -> Self {
        self.code = code.to_string();
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: ApiErrorDetail {
                code: self.code,
                message: self.message,
                details: self.details,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        let message = err.to_string();
        match err {
            PaymentError::ItemNotFound => Self::not_found(message).with_code("ITEM_NOT_FOUND"),
            PaymentError::SessionNotFound => {
                Self::not_found(message).with_code("SESSION_NOT_FOUND")
            }
            PaymentError::ItemNotPurchasable => {
                Self::bad_request(message).with_code("ITEM_NOT_PURCHASABLE")
            }
            PaymentError::InvalidQuantity { .. } => Self::validation(vec![FieldError {
                field: "quantity".to_string(),
                message,
            }]),
            PaymentError::Validation { field, message } => Self::validation(vec![FieldError {
                field: field.to_string(),
                message,
            }]),
            PaymentError::AmountMismatch { .. } => {
                Self::bad_request(message).with_code("AMOUNT_MISMATCH")
            }
            PaymentError::InvalidTransition { .. } => {
                Self::conflict(message).with_code("INVALID_STATE")
            }
            PaymentError::PaymentPending => Self::conflict(message).with_code("PAYMENT_PENDING"),
            PaymentError::ProviderMismatch { .. } => {
                Self::payment_required(message).with_code("PROVIDER_MISMATCH")
            }
            PaymentError::ForeignPayment { .. } => {
                Self::bad_request(message).with_code("PAYMENT_ORDER_MISMATCH")
            }
            PaymentError::PaymentRejected { .. } => Self::payment_required(message),
            PaymentError::Provider(err) => err.into(),
            PaymentError::Store(err) => err.into(),
        }
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        tracing::error!(%err, "payment provider error");
        match err {
            ProviderError::NotConfigured => {
                Self::service_unavailable("Payments are not configured")
            }
            ProviderError::InvalidPaymentKey => {
                Self::bad_request("Invalid payment key").with_code("INVALID_PAYMENT_KEY")
            }
            _ => Self::bad_gateway("Payment provider unavailable"),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        tracing::error!(?err, "store error");
        Self::internal("An internal error occurred")
    }
}

impl From<HubError> for ApiError {
    fn from(err: HubError) -> Self {
        tracing::warn!(%err, "hub unavailable");
        Self::service_unavailable("Server is shutting down")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::PaymentStatus;

    #[test]
    fn payment_errors_map_to_statuses() {
        let cases = [
            (PaymentError::ItemNotFound, StatusCode::NOT_FOUND),
            (PaymentError::SessionNotFound, StatusCode::NOT_FOUND),
            (PaymentError::InvalidQuantity { max: 100 }, StatusCode::BAD_REQUEST),
            (
                PaymentError::AmountMismatch {
                    expected: 10000,
                    claimed: 1,
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                PaymentError::InvalidTransition {
                    from: PaymentStatus::Paid,
                    to: PaymentStatus::Prepared,
                },
                StatusCode::CONFLICT,
            ),
            (PaymentError::PaymentPending, StatusCode::CONFLICT),
            (
                PaymentError::ProviderMismatch {
                    reported: "amount 1 KRW".into(),
                },
                StatusCode::PAYMENT_REQUIRED,
            ),
            (
                PaymentError::PaymentRejected {
                    status: PaymentStatus::Failed,
                },
                StatusCode::PAYMENT_REQUIRED,
            ),
            (
                PaymentError::ForeignPayment {
                    merchant_uid: "order_other".into(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                PaymentError::Provider(ProviderError::InvalidPaymentKey),
                StatusCode::BAD_REQUEST,
            ),
            (
                PaymentError::Provider(ProviderError::Http {
                    status: 500,
                    body: String::new(),
                }),
                StatusCode::BAD_GATEWAY,
            ),
            (
                PaymentError::Store(StoreError::Corrupt("x".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let label = format!("{err:?}");
            assert_eq!(ApiError::from(err).status, expected, "{label}");
        }
    }

    #[test]
    fn validation_errors_name_the_field() {
        let err = ApiError::from(PaymentError::Validation {
            field: "buyer_info.email",
            message: "required".into(),
        });
        assert_eq!(err.code, "VALIDATION_ERROR");
        assert_eq!(err.details.unwrap()[0].field, "buyer_info.email");
    }
}
