//! Payment domain errors.

use thiserror::Error;

use super::status::PaymentStatus;

/// Failure talking to the payment provider. The session is left untouched.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("provider rejected request (code {code}): {message}")]
    Api { code: i64, message: String },
    #[error("provider is not configured")]
    NotConfigured,
    #[error("payment key is not a valid provider id")]
    InvalidPaymentKey,
}

/// Failure in the persistence layer. The session is left in its prior state.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("connection pool error: {0}")]
    Pool(#[from] diesel_async::pooled_connection::deadpool::PoolError),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("illegal status transition {from} -> {to}")]
    IllegalTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },
}

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("item not found")]
    ItemNotFound,
    #[error("item is not purchasable")]
    ItemNotPurchasable,
    #[error("payment session not found")]
    SessionNotFound,
    #[error("quantity must be between 1 and {max}")]
    InvalidQuantity { max: i32 },
    #[error("{field}: {message}")]
    Validation { field: &'static str, message: String },
    #[error("claimed amount {claimed} does not match session amount {expected}")]
    AmountMismatch { expected: i64, claimed: i64 },
    #[error("cannot move payment session from {from} to {to}")]
    InvalidTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },
    #[error("provider reported {reported}; session marked failed")]
    ProviderMismatch { reported: String },
    #[error("payment belongs to order {merchant_uid}, not this session")]
    ForeignPayment { merchant_uid: String },
    #[error("payment was {status} by the provider")]
    PaymentRejected { status: PaymentStatus },
    #[error("payment has not been completed yet")]
    PaymentPending,
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for PaymentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::IllegalTransition { from, to } => PaymentError::InvalidTransition { from, to },
            other => PaymentError::Store(other),
        }
    }
}
