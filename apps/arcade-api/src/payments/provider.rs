//! Payment provider collaborator.
//!
//! Everything a provider returns is untrusted: the coordinator checks the
//! payment's order id and its amount against the stored session before
//! crediting.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use arcade_common::Money;

use crate::config::PortOneConfig;

use super::error::ProviderError;

/// Payment state as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    /// Payment window opened but not completed.
    Ready,
    Paid,
    Failed,
    Cancelled,
}

/// Result of looking up a payment with the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderPayment {
    pub payment_key: String,
    pub merchant_uid: String,
    pub status: ProviderStatus,
    pub amount: i64,
    pub currency: String,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Register the authoritative amount for an order before the buyer pays.
    async fn prepare(&self, merchant_uid: &str, amount: &Money) -> Result<(), ProviderError>;

    /// Look up a payment by the provider's payment key.
    async fn verify(&self, payment_key: &str) -> Result<ProviderPayment, ProviderError>;
}

// ---------------------------------------------------------------------------
// PortOne (iamport v1 REST)
// ---------------------------------------------------------------------------

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Refresh the access token this many seconds before the provider expires it.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Envelope wrapping every PortOne response body.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    response: Option<T>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expired_at: i64,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    imp_uid: String,
    merchant_uid: String,
    #[serde(alias = "paid_amount")]
    amount: i64,
    #[serde(default = "default_currency")]
    currency: String,
    status: ProviderStatus,
}

fn default_currency() -> String {
    "KRW".to_string()
}

#[derive(Debug, Serialize)]
struct PrepareBody<'a> {
    merchant_uid: &'a str,
    amount: i64,
}

#[derive(Debug, Serialize)]
struct TokenBody<'a> {
    imp_key: &'a str,
    imp_secret: &'a str,
}

struct CachedToken {
    token: String,
    expires_at: i64,
}

/// HTTP client for the PortOne REST API.
pub struct PortOneClient {
    http: reqwest::Client,
    config: PortOneConfig,
    token: Mutex<Option<CachedToken>>,
}

impl PortOneClient {
    pub fn new(config: PortOneConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            config,
            token: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Return a cached access token, fetching a new one when it is about to expire.
    async fn access_token(&self) -> Result<String, ProviderError> {
        if !self.config.is_configured() {
            return Err(ProviderError::NotConfigured);
        }

        let now = chrono::Utc::now().timestamp();
        let cached = self
            .token
            .lock()
            .as_ref()
            .filter(|c| c.expires_at - TOKEN_REFRESH_MARGIN_SECS > now)
            .map(|c| c.token.clone());
        if let Some(token) = cached {
            return Ok(token);
        }

        let resp = self
            .http
            .post(self.url("/users/getToken"))
            .json(&TokenBody {
                imp_key: &self.config.api_key,
                imp_secret: &self.config.api_secret,
            })
            .send()
            .await?;
        let token: TokenResponse = read_envelope(resp).await?;

        tracing::debug!(expires_at = token.expired_at, "provider access token refreshed");
        *self.token.lock() = Some(CachedToken {
            token: token.access_token.clone(),
            expires_at: token.expired_at,
        });
        Ok(token.access_token)
    }
}

#[async_trait]
impl PaymentProvider for PortOneClient {
    async fn prepare(&self, merchant_uid: &str, amount: &Money) -> Result<(), ProviderError> {
        let token = self.access_token().await?;
        let resp = self
            .http
            .post(self.url("/payments/prepare"))
            .header(reqwest::header::AUTHORIZATION, token)
            .json(&PrepareBody {
                merchant_uid,
                amount: amount.amount,
            })
            .send()
            .await?;
        let _: serde_json::Value = read_envelope(resp).await?;
        Ok(())
    }

    async fn verify(&self, payment_key: &str) -> Result<ProviderPayment, ProviderError> {
        // The key becomes a path segment of an authenticated request.
        if !is_plain_payment_key(payment_key) {
            return Err(ProviderError::InvalidPaymentKey);
        }
        let token = self.access_token().await?;
        let resp = self
            .http
            .get(self.url(&format!("/payments/{payment_key}")))
            .header(reqwest::header::AUTHORIZATION, token)
            .send()
            .await?;
        let payment: PaymentResponse = read_envelope(resp).await?;

        Ok(ProviderPayment {
            payment_key: payment.imp_uid,
            merchant_uid: payment.merchant_uid,
            status: payment.status,
            amount: payment.amount,
            currency: payment.currency,
        })
    }
}

/// Provider payment keys (`imp_...`) are ASCII letters, digits, `_` and `-`.
pub fn is_plain_payment_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= 128
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Check the HTTP status and unwrap the `{code, message, response}` envelope.
async fn read_envelope<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ProviderError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ProviderError::Http {
            status: status.as_u16(),
            body,
        });
    }

    let envelope: Envelope<T> = resp.json().await?;
    match envelope.response {
        Some(response) if envelope.code == 0 => Ok(response),
        _ => Err(ProviderError::Api {
            code: envelope.code,
            message: envelope.message.unwrap_or_else(|| "empty response".to_string()),
        }),
    }
}
