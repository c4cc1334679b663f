//! Payment session coordinator.
//!
//! Drives a session from creation to exactly one points credit. Two paths
//! reach the provider: the client's confirm call and the provider's webhook.
//! Both funnel into [`PaymentCoordinator::reconcile`], and the store's
//! conditional `finalize_paid` decides which one wins.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use utoipa::ToSchema;

use arcade_common::id::{prefix, prefixed_ulid};
use arcade_common::Money;

use crate::models::item::Item;
use crate::models::payment_session::{BuyerInfo, PaymentSession};

use super::error::{PaymentError, ProviderError};
use super::provider::{is_plain_payment_key, PaymentProvider, ProviderStatus};
use super::status::PaymentStatus;
use super::store::{Finalized, PaymentStore};

/// Upper bound on units per purchase.
pub const MAX_QUANTITY: i32 = 100;

/// What a confirm or webhook call achieved.
#[derive(Debug, Clone)]
pub enum Confirmation {
    /// This call finalized the session and credited `points`.
    Credited {
        session: PaymentSession,
        balance: i64,
    },
    /// The session was already terminal; nothing changed.
    AlreadyFinalized(PaymentSession),
}

impl Confirmation {
    pub fn session(&self) -> &PaymentSession {
        match self {
            Confirmation::Credited { session, .. } => session,
            Confirmation::AlreadyFinalized(session) => session,
        }
    }
}

/// Provider notification body (`imp_uid`, `merchant_uid`, `status`).
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct WebhookEvent {
    #[serde(default)]
    pub event_type: Option<String>,
    pub imp_uid: String,
    pub merchant_uid: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Outcome of a webhook delivery. Every variant is acknowledged to the provider.
#[derive(Debug, Clone)]
pub enum WebhookOutcome {
    Reconciled(Confirmation),
    /// No session with this merchant uid.
    UnknownMerchantUid,
}

pub struct PaymentCoordinator {
    store: Arc<dyn PaymentStore>,
    provider: Arc<dyn PaymentProvider>,
}

impl PaymentCoordinator {
    pub fn new(store: Arc<dyn PaymentStore>, provider: Arc<dyn PaymentProvider>) -> Self {
        Self { store, provider }
    }

    pub async fn list_items(&self) -> Result<Vec<Item>, PaymentError> {
        Ok(self.store.list_items().await?)
    }

    /// Create a `created` session. Amount and points come from the item row,
    /// never from the client.
    pub async fn create_session(
        &self,
        user_id: &str,
        item_id: &str,
        quantity: i32,
        buyer: BuyerInfo,
    ) -> Result<PaymentSession, PaymentError> {
        if !(1..=MAX_QUANTITY).contains(&quantity) {
            return Err(PaymentError::InvalidQuantity { max: MAX_QUANTITY });
        }
        validate_buyer(&buyer)?;

        let item = self
            .store
            .get_item(item_id)
            .await?
            .ok_or(PaymentError::ItemNotFound)?;
        if !item.purchasable {
            return Err(PaymentError::ItemNotPurchasable);
        }

        let overflow = || PaymentError::Validation {
            field: "quantity",
            message: "Total is too large".to_string(),
        };
        let total = item.unit_price().times(quantity).ok_or_else(overflow)?;
        let points = item
            .points_per_unit
            .checked_mul(i64::from(quantity))
            .ok_or_else(overflow)?;

        let now = Utc::now();
        let session = PaymentSession {
            id: prefixed_ulid(prefix::PAYMENT_SESSION),
            merchant_uid: prefixed_ulid(prefix::ORDER),
            user_id: user_id.to_string(),
            item_id: item.id.clone(),
            quantity,
            amount: total.amount,
            currency: total.currency,
            points,
            buyer_name: buyer.name.trim().to_string(),
            buyer_email: buyer.email.trim().to_string(),
            buyer_tel: buyer.tel.trim().to_string(),
            buyer_addr: buyer.addr.filter(|s| !s.trim().is_empty()),
            buyer_postcode: buyer.postcode.filter(|s| !s.trim().is_empty()),
            status: PaymentStatus::Created,
            provider_payment_key: None,
            failure_reason: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        };
        self.store.create_session(&session).await?;

        tracing::info!(
            session_id = %session.id,
            merchant_uid = %session.merchant_uid,
            user_id = %session.user_id,
            item_id = %session.item_id,
            amount = session.amount,
            "payment session created"
        );
        Ok(session)
    }

    /// Owner-scoped read. Other users' sessions look absent.
    pub async fn get_session(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<PaymentSession, PaymentError> {
        self.store
            .get_session(session_id)
            .await?
            .filter(|s| s.user_id == user_id)
            .ok_or(PaymentError::SessionNotFound)
    }

    /// Register the amount with the provider and move `created → prepared`.
    pub async fn prepare_payment(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<PaymentSession, PaymentError> {
        let session = self.get_session(session_id, user_id).await?;
        match session.status {
            PaymentStatus::Prepared => return Ok(session),
            PaymentStatus::Created => {}
            terminal => {
                return Err(PaymentError::InvalidTransition {
                    from: terminal,
                    to: PaymentStatus::Prepared,
                })
            }
        }

        self.provider
            .prepare(&session.merchant_uid, &session_total(&session))
            .await?;

        match self
            .store
            .transition_status(&session.id, &[PaymentStatus::Created], PaymentStatus::Prepared, None)
            .await?
        {
            Some(updated) => {
                tracing::info!(session_id = %updated.id, "payment session prepared");
                Ok(updated)
            }
            // Raced with a confirm/webhook/cancel; report whatever won.
            None => self.get_session(session_id, user_id).await,
        }
    }

    /// Client-side confirmation after the buyer completes payment.
    ///
    /// The claimed amount is compared against the stored amount before the
    /// provider is consulted; a mismatch leaves the session untouched.
    pub async fn confirm_payment(
        &self,
        session_id: &str,
        payment_key: &str,
        claimed_amount: i64,
    ) -> Result<Confirmation, PaymentError> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or(PaymentError::SessionNotFound)?;

        if claimed_amount != session.amount {
            tracing::warn!(
                session_id = %session.id,
                expected = session.amount,
                claimed = claimed_amount,
                "confirm rejected: amount mismatch"
            );
            return Err(PaymentError::AmountMismatch {
                expected: session.amount,
                claimed: claimed_amount,
            });
        }

        self.reconcile(session, payment_key).await
    }

    /// Provider notification. Redelivery is harmless: the body's status is
    /// ignored and the provider is asked again.
    pub async fn handle_webhook(&self, event: &WebhookEvent) -> Result<WebhookOutcome, PaymentError> {
        let Some(session) = self
            .store
            .get_session_by_merchant_uid(&event.merchant_uid)
            .await?
        else {
            tracing::warn!(
                merchant_uid = %event.merchant_uid,
                imp_uid = %event.imp_uid,
                "webhook for unknown merchant uid"
            );
            return Ok(WebhookOutcome::UnknownMerchantUid);
        };

        tracing::debug!(
            session_id = %session.id,
            event_type = ?event.event_type,
            reported_status = ?event.status,
            "webhook received"
        );
        let confirmation = self.reconcile(session, &event.imp_uid).await?;
        Ok(WebhookOutcome::Reconciled(confirmation))
    }

    /// Owner abandons an unpaid session.
    pub async fn cancel_session(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<Confirmation, PaymentError> {
        let session = self.get_session(session_id, user_id).await?;
        if session.status.is_terminal() {
            return Ok(Confirmation::AlreadyFinalized(session));
        }

        match self
            .store
            .transition_status(
                &session.id,
                &PaymentStatus::OPEN,
                PaymentStatus::Cancelled,
                Some("cancelled by buyer"),
            )
            .await?
        {
            Some(updated) => {
                tracing::info!(session_id = %updated.id, "payment session cancelled");
                Ok(Confirmation::AlreadyFinalized(updated))
            }
            None => Ok(Confirmation::AlreadyFinalized(
                self.get_session(session_id, user_id).await?,
            )),
        }
    }

    pub async fn payment_history(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PaymentSession>, PaymentError> {
        let limit = limit.clamp(1, 100);
        let offset = offset.max(0);
        Ok(self.store.sessions_for_user(user_id, limit, offset).await?)
    }

    pub async fn points_balance(&self, user_id: &str) -> Result<i64, PaymentError> {
        Ok(self.store.points_balance(user_id).await?)
    }

    /// Shared tail of confirm and webhook: verify with the provider and move
    /// the session to its final state.
    async fn reconcile(
        &self,
        session: PaymentSession,
        payment_key: &str,
    ) -> Result<Confirmation, PaymentError> {
        if session.status.is_terminal() {
            return Ok(Confirmation::AlreadyFinalized(session));
        }

        if !is_plain_payment_key(payment_key) {
            tracing::warn!(session_id = %session.id, "refusing malformed payment key");
            return Err(ProviderError::InvalidPaymentKey.into());
        }

        let payment = match self.provider.verify(payment_key).await {
            Ok(p) => p,
            Err(err) => {
                tracing::error!(session_id = %session.id, error = %err, "payment verification failed");
                return Err(err.into());
            }
        };

        // A payment for some other order says nothing about this session.
        if payment.merchant_uid != session.merchant_uid {
            tracing::warn!(
                session_id = %session.id,
                expected_merchant_uid = %session.merchant_uid,
                reported_merchant_uid = %payment.merchant_uid,
                payment_key = %payment.payment_key,
                "provider payment belongs to another order"
            );
            return Err(PaymentError::ForeignPayment {
                merchant_uid: payment.merchant_uid,
            });
        }

        match payment.status {
            ProviderStatus::Ready => return Err(PaymentError::PaymentPending),
            ProviderStatus::Failed => {
                return self
                    .reject(&session, PaymentStatus::Failed, "provider reported failed")
                    .await
            }
            ProviderStatus::Cancelled => {
                return self
                    .reject(&session, PaymentStatus::Cancelled, "provider reported cancelled")
                    .await
            }
            ProviderStatus::Paid => {}
        }

        if !session_total(&session).same_as(payment.amount, &payment.currency) {
            let reported = format!("amount {} {}", payment.amount, payment.currency);
            tracing::error!(
                session_id = %session.id,
                expected_amount = session.amount,
                expected_currency = %session.currency,
                %reported,
                "provider payment does not match session"
            );
            let reason = format!("provider mismatch: {reported}");
            return match self
                .store
                .transition_status(&session.id, &PaymentStatus::OPEN, PaymentStatus::Failed, Some(&reason))
                .await?
            {
                Some(_) => Err(PaymentError::ProviderMismatch { reported }),
                None => self.current(&session.id).await,
            };
        }

        match self
            .store
            .finalize_paid(&session.id, &payment.payment_key, Utc::now())
            .await?
        {
            Finalized::Credited { session, balance } => {
                tracing::info!(
                    session_id = %session.id,
                    user_id = %session.user_id,
                    points = session.points,
                    balance,
                    "payment finalized and points credited"
                );
                Ok(Confirmation::Credited { session, balance })
            }
            Finalized::AlreadyFinal(session) => {
                tracing::debug!(session_id = %session.id, status = %session.status, "payment already finalized");
                Ok(Confirmation::AlreadyFinalized(session))
            }
        }
    }

    /// Move an open session to `failed`/`cancelled` after the provider says so.
    async fn reject(
        &self,
        session: &PaymentSession,
        to: PaymentStatus,
        reason: &str,
    ) -> Result<Confirmation, PaymentError> {
        match self
            .store
            .transition_status(&session.id, &PaymentStatus::OPEN, to, Some(reason))
            .await?
        {
            Some(updated) => {
                tracing::info!(session_id = %updated.id, status = %to, "payment rejected by provider");
                Err(PaymentError::PaymentRejected { status: to })
            }
            None => self.current(&session.id).await,
        }
    }

    /// Someone else finalized the session between our read and write.
    async fn current(&self, session_id: &str) -> Result<Confirmation, PaymentError> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or(PaymentError::SessionNotFound)?;
        Ok(Confirmation::AlreadyFinalized(session))
    }
}

fn session_total(session: &PaymentSession) -> Money {
    Money::new(session.amount, session.currency.clone())
}

fn validate_buyer(buyer: &BuyerInfo) -> Result<(), PaymentError> {
    if buyer.name.trim().is_empty() {
        return Err(PaymentError::Validation {
            field: "buyer_info.name",
            message: "Buyer name is required".to_string(),
        });
    }
    let email = buyer.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(PaymentError::Validation {
            field: "buyer_info.email",
            message: "A valid buyer email is required".to_string(),
        });
    }
    Ok(())
}
