//! Persistence for items, payment sessions and the points ledger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::OptionalExtension;
use diesel_async::AsyncConnection;
use scoped_futures::ScopedFutureExt;

use crate::db::pool::DbPool;
use crate::db::schema::{items, payment_sessions, points_ledger, user_points};
use crate::models::item::Item;
use crate::models::payment_session::PaymentSession;
use crate::models::points::NewLedgerEntry;

use super::error::StoreError;
use super::status::PaymentStatus;

/// Result of [`PaymentStore::finalize_paid`].
#[derive(Debug, Clone)]
pub enum Finalized {
    /// This call moved the session to `paid` and credited the points.
    Credited {
        session: PaymentSession,
        balance: i64,
    },
    /// Another writer finalized the session first; nothing was changed.
    AlreadyFinal(PaymentSession),
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn get_item(&self, item_id: &str) -> Result<Option<Item>, StoreError>;

    async fn list_items(&self) -> Result<Vec<Item>, StoreError>;

    async fn create_session(&self, session: &PaymentSession) -> Result<(), StoreError>;

    async fn get_session(&self, session_id: &str) -> Result<Option<PaymentSession>, StoreError>;

    async fn get_session_by_merchant_uid(
        &self,
        merchant_uid: &str,
    ) -> Result<Option<PaymentSession>, StoreError>;

    /// Move a session to `to` only if its current status is one of `from`.
    ///
    /// Returns the updated session, or `None` when the status did not match
    /// (or the session does not exist).
    async fn transition_status(
        &self,
        session_id: &str,
        from: &[PaymentStatus],
        to: PaymentStatus,
        reason: Option<&str>,
    ) -> Result<Option<PaymentSession>, StoreError>;

    /// Atomically mark an open session `paid` and credit its points to the
    /// owner's balance, keyed by the session id.
    async fn finalize_paid(
        &self,
        session_id: &str,
        provider_payment_key: &str,
        paid_at: DateTime<Utc>,
    ) -> Result<Finalized, StoreError>;

    /// A user's sessions, newest first.
    async fn sessions_for_user(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PaymentSession>, StoreError>;

    async fn points_balance(&self, user_id: &str) -> Result<i64, StoreError>;
}

/// Refuse a conditional update whose `from → to` moves are not all in the
/// lifecycle table, whatever the row currently holds.
pub(crate) fn ensure_transitions(from: &[PaymentStatus], to: PaymentStatus) -> Result<(), StoreError> {
    match from.iter().find(|f| !f.can_transition_to(to)) {
        Some(&illegal) => Err(StoreError::IllegalTransition { from: illegal, to }),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// PostgreSQL implementation
// ---------------------------------------------------------------------------

pub struct PgPaymentStore {
    db: DbPool,
}

impl PgPaymentStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn get_item(&self, item_id: &str) -> Result<Option<Item>, StoreError> {
        let mut conn = self.db.get().await?;
        let item = diesel_async::RunQueryDsl::get_result(
            items::table.find(item_id).select(Item::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        Ok(item)
    }

    async fn list_items(&self) -> Result<Vec<Item>, StoreError> {
        let mut conn = self.db.get().await?;
        let rows = diesel_async::RunQueryDsl::load(
            items::table
                .filter(items::purchasable.eq(true))
                .order(items::unit_price.asc())
                .select(Item::as_select()),
            &mut conn,
        )
        .await?;
        Ok(rows)
    }

    async fn create_session(&self, session: &PaymentSession) -> Result<(), StoreError> {
        let mut conn = self.db.get().await?;
        diesel_async::RunQueryDsl::execute(
            diesel::insert_into(payment_sessions::table).values(session),
            &mut conn,
        )
        .await?;
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<PaymentSession>, StoreError> {
        let mut conn = self.db.get().await?;
        let session = diesel_async::RunQueryDsl::get_result(
            payment_sessions::table
                .find(session_id)
                .select(PaymentSession::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        Ok(session)
    }

    async fn get_session_by_merchant_uid(
        &self,
        merchant_uid: &str,
    ) -> Result<Option<PaymentSession>, StoreError> {
        let mut conn = self.db.get().await?;
        let session = diesel_async::RunQueryDsl::get_result(
            payment_sessions::table
                .filter(payment_sessions::merchant_uid.eq(merchant_uid))
                .select(PaymentSession::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        Ok(session)
    }

    async fn transition_status(
        &self,
        session_id: &str,
        from: &[PaymentStatus],
        to: PaymentStatus,
        reason: Option<&str>,
    ) -> Result<Option<PaymentSession>, StoreError> {
        ensure_transitions(from, to)?;
        let mut conn = self.db.get().await?;
        let updated = diesel_async::RunQueryDsl::get_result(
            diesel::update(
                payment_sessions::table
                    .filter(payment_sessions::id.eq(session_id))
                    .filter(payment_sessions::status.eq_any(from.to_vec())),
            )
            .set((
                payment_sessions::status.eq(to),
                payment_sessions::failure_reason.eq(reason),
                payment_sessions::updated_at.eq(Utc::now()),
            ))
            .returning(PaymentSession::as_returning()),
            &mut conn,
        )
        .await
        .optional()?;
        Ok(updated)
    }

    async fn finalize_paid(
        &self,
        session_id: &str,
        provider_payment_key: &str,
        paid_at: DateTime<Utc>,
    ) -> Result<Finalized, StoreError> {
        let mut conn = self.db.get().await?;
        let session_id = session_id.to_string();
        let provider_payment_key = provider_payment_key.to_string();

        // The conditional UPDATE takes the row lock; a concurrent finalizer
        // blocks on it and then matches zero rows.
        conn.transaction::<_, StoreError, _>(|conn| {
            async move {
                let now = Utc::now();
                let updated: Option<PaymentSession> = diesel_async::RunQueryDsl::get_result(
                    diesel::update(
                        payment_sessions::table
                            .filter(payment_sessions::id.eq(&session_id))
                            .filter(payment_sessions::status.eq_any(PaymentStatus::OPEN.to_vec())),
                    )
                    .set((
                        payment_sessions::status.eq(PaymentStatus::Paid),
                        payment_sessions::provider_payment_key.eq(Some(provider_payment_key.as_str())),
                        payment_sessions::paid_at.eq(Some(paid_at)),
                        payment_sessions::updated_at.eq(now),
                    ))
                    .returning(PaymentSession::as_returning()),
                    conn,
                )
                .await
                .optional()?;

                let Some(session) = updated else {
                    let current: PaymentSession = diesel_async::RunQueryDsl::get_result(
                        payment_sessions::table
                            .find(&session_id)
                            .select(PaymentSession::as_select()),
                        conn,
                    )
                    .await?;
                    return Ok(Finalized::AlreadyFinal(current));
                };

                let balance: i64 = diesel_async::RunQueryDsl::get_result(
                    diesel::insert_into(user_points::table)
                        .values((
                            user_points::user_id.eq(&session.user_id),
                            user_points::balance.eq(session.points),
                            user_points::updated_at.eq(now),
                        ))
                        .on_conflict(user_points::user_id)
                        .do_update()
                        .set((
                            user_points::balance.eq(user_points::balance + session.points),
                            user_points::updated_at.eq(now),
                        ))
                        .returning(user_points::balance),
                    conn,
                )
                .await?;

                // Unique on idempotency_key: a second credit aborts the transaction.
                diesel_async::RunQueryDsl::execute(
                    diesel::insert_into(points_ledger::table).values(NewLedgerEntry {
                        idempotency_key: &session.id,
                        user_id: &session.user_id,
                        session_id: &session.id,
                        amount: session.points,
                        balance_after: balance,
                        created_at: now,
                    }),
                    conn,
                )
                .await?;

                Ok(Finalized::Credited { session, balance })
            }
            .scope_boxed()
        })
        .await
    }

    async fn sessions_for_user(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PaymentSession>, StoreError> {
        let mut conn = self.db.get().await?;
        let rows = diesel_async::RunQueryDsl::load(
            payment_sessions::table
                .filter(payment_sessions::user_id.eq(user_id))
                .order(payment_sessions::created_at.desc())
                .limit(limit)
                .offset(offset)
                .select(PaymentSession::as_select()),
            &mut conn,
        )
        .await?;
        Ok(rows)
    }

    async fn points_balance(&self, user_id: &str) -> Result<i64, StoreError> {
        let mut conn = self.db.get().await?;
        let balance: Option<i64> = diesel_async::RunQueryDsl::get_result(
            user_points::table
                .find(user_id)
                .select(user_points::balance),
            &mut conn,
        )
        .await
        .optional()?;
        Ok(balance.unwrap_or(0))
    }
}
