//! In-memory [`PaymentStore`] for tests and local development.
//!
//! A single mutex guards all tables, so `finalize_paid` is atomic with
//! respect to every other call.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::models::item::Item;
use crate::models::payment_session::PaymentSession;
use crate::models::points::PointsLedgerEntry;

use super::error::StoreError;
use super::status::PaymentStatus;
use super::store::{ensure_transitions, Finalized, PaymentStore};

#[derive(Default)]
struct Tables {
    items: HashMap<String, Item>,
    sessions: HashMap<String, PaymentSession>,
    balances: HashMap<String, i64>,
    ledger: Vec<PointsLedgerEntry>,
}

#[derive(Default)]
pub struct MemoryPaymentStore {
    tables: Mutex<Tables>,
}

impl MemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_item(&self, item: Item) {
        self.tables.lock().items.insert(item.id.clone(), item);
    }

    /// Ledger entries in insertion order.
    pub fn ledger(&self) -> Vec<PointsLedgerEntry> {
        self.tables.lock().ledger.clone()
    }
}

#[async_trait]
impl PaymentStore for MemoryPaymentStore {
    async fn get_item(&self, item_id: &str) -> Result<Option<Item>, StoreError> {
        Ok(self.tables.lock().items.get(item_id).cloned())
    }

    async fn list_items(&self) -> Result<Vec<Item>, StoreError> {
        let mut items: Vec<Item> = self
            .tables
            .lock()
            .items
            .values()
            .filter(|i| i.purchasable)
            .cloned()
            .collect();
        items.sort_by_key(|i| i.unit_price);
        Ok(items)
    }

    async fn create_session(&self, session: &PaymentSession) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        let duplicate = tables
            .sessions
            .values()
            .any(|s| s.id == session.id || s.merchant_uid == session.merchant_uid);
        if duplicate {
            return Err(StoreError::Corrupt(format!(
                "duplicate payment session {}",
                session.id
            )));
        }
        tables.sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<PaymentSession>, StoreError> {
        Ok(self.tables.lock().sessions.get(session_id).cloned())
    }

    async fn get_session_by_merchant_uid(
        &self,
        merchant_uid: &str,
    ) -> Result<Option<PaymentSession>, StoreError> {
        Ok(self
            .tables
            .lock()
            .sessions
            .values()
            .find(|s| s.merchant_uid == merchant_uid)
            .cloned())
    }

    async fn transition_status(
        &self,
        session_id: &str,
        from: &[PaymentStatus],
        to: PaymentStatus,
        reason: Option<&str>,
    ) -> Result<Option<PaymentSession>, StoreError> {
        ensure_transitions(from, to)?;
        let mut tables = self.tables.lock();
        let Some(session) = tables.sessions.get_mut(session_id) else {
            return Ok(None);
        };
        if !from.contains(&session.status) {
            return Ok(None);
        }
        session.status = to;
        session.failure_reason = reason.map(str::to_string);
        session.updated_at = Utc::now();
        Ok(Some(session.clone()))
    }

    async fn finalize_paid(
        &self,
        session_id: &str,
        provider_payment_key: &str,
        paid_at: DateTime<Utc>,
    ) -> Result<Finalized, StoreError> {
        let mut tables = self.tables.lock();
        let tables = &mut *tables;

        let session = tables
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::Corrupt(format!("session {session_id} vanished")))?;
        if !PaymentStatus::OPEN.contains(&session.status) {
            return Ok(Finalized::AlreadyFinal(session.clone()));
        }
        if tables.ledger.iter().any(|e| e.idempotency_key == session.id) {
            return Err(StoreError::Corrupt(format!(
                "ledger already holds a credit for {}",
                session.id
            )));
        }

        let now = Utc::now();
        session.status = PaymentStatus::Paid;
        session.provider_payment_key = Some(provider_payment_key.to_string());
        session.paid_at = Some(paid_at);
        session.updated_at = now;

        let balance = tables.balances.entry(session.user_id.clone()).or_insert(0);
        *balance += session.points;
        let balance = *balance;

        let id = tables.ledger.len() as i64 + 1;
        tables.ledger.push(PointsLedgerEntry {
            id,
            idempotency_key: session.id.clone(),
            user_id: session.user_id.clone(),
            session_id: session.id.clone(),
            amount: session.points,
            balance_after: balance,
            created_at: now,
        });

        Ok(Finalized::Credited {
            session: session.clone(),
            balance,
        })
    }

    async fn sessions_for_user(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PaymentSession>, StoreError> {
        let mut sessions: Vec<PaymentSession> = self
            .tables
            .lock()
            .sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(sessions
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn points_balance(&self, user_id: &str) -> Result<i64, StoreError> {
        Ok(self
            .tables
            .lock()
            .balances
            .get(user_id)
            .copied()
            .unwrap_or(0))
    }
}
