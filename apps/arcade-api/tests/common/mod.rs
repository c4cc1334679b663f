#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use chrono::Utc;
use parking_lot::Mutex;

use arcade_api::auth::tokens::access_token_key;
use arcade_api::config::{Config, PortOneConfig};
use arcade_api::db::kv::{KeyValueStore, MemoryStore};
use arcade_api::hub::{Hub, HubConfig};
use arcade_api::models::item::Item;
use arcade_api::payments::memory::MemoryPaymentStore;
use arcade_api::payments::{
    PaymentCoordinator, PaymentProvider, ProviderError, ProviderPayment, ProviderStatus,
};
use arcade_api::AppState;
use arcade_common::Money;

/// Item every test state is seeded with.
pub const GEMS_ITEM_ID: &str = "item_gems";
pub const GEMS_PRICE: i64 = 10000;
pub const GEMS_POINTS: i64 = 1200;

/// Payment provider whose answers are set by the test.
#[derive(Default)]
pub struct ScriptedProvider {
    payments: Mutex<HashMap<String, ProviderPayment>>,
}

impl ScriptedProvider {
    pub fn answer(&self, payment_key: &str, merchant_uid: &str, status: ProviderStatus, amount: i64) {
        self.payments.lock().insert(
            payment_key.to_string(),
            ProviderPayment {
                payment_key: payment_key.to_string(),
                merchant_uid: merchant_uid.to_string(),
                status,
                amount,
                currency: "KRW".to_string(),
            },
        );
    }
}

#[async_trait]
impl PaymentProvider for ScriptedProvider {
    async fn prepare(&self, _merchant_uid: &str, _amount: &Money) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn verify(&self, payment_key: &str) -> Result<ProviderPayment, ProviderError> {
        self.payments
            .lock()
            .get(payment_key)
            .cloned()
            .ok_or(ProviderError::Http {
                status: 404,
                body: "not found".to_string(),
            })
    }
}

/// Handles the tests poke at directly.
pub struct TestContext {
    pub state: AppState,
    pub kv: Arc<MemoryStore>,
    pub store: Arc<MemoryPaymentStore>,
    pub provider: Arc<ScriptedProvider>,
}

pub fn test_config() -> Config {
    Config {
        database_url: String::new(),
        redis_url: String::new(),
        port: 0,
        portone: PortOneConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            api_key: String::new(),
            api_secret: String::new(),
            store_id: "store-test".to_string(),
        },
        hub_connection_queue: 16,
        hub_command_queue: 64,
    }
}

/// Build an `AppState` over in-memory stores and a scripted provider.
pub fn test_context() -> TestContext {
    let config = test_config();

    let store = Arc::new(MemoryPaymentStore::new());
    let now = Utc::now();
    store.insert_item(Item {
        id: GEMS_ITEM_ID.to_string(),
        name: "Gem Pack".to_string(),
        description: Some("1200 points".to_string()),
        unit_price: GEMS_PRICE,
        currency: "KRW".to_string(),
        points_per_unit: GEMS_POINTS,
        purchasable: true,
        created_at: now,
        updated_at: now,
    });
    let provider = Arc::new(ScriptedProvider::default());
    let payments = PaymentCoordinator::new(store.clone(), provider.clone());

    let hub = Hub::spawn(HubConfig {
        connection_queue: config.hub_connection_queue,
        command_queue: config.hub_command_queue,
    });
    let kv = Arc::new(MemoryStore::new());

    let state = AppState {
        kv: kv.clone() as Arc<dyn KeyValueStore>,
        config: Arc::new(config),
        hub,
        payments: Arc::new(payments),
    };

    TestContext {
        state,
        kv,
        store,
        provider,
    }
}

/// Build the full router plus its context.
pub fn test_app() -> (Router, TestContext) {
    let ctx = test_context();
    let app = arcade_api::routes::router().with_state(ctx.state.clone());
    (app, ctx)
}

/// Register an access token for `user_id` the way the auth service would.
pub async fn login(ctx: &TestContext, user_id: &str) -> String {
    let token = format!("tok_{}", arcade_common::id::prefixed_ulid("t"));
    let value = serde_json::json!({ "user_id": user_id }).to_string();
    ctx.kv.set_ex(&access_token_key(&token), &value, 3600);
    token
}

pub fn buyer_json() -> serde_json::Value {
    serde_json::json!({
        "name": "Kim Tester",
        "email": "tester@example.com",
        "tel": "010-1234-5678"
    })
}
