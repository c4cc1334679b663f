mod common;

use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};

use arcade_api::payments::ProviderStatus;
use common::{GEMS_ITEM_ID, GEMS_POINTS, GEMS_PRICE};

fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// Create a one-unit session and return (session_id, merchant_uid).
async fn create_session(server: &TestServer, token: &str) -> (String, String) {
    let resp = server
        .post("/api/v1/payments/sessions")
        .add_header(AUTHORIZATION, bearer(token))
        .json(&json!({
            "item_id": GEMS_ITEM_ID,
            "quantity": 1,
            "buyer_info": common::buyer_json(),
        }))
        .await;
    resp.assert_status(StatusCode::CREATED);
    let body: Value = resp.json();
    (
        body["session"]["id"].as_str().unwrap().to_string(),
        body["session"]["merchant_uid"].as_str().unwrap().to_string(),
    )
}

async fn balance(server: &TestServer, token: &str) -> i64 {
    let resp = server
        .get("/api/v1/me/points")
        .add_header(AUTHORIZATION, bearer(token))
        .await;
    resp.assert_status_ok();
    resp.json::<Value>()["balance"].as_i64().unwrap()
}

// ---------------------------------------------------------------------------
// Catalogue and session creation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn items_are_public() {
    let (app, _ctx) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let resp = server.get("/api/v1/items").await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body[0]["id"], GEMS_ITEM_ID);
    assert_eq!(body[0]["unit_price"], GEMS_PRICE);
}

#[tokio::test]
async fn create_session_requires_auth() {
    let (app, _ctx) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let resp = server
        .post("/api/v1/payments/sessions")
        .json(&json!({ "item_id": GEMS_ITEM_ID, "quantity": 1, "buyer_info": common::buyer_json() }))
        .await;
    resp.assert_status(StatusCode::UNAUTHORIZED);

    let resp = server
        .post("/api/v1/payments/sessions")
        .add_header(AUTHORIZATION, "Bearer not-a-token")
        .json(&json!({ "item_id": GEMS_ITEM_ID, "quantity": 1, "buyer_info": common::buyer_json() }))
        .await;
    resp.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(resp.json::<Value>()["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn create_session_computes_amount_server_side() {
    let (app, ctx) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let token = common::login(&ctx, "usr_buyer").await;

    let resp = server
        .post("/api/v1/payments/sessions")
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({
            "item_id": GEMS_ITEM_ID,
            "quantity": 3,
            "amount": 1,
            "buyer_info": common::buyer_json(),
        }))
        .await;

    resp.assert_status(StatusCode::CREATED);
    let body: Value = resp.json();
    assert_eq!(body["store_id"], "store-test");
    assert_eq!(body["session"]["amount"], GEMS_PRICE * 3);
    assert_eq!(body["session"]["points"], GEMS_POINTS * 3);
    assert_eq!(body["session"]["status"], "created");
    assert_eq!(body["session"]["user_id"], "usr_buyer");
    assert!(body["session"]["id"].as_str().unwrap().starts_with("pay_"));
}

#[tokio::test]
async fn create_session_rejects_bad_input() {
    let (app, ctx) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let token = common::login(&ctx, "usr_buyer").await;

    let resp = server
        .post("/api/v1/payments/sessions")
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({ "item_id": GEMS_ITEM_ID, "quantity": 0, "buyer_info": common::buyer_json() }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = resp.json();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"]["details"][0]["field"], "quantity");

    let resp = server
        .post("/api/v1/payments/sessions")
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({ "item_id": "item_nope", "quantity": 1, "buyer_info": common::buyer_json() }))
        .await;
    resp.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(resp.json::<Value>()["error"]["code"], "ITEM_NOT_FOUND");

    let resp = server
        .post("/api/v1/payments/sessions")
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({
            "item_id": GEMS_ITEM_ID,
            "quantity": 1,
            "buyer_info": { "name": "", "email": "tester@example.com" },
        }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(
        resp.json::<Value>()["error"]["details"][0]["field"],
        "buyer_info.name"
    );
}

#[tokio::test]
async fn sessions_are_owner_scoped() {
    let (app, ctx) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let owner = common::login(&ctx, "usr_owner").await;
    let other = common::login(&ctx, "usr_other").await;
    let (session_id, _) = create_session(&server, &owner).await;

    let resp = server
        .get(&format!("/api/v1/payments/sessions/{session_id}"))
        .add_header(AUTHORIZATION, bearer(&owner))
        .await;
    resp.assert_status_ok();

    let resp = server
        .get(&format!("/api/v1/payments/sessions/{session_id}"))
        .add_header(AUTHORIZATION, bearer(&other))
        .await;
    resp.assert_status(StatusCode::NOT_FOUND);

    let resp = server
        .post(&format!("/api/v1/payments/sessions/{session_id}/confirm"))
        .add_header(AUTHORIZATION, bearer(&other))
        .json(&json!({ "payment_key": "imp_1", "amount": GEMS_PRICE }))
        .await;
    resp.assert_status(StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Confirmation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn confirm_credits_points_once() {
    let (app, ctx) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let token = common::login(&ctx, "usr_buyer").await;
    let (session_id, merchant_uid) = create_session(&server, &token).await;
    ctx.provider
        .answer("imp_1", &merchant_uid, ProviderStatus::Paid, GEMS_PRICE);

    let resp = server
        .post(&format!("/api/v1/payments/sessions/{session_id}/prepare"))
        .add_header(AUTHORIZATION, bearer(&token))
        .await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<Value>()["status"], "prepared");

    let resp = server
        .post(&format!("/api/v1/payments/sessions/{session_id}/confirm"))
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({ "imp_uid": "imp_1", "amount": GEMS_PRICE }))
        .await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["result"], "credited");
    assert_eq!(body["balance"], GEMS_POINTS);
    assert_eq!(body["session"]["status"], "paid");
    assert_eq!(body["session"]["provider_payment_key"], "imp_1");

    // Client retry.
    let resp = server
        .post(&format!("/api/v1/payments/sessions/{session_id}/confirm"))
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({ "payment_key": "imp_1", "amount": GEMS_PRICE }))
        .await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<Value>()["result"], "already_finalized");

    assert_eq!(balance(&server, &token).await, GEMS_POINTS);
    assert_eq!(ctx.store.ledger().len(), 1);
}

#[tokio::test]
async fn confirm_with_wrong_amount_is_rejected_and_session_untouched() {
    let (app, ctx) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let token = common::login(&ctx, "usr_buyer").await;
    let (session_id, merchant_uid) = create_session(&server, &token).await;
    ctx.provider
        .answer("imp_1", &merchant_uid, ProviderStatus::Paid, GEMS_PRICE);

    let resp = server
        .post(&format!("/api/v1/payments/sessions/{session_id}/confirm"))
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({ "payment_key": "imp_1", "amount": 100 }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(resp.json::<Value>()["error"]["code"], "AMOUNT_MISMATCH");

    let resp = server
        .get(&format!("/api/v1/payments/sessions/{session_id}"))
        .add_header(AUTHORIZATION, bearer(&token))
        .await;
    assert_eq!(resp.json::<Value>()["status"], "created");
    assert_eq!(balance(&server, &token).await, 0);
}

#[tokio::test]
async fn provider_disagreement_fails_the_session() {
    let (app, ctx) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let token = common::login(&ctx, "usr_buyer").await;
    let (session_id, merchant_uid) = create_session(&server, &token).await;
    ctx.provider
        .answer("imp_1", &merchant_uid, ProviderStatus::Paid, 10);

    let resp = server
        .post(&format!("/api/v1/payments/sessions/{session_id}/confirm"))
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({ "payment_key": "imp_1", "amount": GEMS_PRICE }))
        .await;
    resp.assert_status(StatusCode::PAYMENT_REQUIRED);
    assert_eq!(resp.json::<Value>()["error"]["code"], "PROVIDER_MISMATCH");

    let resp = server
        .get(&format!("/api/v1/payments/sessions/{session_id}"))
        .add_header(AUTHORIZATION, bearer(&token))
        .await;
    let body: Value = resp.json();
    assert_eq!(body["status"], "failed");
    assert!(body["failure_reason"].as_str().unwrap().contains("mismatch"));
    assert_eq!(balance(&server, &token).await, 0);
}

#[tokio::test]
async fn pending_and_unreachable_provider_keep_session_open() {
    let (app, ctx) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let token = common::login(&ctx, "usr_buyer").await;
    let (session_id, merchant_uid) = create_session(&server, &token).await;
    ctx.provider
        .answer("imp_ready", &merchant_uid, ProviderStatus::Ready, GEMS_PRICE);

    let resp = server
        .post(&format!("/api/v1/payments/sessions/{session_id}/confirm"))
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({ "payment_key": "imp_ready", "amount": GEMS_PRICE }))
        .await;
    resp.assert_status(StatusCode::CONFLICT);
    assert_eq!(resp.json::<Value>()["error"]["code"], "PAYMENT_PENDING");

    let resp = server
        .post(&format!("/api/v1/payments/sessions/{session_id}/confirm"))
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({ "payment_key": "imp_unknown", "amount": GEMS_PRICE }))
        .await;
    resp.assert_status(StatusCode::BAD_GATEWAY);

    let resp = server
        .get(&format!("/api/v1/payments/sessions/{session_id}"))
        .add_header(AUTHORIZATION, bearer(&token))
        .await;
    assert_eq!(resp.json::<Value>()["status"], "created");
}

#[tokio::test]
async fn credit_is_pushed_to_live_connections() {
    let (app, ctx) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let token = common::login(&ctx, "usr_live").await;
    let (session_id, merchant_uid) = create_session(&server, &token).await;
    ctx.provider
        .answer("imp_1", &merchant_uid, ProviderStatus::Paid, GEMS_PRICE);

    let mut outbound = ctx.state.hub.register("conn_live").await.unwrap();
    assert!(ctx
        .state
        .hub
        .authenticate("conn_live", "usr_live")
        .await
        .unwrap());

    server
        .post(&format!("/api/v1/payments/sessions/{session_id}/confirm"))
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({ "payment_key": "imp_1", "amount": GEMS_PRICE }))
        .await
        .assert_status_ok();

    let frame = outbound.recv().await.unwrap();
    let event: Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(event["type"], "points_credited");
    assert_eq!(event["session_id"], session_id);
    assert_eq!(event["balance"], GEMS_POINTS);
}

// ---------------------------------------------------------------------------
// Webhook
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_webhooks_credit_once() {
    let (app, ctx) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let token = common::login(&ctx, "usr_buyer").await;
    let (session_id, merchant_uid) = create_session(&server, &token).await;
    ctx.provider
        .answer("imp_w", &merchant_uid, ProviderStatus::Paid, GEMS_PRICE);

    let event = json!({ "imp_uid": "imp_w", "merchant_uid": merchant_uid, "status": "paid" });
    for _ in 0..3 {
        let resp = server.post("/api/v1/payments/webhook").json(&event).await;
        resp.assert_status_ok();
        assert_eq!(resp.json::<Value>()["status"], "ok");
    }

    assert_eq!(balance(&server, &token).await, GEMS_POINTS);

    // Late client confirm after the webhook won.
    let resp = server
        .post(&format!("/api/v1/payments/sessions/{session_id}/confirm"))
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({ "payment_key": "imp_w", "amount": GEMS_PRICE }))
        .await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<Value>()["result"], "already_finalized");
    assert_eq!(ctx.store.ledger().len(), 1);
}

#[tokio::test]
async fn webhook_does_not_trust_reported_status() {
    let (app, ctx) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let token = common::login(&ctx, "usr_buyer").await;
    let (_session_id, merchant_uid) = create_session(&server, &token).await;
    ctx.provider
        .answer("imp_w", &merchant_uid, ProviderStatus::Ready, GEMS_PRICE);

    let resp = server
        .post("/api/v1/payments/webhook")
        .json(&json!({ "imp_uid": "imp_w", "merchant_uid": merchant_uid, "status": "paid" }))
        .await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<Value>()["status"], "pending");
    assert_eq!(balance(&server, &token).await, 0);
}

#[tokio::test]
async fn webhook_for_unknown_order_is_ignored() {
    let (app, _ctx) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let resp = server
        .post("/api/v1/payments/webhook")
        .json(&json!({ "imp_uid": "imp_x", "merchant_uid": "order_missing", "status": "paid" }))
        .await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<Value>()["status"], "ignored");
}

#[tokio::test]
async fn webhook_with_another_orders_payment_leaves_session_payable() {
    let (app, ctx) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let token = common::login(&ctx, "usr_victim").await;
    let (session_id, merchant_uid) = create_session(&server, &token).await;
    ctx.provider
        .answer("imp_other", "order_other", ProviderStatus::Cancelled, GEMS_PRICE);

    let resp = server
        .post("/api/v1/payments/webhook")
        .json(&json!({ "imp_uid": "imp_other", "merchant_uid": merchant_uid, "status": "cancelled" }))
        .await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<Value>()["status"], "rejected");

    let resp = server
        .get(&format!("/api/v1/payments/sessions/{session_id}"))
        .add_header(AUTHORIZATION, bearer(&token))
        .await;
    assert_eq!(resp.json::<Value>()["status"], "created");

    // Confirming with someone else's payment is refused outright.
    let resp = server
        .post(&format!("/api/v1/payments/sessions/{session_id}/confirm"))
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({ "payment_key": "imp_other", "amount": GEMS_PRICE }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(resp.json::<Value>()["error"]["code"], "PAYMENT_ORDER_MISMATCH");

    ctx.provider
        .answer("imp_real", &merchant_uid, ProviderStatus::Paid, GEMS_PRICE);
    let resp = server
        .post(&format!("/api/v1/payments/sessions/{session_id}/confirm"))
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({ "payment_key": "imp_real", "amount": GEMS_PRICE }))
        .await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<Value>()["result"], "credited");
    assert_eq!(balance(&server, &token).await, GEMS_POINTS);
}

#[tokio::test]
async fn path_like_payment_key_is_rejected() {
    let (app, ctx) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let token = common::login(&ctx, "usr_buyer").await;
    let (session_id, _) = create_session(&server, &token).await;

    let resp = server
        .post(&format!("/api/v1/payments/sessions/{session_id}/confirm"))
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({ "payment_key": "../users/getToken", "amount": GEMS_PRICE }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(resp.json::<Value>()["error"]["code"], "INVALID_PAYMENT_KEY");
}

// ---------------------------------------------------------------------------
// Cancel and history
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancelled_session_cannot_be_paid() {
    let (app, ctx) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let token = common::login(&ctx, "usr_buyer").await;
    let (session_id, merchant_uid) = create_session(&server, &token).await;

    let resp = server
        .post(&format!("/api/v1/payments/sessions/{session_id}/cancel"))
        .add_header(AUTHORIZATION, bearer(&token))
        .await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<Value>()["status"], "cancelled");

    let resp = server
        .post(&format!("/api/v1/payments/sessions/{session_id}/prepare"))
        .add_header(AUTHORIZATION, bearer(&token))
        .await;
    resp.assert_status(StatusCode::CONFLICT);

    ctx.provider
        .answer("imp_late", &merchant_uid, ProviderStatus::Paid, GEMS_PRICE);
    let resp = server
        .post("/api/v1/payments/webhook")
        .json(&json!({ "imp_uid": "imp_late", "merchant_uid": merchant_uid }))
        .await;
    resp.assert_status_ok();
    assert_eq!(balance(&server, &token).await, 0);
}

#[tokio::test]
async fn history_lists_own_sessions_newest_first() {
    let (app, ctx) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let token = common::login(&ctx, "usr_hist").await;
    let other = common::login(&ctx, "usr_else").await;

    let (first, _) = create_session(&server, &token).await;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let (second, _) = create_session(&server, &token).await;
    create_session(&server, &other).await;

    let resp = server
        .get("/api/v1/me/payments")
        .add_header(AUTHORIZATION, bearer(&token))
        .await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![second.as_str(), first.as_str()]);
    assert_eq!(body["limit"], 20);

    let resp = server
        .get("/api/v1/me/payments?limit=1&offset=1")
        .add_header(AUTHORIZATION, bearer(&token))
        .await;
    let body: Value = resp.json();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["id"], first);
}

#[tokio::test]
async fn health_reports_hub_stats() {
    let (app, ctx) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let _rx = ctx.state.hub.register("conn_h").await.unwrap();

    let resp = server.get("/health").await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["hub"]["connections"], 1);

    ctx.state.hub.shutdown().await.unwrap();
    let resp = server.get("/health").await;
    resp.assert_status(StatusCode::SERVICE_UNAVAILABLE);
}
