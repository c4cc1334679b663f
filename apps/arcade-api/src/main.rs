use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use arcade_api::config::Config;
use arcade_api::db::kv::{KeyValueStore, RedisStore};
use arcade_api::hub::{Hub, HubConfig};
use arcade_api::payments::{PaymentCoordinator, PgPaymentStore, PortOneClient};
use arcade_api::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing, env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    let db = arcade_api::db::pool::connect(&config.database_url)
        .expect("failed to build connection pool");

    let kv: Arc<dyn KeyValueStore> = Arc::new(
        RedisStore::connect(&config.redis_url)
            .await
            .expect("failed to connect to redis"),
    );

    if !config.portone.is_configured() {
        tracing::warn!("PORTONE_API_KEY/PORTONE_API_SECRET not set; payment confirmation disabled");
    }
    let provider = PortOneClient::new(config.portone.clone()).expect("failed to build HTTP client");
    let payments = PaymentCoordinator::new(Arc::new(PgPaymentStore::new(db)), Arc::new(provider));

    let hub = Hub::spawn(HubConfig {
        connection_queue: config.hub_connection_queue,
        command_queue: config.hub_command_queue,
    });

    let state = AppState {
        kv,
        config: Arc::new(config),
        hub: hub.clone(),
        payments: Arc::new(payments),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(arcade_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "arcade-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    match hub.shutdown().await {
        Ok(drained) => tracing::info!(drained, "connections drained"),
        Err(err) => tracing::warn!(%err, "hub already stopped"),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
