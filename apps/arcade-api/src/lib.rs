pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod hub;
pub mod models;
pub mod payments;
pub mod routes;

use std::sync::Arc;

use config::Config;
use db::kv::KeyValueStore;
use hub::Hub;
use payments::PaymentCoordinator;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub kv: Arc<dyn KeyValueStore>,
    pub config: Arc<Config>,
    pub hub: Hub,
    pub payments: Arc<PaymentCoordinator>,
}
