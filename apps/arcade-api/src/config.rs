/// Arcade API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Redis holding the access tokens written by the auth service.
    pub redis_url: String,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Payment provider settings.
    pub portone: PortOneConfig,
    /// Outbound queue capacity per live connection. A connection whose queue
    /// is full when a message arrives is disconnected.
    pub hub_connection_queue: usize,
    /// Capacity of the hub's command queue.
    pub hub_command_queue: usize,
}

/// PortOne (iamport) REST credentials.
#[derive(Debug, Clone)]
pub struct PortOneConfig {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
    /// Merchant store id exposed to the client SDK.
    pub store_id: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_var("DATABASE_URL"),
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379/0".to_string()),
            port: parsed_var("PORT").unwrap_or(4100),
            portone: PortOneConfig {
                base_url: std::env::var("PORTONE_BASE_URL")
                    .ok()
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| "https://api.iamport.kr".to_string()),
                api_key: std::env::var("PORTONE_API_KEY").unwrap_or_default(),
                api_secret: std::env::var("PORTONE_API_SECRET").unwrap_or_default(),
                store_id: std::env::var("PORTONE_STORE_ID").unwrap_or_default(),
            },
            hub_connection_queue: parsed_var("HUB_CONNECTION_QUEUE").unwrap_or(64),
            hub_command_queue: parsed_var("HUB_COMMAND_QUEUE").unwrap_or(1024),
        }
    }
}

impl PortOneConfig {
    /// True when real credentials are present.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
