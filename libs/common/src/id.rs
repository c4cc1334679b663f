use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = arcade_common::id::prefixed_ulid("pay");
/// assert!(id.starts_with("pay_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// Well-known ID prefixes.
pub mod prefix {
    pub const USER: &str = "usr";
    pub const CONNECTION: &str = "conn";
    pub const PAYMENT_SESSION: &str = "pay";
    pub const ORDER: &str = "order";
    pub const ITEM: &str = "item";
}
