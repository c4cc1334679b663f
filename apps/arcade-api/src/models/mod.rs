pub mod item;
pub mod payment_session;
pub mod points;
