//! Live WebSocket connections: rooms, direct messages and server pushes.

pub mod connection;
pub mod events;
pub mod fanout;
pub mod server;

pub use connection::{ConnectionState, Frame, Outbound};
pub use events::{ClientMessage, ServerMessage};
pub use fanout::{BroadcastReport, Delivery, Hub, HubConfig, HubError, HubStats};
