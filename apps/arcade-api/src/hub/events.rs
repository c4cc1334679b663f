//! WebSocket wire format. Every frame is a JSON object tagged by `type`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::connection::Frame;

/// Longest chat message accepted, in characters.
pub const MAX_CONTENT_CHARS: usize = 2000;

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Identify {
        token: String,
    },
    Join {
        room_id: String,
    },
    Leave {
        room_id: String,
    },
    /// Either `room_id` (room chat) or `receiver` (private message to a user).
    Chat {
        #[serde(default)]
        room_id: Option<String>,
        #[serde(default)]
        receiver: Option<String>,
        content: String,
    },
    Game {
        room_id: String,
        #[serde(default)]
        content: Value,
    },
    Ping,
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Ready {
        connection_id: String,
        user_id: String,
    },
    Chat {
        #[serde(skip_serializing_if = "Option::is_none")]
        room_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        receiver: Option<String>,
        sender: String,
        content: String,
        timestamp: DateTime<Utc>,
    },
    Game {
        room_id: String,
        sender: String,
        content: Value,
        timestamp: DateTime<Utc>,
    },
    System {
        #[serde(skip_serializing_if = "Option::is_none")]
        room_id: Option<String>,
        content: String,
        timestamp: DateTime<Utc>,
    },
    PointsCredited {
        session_id: String,
        points: i64,
        balance: i64,
        timestamp: DateTime<Utc>,
    },
    Pong,
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    pub fn system(room_id: Option<String>, content: impl Into<String>) -> Self {
        ServerMessage::System {
            room_id,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Serialize once into a frame shared by every recipient.
    pub fn to_frame(&self) -> Frame {
        match serde_json::to_string(self) {
            Ok(json) => Arc::from(json),
            Err(err) => {
                tracing::error!(?err, "failed to serialize server message");
                Arc::from(r#"{"type":"error","message":"internal error"}"#)
            }
        }
    }
}
