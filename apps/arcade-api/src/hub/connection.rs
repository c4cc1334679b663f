//! Per-connection state owned by the hub actor.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// A serialized server frame. Cloning is a refcount bump, so one broadcast
/// shares a single allocation across every recipient.
pub type Frame = Arc<str>;

/// Receiving half of a connection's outbound queue, drained by its writer task.
pub type Outbound = mpsc::Receiver<Frame>;

/// Lifecycle of a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Socket accepted, identify not yet received.
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        }
    }

    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Open) | (Connecting, Closing) | (Open, Closing) | (Closing, Closed)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a frame could not be queued. Either way the connection is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFailure {
    QueueFull,
    Disconnected,
}

impl SendFailure {
    pub fn as_str(self) -> &'static str {
        match self {
            SendFailure::QueueFull => "outbound queue full",
            SendFailure::Disconnected => "writer gone",
        }
    }
}

pub struct Connection {
    pub id: String,
    /// Set once the connection authenticates.
    pub user_id: Option<String>,
    pub rooms: HashSet<String>,
    state: ConnectionState,
    outbound: mpsc::Sender<Frame>,
}

impl Connection {
    pub fn new(id: String, outbound: mpsc::Sender<Frame>) -> Self {
        Self {
            id,
            user_id: None,
            rooms: HashSet::new(),
            state: ConnectionState::Connecting,
            outbound,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Apply a state change if the transition table allows it.
    pub fn transition(&mut self, next: ConnectionState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                connection_id = %self.id,
                from = %self.state,
                to = %next,
                "rejected connection state transition"
            );
            return false;
        }
        self.state = next;
        true
    }

    /// Whether frames may still be queued.
    pub fn accepts_frames(&self) -> bool {
        matches!(self.state, ConnectionState::Connecting | ConnectionState::Open)
    }

    /// Queue a frame without waiting.
    pub fn try_send(&self, frame: Frame) -> Result<(), SendFailure> {
        if !self.accepts_frames() {
            return Err(SendFailure::Disconnected);
        }
        self.outbound.try_send(frame).map_err(|err| match err {
            TrySendError::Full(_) => SendFailure::QueueFull,
            TrySendError::Closed(_) => SendFailure::Disconnected,
        })
    }
}
