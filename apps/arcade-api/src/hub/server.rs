//! WebSocket upgrade handler and per-connection read/write loops.

use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::time;

use arcade_common::id::{prefix, prefixed_ulid};

use crate::auth::middleware::resolve_token;
use crate::AppState;

use super::connection::Outbound;
use super::events::{ClientMessage, ServerMessage, MAX_CONTENT_CHARS};
use super::fanout::{Delivery, Hub};

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

/// Close codes (4000-range for application-level).
const CLOSE_UNKNOWN_ERROR: u16 = 4000;
const CLOSE_NOT_AUTHENTICATED: u16 = 4003;
const CLOSE_AUTH_FAILED: u16 = 4004;
const CLOSE_DISCONNECTED: u16 = 4008;
const CLOSE_SESSION_TIMEOUT: u16 = 4009;

/// Timeout for receiving IDENTIFY after connection (seconds).
const IDENTIFY_TIMEOUT_SECS: u64 = 10;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let connection_id = prefixed_ulid(prefix::CONNECTION);
    let (mut ws_tx, mut ws_rx) = socket.split();

    let outbound = match state.hub.register(&connection_id).await {
        Ok(rx) => rx,
        Err(err) => {
            tracing::warn!(%err, "rejecting websocket: hub unavailable");
            let _ = send_close(&mut ws_tx, CLOSE_UNKNOWN_ERROR, "Server shutting down").await;
            return;
        }
    };

    // Step 1: wait for IDENTIFY within the timeout.
    let identified = time::timeout(
        Duration::from_secs(IDENTIFY_TIMEOUT_SECS),
        read_identify(&mut ws_rx),
    )
    .await;

    let token = match identified {
        Ok(Ok(token)) => token,
        Ok(Err((code, reason))) => {
            tracing::debug!(connection_id = %connection_id, %reason, "identify failed");
            let _ = send_close(&mut ws_tx, code, reason).await;
            let _ = state.hub.unregister(&connection_id).await;
            return;
        }
        Err(_timeout) => {
            let _ = send_close(&mut ws_tx, CLOSE_SESSION_TIMEOUT, "Handshake timeout").await;
            let _ = state.hub.unregister(&connection_id).await;
            return;
        }
    };

    // Step 2: resolve the token and open the connection.
    let user = match resolve_token(state.kv.as_ref(), &token).await {
        Ok(user) => user,
        Err(err) => {
            let _ = send_close(&mut ws_tx, CLOSE_AUTH_FAILED, err.message).await;
            let _ = state.hub.unregister(&connection_id).await;
            return;
        }
    };
    if !matches!(state.hub.authenticate(&connection_id, &user.user_id).await, Ok(true)) {
        let _ = send_close(&mut ws_tx, CLOSE_UNKNOWN_ERROR, "Connection no longer registered").await;
        let _ = state.hub.unregister(&connection_id).await;
        return;
    }

    tracing::info!(
        connection_id = %connection_id,
        user_id = %user.user_id,
        "websocket connection opened"
    );

    // Everything from here on reaches the socket through the hub queue, so
    // per-connection ordering is the queue's order.
    let mut writer = tokio::spawn(write_loop(ws_tx, outbound));
    let ready = ServerMessage::Ready {
        connection_id: connection_id.clone(),
        user_id: user.user_id.clone(),
    };
    let _ = state.hub.direct_message(&connection_id, ready.to_frame()).await;

    let session = Session {
        hub: &state.hub,
        connection_id: &connection_id,
        user_id: &user.user_id,
    };

    let mut writer_done = false;
    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if !session.handle_text(&text).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(?e, connection_id = %connection_id, "ws read error");
                        break;
                    }
                    Some(Ok(_)) => continue,
                }
            }

            // Writer ends when the hub drops the connection or the socket fails.
            _ = &mut writer => {
                writer_done = true;
                break;
            }
        }
    }

    let _ = state.hub.unregister(&connection_id).await;
    if !writer_done {
        let _ = writer.await;
    }

    tracing::info!(
        connection_id = %connection_id,
        user_id = %user.user_id,
        "websocket connection closed"
    );
}

/// Read frames until an `identify` arrives. Anything else closes the socket.
async fn read_identify(ws_rx: &mut WsStream) -> Result<String, (u16, &'static str)> {
    while let Some(msg) = ws_rx.next().await {
        let text = match msg {
            Ok(Message::Text(t)) => t,
            Ok(Message::Close(_)) => return Err((CLOSE_UNKNOWN_ERROR, "Client closed")),
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(?e, "ws read error during identify");
                return Err((CLOSE_UNKNOWN_ERROR, "Read error"));
            }
        };

        return match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::Identify { token }) => Ok(token),
            Ok(_) => Err((CLOSE_NOT_AUTHENTICATED, "Expected identify")),
            Err(_) => Err((CLOSE_UNKNOWN_ERROR, "Invalid message")),
        };
    }
    Err((CLOSE_UNKNOWN_ERROR, "Connection closed before identify"))
}

/// Drain the hub queue into the socket. Ends with a close frame once the hub
/// drops the connection.
async fn write_loop(mut ws_tx: WsSink, mut outbound: Outbound) {
    while let Some(frame) = outbound.recv().await {
        if ws_tx.send(Message::Text(frame.to_string().into())).await.is_err() {
            return;
        }
    }
    let _ = send_close(&mut ws_tx, CLOSE_DISCONNECTED, "Disconnected").await;
}

/// An authenticated connection's view of the hub.
struct Session<'a> {
    hub: &'a Hub,
    connection_id: &'a str,
    user_id: &'a str,
}

impl Session<'_> {
    /// Handle one client frame. Returns false when the connection should end.
    async fn handle_text(&self, text: &str) -> bool {
        let msg: ClientMessage = match serde_json::from_str(text) {
            Ok(m) => m,
            Err(_) => {
                self.reply(ServerMessage::error("Invalid message")).await;
                return true;
            }
        };

        match msg {
            ClientMessage::Identify { .. } => {
                self.reply(ServerMessage::error("Already identified")).await;
                false
            }
            ClientMessage::Ping => {
                self.reply(ServerMessage::Pong).await;
                true
            }
            ClientMessage::Join { room_id } => {
                if !matches!(self.hub.subscribe(self.connection_id, &room_id).await, Ok(true)) {
                    return false;
                }
                let notice = ServerMessage::system(
                    Some(room_id.clone()),
                    format!("{} joined", self.user_id),
                );
                self.hub.broadcast(&room_id, notice.to_frame()).await.is_ok()
            }
            ClientMessage::Leave { room_id } => {
                if matches!(self.hub.unsubscribe(self.connection_id, &room_id).await, Ok(true)) {
                    let notice =
                        ServerMessage::system(Some(room_id.clone()), format!("{} left", self.user_id));
                    let _ = self.hub.broadcast(&room_id, notice.to_frame()).await;
                }
                true
            }
            ClientMessage::Chat {
                room_id,
                receiver,
                content,
            } => self.chat(room_id, receiver, content).await,
            ClientMessage::Game { room_id, content } => {
                if !self.in_room(&room_id).await {
                    self.reply(ServerMessage::error("Not a member of this room")).await;
                    return true;
                }
                let msg = ServerMessage::Game {
                    room_id: room_id.clone(),
                    sender: self.user_id.to_string(),
                    content,
                    timestamp: Utc::now(),
                };
                self.hub.broadcast(&room_id, msg.to_frame()).await.is_ok()
            }
        }
    }

    async fn chat(&self, room_id: Option<String>, receiver: Option<String>, content: String) -> bool {
        let content = content.trim().to_string();
        if content.is_empty() || content.chars().count() > MAX_CONTENT_CHARS {
            self.reply(ServerMessage::error(format!(
                "Message must be 1-{MAX_CONTENT_CHARS} characters"
            )))
            .await;
            return true;
        }

        match (room_id, receiver) {
            (Some(room_id), None) => {
                if !self.in_room(&room_id).await {
                    self.reply(ServerMessage::error("Not a member of this room")).await;
                    return true;
                }
                let msg = ServerMessage::Chat {
                    room_id: Some(room_id.clone()),
                    receiver: None,
                    sender: self.user_id.to_string(),
                    content,
                    timestamp: Utc::now(),
                };
                self.hub.broadcast(&room_id, msg.to_frame()).await.is_ok()
            }
            (None, Some(receiver)) => {
                let msg = ServerMessage::Chat {
                    room_id: None,
                    receiver: Some(receiver.clone()),
                    sender: self.user_id.to_string(),
                    content,
                    timestamp: Utc::now(),
                };
                let frame = msg.to_frame();
                match self.hub.send_to_user(&receiver, frame.clone()).await {
                    Ok(Delivery::Delivered(_)) => {
                        // Echo to the sender's own connection.
                        if receiver != self.user_id {
                            let _ = self.hub.direct_message(self.connection_id, frame).await;
                        }
                        true
                    }
                    Ok(Delivery::NotConnected) | Ok(Delivery::Evicted) => {
                        self.reply(ServerMessage::error("User is not online")).await;
                        true
                    }
                    Err(_) => false,
                }
            }
            _ => {
                self.reply(ServerMessage::error("Chat needs exactly one of room_id or receiver"))
                    .await;
                true
            }
        }
    }

    async fn in_room(&self, room_id: &str) -> bool {
        matches!(self.hub.is_subscribed(self.connection_id, room_id).await, Ok(true))
    }

    async fn reply(&self, msg: ServerMessage) {
        let _ = self.hub.direct_message(self.connection_id, msg.to_frame()).await;
    }
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(ws_tx: &mut WsSink, code: u16, reason: &str) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
