//! Connection hub: tracks live connections and routes frames to them.
//!
//! A single actor task owns every connection and room. [`Hub`] is a cheap
//! cloneable handle that talks to it over a bounded command queue, with
//! replies on oneshot channels. Delivery never waits on a slow client: each
//! connection has a bounded outbound queue filled with `try_send`, and a
//! connection whose queue is full is dropped on the spot.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use utoipa::ToSchema;

use super::connection::{Connection, ConnectionState, Frame, Outbound, SendFailure};

/// Queue sizes for the hub.
#[derive(Debug, Clone, Copy)]
pub struct HubConfig {
    /// Outbound frames buffered per connection before it is dropped.
    pub connection_queue: usize,
    /// Commands buffered in front of the actor.
    pub command_queue: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            connection_queue: 64,
            command_queue: 1024,
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubError {
    #[error("hub has shut down")]
    Closed,
}

/// Result of a room broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Connections dropped because their queue was full or their writer was gone.
    pub evicted: Vec<String>,
}

/// Result of addressing a single connection or user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued on this many connections.
    Delivered(usize),
    /// The target was live but could not take the frame and has been dropped.
    Evicted,
    NotConnected,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct HubStats {
    pub connections: usize,
    pub authenticated: usize,
    pub users_online: usize,
    pub rooms: usize,
}

enum Command {
    Register {
        id: String,
        outbound: mpsc::Sender<Frame>,
        reply: oneshot::Sender<()>,
    },
    Unregister {
        id: String,
        reply: oneshot::Sender<bool>,
    },
    Authenticate {
        id: String,
        user_id: String,
        reply: oneshot::Sender<bool>,
    },
    Subscribe {
        id: String,
        room_id: String,
        reply: oneshot::Sender<bool>,
    },
    Unsubscribe {
        id: String,
        room_id: String,
        reply: oneshot::Sender<bool>,
    },
    IsSubscribed {
        id: String,
        room_id: String,
        reply: oneshot::Sender<bool>,
    },
    Broadcast {
        room_id: String,
        frame: Frame,
        reply: oneshot::Sender<BroadcastReport>,
    },
    Direct {
        id: String,
        frame: Frame,
        reply: oneshot::Sender<Delivery>,
    },
    SendToUser {
        user_id: String,
        frame: Frame,
        reply: oneshot::Sender<Delivery>,
    },
    IsUserOnline {
        user_id: String,
        reply: oneshot::Sender<bool>,
    },
    RoomMembers {
        room_id: String,
        reply: oneshot::Sender<Vec<String>>,
    },
    Stats {
        reply: oneshot::Sender<HubStats>,
    },
    Shutdown {
        reply: oneshot::Sender<usize>,
    },
}

/// Handle to the hub actor. Store one in `AppState`.
#[derive(Clone)]
pub struct Hub {
    commands: mpsc::Sender<Command>,
    connection_queue: usize,
}

impl Hub {
    /// Start the actor on the current runtime.
    pub fn spawn(config: HubConfig) -> Self {
        let (commands, rx) = mpsc::channel(config.command_queue.max(1));
        let actor = HubActor {
            commands: rx,
            connections: HashMap::new(),
            rooms: HashMap::new(),
            users: HashMap::new(),
        };
        tokio::spawn(actor.run());
        Self {
            commands,
            connection_queue: config.connection_queue.max(1),
        }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, HubError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| HubError::Closed)?;
        rx.await.map_err(|_| HubError::Closed)
    }

    /// Add a connection in the `connecting` state and return its outbound
    /// queue. An existing connection with the same id is replaced.
    pub async fn register(&self, id: impl Into<String>) -> Result<Outbound, HubError> {
        let (outbound, rx) = mpsc::channel(self.connection_queue);
        let id = id.into();
        self.request(|reply| Command::Register {
            id,
            outbound,
            reply,
        })
        .await?;
        Ok(rx)
    }

    /// Drop a connection and its room memberships. Returns whether it existed.
    pub async fn unregister(&self, id: &str) -> Result<bool, HubError> {
        let id = id.to_string();
        self.request(|reply| Command::Unregister { id, reply }).await
    }

    /// Bind a user to a `connecting` connection and open it.
    pub async fn authenticate(&self, id: &str, user_id: &str) -> Result<bool, HubError> {
        let (id, user_id) = (id.to_string(), user_id.to_string());
        self.request(|reply| Command::Authenticate { id, user_id, reply })
            .await
    }

    /// Join a room, creating it if needed. Only open connections may join.
    pub async fn subscribe(&self, id: &str, room_id: &str) -> Result<bool, HubError> {
        let (id, room_id) = (id.to_string(), room_id.to_string());
        self.request(|reply| Command::Subscribe { id, room_id, reply })
            .await
    }

    pub async fn unsubscribe(&self, id: &str, room_id: &str) -> Result<bool, HubError> {
        let (id, room_id) = (id.to_string(), room_id.to_string());
        self.request(|reply| Command::Unsubscribe { id, room_id, reply })
            .await
    }

    pub async fn is_subscribed(&self, id: &str, room_id: &str) -> Result<bool, HubError> {
        let (id, room_id) = (id.to_string(), room_id.to_string());
        self.request(|reply| Command::IsSubscribed { id, room_id, reply })
            .await
    }

    /// Queue `frame` on every connection in the room at the time of the call.
    pub async fn broadcast(
        &self,
        room_id: &str,
        frame: impl Into<Frame>,
    ) -> Result<BroadcastReport, HubError> {
        let (room_id, frame) = (room_id.to_string(), frame.into());
        self.request(|reply| Command::Broadcast {
            room_id,
            frame,
            reply,
        })
        .await
    }

    pub async fn direct_message(
        &self,
        id: &str,
        frame: impl Into<Frame>,
    ) -> Result<Delivery, HubError> {
        let (id, frame) = (id.to_string(), frame.into());
        self.request(|reply| Command::Direct { id, frame, reply })
            .await
    }

    /// Queue `frame` on every open connection of a user.
    pub async fn send_to_user(
        &self,
        user_id: &str,
        frame: impl Into<Frame>,
    ) -> Result<Delivery, HubError> {
        let (user_id, frame) = (user_id.to_string(), frame.into());
        self.request(|reply| Command::SendToUser {
            user_id,
            frame,
            reply,
        })
        .await
    }

    pub async fn is_user_online(&self, user_id: &str) -> Result<bool, HubError> {
        let user_id = user_id.to_string();
        self.request(|reply| Command::IsUserOnline { user_id, reply })
            .await
    }

    /// Connection ids in a room, sorted.
    pub async fn room_members(&self, room_id: &str) -> Result<Vec<String>, HubError> {
        let room_id = room_id.to_string();
        self.request(|reply| Command::RoomMembers { room_id, reply })
            .await
    }

    pub async fn stats(&self) -> Result<HubStats, HubError> {
        self.request(|reply| Command::Stats { reply }).await
    }

    /// Close every connection and stop the actor. Returns how many
    /// connections were drained. Later calls on any handle fail with
    /// [`HubError::Closed`].
    pub async fn shutdown(&self) -> Result<usize, HubError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }
}

struct HubActor {
    commands: mpsc::Receiver<Command>,
    connections: HashMap<String, Connection>,
    /// room id -> member connection ids
    rooms: HashMap<String, HashSet<String>>,
    /// user id -> open connection ids
    users: HashMap<String, HashSet<String>>,
}

impl HubActor {
    async fn run(mut self) {
        tracing::debug!("hub started");
        while let Some(command) = self.commands.recv().await {
            match command {
                Command::Register {
                    id,
                    outbound,
                    reply,
                } => {
                    self.register(id, outbound);
                    let _ = reply.send(());
                }
                Command::Unregister { id, reply } => {
                    let _ = reply.send(self.remove(&id, "unregistered"));
                }
                Command::Authenticate { id, user_id, reply } => {
                    let _ = reply.send(self.authenticate(&id, user_id));
                }
                Command::Subscribe { id, room_id, reply } => {
                    let _ = reply.send(self.subscribe(&id, room_id));
                }
                Command::Unsubscribe { id, room_id, reply } => {
                    let _ = reply.send(self.unsubscribe(&id, &room_id));
                }
                Command::IsSubscribed { id, room_id, reply } => {
                    let member = self
                        .rooms
                        .get(&room_id)
                        .is_some_and(|members| members.contains(&id));
                    let _ = reply.send(member);
                }
                Command::Broadcast {
                    room_id,
                    frame,
                    reply,
                } => {
                    let _ = reply.send(self.broadcast(&room_id, frame));
                }
                Command::Direct { id, frame, reply } => {
                    let _ = reply.send(self.direct(&id, frame));
                }
                Command::SendToUser {
                    user_id,
                    frame,
                    reply,
                } => {
                    let _ = reply.send(self.send_to_user(&user_id, frame));
                }
                Command::IsUserOnline { user_id, reply } => {
                    let _ = reply.send(self.users.contains_key(&user_id));
                }
                Command::RoomMembers { room_id, reply } => {
                    let mut members: Vec<String> = self
                        .rooms
                        .get(&room_id)
                        .map(|m| m.iter().cloned().collect())
                        .unwrap_or_default();
                    members.sort();
                    let _ = reply.send(members);
                }
                Command::Stats { reply } => {
                    let _ = reply.send(self.stats());
                }
                Command::Shutdown { reply } => {
                    let drained = self.drain();
                    tracing::info!(drained, "hub shut down");
                    let _ = reply.send(drained);
                    return;
                }
            }
        }

        // Every handle was dropped.
        let drained = self.drain();
        tracing::debug!(drained, "hub stopped");
    }

    fn register(&mut self, id: String, outbound: mpsc::Sender<Frame>) {
        if self.connections.contains_key(&id) {
            self.remove(&id, "replaced");
        }
        tracing::debug!(connection_id = %id, "connection registered");
        self.connections
            .insert(id.clone(), Connection::new(id, outbound));
    }

    fn authenticate(&mut self, id: &str, user_id: String) -> bool {
        let Some(conn) = self.connections.get_mut(id) else {
            return false;
        };
        if !conn.transition(ConnectionState::Open) {
            return false;
        }
        conn.user_id = Some(user_id.clone());
        tracing::debug!(connection_id = %id, %user_id, "connection authenticated");
        self.users
            .entry(user_id)
            .or_default()
            .insert(id.to_string());
        true
    }

    fn subscribe(&mut self, id: &str, room_id: String) -> bool {
        let Some(conn) = self.connections.get_mut(id) else {
            return false;
        };
        if conn.state() != ConnectionState::Open {
            return false;
        }
        conn.rooms.insert(room_id.clone());
        self.rooms.entry(room_id).or_default().insert(id.to_string());
        true
    }

    fn unsubscribe(&mut self, id: &str, room_id: &str) -> bool {
        if let Some(conn) = self.connections.get_mut(id) {
            conn.rooms.remove(room_id);
        }
        self.leave_room(id, room_id)
    }

    /// Remove one membership, deleting the room once empty.
    fn leave_room(&mut self, id: &str, room_id: &str) -> bool {
        let Entry::Occupied(mut room) = self.rooms.entry(room_id.to_string()) else {
            return false;
        };
        let removed = room.get_mut().remove(id);
        if room.get().is_empty() {
            room.remove();
            tracing::debug!(%room_id, "room removed");
        }
        removed
    }

    fn broadcast(&mut self, room_id: &str, frame: Frame) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let Some(members) = self.rooms.get(room_id) else {
            return report;
        };

        let mut failed = Vec::new();
        for id in members {
            match self.connections.get(id).map(|c| c.try_send(frame.clone())) {
                Some(Ok(())) => report.delivered += 1,
                Some(Err(failure)) => failed.push((id.clone(), failure)),
                None => failed.push((id.clone(), SendFailure::Disconnected)),
            }
        }

        for (id, failure) in failed {
            self.remove(&id, failure.as_str());
            report.evicted.push(id);
        }
        report.evicted.sort();
        report
    }

    fn direct(&mut self, id: &str, frame: Frame) -> Delivery {
        let Some(conn) = self.connections.get(id) else {
            return Delivery::NotConnected;
        };
        match conn.try_send(frame) {
            Ok(()) => Delivery::Delivered(1),
            Err(failure) => {
                self.remove(id, failure.as_str());
                Delivery::Evicted
            }
        }
    }

    fn send_to_user(&mut self, user_id: &str, frame: Frame) -> Delivery {
        let Some(ids) = self.users.get(user_id) else {
            return Delivery::NotConnected;
        };

        let mut delivered = 0;
        let mut failed = Vec::new();
        for id in ids {
            match self.connections.get(id).map(|c| c.try_send(frame.clone())) {
                Some(Ok(())) => delivered += 1,
                Some(Err(failure)) => failed.push((id.clone(), failure)),
                None => failed.push((id.clone(), SendFailure::Disconnected)),
            }
        }
        let evicted = !failed.is_empty();
        for (id, failure) in failed {
            self.remove(&id, failure.as_str());
        }

        match (delivered, evicted) {
            (0, true) => Delivery::Evicted,
            (0, false) => Delivery::NotConnected,
            (n, _) => Delivery::Delivered(n),
        }
    }

    /// Close a connection and clean up its rooms and user index entry.
    fn remove(&mut self, id: &str, reason: &str) -> bool {
        let Some(mut conn) = self.connections.remove(id) else {
            return false;
        };

        conn.transition(ConnectionState::Closing);
        for room_id in std::mem::take(&mut conn.rooms) {
            self.leave_room(id, &room_id);
        }
        if let Some(user_id) = conn.user_id.as_deref() {
            if let Entry::Occupied(mut entry) = self.users.entry(user_id.to_string()) {
                entry.get_mut().remove(id);
                if entry.get().is_empty() {
                    entry.remove();
                }
            }
        }
        conn.transition(ConnectionState::Closed);

        tracing::debug!(
            connection_id = %id,
            user_id = conn.user_id.as_deref().unwrap_or("-"),
            %reason,
            "connection closed"
        );
        // Dropping `conn` closes its outbound queue, which ends its writer.
        true
    }

    fn drain(&mut self) -> usize {
        let ids: Vec<String> = self.connections.keys().cloned().collect();
        for id in &ids {
            self.remove(id, "hub shutting down");
        }
        ids.len()
    }

    fn stats(&self) -> HubStats {
        HubStats {
            connections: self.connections.len(),
            authenticated: self
                .connections
                .values()
                .filter(|c| c.state() == ConnectionState::Open)
                .count(),
            users_online: self.users.len(),
            rooms: self.rooms.len(),
        }
    }
}
