use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::ws::Message;
use kindred_core::protocol::PushMessage;
use kindred_core::types::{DbId, Timestamp};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// Connection identifier, one per upgraded socket.
pub type ConnId = Uuid;

pub struct WsConnection {
    /// Authenticated owner; a user may hold many connections (tabs, devices).
    pub user_id: DbId,
    pub sender: WsSender,
    pub connected_at: Timestamp,
}

/// Registry of live WebSocket connections.
///
/// Thread-safe via interior `RwLock`; shared as `Arc<WsManager>`. Sends are
/// fire-and-forget: a closed channel is skipped and cleaned up when its
/// receive loop exits.
pub struct WsManager {
    connections: RwLock<HashMap<ConnId, WsConnection>>,
}

impl WsManager {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection and return the receiver its sender task drains.
    pub async fn add(&self, conn_id: ConnId, user_id: DbId) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = WsConnection {
            user_id,
            sender: tx,
            connected_at: chrono::Utc::now(),
        };
        self.connections.write().await.insert(conn_id, conn);
        rx
    }

    pub async fn remove(&self, conn_id: ConnId) {
        self.connections.write().await.remove(&conn_id);
    }

    /// Send to one connection. Returns `false` if it is gone.
    pub async fn send_to_connection(&self, conn_id: ConnId, message: Message) -> bool {
        self.connections
            .read()
            .await
            .get(&conn_id)
            .is_some_and(|conn| conn.sender.send(message).is_ok())
    }

    /// Send to every connection of `user_id`. Returns how many were reached.
    pub async fn send_to_user(&self, user_id: DbId, message: Message) -> usize {
        let conns = self.connections.read().await;
        let mut count = 0;
        for conn in conns.values().filter(|conn| conn.user_id == user_id) {
            if conn.sender.send(message.clone()).is_ok() {
                count += 1;
            }
        }
        count
    }

    /// Serialize and send a push frame to every connection of `user_id`.
    pub async fn push_to_user(&self, user_id: DbId, message: &PushMessage) -> usize {
        match encode(message) {
            Some(frame) => self.send_to_user(user_id, frame).await,
            None => 0,
        }
    }

    pub async fn user_connection_count(&self, user_id: DbId) -> usize {
        self.connections
            .read()
            .await
            .values()
            .filter(|conn| conn.user_id == user_id)
            .count()
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Send a Close frame to every connection, then clear the map.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Close(None));
        }
        conns.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }

    /// Send a Ping frame to every connection.
    pub async fn ping_all(&self) {
        let conns = self.connections.read().await;
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Ping(Bytes::new()));
        }
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialize a push frame as a text message.
pub fn encode(message: &PushMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize push message");
            None
        }
    }
}
