//! Cross-Client Sync Channel.
//!
//! Dismissals travel two ways: to other tabs of the same user through a
//! [`TabSignalHub`] shared by every tab in the process, and to the peer's
//! clients through the push connection. Both legs are best-effort; the
//! popup tracker remains the authority.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use kindred_core::protocol::{ClientMessage, DismissSignal};
use kindred_core::types::DbId;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

const TAB_CHANNEL_CAPACITY: usize = 64;

/// Per-user broadcast channels connecting tabs in one process.
#[derive(Debug, Default)]
pub struct TabSignalHub {
    channels: Mutex<HashMap<DbId, broadcast::Sender<DismissSignal>>>,
}

impl TabSignalHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, user_id: DbId) -> broadcast::Receiver<DismissSignal> {
        self.sender(user_id).subscribe()
    }

    /// Returns the number of tabs that received the signal.
    pub fn publish(&self, user_id: DbId, signal: DismissSignal) -> usize {
        self.sender(user_id).send(signal).unwrap_or(0)
    }

    fn sender(&self, user_id: DbId) -> broadcast::Sender<DismissSignal> {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        channels
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(TAB_CHANNEL_CAPACITY).0)
            .clone()
    }
}

/// One client instance's end of the sync channel.
#[derive(Clone)]
pub struct SyncChannel {
    user_id: DbId,
    origin: Uuid,
    hub: Arc<TabSignalHub>,
    push: Option<mpsc::UnboundedSender<ClientMessage>>,
}

impl SyncChannel {
    /// A fresh client instance with a new origin id.
    pub fn new(user_id: DbId, hub: Arc<TabSignalHub>) -> Self {
        Self {
            user_id,
            origin: Uuid::new_v4(),
            hub,
            push: None,
        }
    }

    /// Also send dismissals to the server for relay to the peer.
    pub fn with_push(mut self, push: mpsc::UnboundedSender<ClientMessage>) -> Self {
        self.push = Some(push);
        self
    }

    pub fn origin(&self) -> Uuid {
        self.origin
    }

    pub fn user_id(&self) -> DbId {
        self.user_id
    }

    /// Signals published by this user's tabs, this one included.
    pub fn subscribe(&self) -> broadcast::Receiver<DismissSignal> {
        self.hub.subscribe(self.user_id)
    }

    /// Whether `signal` was produced by this instance.
    pub fn is_own(&self, signal: &DismissSignal) -> bool {
        signal.origin == self.origin
    }

    pub fn broadcast(&self, signal: DismissSignal) {
        let tabs = self.hub.publish(self.user_id, signal.clone());
        let pushed = match &self.push {
            Some(push) => push.send(ClientMessage::PopupDismissed(signal.clone())).is_ok(),
            None => false,
        };
        tracing::debug!(
            match_id = signal.match_id,
            action = ?signal.action,
            tabs,
            pushed,
            "Dismissal broadcast"
        );
    }
}
