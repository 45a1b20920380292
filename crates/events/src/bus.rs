//! Fan-out event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is shared via `Arc<EventBus>` across the server. Delivery is
//! best-effort: a subscriber that falls behind observes `RecvError::Lagged`
//! and the skipped events are gone. Anything that must survive that (match
//! delivery) is also recoverable from the database.

use chrono::{DateTime, Utc};
use kindred_core::event_types;
use kindred_core::matching::MatchEvent;
use kindred_core::protocol::DismissSignal;
use kindred_core::types::DbId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// DomainEvent
// ---------------------------------------------------------------------------

/// Something that happened and that other parts of the server react to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Dot-separated event name, one of [`event_types`].
    pub event_type: String,

    /// Source entity kind (e.g. `"match"`, `"swipe"`).
    pub source_entity_type: Option<String>,

    pub source_entity_id: Option<DbId>,

    /// User whose request produced the event.
    pub actor_user_id: Option<DbId>,

    /// Event-specific body; decode with [`DomainEvent::decode`].
    pub payload: serde_json::Value,

    pub timestamp: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            source_entity_type: None,
            source_entity_id: None,
            actor_user_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    /// A newly created mutual match.
    pub fn match_created(event: &MatchEvent, actor_user_id: DbId) -> Self {
        Self::new(event_types::MATCH_CREATED)
            .with_source("match", event.match_id)
            .with_actor(actor_user_id)
            .with_payload(serde_json::to_value(event).unwrap_or_default())
    }

    /// A popup dismissal received from one of `signal.dismissed_by_user_id`'s
    /// clients, to be relayed to both participants.
    pub fn popup_dismissed(signal: &DismissSignal) -> Self {
        Self::new(event_types::POPUP_DISMISSED)
            .with_source("match", signal.match_id)
            .with_actor(signal.dismissed_by_user_id)
            .with_payload(serde_json::to_value(signal).unwrap_or_default())
    }

    pub fn with_source(mut self, entity_type: impl Into<String>, entity_id: DbId) -> Self {
        self.source_entity_type = Some(entity_type.into());
        self.source_entity_id = Some(entity_id);
        self
    }

    pub fn with_actor(mut self, user_id: DbId) -> Self {
        self.actor_user_id = Some(user_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Deserialize the payload into its typed form.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

const DEFAULT_CAPACITY: usize = 1024;

pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    /// Create a bus buffering at most `capacity` undelivered events per
    /// subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers. Returns how many received it.
    pub fn publish(&self, event: DomainEvent) -> usize {
        let event_type = event.event_type.clone();
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                tracing::debug!(event_type = %event_type, "Event published with no subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
