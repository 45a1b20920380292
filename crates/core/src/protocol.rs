//! WebSocket message protocol for match delivery and popup sync.
//!
//! This module lives in `core` so that the server's router and WebSocket
//! handler and the client's push connection share one definition of every
//! frame. Messages are JSON with an internally-tagged `"type"` discriminator.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::candidate::CandidateProfile;
use crate::matching::MatchEvent;
use crate::popup::DismissAction;
use crate::types::{DbId, MatchId, Timestamp};

/// Broadcast when a popup is dismissed, to other tabs of the same user and
/// to the peer's active clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DismissSignal {
    pub match_id: MatchId,
    pub dismissed_by_user_id: DbId,
    pub action: DismissAction,
    /// Client instance that produced the signal; receivers drop their own.
    pub origin: Uuid,
}

/// A match as delivered to one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchDelivery {
    pub match_id: MatchId,
    pub user_a: DbId,
    pub user_b: DbId,
    pub created_at: Timestamp,
    /// The recipient's peer, when the sender already had it at hand.
    #[serde(default)]
    pub matched_profile: Option<CandidateProfile>,
    /// Re-display even if the popup was already shown or dismissed.
    #[serde(default)]
    pub force: bool,
}

impl MatchDelivery {
    pub fn new(event: MatchEvent) -> Self {
        Self {
            match_id: event.match_id,
            user_a: event.user_a,
            user_b: event.user_b,
            created_at: event.created_at,
            matched_profile: None,
            force: false,
        }
    }

    pub fn with_profile(mut self, profile: CandidateProfile) -> Self {
        self.matched_profile = Some(profile);
        self
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn event(&self) -> MatchEvent {
        MatchEvent {
            match_id: self.match_id,
            user_a: self.user_a,
            user_b: self.user_b,
            created_at: self.created_at,
        }
    }
}

/// Server -> client frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PushMessage {
    #[serde(rename = "match.created")]
    MatchCreated(MatchDelivery),

    #[serde(rename = "popup.dismissed")]
    PopupDismissed(DismissSignal),
}

/// Client -> server frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "popup.dismissed")]
    PopupDismissed(DismissSignal),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_types;

    fn delivery() -> MatchDelivery {
        MatchDelivery::new(MatchEvent {
            match_id: 3,
            user_a: 1,
            user_b: 2,
            created_at: chrono::Utc::now(),
        })
    }

    #[test]
    fn match_created_is_tagged_with_event_type() {
        let json = serde_json::to_value(PushMessage::MatchCreated(delivery())).unwrap();
        assert_eq!(json["type"], event_types::MATCH_CREATED);
        assert_eq!(json["match_id"], 3);
        assert_eq!(json["force"], false);
    }

    #[test]
    fn force_and_profile_default_when_absent() {
        let raw = r#"{"type":"match.created","match_id":3,"user_a":1,"user_b":2,"created_at":"2026-01-01T00:00:00Z"}"#;
        let msg: PushMessage = serde_json::from_str(raw).unwrap();
        match msg {
            PushMessage::MatchCreated(d) => {
                assert!(!d.force);
                assert!(d.matched_profile.is_none());
            }
            other => panic!("Expected MatchCreated, got {other:?}"),
        }
    }

    #[test]
    fn dismiss_signal_uses_shared_tag() {
        let signal = DismissSignal {
            match_id: 3,
            dismissed_by_user_id: 1,
            action: DismissAction::Continue,
            origin: Uuid::nil(),
        };
        let json = serde_json::to_value(ClientMessage::PopupDismissed(signal.clone())).unwrap();
        assert_eq!(json["type"], event_types::POPUP_DISMISSED);
        assert_eq!(json["action"], "continue");

        let back: PushMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, PushMessage::PopupDismissed(signal));
    }

    #[test]
    fn builder_sets_force() {
        assert!(delivery().forced().force);
    }
}
