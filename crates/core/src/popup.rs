//! Match popup lifecycle.
//!
//! [`PopupState`] is the durable, per-client record of whether a match
//! notification has been shown or dismissed. [`MatchPhase`] is the
//! in-memory progress of one delivery through the notifier.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Which of the two popup actions dismissed a match notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DismissAction {
    /// Dismiss and open the conversation for the match.
    Message,
    /// Dismiss and keep swiping.
    Continue,
}

/// Durable popup state for one (user, match) pair.
///
/// `Unseen -> Shown -> Dismissed(action)`. `Dismissed` is terminal unless
/// an explicit force flag re-triggers display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "action", rename_all = "lowercase")]
pub enum PopupState {
    #[default]
    Unseen,
    Shown,
    Dismissed(DismissAction),
}

impl PopupState {
    /// Whether a delivery may display the popup.
    pub fn can_show(self, force: bool) -> bool {
        matches!(self, PopupState::Unseen) || force
    }

    /// Transition to `Shown`.
    pub fn show(self, force: bool) -> Result<PopupState, CoreError> {
        if self.can_show(force) {
            Ok(PopupState::Shown)
        } else {
            Err(CoreError::Conflict(format!(
                "popup already {}",
                self.label()
            )))
        }
    }

    /// Transition to `Dismissed`. The first recorded action wins.
    pub fn dismiss(self, action: DismissAction) -> PopupState {
        match self {
            PopupState::Dismissed(_) => self,
            _ => PopupState::Dismissed(action),
        }
    }

    pub fn is_dismissed(self) -> bool {
        matches!(self, PopupState::Dismissed(_))
    }

    pub fn has_been_shown(self) -> bool {
        !matches!(self, PopupState::Unseen)
    }

    pub fn label(self) -> &'static str {
        match self {
            PopupState::Unseen => "unseen",
            PopupState::Shown => "shown",
            PopupState::Dismissed(_) => "dismissed",
        }
    }
}

/// Progress of a single delivery through the notifier, scoped to
/// (client instance, match id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPhase {
    Idle,
    /// Accepted for display; peer data not yet resolved.
    Armed,
    /// Peer data available; about to display.
    Ready,
    Displayed,
    Dismissed,
}
