//! Swipe actions and the records the client keeps for them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::candidate::CandidateProfile;
use crate::error::CoreError;
use crate::types::{DbId, SwipeKey, Timestamp};

// ---------------------------------------------------------------------------
// SwipeAction
// ---------------------------------------------------------------------------

/// A Like or Dislike decision on a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwipeAction {
    Like,
    Dislike,
}

impl SwipeAction {
    /// Value stored in the `swipes.action` column.
    pub fn as_str(self) -> &'static str {
        match self {
            SwipeAction::Like => "like",
            SwipeAction::Dislike => "dislike",
        }
    }

    /// Animation direction associated with this action.
    pub fn direction(self) -> SwipeDirection {
        match self {
            SwipeAction::Like => SwipeDirection::Right,
            SwipeAction::Dislike => SwipeDirection::Left,
        }
    }
}

impl fmt::Display for SwipeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwipeAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(SwipeAction::Like),
            "dislike" => Ok(SwipeAction::Dislike),
            other => Err(CoreError::Validation(format!(
                "Invalid swipe action '{other}'. Must be one of: like, dislike"
            ))),
        }
    }
}

/// Direction tag carried by undo entries. Only used to pick the restore
/// animation; it has no bearing on correctness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwipeDirection {
    Left,
    Right,
}

// ---------------------------------------------------------------------------
// SwipeRecord
// ---------------------------------------------------------------------------

/// Client-side record of one swipe gesture.
///
/// Created at the moment of the gesture; `id` stays `None` until the server
/// acknowledges the durable write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwipeRecord {
    pub id: Option<DbId>,
    pub swipe_key: SwipeKey,
    pub target_user_id: DbId,
    pub action: SwipeAction,
    pub timestamp: Timestamp,
    /// Enough of the profile to re-render it instantly on undo.
    pub source_snapshot: CandidateProfile,
}

impl SwipeRecord {
    /// Record a new gesture against `profile`.
    pub fn new(profile: CandidateProfile, action: SwipeAction) -> Self {
        Self {
            id: None,
            swipe_key: uuid::Uuid::now_v7(),
            target_user_id: profile.user_id,
            action,
            timestamp: chrono::Utc::now(),
            source_snapshot: profile,
        }
    }

    /// Whether the server has acknowledged this record.
    pub fn is_acknowledged(&self) -> bool {
        self.id.is_some()
    }
}
