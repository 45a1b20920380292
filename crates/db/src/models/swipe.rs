//! Swipe rows and the outcomes of recording or invalidating one.

use kindred_core::swipe::SwipeAction;
use kindred_core::types::{DbId, SwipeKey, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::match_record::MatchRecord;

/// A row from the `swipes` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Swipe {
    pub id: DbId,
    pub swipe_key: SwipeKey,
    pub user_id: DbId,
    pub target_user_id: DbId,
    pub action: String,
    pub created_at: Timestamp,
    pub invalidated_at: Option<Timestamp>,
}

impl Swipe {
    pub fn is_active(&self) -> bool {
        self.invalidated_at.is_none()
    }

    pub fn is_like(&self) -> bool {
        self.action == SwipeAction::Like.as_str()
    }
}

/// DTO for recording a swipe.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSwipe {
    pub swipe_key: SwipeKey,
    pub target_user_id: DbId,
    pub action: SwipeAction,
}

/// Result of [`SwipeRepo::record`](crate::repositories::SwipeRepo::record).
#[derive(Debug, Clone)]
pub struct RecordedSwipe {
    pub swipe: Swipe,
    /// The pair's match, if this swipe completed (or had completed) one.
    pub matched: Option<MatchRecord>,
    /// `true` only for the call that inserted the match row.
    pub match_created: bool,
}

/// Result of [`SwipeRepo::invalidate`](crate::repositories::SwipeRepo::invalidate).
#[derive(Debug, Clone, Default)]
pub struct InvalidatedSwipe {
    /// The row this call invalidated; `None` if it was already inactive or
    /// has not arrived yet (the tombstone covers that case).
    pub swipe: Option<Swipe>,
    /// Id of the match removed because a Like was withdrawn.
    pub retracted_match_id: Option<DbId>,
}
