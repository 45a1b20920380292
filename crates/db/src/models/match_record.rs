use kindred_core::matching::MatchEvent;
use kindred_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `matches` table. `user_low < user_high` always.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct MatchRecord {
    pub id: DbId,
    pub user_low: DbId,
    pub user_high: DbId,
    pub created_at: Timestamp,
}

impl MatchRecord {
    pub fn involves(&self, user_id: DbId) -> bool {
        self.user_low == user_id || self.user_high == user_id
    }

    pub fn to_event(&self) -> MatchEvent {
        MatchEvent {
            match_id: self.id,
            user_a: self.user_low,
            user_b: self.user_high,
            created_at: self.created_at,
        }
    }
}
