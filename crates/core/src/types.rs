/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Client-generated idempotency key for a single swipe gesture (UUID v7).
pub type SwipeKey = uuid::Uuid;

/// Identifier of a row in the `matches` table.
pub type MatchId = DbId;
