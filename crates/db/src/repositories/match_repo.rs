//! Repository for the `matches` table.
//!
//! Matches are keyed by the ordered `(user_low, user_high)` pair; the
//! unique constraint on that pair makes creation idempotent no matter
//! which side's like lands first.

use kindred_core::matching::ordered_pair;
use kindred_core::types::{DbId, Timestamp};
use sqlx::{PgConnection, PgPool};

use crate::models::match_record::MatchRecord;

/// Column list for `matches` queries.
const COLUMNS: &str = "id, user_low, user_high, created_at";

pub struct MatchRepo;

impl MatchRepo {
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<MatchRecord>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM matches WHERE id = $1");
        sqlx::query_as::<_, MatchRecord>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_pair(
        pool: &PgPool,
        a: DbId,
        b: DbId,
    ) -> Result<Option<MatchRecord>, sqlx::Error> {
        let mut conn = pool.acquire().await?;
        Self::find_by_pair_in(&mut conn, a, b).await
    }

    /// Matches involving `user_id` created at or after `since`, oldest first.
    pub async fn list_since_for_user(
        pool: &PgPool,
        user_id: DbId,
        since: Timestamp,
    ) -> Result<Vec<MatchRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM matches \
             WHERE (user_low = $1 OR user_high = $1) AND created_at >= $2 \
             ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, MatchRecord>(&query)
            .bind(user_id)
            .bind(since)
            .fetch_all(pool)
            .await
    }

    // ---- connection-scoped helpers used inside swipe transactions ----

    pub(crate) async fn find_by_pair_in(
        conn: &mut PgConnection,
        a: DbId,
        b: DbId,
    ) -> Result<Option<MatchRecord>, sqlx::Error> {
        let (low, high) = ordered_pair(a, b);
        let query = format!("SELECT {COLUMNS} FROM matches WHERE user_low = $1 AND user_high = $2");
        sqlx::query_as::<_, MatchRecord>(&query)
            .bind(low)
            .bind(high)
            .fetch_optional(conn)
            .await
    }

    /// Insert the pair's match unless it exists.
    ///
    /// Returns the match and whether this call created it.
    pub(crate) async fn create_if_absent(
        conn: &mut PgConnection,
        a: DbId,
        b: DbId,
    ) -> Result<(MatchRecord, bool), sqlx::Error> {
        let (low, high) = ordered_pair(a, b);
        let query = format!(
            "INSERT INTO matches (user_low, user_high) VALUES ($1, $2) \
             ON CONFLICT ON CONSTRAINT uq_matches_pair DO NOTHING \
             RETURNING {COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, MatchRecord>(&query)
            .bind(low)
            .bind(high)
            .fetch_optional(&mut *conn)
            .await?;
        if let Some(record) = inserted {
            return Ok((record, true));
        }
        let existing = Self::find_by_pair_in(conn, low, high)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
        Ok((existing, false))
    }

    /// Delete the pair's match. Returns the removed id.
    pub(crate) async fn retract(
        conn: &mut PgConnection,
        a: DbId,
        b: DbId,
    ) -> Result<Option<DbId>, sqlx::Error> {
        let (low, high) = ordered_pair(a, b);
        sqlx::query_scalar("DELETE FROM matches WHERE user_low = $1 AND user_high = $2 RETURNING id")
            .bind(low)
            .bind(high)
            .fetch_optional(conn)
            .await
    }
}
