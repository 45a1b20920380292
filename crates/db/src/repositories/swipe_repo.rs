//! Repository for the `swipes` and `swipe_invalidations` tables.
//!
//! Both writes run in one transaction holding a pair-scoped advisory lock,
//! so two users liking each other concurrently serialize on the same key
//! and exactly one of them observes the reciprocal like.
//!
//! Convergence rules:
//!
//! - `record` is idempotent on `swipe_key`.
//! - `invalidate` writes a tombstone first; a record arriving after its
//!   invalidate is inserted already invalidated.
//! - At most one swipe per (user, target) is active. Between two active
//!   gestures the one with the later v7 key wins.

use kindred_core::matching::ordered_pair;
use kindred_core::swipe::SwipeAction;
use kindred_core::types::{DbId, SwipeKey};
use sqlx::{PgConnection, PgPool};

use crate::models::swipe::{CreateSwipe, InvalidatedSwipe, RecordedSwipe, Swipe};
use crate::repositories::MatchRepo;

/// Column list for `swipes` queries.
const COLUMNS: &str = "id, swipe_key, user_id, target_user_id, action, created_at, invalidated_at";

pub struct SwipeRepo;

impl SwipeRepo {
    /// Durably record a swipe and, for a Like, detect a mutual match.
    pub async fn record(
        pool: &PgPool,
        user_id: DbId,
        input: &CreateSwipe,
    ) -> Result<RecordedSwipe, sqlx::Error> {
        let mut tx = pool.begin().await?;
        lock_pair(&mut tx, user_id, input.target_user_id).await?;

        if let Some(existing) = find_by_key_in(&mut tx, user_id, input.swipe_key).await? {
            let matched = if existing.is_active() && existing.is_like() {
                MatchRepo::find_by_pair_in(&mut tx, user_id, existing.target_user_id).await?
            } else {
                None
            };
            tx.commit().await?;
            return Ok(RecordedSwipe {
                swipe: existing,
                matched,
                match_created: false,
            });
        }

        let tombstoned: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM swipe_invalidations WHERE swipe_key = $1)",
        )
        .bind(input.swipe_key)
        .fetch_one(&mut *tx)
        .await?;

        let active_query = format!(
            "SELECT {COLUMNS} FROM swipes \
             WHERE user_id = $1 AND target_user_id = $2 AND invalidated_at IS NULL"
        );
        let active = sqlx::query_as::<_, Swipe>(&active_query)
            .bind(user_id)
            .bind(input.target_user_id)
            .fetch_optional(&mut *tx)
            .await?;

        let outranked = active
            .as_ref()
            .is_some_and(|a| a.swipe_key > input.swipe_key);
        let born_invalidated = tombstoned || outranked;

        if !born_invalidated {
            if let Some(previous) = &active {
                sqlx::query("UPDATE swipes SET invalidated_at = NOW() WHERE id = $1")
                    .bind(previous.id)
                    .execute(&mut *tx)
                    .await?;
                if previous.is_like() && input.action != SwipeAction::Like {
                    let retracted =
                        MatchRepo::retract(&mut tx, user_id, input.target_user_id).await?;
                    tracing::debug!(
                        user_id,
                        target_user_id = input.target_user_id,
                        ?retracted,
                        "Superseded like, match retracted"
                    );
                }
            }
        }

        let insert = format!(
            "INSERT INTO swipes (swipe_key, user_id, target_user_id, action, invalidated_at) \
             VALUES ($1, $2, $3, $4, CASE WHEN $5 THEN NOW() END) \
             RETURNING {COLUMNS}"
        );
        let swipe = sqlx::query_as::<_, Swipe>(&insert)
            .bind(input.swipe_key)
            .bind(user_id)
            .bind(input.target_user_id)
            .bind(input.action.as_str())
            .bind(born_invalidated)
            .fetch_one(&mut *tx)
            .await?;

        let (matched, match_created) = if swipe.is_active() && swipe.is_like() {
            if has_active_like(&mut tx, input.target_user_id, user_id).await? {
                let (record, created) =
                    MatchRepo::create_if_absent(&mut tx, user_id, input.target_user_id).await?;
                (Some(record), created)
            } else {
                (None, false)
            }
        } else {
            (None, false)
        };

        tx.commit().await?;
        Ok(RecordedSwipe {
            swipe,
            matched,
            match_created,
        })
    }

    /// Invalidate a swipe by key. Idempotent, and safe to call before the
    /// record itself has arrived.
    pub async fn invalidate(
        pool: &PgPool,
        user_id: DbId,
        swipe_key: SwipeKey,
        target_user_id: DbId,
    ) -> Result<InvalidatedSwipe, sqlx::Error> {
        let mut tx = pool.begin().await?;
        lock_pair(&mut tx, user_id, target_user_id).await?;

        sqlx::query(
            "INSERT INTO swipe_invalidations (swipe_key, user_id, target_user_id) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (swipe_key) DO NOTHING",
        )
        .bind(swipe_key)
        .bind(user_id)
        .bind(target_user_id)
        .execute(&mut *tx)
        .await?;

        let update = format!(
            "UPDATE swipes SET invalidated_at = NOW() \
             WHERE swipe_key = $1 AND user_id = $2 AND invalidated_at IS NULL \
             RETURNING {COLUMNS}"
        );
        let swipe = sqlx::query_as::<_, Swipe>(&update)
            .bind(swipe_key)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;

        let retracted_match_id = match &swipe {
            Some(row) if row.is_like() => {
                MatchRepo::retract(&mut tx, user_id, row.target_user_id).await?
            }
            _ => None,
        };

        tx.commit().await?;
        Ok(InvalidatedSwipe {
            swipe,
            retracted_match_id,
        })
    }

    pub async fn find_by_key(
        pool: &PgPool,
        user_id: DbId,
        swipe_key: SwipeKey,
    ) -> Result<Option<Swipe>, sqlx::Error> {
        let mut conn = pool.acquire().await?;
        find_by_key_in(&mut conn, user_id, swipe_key).await
    }

    /// Active swipe of `user_id` on `target_user_id`, if any.
    pub async fn find_active(
        pool: &PgPool,
        user_id: DbId,
        target_user_id: DbId,
    ) -> Result<Option<Swipe>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM swipes \
             WHERE user_id = $1 AND target_user_id = $2 AND invalidated_at IS NULL"
        );
        sqlx::query_as::<_, Swipe>(&query)
            .bind(user_id)
            .bind(target_user_id)
            .fetch_optional(pool)
            .await
    }
}

/// Serialize all swipe writes touching the unordered pair `{a, b}`.
async fn lock_pair(conn: &mut PgConnection, a: DbId, b: DbId) -> Result<(), sqlx::Error> {
    let (low, high) = ordered_pair(a, b);
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(format!("swipe-pair:{low}:{high}"))
        .execute(conn)
        .await?;
    Ok(())
}

async fn find_by_key_in(
    conn: &mut PgConnection,
    user_id: DbId,
    swipe_key: SwipeKey,
) -> Result<Option<Swipe>, sqlx::Error> {
    let query = format!("SELECT {COLUMNS} FROM swipes WHERE swipe_key = $1 AND user_id = $2");
    sqlx::query_as::<_, Swipe>(&query)
        .bind(swipe_key)
        .bind(user_id)
        .fetch_optional(conn)
        .await
}

async fn has_active_like(
    conn: &mut PgConnection,
    user_id: DbId,
    target_user_id: DbId,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS ( \
             SELECT 1 FROM swipes \
             WHERE user_id = $1 AND target_user_id = $2 \
               AND action = 'like' AND invalidated_at IS NULL)",
    )
    .bind(user_id)
    .bind(target_user_id)
    .fetch_one(conn)
    .await
}
