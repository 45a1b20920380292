//! Candidate selection over `profiles`, `user_blocks` and `swipes`.

use kindred_core::types::DbId;
use sqlx::PgPool;

use crate::models::profile::Profile;

pub struct CandidateRepo;

impl CandidateRepo {
    /// Profiles `user_id` may still be shown, in user id order.
    ///
    /// Excludes the caller, hidden profiles, blocks in either direction,
    /// every target of an active swipe by the caller and `exclude`.
    pub async fn fetch_for_user(
        pool: &PgPool,
        user_id: DbId,
        exclude: &[DbId],
        limit: i64,
    ) -> Result<Vec<Profile>, sqlx::Error> {
        sqlx::query_as::<_, Profile>(
            "SELECT p.user_id, p.display_name, p.age, p.bio, p.photo_urls, p.is_hidden, \
                    p.eligibility_version, p.created_at, p.updated_at \
             FROM profiles p \
             WHERE p.user_id <> $1 \
               AND NOT p.is_hidden \
               AND p.user_id <> ALL($2) \
               AND NOT EXISTS ( \
                   SELECT 1 FROM user_blocks b \
                   WHERE (b.blocker_id = $1 AND b.blocked_id = p.user_id) \
                      OR (b.blocker_id = p.user_id AND b.blocked_id = $1)) \
               AND NOT EXISTS ( \
                   SELECT 1 FROM swipes s \
                   WHERE s.user_id = $1 AND s.target_user_id = p.user_id \
                     AND s.invalidated_at IS NULL) \
             ORDER BY p.user_id \
             LIMIT $3",
        )
        .bind(user_id)
        .bind(exclude)
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}
