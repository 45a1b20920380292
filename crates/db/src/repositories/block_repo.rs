//! Repository for the `user_blocks` table.

use kindred_core::types::DbId;
use sqlx::PgPool;

pub struct BlockRepo;

impl BlockRepo {
    /// Block `blocked_id` on behalf of `blocker_id`. Idempotent.
    pub async fn block(pool: &PgPool, blocker_id: DbId, blocked_id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO user_blocks (blocker_id, blocked_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(blocker_id)
        .bind(blocked_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Returns `true` if a block was removed.
    pub async fn unblock(pool: &PgPool, blocker_id: DbId, blocked_id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM user_blocks WHERE blocker_id = $1 AND blocked_id = $2")
            .bind(blocker_id)
            .bind(blocked_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
