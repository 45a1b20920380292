//! Repository for the `profiles` table.

use kindred_core::types::DbId;
use sqlx::PgPool;

use crate::models::profile::{CreateProfile, Profile};

/// Column list for `profiles` queries.
const COLUMNS: &str = "user_id, display_name, age, bio, photo_urls, is_hidden, \
     eligibility_version, created_at, updated_at";

/// Provides CRUD operations for profiles.
pub struct ProfileRepo;

impl ProfileRepo {
    pub async fn create(pool: &PgPool, input: &CreateProfile) -> Result<Profile, sqlx::Error> {
        let query = format!(
            "INSERT INTO profiles (user_id, display_name, age, bio, photo_urls) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Profile>(&query)
            .bind(input.user_id)
            .bind(&input.display_name)
            .bind(input.age)
            .bind(&input.bio)
            .bind(&input.photo_urls)
            .fetch_one(pool)
            .await
    }

    /// Find a profile regardless of visibility.
    pub async fn find_by_user_id(pool: &PgPool, user_id: DbId) -> Result<Option<Profile>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM profiles WHERE user_id = $1");
        sqlx::query_as::<_, Profile>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Find a visible profile. Hidden profiles are reported as absent.
    pub async fn find_visible(pool: &PgPool, user_id: DbId) -> Result<Option<Profile>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM profiles WHERE user_id = $1 AND NOT is_hidden");
        sqlx::query_as::<_, Profile>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Hide or unhide a profile, bumping its eligibility version.
    ///
    /// Returns `true` if the profile exists.
    pub async fn set_hidden(pool: &PgPool, user_id: DbId, hidden: bool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE profiles \
             SET is_hidden = $2, eligibility_version = eligibility_version + 1, updated_at = NOW() \
             WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(hidden)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
