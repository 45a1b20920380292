//! Profile rows and their conversion to the wire-level candidate.

use kindred_core::candidate::CandidateProfile;
use kindred_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `profiles` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Profile {
    pub user_id: DbId,
    pub display_name: String,
    pub age: Option<i16>,
    pub bio: Option<String>,
    pub photo_urls: Vec<String>,
    pub is_hidden: bool,
    pub eligibility_version: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a profile.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProfile {
    pub user_id: DbId,
    pub display_name: String,
    pub age: Option<i16>,
    pub bio: Option<String>,
    #[serde(default)]
    pub photo_urls: Vec<String>,
}

impl From<Profile> for CandidateProfile {
    fn from(row: Profile) -> Self {
        CandidateProfile {
            user_id: row.user_id,
            display_name: row.display_name,
            age: row.age,
            bio: row.bio,
            photo_urls: row.photo_urls,
            eligibility_version: row.eligibility_version,
        }
    }
}
