//! Candidate profiles as served by the Candidate Store.

use serde::{Deserialize, Serialize};

use crate::types::DbId;

/// A profile eligible to be shown to a user for swiping.
///
/// Immutable once fetched. The Discovery Queue, Undo Stack and Match
/// Notifier all hold read-only copies, which is what lets an undo re-render
/// a profile without a network round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateProfile {
    pub user_id: DbId,
    pub display_name: String,
    pub age: Option<i16>,
    pub bio: Option<String>,
    #[serde(default)]
    pub photo_urls: Vec<String>,
    /// Bumped by the server whenever the profile's eligibility inputs change.
    pub eligibility_version: i64,
}
