//! Match events and the integrity checks applied to them.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, MatchId, Timestamp};

/// A mutual like, created server-side the moment both Like records exist.
///
/// Transient wire data: delivered to both participants independently,
/// at least once, in no particular order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchEvent {
    pub match_id: MatchId,
    pub user_a: DbId,
    pub user_b: DbId,
    pub created_at: Timestamp,
}

impl MatchEvent {
    /// Reject malformed payloads before any state is touched.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.match_id <= 0 {
            return Err(CoreError::Integrity(format!(
                "match id must be positive, got {}",
                self.match_id
            )));
        }
        if self.user_a <= 0 || self.user_b <= 0 {
            return Err(CoreError::Integrity(format!(
                "match {} has a non-positive participant ({}, {})",
                self.match_id, self.user_a, self.user_b
            )));
        }
        if self.user_a == self.user_b {
            return Err(CoreError::Integrity(format!(
                "match {} pairs user {} with themselves",
                self.match_id, self.user_a
            )));
        }
        Ok(())
    }

    pub fn involves(&self, user_id: DbId) -> bool {
        self.user_a == user_id || self.user_b == user_id
    }

    /// Resolve the "matched user" from the point of view of `local_user_id`.
    ///
    /// Errors when the local user is not a participant or when the resolved
    /// peer would be the local user.
    pub fn peer_of(&self, local_user_id: DbId) -> Result<DbId, CoreError> {
        let peer = if self.user_a == local_user_id {
            self.user_b
        } else if self.user_b == local_user_id {
            self.user_a
        } else {
            return Err(CoreError::Integrity(format!(
                "user {local_user_id} is not a participant of match {}",
                self.match_id
            )));
        };
        if peer == local_user_id {
            return Err(CoreError::Integrity(format!(
                "match {} resolves to the local user {local_user_id}",
                self.match_id
            )));
        }
        Ok(peer)
    }
}

/// Canonical `(low, high)` ordering of two user ids.
///
/// The server keys matches by this pair so that like/like detection does not
/// depend on which side's write lands first.
pub fn ordered_pair(a: DbId, b: DbId) -> (DbId, DbId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn event(user_a: DbId, user_b: DbId) -> MatchEvent {
        MatchEvent {
            match_id: 10,
            user_a,
            user_b,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn peer_resolves_from_either_side() {
        let e = event(1, 2);
        assert_eq!(e.peer_of(1).unwrap(), 2);
        assert_eq!(e.peer_of(2).unwrap(), 1);
    }

    #[test]
    fn non_participant_is_integrity_error() {
        assert_matches!(event(1, 2).peer_of(3), Err(CoreError::Integrity(_)));
    }

    #[test]
    fn self_match_is_integrity_error() {
        let e = event(5, 5);
        assert_matches!(e.validate(), Err(CoreError::Integrity(_)));
        assert_matches!(e.peer_of(5), Err(CoreError::Integrity(_)));
    }

    #[test]
    fn non_positive_ids_fail_validation() {
        let mut e = event(1, 2);
        e.match_id = 0;
        assert!(e.validate().is_err());
        assert!(event(0, 2).validate().is_err());
        assert!(event(1, 2).validate().is_ok());
    }

    #[test]
    fn ordered_pair_is_commutative() {
        assert_eq!(ordered_pair(9, 3), (3, 9));
        assert_eq!(ordered_pair(3, 9), (3, 9));
        assert_eq!(ordered_pair(4, 4), (4, 4));
    }
}
