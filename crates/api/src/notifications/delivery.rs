//! Building per-recipient match deliveries.

use kindred_core::candidate::CandidateProfile;
use kindred_core::matching::MatchEvent;
use kindred_core::protocol::MatchDelivery;
use kindred_core::types::DbId;
use kindred_db::repositories::ProfileRepo;
use kindred_db::DbPool;

/// Build the delivery for `recipient`, embedding the peer's profile when it
/// can be loaded.
///
/// A missing or unreadable profile is not fatal: the client falls back to
/// fetching it, and delivery must not be held up by it.
pub async fn delivery_for(pool: &DbPool, event: &MatchEvent, recipient: DbId) -> MatchDelivery {
    let delivery = MatchDelivery::new(event.clone());
    let peer = match event.peer_of(recipient) {
        Ok(peer) => peer,
        Err(e) => {
            tracing::error!(match_id = event.match_id, recipient, error = %e, "Cannot resolve match peer");
            return delivery;
        }
    };

    match ProfileRepo::find_by_user_id(pool, peer).await {
        Ok(Some(profile)) => delivery.with_profile(CandidateProfile::from(profile)),
        Ok(None) => delivery,
        Err(e) => {
            tracing::warn!(match_id = event.match_id, peer, error = %e, "Peer profile lookup failed");
            delivery
        }
    }
}
