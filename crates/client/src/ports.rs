//! Seams between the session and the server.
//!
//! [`KindredApi`](crate::api::KindredApi) implements every port over HTTP;
//! tests substitute in-memory fakes.

use async_trait::async_trait;
use kindred_core::candidate::CandidateProfile;
use kindred_core::processor::{InvalidateRequest, RecordRequest, SwipeAck};
use kindred_core::types::DbId;

use crate::api::ApiError;

/// Server-side source of profiles the local user may still be shown.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn fetch_candidates(
        &self,
        exclude: &[DbId],
        limit: usize,
    ) -> Result<Vec<CandidateProfile>, ApiError>;
}

/// Durable swipe record. Both calls are idempotent on the swipe key.
#[async_trait]
pub trait SwipeLedger: Send + Sync {
    async fn record_swipe(&self, request: &RecordRequest) -> Result<SwipeAck, ApiError>;

    async fn invalidate_swipe(&self, request: &InvalidateRequest) -> Result<(), ApiError>;
}

/// Single-profile lookup used when a match arrives without peer data.
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn fetch_profile(&self, user_id: DbId) -> Result<CandidateProfile, ApiError>;
}
