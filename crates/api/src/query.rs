//! Shared query parameter types for API handlers.

use kindred_core::types::DbId;
use serde::Deserialize;

use crate::error::AppError;

/// Default candidate batch size.
pub const DEFAULT_CANDIDATE_LIMIT: i64 = 20;

/// Upper bound on a single candidate batch.
pub const MAX_CANDIDATE_LIMIT: i64 = 100;

/// Query parameters for `GET /candidates` (`?exclude=1,2&limit=20`).
#[derive(Debug, Default, Deserialize)]
pub struct CandidateQuery {
    /// Comma-separated user ids the client already holds.
    pub exclude: Option<String>,
    pub limit: Option<i64>,
}

impl CandidateQuery {
    /// Clamp `limit` into `1..=MAX_CANDIDATE_LIMIT`.
    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_CANDIDATE_LIMIT)
            .clamp(1, MAX_CANDIDATE_LIMIT)
    }

    /// Parse `exclude` into ids. Empty segments are ignored.
    pub fn exclude_ids(&self) -> Result<Vec<DbId>, AppError> {
        let Some(raw) = self.exclude.as_deref() else {
            return Ok(Vec::new());
        };
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<DbId>()
                    .map_err(|_| AppError::BadRequest(format!("Invalid user id in exclude: '{s}'")))
            })
            .collect()
    }
}

/// Query parameters for the WebSocket upgrade (`?token=<jwt>`).
///
/// Browsers cannot set an `Authorization` header on a WebSocket handshake,
/// so the access token travels in the query string.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: String,
}
