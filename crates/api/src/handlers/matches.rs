use axum::extract::{Path, State};
use axum::Json;
use kindred_core::error::CoreError;
use kindred_core::protocol::PushMessage;
use kindred_core::types::MatchId;
use kindred_db::repositories::MatchRepo;
use serde::Serialize;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::notifications::delivery::delivery_for;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct RedeliverResponse {
    /// Number of the caller's connections the match was pushed to.
    pub delivered_to: usize,
}

/// POST /api/v1/matches/{id}/redeliver
///
/// Re-sends a match to the caller's own connections with `force = true`,
/// the one path that may re-display a dismissed popup.
pub async fn redeliver_match(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(match_id): Path<MatchId>,
) -> AppResult<Json<DataResponse<RedeliverResponse>>> {
    let record = MatchRepo::find_by_id(&state.pool, match_id)
        .await?
        .filter(|m| m.involves(auth.user_id))
        .ok_or(CoreError::NotFound {
            entity: "Match",
            id: match_id,
        })?;

    let delivery = delivery_for(&state.pool, &record.to_event(), auth.user_id)
        .await
        .forced();
    let delivered_to = state
        .ws_manager
        .push_to_user(auth.user_id, &PushMessage::MatchCreated(delivery))
        .await;

    tracing::info!(match_id, user_id = auth.user_id, delivered_to, "Match redelivered");
    Ok(Json(DataResponse {
        data: RedeliverResponse { delivered_to },
    }))
}
