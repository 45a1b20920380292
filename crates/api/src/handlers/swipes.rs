//! Handlers for the `/swipes` resource: the durable swipe record.
//!
//! Both endpoints are idempotent under retry. The client may send an
//! invalidate before, during or after the record it compensates; the
//! repository converges all three orders to the same end state.

use axum::extract::{Path, State};
use axum::Json;
use kindred_core::error::CoreError;
use kindred_core::processor::SwipeAck;
use kindred_core::swipe::SwipeAction;
use kindred_core::types::{DbId, SwipeKey};
use kindred_db::models::swipe::CreateSwipe;
use kindred_db::repositories::{SwipeRepo, UserRepo};
use kindred_events::DomainEvent;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of `POST /swipes/{swipe_key}/invalidate`.
#[derive(Debug, Deserialize)]
pub struct InvalidateSwipeBody {
    pub target_user_id: DbId,
    pub action: SwipeAction,
}

#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    /// `false` when the swipe was already inactive or has not arrived yet.
    pub invalidated: bool,
    pub retracted_match_id: Option<DbId>,
}

/// POST /api/v1/swipes
pub async fn record_swipe(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<CreateSwipe>,
) -> AppResult<Json<DataResponse<SwipeAck>>> {
    if input.target_user_id == auth.user_id {
        return Err(CoreError::Validation("Cannot swipe on yourself".into()).into());
    }
    if UserRepo::find_by_id(&state.pool, input.target_user_id)
        .await?
        .is_none()
    {
        return Err(CoreError::NotFound {
            entity: "User",
            id: input.target_user_id,
        }
        .into());
    }

    let recorded = SwipeRepo::record(&state.pool, auth.user_id, &input).await?;
    tracing::info!(
        user_id = auth.user_id,
        target_user_id = input.target_user_id,
        swipe_key = %input.swipe_key,
        action = %input.action,
        active = recorded.swipe.is_active(),
        "Swipe recorded"
    );

    let matched = recorded.matched.as_ref().map(|m| m.to_event());
    if recorded.match_created {
        if let Some(event) = &matched {
            tracing::info!(match_id = event.match_id, "Match created");
            state
                .event_bus
                .publish(DomainEvent::match_created(event, auth.user_id));
        }
    }

    Ok(Json(DataResponse {
        data: SwipeAck {
            id: recorded.swipe.id,
            matched,
        },
    }))
}

/// POST /api/v1/swipes/{swipe_key}/invalidate
pub async fn invalidate_swipe(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(swipe_key): Path<SwipeKey>,
    Json(body): Json<InvalidateSwipeBody>,
) -> AppResult<Json<DataResponse<InvalidateResponse>>> {
    let outcome =
        SwipeRepo::invalidate(&state.pool, auth.user_id, swipe_key, body.target_user_id).await?;

    tracing::info!(
        user_id = auth.user_id,
        target_user_id = body.target_user_id,
        swipe_key = %swipe_key,
        action = %body.action,
        invalidated = outcome.swipe.is_some(),
        "Swipe invalidated"
    );
    if let Some(match_id) = outcome.retracted_match_id {
        tracing::info!(match_id, user_id = auth.user_id, "Match retracted by undo");
    }

    Ok(Json(DataResponse {
        data: InvalidateResponse {
            invalidated: outcome.swipe.is_some(),
            retracted_match_id: outcome.retracted_match_id,
        },
    }))
}
