use axum::extract::{Path, State};
use axum::Json;
use kindred_core::candidate::CandidateProfile;
use kindred_core::error::CoreError;
use kindred_core::types::DbId;
use kindred_db::repositories::{MatchRepo, ProfileRepo};

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/profiles/{user_id}
///
/// Hidden profiles are only readable by users already matched with them,
/// so a match popup can still render its peer.
pub async fn get_profile(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(user_id): Path<DbId>,
) -> AppResult<Json<DataResponse<CandidateProfile>>> {
    let not_found = || CoreError::NotFound {
        entity: "Profile",
        id: user_id,
    };

    let profile = ProfileRepo::find_by_user_id(&state.pool, user_id)
        .await?
        .ok_or_else(not_found)?;

    if profile.is_hidden
        && user_id != auth.user_id
        && MatchRepo::find_by_pair(&state.pool, auth.user_id, user_id)
            .await?
            .is_none()
    {
        return Err(not_found().into());
    }

    Ok(Json(DataResponse {
        data: CandidateProfile::from(profile),
    }))
}
