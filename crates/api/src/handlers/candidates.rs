//! Handler for the candidate store.

use axum::extract::{Query, State};
use axum::Json;
use kindred_core::candidate::CandidateProfile;
use kindred_db::repositories::CandidateRepo;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::query::CandidateQuery;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/candidates?exclude=1,2&limit=20
///
/// Profiles the caller may still be shown, ordered by user id.
pub async fn list_candidates(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<CandidateQuery>,
) -> AppResult<Json<DataResponse<Vec<CandidateProfile>>>> {
    let exclude = params.exclude_ids()?;
    let limit = params.limit();

    let rows = CandidateRepo::fetch_for_user(&state.pool, auth.user_id, &exclude, limit).await?;
    tracing::debug!(
        user_id = auth.user_id,
        excluded = exclude.len(),
        returned = rows.len(),
        "Candidates fetched"
    );

    Ok(Json(DataResponse {
        data: rows.into_iter().map(CandidateProfile::from).collect(),
    }))
}
