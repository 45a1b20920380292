use axum::routing::get;
use axum::Router;

use crate::handlers::profiles;
use crate::state::AppState;

/// Routes mounted at `/profiles`.
pub fn router() -> Router<AppState> {
    Router::new().route("/{user_id}", get(profiles::get_profile))
}
