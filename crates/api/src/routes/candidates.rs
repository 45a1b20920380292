use axum::routing::get;
use axum::Router;

use crate::handlers::candidates;
use crate::state::AppState;

/// Routes mounted at `/candidates`.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(candidates::list_candidates))
}
