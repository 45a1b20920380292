use axum::routing::post;
use axum::Router;

use crate::handlers::matches;
use crate::state::AppState;

/// Routes mounted at `/matches`.
pub fn router() -> Router<AppState> {
    Router::new().route("/{id}/redeliver", post(matches::redeliver_match))
}
