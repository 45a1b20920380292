use axum::routing::post;
use axum::Router;

use crate::handlers::swipes;
use crate::state::AppState;

/// Routes mounted at `/swipes`.
///
/// ```text
/// POST   /                          -> record_swipe
/// POST   /{swipe_key}/invalidate    -> invalidate_swipe
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(swipes::record_swipe))
        .route("/{swipe_key}/invalidate", post(swipes::invalidate_swipe))
}
