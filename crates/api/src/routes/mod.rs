pub mod candidates;
pub mod health;
pub mod matches;
pub mod profiles;
pub mod swipes;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /ws                                   WebSocket (?token=<jwt>)
///
/// /swipes                               record swipe (POST)
/// /swipes/{swipe_key}/invalidate        invalidate swipe (POST)
///
/// /candidates                           candidate batch (GET)
/// /profiles/{user_id}                   single profile (GET)
///
/// /matches/{id}/redeliver               forced redelivery (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/swipes", swipes::router())
        .nest("/candidates", candidates::router())
        .nest("/profiles", profiles::router())
        .nest("/matches", matches::router())
}
