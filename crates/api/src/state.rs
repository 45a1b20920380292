use std::sync::Arc;

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all handlers via `State<AppState>`.
///
/// Cheap to clone; everything inside is behind `Arc` or already `Clone`.
#[derive(Clone)]
pub struct AppState {
    pub pool: kindred_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// Live WebSocket connections, keyed by connection and indexed by user.
    pub ws_manager: Arc<WsManager>,
    /// Bus for `match.created` and `popup.dismissed` events.
    pub event_bus: Arc<kindred_events::EventBus>,
}
