use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use kindred_core::protocol::{ClientMessage, PushMessage};
use kindred_core::types::DbId;
use kindred_db::repositories::MatchRepo;
use kindred_events::DomainEvent;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::auth::authenticate;
use crate::notifications::delivery::delivery_for;
use crate::query::WsAuthQuery;
use crate::state::AppState;
use crate::ws::manager::{encode, ConnId};

/// GET /api/v1/ws?token=<jwt>
///
/// Authenticates before upgrading; an invalid token gets a 401 instead of a
/// socket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsAuthQuery>,
) -> AppResult<impl IntoResponse> {
    let user = authenticate(&params.token, &state)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user.user_id)))
}

/// Manage one connection after upgrade:
///
/// 1. Register with `WsManager` under the authenticated user.
/// 2. Spawn a sender task that drains the manager channel into the sink.
/// 3. Replay recent matches to this connection.
/// 4. Read inbound frames until close, then unregister.
async fn handle_socket(socket: WebSocket, state: AppState, user_id: DbId) {
    let conn_id: ConnId = Uuid::new_v4();
    tracing::info!(conn_id = %conn_id, user_id, "WebSocket connected");

    let mut rx = state.ws_manager.add(conn_id, user_id).await;
    let (mut sink, mut stream) = socket.split();

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    replay_recent_matches(&state, conn_id, user_id).await;

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => handle_client_frame(&state, user_id, text.as_str()),
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    state.ws_manager.remove(conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, user_id, "WebSocket disconnected");
}

/// Re-send matches from the replay window. Delivery is at-least-once; the
/// client's popup tracker absorbs the duplicates.
async fn replay_recent_matches(state: &AppState, conn_id: ConnId, user_id: DbId) {
    let since =
        chrono::Utc::now() - chrono::Duration::hours(state.config.match_replay_window_hours);
    let records = match MatchRepo::list_since_for_user(&state.pool, user_id, since).await {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!(user_id, error = %e, "Match replay query failed");
            return;
        }
    };

    for record in &records {
        let delivery = delivery_for(&state.pool, &record.to_event(), user_id).await;
        let Some(frame) = encode(&PushMessage::MatchCreated(delivery)) else {
            continue;
        };
        if !state.ws_manager.send_to_connection(conn_id, frame).await {
            break;
        }
    }
    if !records.is_empty() {
        tracing::debug!(user_id, count = records.len(), "Replayed recent matches");
    }
}

fn handle_client_frame(state: &AppState, user_id: DbId, text: &str) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::PopupDismissed(signal)) => {
            if signal.dismissed_by_user_id != user_id {
                tracing::warn!(
                    user_id,
                    claimed = signal.dismissed_by_user_id,
                    match_id = signal.match_id,
                    "Dismissal signed for another user, dropped"
                );
                return;
            }
            state.event_bus.publish(DomainEvent::popup_dismissed(&signal));
        }
        Err(e) => {
            tracing::debug!(user_id, error = %e, "Unrecognised client frame");
        }
    }
}
