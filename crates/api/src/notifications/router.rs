//! Event-to-connection routing for matches and dismissals.

use std::sync::Arc;

use kindred_core::error::CoreError;
use kindred_core::event_types;
use kindred_core::matching::MatchEvent;
use kindred_core::protocol::{DismissSignal, PushMessage};
use kindred_db::repositories::MatchRepo;
use kindred_db::DbPool;
use kindred_events::DomainEvent;
use tokio::sync::broadcast;

use crate::notifications::delivery::delivery_for;
use crate::ws::WsManager;

/// Fans bus events out to the WebSocket connections of the users involved.
///
/// - `match.created` goes to both participants, each with the other's
///   profile embedded.
/// - `popup.dismissed` is checked against the match row and relayed to
///   every connection of both participants, the sender's own included;
///   clients drop their own echo by `origin`.
pub struct MatchRouter {
    pool: DbPool,
    ws_manager: Arc<WsManager>,
}

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl MatchRouter {
    pub fn new(pool: DbPool, ws_manager: Arc<WsManager>) -> Self {
        Self { pool, ws_manager }
    }

    /// Run until the bus is dropped.
    pub async fn run(self, mut receiver: broadcast::Receiver<DomainEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Err(e) = self.route_event(&event).await {
                        match e {
                            RouteError::Core(CoreError::Integrity(_)) | RouteError::Payload(_) => {
                                tracing::error!(error = %e, event_type = %event.event_type, "Discarded event")
                            }
                            _ => tracing::warn!(error = %e, event_type = %event.event_type, "Failed to route event"),
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Skipped matches are recovered by the replay on reconnect.
                    tracing::warn!(skipped = n, "Match router lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, match router shutting down");
                    break;
                }
            }
        }
    }

    pub async fn route_event(&self, event: &DomainEvent) -> Result<(), RouteError> {
        match event.event_type.as_str() {
            event_types::MATCH_CREATED => {
                let matched: MatchEvent = event.decode()?;
                self.deliver_match(&matched).await
            }
            event_types::POPUP_DISMISSED => {
                let signal: DismissSignal = event.decode()?;
                self.relay_dismissal(signal).await
            }
            _ => Ok(()),
        }
    }

    async fn deliver_match(&self, event: &MatchEvent) -> Result<(), RouteError> {
        event.validate()?;
        for recipient in [event.user_a, event.user_b] {
            let delivery = delivery_for(&self.pool, event, recipient).await;
            let reached = self
                .ws_manager
                .push_to_user(recipient, &PushMessage::MatchCreated(delivery))
                .await;
            tracing::info!(match_id = event.match_id, recipient, reached, "Match delivered");
        }
        Ok(())
    }

    async fn relay_dismissal(&self, signal: DismissSignal) -> Result<(), RouteError> {
        let record = MatchRepo::find_by_id(&self.pool, signal.match_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Match",
                id: signal.match_id,
            })?;
        if !record.involves(signal.dismissed_by_user_id) {
            return Err(CoreError::Integrity(format!(
                "user {} dismissed match {} they are not part of",
                signal.dismissed_by_user_id, signal.match_id
            ))
            .into());
        }

        let message = PushMessage::PopupDismissed(signal);
        for user_id in [record.user_low, record.user_high] {
            self.ws_manager.push_to_user(user_id, &message).await;
        }
        tracing::debug!(match_id = record.id, "Dismissal relayed");
        Ok(())
    }
}
