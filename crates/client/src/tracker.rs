//! Popup Deduplication Tracker.
//!
//! The sole authority on whether a match popup may be displayed. Every
//! decision is a single atomic update against the durable store, so a popup
//! shown or dismissed by another tab is honoured even when that tab's sync
//! signal was lost, and two tabs racing on the same match cannot both win.

use std::sync::Arc;

use kindred_core::popup::{DismissAction, PopupState};
use kindred_core::types::{DbId, MatchId};
use tokio::sync::broadcast;

use crate::store::{PopupStore, StoreError};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// A popup state transition, written by this tracker or observed in the
/// store by a watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupChange {
    pub match_id: MatchId,
    pub state: PopupState,
}

#[derive(Clone)]
pub struct PopupTracker {
    user_id: DbId,
    store: Arc<dyn PopupStore>,
    changes: broadcast::Sender<PopupChange>,
}

impl PopupTracker {
    pub fn new(user_id: DbId, store: Arc<dyn PopupStore>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            user_id,
            store,
            changes,
        }
    }

    pub fn user_id(&self) -> DbId {
        self.user_id
    }

    /// Receive every transition this tracker writes, plus whatever a store
    /// watcher feeds in through [`change_feed`](Self::change_feed).
    pub fn subscribe(&self) -> broadcast::Receiver<PopupChange> {
        self.changes.subscribe()
    }

    /// Sender side of the change stream, for a store watcher.
    pub fn change_feed(&self) -> broadcast::Sender<PopupChange> {
        self.changes.clone()
    }

    pub async fn state(&self, match_id: MatchId) -> Result<PopupState, StoreError> {
        let states = self.blocking(|store, user_id| store.load(user_id)).await?;
        Ok(states.get(&match_id).copied().unwrap_or_default())
    }

    pub async fn has_been_shown(&self, match_id: MatchId) -> Result<bool, StoreError> {
        Ok(self.state(match_id).await?.has_been_shown())
    }

    /// Record that the popup is being displayed.
    ///
    /// Returns `false` without writing when the state does not allow it,
    /// which makes repeated calls idempotent. `force` allows re-display of
    /// a shown or dismissed popup.
    pub async fn mark_shown(&self, match_id: MatchId, force: bool) -> Result<bool, StoreError> {
        let written = self
            .blocking(move |store, user_id| {
                store.update(user_id, match_id, &|current: PopupState| {
                    current.show(force).ok()
                })
            })
            .await?;
        Ok(self.publish(match_id, written))
    }

    /// Record a dismissal. The first recorded action wins; returns `false`
    /// if the popup was already dismissed.
    pub async fn mark_dismissed(
        &self,
        match_id: MatchId,
        action: DismissAction,
    ) -> Result<bool, StoreError> {
        let written = self
            .blocking(move |store, user_id| {
                store.update(user_id, match_id, &|current: PopupState| {
                    (!current.is_dismissed()).then(|| current.dismiss(action))
                })
            })
            .await?;
        Ok(self.publish(match_id, written))
    }

    /// Run a store call on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&dyn PopupStore, DbId) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let user_id = self.user_id;
        tokio::task::spawn_blocking(move || f(store.as_ref(), user_id))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    fn publish(&self, match_id: MatchId, written: Option<PopupState>) -> bool {
        let Some(state) = written else {
            return false;
        };
        // No subscribers is fine.
        let _ = self.changes.send(PopupChange { match_id, state });
        true
    }
}
