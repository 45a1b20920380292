//! Match Notifier.
//!
//! Decides, per client instance, whether a delivered match is displayed.
//! Each match moves through [`MatchPhase`]:
//!
//! ```text
//! Idle -> Armed -> Ready -> Displayed -> Dismissed
//!           |
//!           +-- peer fetch failed --> Idle (state stays Unseen)
//! ```
//!
//! A dismissed match is dropped from the notifier's table; from then on the
//! tracker's durable state is what keeps it from being displayed again.
//!
//! The wire event carries no authority over display: duplicates and replays
//! are absorbed by the [`PopupTracker`], and only an explicit `force` flag
//! can bring back a popup that was already shown or dismissed.

use std::collections::HashMap;

use kindred_core::candidate::CandidateProfile;
use kindred_core::matching::MatchEvent;
use kindred_core::popup::{DismissAction, MatchPhase, PopupState};
use kindred_core::protocol::{DismissSignal, MatchDelivery};
use kindred_core::types::{DbId, MatchId};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::store::StoreError;
use crate::sync::SyncChannel;
use crate::tracker::{PopupChange, PopupTracker};

/// Popup transitions observed by the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PopupEvent {
    Displayed {
        event: MatchEvent,
        peer: CandidateProfile,
        forced: bool,
    },
    Dismissed {
        match_id: MatchId,
        action: DismissAction,
        /// Dismissed by another tab or by the peer.
        remote: bool,
    },
}

/// Where the UI should go after a dismissal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Navigation {
    Conversation { match_id: MatchId, peer_user_id: DbId },
}

/// Result of handing a delivery (or a peer lookup) to the notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Displayed(PopupEvent),
    /// Peer data is missing; fetch it and call
    /// [`MatchNotifier::on_peer_result`].
    NeedsPeer { match_id: MatchId, peer_user_id: DbId },
    /// Duplicate, already shown elsewhere, or already dismissed.
    Suppressed,
    /// Integrity violation; logged.
    Discarded,
    /// Not displayed this time; a redelivery may succeed.
    Deferred,
}

/// A completed local dismissal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dismissal {
    pub event: PopupEvent,
    pub navigation: Option<Navigation>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("match {0} is not displayed")]
    NotDisplayed(MatchId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
struct TrackedMatch {
    event: MatchEvent,
    peer_user_id: DbId,
    force: bool,
    phase: MatchPhase,
}

pub struct MatchNotifier {
    local_user_id: DbId,
    tracker: PopupTracker,
    sync: SyncChannel,
    /// Profiles seen this session, so most matches render without a fetch.
    profiles: HashMap<DbId, CandidateProfile>,
    matches: HashMap<MatchId, TrackedMatch>,
}

impl MatchNotifier {
    pub fn new(tracker: PopupTracker, sync: SyncChannel) -> Self {
        Self {
            local_user_id: tracker.user_id(),
            tracker,
            sync,
            profiles: HashMap::new(),
            matches: HashMap::new(),
        }
    }

    pub fn local_user_id(&self) -> DbId {
        self.local_user_id
    }

    pub fn tracker(&self) -> &PopupTracker {
        &self.tracker
    }

    /// Dismissal signals from this user's tabs.
    pub fn subscribe_tabs(&self) -> broadcast::Receiver<DismissSignal> {
        self.sync.subscribe()
    }

    pub fn cache_profile(&mut self, profile: CandidateProfile) {
        self.profiles.insert(profile.user_id, profile);
    }

    pub fn cache_profiles(&mut self, profiles: impl IntoIterator<Item = CandidateProfile>) {
        for profile in profiles {
            self.cache_profile(profile);
        }
    }

    pub fn phase(&self, match_id: MatchId) -> MatchPhase {
        self.matches
            .get(&match_id)
            .map_or(MatchPhase::Idle, |m| m.phase)
    }

    /// Matches currently on screen.
    pub fn displayed(&self) -> Vec<MatchId> {
        let mut ids: Vec<_> = self
            .matches
            .iter()
            .filter(|(_, m)| m.phase == MatchPhase::Displayed)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Handle a match delivery from a swipe ack, the push channel or a
    /// replay.
    pub async fn on_delivery(&mut self, delivery: MatchDelivery) -> DeliveryOutcome {
        let event = delivery.event();
        if let Err(e) = event.validate() {
            tracing::error!(match_id = event.match_id, error = %e, "Discarded malformed match");
            return DeliveryOutcome::Discarded;
        }
        let peer_user_id = match event.peer_of(self.local_user_id) {
            Ok(peer) => peer,
            Err(e) => {
                tracing::error!(
                    match_id = event.match_id,
                    user_id = self.local_user_id,
                    error = %e,
                    "Discarded match that does not resolve to a peer"
                );
                return DeliveryOutcome::Discarded;
            }
        };
        let match_id = event.match_id;

        if !delivery.force && self.is_in_progress(match_id) {
            tracing::debug!(match_id, "Duplicate match delivery");
            return DeliveryOutcome::Suppressed;
        }

        let state = match self.tracker.state(match_id).await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(match_id, error = %e, "Popup state unreadable, deferring match");
                return DeliveryOutcome::Deferred;
            }
        };
        if !state.can_show(delivery.force) {
            tracing::debug!(match_id, state = state.label(), "Match popup already handled");
            return DeliveryOutcome::Suppressed;
        }

        let peer = delivery
            .matched_profile
            .filter(|p| p.user_id == peer_user_id)
            .or_else(|| self.profiles.get(&peer_user_id).cloned());

        self.matches.insert(
            match_id,
            TrackedMatch {
                event,
                peer_user_id,
                force: delivery.force,
                phase: MatchPhase::Armed,
            },
        );

        match peer {
            Some(peer) => self.display(match_id, peer).await,
            None => DeliveryOutcome::NeedsPeer {
                match_id,
                peer_user_id,
            },
        }
    }

    /// Complete a peer lookup requested through
    /// [`DeliveryOutcome::NeedsPeer`].
    pub async fn on_peer_result(
        &mut self,
        match_id: MatchId,
        result: Result<CandidateProfile, String>,
    ) -> DeliveryOutcome {
        let Some(tracked) = self.matches.get(&match_id) else {
            // Dismissed elsewhere while the lookup was running.
            return DeliveryOutcome::Suppressed;
        };
        if tracked.phase != MatchPhase::Armed {
            return DeliveryOutcome::Suppressed;
        }

        match result {
            Ok(peer) if peer.user_id == tracked.peer_user_id => {
                self.cache_profile(peer.clone());
                self.display(match_id, peer).await
            }
            Ok(peer) => {
                tracing::error!(
                    match_id,
                    expected = tracked.peer_user_id,
                    got = peer.user_id,
                    "Peer lookup returned the wrong profile"
                );
                self.matches.remove(&match_id);
                DeliveryOutcome::Discarded
            }
            Err(reason) => {
                tracing::warn!(match_id, error = %reason, "Peer lookup failed, match left unseen");
                self.matches.remove(&match_id);
                DeliveryOutcome::Deferred
            }
        }
    }

    /// Dismiss a displayed popup.
    ///
    /// The dismissal is persisted and broadcast before the navigation is
    /// handed back, so the popup state is settled whatever the UI does next.
    /// The match is then forgotten here; the tracker holds its final state.
    pub async fn dismiss(
        &mut self,
        match_id: MatchId,
        action: DismissAction,
    ) -> Result<Dismissal, NotifyError> {
        let peer_user_id = self
            .matches
            .get(&match_id)
            .filter(|m| m.phase == MatchPhase::Displayed)
            .map(|m| m.peer_user_id)
            .ok_or(NotifyError::NotDisplayed(match_id))?;

        self.tracker.mark_dismissed(match_id, action).await?;
        self.sync.broadcast(DismissSignal {
            match_id,
            dismissed_by_user_id: self.local_user_id,
            action,
            origin: self.sync.origin(),
        });
        self.matches.remove(&match_id);
        tracing::info!(match_id, ?action, "Match popup dismissed");

        let navigation = match action {
            DismissAction::Message => Some(Navigation::Conversation {
                match_id,
                peer_user_id,
            }),
            DismissAction::Continue => None,
        };
        Ok(Dismissal {
            event: PopupEvent::Dismissed {
                match_id,
                action,
                remote: false,
            },
            navigation,
        })
    }

    /// Apply a dismissal from another tab or from the peer.
    ///
    /// Never re-broadcast. Returns an event only when a popup was on screen.
    pub async fn on_dismiss_signal(&mut self, signal: DismissSignal) -> Option<PopupEvent> {
        if self.sync.is_own(&signal) {
            return None;
        }
        let match_id = signal.match_id;

        if let Err(e) = self.tracker.mark_dismissed(match_id, signal.action).await {
            tracing::warn!(match_id, error = %e, "Failed to persist remote dismissal");
        }

        if !self.close(match_id) {
            return None;
        }
        tracing::info!(
            match_id,
            by = signal.dismissed_by_user_id,
            "Match popup dismissed remotely"
        );
        Some(PopupEvent::Dismissed {
            match_id,
            action: signal.action,
            remote: true,
        })
    }

    /// Apply a popup state observed in the durable store, typically written
    /// by a tab whose sync signal never arrived.
    ///
    /// Only dismissals matter. The store is re-read first, so a stale change
    /// cannot close a popup that was re-displayed with `force` since.
    pub async fn on_state_change(&mut self, change: PopupChange) -> Option<PopupEvent> {
        let PopupState::Dismissed(action) = change.state else {
            return None;
        };
        let match_id = change.match_id;
        if !self.matches.contains_key(&match_id) {
            return None;
        }
        match self.tracker.state(match_id).await {
            Ok(current) if current.is_dismissed() => {}
            Ok(_) => return None,
            Err(e) => {
                tracing::warn!(match_id, error = %e, "Popup state unreadable, ignoring change");
                return None;
            }
        }

        if !self.close(match_id) {
            return None;
        }
        tracing::info!(match_id, "Match popup dismissed in another tab");
        Some(PopupEvent::Dismissed {
            match_id,
            action,
            remote: true,
        })
    }

    // ---- private helpers ----

    fn is_in_progress(&self, match_id: MatchId) -> bool {
        matches!(
            self.phase(match_id),
            MatchPhase::Armed | MatchPhase::Ready | MatchPhase::Displayed
        )
    }

    /// Forget a match dismissed elsewhere. Returns whether it was on screen.
    fn close(&mut self, match_id: MatchId) -> bool {
        self.matches
            .remove(&match_id)
            .is_some_and(|m| m.phase == MatchPhase::Displayed)
    }

    async fn display(&mut self, match_id: MatchId, peer: CandidateProfile) -> DeliveryOutcome {
        let Some(tracked) = self.matches.get_mut(&match_id) else {
            return DeliveryOutcome::Suppressed;
        };
        tracked.phase = MatchPhase::Ready;
        let force = tracked.force;

        match self.tracker.mark_shown(match_id, force).await {
            Ok(true) => {
                let Some(tracked) = self.matches.get_mut(&match_id) else {
                    return DeliveryOutcome::Suppressed;
                };
                tracked.phase = MatchPhase::Displayed;
                tracing::info!(match_id, peer_user_id = peer.user_id, forced = force, "Match popup displayed");
                DeliveryOutcome::Displayed(PopupEvent::Displayed {
                    event: tracked.event.clone(),
                    peer,
                    forced: force,
                })
            }
            Ok(false) => {
                tracing::debug!(match_id, "Match popup already shown by another tab");
                self.matches.remove(&match_id);
                DeliveryOutcome::Suppressed
            }
            Err(e) => {
                tracing::warn!(match_id, error = %e, "Failed to persist popup state, deferring match");
                self.matches.remove(&match_id);
                DeliveryOutcome::Deferred
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;

    use super::*;
    use crate::store::{MemoryPopupStore, PopupStore};
    use crate::sync::TabSignalHub;

    const ME: DbId = 1;
    const PEER: DbId = 2;

    fn profile(user_id: DbId) -> CandidateProfile {
        CandidateProfile {
            user_id,
            display_name: format!("user-{user_id}"),
            age: Some(28),
            bio: None,
            photo_urls: vec![],
            eligibility_version: 1,
        }
    }

    fn delivery(match_id: MatchId) -> MatchDelivery {
        MatchDelivery::new(MatchEvent {
            match_id,
            user_a: ME,
            user_b: PEER,
            created_at: chrono::Utc::now(),
        })
    }

    struct Tab {
        notifier: MatchNotifier,
    }

    fn tab(store: &Arc<dyn PopupStore>, hub: &Arc<TabSignalHub>) -> Tab {
        let tracker = PopupTracker::new(ME, Arc::clone(store));
        let sync = SyncChannel::new(ME, Arc::clone(hub));
        Tab {
            notifier: MatchNotifier::new(tracker, sync),
        }
    }

    fn single() -> MatchNotifier {
        let store: Arc<dyn PopupStore> = Arc::new(MemoryPopupStore::new());
        tab(&store, &Arc::new(TabSignalHub::new())).notifier
    }

    #[tokio::test]
    async fn delivery_with_profile_displays_immediately() {
        let mut notifier = single();
        let outcome = notifier.on_delivery(delivery(10).with_profile(profile(PEER))).await;

        assert_matches!(outcome, DeliveryOutcome::Displayed(PopupEvent::Displayed { peer, forced: false, .. }) => {
            assert_eq!(peer.user_id, PEER);
        });
        assert_eq!(notifier.phase(10), MatchPhase::Displayed);
        assert_eq!(notifier.tracker().state(10).await.unwrap(), PopupState::Shown);
    }

    #[tokio::test]
    async fn cached_profile_avoids_fetch() {
        let mut notifier = single();
        notifier.cache_profile(profile(PEER));
        assert_matches!(
            notifier.on_delivery(delivery(10)).await,
            DeliveryOutcome::Displayed(_)
        );
    }

    #[tokio::test]
    async fn missing_profile_requests_fetch_then_displays() {
        let mut notifier = single();
        assert_eq!(
            notifier.on_delivery(delivery(10)).await,
            DeliveryOutcome::NeedsPeer {
                match_id: 10,
                peer_user_id: PEER
            }
        );
        assert_eq!(notifier.phase(10), MatchPhase::Armed);

        assert_matches!(
            notifier.on_peer_result(10, Ok(profile(PEER))).await,
            DeliveryOutcome::Displayed(_)
        );
    }

    #[tokio::test]
    async fn failed_peer_fetch_leaves_match_unseen_for_retry() {
        let mut notifier = single();
        notifier.on_delivery(delivery(10)).await;
        assert_eq!(
            notifier.on_peer_result(10, Err("timeout".into())).await,
            DeliveryOutcome::Deferred
        );
        assert_eq!(notifier.phase(10), MatchPhase::Idle);
        assert_eq!(notifier.tracker().state(10).await.unwrap(), PopupState::Unseen);

        assert_matches!(
            notifier.on_delivery(delivery(10).with_profile(profile(PEER))).await,
            DeliveryOutcome::Displayed(_)
        );
    }

    #[tokio::test]
    async fn duplicate_deliveries_display_once() {
        let mut notifier = single();
        let mut displayed = 0;
        for _ in 0..5 {
            if let DeliveryOutcome::Displayed(_) =
                notifier.on_delivery(delivery(10).with_profile(profile(PEER))).await
            {
                displayed += 1;
            }
        }
        assert_eq!(displayed, 1);
    }

    #[tokio::test]
    async fn self_match_is_discarded() {
        let mut notifier = single();
        let bogus = MatchDelivery::new(MatchEvent {
            match_id: 10,
            user_a: ME,
            user_b: ME,
            created_at: chrono::Utc::now(),
        });
        assert_eq!(notifier.on_delivery(bogus).await, DeliveryOutcome::Discarded);
        assert_eq!(notifier.tracker().state(10).await.unwrap(), PopupState::Unseen);
    }

    #[tokio::test]
    async fn match_for_someone_else_is_discarded() {
        let mut notifier = single();
        let foreign = MatchDelivery::new(MatchEvent {
            match_id: 10,
            user_a: 5,
            user_b: 6,
            created_at: chrono::Utc::now(),
        });
        assert_eq!(notifier.on_delivery(foreign).await, DeliveryOutcome::Discarded);
    }

    #[tokio::test]
    async fn dismiss_message_persists_then_navigates() {
        let mut notifier = single();
        notifier.on_delivery(delivery(10).with_profile(profile(PEER))).await;

        let dismissal = notifier.dismiss(10, DismissAction::Message).await.unwrap();

        assert_eq!(
            dismissal.navigation,
            Some(Navigation::Conversation {
                match_id: 10,
                peer_user_id: PEER
            })
        );
        assert_eq!(
            notifier.tracker().state(10).await.unwrap(),
            PopupState::Dismissed(DismissAction::Message)
        );
        assert_eq!(notifier.phase(10), MatchPhase::Idle);
        assert!(notifier.displayed().is_empty());
    }

    #[tokio::test]
    async fn dismissed_matches_are_not_retained() {
        let mut notifier = single();
        for match_id in 1..=50 {
            notifier
                .on_delivery(delivery(match_id).with_profile(profile(PEER)))
                .await;
            notifier
                .dismiss(match_id, DismissAction::Continue)
                .await
                .unwrap();
        }
        notifier
            .on_delivery(delivery(51).with_profile(profile(PEER)))
            .await;
        notifier
            .on_dismiss_signal(DismissSignal {
                match_id: 51,
                dismissed_by_user_id: PEER,
                action: DismissAction::Continue,
                origin: uuid::Uuid::new_v4(),
            })
            .await;

        assert!(notifier.matches.is_empty());
        assert!(notifier.tracker().state(1).await.unwrap().is_dismissed());
    }

    #[tokio::test]
    async fn dismissed_match_is_not_redisplayed_without_force() {
        let mut notifier = single();
        notifier.on_delivery(delivery(10).with_profile(profile(PEER))).await;
        notifier.dismiss(10, DismissAction::Continue).await.unwrap();

        assert_eq!(
            notifier.on_delivery(delivery(10).with_profile(profile(PEER))).await,
            DeliveryOutcome::Suppressed
        );
        assert_matches!(
            notifier.on_delivery(delivery(10).with_profile(profile(PEER)).forced()).await,
            DeliveryOutcome::Displayed(PopupEvent::Displayed { forced: true, .. })
        );
    }

    #[tokio::test]
    async fn dismiss_requires_displayed_popup() {
        let mut notifier = single();
        assert_matches!(
            notifier.dismiss(10, DismissAction::Continue).await,
            Err(NotifyError::NotDisplayed(10))
        );
    }

    #[tokio::test]
    async fn second_tab_does_not_display_and_follows_dismissal() {
        let store: Arc<dyn PopupStore> = Arc::new(MemoryPopupStore::new());
        let hub = Arc::new(TabSignalHub::new());
        let mut tab1 = tab(&store, &hub);
        let mut tab2 = tab(&store, &hub);
        let mut tab2_signals = tab2.notifier.subscribe_tabs();

        assert_matches!(
            tab1.notifier.on_delivery(delivery(10).with_profile(profile(PEER))).await,
            DeliveryOutcome::Displayed(_)
        );
        assert_eq!(
            tab2.notifier.on_delivery(delivery(10).with_profile(profile(PEER))).await,
            DeliveryOutcome::Suppressed
        );

        tab1.notifier.dismiss(10, DismissAction::Continue).await.unwrap();
        let signal = tab2_signals.try_recv().unwrap();
        // Not on screen in tab 2, so no event, but the state is settled.
        assert_eq!(tab2.notifier.on_dismiss_signal(signal).await, None);
        assert!(tab2.notifier.tracker().state(10).await.unwrap().is_dismissed());
    }

    #[tokio::test]
    async fn remote_dismissal_closes_displayed_popup_without_echo() {
        let mut notifier = single();
        let mut own_signals = notifier.subscribe_tabs();
        notifier.on_delivery(delivery(10).with_profile(profile(PEER))).await;

        let peer_signal = DismissSignal {
            match_id: 10,
            dismissed_by_user_id: PEER,
            action: DismissAction::Continue,
            origin: uuid::Uuid::new_v4(),
        };
        assert_eq!(
            notifier.on_dismiss_signal(peer_signal).await,
            Some(PopupEvent::Dismissed {
                match_id: 10,
                action: DismissAction::Continue,
                remote: true
            })
        );
        assert!(own_signals.try_recv().is_err());
    }

    #[tokio::test]
    async fn own_signal_is_ignored() {
        let mut notifier = single();
        let mut signals = notifier.subscribe_tabs();
        notifier.on_delivery(delivery(10).with_profile(profile(PEER))).await;
        notifier.dismiss(10, DismissAction::Continue).await.unwrap();

        let echo = signals.try_recv().unwrap();
        assert_eq!(notifier.on_dismiss_signal(echo).await, None);
    }

    #[tokio::test]
    async fn dismissal_during_peer_fetch_cancels_display() {
        let mut notifier = single();
        notifier.on_delivery(delivery(10)).await;
        notifier
            .on_dismiss_signal(DismissSignal {
                match_id: 10,
                dismissed_by_user_id: PEER,
                action: DismissAction::Message,
                origin: uuid::Uuid::new_v4(),
            })
            .await;

        assert_eq!(
            notifier.on_peer_result(10, Ok(profile(PEER))).await,
            DeliveryOutcome::Suppressed
        );
    }

    #[tokio::test]
    async fn dismissal_seen_in_store_closes_popup() {
        let store: Arc<dyn PopupStore> = Arc::new(MemoryPopupStore::new());
        let hub = Arc::new(TabSignalHub::new());
        let mut tab1 = tab(&store, &hub);
        // A tab whose sync signal is lost: it only shares the store.
        let other = PopupTracker::new(ME, Arc::clone(&store));

        tab1.notifier
            .on_delivery(delivery(10).with_profile(profile(PEER)))
            .await;
        other
            .mark_dismissed(10, DismissAction::Continue)
            .await
            .unwrap();

        let change = PopupChange {
            match_id: 10,
            state: PopupState::Dismissed(DismissAction::Continue),
        };
        assert_eq!(
            tab1.notifier.on_state_change(change.clone()).await,
            Some(PopupEvent::Dismissed {
                match_id: 10,
                action: DismissAction::Continue,
                remote: true
            })
        );
        assert!(tab1.notifier.displayed().is_empty());
        assert_eq!(tab1.notifier.on_state_change(change).await, None);
    }

    #[tokio::test]
    async fn stale_store_change_does_not_close_forced_redisplay() {
        let mut notifier = single();
        notifier
            .on_delivery(delivery(10).with_profile(profile(PEER)))
            .await;
        notifier
            .dismiss(10, DismissAction::Continue)
            .await
            .unwrap();
        notifier
            .on_delivery(delivery(10).with_profile(profile(PEER)).forced())
            .await;

        let stale = PopupChange {
            match_id: 10,
            state: PopupState::Dismissed(DismissAction::Continue),
        };
        assert_eq!(notifier.on_state_change(stale).await, None);
        assert_eq!(notifier.displayed(), vec![10]);
    }
}
