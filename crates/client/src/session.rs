//! Discovery session: the client's single event loop.
//!
//! [`DiscoverySession`] owns the [`SwipeProcessor`] and the
//! [`MatchNotifier`]. Gestures are applied synchronously; every network
//! effect runs as a spawned task that posts a [`Completion`] back to the
//! loop, so a swipe or undo never waits on the network and all state is
//! mutated from one place. Popup state reads and writes go through the
//! tracker's blocking pool and are awaited in place.

use std::sync::Arc;
use std::time::Duration;

use kindred_core::candidate::CandidateProfile;
use kindred_core::discovery::QueueStatus;
use kindred_core::error::CoreError;
use kindred_core::popup::DismissAction;
use kindred_core::processor::{
    InvalidateRequest, RecordOutcome, RecordRequest, RefillRequest, SwipeAck, SwipeProcessor,
};
use kindred_core::protocol::{DismissSignal, MatchDelivery, PushMessage};
use kindred_core::swipe::SwipeAction;
use kindred_core::types::{DbId, MatchId, SwipeKey};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::api::KindredApi;
use crate::notifier::{DeliveryOutcome, MatchNotifier, Navigation, PopupEvent};
use crate::ports::{CandidateSource, ProfileDirectory, SwipeLedger};
use crate::reconnect::{next_delay, ReconnectConfig};
use crate::tracker::PopupChange;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// The server-facing collaborators a session calls.
#[derive(Clone)]
pub struct SessionPorts {
    pub candidates: Arc<dyn CandidateSource>,
    pub ledger: Arc<dyn SwipeLedger>,
    pub profiles: Arc<dyn ProfileDirectory>,
}

impl SessionPorts {
    /// Use one HTTP client for every port.
    pub fn from_api(api: KindredApi) -> Self {
        let api = Arc::new(api);
        Self {
            candidates: api.clone(),
            ledger: api.clone(),
            profiles: api,
        }
    }
}

/// UI input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Swipe {
        target_user_id: DbId,
        action: SwipeAction,
    },
    SwipeCurrent(SwipeAction),
    Undo,
    Dismiss {
        match_id: MatchId,
        action: DismissAction,
    },
    /// Try the candidate store again after it reported no more candidates.
    ResetExhausted,
}

/// Result of a spawned network request, posted back to the loop.
#[derive(Debug)]
pub enum Completion {
    Recorded {
        swipe_key: SwipeKey,
        result: Result<SwipeAck, String>,
    },
    Invalidated {
        request: InvalidateRequest,
        result: Result<(), String>,
    },
    Refilled(Result<Vec<CandidateProfile>, String>),
    /// Backoff after a failed refill has elapsed.
    RetryRefill,
    PeerFetched {
        match_id: MatchId,
        result: Result<CandidateProfile, String>,
    },
}

/// State changes published to UI observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum SessionEvent {
    QueueChanged {
        current: Option<CandidateProfile>,
        remaining: usize,
        can_undo: bool,
    },
    SwipeRolledBack {
        target_user_id: DbId,
        reason: String,
    },
    /// The candidate store has nothing more to show.
    QueueExhausted,
    Popup(PopupEvent),
    Navigate(Navigation),
    CommandRejected {
        reason: String,
    },
}

pub struct DiscoverySession {
    processor: SwipeProcessor,
    notifier: MatchNotifier,
    ports: SessionPorts,
    refill_batch: usize,
    refill_backoff: ReconnectConfig,
    /// Delay before the next refill retry; reset by a successful refill.
    refill_delay: Duration,
    retry_scheduled: bool,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    events: broadcast::Sender<SessionEvent>,
}

impl DiscoverySession {
    pub fn new(
        processor: SwipeProcessor,
        notifier: MatchNotifier,
        ports: SessionPorts,
        refill_batch: usize,
    ) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let refill_backoff = ReconnectConfig::default();
        Self {
            processor,
            notifier,
            ports,
            refill_batch: refill_batch.max(1),
            refill_delay: refill_backoff.initial_delay,
            refill_backoff,
            retry_scheduled: false,
            completions_tx,
            completions_rx,
            events,
        }
    }

    /// Backoff applied between failed refills.
    pub fn with_refill_backoff(mut self, backoff: ReconnectConfig) -> Self {
        self.refill_delay = backoff.initial_delay;
        self.refill_backoff = backoff;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn processor(&self) -> &SwipeProcessor {
        &self.processor
    }

    pub fn notifier(&self) -> &MatchNotifier {
        &self.notifier
    }

    /// Kick off the first refill.
    pub fn start(&mut self) {
        self.maybe_refill();
        self.publish_queue();
    }

    /// Drive the session until `cancel` fires or the command channel closes.
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<SessionCommand>,
        mut push: mpsc::UnboundedReceiver<PushMessage>,
        cancel: CancellationToken,
    ) {
        let mut tabs = self.notifier.subscribe_tabs();
        let mut tabs_open = true;
        let mut popup_changes = self.notifier.tracker().subscribe();
        let mut popup_changes_open = true;
        self.start();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(completion) = self.completions_rx.recv() => self.handle_completion(completion).await,
                Some(message) = push.recv() => self.handle_push(message).await,
                signal = tabs.recv(), if tabs_open => match signal {
                    Ok(signal) => self.handle_tab_signal(signal).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // Missed signals are covered by the durable popup state.
                        tracing::warn!(skipped = n, "Tab signals lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => tabs_open = false,
                },
                change = popup_changes.recv(), if popup_changes_open => match change {
                    Ok(change) => self.handle_popup_change(change).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Popup state changes lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => popup_changes_open = false,
                },
            }
        }
        tracing::info!(
            user_id = self.notifier.local_user_id(),
            pending = self.processor.pending_count(),
            "Discovery session stopped"
        );
    }

    /// Wait for one network completion and apply it. Returns `false` if no
    /// completion can arrive.
    pub async fn pump(&mut self) -> bool {
        match self.completions_rx.recv().await {
            Some(completion) => {
                self.handle_completion(completion).await;
                true
            }
            None => false,
        }
    }

    // ---- inputs ----

    pub async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Swipe {
                target_user_id,
                action,
            } => {
                let result = self.processor.swipe(target_user_id, action);
                self.after_swipe(result);
            }
            SessionCommand::SwipeCurrent(action) => {
                let result = self.processor.swipe_current(action);
                self.after_swipe(result);
            }
            SessionCommand::Undo => match self.processor.undo() {
                Some(undone) => {
                    tracing::debug!(
                        target_user_id = undone.restored().user_id,
                        deferred = undone.invalidate.is_none(),
                        "Swipe undone"
                    );
                    if let Some(request) = undone.invalidate {
                        self.spawn_invalidate(request);
                    }
                    self.publish_queue();
                }
                None => self.reject("nothing to undo"),
            },
            SessionCommand::Dismiss { match_id, action } => {
                match self.notifier.dismiss(match_id, action).await {
                    Ok(dismissal) => {
                        self.publish(SessionEvent::Popup(dismissal.event));
                        if let Some(navigation) = dismissal.navigation {
                            self.publish(SessionEvent::Navigate(navigation));
                        }
                    }
                    Err(e) => {
                        tracing::warn!(match_id, error = %e, "Dismiss failed");
                        self.reject(&e.to_string());
                    }
                }
            }
            SessionCommand::ResetExhausted => {
                self.processor.reset_exhausted();
                self.maybe_refill();
                self.publish_queue();
            }
        }
    }

    pub async fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Recorded { swipe_key, result } => {
                self.on_recorded(swipe_key, result).await
            }
            Completion::Invalidated { request, result } => {
                if let Err(reason) = &result {
                    tracing::warn!(
                        swipe_key = %request.swipe_key,
                        target_user_id = request.target_user_id,
                        error = %reason,
                        "Undo invalidation failed, queued for repair"
                    );
                }
                self.processor.on_invalidate_result(request, result);
            }
            Completion::Refilled(result) => self.on_refilled(result),
            Completion::RetryRefill => {
                self.retry_scheduled = false;
                self.maybe_refill();
                self.publish_queue();
            }
            Completion::PeerFetched { match_id, result } => {
                let outcome = self.notifier.on_peer_result(match_id, result).await;
                self.apply_delivery(outcome);
            }
        }
    }

    pub async fn handle_push(&mut self, message: PushMessage) {
        match message {
            PushMessage::MatchCreated(delivery) => {
                let outcome = self.notifier.on_delivery(delivery).await;
                self.apply_delivery(outcome);
            }
            PushMessage::PopupDismissed(signal) => self.handle_tab_signal(signal).await,
        }
    }

    pub async fn handle_tab_signal(&mut self, signal: DismissSignal) {
        if let Some(event) = self.notifier.on_dismiss_signal(signal).await {
            self.publish(SessionEvent::Popup(event));
        }
    }

    /// A popup state change from the tracker's feed, including writes by
    /// tabs in other processes.
    pub async fn handle_popup_change(&mut self, change: PopupChange) {
        if let Some(event) = self.notifier.on_state_change(change).await {
            self.publish(SessionEvent::Popup(event));
        }
    }

    // ---- completions ----

    async fn on_recorded(&mut self, swipe_key: SwipeKey, result: Result<SwipeAck, String>) {
        match self.processor.on_record_result(swipe_key, result) {
            RecordOutcome::Confirmed { record, matched } => {
                tracing::debug!(
                    swipe_key = %swipe_key,
                    id = ?record.id,
                    target_user_id = record.target_user_id,
                    "Swipe confirmed"
                );
                if let Some(event) = matched {
                    self.notifier.cache_profile(record.source_snapshot);
                    let outcome = self.notifier.on_delivery(MatchDelivery::new(event)).await;
                    self.apply_delivery(outcome);
                }
            }
            RecordOutcome::ConfirmedAfterUndo(request) => {
                tracing::debug!(swipe_key = %swipe_key, "Swipe confirmed after undo, invalidating");
                self.spawn_invalidate(request);
            }
            RecordOutcome::RolledBack {
                target_user_id,
                reason,
                restored,
            } => {
                tracing::warn!(
                    swipe_key = %swipe_key,
                    target_user_id,
                    restored,
                    error = %reason,
                    "Swipe write failed, rolled back"
                );
                self.publish(SessionEvent::SwipeRolledBack {
                    target_user_id,
                    reason,
                });
                self.publish_queue();
            }
            RecordOutcome::Ignored => {
                tracing::debug!(swipe_key = %swipe_key, "Late swipe completion ignored");
            }
        }
    }

    fn on_refilled(&mut self, result: Result<Vec<CandidateProfile>, String>) {
        let failed = match &result {
            Ok(profiles) => {
                self.notifier.cache_profiles(profiles.iter().cloned());
                self.refill_delay = self.refill_backoff.initial_delay;
                false
            }
            Err(reason) => {
                tracing::warn!(
                    error = %reason,
                    retry_in_ms = self.refill_delay.as_millis() as u64,
                    "Candidate refill failed"
                );
                true
            }
        };

        let appended = self.processor.on_refill_result(result);
        tracing::debug!(appended, remaining = self.processor.queue().len(), "Refill applied");
        if failed {
            self.schedule_refill_retry();
        } else {
            // A short batch can leave the queue below the low-water mark.
            self.maybe_refill();
        }
        if self.processor.queue().status() == QueueStatus::Exhausted {
            self.publish(SessionEvent::QueueExhausted);
        }
        self.publish_queue();
    }

    /// Post [`Completion::RetryRefill`] once the current backoff elapses.
    fn schedule_refill_retry(&mut self) {
        if self.retry_scheduled {
            return;
        }
        self.retry_scheduled = true;
        let delay = self.refill_delay;
        self.refill_delay = next_delay(delay, &self.refill_backoff);

        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Completion::RetryRefill);
        });
    }

    fn apply_delivery(&mut self, outcome: DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Displayed(event) => self.publish(SessionEvent::Popup(event)),
            DeliveryOutcome::NeedsPeer {
                match_id,
                peer_user_id,
            } => self.spawn_fetch_peer(match_id, peer_user_id),
            DeliveryOutcome::Suppressed | DeliveryOutcome::Discarded | DeliveryOutcome::Deferred => {}
        }
    }

    // ---- effects ----

    fn after_swipe(&mut self, result: Result<RecordRequest, CoreError>) {
        match result {
            Ok(request) => {
                self.spawn_record(request);
                self.maybe_refill();
                self.publish_queue();
            }
            Err(e) => {
                tracing::debug!(error = %e, "Swipe rejected");
                self.reject(&e.to_string());
            }
        }
    }

    /// Start a refill if the queue is low. Failed invalidations are re-sent
    /// first so the server has converged before the exclude set is built.
    fn maybe_refill(&mut self) {
        let Some(request) = self.processor.refill_request() else {
            return;
        };
        for repair in self.processor.take_repairs() {
            tracing::info!(swipe_key = %repair.swipe_key, "Re-sending failed invalidation");
            self.spawn_invalidate(repair);
        }
        self.spawn_refill(request);
    }

    fn spawn_record(&self, request: RecordRequest) {
        let ledger = Arc::clone(&self.ports.ledger);
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = ledger.record_swipe(&request).await.map_err(|e| e.to_string());
            let _ = tx.send(Completion::Recorded {
                swipe_key: request.swipe_key,
                result,
            });
        });
    }

    fn spawn_invalidate(&self, request: InvalidateRequest) {
        let ledger = Arc::clone(&self.ports.ledger);
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = ledger
                .invalidate_swipe(&request)
                .await
                .map_err(|e| e.to_string());
            let _ = tx.send(Completion::Invalidated { request, result });
        });
    }

    fn spawn_refill(&self, request: RefillRequest) {
        let candidates = Arc::clone(&self.ports.candidates);
        let tx = self.completions_tx.clone();
        let limit = self.refill_batch;
        tokio::spawn(async move {
            let result = candidates
                .fetch_candidates(&request.exclude, limit)
                .await
                .map_err(|e| e.to_string());
            let _ = tx.send(Completion::Refilled(result));
        });
    }

    fn spawn_fetch_peer(&self, match_id: MatchId, peer_user_id: DbId) {
        let profiles = Arc::clone(&self.ports.profiles);
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = profiles
                .fetch_profile(peer_user_id)
                .await
                .map_err(|e| e.to_string());
            let _ = tx.send(Completion::PeerFetched { match_id, result });
        });
    }

    // ---- observers ----

    fn publish_queue(&self) {
        self.publish(SessionEvent::QueueChanged {
            current: self.processor.current().cloned(),
            remaining: self.processor.queue().len(),
            can_undo: self.processor.can_undo(),
        });
    }

    fn reject(&self, reason: &str) {
        self.publish(SessionEvent::CommandRejected {
            reason: reason.to_string(),
        });
    }

    fn publish(&self, event: SessionEvent) {
        // No observers is fine.
        let _ = self.events.send(event);
    }
}
