//! Discovery session behaviour against in-memory ports.
//!
//! Record requests are gated: each one blocks until the test releases it,
//! so acknowledgement order is fully controlled.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use kindred_client::api::ApiError;
use kindred_client::notifier::{MatchNotifier, Navigation, PopupEvent};
use kindred_client::ports::{CandidateSource, ProfileDirectory, SwipeLedger};
use kindred_client::reconnect::ReconnectConfig;
use kindred_client::session::{DiscoverySession, SessionCommand, SessionEvent, SessionPorts};
use kindred_client::store::{FilePopupStore, MemoryPopupStore, PopupStore};
use kindred_client::sync::{SyncChannel, TabSignalHub};
use kindred_client::tracker::PopupTracker;
use kindred_client::watch::spawn_store_watcher;
use kindred_core::candidate::CandidateProfile;
use kindred_core::discovery::{DiscoveryQueue, QueueStatus};
use kindred_core::matching::MatchEvent;
use kindred_core::popup::{DismissAction, PopupState};
use kindred_core::processor::{InvalidateRequest, RecordRequest, SwipeAck, SwipeProcessor};
use kindred_core::protocol::{ClientMessage, MatchDelivery, PushMessage};
use kindred_core::swipe::SwipeAction;
use kindred_core::types::DbId;
use kindred_core::undo::UndoStack;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

const ME: DbId = 1;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

fn profile(user_id: DbId) -> CandidateProfile {
    CandidateProfile {
        user_id,
        display_name: format!("user-{user_id}"),
        age: Some(30),
        bio: None,
        photo_urls: vec![format!("https://cdn.kindred.test/{user_id}.jpg")],
        eligibility_version: 1,
    }
}

fn unavailable() -> ApiError {
    ApiError::Status {
        status: 503,
        body: "unavailable".into(),
    }
}

#[derive(Default)]
struct FakeCandidates {
    profiles: Mutex<Vec<CandidateProfile>>,
    calls: Mutex<Vec<Vec<DbId>>>,
    /// Number of upcoming fetches that fail.
    failures: AtomicUsize,
}

impl FakeCandidates {
    fn with(ids: impl IntoIterator<Item = DbId>) -> Self {
        Self {
            profiles: Mutex::new(ids.into_iter().map(profile).collect()),
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<Vec<DbId>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CandidateSource for FakeCandidates {
    async fn fetch_candidates(
        &self,
        exclude: &[DbId],
        limit: usize,
    ) -> Result<Vec<CandidateProfile>, ApiError> {
        self.calls.lock().unwrap().push(exclude.to_vec());
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(unavailable());
        }
        Ok(self
            .profiles
            .lock()
            .unwrap()
            .iter()
            .filter(|p| !exclude.contains(&p.user_id))
            .take(limit)
            .cloned()
            .collect())
    }
}

type Gate = oneshot::Sender<Result<SwipeAck, ApiError>>;

#[derive(Default)]
struct GatedLedger {
    gates: Mutex<HashMap<DbId, Gate>>,
    records: Mutex<Vec<RecordRequest>>,
    invalidations: Mutex<Vec<InvalidateRequest>>,
    fail_invalidations: AtomicBool,
}

impl GatedLedger {
    /// Complete the in-flight record request for `target`.
    async fn release(&self, target: DbId, result: Result<SwipeAck, ApiError>) {
        for _ in 0..1000 {
            let gate = self.gates.lock().unwrap().remove(&target);
            if let Some(gate) = gate {
                let _ = gate.send(result);
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("no record request in flight for user {target}");
    }

    fn key_for(&self, target: DbId) -> uuid::Uuid {
        self.records
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.target_user_id == target)
            .map(|r| r.swipe_key)
            .unwrap()
    }

    fn invalidated_targets(&self) -> Vec<DbId> {
        self.invalidations
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.target_user_id)
            .collect()
    }
}

#[async_trait]
impl SwipeLedger for GatedLedger {
    async fn record_swipe(&self, request: &RecordRequest) -> Result<SwipeAck, ApiError> {
        let (tx, rx) = oneshot::channel();
        self.records.lock().unwrap().push(request.clone());
        self.gates.lock().unwrap().insert(request.target_user_id, tx);
        rx.await.unwrap_or_else(|_| Err(unavailable()))
    }

    async fn invalidate_swipe(&self, request: &InvalidateRequest) -> Result<(), ApiError> {
        self.invalidations.lock().unwrap().push(request.clone());
        if self.fail_invalidations.load(Ordering::SeqCst) {
            Err(unavailable())
        } else {
            Ok(())
        }
    }
}

struct FakeDirectory;

#[async_trait]
impl ProfileDirectory for FakeDirectory {
    async fn fetch_profile(&self, user_id: DbId) -> Result<CandidateProfile, ApiError> {
        Ok(profile(user_id))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    session: DiscoverySession,
    ledger: Arc<GatedLedger>,
    candidates: Arc<FakeCandidates>,
    events: broadcast::Receiver<SessionEvent>,
}

struct HarnessBuilder {
    user_id: DbId,
    seed: Vec<DbId>,
    store_ids: Vec<DbId>,
    low_water_mark: usize,
    popup_store: Arc<dyn PopupStore>,
    sync: Option<SyncChannel>,
}

impl HarnessBuilder {
    fn new() -> Self {
        Self {
            user_id: ME,
            seed: Vec::new(),
            store_ids: Vec::new(),
            low_water_mark: 0,
            popup_store: Arc::new(MemoryPopupStore::new()),
            sync: None,
        }
    }

    fn seed(mut self, ids: impl IntoIterator<Item = DbId>) -> Self {
        self.seed = ids.into_iter().collect();
        self
    }

    fn store(mut self, ids: impl IntoIterator<Item = DbId>, low_water_mark: usize) -> Self {
        self.store_ids = ids.into_iter().collect();
        self.low_water_mark = low_water_mark;
        self
    }

    fn user(mut self, user_id: DbId) -> Self {
        self.user_id = user_id;
        self
    }

    fn popup_store(mut self, store: Arc<dyn PopupStore>) -> Self {
        self.popup_store = store;
        self
    }

    fn sync(mut self, sync: SyncChannel) -> Self {
        self.sync = Some(sync);
        self
    }

    fn build(self) -> Harness {
        let ledger = Arc::new(GatedLedger::default());
        let candidates = Arc::new(FakeCandidates::with(self.store_ids));

        let mut processor = SwipeProcessor::new(
            DiscoveryQueue::new(self.low_water_mark),
            UndoStack::default(),
        );
        processor.seed(self.seed.into_iter().map(profile).collect());

        let sync = self
            .sync
            .unwrap_or_else(|| SyncChannel::new(self.user_id, Arc::new(TabSignalHub::new())));
        let notifier = MatchNotifier::new(PopupTracker::new(self.user_id, self.popup_store), sync);

        let ports = SessionPorts {
            candidates: candidates.clone(),
            ledger: ledger.clone(),
            profiles: Arc::new(FakeDirectory),
        };
        let session = DiscoverySession::new(processor, notifier, ports, 3).with_refill_backoff(
            ReconnectConfig {
                initial_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(20),
                multiplier: 2.0,
            },
        );
        let events = session.subscribe();

        Harness {
            session,
            ledger,
            candidates,
            events,
        }
    }
}

impl Harness {
    fn queue(&self) -> Vec<DbId> {
        self.session.processor().queue().user_ids()
    }

    async fn swipe(&mut self, target_user_id: DbId, action: SwipeAction) {
        self.session
            .handle_command(SessionCommand::Swipe {
                target_user_id,
                action,
            })
            .await;
    }

    async fn undo(&mut self) {
        self.session.handle_command(SessionCommand::Undo).await;
    }

    /// Release a record request and apply its completion.
    async fn ack(&mut self, target: DbId, result: Result<SwipeAck, ApiError>) {
        self.ledger.release(target, result).await;
        assert!(self.session.pump().await);
    }

    fn drain_events(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    fn popups(&mut self) -> Vec<PopupEvent> {
        self.drain_events()
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::Popup(p) => Some(p),
                _ => None,
            })
            .collect()
    }
}

fn ok(id: DbId) -> Result<SwipeAck, ApiError> {
    Ok(SwipeAck { id, matched: None })
}

fn match_with(match_id: DbId, a: DbId, b: DbId) -> MatchEvent {
    MatchEvent {
        match_id,
        user_a: a.min(b),
        user_b: a.max(b),
        created_at: chrono::Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// Swipe / undo
// ---------------------------------------------------------------------------

#[tokio::test]
async fn like_then_immediate_undo_restores_and_late_ack_invalidates() {
    let mut h = HarnessBuilder::new().seed([10, 11, 12]).build();

    h.swipe(10, SwipeAction::Like).await;
    assert_eq!(h.queue(), vec![11, 12]);
    assert_eq!(h.session.processor().undo_stack().len(), 1);

    h.undo().await;
    assert_eq!(h.queue(), vec![10, 11, 12]);
    assert!(h.session.processor().undo_stack().is_empty());
    assert!(h.ledger.invalidated_targets().is_empty());

    // The write lands after the undo: a compensating invalidation follows.
    h.ack(10, ok(100)).await;
    assert!(h.session.pump().await);

    assert_eq!(h.ledger.invalidated_targets(), vec![10]);
    assert_eq!(h.queue(), vec![10, 11, 12]);
    assert_eq!(h.session.processor().repair_count(), 0);
}

#[tokio::test]
async fn undo_order_follows_gestures_not_acks() {
    let mut h = HarnessBuilder::new().seed([21, 22, 23, 24, 25]).build();

    h.swipe(21, SwipeAction::Like).await;
    h.swipe(22, SwipeAction::Dislike).await;
    h.swipe(23, SwipeAction::Like).await;

    h.ack(23, ok(3)).await;
    h.ack(21, ok(1)).await;
    h.ack(22, ok(2)).await;

    h.undo().await;
    h.undo().await;

    assert_eq!(h.queue(), vec![22, 23, 24, 25]);
    let remaining: Vec<_> = h
        .session
        .processor()
        .undo_stack()
        .iter()
        .map(|e| e.record.target_user_id)
        .collect();
    assert_eq!(remaining, vec![21]);

    assert!(h.session.pump().await);
    assert!(h.session.pump().await);
    let mut invalidated = h.ledger.invalidated_targets();
    invalidated.sort_unstable();
    assert_eq!(invalidated, vec![22, 23]);
}

#[tokio::test]
async fn failed_write_rolls_back_to_identical_queue() {
    let mut h = HarnessBuilder::new().seed([31, 32, 33]).build();
    let before = h.session.processor().queue().entries();

    h.swipe(32, SwipeAction::Like).await;
    h.drain_events();
    h.ack(32, Err(unavailable())).await;

    assert_eq!(h.session.processor().queue().entries(), before);
    assert!(h.session.processor().undo_stack().is_empty());
    assert!(h.drain_events().iter().any(|e| matches!(
        e,
        SessionEvent::SwipeRolledBack { target_user_id: 32, .. }
    )));
}

#[tokio::test]
async fn failure_below_later_swipes_keeps_their_undo_entries() {
    let mut h = HarnessBuilder::new().seed([41, 42, 43]).build();

    h.swipe(41, SwipeAction::Like).await;
    h.swipe(42, SwipeAction::Like).await;
    h.ack(41, Err(unavailable())).await;

    assert_eq!(h.queue(), vec![41, 43]);
    let stack: Vec<_> = h
        .session
        .processor()
        .undo_stack()
        .iter()
        .map(|e| e.record.target_user_id)
        .collect();
    assert_eq!(stack, vec![42]);

    h.ack(42, ok(2)).await;
    h.undo().await;
    // Undo always brings the profile back as the current one.
    assert_eq!(h.queue(), vec![42, 41, 43]);
}

#[tokio::test]
async fn late_failure_after_undo_changes_nothing() {
    let mut h = HarnessBuilder::new().seed([51, 52]).build();

    h.swipe(51, SwipeAction::Dislike).await;
    h.undo().await;
    h.ack(51, Err(unavailable())).await;

    assert_eq!(h.queue(), vec![51, 52]);
    assert!(h.ledger.invalidated_targets().is_empty());
}

#[tokio::test]
async fn undo_with_empty_stack_is_rejected() {
    let mut h = HarnessBuilder::new().seed([1]).build();
    h.undo().await;
    assert!(h
        .drain_events()
        .iter()
        .any(|e| matches!(e, SessionEvent::CommandRejected { .. })));
}

// ---------------------------------------------------------------------------
// Refill and repair
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_invalidation_is_repaired_before_next_refill() {
    let mut h = HarnessBuilder::new().store(61..=66, 2).build();

    h.session.start();
    assert!(h.session.pump().await);
    assert_eq!(h.queue(), vec![61, 62, 63]);

    h.swipe(61, SwipeAction::Like).await;
    h.ack(61, ok(1)).await;
    let failed_key = h.ledger.key_for(61);

    h.ledger.fail_invalidations.store(true, Ordering::SeqCst);
    h.undo().await;
    assert!(h.session.pump().await);
    assert_eq!(h.session.processor().repair_count(), 1);
    // The restored profile stays visible.
    assert_eq!(h.queue(), vec![61, 62, 63]);

    h.ledger.fail_invalidations.store(false, Ordering::SeqCst);
    h.swipe(61, SwipeAction::Dislike).await;
    h.swipe(62, SwipeAction::Dislike).await;

    // Repair and refill are both in flight now.
    assert!(h.session.pump().await);
    assert!(h.session.pump().await);

    let retried = h
        .ledger
        .invalidations
        .lock()
        .unwrap()
        .iter()
        .filter(|r| r.swipe_key == failed_key)
        .count();
    assert_eq!(retried, 2);
    assert_eq!(h.session.processor().repair_count(), 0);
    assert_eq!(h.candidates.calls().last().unwrap(), &vec![61, 62, 63]);
    assert_eq!(h.queue(), vec![63, 64, 65, 66]);
}

#[tokio::test]
async fn exhausted_store_is_benign_and_retryable() {
    let mut h = HarnessBuilder::new().store(std::iter::empty(), 2).build();

    h.session.start();
    assert!(h.session.pump().await);
    assert_eq!(h.session.processor().queue().status(), QueueStatus::Exhausted);
    assert!(h
        .drain_events()
        .iter()
        .any(|e| matches!(e, SessionEvent::QueueExhausted)));

    h.session.handle_command(SessionCommand::ResetExhausted).await;
    assert!(h.session.pump().await);
    assert_eq!(h.candidates.calls().len(), 2);
}

#[tokio::test]
async fn failed_refill_is_retried_until_it_succeeds() {
    let mut h = HarnessBuilder::new().store(81..=83, 2).build();
    h.candidates.failures.store(2, Ordering::SeqCst);

    h.session.start();
    for _ in 0..2 {
        // The failure, then the backoff timer.
        assert!(h.session.pump().await);
        assert!(h.queue().is_empty());
        assert_ne!(h.session.processor().queue().status(), QueueStatus::Exhausted);
        assert!(h.session.pump().await);
    }
    assert!(h.session.pump().await);

    assert_eq!(h.candidates.calls().len(), 3);
    assert_eq!(h.queue(), vec![81, 82, 83]);
    assert!(!h
        .drain_events()
        .iter()
        .any(|e| matches!(e, SessionEvent::QueueExhausted)));
}

#[tokio::test]
async fn refill_failure_mid_session_recovers_without_user_action() {
    let mut h = HarnessBuilder::new().store(91..=96, 2).build();

    h.session.start();
    assert!(h.session.pump().await);
    assert_eq!(h.queue(), vec![91, 92, 93]);

    h.candidates.failures.store(1, Ordering::SeqCst);
    // Record requests stay gated, so only refill traffic completes below.
    h.swipe(91, SwipeAction::Dislike).await;
    h.swipe(92, SwipeAction::Dislike).await;

    // Failed refill, then the retry it scheduled.
    assert!(h.session.pump().await);
    assert_eq!(h.queue(), vec![93]);
    assert!(h.session.pump().await);
    assert!(h.session.pump().await);

    assert_eq!(h.queue(), vec![93, 94, 95, 96]);
    assert_eq!(h.candidates.calls().len(), 3);
}

// ---------------------------------------------------------------------------
// Matches
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mutual_like_displays_popup_once_across_duplicates() {
    let mut h = HarnessBuilder::new().seed([70, 71]).build();
    let event = match_with(500, ME, 70);

    h.swipe(70, SwipeAction::Like).await;
    h.ack(
        70,
        Ok(SwipeAck {
            id: 9,
            matched: Some(event.clone()),
        }),
    )
    .await;

    for _ in 0..3 {
        h.session
            .handle_push(PushMessage::MatchCreated(MatchDelivery::new(event.clone())))
            .await;
    }

    let popups = h.popups();
    assert_eq!(popups.len(), 1);
    assert_matches!(&popups[0], PopupEvent::Displayed { peer, forced: false, .. } => {
        // Rendered from the swipe snapshot, no lookup needed.
        assert_eq!(peer.user_id, 70);
    });
}

#[tokio::test]
async fn pushed_match_without_profile_fetches_peer() {
    let mut h = HarnessBuilder::new().build();

    h.session
        .handle_push(PushMessage::MatchCreated(MatchDelivery::new(match_with(501, ME, 77))))
        .await;
    assert!(h.session.pump().await);

    assert_matches!(h.popups().as_slice(), [PopupEvent::Displayed { peer, .. }] => {
        assert_eq!(peer.user_id, 77);
    });
}

/// In-memory log sink for a scoped `tracing` subscriber.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn self_match_push_is_never_displayed() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let mut h = HarnessBuilder::new().build();
    let bogus = MatchEvent {
        match_id: 502,
        user_a: ME,
        user_b: ME,
        created_at: chrono::Utc::now(),
    };

    h.session
        .handle_push(PushMessage::MatchCreated(
            MatchDelivery::new(bogus).with_profile(profile(ME)),
        ))
        .await;

    assert!(h.popups().is_empty());
    let output = logs.contents();
    let line = output
        .lines()
        .find(|l| l.contains("Discarded malformed match"))
        .unwrap_or_else(|| panic!("integrity violation not logged:\n{output}"));
    assert!(line.contains("ERROR"), "{line}");
    assert!(line.contains("match_id=502"), "{line}");
    assert_eq!(
        h.session.notifier().tracker().state(502).await.unwrap(),
        PopupState::Unseen
    );
}

#[tokio::test]
async fn dismiss_with_message_persists_before_navigating() {
    let mut h = HarnessBuilder::new().build();
    h.session
        .handle_push(PushMessage::MatchCreated(
            MatchDelivery::new(match_with(503, ME, 80)).with_profile(profile(80)),
        ))
        .await;
    h.drain_events();

    h.session
        .handle_command(SessionCommand::Dismiss {
            match_id: 503,
            action: DismissAction::Message,
        })
        .await;

    let events = h.drain_events();
    assert_eq!(
        events,
        vec![
            SessionEvent::Popup(PopupEvent::Dismissed {
                match_id: 503,
                action: DismissAction::Message,
                remote: false
            }),
            SessionEvent::Navigate(Navigation::Conversation {
                match_id: 503,
                peer_user_id: 80
            }),
        ]
    );
    assert_eq!(
        h.session.notifier().tracker().state(503).await.unwrap(),
        PopupState::Dismissed(DismissAction::Message)
    );
}

#[tokio::test]
async fn dismissal_converges_across_tabs_and_peer() {
    const PEER: DbId = 90;
    let shared_store: Arc<dyn PopupStore> = Arc::new(MemoryPopupStore::new());
    let hub = Arc::new(TabSignalHub::new());
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();

    let mut tab1 = HarnessBuilder::new()
        .popup_store(Arc::clone(&shared_store))
        .sync(SyncChannel::new(ME, Arc::clone(&hub)).with_push(outbound_tx))
        .build();
    let mut tab2 = HarnessBuilder::new()
        .popup_store(Arc::clone(&shared_store))
        .sync(SyncChannel::new(ME, Arc::clone(&hub)))
        .build();
    let mut peer = HarnessBuilder::new().user(PEER).build();
    let mut tab2_signals = tab2.session.notifier().subscribe_tabs();

    let event = match_with(600, ME, PEER);
    let to_me = MatchDelivery::new(event.clone()).with_profile(profile(PEER));
    let to_peer = MatchDelivery::new(event).with_profile(profile(ME));

    tab1.session.handle_push(PushMessage::MatchCreated(to_me.clone())).await;
    tab2.session.handle_push(PushMessage::MatchCreated(to_me)).await;
    peer.session.handle_push(PushMessage::MatchCreated(to_peer)).await;
    assert_eq!(tab1.popups().len(), 1);
    // Already shown by tab 1.
    assert!(tab2.popups().is_empty());
    assert_eq!(peer.popups().len(), 1);

    tab1.session
        .handle_command(SessionCommand::Dismiss {
            match_id: 600,
            action: DismissAction::Continue,
        })
        .await;

    // Other tab: via the in-process hub.
    let signal = tab2_signals.try_recv().unwrap();
    tab2.session.handle_tab_signal(signal).await;
    assert!(tab2
        .session
        .notifier()
        .tracker()
        .state(600)
        .await
        .unwrap()
        .is_dismissed());

    // Peer: via the push connection, as relayed by the server.
    let ClientMessage::PopupDismissed(relayed) = outbound_rx.try_recv().unwrap();
    peer.session.handle_push(PushMessage::PopupDismissed(relayed)).await;
    assert_eq!(
        peer.popups(),
        vec![PopupEvent::Dismissed {
            match_id: 600,
            action: DismissAction::Continue,
            remote: true
        }]
    );
    assert!(peer
        .session
        .notifier()
        .tracker()
        .state(600)
        .await
        .unwrap()
        .is_dismissed());
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

async fn wait_for(
    events: &mut broadcast::Receiver<SessionEvent>,
    wanted: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.unwrap();
            if wanted(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event never published")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dismissal_in_another_process_closes_popup_through_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FilePopupStore::new(dir.path()));
    let h = HarnessBuilder::new().popup_store(store.clone()).build();
    let cancel = CancellationToken::new();
    let watcher = spawn_store_watcher(
        store,
        ME,
        h.session.notifier().tracker().change_feed(),
        cancel.clone(),
    )
    .unwrap();

    let mut events = h.session.subscribe();
    let (_command_tx, command_rx) = mpsc::unbounded_channel();
    let (push_tx, push_rx) = mpsc::unbounded_channel();
    let session = tokio::spawn(h.session.run(command_rx, push_rx, cancel.clone()));

    push_tx
        .send(PushMessage::MatchCreated(
            MatchDelivery::new(match_with(700, ME, 71)).with_profile(profile(71)),
        ))
        .unwrap();
    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::Popup(PopupEvent::Displayed { .. }))
    })
    .await;

    // Another process: its own store instance and no sync channel at all.
    let elsewhere = PopupTracker::new(ME, Arc::new(FilePopupStore::new(dir.path())));
    assert!(elsewhere
        .mark_dismissed(700, DismissAction::Continue)
        .await
        .unwrap());

    let closed = wait_for(&mut events, |e| {
        matches!(e, SessionEvent::Popup(PopupEvent::Dismissed { .. }))
    })
    .await;
    assert_eq!(
        closed,
        SessionEvent::Popup(PopupEvent::Dismissed {
            match_id: 700,
            action: DismissAction::Continue,
            remote: true
        })
    );

    cancel.cancel();
    session.await.unwrap();
    watcher.await.unwrap();
}

#[tokio::test]
async fn run_loop_applies_commands_and_stops_on_cancel() {
    let h = HarnessBuilder::new().seed([5, 6]).build();
    let ledger = Arc::clone(&h.ledger);
    let mut events = h.session.subscribe();

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (_push_tx, push_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(h.session.run(command_rx, push_rx, cancel.clone()));

    command_tx
        .send(SessionCommand::SwipeCurrent(SwipeAction::Like))
        .unwrap();
    ledger.release(5, ok(1)).await;

    let mut saw_swipe = false;
    while let Ok(event) = events.recv().await {
        if let SessionEvent::QueueChanged {
            current: Some(current),
            can_undo: true,
            ..
        } = event
        {
            assert_eq!(current.user_id, 6);
            saw_swipe = true;
            break;
        }
    }
    assert!(saw_swipe);

    cancel.cancel();
    assert!(handle.await.is_ok());
}
