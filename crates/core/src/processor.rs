//! Optimistic swipe/undo state machine.
//!
//! [`SwipeProcessor`] owns the [`DiscoveryQueue`] and [`UndoStack`] and keeps
//! a table of swipes whose durable write has not completed yet. It performs
//! no I/O: every network effect is returned as a request value
//! ([`RecordRequest`], [`InvalidateRequest`], [`RefillRequest`]) for the
//! runtime to execute, and the results are fed back through the `on_*`
//! methods.
//!
//! Rollback policy:
//!
//! - A failed swipe write is rolled back exactly: the profile returns to its
//!   original slot and its undo entry is removed, wherever it sits.
//! - A failed undo invalidation is *not* rolled back. The profile stays
//!   visible and the invalidation is queued for repair before the next
//!   refill.
//!
//! Undo order follows gesture order, never acknowledgement order. An undo of
//! a swipe whose write is still in flight defers its compensating
//! invalidation until the write completes.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::candidate::CandidateProfile;
use crate::discovery::{DiscoveryQueue, RemovedEntry, Slot};
use crate::error::CoreError;
use crate::matching::MatchEvent;
use crate::swipe::{SwipeAction, SwipeRecord};
use crate::types::{DbId, SwipeKey};
use crate::undo::{UndoStack, UndoStackEntry};

// ---------------------------------------------------------------------------
// Requests and results
// ---------------------------------------------------------------------------

/// Durably record a swipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRequest {
    pub swipe_key: SwipeKey,
    pub target_user_id: DbId,
    pub action: SwipeAction,
}

/// Durably invalidate a previously recorded (or still in-flight) swipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidateRequest {
    pub swipe_key: SwipeKey,
    pub target_user_id: DbId,
    pub action: SwipeAction,
}

impl From<&SwipeRecord> for RecordRequest {
    fn from(record: &SwipeRecord) -> Self {
        Self {
            swipe_key: record.swipe_key,
            target_user_id: record.target_user_id,
            action: record.action,
        }
    }
}

impl From<&SwipeRecord> for InvalidateRequest {
    fn from(record: &SwipeRecord) -> Self {
        Self {
            swipe_key: record.swipe_key,
            target_user_id: record.target_user_id,
            action: record.action,
        }
    }
}

/// Fetch more candidates, excluding everything the client already holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefillRequest {
    pub exclude: Vec<DbId>,
}

/// Server acknowledgement of a recorded swipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwipeAck {
    pub id: DbId,
    /// Set when this swipe completed a mutual like.
    #[serde(rename = "match", default)]
    pub matched: Option<MatchEvent>,
}

/// What the runtime should do after a record request completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The swipe is durable; check `matched` for a mutual like.
    Confirmed {
        record: SwipeRecord,
        matched: Option<MatchEvent>,
    },
    /// The swipe became durable after the user already undid it; the
    /// compensating invalidation must be sent now.
    ConfirmedAfterUndo(InvalidateRequest),
    /// The write failed and the gesture was rolled back.
    RolledBack {
        target_user_id: DbId,
        reason: String,
        /// `false` if the profile was already back in the queue.
        restored: bool,
    },
    /// Late or duplicate completion with nothing left to reconcile.
    Ignored,
}

/// Result of a local undo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoResult {
    pub entry: UndoStackEntry,
    /// Invalidation to send now; `None` when the original write is still in
    /// flight and the invalidation is deferred.
    pub invalidate: Option<InvalidateRequest>,
}

impl UndoResult {
    pub fn restored(&self) -> &CandidateProfile {
        &self.entry.record.source_snapshot
    }
}

// ---------------------------------------------------------------------------
// SwipeProcessor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct PendingSwipe {
    record: SwipeRecord,
    slot: Slot,
    undone: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SwipeProcessor {
    queue: DiscoveryQueue,
    undo: UndoStack,
    pending: HashMap<SwipeKey, PendingSwipe>,
    repairs: Vec<InvalidateRequest>,
}

impl SwipeProcessor {
    pub fn new(queue: DiscoveryQueue, undo: UndoStack) -> Self {
        Self {
            queue,
            undo,
            pending: HashMap::new(),
            repairs: Vec::new(),
        }
    }

    pub fn queue(&self) -> &DiscoveryQueue {
        &self.queue
    }

    pub fn undo_stack(&self) -> &UndoStack {
        &self.undo
    }

    pub fn current(&self) -> Option<&CandidateProfile> {
        self.queue.current()
    }

    /// Number of swipes whose durable write has not completed.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    // ---- swipe ----

    /// Apply a swipe optimistically and return the write to send.
    pub fn swipe(
        &mut self,
        target_user_id: DbId,
        action: SwipeAction,
    ) -> Result<RecordRequest, CoreError> {
        let removed = self
            .queue
            .remove(target_user_id)
            .ok_or(CoreError::NotFound {
                entity: "CandidateProfile",
                id: target_user_id,
            })?;

        let record = SwipeRecord::new(removed.profile, action);
        let request = RecordRequest::from(&record);

        self.pending.insert(
            record.swipe_key,
            PendingSwipe {
                record: record.clone(),
                slot: removed.slot,
                undone: false,
            },
        );
        // Eviction only forgets the undo affordance; the pending entry still
        // carries what a rollback needs.
        self.undo.push(UndoStackEntry::new(record, removed.slot));

        Ok(request)
    }

    /// Swipe on whichever profile is currently rendered.
    pub fn swipe_current(&mut self, action: SwipeAction) -> Result<RecordRequest, CoreError> {
        let target = self
            .queue
            .current()
            .map(|p| p.user_id)
            .ok_or_else(|| CoreError::Validation("discovery queue is empty".to_string()))?;
        self.swipe(target, action)
    }

    /// Reconcile the result of a record request.
    pub fn on_record_result(
        &mut self,
        swipe_key: SwipeKey,
        result: Result<SwipeAck, String>,
    ) -> RecordOutcome {
        let Some(pending) = self.pending.remove(&swipe_key) else {
            return RecordOutcome::Ignored;
        };

        match result {
            Ok(ack) => {
                if pending.undone {
                    return RecordOutcome::ConfirmedAfterUndo(InvalidateRequest::from(
                        &pending.record,
                    ));
                }
                if let Some(entry) = self.undo.get_mut(swipe_key) {
                    entry.record.id = Some(ack.id);
                }
                let mut record = pending.record;
                record.id = Some(ack.id);
                RecordOutcome::Confirmed {
                    record,
                    matched: ack.matched,
                }
            }
            Err(reason) => {
                if pending.undone {
                    // Already restored by the undo; nothing was persisted.
                    return RecordOutcome::Ignored;
                }
                self.undo.remove(swipe_key);
                let target_user_id = pending.record.target_user_id;
                let restored = self.queue.restore(
                    RemovedEntry {
                        slot: pending.slot,
                        profile: pending.record.source_snapshot,
                    },
                    false,
                );
                RecordOutcome::RolledBack {
                    target_user_id,
                    reason,
                    restored,
                }
            }
        }
    }

    // ---- undo ----

    /// Undo the most recent swipe, restoring its profile at the front.
    pub fn undo(&mut self) -> Option<UndoResult> {
        let entry = self.undo.pop()?;
        self.queue.restore(
            RemovedEntry {
                slot: entry.slot,
                profile: entry.record.source_snapshot.clone(),
            },
            true,
        );

        let invalidate = match self.pending.get_mut(&entry.record.swipe_key) {
            Some(pending) => {
                pending.undone = true;
                None
            }
            None => Some(InvalidateRequest::from(&entry.record)),
        };

        Some(UndoResult { entry, invalidate })
    }

    /// Record the result of an invalidation. Failures are queued for repair
    /// and the local restoration stands. Returns `true` if a repair was
    /// queued.
    pub fn on_invalidate_result(
        &mut self,
        request: InvalidateRequest,
        result: Result<(), String>,
    ) -> bool {
        if result.is_ok() {
            self.repairs.retain(|r| r.swipe_key != request.swipe_key);
            return false;
        }
        if !self.repairs.iter().any(|r| r.swipe_key == request.swipe_key) {
            self.repairs.push(request);
        }
        true
    }

    /// Drain invalidations that previously failed.
    pub fn take_repairs(&mut self) -> Vec<InvalidateRequest> {
        std::mem::take(&mut self.repairs)
    }

    pub fn repair_count(&self) -> usize {
        self.repairs.len()
    }

    // ---- refill ----

    /// Start a refill if the queue is below its low-water mark.
    pub fn refill_request(&mut self) -> Option<RefillRequest> {
        if !self.queue.needs_refill() || !self.queue.begin_refill() {
            return None;
        }
        let mut exclude: BTreeSet<DbId> = self.queue.user_ids().into_iter().collect();
        exclude.extend(self.pending.values().map(|p| p.record.target_user_id));
        exclude.extend(self.undo.iter().map(|e| e.record.target_user_id));
        Some(RefillRequest {
            exclude: exclude.into_iter().collect(),
        })
    }

    /// Apply a refill result. Returns the number of profiles appended.
    pub fn on_refill_result(&mut self, result: Result<Vec<CandidateProfile>, String>) -> usize {
        match result {
            Ok(profiles) => {
                let fresh: Vec<_> = profiles
                    .into_iter()
                    .filter(|p| !self.is_swiped(p.user_id))
                    .collect();
                self.queue.finish_refill(fresh)
            }
            Err(_) => {
                self.queue.abort_refill();
                0
            }
        }
    }

    /// Allow refills again after the store reported exhaustion.
    pub fn reset_exhausted(&mut self) {
        self.queue.reset_exhausted();
    }

    /// Load an initial batch without going through the refill bookkeeping.
    pub fn seed(&mut self, profiles: Vec<CandidateProfile>) -> usize {
        self.queue.extend(profiles)
    }

    fn is_swiped(&self, user_id: DbId) -> bool {
        self.pending
            .values()
            .any(|p| !p.undone && p.record.target_user_id == user_id)
            || self.undo.contains_target(user_id)
    }
}
