//! Client-resident discovery queue.
//!
//! [`DiscoveryQueue`] holds the window of candidate profiles currently
//! fetched for the local user. Every mutation is synchronous and purely
//! in-memory; refills are requested by the caller when
//! [`needs_refill`](DiscoveryQueue::needs_refill) reports the low-water mark
//! has been crossed.
//!
//! Profiles are keyed by a monotonically increasing `slot` assigned at fetch
//! time. Positions exposed through [`entries`](DiscoveryQueue::entries) are
//! derived from slot order, so they are always contiguous from 0 and a
//! profile restored to its original slot lands exactly where it was.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::candidate::CandidateProfile;
use crate::types::DbId;

/// Default number of remaining profiles below which a refill is requested.
pub const DEFAULT_LOW_WATER_MARK: usize = 5;

/// Ordering key of a profile within the queue.
pub type Slot = i64;

/// A profile plus its current position in the held window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueEntry {
    pub profile: CandidateProfile,
    pub position: usize,
}

/// A profile taken out of the queue, remembering where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedEntry {
    pub slot: Slot,
    pub profile: CandidateProfile,
}

/// Coarse status for the "no more candidates" UI state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Ready,
    Refilling,
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct DiscoveryQueue {
    entries: BTreeMap<Slot, CandidateProfile>,
    slots: HashMap<DbId, Slot>,
    next_slot: Slot,
    /// Slots handed out by front restores; strictly decreasing and always
    /// negative, so they never collide with fetch slots or with each other.
    next_front_slot: Slot,
    low_water_mark: usize,
    refill_in_flight: bool,
    exhausted: bool,
}

impl DiscoveryQueue {
    pub fn new(low_water_mark: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            slots: HashMap::new(),
            next_slot: 0,
            next_front_slot: 0,
            low_water_mark,
            refill_in_flight: false,
            exhausted: false,
        }
    }

    /// The profile currently rendered, if any.
    pub fn current(&self) -> Option<&CandidateProfile> {
        self.entries.values().next()
    }

    /// Snapshot of the held window with contiguous positions.
    pub fn entries(&self) -> Vec<QueueEntry> {
        self.entries
            .values()
            .enumerate()
            .map(|(position, profile)| QueueEntry {
                profile: profile.clone(),
                position,
            })
            .collect()
    }

    /// User ids in queue order.
    pub fn user_ids(&self) -> Vec<DbId> {
        self.entries.values().map(|p| p.user_id).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, user_id: DbId) -> bool {
        self.slots.contains_key(&user_id)
    }

    /// Cached copy of a queued profile.
    pub fn get(&self, user_id: DbId) -> Option<&CandidateProfile> {
        self.slots
            .get(&user_id)
            .and_then(|slot| self.entries.get(slot))
    }

    /// Skip the current profile without recording a swipe.
    pub fn advance(&mut self) -> Option<RemovedEntry> {
        let (slot, profile) = self.entries.pop_first()?;
        self.slots.remove(&profile.user_id);
        Some(RemovedEntry { slot, profile })
    }

    /// Take a specific profile out of the queue.
    pub fn remove(&mut self, user_id: DbId) -> Option<RemovedEntry> {
        let slot = self.slots.remove(&user_id)?;
        let profile = self.entries.remove(&slot)?;
        Some(RemovedEntry { slot, profile })
    }

    /// Put a previously removed profile back.
    ///
    /// With `at_front` the profile becomes the current one; otherwise it
    /// returns to its original slot. Returns `false` (and changes nothing)
    /// if the profile is already queued.
    ///
    /// Restoring never consults the Candidate Store: a profile that would
    /// now be filtered out is still restored for this session.
    pub fn restore(&mut self, removed: RemovedEntry, at_front: bool) -> bool {
        if self.contains(removed.profile.user_id) {
            return false;
        }
        let slot = if at_front {
            match self.entries.keys().next() {
                Some(&head) if head <= removed.slot => {
                    let slot = head.min(self.next_front_slot) - 1;
                    self.next_front_slot = slot;
                    slot
                }
                _ => removed.slot,
            }
        } else {
            removed.slot
        };
        self.slots.insert(removed.profile.user_id, slot);
        self.entries.insert(slot, removed.profile);
        true
    }

    /// Append freshly fetched profiles, skipping any already queued.
    ///
    /// Returns the number of profiles actually appended.
    pub fn extend(&mut self, profiles: impl IntoIterator<Item = CandidateProfile>) -> usize {
        let mut appended = 0;
        for profile in profiles {
            if self.contains(profile.user_id) {
                continue;
            }
            let slot = self.next_slot;
            self.next_slot += 1;
            self.slots.insert(profile.user_id, slot);
            self.entries.insert(slot, profile);
            appended += 1;
        }
        appended
    }

    // ---- refill bookkeeping ----

    /// Whether the caller should start a refill now.
    pub fn needs_refill(&self) -> bool {
        !self.refill_in_flight && !self.exhausted && self.entries.len() < self.low_water_mark
    }

    /// Mark a refill as started. Returns `false` if one is already running.
    pub fn begin_refill(&mut self) -> bool {
        if self.refill_in_flight {
            return false;
        }
        self.refill_in_flight = true;
        true
    }

    /// Complete a refill with the profiles the store returned.
    ///
    /// An empty batch marks the queue as exhausted.
    pub fn finish_refill(&mut self, profiles: Vec<CandidateProfile>) -> usize {
        self.refill_in_flight = false;
        let appended = self.extend(profiles);
        self.exhausted = appended == 0;
        appended
    }

    /// Abandon a failed refill so the next check can retry.
    pub fn abort_refill(&mut self) {
        self.refill_in_flight = false;
    }

    /// Allow refills again after the store reported no more candidates.
    pub fn reset_exhausted(&mut self) {
        self.exhausted = false;
    }

    pub fn status(&self) -> QueueStatus {
        if self.refill_in_flight {
            QueueStatus::Refilling
        } else if self.exhausted && self.entries.is_empty() {
            QueueStatus::Exhausted
        } else {
            QueueStatus::Ready
        }
    }
}

impl Default for DiscoveryQueue {
    fn default() -> Self {
        Self::new(DEFAULT_LOW_WATER_MARK)
    }
}
