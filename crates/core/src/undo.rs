//! Bounded LIFO history of applied swipes.
//!
//! Only the most recent entry may be undone. When the stack is full the
//! oldest entry is evicted silently; eviction is never an error.

use std::collections::VecDeque;

use crate::discovery::Slot;
use crate::swipe::{SwipeDirection, SwipeRecord};
use crate::types::{DbId, SwipeKey};

/// Default number of swipes that can be undone.
pub const DEFAULT_UNDO_DEPTH: usize = 10;

/// One undoable swipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoStackEntry {
    pub record: SwipeRecord,
    /// Restore animation hint.
    pub direction: SwipeDirection,
    /// Queue slot the profile occupied before the swipe.
    pub slot: Slot,
}

impl UndoStackEntry {
    pub fn new(record: SwipeRecord, slot: Slot) -> Self {
        Self {
            direction: record.action.direction(),
            record,
            slot,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UndoStack {
    entries: VecDeque<UndoStackEntry>,
    capacity: usize,
}

impl UndoStack {
    /// Create a stack holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a new entry, returning the evicted oldest entry if the stack
    /// was full.
    pub fn push(&mut self, entry: UndoStackEntry) -> Option<UndoStackEntry> {
        let evicted = if self.entries.len() == self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(entry);
        evicted
    }

    pub fn pop(&mut self) -> Option<UndoStackEntry> {
        self.entries.pop_back()
    }

    pub fn peek(&self) -> Option<&UndoStackEntry> {
        self.entries.back()
    }

    /// Remove a specific entry regardless of its depth.
    ///
    /// Used when a swipe's durable write fails after later gestures have
    /// already been pushed above it.
    pub fn remove(&mut self, key: SwipeKey) -> Option<UndoStackEntry> {
        let index = self
            .entries
            .iter()
            .position(|e| e.record.swipe_key == key)?;
        self.entries.remove(index)
    }

    pub fn get_mut(&mut self, key: SwipeKey) -> Option<&mut UndoStackEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.record.swipe_key == key)
    }

    pub fn contains_target(&self, user_id: DbId) -> bool {
        self.entries
            .iter()
            .any(|e| e.record.target_user_id == user_id)
    }

    /// Entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &UndoStackEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new(DEFAULT_UNDO_DEPTH)
    }
}
