//! The remembered-set collaborator.
//!
//! Marking reports every discovered reference edge so a later relocation
//! pass knows which slots to update. The calls are fire-and-forget and
//! arrive concurrently from every marking task; an implementation must be
//! internally safe and must never fail.

use crate::util::{ObjectIndex, SlotIndex};
use std::sync::Mutex;

/// A recorded reference edge: `host`'s slot `slot` points at `value`.
pub type RecordedSlot = (ObjectIndex, SlotIndex, ObjectIndex);

/// Receives (host, slot, value) edges during marking. One edge is reported
/// per occurrence: an object reachable from several hosts produces one
/// record per referring slot.
pub trait RememberedSet: Send + Sync {
    fn record_slot(&self, host: ObjectIndex, slot: SlotIndex, value: ObjectIndex);
}

/// Buffers recorded edges for the relocation pass that runs after marking.
pub struct BufferedRememberedSet {
    slots: Mutex<Vec<RecordedSlot>>,
}

impl BufferedRememberedSet {
    pub fn new() -> BufferedRememberedSet {
        BufferedRememberedSet {
            slots: Mutex::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hand the recorded edges to the consumer, leaving the buffer empty.
    pub fn take(&self) -> Vec<RecordedSlot> {
        std::mem::take(&mut self.slots.lock().unwrap())
    }
}

impl Default for BufferedRememberedSet {
    fn default() -> Self {
        Self::new()
    }
}

impl RememberedSet for BufferedRememberedSet {
    fn record_slot(&self, host: ObjectIndex, slot: SlotIndex, value: ObjectIndex) {
        self.slots.lock().unwrap().push((host, slot, value));
    }
}

/// Drops every edge. For configurations that never move objects.
pub struct DiscardingRememberedSet;

impl RememberedSet for DiscardingRememberedSet {
    fn record_slot(&self, _host: ObjectIndex, _slot: SlotIndex, _value: ObjectIndex) {}
}
