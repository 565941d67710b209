//! Consistent per-object slot snapshots.
//!
//! A record object's fields may be overwritten by the mutator between the
//! moment a marker decides to scan it and the moment each field is read. A
//! [`SlotSnapshot`] reads every slot once, atomically, *before* the color
//! transition; a successful transition then scans the snapshot and never
//! re-reads live fields.

use crate::util::constants::MAX_OBJECT_SLOTS;
use crate::util::{SlotIndex, Value};
use static_assertions::const_assert;

/// Snapshot capacity: every field slot plus the descriptor slot. Instance
/// sizes are bounded by `MAX_OBJECT_SLOTS`, so exceeding this is a contract
/// violation, not a recoverable condition.
pub const MAX_SNAPSHOT_SLOTS: usize = MAX_OBJECT_SLOTS + 1;

const_assert!(MAX_SNAPSHOT_SLOTS > MAX_OBJECT_SLOTS);

/// A bounded buffer of (slot, value) pairs. One per visitor instance,
/// cleared and refilled for each visited object; never outlives a single
/// visit call.
pub struct SlotSnapshot {
    entries: Vec<(SlotIndex, Value)>,
}

impl SlotSnapshot {
    pub fn new() -> SlotSnapshot {
        SlotSnapshot {
            entries: Vec::with_capacity(MAX_SNAPSHOT_SLOTS),
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn add(&mut self, slot: SlotIndex, value: Value) {
        assert!(
            self.entries.len() < MAX_SNAPSHOT_SLOTS,
            "slot snapshot overflow: object exceeds {} slots",
            MAX_SNAPSHOT_SLOTS
        );
        self.entries.push((slot, value));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, i: usize) -> (SlotIndex, Value) {
        self.entries[i]
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotIndex, Value)> + '_ {
        self.entries.iter().copied()
    }
}

impl Default for SlotSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holds_the_largest_instance() {
        let mut snapshot = SlotSnapshot::new();
        for slot in 0..MAX_SNAPSHOT_SLOTS {
            snapshot.add(slot, Value::NONE);
        }
        assert_eq!(snapshot.len(), MAX_SNAPSHOT_SLOTS);

        snapshot.clear();
        assert!(snapshot.is_empty());
        snapshot.add(0, Value::NONE);
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    #[should_panic(expected = "slot snapshot overflow")]
    fn one_slot_too_many_is_a_contract_violation() {
        let mut snapshot = SlotSnapshot::new();
        for slot in 0..=MAX_SNAPSHOT_SLOTS {
            snapshot.add(slot, Value::NONE);
        }
    }
}
