//! Per-task marking visitor.
//!
//! Given a popped grey object and its type descriptor, the visitor decides
//! how (or whether) the object may be scanned while the mutator runs, and
//! returns the bytes scanned. A return of 0 means this call either lost the
//! color race or deferred the object to the foreground thread.

use crate::heap::descriptor::ObjectCategory;
use crate::heap::{Heap, WEAK_CELL_VALUE_FIELD};
use crate::marking::snapshot::SlotSnapshot;
use crate::marking::state::MarkTable;
use crate::marking::worklist::{View, Worklist};
use crate::remset::RememberedSet;
use crate::util::handle::DESCRIPTOR_SLOT;
use crate::util::{ObjectIndex, SlotIndex, Value};

pub struct MarkingVisitor<'a, R: RememberedSet> {
    heap: &'a Heap,
    color: &'a MarkTable,
    shared: View<'a, ObjectIndex>,
    bailout: View<'a, ObjectIndex>,
    weak_cells: View<'a, ObjectIndex>,
    remset: &'a R,
    snapshot: SlotSnapshot,
}

impl<'a, R: RememberedSet> MarkingVisitor<'a, R> {
    pub fn new(
        heap: &'a Heap,
        color: &'a MarkTable,
        shared: &'a Worklist<ObjectIndex>,
        bailout: &'a Worklist<ObjectIndex>,
        weak_cells: &'a Worklist<ObjectIndex>,
        remset: &'a R,
    ) -> Self {
        MarkingVisitor {
            heap,
            color,
            shared: shared.view(),
            bailout: bailout.view(),
            weak_cells: weak_cells.view(),
            remset,
            snapshot: SlotSnapshot::new(),
        }
    }

    /// Take the next grey object from this task's window onto the shared
    /// worklist.
    pub fn pop(&mut self) -> Option<ObjectIndex> {
        self.shared.pop()
    }

    /// Defer an object to the foreground thread without scanning it.
    pub fn defer(&mut self, object: ObjectIndex) {
        self.bailout.push(object);
    }

    pub fn flush_bailout(&mut self) {
        self.bailout.flush_to_global();
    }

    pub fn flush_weak_cells(&mut self) {
        self.weak_cells.flush_to_global();
    }

    /// Dispatch on the object's category. `descriptor` must come from a
    /// synchronized descriptor read.
    pub fn visit(&mut self, descriptor: ObjectIndex, object: ObjectIndex) -> usize {
        match self.heap.category_of(descriptor) {
            ObjectCategory::Record => self.visit_record(object),
            ObjectCategory::ExternalWrapper => self.visit_external_wrapper(object),
            ObjectCategory::Array => self.visit_array(object),
            ObjectCategory::Code
            | ObjectCategory::Descriptor
            | ObjectCategory::TransitionTable => {
                // Concurrent scanning of these is unsafe; the foreground
                // thread takes them whole.
                self.bailout.push(object);
                0
            }
            ObjectCategory::SideEffectful => self.visit_side_effectful(object),
            ObjectCategory::WeakCell => self.visit_weak_cell(object),
        }
    }

    /// Grey→Black gate. The caller that wins the exchange scans the object
    /// and bills its bytes; everyone else backs off.
    fn should_visit(&self, object: ObjectIndex) -> bool {
        self.color.grey_to_black(object)
    }

    fn mark_object(&mut self, object: ObjectIndex) {
        if self.color.white_to_grey(object) {
            self.shared.push(object);
        }
    }

    /// The pointer-visitation primitive: skip immediates, mark references,
    /// and report the edge. The edge is reported per occurrence, even when
    /// another marker won the color race, because every referring slot
    /// needs its own record.
    fn visit_pointer(&mut self, host: ObjectIndex, slot: SlotIndex, value: Value) {
        let Some(object) = value.as_object() else {
            return;
        };
        self.mark_object(object);
        self.remset.record_slot(host, slot, object);
    }

    fn visit_descriptor_pointer(&mut self, object: ObjectIndex) {
        let descriptor = self.heap.synchronized_descriptor(object);
        self.visit_pointer(object, DESCRIPTOR_SLOT, Value::from_object(descriptor));
    }

    /// Records are scanned from a snapshot taken *before* the color
    /// transition, so a mutator racing on the fields cannot tear the scan.
    fn visit_record(&mut self, object: ObjectIndex) -> usize {
        let size = self.heap.size_of(object);
        self.take_slot_snapshot(object);
        if !self.should_visit(object) {
            return 0;
        }
        self.visit_pointers_in_snapshot(object);
        size
    }

    fn take_slot_snapshot(&mut self, object: ObjectIndex) {
        self.snapshot.clear();
        let descriptor = self.heap.synchronized_descriptor(object);
        self.snapshot
            .add(DESCRIPTOR_SLOT, Value::from_object(descriptor));
        for field in 0..self.heap.slot_count(object) {
            self.snapshot
                .add(field + 1, self.heap.load_field(object, field));
        }
    }

    fn visit_pointers_in_snapshot(&mut self, host: ObjectIndex) {
        for i in 0..self.snapshot.len() {
            let (slot, value) = self.snapshot.get(i);
            self.visit_pointer(host, slot, value);
        }
    }

    /// Wrappers scan their fields normally but stay grey and always go to
    /// the bailout list: the foreign-reference step must run on the
    /// foreground thread.
    fn visit_external_wrapper(&mut self, object: ObjectIndex) -> usize {
        if self.color.is_grey(object) {
            self.visit_descriptor_pointer(object);
            self.visit_fields_live(object, self.heap.slot_count(object));
            self.bailout.push(object);
        }
        0
    }

    /// The synchronized length read fixes the scan boundary before any
    /// element access; elements published later belong to a later visit.
    fn visit_array(&mut self, object: ObjectIndex) -> usize {
        let length = self.heap.synchronized_length(object);
        let size = Heap::array_size_for(length);
        if !self.should_visit(object) {
            return 0;
        }
        self.visit_descriptor_pointer(object);
        self.visit_fields_live(object, length);
        size
    }

    /// Scanned for reachability like a wrapper, but deferred because its
    /// fix-up (counter resets) may only run on the foreground thread.
    fn visit_side_effectful(&mut self, object: ObjectIndex) -> usize {
        if self.color.is_grey(object) {
            self.visit_descriptor_pointer(object);
            self.visit_fields_live(object, self.heap.slot_count(object));
            self.bailout.push(object);
        }
        0
    }

    fn visit_weak_cell(&mut self, object: ObjectIndex) -> usize {
        if !self.should_visit(object) {
            return 0;
        }
        self.visit_descriptor_pointer(object);
        let value = self.heap.load_field(object, WEAK_CELL_VALUE_FIELD);
        if let Some(referent) = value.as_object() {
            if self.color.is_black_or_grey(referent) {
                // Liveness is already decided, so the cell resolves here as
                // an ordinary strong edge, off the fix-point pass.
                self.remset
                    .record_slot(object, WEAK_CELL_VALUE_FIELD + 1, referent);
            } else {
                // Undecided until the transitive closure is complete.
                self.weak_cells.push(object);
            }
        }
        self.heap.size_of(object)
    }

    fn visit_fields_live(&mut self, object: ObjectIndex, count: usize) {
        for field in 0..count {
            let value = self.heap.load_field(object, field);
            self.visit_pointer(object, field + 1, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::HeapBuilder;
    use crate::remset::BufferedRememberedSet;

    struct Fixture {
        heap: Heap,
        color: MarkTable,
        shared: Worklist<ObjectIndex>,
        bailout: Worklist<ObjectIndex>,
        weak_cells: Worklist<ObjectIndex>,
        remset: BufferedRememberedSet,
    }

    impl Fixture {
        fn new(heap: Heap) -> Fixture {
            let color = MarkTable::new(heap.object_count());
            Fixture {
                heap,
                color,
                shared: Worklist::new(),
                bailout: Worklist::new(),
                weak_cells: Worklist::new(),
                remset: BufferedRememberedSet::new(),
            }
        }

        fn visitor(&self) -> MarkingVisitor<'_, BufferedRememberedSet> {
            MarkingVisitor::new(
                &self.heap,
                &self.color,
                &self.shared,
                &self.bailout,
                &self.weak_cells,
                &self.remset,
            )
        }
    }

    #[test]
    fn record_scan_bills_bytes_once() {
        let mut builder = HeapBuilder::new();
        let record = builder.add_descriptor(ObjectCategory::Record);
        let target = builder.add_object(record, vec![]);
        let host = builder.add_object(record, vec![Value::from_object(target)]);
        let fixture = Fixture::new(builder.build());
        let mut visitor = fixture.visitor();

        assert!(fixture.color.white_to_grey(host));
        let size = visitor.visit(record, host);
        assert_eq!(size, fixture.heap.size_of(host));
        assert!(fixture.color.is_black(host));
        assert!(fixture.color.is_grey(target));
        // The descriptor edge and the field edge are both recorded.
        let slots = fixture.remset.take();
        assert!(slots.contains(&(host, DESCRIPTOR_SLOT, record)));
        assert!(slots.contains(&(host, 1, target)));

        // A second visit loses the race and bills nothing.
        assert_eq!(visitor.visit(record, host), 0);
    }

    #[test]
    fn record_scan_uses_the_snapshot_not_live_fields() {
        let mut builder = HeapBuilder::new();
        let record = builder.add_descriptor(ObjectCategory::Record);
        let old = builder.add_object(record, vec![]);
        let new = builder.add_object(record, vec![]);
        let host = builder.add_object(record, vec![Value::from_object(old)]);
        let fixture = Fixture::new(builder.build());
        let mut visitor = fixture.visitor();

        assert!(fixture.color.white_to_grey(host));
        visitor.take_slot_snapshot(host);
        // The mutator overwrites the field after the snapshot.
        fixture.heap.store_field(host, 0, Value::from_object(new));
        assert!(fixture.color.grey_to_black(host));
        visitor.visit_pointers_in_snapshot(host);

        assert!(fixture.color.is_grey(old));
        assert_eq!(fixture.color.color_of(new), crate::marking::Color::White);
    }

    #[test]
    fn deferred_categories_bail_out_whole() {
        let mut builder = HeapBuilder::new();
        let code = builder.add_descriptor(ObjectCategory::Code);
        let target = builder.add_object(code, vec![]);
        let fixture = Fixture::new(builder.build());
        let mut visitor = fixture.visitor();

        assert!(fixture.color.white_to_grey(target));
        assert_eq!(visitor.visit(code, target), 0);
        // Still grey: the foreground thread finishes it.
        assert!(fixture.color.is_grey(target));
        visitor.flush_bailout();
        assert_eq!(fixture.bailout.drain_global(), vec![target]);
        assert!(fixture.remset.is_empty());
    }

    #[test]
    fn array_scan_is_bounded_by_the_length_word() {
        let mut builder = HeapBuilder::new();
        let record = builder.add_descriptor(ObjectCategory::Record);
        let array = builder.add_descriptor(ObjectCategory::Array);
        let element = builder.add_object(record, vec![]);
        let host = builder.add_array(array, vec![Value::from_object(element); 4]);
        let fixture = Fixture::new(builder.build());
        let mut visitor = fixture.visitor();

        assert!(fixture.color.white_to_grey(host));
        assert_eq!(visitor.visit(array, host), Heap::array_size_for(4));
        assert!(fixture.color.is_black(host));
        assert!(fixture.color.is_grey(element));
    }

    #[test]
    fn wrapper_scans_fields_but_always_bails_out() {
        let mut builder = HeapBuilder::new();
        let record = builder.add_descriptor(ObjectCategory::Record);
        let wrapper = builder.add_descriptor(ObjectCategory::ExternalWrapper);
        let target = builder.add_object(record, vec![]);
        let host = builder.add_object(wrapper, vec![Value::from_object(target)]);
        let fixture = Fixture::new(builder.build());
        let mut visitor = fixture.visitor();

        assert!(fixture.color.white_to_grey(host));
        assert_eq!(visitor.visit(wrapper, host), 0);
        // The fields were scanned for reachability...
        assert!(fixture.color.is_grey(target));
        // ...but the wrapper stays grey and is deferred.
        assert!(fixture.color.is_grey(host));
        visitor.flush_bailout();
        assert_eq!(fixture.bailout.drain_global(), vec![host]);
    }
}
