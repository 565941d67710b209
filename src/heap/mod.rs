//! The object arena the markers traverse.
//!
//! The arena owns every object; the rest of the crate refers to objects by
//! [`ObjectIndex`]. Object fields are atomic words because the mutator keeps
//! running while marking tasks scan: markers use relaxed loads for field
//! values and acquire ("synchronized") loads for the descriptor and length
//! words, which may race with object initialization.

pub mod descriptor;

use self::descriptor::{DescriptorData, ObjectCategory};
use crate::util::constants::{BYTES_IN_WORD, HEADER_WORDS, MAX_OBJECT_SLOTS};
use crate::util::{ObjectIndex, Value};
use atomic::Atomic;
use std::ops::Range;
use std::sync::atomic::{AtomicU32, Ordering};

/// The index of the meta-descriptor: the descriptor that describes
/// descriptors, including itself. Every arena has it at index 0.
pub const META_DESCRIPTOR: ObjectIndex = ObjectIndex::from_index(0);

/// The field of a weak cell that holds its (weakly referenced) value.
pub const WEAK_CELL_VALUE_FIELD: usize = 0;

/// One heap object. Not constructed directly; use [`HeapBuilder`].
pub struct HeapObject {
    /// The type-descriptor word. May race with initialization, hence atomic
    /// with acquire reads.
    descriptor: Atomic<ObjectIndex>,
    /// Element count for array-like objects, 0 otherwise.
    length: AtomicU32,
    /// Field slots, in layout order.
    slots: Box<[Atomic<Value>]>,
    /// Present only on descriptor objects.
    descriptor_data: Option<DescriptorData>,
}

impl HeapObject {
    fn new(
        descriptor: ObjectIndex,
        length: u32,
        fields: Vec<Value>,
        descriptor_data: Option<DescriptorData>,
    ) -> HeapObject {
        HeapObject {
            descriptor: Atomic::new(descriptor),
            length: AtomicU32::new(length),
            slots: fields.into_iter().map(Atomic::new).collect(),
            descriptor_data,
        }
    }
}

/// The arena. Shared immutably between the mutator and all marking tasks;
/// all interior mutability is word-sized atomics.
pub struct Heap {
    objects: Box<[HeapObject]>,
    /// The active bump-pointer window of the young allocation region, as an
    /// index range. Objects inside it may still be under construction.
    allocation_top: AtomicU32,
    allocation_limit: AtomicU32,
}

impl Heap {
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    fn object(&self, object: ObjectIndex) -> &HeapObject {
        &self.objects[object.index()]
    }

    /// The descriptor word, with acquire ordering. This is the only
    /// legitimate way for a marker to learn an object's type: the word may
    /// race with initialization.
    pub fn synchronized_descriptor(&self, object: ObjectIndex) -> ObjectIndex {
        self.object(object).descriptor.load(Ordering::Acquire)
    }

    /// The length word, with acquire ordering. Fixes the scan boundary of an
    /// array-like object for the duration of one visit.
    pub fn synchronized_length(&self, object: ObjectIndex) -> usize {
        self.object(object).length.load(Ordering::Acquire) as usize
    }

    pub fn slot_count(&self, object: ObjectIndex) -> usize {
        self.object(object).slots.len()
    }

    /// Relaxed atomic read of field `field` (0-based over the fields, not
    /// counting the header words).
    pub fn load_field(&self, object: ObjectIndex, field: usize) -> Value {
        self.object(object).slots[field].load(Ordering::Relaxed)
    }

    /// Mutator-side field store. Relaxed: the marking protocol never depends
    /// on field-store ordering, only on word-sized non-tearing access.
    pub fn store_field(&self, object: ObjectIndex, field: usize, value: Value) {
        self.object(object).slots[field].store(value, Ordering::Relaxed);
    }

    fn descriptor_data(&self, descriptor: ObjectIndex) -> &DescriptorData {
        self.object(descriptor)
            .descriptor_data
            .as_ref()
            .expect("object used as a type descriptor carries no descriptor data")
    }

    /// The category a descriptor assigns to its instances.
    pub fn category_of(&self, descriptor: ObjectIndex) -> ObjectCategory {
        self.descriptor_data(descriptor).category
    }

    /// Byte size of a fixed-shape object (records, wrappers, weak cells,
    /// descriptors). Array sizes come from [`Heap::array_size_for`] with a
    /// synchronized length.
    pub fn size_of(&self, object: ObjectIndex) -> usize {
        (HEADER_WORDS + self.slot_count(object)) * BYTES_IN_WORD
    }

    /// Byte size of an array-like object of `length` elements.
    pub const fn array_size_for(length: usize) -> usize {
        (HEADER_WORDS + length) * BYTES_IN_WORD
    }

    /// Publish the active bump-pointer window. Racy by design: markers read
    /// it once per popped object and defer anything inside it.
    pub fn set_allocation_region(&self, region: Range<u32>) {
        self.allocation_top.store(region.start, Ordering::Relaxed);
        self.allocation_limit.store(region.end, Ordering::Relaxed);
    }

    pub fn in_allocation_region(&self, object: ObjectIndex) -> bool {
        let top = self.allocation_top.load(Ordering::Relaxed);
        let limit = self.allocation_limit.load(Ordering::Relaxed);
        top <= object.as_u32() && object.as_u32() < limit
    }
}

/// Builds an arena. Seeds the meta-descriptor at index 0; descriptors and
/// objects are appended in construction order, so an `ObjectIndex` handed
/// out by the builder stays valid in the built heap.
pub struct HeapBuilder {
    objects: Vec<HeapObject>,
}

impl HeapBuilder {
    pub fn new() -> HeapBuilder {
        // The meta-descriptor describes descriptors and is its own
        // descriptor.
        let meta = HeapObject::new(
            META_DESCRIPTOR,
            0,
            vec![],
            Some(DescriptorData::new(ObjectCategory::Descriptor)),
        );
        HeapBuilder {
            objects: vec![meta],
        }
    }

    fn push(&mut self, object: HeapObject) -> ObjectIndex {
        let index = ObjectIndex::from_index(self.objects.len() as u32);
        self.objects.push(object);
        index
    }

    fn check_descriptor(&self, descriptor: ObjectIndex) {
        debug_assert!(
            self.objects[descriptor.index()].descriptor_data.is_some(),
            "{} is not a descriptor",
            descriptor
        );
    }

    /// Add a descriptor whose instances have the given category.
    pub fn add_descriptor(&mut self, category: ObjectCategory) -> ObjectIndex {
        self.push(HeapObject::new(
            META_DESCRIPTOR,
            0,
            vec![],
            Some(DescriptorData::new(category)),
        ))
    }

    /// Add a fixed-shape object with the given fields.
    pub fn add_object(&mut self, descriptor: ObjectIndex, fields: Vec<Value>) -> ObjectIndex {
        self.check_descriptor(descriptor);
        assert!(
            fields.len() <= MAX_OBJECT_SLOTS,
            "an object may have at most {} fields",
            MAX_OBJECT_SLOTS
        );
        self.push(HeapObject::new(descriptor, 0, fields, None))
    }

    /// Add an array-like object; its length word is the element count.
    pub fn add_array(&mut self, descriptor: ObjectIndex, elements: Vec<Value>) -> ObjectIndex {
        self.check_descriptor(descriptor);
        debug_assert_eq!(
            self.objects[descriptor.index()]
                .descriptor_data
                .as_ref()
                .map(|data| data.category),
            Some(ObjectCategory::Array)
        );
        let length = elements.len() as u32;
        self.push(HeapObject::new(descriptor, length, elements, None))
    }

    /// Add a weak cell holding `value`. A non-reference value means the
    /// cell is cleared.
    pub fn add_weak_cell(&mut self, descriptor: ObjectIndex, value: Value) -> ObjectIndex {
        self.check_descriptor(descriptor);
        self.push(HeapObject::new(descriptor, 0, vec![value], None))
    }

    pub fn build(self) -> Heap {
        Heap {
            objects: self.objects.into_boxed_slice(),
            allocation_top: AtomicU32::new(0),
            allocation_limit: AtomicU32::new(0),
        }
    }
}

impl Default for HeapBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A facility that runs short background jobs, fire-and-forget. Completion
/// is observed through the coordinator's pending-task bookkeeping, not
/// through this trait.
pub trait TaskExecutor: Send + Sync {
    fn spawn_task(&self, job: Box<dyn FnOnce() + Send + 'static>);
}

/// Spawns a named, short-lived thread per submitted job.
pub struct ThreadedExecutor;

impl TaskExecutor for ThreadedExecutor {
    fn spawn_task(&self, job: Box<dyn FnOnce() + Send + 'static>) {
        std::thread::Builder::new()
            .name("trimark-worker".to_string())
            .spawn(job)
            .expect("failed to spawn a marking task thread");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_seeds_meta_descriptor() {
        let heap = HeapBuilder::new().build();
        assert_eq!(heap.object_count(), 1);
        assert_eq!(heap.synchronized_descriptor(META_DESCRIPTOR), META_DESCRIPTOR);
        assert_eq!(heap.category_of(META_DESCRIPTOR), ObjectCategory::Descriptor);
    }

    #[test]
    fn allocation_region_window() {
        let mut builder = HeapBuilder::new();
        let record = builder.add_descriptor(ObjectCategory::Record);
        let a = builder.add_object(record, vec![]);
        let b = builder.add_object(record, vec![]);
        let heap = builder.build();

        assert!(!heap.in_allocation_region(a));
        heap.set_allocation_region(b.as_u32()..b.as_u32() + 1);
        assert!(!heap.in_allocation_region(a));
        assert!(heap.in_allocation_region(b));
        heap.set_allocation_region(0..0);
        assert!(!heap.in_allocation_region(b));
    }

    #[test]
    fn sizes_count_header_words() {
        let mut builder = HeapBuilder::new();
        let record = builder.add_descriptor(ObjectCategory::Record);
        let object = builder.add_object(record, vec![Value::NONE; 3]);
        let heap = builder.build();
        assert_eq!(heap.size_of(object), (HEADER_WORDS + 3) * BYTES_IN_WORD);
        assert_eq!(Heap::array_size_for(5), (HEADER_WORDS + 5) * BYTES_IN_WORD);
    }
}
