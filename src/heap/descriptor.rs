//! Type descriptors and the closed object-category taxonomy.
//!
//! Every heap object points at a descriptor object, and the descriptor
//! decides how the object may be scanned while the mutator is running. The
//! category set is closed: marking dispatches with an exhaustive `match`,
//! so adding a category is a compile-time event, not a runtime one.

/// How an object may be scanned concurrently. The conservative rule: any
/// category whose concurrent safety is ambiguous defers to the foreground
/// thread instead of guessing.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ObjectCategory {
    /// Fixed-shape record. Scanned from a slot snapshot taken before the
    /// color transition, so a mutator racing on the fields cannot tear the
    /// scan.
    Record,
    /// Wraps references into non-heap memory. The fields scan normally, but
    /// the foreign-reference step must run on the foreground thread, so the
    /// object always also goes to the bailout list.
    ExternalWrapper,
    /// Variable-length array. The synchronized length word fixes the scan
    /// boundary before any element is read.
    Array,
    /// Executable code. Never scanned off the foreground thread.
    Code,
    /// A type descriptor. Never scanned off the foreground thread.
    Descriptor,
    /// A type-transition table. Never scanned off the foreground thread.
    TransitionTable,
    /// Scans like a record for reachability, but carries state only the
    /// foreground thread may touch (counters to reset), so it also goes to
    /// the bailout list.
    SideEffectful,
    /// A weak cell. Holds one value that does not keep its referent alive
    /// by itself; resolved here if the referent's liveness is already
    /// known, otherwise deferred to the weak-cell fix-point pass.
    WeakCell,
}

/// Layout data carried by descriptor objects, describing their instances.
pub struct DescriptorData {
    pub category: ObjectCategory,
}

impl DescriptorData {
    pub fn new(category: ObjectCategory) -> DescriptorData {
        DescriptorData { category }
    }
}
