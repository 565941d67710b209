//! Segmented marking worklists.
//!
//! A [`Worklist`] is a pool of fixed-capacity segments shared by all tasks;
//! a [`View`] is one worker's private window onto it. Pushes go to the
//! view's local segment and only full (or flushed) segments move to the
//! global pool, so the contended path transfers whole segments, never
//! single items. Cross-worker ordering is unspecified; only conservation of
//! items matters.

use crossbeam::queue::SegQueue;
use static_assertions::const_assert;
use std::mem;

/// Items per segment.
pub const SEGMENT_CAPACITY: usize = 64;

const_assert!(SEGMENT_CAPACITY > 0);

/// A multi-producer/multi-consumer pool of segments. The queue itself is
/// lock-free; a segment is exclusively owned either by the pool or by one
/// view at any time.
pub struct Worklist<T> {
    pool: SegQueue<Vec<T>>,
}

impl<T> Worklist<T> {
    pub fn new() -> Worklist<T> {
        Worklist {
            pool: SegQueue::new(),
        }
    }

    /// Open a worker-local view.
    pub fn view(&self) -> View<'_, T> {
        View {
            worklist: self,
            local: Vec::with_capacity(SEGMENT_CAPACITY),
        }
    }

    /// Best-effort emptiness probe of the global pool. Racy: a false answer
    /// may be stale by the time the caller acts on it. Scheduling heuristic
    /// only, never a correctness gate.
    pub fn approx_is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    /// Take every item currently in the global pool. Foreground-side
    /// consumption of the deferred lists; racing views keep their local
    /// segments.
    pub fn drain_global(&self) -> Vec<T> {
        let mut items = Vec::new();
        while let Some(mut segment) = self.pool.pop() {
            items.append(&mut segment);
        }
        items
    }
}

impl<T> Default for Worklist<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// One worker's private window onto a [`Worklist`]. Holds at most one local
/// segment; dropping the view flushes it, so items are never lost.
pub struct View<'a, T> {
    worklist: &'a Worklist<T>,
    local: Vec<T>,
}

impl<'a, T> View<'a, T> {
    /// Append an item. Always succeeds; a full local segment is sealed into
    /// the global pool and a fresh one opened.
    pub fn push(&mut self, item: T) {
        if self.local.len() == SEGMENT_CAPACITY {
            self.seal();
        }
        self.local.push(item);
    }

    /// Take an item, draining the local segment before pulling a whole
    /// segment from the global pool. `None` only when both are exhausted.
    pub fn pop(&mut self) -> Option<T> {
        if let Some(item) = self.local.pop() {
            return Some(item);
        }
        self.local = self.worklist.pool.pop()?;
        self.local.pop()
    }

    /// Move any remaining local items into the global pool, transferring
    /// their ownership to whoever pops the segment next.
    pub fn flush_to_global(&mut self) {
        if !self.local.is_empty() {
            self.seal();
        }
    }

    fn seal(&mut self) {
        let segment = mem::replace(&mut self.local, Vec::with_capacity(SEGMENT_CAPACITY));
        self.worklist.pool.push(segment);
    }
}

impl<'a, T> Drop for View<'a, T> {
    fn drop(&mut self) {
        self.flush_to_global();
    }
}
