//! The concurrent marking subsystem.
//!
//! A [`ConcurrentMarking`] instance owns the shared, bailout and weak-cell
//! worklists, the color side table and the per-task interrupt blocks. Roots
//! are pushed in from outside; background tasks drain the shared worklist
//! through [`MarkingVisitor`]s until empty; the foreground thread can halt
//! all tasks with a [`PauseScope`] before it moves objects, and collects
//! the deferred lists once [`ConcurrentMarking::ensure_completed`] returns.
//!
//! Marking is a monotone fixed point (color only advances), so no ordering
//! among tasks is required for correctness; the color compare-exchange is
//! the one synchronization point that decides who scans an object.

pub mod snapshot;
pub mod state;
pub mod visitor;
pub mod worklist;

pub use self::state::{Color, MarkTable};

use self::visitor::MarkingVisitor;
use self::worklist::Worklist;
use crate::heap::{Heap, TaskExecutor, ThreadedExecutor};
use crate::remset::RememberedSet;
use crate::util::constants::{BYTES_IN_KBYTE, TASK_COUNT};
use crate::util::options::Options;
use crate::util::ObjectIndex;
use crossbeam::utils::CachePadded;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Instant;

/// Per-task pause rendezvous. Cache-padded: the flags are polled at batch
/// boundaries from different threads.
struct TaskInterrupt {
    /// While a marking task holds this lock, it may touch the heap. While
    /// the foreground thread holds it, the task is parked between batches.
    lock: Mutex<()>,
    /// Set by the foreground thread to make the task give up the lock at
    /// its next batch boundary.
    request: AtomicBool,
    /// The task waits here until the request flag is cleared.
    condition: Condvar,
}

impl TaskInterrupt {
    fn new() -> TaskInterrupt {
        TaskInterrupt {
            lock: Mutex::new(()),
            request: AtomicBool::new(false),
            condition: Condvar::new(),
        }
    }
}

struct Pending {
    is_pending: [bool; TASK_COUNT + 1],
    task_count: usize,
}

/// The coordinator. Owns all marking state for one heap; never a global.
pub struct ConcurrentMarking<R: RememberedSet> {
    heap: Arc<Heap>,
    options: Arc<Options>,
    executor: Box<dyn TaskExecutor>,
    remset: Arc<R>,
    color: MarkTable,
    shared: Worklist<ObjectIndex>,
    bailout: Worklist<ObjectIndex>,
    weak_cells: Worklist<ObjectIndex>,
    /// Index 0 belongs to the foreground thread and is never scheduled.
    interrupts: [CachePadded<TaskInterrupt>; TASK_COUNT + 1],
    pending: Mutex<Pending>,
    pending_condition: Condvar,
}

impl<R: RememberedSet + 'static> ConcurrentMarking<R> {
    pub fn new(heap: Arc<Heap>, remset: Arc<R>, options: Arc<Options>) -> Self {
        Self::with_executor(heap, remset, options, Box::new(ThreadedExecutor))
    }

    pub fn with_executor(
        heap: Arc<Heap>,
        remset: Arc<R>,
        options: Arc<Options>,
        executor: Box<dyn TaskExecutor>,
    ) -> Self {
        let color = MarkTable::new(heap.object_count());
        ConcurrentMarking {
            heap,
            options,
            executor,
            remset,
            color,
            shared: Worklist::new(),
            bailout: Worklist::new(),
            weak_cells: Worklist::new(),
            interrupts: std::array::from_fn(|_| CachePadded::new(TaskInterrupt::new())),
            pending: Mutex::new(Pending {
                is_pending: [false; TASK_COUNT + 1],
                task_count: 0,
            }),
            pending_condition: Condvar::new(),
        }
    }

    pub fn mark_table(&self) -> &MarkTable {
        &self.color
    }

    /// Color each root grey and publish it on the shared worklist. Runs on
    /// the foreground thread; an already-discovered root is skipped, so
    /// re-pushing a root set is harmless.
    pub fn push_grey_roots(&self, roots: impl IntoIterator<Item = ObjectIndex>) {
        let mut view = self.shared.view();
        for root in roots {
            if self.color.white_to_grey(root) {
                view.push(root);
            }
        }
        view.flush_to_global();
    }

    /// Foreground-side consumption of the bailout list. Call after
    /// [`ConcurrentMarking::ensure_completed`].
    pub fn drain_bailout(&self) -> Vec<ObjectIndex> {
        self.bailout.drain_global()
    }

    /// Foreground-side consumption of the weak-cell list, for the fix-point
    /// pass. Call after [`ConcurrentMarking::ensure_completed`].
    pub fn drain_weak_cells(&self) -> Vec<ObjectIndex> {
        self.weak_cells.drain_global()
    }

    /// Submit the marking task body for every currently idle task id to the
    /// background execution facility. No-op when concurrent marking is
    /// disabled.
    pub fn schedule_tasks(self: &Arc<Self>) {
        if !self.options.concurrent_marking {
            return;
        }
        let mut pending = self.pending.lock().unwrap();
        if pending.task_count < TASK_COUNT {
            // Task id 0 is for the foreground thread.
            for task_id in 1..=TASK_COUNT {
                if !pending.is_pending[task_id] {
                    trace!("Scheduling concurrent marking task {}", task_id);
                    self.interrupts[task_id].request.store(false, Ordering::SeqCst);
                    pending.is_pending[task_id] = true;
                    pending.task_count += 1;
                    let this = Arc::clone(self);
                    self.executor
                        .spawn_task(Box::new(move || this.run(task_id)));
                }
            }
        }
    }

    /// Revive marking after transient starvation: all tasks may have drained
    /// and exited while new work arrived (e.g. a young-generation collection
    /// repopulated the roots).
    pub fn reschedule_tasks_if_needed(self: &Arc<Self>) {
        if !self.options.concurrent_marking {
            return;
        }
        {
            let pending = self.pending.lock().unwrap();
            if pending.task_count > 0 {
                return;
            }
        }
        if !self.shared.approx_is_empty() {
            self.schedule_tasks();
        }
    }

    /// Block until no marking task is pending. Required before any phase
    /// that assumes marking has finished.
    pub fn ensure_completed(&self) {
        if !self.options.concurrent_marking {
            return;
        }
        let mut pending = self.pending.lock().unwrap();
        while pending.task_count > 0 {
            pending = self.pending_condition.wait(pending).unwrap();
        }
    }

    /// Halt every marking task for the lifetime of the returned scope.
    pub fn pause(&self) -> PauseScope<'_, R> {
        PauseScope::new(self)
    }

    fn run(&self, task_id: usize) {
        let interrupt = &self.interrupts[task_id];
        let mut visitor = MarkingVisitor::new(
            &self.heap,
            &self.color,
            &self.shared,
            &self.bailout,
            &self.weak_cells,
            &*self.remset,
        );
        if self.options.trace_concurrent_marking {
            debug!("Starting concurrent marking task {}", task_id);
        }
        let start = Instant::now();
        let mut total_bytes_marked = 0usize;
        let mut done = false;
        while !done {
            let mut guard = interrupt.lock.lock().unwrap();
            let mut bytes_marked = 0;
            let mut objects_processed = 0;
            while bytes_marked < self.options.bytes_per_batch
                && objects_processed < self.options.objects_per_batch
            {
                let Some(object) = visitor.pop() else {
                    done = true;
                    break;
                };
                objects_processed += 1;
                if self.heap.in_allocation_region(object) {
                    // May still be under construction; defer whole, never
                    // retry.
                    visitor.defer(object);
                } else {
                    let descriptor = self.heap.synchronized_descriptor(object);
                    bytes_marked += visitor.visit(descriptor, object);
                }
            }
            total_bytes_marked += bytes_marked;
            if interrupt.request.load(Ordering::SeqCst) {
                guard = interrupt.condition.wait(guard).unwrap();
            }
            drop(guard);
        }
        {
            // A pause entered while this task was draining must see the
            // bailout list settled before the foreground touches the heap.
            let _guard = interrupt.lock.lock().unwrap();
            visitor.flush_bailout();
        }
        visitor.flush_weak_cells();
        {
            let mut pending = self.pending.lock().unwrap();
            debug_assert!(pending.is_pending[task_id]);
            pending.is_pending[task_id] = false;
            pending.task_count -= 1;
            self.pending_condition.notify_all();
        }
        if self.options.trace_concurrent_marking {
            debug!(
                "Task {} concurrently marked {}KB in {}ms",
                task_id,
                total_bytes_marked / BYTES_IN_KBYTE,
                start.elapsed().as_millis()
            );
        }
    }
}

/// While a `PauseScope` is alive, no marking task executes inside the heap:
/// the foreground thread may safely mutate and move objects. Entering
/// blocks until every in-flight batch has finished; the pause request is
/// honored eventually (at batch boundaries), not instantly.
pub struct PauseScope<'a, R: RememberedSet> {
    marking: &'a ConcurrentMarking<R>,
    guards: Vec<MutexGuard<'a, ()>>,
}

impl<'a, R: RememberedSet> PauseScope<'a, R> {
    fn new(marking: &'a ConcurrentMarking<R>) -> PauseScope<'a, R> {
        let mut guards = Vec::new();
        if marking.options.concurrent_marking {
            // Plain stores: tasks only poll at batch boundaries.
            for task_id in 1..=TASK_COUNT {
                marking.interrupts[task_id]
                    .request
                    .store(true, Ordering::SeqCst);
            }
            // Ascending task-id order; the fixed order cannot deadlock.
            // Once every lock is held, all in-flight batches have finished.
            for task_id in 1..=TASK_COUNT {
                guards.push(marking.interrupts[task_id].lock.lock().unwrap());
            }
        }
        PauseScope { marking, guards }
    }
}

impl<'a, R: RememberedSet> Drop for PauseScope<'a, R> {
    fn drop(&mut self) {
        // Release in descending task-id order, the reverse of acquisition.
        while let Some(guard) = self.guards.pop() {
            let task_id = self.guards.len() + 1;
            let interrupt = &self.marking.interrupts[task_id];
            interrupt.request.store(false, Ordering::SeqCst);
            interrupt.condition.notify_all();
            drop(guard);
        }
    }
}
