//! Trimark is a concurrent tri-color marking engine for tracing garbage
//! collectors.
//!
//! While the application keeps running, a fixed pool of background tasks
//! traverses the live-object graph and colors every reachable object
//! White→Grey→Black. The crate decides, for each object reachable from a
//! root set, whether it has been fully visited; it records reference edges
//! for a later relocation pass and defers everything that cannot safely be
//! scanned off the foreground thread. It does not decide when to collect,
//! does not reclaim memory and does not define object layout; those belong
//! to the embedding collector.
//!
//! The entry point is [`marking::ConcurrentMarking`]: build a [`heap::Heap`]
//! arena, push grey roots, schedule tasks, and call `ensure_completed`
//! before any phase that assumes marking is finished. A
//! [`marking::PauseScope`] gives the foreground thread an exclusive window
//! in which no task touches the heap.

#[macro_use]
extern crate log;

pub mod heap;
pub mod marking;
pub mod remset;
pub mod util;

pub use crate::marking::{Color, ConcurrentMarking, MarkTable, PauseScope};
pub use crate::util::{ObjectIndex, SlotIndex, Value};
