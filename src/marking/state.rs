//! The tri-color state, one atomic byte per object in a side table.
//!
//! Color only advances White→Grey→Black, each step exactly once. The
//! single-attempt compare-exchange is the one synchronization point that
//! decides which caller enqueues an object and which task bills its bytes:
//! a caller that loses the exchange must do neither.

use crate::util::ObjectIndex;
use std::sync::atomic::{AtomicU8, Ordering};

const WHITE: u8 = 0;
const GREY: u8 = 1;
const BLACK: u8 = 2;

/// An object's marking color.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Color {
    /// Not discovered yet.
    White,
    /// Discovered and enqueued, scan pending.
    Grey,
    /// Fully scanned, bytes accounted.
    Black,
}

/// Side table of colors, indexed by [`ObjectIndex`]. Lock-free; safe under
/// any number of concurrent callers.
pub struct MarkTable {
    colors: Box<[AtomicU8]>,
}

impl MarkTable {
    /// A table for `object_count` objects, all White.
    pub fn new(object_count: usize) -> MarkTable {
        let mut colors = Vec::with_capacity(object_count);
        colors.resize_with(object_count, || AtomicU8::new(WHITE));
        MarkTable {
            colors: colors.into_boxed_slice(),
        }
    }

    fn cell(&self, object: ObjectIndex) -> &AtomicU8 {
        &self.colors[object.index()]
    }

    pub fn color_of(&self, object: ObjectIndex) -> Color {
        match self.cell(object).load(Ordering::SeqCst) {
            WHITE => Color::White,
            GREY => Color::Grey,
            BLACK => Color::Black,
            bits => unreachable!("corrupted color byte {:x} for {}", bits, object),
        }
    }

    /// Attempt the White→Grey transition. Returns true only for the caller
    /// that performed it; that caller (and no other) must enqueue the
    /// object.
    pub fn white_to_grey(&self, object: ObjectIndex) -> bool {
        self.cell(object)
            .compare_exchange(WHITE, GREY, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok()
    }

    /// Attempt the Grey→Black transition. Returns true only for the caller
    /// that performed it; that caller (and no other) bills the object's
    /// bytes.
    pub fn grey_to_black(&self, object: ObjectIndex) -> bool {
        self.cell(object)
            .compare_exchange(GREY, BLACK, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok()
    }

    pub fn is_grey(&self, object: ObjectIndex) -> bool {
        self.cell(object).load(Ordering::SeqCst) == GREY
    }

    pub fn is_black(&self, object: ObjectIndex) -> bool {
        self.cell(object).load(Ordering::SeqCst) == BLACK
    }

    pub fn is_black_or_grey(&self, object: ObjectIndex) -> bool {
        self.cell(object).load(Ordering::SeqCst) != WHITE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn transitions_advance_exactly_once() {
        let table = MarkTable::new(1);
        let object = ObjectIndex::from_index(0);

        assert_eq!(table.color_of(object), Color::White);
        // Grey→Black before White→Grey must fail.
        assert!(!table.grey_to_black(object));

        assert!(table.white_to_grey(object));
        assert!(!table.white_to_grey(object));
        assert_eq!(table.color_of(object), Color::Grey);
        assert!(table.is_grey(object));
        assert!(table.is_black_or_grey(object));

        assert!(table.grey_to_black(object));
        assert!(!table.grey_to_black(object));
        assert!(!table.white_to_grey(object));
        assert_eq!(table.color_of(object), Color::Black);
        assert!(table.is_black(object));
    }

    /// N concurrent callers race on `white_to_grey`; exactly one may win.
    fn race_white_to_grey(threads: usize) {
        let table = MarkTable::new(1);
        let object = ObjectIndex::from_index(0);
        let wins = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..threads {
                let table = &table;
                let wins = &wins;
                scope.spawn(move || {
                    if table.white_to_grey(object) {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(wins.load(Ordering::SeqCst), 1);
        assert_eq!(table.color_of(object), Color::Grey);
    }

    #[test]
    fn single_transition_2_threads() {
        race_white_to_grey(2);
    }

    #[test]
    fn single_transition_8_threads() {
        race_white_to_grey(8);
    }

    #[test]
    fn single_transition_64_threads() {
        race_white_to_grey(64);
    }
}
