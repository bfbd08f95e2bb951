//! Wait-free frame relay between the capture thread and the render loop
//!
//! This is a triple buffer with exactly one writer and one reader:
//! - the writer owns one slot and fills it in place
//! - a second slot is the "middle" slot, handed between the two sides
//! - the reader owns the third slot and reads from it
//!
//! Publishing swaps the writer's slot into the middle position (marking it
//! fresh) and gives the writer back whatever was there. Reading swaps the
//! reader's slot with a fresh middle slot. Each swap is a single atomic
//! operation, so neither side ever waits, and a slot is only ever touched by
//! the side that currently owns it.
//!
//! If the reader is slower than the writer, intermediate frames are simply
//! overwritten in the middle slot. Memory stays at three frames.

use common::Frame;
use std::cell::UnsafeCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Number of frame slots in the relay.
pub const SLOT_COUNT: usize = 3;

const INDEX_MASK: u8 = 0b011;
const FRESH_BIT: u8 = 0b100;

/// Slot indices are 0, 1 and 2, so the slot owned by neither `a` nor `b` is
/// what remains of their sum.
fn third_slot(a: usize, b: usize) -> usize {
    SLOT_COUNT - a - b
}

struct Shared {
    slots: [UnsafeCell<Frame>; SLOT_COUNT],
    /// Middle slot index, with `FRESH_BIT` set while it holds an unread publish
    middle: AtomicU8,
}

// SAFETY: every slot is owned by exactly one of writer, middle or reader at
// any time. Ownership only moves through the AcqRel swap on `middle`, which
// orders all writes to a slot before the reader that receives it.
unsafe impl Sync for Shared {}

/// Create a relay and split it into its writer and reader halves.
pub fn channel() -> (RelayWriter, RelayReader) {
    let shared = Arc::new(Shared {
        slots: [
            UnsafeCell::new(Frame::empty()),
            UnsafeCell::new(Frame::empty()),
            UnsafeCell::new(Frame::empty()),
        ],
        middle: AtomicU8::new(1),
    });

    let writer = RelayWriter {
        shared: Arc::clone(&shared),
        write: 0,
        published: false,
    };
    let reader = RelayReader {
        shared,
        read: 2,
        has_frame: false,
    };
    (writer, reader)
}

/// Producer half of the relay. Not clonable: there is one writer by construction.
pub struct RelayWriter {
    shared: Arc<Shared>,
    write: usize,
    published: bool,
}

impl RelayWriter {
    /// Index of the slot currently reserved for writing.
    pub fn write_index(&self) -> usize {
        self.write
    }

    /// Slot of the most recent publish.
    ///
    /// Still in the middle position while unread, otherwise taken by the
    /// reader, which then holds the one slot that is neither ours nor middle.
    pub fn latest_index(&self) -> Option<usize> {
        if !self.published {
            return None;
        }
        let middle = self.shared.middle.load(Ordering::Acquire);
        let index = (middle & INDEX_MASK) as usize;
        if middle & FRESH_BIT != 0 {
            Some(index)
        } else {
            Some(third_slot(self.write, index))
        }
    }

    /// Frame storage reserved for the next publish.
    pub fn acquire_write_slot(&mut self) -> &mut Frame {
        // SAFETY: the writer exclusively owns `self.write` until `publish`.
        unsafe { &mut *self.shared.slots[self.write].get() }
    }

    /// Hand the write slot to the reader and take a different slot to write into.
    ///
    /// After this returns, `write_index()` differs from `latest_index()`.
    pub fn publish(&mut self) {
        let previous = self
            .shared
            .middle
            .swap(self.write as u8 | FRESH_BIT, Ordering::AcqRel);
        self.write = (previous & INDEX_MASK) as usize;
        self.published = true;
    }
}

/// Consumer half of the relay.
pub struct RelayReader {
    shared: Arc<Shared>,
    read: usize,
    has_frame: bool,
}

impl RelayReader {
    /// Latest published frame, or `None` if nothing was ever published.
    ///
    /// Returns the same frame again when nothing new arrived since the last
    /// call; callers compare `Frame::sequence` to tell.
    pub fn try_read(&mut self) -> Option<&Frame> {
        if self.shared.middle.load(Ordering::Relaxed) & FRESH_BIT != 0 {
            let previous = self.shared.middle.swap(self.read as u8, Ordering::AcqRel);
            self.read = (previous & INDEX_MASK) as usize;
            self.has_frame = true;
        }
        self.current()
    }

    /// Frame held from the last `try_read`, without checking for a newer one.
    pub fn current(&self) -> Option<&Frame> {
        // SAFETY: the reader exclusively owns `self.read`; the writer can only
        // obtain it after the reader swaps it back into the middle position.
        self.has_frame
            .then(|| unsafe { &*self.shared.slots[self.read].get() })
    }

    /// Slot the reader currently holds.
    pub fn read_index(&self) -> Option<usize> {
        self.has_frame.then_some(self.read)
    }

    /// Latest and write slot, both derived from one load of the middle slot.
    fn snapshot(&self) -> (Option<usize>, usize) {
        let middle = self.shared.middle.load(Ordering::Acquire);
        let index = (middle & INDEX_MASK) as usize;
        let latest = if middle & FRESH_BIT != 0 {
            Some(index)
        } else {
            // Not fresh: either nothing was published yet or we hold the newest
            self.has_frame.then_some(self.read)
        };
        (latest, third_slot(self.read, index))
    }

    /// Slot of the most recent publish.
    ///
    /// Use [`RelayReader::indices`] to compare it with the write slot; two
    /// separate calls may straddle a publish.
    pub fn latest_index(&self) -> Option<usize> {
        self.snapshot().0
    }

    /// Slot the writer is currently filling.
    pub fn write_index(&self) -> usize {
        self.snapshot().1
    }

    /// Both indices from the same instant, so they can be compared.
    pub fn indices(&self) -> (Option<usize>, usize) {
        self.snapshot()
    }
}
