//! Bounded FIFO backed by a ring of fixed capacity.
//!
//! Grounded on `original_source/utils/queue.h`, which backs its `Queue<T>`
//! with a `Buffer<T>` indexed by wrapping head/tail cursors. The
//! storage here plays the same role but is a `Vec<Option<T>>` instead
//! of a raw `Buffer<T>`: the `Option` slot is what lets [`Queue::pop`]
//! move the oldest item out by value without leaving the backing
//! store in an invalid state, which the original achieves in C++ via
//! plain move-assignment into an already-constructed slot.

#[cfg(feature = "alloc")]
extern crate alloc;
#[cfg(feature = "alloc")]
use alloc::vec::Vec;

/// Bounded FIFO with fixed capacity chosen at construction.
///
/// Indexing via [`Queue::at`] is logical (`0` is the oldest item), not
/// physical: after a [`Queue::pop`], every remaining index shifts down
/// by one, exactly as the spec's §3 data model requires.
#[cfg(feature = "alloc")]
pub struct Queue<T> {
    slots: Vec<Option<T>>,
    head: usize,
    len: usize,
}

#[cfg(feature = "alloc")]
impl<T> Queue<T> {
    /// Construct an empty queue with the given fixed capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Queue {
            slots,
            head: 0,
            len: 0,
        }
    }

    /// Fixed capacity this queue was constructed with.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of items currently queued.
    #[inline]
    pub fn size(&self) -> usize {
        self.len
    }

    /// `true` iff no items are queued.
    #[inline]
    pub fn empty(&self) -> bool {
        self.len == 0
    }

    /// `true` iff `size() == capacity()`.
    #[inline]
    pub fn full(&self) -> bool {
        self.len == self.slots.len()
    }

    /// Move an item into the queue.
    ///
    /// # Panics
    /// Panics if the queue is full. This is a programming error per
    /// `spec.md` §7, not a runtime condition to recover from; callers
    /// expected to guard with [`Queue::full`], or use
    /// [`Sink::trypush`] for fire-and-forget submission.
    pub fn push(&mut self, item: T) {
        assert!(!self.full(), "Queue::push: full");
        let tail = (self.head + self.len) % self.capacity_nonzero();
        self.slots[tail] = Some(item);
        self.len += 1;
    }

    /// Reference to the oldest queued item.
    ///
    /// # Panics
    /// Panics if the queue is empty.
    pub fn front(&self) -> &T {
        assert!(!self.empty(), "Queue::front: empty");
        self.slots[self.head].as_ref().expect("Queue: occupied slot held None")
    }

    /// Remove and return the oldest queued item.
    ///
    /// # Panics
    /// Panics if the queue is empty.
    pub fn pop(&mut self) -> T {
        assert!(!self.empty(), "Queue::pop: empty");
        let item = self.slots[self.head]
            .take()
            .expect("Queue: occupied slot held None");
        self.head = (self.head + 1) % self.capacity_nonzero();
        self.len -= 1;
        item
    }

    /// Reference to the item at logical position `ix`, where `0` is
    /// the oldest.
    ///
    /// # Panics
    /// Panics if `ix >= size()`.
    pub fn at(&self, ix: usize) -> &T {
        assert!(ix < self.len, "Queue::at: out of bounds");
        let phys = (self.head + ix) % self.capacity_nonzero();
        self.slots[phys].as_ref().expect("Queue: occupied slot held None")
    }

    #[inline]
    fn capacity_nonzero(&self) -> usize {
        self.slots.len().max(1)
    }
}
