//! Uniform push/pull capability bundles for byte and message streams,
//! plus the stream combinators built on top of them.
//!
//! Grounded on `original_source/core/streams.h` (`Sink<T>`/`Source<T>`)
//! and `original_source/utils/LineFilter.h` (the line-framing
//! combinators). The original's `Sink::empty()`/`Source::empty()` are
//! non-`const` virtual methods because several combinators (the line
//! filter, MIN's `In`, `Tee`) pump their upstream during the `empty()`
//! check itself rather than on `pop()`; this crate keeps that shape by
//! making both capability traits take `&mut self` throughout, rather
//! than forcing the "pump on pop" split the original doesn't use.

#[cfg(feature = "alloc")]
extern crate alloc;
#[cfg(feature = "alloc")]
use alloc::boxed::Box;
#[cfg(feature = "alloc")]
use alloc::rc::Rc;
#[cfg(feature = "alloc")]
use core::cell::RefCell;

#[cfg(feature = "alloc")]
use crate::buf::ByteBuf;
#[cfg(feature = "alloc")]
use crate::queue::Queue;

/// Generic consumer of `T`.
///
/// `push` does not check for space; guard with [`Sink::full`] first, or
/// use [`Sink::trypush`] to drop silently on overflow. This mirrors
/// `original_source/core/streams.h`'s `Sink<T>`.
pub trait Sink<T> {
    /// `true` iff the sink cannot currently accept another item.
    fn full(&mut self) -> bool;
    /// Move an item into the sink. Not guarded; see [`Sink::full`].
    fn push(&mut self, item: T);
    /// Push if there's room; silently drop `item` otherwise.
    fn trypush(&mut self, item: T) {
        if !self.full() {
            self.push(item);
        }
    }
}

/// Generic producer of `T`.
///
/// Mirrors `original_source/core/streams.h`'s `Source<T>`. `empty` may
/// have side effects (pumping an upstream source into an internal
/// queue); `pop` is a programming error when `empty()` is true.
pub trait Source<T> {
    /// `true` iff no item is currently available.
    fn empty(&mut self) -> bool;
    /// Remove and return the next item.
    ///
    /// # Panics
    /// Implementations should panic if called while [`Source::empty`]
    /// would return `true` (spec.md §7: a programming error, not a
    /// recoverable condition).
    fn pop(&mut self) -> T;
}

#[cfg(feature = "alloc")]
impl<T> Sink<T> for Queue<T> {
    #[inline]
    fn full(&mut self) -> bool {
        Queue::full(self)
    }
    #[inline]
    fn push(&mut self, item: T) {
        Queue::push(self, item)
    }
}

#[cfg(feature = "alloc")]
impl<T> Source<T> for Queue<T> {
    #[inline]
    fn empty(&mut self) -> bool {
        Queue::empty(self)
    }
    #[inline]
    fn pop(&mut self) -> T {
        Queue::pop(self)
    }
}

/// Black-hole capability: accepts everything, produces nothing.
///
/// Grounded on `original_source/core/logger.h`'s `DevNull<T>`/`devnull<T>`,
/// used there as the default target for the Kernel's logger before
/// `initLog` points it somewhere real.
#[derive(Debug, Default, Clone, Copy)]
pub struct DevNull;

impl<T> Sink<T> for DevNull {
    #[inline]
    fn full(&mut self) -> bool {
        false
    }
    #[inline]
    fn push(&mut self, _item: T) {}
}

impl<T> Source<T> for DevNull {
    #[inline]
    fn empty(&mut self) -> bool {
        true
    }
    #[inline]
    fn pop(&mut self) -> T {
        unreachable!("DevNull::pop: source is always empty")
    }
}

/// Splits bytes arriving from an upstream byte-buffer source into
/// LF/CR-terminated lines.
///
/// Grounded on `original_source/utils/LineFilter.h`. Accumulates into a
/// fixed-capacity (`spec.md` §4.C: 128 bytes) stash; on `\n` or `\r`
/// emits the accumulated line (without the terminator). Empty lines are
/// ignored. A line that would overflow the stash is dropped in full:
/// the stash is cleared and every further byte is discarded until the
/// next line terminator, so no fragment of the oversized line can
/// resurface as the prefix of the next emitted line. A completed line
/// is dropped if the output queue is full.
#[cfg(feature = "alloc")]
pub struct LineFilter<Up> {
    upstream: Up,
    stash: ByteBuf,
    lines: Queue<ByteBuf>,
    discarding: bool,
}

#[cfg(feature = "alloc")]
impl<Up> LineFilter<Up> {
    /// Capacity of the accumulation stash, per `spec.md` §4.C.
    pub const LINE_CAPACITY: usize = 128;

    pub fn new(upstream: Up, queue_capacity: usize) -> Self {
        LineFilter {
            upstream,
            stash: ByteBuf::with_capacity(Self::LINE_CAPACITY),
            lines: Queue::with_capacity(queue_capacity),
            discarding: false,
        }
    }

    fn recv(&mut self, b: u8) {
        if b == b'\n' || b == b'\r' {
            self.discarding = false;
            if self.stash.is_empty() {
                return;
            }
            let line = core::mem::replace(&mut self.stash, ByteBuf::with_capacity(Self::LINE_CAPACITY));
            if !self.lines.full() {
                self.lines.push(line);
            }
            return;
        }
        if self.discarding {
            return;
        }
        if self.stash.is_full() {
            // Line longer than our stash: drop the whole line, not just
            // what's accumulated so far. Discard every byte up to the
            // next terminator instead of resuming mid-line.
            self.stash.clear();
            self.discarding = true;
            return;
        }
        self.stash.append(b);
    }
}

#[cfg(feature = "alloc")]
impl<Up: Source<ByteBuf>> Source<ByteBuf> for LineFilter<Up> {
    fn empty(&mut self) -> bool {
        while !self.upstream.empty() {
            let chunk = self.upstream.pop();
            for &b in chunk.iter() {
                self.recv(b);
            }
        }
        self.lines.empty()
    }

    fn pop(&mut self) -> ByteBuf {
        self.lines.pop()
    }
}

/// Appends a single LF to every buffer pushed through it, before
/// forwarding to a downstream byte-buffer sink.
///
/// Grounded on `original_source/utils/LineFilter.h`'s `LineDelimiter`.
/// Reallocates (to `capacity + 1`) when the input buffer was
/// constructed with no spare byte for the terminator.
#[cfg(feature = "alloc")]
pub struct LineDelimiter<Down> {
    downstream: Down,
}

#[cfg(feature = "alloc")]
impl<Down> LineDelimiter<Down> {
    pub fn new(downstream: Down) -> Self {
        LineDelimiter { downstream }
    }
}

#[cfg(feature = "alloc")]
impl<Down: Sink<ByteBuf>> Sink<ByteBuf> for LineDelimiter<Down> {
    fn full(&mut self) -> bool {
        self.downstream.full()
    }

    fn push(&mut self, mut buf: ByteBuf) {
        if buf.len() < buf.capacity() {
            buf.append(b'\n');
            self.downstream.push(buf);
        } else {
            let mut grown = ByteBuf::with_capacity(buf.capacity() + 1);
            grown.extend_from(buf.iter().copied());
            grown.append(b'\n');
            self.downstream.push(grown);
        }
    }
}

/// Drains an upstream source into its own queue, mirroring each item
/// into a side sink which silently drops on overflow.
///
/// Grounded on the "tee" pattern described in `spec.md` §4.C; there is
/// no single original file for this (the original repo doesn't have a
/// named `Tee`), so the combinator is built in the idiom of
/// `utils/LineFilter.h`'s `Source` wrapper: pump-on-`empty`, own queue,
/// move semantics preserved by requiring `T: Clone` only for the
/// side-channel copy.
#[cfg(feature = "alloc")]
pub struct Tee<T, Up, Side> {
    upstream: Up,
    side: Side,
    queue: Queue<T>,
}

#[cfg(feature = "alloc")]
impl<T, Up, Side> Tee<T, Up, Side> {
    pub fn new(upstream: Up, side: Side, queue_capacity: usize) -> Self {
        Tee {
            upstream,
            side,
            queue: Queue::with_capacity(queue_capacity),
        }
    }
}

#[cfg(feature = "alloc")]
impl<T: Clone, Up: Source<T>, Side: Sink<T>> Source<T> for Tee<T, Up, Side> {
    fn empty(&mut self) -> bool {
        while !self.upstream.empty() {
            let item = self.upstream.pop();
            self.side.trypush(item.clone());
            if !self.queue.full() {
                self.queue.push(item);
            }
        }
        self.queue.empty()
    }

    fn pop(&mut self) -> T {
        self.queue.pop()
    }
}

/// A `Sink` that fans a single push out to two downstream sinks.
///
/// `full()` is `true` iff either side is full; `push` moves a copy into
/// each (requires `T: Clone`, since both sides need their own value).
pub struct SplitPush<A, B> {
    a: A,
    b: B,
}

impl<A, B> SplitPush<A, B> {
    pub fn new(a: A, b: B) -> Self {
        SplitPush { a, b }
    }
}

impl<T: Clone, A: Sink<T>, B: Sink<T>> Sink<T> for SplitPush<A, B> {
    fn full(&mut self) -> bool {
        self.a.full() || self.b.full()
    }

    fn push(&mut self, item: T) {
        self.a.push(item.clone());
        self.b.push(item);
    }
}

/// Shared state behind a pair of [`SplitPullBranch`]es: the upstream
/// source plus one queue per branch.
#[cfg(feature = "alloc")]
struct SplitPullShared<T, Up> {
    upstream: Up,
    queues: [Queue<T>; 2],
}

/// One half of a [`split_pull`] pair.
///
/// Grounded on `spec.md` §4.C's `SplitPull`: each branch lazily pulls
/// from the shared upstream on its own `empty()` call and pushes every
/// observed item into *both* queues (its own and its peer's), so
/// whichever branch is queried first still leaves the other with a
/// full, in-order copy of the stream. The two branches share state via
/// `Rc<RefCell<_>>` rather than raw/aliased references, since Rust
/// doesn't allow two live `&mut` paths into the same upstream.
#[cfg(feature = "alloc")]
pub struct SplitPullBranch<T, Up> {
    shared: Rc<RefCell<SplitPullShared<T, Up>>>,
    index: usize,
}

#[cfg(feature = "alloc")]
pub fn split_pull<T: Clone, Up: Source<T>>(
    upstream: Up,
    queue_capacity: usize,
) -> (SplitPullBranch<T, Up>, SplitPullBranch<T, Up>) {
    let shared = Rc::new(RefCell::new(SplitPullShared {
        upstream,
        queues: [
            Queue::with_capacity(queue_capacity),
            Queue::with_capacity(queue_capacity),
        ],
    }));
    (
        SplitPullBranch {
            shared: shared.clone(),
            index: 0,
        },
        SplitPullBranch { shared, index: 1 },
    )
}

#[cfg(feature = "alloc")]
impl<T: Clone, Up: Source<T>> SplitPullBranch<T, Up> {
    fn pump(&mut self) {
        let mut shared = self.shared.borrow_mut();
        while !shared.upstream.empty() {
            let item = shared.upstream.pop();
            let peer = 1 - self.index;
            if !shared.queues[peer].full() {
                shared.queues[peer].push(item.clone());
            }
            if !shared.queues[self.index].full() {
                shared.queues[self.index].push(item);
            }
        }
    }
}

#[cfg(feature = "alloc")]
impl<T: Clone, Up: Source<T>> Source<T> for SplitPullBranch<T, Up> {
    fn empty(&mut self) -> bool {
        self.pump();
        let empty = self.shared.borrow().queues[self.index].empty();
        empty
    }

    fn pop(&mut self) -> T {
        self.shared.borrow_mut().queues[self.index].pop()
    }
}

/// Expands each input byte to `\`, hi-nibble-hex, lo-nibble-hex and
/// forwards the expanded buffer downstream in one push.
///
/// Grounded on `spec.md` §4.C's `Hexify`; there's no literal
/// counterpart in `original_source`, but the shape (a `Sink<Buffer<u8>>`
/// wrapping another `Sink<Buffer<u8>>`, building a work buffer before
/// flushing) follows `LineDelimiter`'s.
#[cfg(feature = "alloc")]
pub struct Hexify<Down> {
    downstream: Down,
}

#[cfg(feature = "alloc")]
const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

#[cfg(feature = "alloc")]
impl<Down> Hexify<Down> {
    pub fn new(downstream: Down) -> Self {
        Hexify { downstream }
    }
}

#[cfg(feature = "alloc")]
impl<Down: Sink<ByteBuf>> Sink<ByteBuf> for Hexify<Down> {
    fn full(&mut self) -> bool {
        self.downstream.full()
    }

    fn push(&mut self, buf: ByteBuf) {
        let mut work = ByteBuf::with_capacity(buf.len() * 3);
        for &b in buf.iter() {
            work.append(b'\\');
            work.append(HEX_DIGITS[(b >> 4) as usize]);
            work.append(HEX_DIGITS[(b & 0x0f) as usize]);
        }
        self.downstream.push(work);
    }
}

#[cfg(all(test, feature = "alloc"))]
mod test {
    use super::*;
    use alloc::vec::Vec;

    #[derive(Default)]
    struct VecSource {
        items: Vec<ByteBuf>,
    }
    impl Source<ByteBuf> for VecSource {
        fn empty(&mut self) -> bool {
            self.items.is_empty()
        }
        fn pop(&mut self) -> ByteBuf {
            self.items.remove(0)
        }
    }

    fn bytes(s: &str) -> ByteBuf {
        s.bytes().collect()
    }

    #[test]
    fn line_filter_handles_mixed_terminators() {
        let source = VecSource {
            items: alloc::vec![bytes("a\nbb\r\nccc\n")],
        };
        let mut lf = LineFilter::new(source, 8);
        let mut lines = Vec::new();
        while !lf.empty() {
            lines.push(lf.pop());
        }
        let as_strings: Vec<alloc::string::String> = lines
            .into_iter()
            .map(|b| alloc::string::String::from_utf8(b.iter().copied().collect()).unwrap())
            .collect();
        assert_eq!(as_strings, ["a", "bb", "ccc"]);
    }

    #[test]
    fn line_filter_drops_oversized_line() {
        // 200 bytes of the oversized line, terminated, followed by a
        // separate well-formed line: the whole 200-byte line must be
        // dropped (not just its first 128 bytes), leaving "ok" as the
        // only emitted line.
        let huge: ByteBuf = (0..200u32).map(|i| (i % 26) as u8 + b'a').chain(core::iter::once(b'\n')).collect();
        let source = VecSource {
            items: alloc::vec![huge, bytes("ok\n")],
        };
        let mut lf = LineFilter::new(source, 8);
        assert!(!lf.empty());
        let line = lf.pop();
        assert_eq!(line.iter().copied().collect::<Vec<_>>(), b"ok");
        assert!(lf.empty());
    }

    #[test]
    fn hexify_expands_each_byte() {
        struct Capture(Vec<u8>);
        impl Sink<ByteBuf> for Capture {
            fn full(&mut self) -> bool {
                false
            }
            fn push(&mut self, item: ByteBuf) {
                self.0 = item.iter().copied().collect();
            }
        }
        let mut h = Hexify::new(Capture(Vec::new()));
        h.push(ByteBuf::from([0xDE, 0xAD]));
        assert_eq!(h.downstream.0, b"\\de\\ad");
    }

    #[test]
    fn split_push_fans_out_to_both_sides() {
        struct Capture(Vec<u8>);
        impl Sink<u8> for Capture {
            fn full(&mut self) -> bool {
                false
            }
            fn push(&mut self, item: u8) {
                self.0.push(item);
            }
        }
        let mut sp = SplitPush::new(Capture(Vec::new()), Capture(Vec::new()));
        sp.push(7u8);
        assert_eq!(sp.a.0, [7]);
        assert_eq!(sp.b.0, [7]);
    }

    #[test]
    fn split_pull_delivers_every_item_to_both_branches() {
        let source = VecSource {
            items: alloc::vec![bytes("x"), bytes("y")],
        };
        let (mut left, mut right) = split_pull(source, 4);
        // Query the left branch first; the right branch must still see
        // both items, in order, even though it hasn't been polled yet.
        let mut got_left = Vec::new();
        while !left.empty() {
            got_left.push(left.pop());
        }
        let mut got_right = Vec::new();
        while !right.empty() {
            got_right.push(right.pop());
        }
        assert_eq!(got_left.len(), 2);
        assert_eq!(got_right.len(), 2);
    }
}
