//! Property tests for the universal invariants named in `spec.md` §8.
//!
//! Lives under `tests/` rather than inline `#[cfg(test)]` modules
//! because these exercise the public API end-to-end across module
//! boundaries (Buffer+Queue, Min::In+Min::Out+FrameRegistry,
//! Scheduler+Recurring), the way `original_source`'s own behavior
//! crosses those same boundaries, rather than any single module's
//! internals.

use proptest::prelude::*;

use rt_core::buf::Buffer;
use rt_core::min::{Frame, In, Out};
use rt_core::queue::Queue;
use rt_core::schedule::{recurring, Scheduler};
use rt_core::stream::{Sink, Source};

#[derive(Clone, Default)]
struct VecSink {
    items: std::rc::Rc<std::cell::RefCell<Vec<Buffer<u8>>>>,
}
impl Sink<Buffer<u8>> for VecSink {
    fn full(&mut self) -> bool {
        false
    }
    fn push(&mut self, item: Buffer<u8>) {
        self.items.borrow_mut().push(item);
    }
}

#[derive(Default)]
struct VecSource {
    items: std::collections::VecDeque<Buffer<u8>>,
}
impl Source<Buffer<u8>> for VecSource {
    fn empty(&mut self) -> bool {
        self.items.is_empty()
    }
    fn pop(&mut self) -> Buffer<u8> {
        self.items.pop_front().unwrap()
    }
}

proptest! {
    /// For all Buffer B and all sequences of appends within capacity,
    /// iteration yields the appended sequence in order and `len`
    /// equals the number of appends.
    #[test]
    fn buffer_iteration_preserves_append_order(values in prop::collection::vec(any::<u8>(), 0..64)) {
        let mut b: Buffer<u8> = Buffer::with_capacity(values.len());
        for &v in &values {
            b.append(v);
        }
        prop_assert_eq!(b.len(), values.len());
        let got: Vec<u8> = b.iter().copied().collect();
        prop_assert_eq!(got, values);
    }

    /// For all Queue Q with capacity C and any sequence of pushes <= C
    /// followed by matching pops, the popped sequence equals the
    /// pushed sequence.
    #[test]
    fn queue_pop_order_matches_push_order(values in prop::collection::vec(any::<i32>(), 0..32)) {
        let mut q: Queue<i32> = Queue::with_capacity(values.len().max(1));
        for &v in &values {
            q.push(v);
        }
        let mut popped = Vec::new();
        while !q.empty() {
            popped.push(q.pop());
        }
        prop_assert_eq!(popped, values);
    }

    /// For all MIN frames F with id in [0,63] and payload <= 128
    /// bytes, decode(encode(F)) == F.
    #[test]
    fn min_frame_round_trips(id in 0u8..64, payload in prop::collection::vec(any::<u8>(), 0..=128)) {
        let sink = VecSink::default();
        let mut out = Out::new(sink.clone());
        let mut frame = Frame::with_capacity(id, payload.len().max(1));
        for &b in &payload {
            frame.pack(b);
        }
        out.push(frame);
        let wire = sink.items.borrow_mut().pop().unwrap();

        let source = VecSource {
            items: wire.iter().map(|&b| Buffer::from([b])).collect(),
        };
        let mut inp = In::new(source, 2);
        prop_assert!(!inp.empty());
        let mut decoded = inp.pop();
        prop_assert_eq!(decoded.id(), id);
        let mut got = Vec::new();
        for _ in 0..payload.len() {
            got.push(decoded.unpack::<u8>());
        }
        prop_assert_eq!(got, payload);
    }

    /// For any Recurring Schedulable with period dt started at t0, the
    /// number of calls in window [t0, t0 + N*dt] is exactly N+1.
    #[test]
    fn recurring_call_count_is_deterministic(period in 1u32..30, n in 1u32..10) {
        let mut reg = recurring::Registry::new();
        let count = std::rc::Rc::new(std::cell::RefCell::new(0u32));
        let count2 = count.clone();
        reg.every(period, move |_t, _dt| *count2.borrow_mut() += 1);

        let mut sched = Scheduler::new(4);
        let window_end = period * n;
        for now in 0..=window_end {
            sched.schedule(now, &reg);
            sched.run();
        }
        prop_assert_eq!(*count.borrow(), n + 1);
    }
}
