//! Generic single-flight, timeout-bounded, in-order request dispatcher.
//!
//! Grounded on `original_source/utils/RequestQueue.h` (the
//! `rqAdd`/`rqPoll`/`rqBegin`/`rqTimeout`/`rqEnd` state machine) and the
//! newer queue-based `original_source/stm/i2c.h`, which is the
//! `dev`-generation design `spec.md`'s Open Questions call out as the
//! one to reimplement (the older blocking `sensors/`-generation style
//! is explicitly not ported). This single [`Engine`] is instantiated
//! once per bus in [`crate::bus`] (I²C, SPI, UART, CAN), rather than
//! hand-rolled per peripheral as the original does.
//!
//! The engine doesn't own a clock; every method that needs "now" takes
//! it as a parameter, driven by whatever calls into the bus from the
//! interrupt/poll context (`spec.md` §5: interrupts only ever
//! manipulate peripheral-owned queues and completion flags, they never
//! run user callbacks directly — [`Engine::complete`]/[`Engine::fail`]
//! are exactly that boundary).

use crate::queue::Queue;

/// A unit of work whose owning device needs to be told when it's done.
///
/// `complete` consumes `self` because by the time it's called the
/// engine has already taken exclusive ownership of the request out of
/// its in-flight slot — there's nothing left to do with it afterward,
/// matching `spec.md` §3's "passed back by reference to the device's
/// `callback`, then destroyed" lifetime (the callback is expected to be
/// invoked, and the storage freed, in the same step).
pub trait Request {
    /// Invoked once the transfer completes successfully. Implementors
    /// forward this to the owning device's own callback.
    fn complete(self);
}

/// What the bus-specific driver supplies to actually move bytes.
///
/// `start`/`abort` are the only points where real hardware gets
/// touched; everything else (ordering, single-flight, timeout) is
/// handled generically by [`Engine`].
pub trait Transport<R> {
    /// Begin the hardware transfer for this request. Called exactly
    /// once per request, right after it becomes the in-flight one.
    fn start(&mut self, request: &R);
    /// Abort whatever transfer is currently in flight (deadline expiry
    /// or a peripheral error callback).
    fn abort(&mut self);
    /// Absolute monotonic deadline (ms) for this request, or `None` to
    /// disable the timeout. Usually derived from payload size and baud.
    fn deadline(&self, request: &R, now: u32) -> Option<u32>;
}

/// Generic in-order, single-flight, timeout-bounded request dispatcher.
///
/// Discipline (mirrors `spec.md` §4.D exactly):
/// - [`Engine::push`]: enqueue; if nothing is in flight, start the new
///   head immediately.
/// - [`Engine::complete`]: the peripheral's success callback. Move the
///   in-flight request out, call its `Request::complete`, clear the
///   deadline, start the next queued request if any.
/// - [`Engine::fail`]: the peripheral's error callback, or a deadline
///   expiry observed via [`Engine::poll`]. Abort at the hardware level,
///   drop the in-flight request with **no** completion callback, clear
///   the deadline, start the next request if any.
pub struct Engine<R, T> {
    queue: Queue<R>,
    inflight: Option<R>,
    deadline: crate::deadline::Deadline,
    transport: T,
}

impl<R: Request, T: Transport<R>> Engine<R, T> {
    pub fn new(capacity: usize, transport: T) -> Self {
        Engine {
            queue: Queue::with_capacity(capacity),
            inflight: None,
            deadline: crate::deadline::Deadline::none(),
            transport,
        }
    }

    /// `true` iff the pending queue has no room for another request.
    /// Does not account for the in-flight slot, which is separate.
    pub fn full(&self) -> bool {
        self.queue.full()
    }

    /// Enqueue `request`; starts it immediately if nothing is in
    /// flight.
    ///
    /// # Panics
    /// Panics if the pending queue is full; guard with
    /// [`Engine::full`], or use [`Engine::trypush`].
    pub fn push(&mut self, request: R, now: u32) {
        assert!(!self.queue.full(), "Engine::push: queue full");
        self.queue.push(request);
        self.start_next(now);
    }

    /// Enqueue `request` if there's room; silently drop it otherwise.
    /// For devices that must not block on a full queue.
    pub fn trypush(&mut self, request: R, now: u32) {
        if !self.queue.full() {
            self.push(request, now);
        }
    }

    /// Peripheral completion callback: the in-flight transfer
    /// succeeded.
    pub fn complete(&mut self, now: u32) {
        if let Some(req) = self.inflight.take() {
            req.complete();
        }
        self.deadline = crate::deadline::Deadline::none();
        self.start_next(now);
    }

    /// Peripheral error callback: abort the in-flight transfer with no
    /// completion callback to its device.
    pub fn fail(&mut self, now: u32) {
        self.transport.abort();
        self.inflight = None;
        self.deadline = crate::deadline::Deadline::none();
        self.start_next(now);
    }

    /// Check the in-flight deadline; abort and advance if it expired.
    /// Call regularly from the same poll/tick loop that advances the
    /// clock.
    pub fn poll(&mut self, now: u32) {
        if self.deadline.poll(now) {
            self.fail(now);
        }
    }

    /// `true` iff some request is currently being transferred.
    pub fn is_busy(&self) -> bool {
        self.inflight.is_some()
    }

    fn start_next(&mut self, now: u32) {
        if self.inflight.is_some() || self.queue.empty() {
            return;
        }
        let next = self.queue.pop();
        self.deadline = match self.transport.deadline(&next, now) {
            Some(when) => crate::deadline::Deadline::at(when),
            None => crate::deadline::Deadline::none(),
        };
        self.transport.start(&next);
        self.inflight = Some(next);
    }
}
