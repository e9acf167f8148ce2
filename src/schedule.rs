//! Cooperative round-robin scheduler, plus its two registry kinds.
//!
//! Grounded on `original_source/core/schedule.h`. A [`Schedulable`] is
//! "the poor man's closure": `schedule(now)` decides whether it's due,
//! `call()` runs it. A [`Registry`] owns a list of them; the
//! [`Scheduler`] asks a registry which of its members are due for
//! `now`, queues those, then drains the queue in order. Two registries
//! (`recurring`, `evented`) are built in; `Experiment`
//! (`crate::experiment`) uses both kinds to drive its state machine.
//!
//! The original's run queue is `Queue<Schedulable*>`, non-owning
//! pointers into whichever registries fed it. Rust can't alias a `&mut
//! Schedulable` across the schedule-then-run phases safely when
//! several registries share one run queue, so this crate uses
//! `Rc<RefCell<dyn Schedulable>>` instead: the registry holds the
//! owning strong reference, the run queue holds a cheap second strong
//! reference for the duration of one `run()` pass. No extra
//! allocation happens on the data path — the `Rc`'s refcount bump is
//! the only cost, and the queue itself (`crate::queue::Queue`) is
//! bounded, just like the original's `Registry::list`.

extern crate alloc;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;

use crate::queue::Queue;

/// The abstract unit of work: decide whether to run at a given time,
/// then run.
pub trait Schedulable {
    /// May this run at time `now`? May have side effects (e.g.
    /// advancing a recurring task's next-trigger time).
    fn schedule(&mut self, now: u32) -> bool;
    /// Do the work.
    fn call(&mut self);
    /// Force the next `schedule` call to trigger. Recurring
    /// schedulables zero their "next" time; one-shot/evented
    /// schedulables have nothing to reset, so the default is a no-op.
    fn reset(&mut self) {}
}

/// Shared ownership handle to a registered [`Schedulable`].
pub type SchedulableRef = Rc<RefCell<dyn Schedulable>>;

/// An owning list of [`Schedulable`]s of one kind.
#[derive(Default)]
pub struct Registry {
    list: Vec<SchedulableRef>,
}

impl Registry {
    pub fn new() -> Self {
        Registry { list: Vec::new() }
    }

    /// Zero every member's "next trigger" time (recurring registries;
    /// no-op for evented ones), forcing them all due on the next
    /// `schedule` call. Mirrors `Recurring::Registry::reset()`.
    pub fn reset(&mut self) {
        for entry in &self.list {
            entry.borrow_mut().reset();
        }
    }

    fn push(&mut self, s: SchedulableRef) {
        self.list.push(s);
    }
}

/// A periodic task: triggers every `period` ms, never more often, and
/// missed triggers don't compound (`next` always advances by exactly
/// one period per trigger, never jumps to `now`).
struct Recurring<F> {
    period: u32,
    next: u32,
    last: u32,
    callback: F,
}

impl<F: FnMut(u32, u32)> Schedulable for Recurring<F> {
    fn schedule(&mut self, now: u32) -> bool {
        if now >= self.next {
            self.last = now;
            self.next += self.period;
            true
        } else {
            false
        }
    }

    fn call(&mut self) {
        (self.callback)(self.last, self.period)
    }

    fn reset(&mut self) {
        self.next = 0;
    }
}

/// An always-triggers task: records the timestamp it was scheduled at
/// and forwards it to the callback.
struct Evented<F> {
    when: u32,
    callback: F,
}

impl<F: FnMut(u32)> Schedulable for Evented<F> {
    fn schedule(&mut self, now: u32) -> bool {
        self.when = now;
        true
    }

    fn call(&mut self) {
        (self.callback)(self.when)
    }
}

pub mod recurring {
    use super::*;

    /// Registry of [`super::Recurring`] tasks.
    #[derive(Default)]
    pub struct Registry(super::Registry);

    impl Registry {
        pub fn new() -> Self {
            Registry(super::Registry::new())
        }

        /// Register `f` to run every `dt` ms. `dt == 0` is a silent
        /// no-op, per `spec.md` §4.E.
        pub fn every<F: FnMut(u32, u32) + 'static>(&mut self, dt: u32, f: F) {
            if dt == 0 {
                return;
            }
            self.0.push(Rc::new(RefCell::new(Recurring {
                period: dt,
                next: 0,
                last: 0,
                callback: f,
            })));
        }

        pub fn reset(&mut self) {
            self.0.reset();
        }

        pub(crate) fn inner(&self) -> &super::Registry {
            &self.0
        }
    }
}

pub mod evented {
    use super::*;

    /// Registry of [`super::Evented`] one-shot tasks.
    #[derive(Default)]
    pub struct Registry(super::Registry);

    impl Registry {
        pub fn new() -> Self {
            Registry(super::Registry::new())
        }

        /// Register `f`, called on every `schedule()` pass with the
        /// timestamp it was scheduled at.
        pub fn call<F: FnMut(u32) + 'static>(&mut self, f: F) {
            self.0.push(Rc::new(RefCell::new(Evented { when: 0, callback: f })));
        }

        /// Register an already-constructed [`Schedulable`], taking
        /// ownership. Mirrors `Evented::Registry::call(Schedulable*)`.
        pub fn call_schedulable(&mut self, s: SchedulableRef) {
            self.0.push(s);
        }

        pub(crate) fn inner(&self) -> &super::Registry {
            &self.0
        }
    }
}

/// Round-robin runner: gathers due [`Schedulable`]s from one or more
/// registries, then drains them in submission order.
pub struct Scheduler {
    run_queue: Queue<SchedulableRef>,
}

impl Scheduler {
    /// `capacity` bounds how many due schedulables may be queued
    /// between a `schedule()` pass and the matching `run()`.
    pub fn new(capacity: usize) -> Self {
        Scheduler {
            run_queue: Queue::with_capacity(capacity),
        }
    }

    /// Queue every member of `registry` whose `schedule(now)` returns
    /// true.
    pub fn schedule(&mut self, now: u32, registry: &recurring::Registry) {
        self.schedule_inner(now, registry.inner());
    }

    /// Same as [`Scheduler::schedule`] but for an evented registry.
    pub fn schedule_evented(&mut self, now: u32, registry: &evented::Registry) {
        self.schedule_inner(now, registry.inner());
    }

    fn schedule_inner(&mut self, now: u32, registry: &Registry) {
        for entry in &registry.list {
            let due = entry.borrow_mut().schedule(now);
            if due {
                assert!(!self.run_queue.full(), "Scheduler::schedule: run queue full");
                self.run_queue.push(entry.clone());
            }
        }
    }

    /// Drain the run queue, calling each entry in the order it was
    /// queued.
    pub fn run(&mut self) {
        while !self.run_queue.empty() {
            let entry = self.run_queue.pop();
            entry.borrow_mut().call();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use alloc::rc::Rc as StdRc;
    use core::cell::RefCell as StdRefCell;

    #[test]
    fn recurring_fires_exactly_every_period_in_window() {
        let mut reg = recurring::Registry::new();
        let hits = StdRc::new(StdRefCell::new(Vec::new()));
        let hits2 = hits.clone();
        reg.every(7, move |t, dt| hits2.borrow_mut().push((t, dt)));

        let mut sched = Scheduler::new(4);
        for now in 0..=49u32 {
            sched.schedule(now, &reg);
            sched.run();
        }
        let got: Vec<u32> = hits.borrow().iter().map(|(t, _)| *t).collect();
        assert_eq!(got, vec![0, 7, 14, 21, 28, 35, 42, 49]);
        assert!(hits.borrow().iter().all(|(_, dt)| *dt == 7));
    }

    #[test]
    fn every_zero_is_a_silent_no_op() {
        let mut reg = recurring::Registry::new();
        reg.every(0, |_, _| panic!("must never be called"));
        let mut sched = Scheduler::new(4);
        sched.schedule(0, &reg);
        sched.run();
    }

    #[test]
    fn reset_forces_immediate_retrigger() {
        let mut reg = recurring::Registry::new();
        let count = StdRc::new(StdRefCell::new(0u32));
        let count2 = count.clone();
        reg.every(100, move |_, _| *count2.borrow_mut() += 1);

        let mut sched = Scheduler::new(4);
        sched.schedule(0, &reg);
        sched.run();
        assert_eq!(*count.borrow(), 1);

        sched.schedule(5, &reg);
        sched.run();
        assert_eq!(*count.borrow(), 1, "period hasn't elapsed yet");

        reg.reset();
        sched.schedule(5, &reg);
        sched.run();
        assert_eq!(*count.borrow(), 2, "reset forces an immediate retrigger");
    }

    #[test]
    fn evented_always_triggers_and_forwards_timestamp() {
        let mut reg = evented::Registry::new();
        let seen = StdRc::new(StdRefCell::new(Vec::new()));
        let seen2 = seen.clone();
        reg.call(move |t| seen2.borrow_mut().push(t));

        let mut sched = Scheduler::new(4);
        sched.schedule_evented(3, &reg);
        sched.run();
        sched.schedule_evented(9, &reg);
        sched.run();
        assert_eq!(*seen.borrow(), vec![3, 9]);
    }
}
