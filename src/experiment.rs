//! The two-state (IDLE/RUN) Experiment controller driven by heartbeat
//! frames.
//!
//! Grounded on `original_source/core/experiment.h`. The original is a
//! process-wide singleton (`extern class Experiment { ... } e;`) that
//! wires itself into a global `Kernel` at construction. `spec.md` §9's
//! Design Notes call for explicit init-before-use state instead of
//! lazy singletons, so here `Experiment` is an ordinary owned value;
//! the embedding application registers it as a 1ms recurring task on
//! whichever [`crate::schedule::Scheduler`]/[`crate::kernel::Kernel`]
//! it's using, and calls [`Experiment::handle_frame`] from a
//! [`crate::min::FrameRegistry`] handler for id 1.
//!
//! `Experiment::tick` is itself called from inside a
//! [`crate::schedule::Scheduler::run`] pass (since it's registered as a
//! recurring task); the state-change event registries and the
//! still-RUN/still-IDLE registries it schedules feed into that *same*
//! run queue, exactly as the original's nested `k.schedule(...)` calls
//! do from inside `Kernel::tick`'s own `run()` pass.

extern crate alloc;
use alloc::rc::Rc;
use core::cell::RefCell;

use crate::deadline::Deadline;
use crate::min::Frame;
use crate::schedule::{evented, recurring, Scheduler};
use crate::stream::Sink;

/// Experiment states, per `spec.md` §4.H.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Run,
}

/// Events fired on state transitions or heartbeat loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Init,
    Stop,
    Timeout,
}

/// Two-state controller: IDLE/RUN, driven by a reserved control Frame
/// (id 1) and ticked once per ms by the embedding application's
/// scheduler.
pub struct Experiment {
    state: State,
    alive: bool,
    time: u32,
    init: evented::Registry,
    stop: evented::Registry,
    timeout: evented::Registry,
    idle: recurring::Registry,
    running: recurring::Registry,
    heartbeat_ms: u32,
    heartbeat: Deadline,
}

impl Default for Experiment {
    fn default() -> Self {
        Experiment {
            state: State::Idle,
            alive: false,
            time: 0,
            init: evented::Registry::new(),
            stop: evented::Registry::new(),
            timeout: evented::Registry::new(),
            idle: recurring::Registry::new(),
            running: recurring::Registry::new(),
            heartbeat_ms: 0,
            heartbeat: Deadline::none(),
        }
    }
}

impl Experiment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Experiment-local clock, zeroed on every IDLE→RUN transition.
    pub fn time(&self) -> u32 {
        self.time
    }

    /// Registry of one-shot handlers to run on `e`.
    pub fn on_event(&mut self, e: Event) -> &mut evented::Registry {
        match e {
            Event::Init => &mut self.init,
            Event::Stop => &mut self.stop,
            Event::Timeout => &mut self.timeout,
        }
    }

    /// Registry of recurring handlers to run while in state `s`.
    pub fn during(&mut self, s: State) -> &mut recurring::Registry {
        match s {
            State::Idle => &mut self.idle,
            State::Run => &mut self.running,
        }
    }

    /// Arm the heartbeat timeout. `ms == 0` disables it. Registers one
    /// extra TIMEOUT handler that pushes a not-alive control Frame
    /// through `notify`, so the peer that stopped heartbeating is told
    /// the local side gave up (`SPEC_FULL.md` Supplement G). `notify`
    /// is `Rc<RefCell<_>>` rather than a bare `&mut` reference because
    /// the registered closure must outlive this call (it's invoked
    /// later from a scheduler run pass); this is the same sharing
    /// pattern `Kernel`'s own clock uses.
    pub fn set_heartbeat_timeout(&mut self, ms: u32, notify: Rc<RefCell<dyn Sink<Frame>>>) {
        self.heartbeat_ms = ms;
        self.heartbeat = if ms == 0 { Deadline::none() } else { Deadline::at(self.time + ms) };
        self.timeout.call(move |_t| {
            let mut frame = Frame::new(1);
            frame.pack(0u8); // alive=0, heartbeat=0
            notify.borrow_mut().push(frame);
        });
    }

    /// Run one tick of the state machine, per `spec.md` §4.H's five
    /// numbered steps. `scheduler` is the same [`Scheduler`] this
    /// `Experiment` is itself registered against as a recurring task.
    pub fn tick(&mut self, dt: u32, scheduler: &mut Scheduler) {
        let old = self.state;
        self.state = if self.alive { State::Run } else { State::Idle };

        if self.state != old {
            match old {
                State::Idle => {
                    self.time = 0;
                    scheduler.schedule_evented(self.time, &self.init);
                    self.idle.reset();
                    self.running.reset();
                }
                State::Run => {
                    scheduler.schedule_evented(self.time, &self.stop);
                }
            }
        } else {
            match self.state {
                State::Idle => {
                    scheduler.schedule(self.time, &self.idle);
                }
                State::Run => {
                    scheduler.schedule(self.time, &self.running);
                    if self.heartbeat.poll(self.time) {
                        scheduler.schedule_evented(self.time, &self.timeout);
                        self.alive = false;
                    }
                }
            }
        }

        self.time += dt;
    }

    /// Handler for the reserved control Frame (id 1): one byte,
    /// bitfields `{alive:1, heartbeat:1, _:6}` (`spec.md` §6).
    pub fn handle_frame(&mut self, frame: &mut Frame) {
        debug_assert_eq!(frame.id(), 1);
        let byte: u8 = frame.unpack();
        let alive = byte & 0x1 != 0;
        let heartbeat = byte & 0x2 != 0;
        if heartbeat {
            if self.heartbeat_ms != 0 {
                self.heartbeat = Deadline::at(self.time + self.heartbeat_ms);
            }
        } else {
            self.alive = alive;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use alloc::vec::Vec;

    struct Capture(Rc<RefCell<Vec<Frame>>>);
    impl Sink<Frame> for Capture {
        fn full(&mut self) -> bool {
            false
        }
        fn push(&mut self, item: Frame) {
            self.0.borrow_mut().push(item);
        }
    }

    fn control_frame(alive: bool, heartbeat: bool) -> Frame {
        let mut f = Frame::new(1);
        let byte = (alive as u8) | ((heartbeat as u8) << 1);
        f.pack(byte);
        f
    }

    #[test]
    fn heartbeat_never_refreshed_eventually_trips_timeout() {
        let mut exp = Experiment::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let notify: Rc<RefCell<dyn Sink<Frame>>> = Rc::new(RefCell::new(Capture(seen.clone())));
        exp.set_heartbeat_timeout(50, notify);
        let mut sched = Scheduler::new(8);
        let timeouts_fired = Rc::new(RefCell::new(0u32));
        let timeouts_fired2 = timeouts_fired.clone();
        exp.on_event(Event::Timeout).call(move |_t| {
            *timeouts_fired2.borrow_mut() += 1;
        });

        exp.handle_frame(&mut control_frame(true, false));
        for _ in 0..200 {
            exp.tick(1, &mut sched);
            sched.run();
        }

        assert_eq!(exp.state(), State::Idle, "a heartbeat that's never refreshed must eventually drop the experiment back to IDLE");
        assert_eq!(*timeouts_fired.borrow(), 1, "TIMEOUT must fire exactly once, not once per subsequent tick");
        assert_eq!(seen.borrow().len(), 1, "the peer must be told exactly once that the local side gave up");
    }

    #[test]
    fn heartbeat_refreshed_faster_than_the_timeout_never_trips() {
        let mut exp = Experiment::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let notify: Rc<RefCell<dyn Sink<Frame>>> = Rc::new(RefCell::new(Capture(seen.clone())));
        exp.set_heartbeat_timeout(50, notify);
        let mut sched = Scheduler::new(8);

        exp.handle_frame(&mut control_frame(true, false));
        for t in 1..=200u32 {
            if t % 20 == 0 {
                exp.handle_frame(&mut control_frame(false, true));
            }
            exp.tick(1, &mut sched);
            sched.run();
        }

        assert_eq!(exp.state(), State::Run, "a heartbeat refreshed well inside the timeout window must keep the experiment alive");
        assert!(seen.borrow().is_empty());
    }
}
