//! Single-threaded discrete-event scheduler driving the simulation timeline.
//!
//! Virtual time is a `Duration` measured from simulation start. Callbacks are
//! stored in a `BTreeMap` keyed by (timestamp, sequence number), so events fire
//! in strictly increasing virtual-time order and events scheduled for the same
//! timestamp fire in scheduling order (FIFO). Each callback runs to completion
//! before the next one starts; callbacks may schedule or cancel further events
//! but never observe time moving backwards.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

type Callback = Box<dyn FnOnce()>;

/// Handle returned by [`EventQueue::schedule_at`], usable to cancel the event
/// before it fires. Cancelling an already-fired or already-cancelled event is
/// a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHandle {
    at: Duration,
    seq: u64,
}

#[derive(Default)]
struct QueueState {
    now: Duration,
    next_seq: u64,
    // Map of (virtual timestamp, insertion sequence) -> callback
    queue: BTreeMap<(Duration, u64), Callback>,
}

/// The event queue. Shared via `Rc` between the runner and every collaborator
/// that needs to schedule future work; interior mutability keeps the whole
/// simulation single-threaded with no locking.
#[derive(Default)]
pub struct EventQueue {
    state: RefCell<QueueState>,
}

impl EventQueue {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Current virtual time. During a callback this is the timestamp the
    /// callback was scheduled for.
    pub fn now(&self) -> Duration {
        self.state.borrow().now
    }

    /// Number of events still waiting to fire.
    pub fn pending(&self) -> usize {
        self.state.borrow().queue.len()
    }

    /// Schedule `callback` at absolute virtual time `at`.
    ///
    /// # Panics
    ///
    /// Panics if `at` is in the past; scheduling backwards is always a logic
    /// error in a discrete-event simulation.
    pub fn schedule_at(&self, at: Duration, callback: impl FnOnce() + 'static) -> EventHandle {
        let mut state = self.state.borrow_mut();
        assert!(
            at >= state.now,
            "event scheduled in the past: {:?} < {:?}",
            at,
            state.now
        );
        let seq = state.next_seq;
        state.next_seq += 1;
        state.queue.insert((at, seq), Box::new(callback));
        EventHandle { at, seq }
    }

    /// Schedule `callback` after `delay` relative to the current virtual time.
    pub fn schedule_in(&self, delay: Duration, callback: impl FnOnce() + 'static) -> EventHandle {
        let at = self.now() + delay;
        self.schedule_at(at, callback)
    }

    /// Cancel a pending event. Returns `true` if the event was still queued.
    pub fn cancel(&self, handle: EventHandle) -> bool {
        self.state
            .borrow_mut()
            .queue
            .remove(&(handle.at, handle.seq))
            .is_some()
    }

    /// Run all events with timestamps up to and including `deadline`, then
    /// advance the clock to `deadline`. Returns the number of callbacks fired.
    pub fn run_until(&self, deadline: Duration) -> usize {
        let mut fired = 0;
        loop {
            let next = {
                let mut state = self.state.borrow_mut();
                let due = match state.queue.keys().next() {
                    Some(&(at, _)) if at <= deadline => Some(at),
                    _ => None,
                };
                match due {
                    Some(at) => {
                        state.now = at;
                        state.queue.pop_first()
                    }
                    None => None,
                }
            };
            // The borrow is released before the callback runs, so callbacks
            // are free to schedule and cancel further events.
            match next {
                Some((_, callback)) => {
                    callback();
                    fired += 1;
                }
                None => break,
            }
        }

        let mut state = self.state.borrow_mut();
        if deadline > state.now {
            state.now = deadline;
        }
        fired
    }
}
