//! N-way rendezvous barrier.
//!
//! Ported from LinuxThreads' `pthread_barrier_wait`: the `required`-th
//! arrival snapshots and clears the wait queue before releasing the
//! internal lock, then drains the snapshot with `restart` outside the
//! critical section, so the next cycle can start building its own
//! queue immediately.

use std::collections::VecDeque;

use spin::Mutex;

use crate::attr::BarrierAttr;
use crate::error::{Error, Result};
use crate::queue::WaitQueue;
use crate::thread::Waiter;

struct State {
    required: u32,
    present: u32,
    waiting: WaitQueue,
}

/// An N-way rendezvous point, reusable across an arbitrary number of
/// cycles.
///
/// `wait` is **not** a cancellation point: a thread blocked in `wait`
/// ignores cancellation requests for the duration of the call, matching
/// the POSIX barrier specification this crate is modeled on.
pub struct Barrier {
    attr: BarrierAttr,
    state: Mutex<State>,
}

/// The result of a completed [`Barrier::wait`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierWaitResult {
    /// Returned to exactly one caller per completed cycle.
    Serial,
    /// Returned to the other `required - 1` callers of a completed
    /// cycle.
    Ordinary,
}

impl BarrierWaitResult {
    /// `true` for the one distinguished caller of a cycle.
    pub fn is_serial(self) -> bool {
        matches!(self, BarrierWaitResult::Serial)
    }
}

impl Barrier {
    /// Creates a barrier requiring `count` arrivals per cycle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `count == 0`.
    pub fn new(count: u32) -> Result<Self> {
        Self::with_attr(BarrierAttr::new(), count)
    }

    /// Creates a barrier with the given attributes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `count == 0`.
    pub fn with_attr(attr: BarrierAttr, count: u32) -> Result<Self> {
        if count == 0 {
            return Err(Error::InvalidArgument);
        }
        Ok(Self {
            attr,
            state: Mutex::new(State {
                required: count,
                present: 0,
                waiting: WaitQueue::new(),
            }),
        })
    }

    /// Returns the attributes this barrier was created with.
    pub fn attr(&self) -> BarrierAttr {
        self.attr
    }

    /// Blocks until `required` threads (across however many have called
    /// `wait` since the last cycle completed) have all arrived.
    ///
    /// Exactly one caller per completed cycle receives
    /// [`BarrierWaitResult::Serial`]; the rest receive
    /// [`BarrierWaitResult::Ordinary`]. The barrier is immediately ready
    /// for a new cycle once a cycle completes; no reinitialization is
    /// required.
    pub fn wait(&self) -> BarrierWaitResult {
        let mut drain: Option<VecDeque<Waiter>> = None;
        let result = {
            let mut state = self.state.lock();
            if state.present >= state.required - 1 {
                drain = Some(state.waiting.drain_all());
                state.present = 0;
                BarrierWaitResult::Serial
            } else {
                state.present += 1;
                state.waiting.enqueue(Waiter::current());
                BarrierWaitResult::Ordinary
            }
        };

        match result {
            BarrierWaitResult::Serial => {
                for waiter in drain.expect("serial caller always produces a drain snapshot") {
                    waiter.restart();
                }
                BarrierWaitResult::Serial
            }
            BarrierWaitResult::Ordinary => {
                crate::thread::suspend();
                BarrierWaitResult::Ordinary
            }
        }
    }

    /// Destroys the barrier, failing if any thread is currently waiting
    /// in [`Barrier::wait`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] (and does not consume `self`) if the
    /// barrier has waiters. Plain [`Drop`] is always safe to rely on
    /// instead when that can't happen by construction (e.g. no other
    /// thread can reach this barrier any more).
    pub fn destroy(self) -> core::result::Result<(), (Self, Error)> {
        if self.state.lock().waiting.is_empty() {
            Ok(())
        } else {
            Err((self, Error::Busy))
        }
    }
}
