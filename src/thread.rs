//! The suspension bridge: the adapter between the primitives above and
//! the low-level `suspend`/`timedsuspend`/`restart` facility LinuxThreads
//! builds its synchronization primitives on.
//!
//! This crate ships one concrete backend, built on
//! [`std::sync::Condvar`] rather than raw thread parking, because the
//! timed variants need to reliably distinguish "woken by a restart"
//! from "woken because the deadline passed" — `std::thread::park_timeout`
//! cannot make that distinction on its own (its return value says
//! nothing about which happened), while `Condvar::wait_timeout`'s
//! `WaitTimeoutResult` can. Every waiting thread gets its own [`Parker`],
//! looked up through thread-local storage, so `restart` can target a
//! specific thread by identity the same way `restart(thr)` does in the
//! original.

use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;

/// A thread identity, stable for the lifetime of the thread.
///
/// Assigned lazily on first use from a process-wide counter; a stable
/// id substitutes for comparing raw thread descriptors by pointer
/// identity, as POSIX implementations typically do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadId(u64);

impl ThreadId {
    #[cfg(test)]
    pub(crate) fn for_test(raw: u64) -> Self {
        ThreadId(raw)
    }
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THIS_ID: ThreadId = ThreadId(NEXT_ID.fetch_add(1, Ordering::Relaxed));
    static THIS_PARKER: Arc<Parker> = Arc::new(Parker::new());
}

/// The outcome of a timed suspend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SuspendOutcome {
    /// A matching `restart` was observed before the deadline.
    Woken,
    /// The deadline elapsed with no matching `restart`.
    TimedOut,
}

/// Per-thread wake primitive. One restart unparks exactly one suspend,
/// mirroring the "each suspend consumes exactly one restart" contract.
struct Parker {
    woken: Mutex<bool>,
    cv: Condvar,
}

impl Parker {
    fn new() -> Self {
        Self {
            woken: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn suspend(&self) {
        let mut woken = self.woken.lock().unwrap();
        while !*woken {
            woken = self.cv.wait(woken).unwrap();
        }
        *woken = false;
    }

    fn timedsuspend(&self, deadline: Instant) -> SuspendOutcome {
        let mut woken = self.woken.lock().unwrap();
        loop {
            if *woken {
                *woken = false;
                return SuspendOutcome::Woken;
            }
            let now = Instant::now();
            if now >= deadline {
                return SuspendOutcome::TimedOut;
            }
            let (next, timeout) = self.cv.wait_timeout(woken, deadline - now).unwrap();
            woken = next;
            if *woken {
                *woken = false;
                return SuspendOutcome::Woken;
            }
            if timeout.timed_out() {
                return SuspendOutcome::TimedOut;
            }
            // Spurious wake with neither condition met: loop and
            // recompute the remaining duration.
        }
    }

    fn restart(&self) {
        let mut woken = self.woken.lock().unwrap();
        *woken = true;
        self.cv.notify_one();
    }
}

/// A thread descriptor as seen by the wait-queue substrate: an identity
/// plus a handle capable of restarting it.
///
/// Cheap to clone (an `Arc` clone); queues store this directly rather
/// than a raw thread reference, since a primitive's wait queue may
/// outlive any particular borrow of the waiting thread's stack frame.
#[derive(Debug, Clone)]
pub(crate) struct Waiter {
    id: ThreadId,
    parker: Arc<Parker>,
}

impl Waiter {
    /// Returns the waiter handle for the calling thread.
    pub(crate) fn current() -> Self {
        let id = THIS_ID.with(|id| *id);
        let parker = THIS_PARKER.with(Arc::clone);
        Waiter { id, parker }
    }

    #[cfg(test)]
    pub(crate) fn for_test(id: ThreadId) -> Self {
        Waiter {
            id,
            parker: Arc::new(Parker::new()),
        }
    }

    pub(crate) fn id(&self) -> ThreadId {
        self.id
    }

    /// Makes the pending (or next) `suspend` on this waiter return.
    pub(crate) fn restart(&self) {
        self.parker.restart();
    }
}

/// Blocks the calling thread until a matching [`Waiter::restart`].
///
/// Not a cancellation point: neither the barrier wait nor the untimed
/// rwlock acquisitions are cancellation points, matching POSIX.
pub(crate) fn suspend() {
    THIS_PARKER.with(|p| p.suspend());
}

/// Blocks the calling thread until a matching [`Waiter::restart`] or
/// `deadline`, whichever comes first.
pub(crate) fn timedsuspend(deadline: Instant) -> SuspendOutcome {
    THIS_PARKER.with(|p| p.timedsuspend(deadline))
}

/// Marks that the calling thread is inside a timed wait, so that an
/// embedder's cancellation path could identify and extricate it.
///
/// This crate does not implement an external cancellation subsystem;
/// the timed lock variants already perform their own extrication on
/// timeout, so this guard exists to keep the install/clear boundary
/// explicit and give a future cancellation integration a seam to hook
/// into, rather than to drive behavior on its own.
pub(crate) struct ExtricateGuard;

thread_local! {
    static EXTRICATING: Cell<bool> = const { Cell::new(false) };
}

impl ExtricateGuard {
    /// Installs the extrication marker for the duration of a timed
    /// wait; cleared automatically on drop.
    pub(crate) fn install() -> Self {
        EXTRICATING.with(|c| c.set(true));
        ExtricateGuard
    }
}

impl Drop for ExtricateGuard {
    fn drop(&mut self) {
        EXTRICATING.with(|c| c.set(false));
    }
}

/// Per-thread scratch space owned by the readlock-tracking component.
/// Accessed only by the owning thread, so it needs no locking of its
/// own.
pub(crate) fn with_readlock_state<R>(
    f: impl FnOnce(&mut crate::rwlock::readlock::ReadlockState) -> R,
) -> R {
    thread_local! {
        static STATE: RefCell<crate::rwlock::readlock::ReadlockState> =
            RefCell::new(crate::rwlock::readlock::ReadlockState::default());
    }
    STATE.with(|s| f(&mut s.borrow_mut()))
}
