//! Read-write lock state and policy engine.
//!
//! Ported from LinuxThreads' `rwlock.c`: the admission predicate
//! (`can_read`), the four preference kinds, and the wake-up rules on
//! unlock are all carried over verbatim in behavior; see `DESIGN.md`
//! for the handful of storage- and API-shape differences (RAII guards
//! instead of an explicit `unlock()`, a `Vec`-backed readlock list
//! instead of an intrusive linked list).

pub(crate) mod readlock;

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

use spin::Mutex;

use crate::attr::{RwLockAttr, RwLockKind};
use crate::error::{Error, Result};
use crate::queue::WaitQueue;
use crate::thread::{self, ExtricateGuard, SuspendOutcome, ThreadId, Waiter};

#[cfg(feature = "log")]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        log::trace!($($arg)*)
    };
}
#[cfg(not(feature = "log"))]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}

struct State {
    readers: u32,
    writer: Option<ThreadId>,
    read_waiting: WaitQueue,
    write_waiting: WaitQueue,
    kind: RwLockKind,
}

impl State {
    /// Whether a read-lock request is admitted immediately.
    fn can_read(&self, have_already: bool) -> bool {
        if self.writer.is_some() {
            return false;
        }
        if self.kind == RwLockKind::PreferReader {
            return true;
        }
        if self.write_waiting.is_empty() {
            return true;
        }
        have_already
    }
}

/// A reader-writer lock that allows multiple readers or a single writer
/// at a time, with a configurable preference policy between them.
///
/// Unlike `std::sync::RwLock`, the preference between readers and
/// writers is explicit and controllable via [`RwLockAttr`] rather than
/// left to the host OS, and a thread may recursively reacquire a read
/// lock it already holds even under writer preference (see
/// [`RwLockKind`]).
pub struct RwLock<T: ?Sized> {
    attr: RwLockAttr,
    state: Mutex<State>,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for RwLock<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for RwLock<T> {}

impl<T> RwLock<T> {
    /// Creates a new lock, unlocked, with the default preference kind
    /// (`PreferWriter`) and process-private sharing.
    pub fn new(data: T) -> Self {
        Self::with_attr(RwLockAttr::new(), data)
    }

    /// Creates a new lock with the given attributes.
    pub fn with_attr(attr: RwLockAttr, data: T) -> Self {
        Self {
            attr,
            state: Mutex::new(State {
                readers: 0,
                writer: None,
                read_waiting: WaitQueue::new(),
                write_waiting: WaitQueue::new(),
                kind: attr.kind(),
            }),
            data: UnsafeCell::new(data),
        }
    }

    /// Consumes the lock, returning the wrapped data.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> RwLock<T> {
    /// Returns the attributes this lock was created with.
    pub fn attr(&self) -> RwLockAttr {
        self.attr
    }

    fn lock_id(&self) -> usize {
        &self.state as *const Mutex<State> as usize
    }

    /// Acquires the lock for read access, blocking until it is granted.
    ///
    /// Not a cancellation point.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        let tracking = readlock::Tracking::prepare(self.lock_id(), self.attr.kind());
        loop {
            let mut state = self.state.lock();
            if state.can_read(tracking.have_already()) {
                state.readers += 1;
                break;
            }
            state.read_waiting.enqueue(Waiter::current());
            drop(state);
            thread::suspend();
        }
        tracking.finish();
        RwLockReadGuard { lock: self }
    }

    /// Attempts to acquire the lock for read access without blocking.
    ///
    /// Per the Single Unix Specification, a recursive hold does not
    /// help here: `have_already` is hard-coded to `false`, so a thread
    /// that already holds the lock for reading still fails with
    /// [`Error::Busy`] if a writer is queued.
    pub fn try_read(&self) -> Result<RwLockReadGuard<'_, T>> {
        let tracking = readlock::Tracking::prepare(self.lock_id(), self.attr.kind());
        let mut state = self.state.lock();
        if state.can_read(false) {
            state.readers += 1;
            drop(state);
            tracking.finish();
            Ok(RwLockReadGuard { lock: self })
        } else {
            Err(Error::Busy)
        }
    }

    /// Acquires the lock for read access, blocking until it is granted
    /// or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TimedOut`] if the deadline passes first.
    pub fn read_timeout(&self, timeout: Duration) -> Result<RwLockReadGuard<'_, T>> {
        let deadline = Instant::now() + timeout;
        let tracking = readlock::Tracking::prepare(self.lock_id(), self.attr.kind());
        let _extricating = ExtricateGuard::install();

        loop {
            let mut state = self.state.lock();
            if state.can_read(tracking.have_already()) {
                state.readers += 1;
                break;
            }
            state.read_waiting.enqueue(Waiter::current());
            drop(state);

            match thread::timedsuspend(deadline) {
                SuspendOutcome::Woken => continue,
                SuspendOutcome::TimedOut => {
                    let removed = self.state.lock().read_waiting.remove(Waiter::current().id());
                    if removed {
                        return Err(Error::TimedOut);
                    }
                    // A restart was already in flight when the timer
                    // fired; it removed us from the queue first, so
                    // consume the outstanding restart rather than lose
                    // it, then retry admission.
                    thread::suspend();
                }
            }
        }
        tracking.finish();
        Ok(RwLockReadGuard { lock: self })
    }

    /// Acquires the lock for write access, blocking until it is
    /// granted.
    ///
    /// Not a cancellation point.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        loop {
            let mut state = self.state.lock();
            if state.readers == 0 && state.writer.is_none() {
                state.writer = Some(Waiter::current().id());
                break;
            }
            state.write_waiting.enqueue(Waiter::current());
            drop(state);
            thread::suspend();
        }
        RwLockWriteGuard { lock: self }
    }

    /// Attempts to acquire the lock for write access without blocking.
    pub fn try_write(&self) -> Result<RwLockWriteGuard<'_, T>> {
        let mut state = self.state.lock();
        if state.readers == 0 && state.writer.is_none() {
            state.writer = Some(Waiter::current().id());
            Ok(RwLockWriteGuard { lock: self })
        } else {
            Err(Error::Busy)
        }
    }

    /// Acquires the lock for write access, blocking until it is granted
    /// or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TimedOut`] if the deadline passes first.
    pub fn write_timeout(&self, timeout: Duration) -> Result<RwLockWriteGuard<'_, T>> {
        let deadline = Instant::now() + timeout;
        let _extricating = ExtricateGuard::install();

        loop {
            let mut state = self.state.lock();
            if state.readers == 0 && state.writer.is_none() {
                state.writer = Some(Waiter::current().id());
                return Ok(RwLockWriteGuard { lock: self });
            }
            state.write_waiting.enqueue(Waiter::current());
            drop(state);

            match thread::timedsuspend(deadline) {
                SuspendOutcome::Woken => continue,
                SuspendOutcome::TimedOut => {
                    let removed = self
                        .state
                        .lock()
                        .write_waiting
                        .remove(Waiter::current().id());
                    if removed {
                        return Err(Error::TimedOut);
                    }
                    thread::suspend();
                }
            }
        }
    }

    fn unlock_write(&self) {
        let mut state = self.state.lock();
        state.writer = None;

        let prefer_readers_waiting =
            state.kind == RwLockKind::PreferReader && !state.read_waiting.is_empty();

        if prefer_readers_waiting {
            let drained = state.read_waiting.drain_all();
            drop(state);
            trace_log!("rwlock {:p}: unlock draining {} readers", self, drained.len());
            for waiter in drained {
                waiter.restart();
            }
            return;
        }

        if let Some(writer) = state.write_waiting.dequeue() {
            drop(state);
            trace_log!("rwlock {:p}: unlock restarting one writer", self);
            writer.restart();
            return;
        }

        let drained = state.read_waiting.drain_all();
        drop(state);
        trace_log!("rwlock {:p}: unlock draining {} readers", self, drained.len());
        for waiter in drained {
            waiter.restart();
        }
    }

    fn unlock_read(&self) {
        let next_writer = {
            let mut state = self.state.lock();
            state.readers -= 1;
            if state.readers == 0 {
                state.write_waiting.dequeue()
            } else {
                None
            }
        };
        if let Some(writer) = next_writer {
            trace_log!("rwlock {:p}: last reader releasing, waking writer", self);
            writer.restart();
        }
        readlock::release(self.lock_id(), self.attr.kind());
    }

    /// Destroys the lock, failing if it is currently held or has
    /// waiters that could still become holders.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] (and does not consume `self`) if any
    /// readers or a writer currently hold the lock.
    pub fn destroy(self) -> core::result::Result<T, (Self, Error)> {
        let busy = {
            let state = self.state.lock();
            state.readers > 0 || state.writer.is_some()
        };
        if busy {
            Err((self, Error::Busy))
        } else {
            Ok(self.data.into_inner())
        }
    }
}

/// RAII guard granting shared read access to an [`RwLock`]'s data.
#[must_use = "if unused the RwLock will immediately unlock"]
pub struct RwLockReadGuard<'a, T: ?Sized> {
    lock: &'a RwLock<T>,
}

impl<T: ?Sized> Deref for RwLockReadGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for RwLockReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.unlock_read();
    }
}

/// RAII guard granting exclusive write access to an [`RwLock`]'s data.
#[must_use = "if unused the RwLock will immediately unlock"]
pub struct RwLockWriteGuard<'a, T: ?Sized> {
    lock: &'a RwLock<T>,
}

impl<T: ?Sized> Deref for RwLockWriteGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for RwLockWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for RwLockWriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.unlock_write();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn attr(kind: RwLockKind) -> RwLockAttr {
        let mut a = RwLockAttr::new();
        a.set_kind(kind);
        a
    }

    #[test]
    fn single_threaded_exclusion() {
        let lock = RwLock::new(());
        let w = lock.write();
        assert!(lock.try_read().is_err());
        assert!(lock.try_write().is_err());
        drop(w);

        let _r1 = lock.read();
        let _r2 = lock.read();
        assert!(lock.try_write().is_err());
    }

    #[test]
    fn writer_preference_blocks_later_readers() {
        // Writer preference: a reader queued behind a pending writer
        // must not be admitted ahead of it.
        let lock = Arc::new(RwLock::with_attr(attr(RwLockKind::PreferWriter), 0u32));

        let r1 = lock.read();

        let l = lock.clone();
        let w1 = thread::spawn(move || {
            let mut g = l.write();
            *g += 1;
        });
        thread::sleep(Duration::from_millis(30));

        // A fresh reader must not jump the queued writer.
        assert!(lock.try_read().is_err());

        drop(r1);
        w1.join().unwrap();
        assert_eq!(*lock.read(), 1);
    }

    #[test]
    fn recursive_read_under_writer_preference_makes_progress() {
        // A thread already holding the read lock may reacquire it
        // recursively even with a writer queued.
        let lock = Arc::new(RwLock::with_attr(attr(RwLockKind::PreferWriter), 0u32));

        let r1a = lock.read();
        let l = lock.clone();
        let w1 = thread::spawn(move || {
            let mut g = l.write();
            *g += 1;
        });
        thread::sleep(Duration::from_millis(30));

        let r1b = lock.read();

        drop(r1a);
        drop(r1b);
        w1.join().unwrap();
        assert_eq!(*lock.read(), 1);
    }

    #[test]
    fn tryread_refuses_recursive_jump() {
        // try_read must not take the recursive-read shortcut: it treats
        // have_already as false even for a thread that already holds the
        // lock, so it still refuses to jump a queued writer.
        let lock = Arc::new(RwLock::with_attr(attr(RwLockKind::PreferWriter), 0u32));
        let r1 = lock.read();

        let l = lock.clone();
        let w1 = thread::spawn(move || {
            let _ = l.write();
        });
        thread::sleep(Duration::from_millis(30));

        assert!(lock.try_read().is_err());

        drop(r1);
        w1.join().unwrap();
    }

    #[test]
    fn reader_preference_drains_readers_before_writer() {
        // Reader preference admits a new reader even with a writer queued.
        let lock = Arc::new(RwLock::with_attr(attr(RwLockKind::PreferReader), 0u32));
        let r1 = lock.read();

        let l = lock.clone();
        let w1 = thread::spawn(move || {
            let mut g = l.write();
            *g += 1;
        });
        thread::sleep(Duration::from_millis(30));

        let r2 = lock.read();

        drop(r1);
        drop(r2);
        w1.join().unwrap();
        assert_eq!(*lock.read(), 1);
    }

    #[test]
    fn timed_write_lock_times_out_and_leaves_queue_clean() {
        // A timed write acquisition that times out must leave no trace in
        // the write-waiting queue.
        let lock = Arc::new(RwLock::new(0u32));
        let w0 = lock.write();

        let l = lock.clone();
        let outcome = thread::spawn(move || l.write_timeout(Duration::from_millis(50)))
            .join()
            .unwrap();
        assert_eq!(outcome.err(), Some(Error::TimedOut));

        drop(w0);
        // No one should have been left registered to wake spuriously.
        assert!(lock.try_write().is_ok());
    }

    #[test]
    fn read_unlock_without_holding_is_rejected_by_type_system() {
        // There is no bare `unlock()` to misuse in the RAII API; a
        // read release can only happen through a live `RwLockReadGuard`,
        // so the POSIX `EPERM` case is structurally
        // unreachable here rather than runtime-checked. Exercised
        // instead: write unlock by a non-owner is likewise prevented by
        // construction (`RwLockWriteGuard` cannot be fabricated).
        let lock = RwLock::new(0);
        let g = lock.write();
        drop(g);
        assert!(lock.try_write().is_ok());
    }

    #[test]
    fn stress_many_readers_and_writers_never_overlap() {
        use rand::Rng;

        const READ_THREADS: usize = 10;
        const WRITE_THREADS: usize = 2;
        const WRITE_MARK: usize = 1 << 31;

        let lock = Arc::new(RwLock::new(0usize));

        let readers: Vec<_> = (0..READ_THREADS)
            .map(|_| {
                let lock = lock.clone();
                thread::spawn(move || {
                    let mut rng = rand::thread_rng();
                    for _ in 0..100 {
                        let held = lock.read();
                        assert_eq!(*held & WRITE_MARK, 0);
                        thread::sleep(Duration::from_millis(rng.gen_range(1..3)));
                        drop(held);
                        thread::yield_now();
                    }
                })
            })
            .collect();

        let writers: Vec<_> = (0..WRITE_THREADS)
            .map(|_| {
                let lock = lock.clone();
                thread::spawn(move || {
                    let mut rng = rand::thread_rng();
                    for _ in 0..100 {
                        let mut held = lock.write();
                        assert_eq!(*held & WRITE_MARK, 0);
                        *held |= WRITE_MARK;
                        thread::sleep(Duration::from_millis(rng.gen_range(1..3)));
                        *held &= !WRITE_MARK;
                        drop(held);
                        thread::yield_now();
                    }
                })
            })
            .collect();

        for t in readers {
            t.join().unwrap();
        }
        for t in writers {
            t.join().unwrap();
        }
    }
}
