//! Barrier and read-write lock primitives for a user-space threading
//! library.
//!
//! Two primitives are provided:
//!
//! - [`Barrier`]: an N-way rendezvous point, reusable across cycles.
//! - [`RwLock`]: a reader-writer lock with a configurable preference
//!   policy between readers and writers ([`RwLockKind`]), including
//!   recursive read-lock reacquisition under writer preference.
//!
//! Both are ported from LinuxThreads' `barrier.c` and `rwlock.c`, kept
//! close to the original admission and wake-up policy while trading the
//! C API's explicit `init`/`destroy`/`unlock` calls and integer error
//! codes for RAII guards and a [`enum@Error`] type.
//!
//! The `log` feature enables low-volume tracing of wake-up decisions
//! through the [`log`] facade; it is off by default so this crate stays
//! silent unless an embedder opts in.

mod attr;
mod barrier;
mod error;
mod queue;
mod rwlock;
mod thread;

pub use attr::{BarrierAttr, Pshared, RwLockAttr, RwLockKind};
pub use barrier::{Barrier, BarrierWaitResult};
pub use error::{Error, Result};
pub use rwlock::{RwLock, RwLockReadGuard, RwLockWriteGuard};
