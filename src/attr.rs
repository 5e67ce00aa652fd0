//! Attribute objects: plain carriers of `kind` (rwlock only) and
//! `pshared` (both primitives). Only the attribute semantics that
//! change primitive behavior are modeled; there is no process-shared
//! memory layout support.

use crate::error::{Error, Result};

/// Process-sharing mode requested for a primitive.
///
/// Mirrors `PTHREAD_PROCESS_PRIVATE`/`PTHREAD_PROCESS_SHARED`. Only
/// `Private` is actually supported by this crate; requesting `Shared`
/// on an [`RwLockAttr`] fails with [`Error::NotSupported`], matching
/// `pthread_rwlockattr_setpshared`'s `ENOSYS` for anything but
/// process-private.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pshared {
    /// Visible only within the creating process. The default.
    #[default]
    Private,
    /// Visible across processes sharing the primitive's memory.
    Shared,
}

/// Reader/writer preference policy for an [`RwLock`](crate::rwlock::RwLock).
///
/// See the admission predicate in [`crate::rwlock`] for how each kind
/// changes read-lock admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RwLockKind {
    /// Readers are always admitted unless a writer currently holds the
    /// lock, even if writers are queued. Can starve writers.
    PreferReader,
    /// Readers queue behind any waiting writer, except a thread that
    /// already holds the lock for reading (recursive-read concession).
    #[default]
    PreferWriter,
    /// As `PreferWriter`, but without the recursive-read concession;
    /// reacquiring a held read lock while a writer waits will block.
    PreferWriterNonrecursive,
    /// Implementation-chosen default, matching `PTHREAD_RWLOCK_DEFAULT_NP`
    /// in LinuxThreads. This is *not* the same as `PreferWriter`: the
    /// recursive-read concession is keyed on `PreferWriter` alone, so a
    /// `Default`-kind lock behaves like `PreferWriterNonrecursive`, and
    /// a recursive reacquisition can still block behind a waiting
    /// writer.
    Default,
}

impl RwLockKind {
    /// `true` only for `PreferWriter`, the one kind that performs
    /// recursive-read tracking; `Default`, `PreferWriterNonrecursive`,
    /// and `PreferReader` never consult or maintain the per-thread
    /// tracking list.
    pub(crate) fn tracks_recursive_reads(self) -> bool {
        matches!(self, RwLockKind::PreferWriter)
    }
}

impl TryFrom<u32> for RwLockKind {
    type Error = Error;

    /// Converts from the four `PTHREAD_RWLOCK_*_NP`-style integer
    /// values used by the original `_np` attribute accessors; any other
    /// value is rejected.
    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(RwLockKind::PreferReader),
            1 => Ok(RwLockKind::PreferWriter),
            2 => Ok(RwLockKind::PreferWriterNonrecursive),
            3 => Ok(RwLockKind::Default),
            _ => Err(Error::InvalidArgument),
        }
    }
}

/// Attribute object for [`RwLock`](crate::rwlock::RwLock) initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RwLockAttr {
    kind: RwLockKind,
    pshared: Pshared,
}

impl RwLockAttr {
    /// Creates an attribute set with the default kind and process-private
    /// sharing, matching `pthread_rwlockattr_init`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the configured preference kind.
    pub fn kind(&self) -> RwLockKind {
        self.kind
    }

    /// Sets the preference kind.
    pub fn set_kind(&mut self, kind: RwLockKind) {
        self.kind = kind;
    }

    /// Returns the configured process-sharing mode.
    pub fn pshared(&self) -> Pshared {
        self.pshared
    }

    /// Sets the process-sharing mode.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] for [`Pshared::Shared`]: this
    /// crate does not implement process-shared memory layout for
    /// read-write locks.
    pub fn set_pshared(&mut self, pshared: Pshared) -> Result<()> {
        if pshared != Pshared::Private {
            return Err(Error::NotSupported);
        }
        self.pshared = pshared;
        Ok(())
    }

    /// Releases any resources held by the attribute object.
    ///
    /// A no-op: `RwLockAttr` holds no resources of its own. Kept for
    /// symmetry with `pthread_rwlockattr_destroy`, which callers expect
    /// to pair with `new` even though it never fails.
    pub fn destroy(self) {}
}

/// Attribute object for [`Barrier`](crate::barrier::Barrier) initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BarrierAttr {
    pshared: Pshared,
}

impl BarrierAttr {
    /// Creates an attribute set with process-private sharing, matching
    /// `pthread_barrierattr_init`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the configured process-sharing mode.
    pub fn pshared(&self) -> Pshared {
        self.pshared
    }

    /// Sets the process-sharing mode.
    ///
    /// Unlike [`RwLockAttr::set_pshared`], both values are accepted:
    /// `pthread_barrierattr_setpshared` validates but does not reject
    /// `PTHREAD_PROCESS_SHARED` in the original.
    pub fn set_pshared(&mut self, pshared: Pshared) {
        self.pshared = pshared;
    }

    /// Releases any resources held by the attribute object.
    ///
    /// A no-op: `BarrierAttr` holds no resources of its own. Kept for
    /// symmetry with `pthread_barrierattr_destroy`, which callers expect
    /// to pair with `new` even though it never fails.
    pub fn destroy(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rwlock_attr_defaults_to_prefer_writer_private() {
        let attr = RwLockAttr::new();
        assert_eq!(attr.kind(), RwLockKind::PreferWriter);
        assert_eq!(attr.pshared(), Pshared::Private);
    }

    #[test]
    fn rwlock_attr_rejects_process_shared() {
        let mut attr = RwLockAttr::new();
        assert_eq!(attr.set_pshared(Pshared::Shared), Err(Error::NotSupported));
        assert_eq!(attr.pshared(), Pshared::Private);
    }

    #[test]
    fn barrier_attr_accepts_process_shared() {
        let mut attr = BarrierAttr::new();
        attr.set_pshared(Pshared::Shared);
        assert_eq!(attr.pshared(), Pshared::Shared);
    }

    #[test]
    fn kind_try_from_rejects_out_of_range() {
        assert_eq!(RwLockKind::try_from(0), Ok(RwLockKind::PreferReader));
        assert_eq!(RwLockKind::try_from(3), Ok(RwLockKind::Default));
        assert_eq!(RwLockKind::try_from(4), Err(Error::InvalidArgument));
    }

    #[test]
    fn only_prefer_writer_tracks_recursive_reads() {
        assert!(RwLockKind::PreferWriter.tracks_recursive_reads());
        assert!(!RwLockKind::Default.tracks_recursive_reads());
        assert!(!RwLockKind::PreferWriterNonrecursive.tracks_recursive_reads());
        assert!(!RwLockKind::PreferReader.tracks_recursive_reads());
    }

    #[test]
    fn attr_destroy_consumes_without_panicking() {
        RwLockAttr::new().destroy();
        BarrierAttr::new().destroy();
    }
}
