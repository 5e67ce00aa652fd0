//! Recursive-read tracking: per-thread bookkeeping that lets a thread
//! reacquire a read lock it already holds without being blocked behind
//! a waiting writer under writer-preference kinds.
//!
//! Ported from LinuxThreads' `rwlock_is_in_list`/`rwlock_add_to_list`/
//! `rwlock_remove_from_list`/`rwlock_have_already`. The original chains
//! nodes into a per-thread intrusive linked list with a free-list for
//! reuse; this crate uses a plain `Vec` instead (see `DESIGN.md` for
//! why that is an equivalent storage choice, not a behavior change),
//! but keeps the allocation-failure fallback to `untracked_count` as a
//! real (if practically unreachable) code path via `Vec::try_reserve`.

use crate::attr::RwLockKind;
use crate::thread::with_readlock_state;

struct ReadlockInfo {
    lock_id: usize,
    count: u32,
}

/// Per-thread state: currently-held read locks, plus a count of read
/// locks for which no tracking node could be allocated.
#[derive(Default)]
pub(crate) struct ReadlockState {
    held: Vec<ReadlockInfo>,
    untracked_count: u32,
}

impl ReadlockState {
    fn find(&self, lock_id: usize) -> Option<usize> {
        self.held.iter().position(|info| info.lock_id == lock_id)
    }
}

/// The outcome of consulting (and provisionally updating) a thread's
/// readlock tracking state before attempting to acquire a read lock.
///
/// Mirrors `rwlock_have_already`'s three-way result (existing node
/// found, new node allocated, allocation failed) packaged so the
/// eventual bookkeeping (`finish`) only needs to run once admission
/// has actually been granted.
pub(crate) struct Tracking {
    lock_id: usize,
    enabled: bool,
    have_already: bool,
    out_of_memory: bool,
}

impl Tracking {
    /// Computes `have_already` for `lock_id` under `kind`, allocating a
    /// fresh tracking node when this is a new acquisition. Tracking is
    /// skipped entirely for kinds that don't recognize recursive reads
    /// (`PreferReader`, `PreferWriterNonrecursive`), matching the
    /// original's `if (rwlock->__rw_kind == PTHREAD_RWLOCK_PREFER_WRITER_NP)`
    /// guard.
    pub(crate) fn prepare(lock_id: usize, kind: RwLockKind) -> Self {
        if !kind.tracks_recursive_reads() {
            return Tracking {
                lock_id,
                enabled: false,
                have_already: false,
                out_of_memory: false,
            };
        }

        with_readlock_state(|state| {
            if state.find(lock_id).is_some() || state.untracked_count > 0 {
                return Tracking {
                    lock_id,
                    enabled: true,
                    have_already: true,
                    out_of_memory: false,
                };
            }

            match state.held.try_reserve(1) {
                Ok(()) => {
                    // A freshly tracked lock already counts as one
                    // acquisition, matching rwlock_add_to_list setting
                    // pr_lock_count = 1 at creation time.
                    state.held.push(ReadlockInfo { lock_id, count: 1 });
                    Tracking {
                        lock_id,
                        enabled: true,
                        have_already: false,
                        out_of_memory: false,
                    }
                }
                Err(_) => Tracking {
                    lock_id,
                    enabled: true,
                    have_already: false,
                    out_of_memory: true,
                },
            }
        })
    }

    /// Whether this thread should be treated as already holding the
    /// lock for reading, for purposes of the admission predicate
    /// (`can_read`'s `have_already` parameter).
    pub(crate) fn have_already(&self) -> bool {
        self.have_already
    }

    /// Call once the read lock has actually been granted. A fresh
    /// tracking node already accounts for this acquisition at creation
    /// time, so this only has work to do for the recursive
    /// (`have_already`) and allocation-failure (`out_of_memory`) cases.
    pub(crate) fn finish(self) {
        if !self.enabled || !(self.have_already || self.out_of_memory) {
            return;
        }
        with_readlock_state(|state| {
            if let Some(idx) = state.find(self.lock_id) {
                state.held[idx].count += 1;
            } else {
                state.untracked_count += 1;
            }
        });
    }
}

/// Recursive-read unlock bookkeeping: decrements the tracking node for
/// `lock_id` (or `untracked_count` if there is none), removing the node
/// once its count reaches zero. A no-op for kinds that don't track
/// recursive reads.
pub(crate) fn release(lock_id: usize, kind: RwLockKind) {
    if !kind.tracks_recursive_reads() {
        return;
    }
    with_readlock_state(|state| {
        if let Some(idx) = state.find(lock_id) {
            state.held[idx].count -= 1;
            if state.held[idx].count == 0 {
                state.held.swap_remove(idx);
            }
        } else if state.untracked_count > 0 {
            state.untracked_count -= 1;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_acquisition_tracks_one_hold() {
        let t = Tracking::prepare(42, RwLockKind::PreferWriter);
        assert!(!t.have_already());
        t.finish();

        with_readlock_state(|state| {
            let idx = state.find(42).expect("node should exist");
            assert_eq!(state.held[idx].count, 1);
        });

        release(42, RwLockKind::PreferWriter);
        with_readlock_state(|state| assert!(state.find(42).is_none()));
    }

    #[test]
    fn recursive_acquisition_increments_existing_node() {
        let first = Tracking::prepare(7, RwLockKind::PreferWriter);
        assert!(!first.have_already());
        first.finish();

        let second = Tracking::prepare(7, RwLockKind::PreferWriter);
        assert!(second.have_already());
        second.finish();

        with_readlock_state(|state| {
            let idx = state.find(7).expect("node should exist");
            assert_eq!(state.held[idx].count, 2);
        });

        release(7, RwLockKind::PreferWriter);
        with_readlock_state(|state| {
            let idx = state.find(7).expect("one hold should remain");
            assert_eq!(state.held[idx].count, 1);
        });
        release(7, RwLockKind::PreferWriter);
        with_readlock_state(|state| assert!(state.find(7).is_none()));
    }

    #[test]
    fn prefer_reader_never_tracks() {
        let t = Tracking::prepare(99, RwLockKind::PreferReader);
        assert!(!t.have_already());
        t.finish();
        with_readlock_state(|state| assert!(state.find(99).is_none()));
    }
}
