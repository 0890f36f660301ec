//! Multi-version records.
//!
//! A [`VersionedRecord`] is the per-key cell stored in the index. It keeps up
//! to [`NUM_VERSIONS`] `(tid, value)` pairs in a ring buffer, newest last.
//!
//! # Concurrency Model
//!
//! The header word doubles as a seqlock:
//! 1. Readers: call [`stable_version`](VersionedRecord::stable_version), read
//!    the chain, then [`check_version`](VersionedRecord::check_version); retry
//!    on mismatch. Readers never block anyone.
//! 2. Writers: call [`lock`](VersionedRecord::lock) to get a [`RecordGuard`],
//!    append versions through it, let it drop. Dropping bumps the stamp and
//!    clears the lock bit.
//!
//! All protected state lives in atomics, so an optimistic read that races a
//! writer is discarded rather than undefined.

mod header;
mod slot;

pub use header::{HeaderWord, NUM_VERSIONS};

use crate::types::{Tid, Value};
use crossbeam_epoch::{self as epoch, Guard};
use slot::ValueSlot;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{fence, AtomicU64, Ordering};
use std::sync::Arc;

/// Exponential backoff for spin loops.
///
/// Each call to `spin()` executes `count+1` pause instructions, then doubles
/// the count (capped at 15).
struct Backoff {
    count: u32,
}

impl Backoff {
    const fn new() -> Self {
        Self { count: 0 }
    }

    fn spin(&mut self) {
        for _ in 0..=self.count {
            std::hint::spin_loop();
        }
        self.count = ((self.count << 1) | 1) & 15;
    }
}

/// One retained version of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionEntry {
    /// Commit tid that installed this version.
    pub tid: Tid,
    /// The value, or `None` if the key was deleted at `tid`.
    pub value: Option<Value>,
}

/// A fixed-capacity multi-version cell for one key.
///
/// Allocated cache-line aligned and shared through `Arc`; a record never moves
/// while reachable from the index.
#[repr(align(64))]
pub struct VersionedRecord {
    header: AtomicU64,
    versions: [AtomicU64; NUM_VERSIONS],
    values: [ValueSlot; NUM_VERSIONS],
}

impl VersionedRecord {
    /// Creates a record holding one deleted entry at [`Tid::MIN`].
    pub fn new() -> Self {
        Self {
            header: AtomicU64::new(HeaderWord::INITIAL.raw()),
            versions: std::array::from_fn(|_| AtomicU64::new(Tid::MIN.as_u64())),
            values: std::array::from_fn(|_| ValueSlot::empty()),
        }
    }

    /// Allocates a fresh shared record.
    pub fn alloc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Returns the current header word without synchronization.
    #[must_use]
    pub fn header(&self) -> HeaderWord {
        HeaderWord::from_raw(self.header.load(Ordering::Relaxed))
    }

    /// Whether some committer holds the lock.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.header().is_locked()
    }

    /// Number of retained versions.
    #[must_use]
    pub fn num_versions(&self) -> usize {
        self.header().count()
    }

    /// Acquires the record lock, spinning until it is free.
    ///
    /// There is no timeout; callers must keep critical sections short.
    pub fn lock(&self) -> RecordGuard<'_> {
        let mut backoff = Backoff::new();
        let mut current = self.header.load(Ordering::Relaxed);
        loop {
            let word = HeaderWord::from_raw(current);
            if word.is_locked() {
                backoff.spin();
                current = self.header.load(Ordering::Relaxed);
                continue;
            }
            match self.header.compare_exchange_weak(
                current,
                word.locked().raw(),
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
        // Chain mutations must not become visible before the lock bit.
        fence(Ordering::Release);

        RecordGuard {
            record: self,
            word: HeaderWord::from_raw(current).locked(),
            _marker: PhantomData,
        }
    }

    fn unlock(&self, word: HeaderWord) {
        debug_assert!(word.is_locked(), "unlock of a record that is not locked");
        debug_assert_eq!(self.header.load(Ordering::Relaxed), word.raw());
        self.header
            .store(word.unlocked_next().raw(), Ordering::Release);
    }

    /// Spins until the record is unlocked and returns that header snapshot.
    ///
    /// This is the seqlock read-begin step.
    pub fn stable_version(&self) -> HeaderWord {
        let mut backoff = Backoff::new();
        loop {
            let word = HeaderWord::from_raw(self.header.load(Ordering::Acquire));
            if !word.is_locked() {
                return word;
            }
            backoff.spin();
        }
    }

    /// Like [`stable_version`](Self::stable_version), but gives up after
    /// `spin_limit` observations of a locked header.
    pub fn stable_version_within(&self, spin_limit: u32) -> Option<HeaderWord> {
        let mut backoff = Backoff::new();
        for _ in 0..=spin_limit {
            let word = HeaderWord::from_raw(self.header.load(Ordering::Acquire));
            if !word.is_locked() {
                return Some(word);
            }
            backoff.spin();
        }
        None
    }

    /// Returns whether the header still equals `version`.
    ///
    /// This is the seqlock read-validate step.
    pub fn check_version(&self, version: HeaderWord) -> bool {
        fence(Ordering::Acquire);
        self.header.load(Ordering::Relaxed) == version.raw()
    }

    /// Runs `read` inside a seqlock bracket until it observes a stable chain.
    fn read_stable<R>(&self, read: impl Fn(HeaderWord, &Guard) -> R) -> R {
        let guard = epoch::pin();
        let mut retries = 0u32;
        loop {
            let version = self.stable_version();
            let result = read(version, &guard);
            if self.check_version(version) {
                if retries > 0 {
                    tracing::trace!(retries, "optimistic record read retried");
                }
                return result;
            }
            retries += 1;
        }
    }

    /// Bounded variant of [`read_stable`](Self::read_stable): `None` if the
    /// record stayed locked for more than `spin_limit` spins at some attempt.
    fn read_stable_within<R>(
        &self,
        spin_limit: u32,
        read: impl Fn(HeaderWord, &Guard) -> R,
    ) -> Option<R> {
        let guard = epoch::pin();
        loop {
            let version = self.stable_version_within(spin_limit)?;
            let result = read(version, &guard);
            if self.check_version(version) {
                return Some(result);
            }
        }
    }

    fn tid_at(&self, slot: usize) -> Tid {
        Tid::new(self.versions[slot].load(Ordering::Relaxed))
    }

    fn record_at_in(&self, word: HeaderWord, t: Tid, guard: &Guard) -> Option<VersionEntry> {
        // Snapshots are usually recent, so scan from the newest end.
        let n = word.count();
        debug_assert!(n > 0 && n <= NUM_VERSIONS);
        (0..n).rev().find_map(|i| {
            let slot = word.slot(i);
            let tid = self.tid_at(slot);
            (tid <= t).then(|| VersionEntry {
                tid,
                value: self.values[slot].load(guard),
            })
        })
    }

    /// Returns the newest version with tid `<= t`, without synchronization.
    ///
    /// `None` means every retained version is newer than `t`: the needed
    /// version was evicted, which is unknown rather than absent. Results are
    /// only meaningful between `stable_version` and `check_version`.
    pub fn record_at(&self, t: Tid) -> Option<VersionEntry> {
        let guard = epoch::pin();
        self.record_at_in(self.header(), t, &guard)
    }

    /// Reads the version visible at `t`, never returning a torn pair.
    ///
    /// Returns `None` if no retained version is `<= t`.
    pub fn stable_read(&self, t: Tid) -> Option<VersionEntry> {
        self.read_stable(|word, guard| self.record_at_in(word, t, guard))
    }

    fn is_latest_in(&self, word: HeaderWord, t: Tid) -> bool {
        let n = word.count();
        debug_assert!(n > 0 && n <= NUM_VERSIONS);
        self.tid_at(word.slot(n - 1)) <= t
    }

    /// True iff nothing newer than `t` has been installed.
    pub fn is_latest_version(&self, t: Tid) -> bool {
        self.is_latest_in(self.header(), t)
    }

    /// Synchronized [`is_latest_version`](Self::is_latest_version).
    pub fn stable_is_latest_version(&self, t: Tid) -> bool {
        self.read_stable(|word, _| self.is_latest_in(word, t))
    }

    fn is_snapshot_consistent_in(&self, word: HeaderWord, snapshot: Tid, commit: Tid) -> bool {
        let n = word.count();
        debug_assert!(n > 0 && n <= NUM_VERSIONS);

        // fast path
        if self.tid_at(word.slot(n - 1)) <= snapshot {
            return true;
        }

        // slow path: the newest entry was checked above
        for i in (0..n - 1).rev() {
            if self.tid_at(word.slot(i)) <= snapshot {
                // No conflict if the next modification after the version we
                // read lands after our commit tid.
                let next = self.tid_at(word.slot(i + 1));
                debug_assert_ne!(next, commit);
                return next > commit;
            }
        }

        // the version read at the snapshot was evicted
        false
    }

    /// Whether a read taken at `snapshot` is still valid for a commit at
    /// `commit`: no version was installed in `(snapshot, commit]`.
    ///
    /// Unsynchronized; callers either hold the lock or bracket the call.
    pub fn is_snapshot_consistent(&self, snapshot: Tid, commit: Tid) -> bool {
        self.is_snapshot_consistent_in(self.header(), snapshot, commit)
    }

    /// Synchronized [`is_snapshot_consistent`](Self::is_snapshot_consistent).
    pub fn stable_is_snapshot_consistent(&self, snapshot: Tid, commit: Tid) -> bool {
        self.read_stable(|word, _| self.is_snapshot_consistent_in(word, snapshot, commit))
    }

    /// Bounded [`stable_is_snapshot_consistent`](Self::stable_is_snapshot_consistent).
    ///
    /// Returns `None` if another committer kept the record locked for more
    /// than `spin_limit` spins.
    pub fn try_stable_is_snapshot_consistent(
        &self,
        snapshot: Tid,
        commit: Tid,
        spin_limit: u32,
    ) -> Option<bool> {
        self.read_stable_within(spin_limit, |word, _| {
            self.is_snapshot_consistent_in(word, snapshot, commit)
        })
    }

    /// Returns every retained version, oldest first.
    pub fn chain(&self) -> Vec<VersionEntry> {
        self.read_stable(|word, guard| {
            (0..word.count())
                .map(|i| {
                    let slot = word.slot(i);
                    VersionEntry {
                        tid: self.tid_at(slot),
                        value: self.values[slot].load(guard),
                    }
                })
                .collect()
        })
    }
}

impl Default for VersionedRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for VersionedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let word = self.header();
        let tids: Vec<u64> = (0..word.count())
            .map(|i| self.tid_at(word.slot(i)).as_u64())
            .collect();
        f.debug_struct("VersionedRecord")
            .field("header", &format_args!("{word}"))
            .field("versions", &tids)
            .finish_non_exhaustive()
    }
}

/// Proof that a record's lock is held.
///
/// Only [`VersionedRecord::lock`] creates guards. Dropping the guard publishes
/// the chain and releases the lock, also during unwinding.
#[must_use = "dropping the guard immediately releases the lock"]
pub struct RecordGuard<'a> {
    record: &'a VersionedRecord,
    word: HeaderWord,
    // Guards stay on the locking thread.
    _marker: PhantomData<*mut ()>,
}

impl RecordGuard<'_> {
    /// The locked record.
    #[must_use]
    pub fn record(&self) -> &VersionedRecord {
        self.record
    }

    /// Appends a version installed at `t`, evicting the oldest version when
    /// the ring is full.
    ///
    /// `t` must be greater than every retained version.
    pub fn write_record_at(&mut self, t: Tid, value: Option<Value>) {
        let word = self.word;
        let n = word.count();
        debug_assert!(n > 0 && n <= NUM_VERSIONS);
        debug_assert!(
            self.record.tid_at(word.slot(n - 1)) < t,
            "version {t} written out of order"
        );

        let (slot, next) = if n == NUM_VERSIONS {
            // drop oldest version
            let head = word.head();
            (head, word.with_head((head + 1) % NUM_VERSIONS))
        } else {
            (word.slot(n), word.with_count(n + 1))
        };

        let guard = epoch::pin();
        self.record.versions[slot].store(t.as_u64(), Ordering::Relaxed);
        self.record.values[slot].store(value, &guard);
        self.record.header.store(next.raw(), Ordering::Relaxed);
        self.word = next;
    }
}

impl Drop for RecordGuard<'_> {
    fn drop(&mut self) {
        self.record.unlock(self.word);
    }
}

impl fmt::Debug for RecordGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordGuard")
            .field("header", &format_args!("{}", self.word))
            .finish()
    }
}
