//! Database statistics.
//!
//! Relaxed atomic counters updated by the transaction manager. Counters are
//! monotonically increasing and may be read while transactions run.
//!
//! # Usage
//!
//! ```rust,ignore
//! use mvkv_core::Database;
//!
//! let db = Database::open_in_memory();
//! db.transaction(|txn| txn.put("k", "v"))?;
//!
//! let stats = db.stats();
//! println!("Commits: {}", stats.transactions_committed);
//! println!("Stale-read aborts: {}", stats.aborts_stale_read);
//! ```

use crate::error::AbortReason;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Database statistics and metrics.
#[derive(Debug, Default)]
pub struct DatabaseStats {
    // Operation counters
    /// Point reads that reached the index.
    reads: AtomicU64,
    /// Buffered puts.
    writes: AtomicU64,
    /// Buffered deletes.
    deletes: AtomicU64,
    /// Range scans.
    scans: AtomicU64,

    // Transaction counters
    transactions_started: AtomicU64,
    transactions_committed: AtomicU64,
    /// Commits that took the read-only fast path.
    read_only_commits: AtomicU64,
    /// Explicit `abort()` calls.
    transactions_aborted: AtomicU64,

    // Conflict counters
    aborts_stale_read: AtomicU64,
    aborts_phantom: AtomicU64,
    aborts_lock_contention: AtomicU64,

    /// Attempts re-run by `Database::transaction`.
    retries: AtomicU64,
}

impl DatabaseStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    // === Increment methods (internal use) ===

    pub(crate) fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_scan(&self) {
        self.scans.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transaction_start(&self) {
        self.transactions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transaction_commit(&self, read_only: bool) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
        if read_only {
            self.read_only_commits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_transaction_abort(&self) {
        self.transactions_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_conflict(&self, reason: &AbortReason) {
        let counter = match reason {
            AbortReason::StaleRead { .. } => &self.aborts_stale_read,
            AbortReason::Phantom { .. } => &self.aborts_phantom,
            AbortReason::LockContention { .. } => &self.aborts_lock_contention,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    // === Getter methods (public API) ===

    /// Returns the number of point reads that reached the index.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Returns the number of buffered puts.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Returns the number of buffered deletes.
    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    /// Returns the number of range scans.
    pub fn scans(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }

    /// Returns the number of transactions started.
    pub fn transactions_started(&self) -> u64 {
        self.transactions_started.load(Ordering::Relaxed)
    }

    /// Returns the number of transactions committed, read-only ones included.
    pub fn transactions_committed(&self) -> u64 {
        self.transactions_committed.load(Ordering::Relaxed)
    }

    /// Returns the number of read-only commits.
    pub fn read_only_commits(&self) -> u64 {
        self.read_only_commits.load(Ordering::Relaxed)
    }

    /// Returns the number of explicit aborts.
    pub fn transactions_aborted(&self) -> u64 {
        self.transactions_aborted.load(Ordering::Relaxed)
    }

    /// Returns the number of commits that failed validation, for any reason.
    pub fn conflicts(&self) -> u64 {
        self.aborts_stale_read.load(Ordering::Relaxed)
            + self.aborts_phantom.load(Ordering::Relaxed)
            + self.aborts_lock_contention.load(Ordering::Relaxed)
    }

    /// Returns the number of retried attempts.
    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            reads: self.reads(),
            writes: self.writes(),
            deletes: self.deletes(),
            scans: self.scans(),
            transactions_started: self.transactions_started(),
            transactions_committed: self.transactions_committed(),
            read_only_commits: self.read_only_commits(),
            transactions_aborted: self.transactions_aborted(),
            aborts_stale_read: self.aborts_stale_read.load(Ordering::Relaxed),
            aborts_phantom: self.aborts_phantom.load(Ordering::Relaxed),
            aborts_lock_contention: self.aborts_lock_contention.load(Ordering::Relaxed),
            retries: self.retries(),
        }
    }
}

/// A point-in-time snapshot of database statistics.
///
/// Unlike `DatabaseStats`, this is a plain struct that can be serialized,
/// compared, or passed across threads without atomics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    /// Point reads that reached the index.
    pub reads: u64,
    /// Buffered puts.
    pub writes: u64,
    /// Buffered deletes.
    pub deletes: u64,
    /// Range scans.
    pub scans: u64,
    /// Transactions started.
    pub transactions_started: u64,
    /// Transactions committed.
    pub transactions_committed: u64,
    /// Read-only commits.
    pub read_only_commits: u64,
    /// Explicit aborts.
    pub transactions_aborted: u64,
    /// Commits rejected because a read went stale.
    pub aborts_stale_read: u64,
    /// Commits rejected because a key appeared in an absent range.
    pub aborts_phantom: u64,
    /// Commits rejected because validation could not get past a lock.
    pub aborts_lock_contention: u64,
    /// Retried attempts.
    pub retries: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Key;

    #[test]
    fn default_stats_are_zero() {
        let stats = DatabaseStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn record_transactions() {
        let stats = DatabaseStats::new();

        stats.record_transaction_start();
        stats.record_transaction_start();
        stats.record_transaction_commit(false);
        stats.record_transaction_commit(true);
        stats.record_transaction_abort();

        assert_eq!(stats.transactions_started(), 2);
        assert_eq!(stats.transactions_committed(), 2);
        assert_eq!(stats.read_only_commits(), 1);
        assert_eq!(stats.transactions_aborted(), 1);
    }

    #[test]
    fn conflicts_are_counted_per_reason() {
        let stats = DatabaseStats::new();
        let key = Key::from("k");
        stats.record_conflict(&AbortReason::StaleRead { key: key.clone() });
        stats.record_conflict(&AbortReason::StaleRead { key: key.clone() });
        stats.record_conflict(&AbortReason::Phantom { key: key.clone() });
        stats.record_conflict(&AbortReason::LockContention { key });

        let snap = stats.snapshot();
        assert_eq!(snap.aborts_stale_read, 2);
        assert_eq!(snap.aborts_phantom, 1);
        assert_eq!(snap.aborts_lock_contention, 1);
        assert_eq!(stats.conflicts(), 4);
    }

    #[test]
    fn snapshot_serializes() {
        let stats = DatabaseStats::new();
        stats.record_read();
        stats.record_scan();
        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["reads"], 1);
        assert_eq!(json["scans"], 1);
        assert_eq!(json["writes"], 0);
    }

    #[test]
    fn concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let stats = Arc::new(DatabaseStats::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let s = Arc::clone(&stats);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    s.record_read();
                    s.record_write();
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(stats.reads(), 1000);
        assert_eq!(stats.writes(), 1000);
    }
}
