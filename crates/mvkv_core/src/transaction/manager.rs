//! Transaction manager.

use crate::clock::GlobalClock;
use crate::config::Config;
use crate::error::{AbortReason, CoreError, CoreResult};
use crate::index::RecordIndex;
use crate::record::{RecordGuard, VersionedRecord};
use crate::stats::DatabaseStats;
use crate::transaction::state::{PendingWrite, Transaction};
use crate::types::{Key, Tid, Value};
use std::sync::Arc;

/// Runs the optimistic commit protocol.
///
/// The manager owns the index, the clock and the statistics shared by every
/// transaction it begins. There is no central lock: commits coordinate only
/// through per-record locks and the clock.
///
/// ## Commit protocol
///
/// 1. Resolve the record of every written key and lock them in address order.
/// 2. Advance the clock to obtain the commit tid.
/// 3. Check that no read went stale in `(snapshot, commit]`.
/// 4. Re-scan every absent range and check that nothing appeared in it.
/// 5. Install all writes at the commit tid, or none of them, then unlock.
pub struct TransactionManager {
    index: Arc<dyn RecordIndex>,
    clock: Arc<GlobalClock>,
    config: Config,
    stats: DatabaseStats,
}

/// A record locked for commit, with the value to install.
struct LockedWrite<'a> {
    guard: RecordGuard<'a>,
    value: Option<Value>,
}

impl TransactionManager {
    /// Creates a new transaction manager.
    pub fn new(index: Arc<dyn RecordIndex>, clock: Arc<GlobalClock>, config: Config) -> Self {
        Self {
            index,
            clock,
            config,
            stats: DatabaseStats::new(),
        }
    }

    /// Begins a new transaction at the current clock value.
    pub fn begin(self: &Arc<Self>) -> Transaction {
        self.stats.record_transaction_start();
        Transaction::new(Arc::clone(self), self.clock.current())
    }

    /// Resets a finished transaction for reuse at a fresh snapshot.
    pub fn recycle(&self, txn: &mut Transaction) {
        self.stats.record_transaction_start();
        txn.reset(self.clock.current());
    }

    /// Returns the record index.
    pub fn index(&self) -> &dyn RecordIndex {
        self.index.as_ref()
    }

    /// Returns the clock.
    pub fn clock(&self) -> &GlobalClock {
        &self.clock
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the statistics.
    pub fn stats(&self) -> &DatabaseStats {
        &self.stats
    }

    /// Commits a transaction.
    ///
    /// On a validation failure every lock is released without writing and
    /// the transaction ends aborted.
    pub fn commit(&self, txn: &mut Transaction) -> CoreResult<Tid> {
        txn.ensure_active()?;
        debug_assert!(std::ptr::eq(txn.manager(), self));
        txn.mark_committing();

        let snapshot_tid = txn.snapshot_tid();

        // Snapshot reads are already serializable at the snapshot tid, unless
        // one of them hit an evicted version.
        if txn.is_read_only() {
            if let Some(key) = Self::unknown_read(txn) {
                let reason = AbortReason::StaleRead { key };
                return Err(self.fail(txn, reason, snapshot_tid, snapshot_tid));
            }
            txn.mark_committed(snapshot_tid);
            self.stats.record_transaction_commit(true);
            tracing::trace!(%snapshot_tid, "read-only transaction committed");
            return Ok(snapshot_tid);
        }

        let targets = self.resolve_writes(txn);
        let mut locked: Vec<LockedWrite<'_>> = targets
            .iter()
            .map(|(record, value)| LockedWrite {
                guard: record.lock(),
                value: value.clone(),
            })
            .collect();

        let commit_tid = self.clock.advance();

        let own: Vec<*const VersionedRecord> =
            targets.iter().map(|(record, _)| Arc::as_ptr(record)).collect();
        if let Err(reason) = self.validate(txn, snapshot_tid, commit_tid, &own) {
            drop(locked);
            return Err(self.fail(txn, reason, snapshot_tid, commit_tid));
        }

        for write in &mut locked {
            write.guard.write_record_at(commit_tid, write.value.take());
        }
        let installed = locked.len();
        drop(locked);

        txn.mark_committed(commit_tid);
        self.stats.record_transaction_commit(false);
        tracing::trace!(%snapshot_tid, %commit_tid, installed, "transaction committed");
        Ok(commit_tid)
    }

    /// Aborts a transaction, discarding its reads and writes.
    pub fn abort(&self, txn: &mut Transaction) -> CoreResult<()> {
        txn.ensure_active()?;
        txn.mark_aborted();
        self.stats.record_transaction_abort();
        Ok(())
    }

    fn fail(
        &self,
        txn: &mut Transaction,
        reason: AbortReason,
        snapshot_tid: Tid,
        commit_tid: Tid,
    ) -> CoreError {
        txn.mark_aborted();
        self.stats.record_conflict(&reason);
        tracing::debug!(%snapshot_tid, %commit_tid, %reason, "transaction aborted");
        CoreError::abort_conflict(reason, snapshot_tid, commit_tid)
    }

    /// First key read at a snapshot older than every retained version.
    fn unknown_read(txn: &Transaction) -> Option<Key> {
        txn.reads()
            .iter()
            .find(|(_, read)| read.tid.is_none())
            .map(|(key, _)| key.clone())
    }

    /// Maps every pending write to its record, sorted by record address.
    ///
    /// Puts create records for brand-new keys before anything is locked, so
    /// a concurrent committer re-scanning an absent range will find them.
    /// Deletes of keys that never had a record are dropped.
    fn resolve_writes(&self, txn: &Transaction) -> Vec<(Arc<VersionedRecord>, Option<Value>)> {
        let mut targets: Vec<_> = txn
            .writes()
            .iter()
            .filter_map(|(key, write)| match write {
                PendingWrite::Put { value } => Some((self.index.insert(key), Some(value.clone()))),
                PendingWrite::Delete => self.index.lookup(key).map(|record| (record, None)),
            })
            .collect();
        targets.sort_by_key(|(record, _)| Arc::as_ptr(record) as usize);
        targets
    }

    fn validate(
        &self,
        txn: &Transaction,
        snapshot_tid: Tid,
        commit_tid: Tid,
        own: &[*const VersionedRecord],
    ) -> Result<(), AbortReason> {
        for (key, read) in txn.reads() {
            if !self.is_consistent(key, &read.record, snapshot_tid, commit_tid, own)? {
                return Err(AbortReason::StaleRead { key: key.clone() });
            }
        }

        for range in txn.absent() {
            for (key, record) in self.index.scan(range) {
                if !self.is_consistent(&key, &record, snapshot_tid, commit_tid, own)? {
                    return Err(AbortReason::Phantom { key });
                }
            }
        }

        Ok(())
    }

    /// Checks one record for versions installed in `(snapshot, commit]`.
    ///
    /// Records this transaction locked are read directly; others through
    /// the seqlock, waiting a bounded time for a concurrent committer.
    fn is_consistent(
        &self,
        key: &Key,
        record: &Arc<VersionedRecord>,
        snapshot_tid: Tid,
        commit_tid: Tid,
        own: &[*const VersionedRecord],
    ) -> Result<bool, AbortReason> {
        let ptr = Arc::as_ptr(record);
        if own
            .binary_search_by_key(&(ptr as usize), |p| *p as usize)
            .is_ok()
        {
            return Ok(record.is_snapshot_consistent(snapshot_tid, commit_tid));
        }
        record
            .try_stable_is_snapshot_consistent(
                snapshot_tid,
                commit_tid,
                self.config.validation_spin_limit,
            )
            .ok_or_else(|| AbortReason::LockContention { key: key.clone() })
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("current_tid", &self.clock.current())
            .field("keys", &self.index.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::BTreeRecordIndex;
    use crate::transaction::TransactionState;
    use crate::types::KeyRange;

    fn manager_at(start: u64) -> Arc<TransactionManager> {
        Arc::new(TransactionManager::new(
            Arc::new(BTreeRecordIndex::new()),
            Arc::new(GlobalClock::new(start)),
            Config::default(),
        ))
    }

    fn value(s: &'static str) -> Value {
        Value::from_static(s.as_bytes())
    }

    #[test]
    fn commit_installs_at_new_tid() {
        let tm = manager_at(0);
        let mut txn = tm.begin();
        txn.put("a", "1").unwrap();
        txn.put("b", "2").unwrap();
        let tid = txn.commit().unwrap();

        assert_eq!(tid, Tid::new(1));
        assert_eq!(txn.state(), TransactionState::Committed);
        assert_eq!(txn.commit_tid(), Some(tid));
        assert_eq!(tm.clock().current(), tid);

        let record = tm.index().lookup(&Key::from("a")).unwrap();
        let entry = record.stable_read(tid).unwrap();
        assert_eq!(entry.tid, tid);
        assert_eq!(entry.value, Some(value("1")));
        assert!(!record.is_locked());
    }

    #[test]
    fn read_only_commit_does_not_advance_clock() {
        let tm = manager_at(7);
        let mut txn = tm.begin();
        assert_eq!(txn.get("x").unwrap(), None);
        assert_eq!(txn.commit().unwrap(), Tid::new(7));
        assert_eq!(tm.clock().current(), Tid::new(7));
        assert_eq!(tm.stats().read_only_commits(), 1);
    }

    fn overwrite(tm: &Arc<TransactionManager>, key: &str, times: usize) {
        for i in 0..times {
            let mut txn = tm.begin();
            txn.put(key, format!("v{}", i + 1)).unwrap();
            txn.commit().unwrap();
        }
    }

    #[test]
    fn read_only_commit_rejects_evicted_read() {
        let tm = manager_at(0);
        overwrite(&tm, "k", 1);

        let mut reader = tm.begin();
        assert_eq!(reader.snapshot_tid(), Tid::new(1));
        // pushes tid 1 and the initial entry out of the chain
        overwrite(&tm, "k", crate::record::NUM_VERSIONS);

        assert_eq!(reader.get("k").unwrap(), None);
        assert!(reader.is_read_only());
        let current = tm.clock().current();
        let err = reader.commit().unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(
            err.abort_reason(),
            Some(AbortReason::StaleRead { key }) if *key == Key::from("k")
        ));
        assert_eq!(reader.state(), TransactionState::Aborted);
        assert_eq!(tm.clock().current(), current);
        assert_eq!(tm.stats().read_only_commits(), 0);
    }

    #[test]
    fn read_write_commit_rejects_evicted_read() {
        let tm = manager_at(0);
        overwrite(&tm, "k", 1);

        let mut txn = tm.begin();
        overwrite(&tm, "k", crate::record::NUM_VERSIONS);

        assert_eq!(txn.get("k").unwrap(), None);
        txn.put("other", "x").unwrap();
        let err = txn.commit().unwrap_err();
        assert!(matches!(
            err.abort_reason(),
            Some(AbortReason::StaleRead { key }) if *key == Key::from("k")
        ));
        assert_eq!(tm.index().lookup(&Key::from("other")).unwrap().chain().len(), 1);

        tm.recycle(&mut txn);
        assert_eq!(
            txn.get("k").unwrap(),
            Some(Value::from(format!("v{}", crate::record::NUM_VERSIONS)))
        );
        txn.commit().unwrap();
    }

    #[test]
    fn first_committer_wins() {
        let tm = manager_at(0);
        {
            let mut seed = tm.begin();
            seed.put("x", "0").unwrap();
            seed.commit().unwrap();
        }

        let mut t1 = tm.begin();
        let mut t2 = tm.begin();
        assert_eq!(t1.get("x").unwrap(), Some(value("0")));
        assert_eq!(t2.get("x").unwrap(), Some(value("0")));
        t1.put("x", "1").unwrap();
        t2.put("x", "2").unwrap();

        t1.commit().unwrap();
        let err = t2.commit().unwrap_err();
        assert!(matches!(
            err.abort_reason(),
            Some(AbortReason::StaleRead { key }) if *key == Key::from("x")
        ));
        assert_eq!(t2.state(), TransactionState::Aborted);

        let mut check = tm.begin();
        assert_eq!(check.get("x").unwrap(), Some(value("1")));
    }

    #[test]
    fn blind_writes_do_not_conflict() {
        let tm = manager_at(0);
        let mut t1 = tm.begin();
        let mut t2 = tm.begin();
        t1.put("x", "1").unwrap();
        t2.put("x", "2").unwrap();
        let c1 = t1.commit().unwrap();
        let c2 = t2.commit().unwrap();
        assert!(c1 < c2);

        let chain = tm.index().lookup(&Key::from("x")).unwrap().chain();
        let tids: Vec<Tid> = chain.iter().map(|e| e.tid).collect();
        assert_eq!(tids, vec![Tid::MIN, c1, c2]);
    }

    #[test]
    fn phantom_insert_aborts_scanner() {
        let tm = manager_at(0);
        {
            let mut seed = tm.begin();
            seed.put("a", "1").unwrap();
            seed.put("e", "5").unwrap();
            seed.commit().unwrap();
        }

        let mut scanner = tm.begin();
        assert!(scanner.scan(KeyRange::new("b", "d")).unwrap().is_empty());
        scanner.put("summary", "empty").unwrap();

        let mut inserter = tm.begin();
        inserter.put("c", "3").unwrap();
        inserter.commit().unwrap();

        let err = scanner.commit().unwrap_err();
        assert!(matches!(
            err.abort_reason(),
            Some(AbortReason::Phantom { key }) if *key == Key::from("c")
        ));
        assert_eq!(tm.stats().snapshot().aborts_phantom, 1);
    }

    #[test]
    fn insert_of_missing_key_read_aborts_reader() {
        let tm = manager_at(0);
        let mut reader = tm.begin();
        assert_eq!(reader.get("k").unwrap(), None);
        reader.put("other", "x").unwrap();

        let mut writer = tm.begin();
        writer.put("k", "v").unwrap();
        writer.commit().unwrap();

        assert!(reader.commit().unwrap_err().is_retryable());
    }

    #[test]
    fn own_insert_into_absent_range_commits() {
        let tm = manager_at(0);
        let mut txn = tm.begin();
        assert!(txn.scan(KeyRange::new("a", "z")).unwrap().is_empty());
        txn.put("m", "1").unwrap();
        txn.commit().unwrap();
    }

    #[test]
    fn delete_of_unknown_key_is_skipped() {
        let tm = manager_at(0);
        let mut txn = tm.begin();
        txn.delete("nothing").unwrap();
        txn.commit().unwrap();
        assert!(tm.index().lookup(&Key::from("nothing")).is_none());
    }

    #[test]
    fn failed_commit_writes_nothing() {
        let tm = manager_at(0);
        {
            let mut seed = tm.begin();
            seed.put("x", "0").unwrap();
            seed.commit().unwrap();
        }

        let mut loser = tm.begin();
        loser.get("x").unwrap();
        loser.put("x", "lost").unwrap();
        loser.put("y", "lost").unwrap();

        let mut winner = tm.begin();
        winner.put("x", "won").unwrap();
        winner.commit().unwrap();

        assert!(loser.commit().is_err());
        let y = tm.index().lookup(&Key::from("y")).unwrap();
        assert_eq!(y.chain().len(), 1);
        assert!(!y.is_locked());
        assert!(!tm.index().lookup(&Key::from("x")).unwrap().is_locked());
    }

    #[test]
    fn validation_gives_up_on_locked_record() {
        let tm = Arc::new(TransactionManager::new(
            Arc::new(BTreeRecordIndex::new()),
            Arc::new(GlobalClock::new(0)),
            Config::default().validation_spin_limit(4),
        ));
        {
            let mut seed = tm.begin();
            seed.put("x", "0").unwrap();
            seed.commit().unwrap();
        }

        let mut txn = tm.begin();
        txn.get("x").unwrap();
        txn.put("y", "1").unwrap();

        let record = tm.index().lookup(&Key::from("x")).unwrap();
        let held = record.lock();
        let err = txn.commit().unwrap_err();
        drop(held);
        assert!(matches!(
            err.abort_reason(),
            Some(AbortReason::LockContention { .. })
        ));
    }

    #[test]
    fn recycle_starts_fresh_snapshot() {
        let tm = manager_at(0);
        let mut txn = tm.begin();
        txn.put("k", "v").unwrap();
        txn.commit().unwrap();

        tm.recycle(&mut txn);
        assert!(txn.is_active());
        assert_eq!(txn.snapshot_tid(), Tid::new(1));
        assert_eq!(txn.write_count(), 0);
        assert_eq!(txn.get("k").unwrap(), Some(value("v")));
    }
}
