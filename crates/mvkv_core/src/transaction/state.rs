//! Transaction state.

use crate::error::{CoreError, CoreResult};
use crate::record::VersionedRecord;
use crate::transaction::manager::TransactionManager;
use crate::transaction::range_set::AbsentRangeSet;
use crate::types::{Key, KeyRange, Tid, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can perform operations.
    Active,
    /// Commit is validating; record locks may be held.
    Committing,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been aborted, explicitly or by failed validation.
    Aborted,
}

/// Represents a pending write in a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingWrite {
    /// Insert or update a key.
    Put {
        /// New value.
        value: Value,
    },
    /// Delete a key.
    Delete,
}

impl PendingWrite {
    /// The value this write leaves behind, `None` for a delete.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Put { value } => Some(value),
            Self::Delete => None,
        }
    }
}

/// What a transaction observed when it read a key from a record.
#[derive(Debug, Clone)]
pub struct ReadRecord {
    /// Tid of the version observed, or `None` if the version visible at the
    /// snapshot had already been evicted.
    pub tid: Option<Tid>,
    /// Value observed; `None` for a deleted or unknown version.
    pub value: Option<Value>,
    /// The record read from, kept for commit validation.
    pub record: Arc<VersionedRecord>,
}

/// A transaction over the multi-version store.
///
/// Reads see the state as of [`snapshot_tid`](Self::snapshot_tid). Writes are
/// buffered and become visible to others only when
/// [`commit`](Self::commit) succeeds. A transaction belongs to one thread.
pub struct Transaction {
    manager: Arc<TransactionManager>,
    /// Snapshot tid (reads see this point in time).
    snapshot_tid: Tid,
    /// Tid the transaction committed at.
    commit_tid: Option<Tid>,
    /// Current state.
    state: TransactionState,
    /// Read set for validation: key -> observed version.
    reads: BTreeMap<Key, ReadRecord>,
    /// Pending writes: key -> write operation.
    writes: BTreeMap<Key, PendingWrite>,
    /// Ranges observed empty at the snapshot.
    absent: AbsentRangeSet,
}

impl Transaction {
    /// Creates a new transaction.
    pub(crate) fn new(manager: Arc<TransactionManager>, snapshot_tid: Tid) -> Self {
        Self {
            manager,
            snapshot_tid,
            commit_tid: None,
            state: TransactionState::Active,
            reads: BTreeMap::new(),
            writes: BTreeMap::new(),
            absent: AbsentRangeSet::new(),
        }
    }

    /// Returns the snapshot tid.
    #[must_use]
    pub fn snapshot_tid(&self) -> Tid {
        self.snapshot_tid
    }

    /// Returns the commit tid once committed.
    #[must_use]
    pub fn commit_tid(&self) -> Option<Tid> {
        self.commit_tid
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Checks if the transaction is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Reads `key` at the snapshot, seeing this transaction's own writes.
    pub fn get(&mut self, key: impl Into<Key>) -> CoreResult<Option<Value>> {
        self.ensure_active()?;
        let key = key.into();
        Ok(self.read_key(&key))
    }

    /// Buffers a put.
    pub fn put(&mut self, key: impl Into<Key>, value: impl Into<Value>) -> CoreResult<()> {
        self.ensure_active()?;
        self.writes.insert(
            key.into(),
            PendingWrite::Put {
                value: value.into(),
            },
        );
        self.manager.stats().record_write();
        Ok(())
    }

    /// Buffers a delete.
    pub fn delete(&mut self, key: impl Into<Key>) -> CoreResult<()> {
        self.ensure_active()?;
        self.writes.insert(key.into(), PendingWrite::Delete);
        self.manager.stats().record_delete();
        Ok(())
    }

    /// Returns every live `(key, value)` inside `range`, ordered by key.
    ///
    /// Gaps between the keys found are remembered as absent ranges, so a
    /// concurrent insert into them aborts this transaction at commit.
    pub fn scan(&mut self, range: KeyRange) -> CoreResult<Vec<(Key, Value)>> {
        self.ensure_active()?;
        self.manager.stats().record_scan();
        if range.is_empty_range() {
            return Ok(Vec::new());
        }

        let found = self.manager.index().scan(&range);
        let mut results = BTreeMap::new();
        let mut cursor = range.start.clone();
        for (key, record) in found {
            if cursor < key {
                self.absent.add(KeyRange::new(cursor, key.clone()));
            }
            cursor = key.successor();

            let value = match self.local_search(&key) {
                Some(local) => local,
                None => self.read_record(key.clone(), record),
            };
            if let Some(value) = value {
                results.insert(key, value);
            }
        }
        self.absent.add(KeyRange {
            start: cursor,
            end: range.end.clone(),
        });

        // Own puts of keys the index has not seen yet.
        for (key, write) in self.writes.range::<Key, _>(range.bounds()) {
            match write {
                PendingWrite::Put { value } => {
                    results.insert(key.clone(), value.clone());
                }
                PendingWrite::Delete => {
                    results.remove(key);
                }
            }
        }

        Ok(results.into_iter().collect())
    }

    /// Looks `key` up in the write set, then the read set.
    ///
    /// `Some(None)` means known absent (deleted by this transaction or read
    /// as absent); `None` means this transaction has not touched the key.
    #[must_use]
    pub fn local_search(&self, key: &Key) -> Option<Option<Value>> {
        if let Some(write) = self.writes.get(key) {
            return Some(write.value().cloned());
        }
        self.reads.get(key).map(|read| read.value.clone())
    }

    /// Whether `key` lies in a range this transaction observed as empty.
    #[must_use]
    pub fn key_in_absent_set(&self, key: &Key) -> bool {
        self.absent.contains_key(key)
    }

    /// Records `range` as observed empty at the snapshot.
    pub fn add_absent_range(&mut self, range: KeyRange) {
        self.absent.add(range);
    }

    /// Returns the absent-range set.
    #[must_use]
    pub fn absent_ranges(&self) -> &AbsentRangeSet {
        &self.absent
    }

    /// Returns the read set.
    pub fn read_set(&self) -> impl Iterator<Item = (&Key, &ReadRecord)> {
        self.reads.iter()
    }

    /// Returns all pending writes.
    pub fn pending_writes(&self) -> impl Iterator<Item = (&Key, &PendingWrite)> {
        self.writes.iter()
    }

    /// Returns the number of keys read from records.
    #[must_use]
    pub fn read_count(&self) -> usize {
        self.reads.len()
    }

    /// Returns the number of pending writes.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.len()
    }

    /// Returns true if the transaction has no pending writes.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.writes.is_empty()
    }

    /// Validates and installs this transaction's writes.
    ///
    /// Returns the commit tid. Fails with
    /// [`CoreError::AbortConflict`] if a read went stale or a phantom
    /// appeared; the transaction is then aborted and nothing was written.
    pub fn commit(&mut self) -> CoreResult<Tid> {
        let manager = Arc::clone(&self.manager);
        manager.commit(self)
    }

    /// Discards all buffered state.
    pub fn abort(&mut self) -> CoreResult<()> {
        let manager = Arc::clone(&self.manager);
        manager.abort(self)
    }

    fn read_key(&mut self, key: &Key) -> Option<Value> {
        if let Some(local) = self.local_search(key) {
            return local;
        }
        if self.key_in_absent_set(key) {
            return None;
        }

        self.manager.stats().record_read();
        match self.manager.index().lookup(key) {
            Some(record) => self.read_record(key.clone(), record),
            None => {
                self.absent.add(KeyRange::point(key));
                None
            }
        }
    }

    fn read_record(&mut self, key: Key, record: Arc<VersionedRecord>) -> Option<Value> {
        let (tid, value) = match record.stable_read(self.snapshot_tid) {
            Some(entry) => (Some(entry.tid), entry.value),
            // evicted: validation of this entry always fails
            None => (None, None),
        };
        self.reads.insert(
            key,
            ReadRecord {
                tid,
                value: value.clone(),
                record,
            },
        );
        value
    }

    pub(crate) fn manager(&self) -> &TransactionManager {
        &self.manager
    }

    pub(crate) fn absent(&self) -> &AbsentRangeSet {
        &self.absent
    }

    pub(crate) fn reads(&self) -> &BTreeMap<Key, ReadRecord> {
        &self.reads
    }

    pub(crate) fn writes(&self) -> &BTreeMap<Key, PendingWrite> {
        &self.writes
    }

    pub(crate) fn mark_committing(&mut self) {
        self.state = TransactionState::Committing;
    }

    pub(crate) fn mark_committed(&mut self, commit_tid: Tid) {
        self.state = TransactionState::Committed;
        self.commit_tid = Some(commit_tid);
    }

    pub(crate) fn mark_aborted(&mut self) {
        self.state = TransactionState::Aborted;
        self.clear();
    }

    /// Resets the transaction to a fresh active state at `snapshot_tid`.
    pub(crate) fn reset(&mut self, snapshot_tid: Tid) {
        self.clear();
        self.snapshot_tid = snapshot_tid;
        self.commit_tid = None;
        self.state = TransactionState::Active;
    }

    /// Empties the read, write and absent-range sets.
    pub fn clear(&mut self) {
        self.reads.clear();
        self.writes.clear();
        self.absent.clear();
    }

    /// Ensures the transaction is active.
    pub(crate) fn ensure_active(&self) -> CoreResult<()> {
        match self.state {
            TransactionState::Active => Ok(()),
            TransactionState::Committing => {
                Err(CoreError::invalid_operation("transaction is committing"))
            }
            TransactionState::Committed => Err(CoreError::invalid_operation(
                "transaction already committed",
            )),
            TransactionState::Aborted => {
                Err(CoreError::invalid_operation("transaction already aborted"))
            }
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("snapshot_tid", &self.snapshot_tid)
            .field("state", &self.state)
            .field("reads", &self.reads.len())
            .field("writes", &self.writes)
            .field("absent", &format_args!("{}", self.absent))
            .finish()
    }
}
