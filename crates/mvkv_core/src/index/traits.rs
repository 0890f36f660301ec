//! Index trait.

use crate::record::VersionedRecord;
use crate::types::{Key, KeyRange};
use std::sync::Arc;

/// Ordered map from keys to shared records.
///
/// Implementations must be safe for concurrent use. Once a key maps to a
/// record, it maps to that same record for the lifetime of the index.
pub trait RecordIndex: Send + Sync {
    /// Returns the record for `key`, if one was ever inserted.
    fn lookup(&self, key: &Key) -> Option<Arc<VersionedRecord>>;

    /// Returns the record for `key`, creating a fresh one if needed.
    ///
    /// A fresh record holds a single deleted version at the beginning of
    /// time, so it is invisible to every snapshot.
    fn insert(&self, key: &Key) -> Arc<VersionedRecord>;

    /// Returns every `(key, record)` pair inside `range`, ordered by key.
    fn scan(&self, range: &KeyRange) -> Vec<(Key, Arc<VersionedRecord>)>;

    /// Returns the number of keys in the index.
    fn len(&self) -> usize;

    /// Returns true if the index holds no keys.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
