//! BTree index implementation.

use crate::index::traits::RecordIndex;
use crate::record::VersionedRecord;
use crate::types::{Key, KeyRange};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// BTree-based record index.
///
/// Lookups and scans share a read lock; only the first insert of a key takes
/// the write lock.
#[derive(Default)]
pub struct BTreeRecordIndex {
    entries: RwLock<BTreeMap<Key, Arc<VersionedRecord>>>,
}

impl BTreeRecordIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all keys in order.
    pub fn keys(&self) -> Vec<Key> {
        self.entries.read().keys().cloned().collect()
    }
}

impl RecordIndex for BTreeRecordIndex {
    fn lookup(&self, key: &Key) -> Option<Arc<VersionedRecord>> {
        self.entries.read().get(key).cloned()
    }

    fn insert(&self, key: &Key) -> Arc<VersionedRecord> {
        if let Some(record) = self.entries.read().get(key) {
            return Arc::clone(record);
        }
        let mut entries = self.entries.write();
        // Another thread may have inserted between the two locks.
        Arc::clone(
            entries
                .entry(key.clone())
                .or_insert_with(VersionedRecord::alloc),
        )
    }

    fn scan(&self, range: &KeyRange) -> Vec<(Key, Arc<VersionedRecord>)> {
        // BTreeMap::range panics on inverted bounds.
        if range.is_empty_range() {
            return Vec::new();
        }
        self.entries
            .read()
            .range::<Key, _>(range.bounds())
            .map(|(key, record)| (key.clone(), Arc::clone(record)))
            .collect()
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

impl std::fmt::Debug for BTreeRecordIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BTreeRecordIndex")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn keys_of(pairs: &[(Key, Arc<VersionedRecord>)]) -> Vec<Key> {
        pairs.iter().map(|(k, _)| k.clone()).collect()
    }

    #[test]
    fn lookup_missing_key() {
        let index = BTreeRecordIndex::new();
        assert!(index.lookup(&Key::from("a")).is_none());
        assert!(index.is_empty());
    }

    #[test]
    fn insert_is_get_or_create() {
        let index = BTreeRecordIndex::new();
        let first = index.insert(&Key::from("a"));
        let second = index.insert(&Key::from("a"));
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first, &index.lookup(&Key::from("a")).unwrap()));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn scan_is_ordered_and_half_open() {
        let index = BTreeRecordIndex::new();
        for k in ["d", "a", "c", "b", "e"] {
            index.insert(&Key::from(k));
        }

        let found = index.scan(&KeyRange::new("b", "d"));
        assert_eq!(keys_of(&found), vec![Key::from("b"), Key::from("c")]);

        let tail = index.scan(&KeyRange::unbounded("c"));
        assert_eq!(
            keys_of(&tail),
            vec![Key::from("c"), Key::from("d"), Key::from("e")]
        );

        assert!(index.scan(&KeyRange::new("d", "b")).is_empty());
        assert_eq!(index.scan(&KeyRange::all()).len(), 5);
    }

    #[test]
    fn keys_lists_inserted_keys_in_order() {
        let index = BTreeRecordIndex::new();
        assert!(index.keys().is_empty());
        for k in ["b", "c", "a", "b"] {
            index.insert(&Key::from(k));
        }
        assert_eq!(
            index.keys(),
            vec![Key::from("a"), Key::from("b"), Key::from("c")]
        );
    }

    #[test]
    fn concurrent_inserts_agree_on_record() {
        let index = Arc::new(BTreeRecordIndex::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let index = Arc::clone(&index);
                thread::spawn(move || Arc::as_ptr(&index.insert(&Key::from("k"))) as usize)
            })
            .collect();
        let ptrs: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ptrs.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(index.len(), 1);
    }
}
