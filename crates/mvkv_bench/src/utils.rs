//! Benchmark utilities.

use mvkv_core::{Database, Key, Tid, Value, VersionedRecord};
use rand::Rng;
use std::sync::Arc;

/// Generate random value bytes of the specified size.
pub fn random_data(size: usize) -> Value {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen::<u8>()).collect::<Vec<_>>().into()
}

/// Key of the `i`-th benchmark entry.
pub fn bench_key(i: usize) -> Key {
    Key::from(format!("bench:{i:08}"))
}

/// Generate a batch of keys.
pub fn generate_keys(count: usize) -> Vec<Key> {
    (0..count).map(bench_key).collect()
}

/// Generate key/value pairs with the specified value size.
pub fn generate_entries(count: usize, value_size: usize) -> Vec<(Key, Value)> {
    generate_keys(count)
        .into_iter()
        .map(|key| (key, random_data(value_size)))
        .collect()
}

/// Open an isolated database holding `count` entries.
pub fn populated_database(count: usize, value_size: usize) -> Database {
    let db = Database::open_in_memory();
    let entries = generate_entries(count, value_size);
    db.transaction(|txn| {
        for (key, value) in &entries {
            txn.put(key.clone(), value.clone())?;
        }
        Ok(())
    })
    .expect("Failed to populate database");
    db
}

/// Allocate a record holding `versions` versions at tids `1..=versions`.
pub fn record_with_versions(versions: u64, value_size: usize) -> Arc<VersionedRecord> {
    let record = VersionedRecord::alloc();
    {
        let mut guard = record.lock();
        for t in 1..=versions {
            guard.write_record_at(Tid::new(t), Some(random_data(value_size)));
        }
    }
    record
}
