//! End-to-end transaction scenarios.
//!
//! Each scenario drives a database through a fixed interleaving of
//! transactions and asserts the outcome. They are exposed as functions so
//! other crates' tests can run them against their own databases.

use crate::fixtures::TestDatabase;
use crate::generators::TxnOperation;
use mvkv_core::{
    AbortReason, Config, CoreError, Database, Key, KeyRange, RetryConfig, Tid, TransactionState,
    Value,
};
use std::collections::BTreeMap;

/// A harness that mirrors committed state in a plain map.
pub struct IntegrationHarness {
    /// The database instance.
    pub db: TestDatabase,
    /// Expected committed state.
    model: BTreeMap<Key, Value>,
}

impl IntegrationHarness {
    /// Creates a new harness over an empty isolated database.
    pub fn new() -> Self {
        Self {
            db: TestDatabase::with_config(Config::default().retry(RetryConfig::no_retry())),
            model: BTreeMap::new(),
        }
    }

    /// Runs `ops` as one transaction, updating the model if it commits.
    ///
    /// Reads and scans are checked against the model overlaid with the
    /// transaction's own writes.
    pub fn apply(&mut self, ops: &[TxnOperation]) -> Result<Tid, CoreError> {
        let mut local = self.model.clone();
        let mut txn = self.db.begin();
        for op in ops {
            match op {
                TxnOperation::Put { key, value } => {
                    txn.put(key.clone(), value.clone())?;
                    local.insert(key.clone(), value.clone());
                }
                TxnOperation::Delete { key } => {
                    txn.delete(key.clone())?;
                    local.remove(key);
                }
                TxnOperation::Get { key } => {
                    let actual = txn.get(key.clone())?;
                    assert_eq!(actual.as_ref(), local.get(key), "get mismatch for {key}");
                }
                TxnOperation::Scan { range } => {
                    let actual = txn.scan(range.clone())?;
                    let expected: Vec<(Key, Value)> = if range.is_empty_range() {
                        Vec::new()
                    } else {
                        local
                            .range::<Key, _>(range.bounds())
                            .map(|(k, v)| (k.clone(), v.clone()))
                            .collect()
                    };
                    assert_eq!(actual, expected, "scan mismatch for {range}");
                }
            }
        }
        let tid = txn.commit()?;
        self.model = local;
        Ok(tid)
    }

    /// Verifies every key of the model, and nothing else, is in the database.
    pub fn verify_all(&self) {
        let rows = self
            .db
            .scan(KeyRange::all())
            .expect("Failed to scan database");
        let expected: Vec<(Key, Value)> = self
            .model
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        assert_eq!(rows, expected, "database diverged from model");
    }

    /// Returns the count of tracked keys.
    pub fn tracked_count(&self) -> usize {
        self.model.len()
    }
}

impl Default for IntegrationHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Integration checks, each driving a fixed interleaving.
pub mod checks {
    use super::*;

    fn abort_reason(result: Result<Tid, CoreError>) -> AbortReason {
        match result {
            Err(err) => err
                .abort_reason()
                .cloned()
                .expect("commit failed with a non-conflict error"),
            Ok(tid) => panic!("commit unexpectedly succeeded at {tid}"),
        }
    }

    /// Two transactions read and write the same key from the same snapshot.
    ///
    /// The database must be at tid 4. Both begin at snapshot 5, the first
    /// commits at 6 and the second aborts with a stale read.
    pub fn test_lost_update(db: &Database) {
        assert_eq!(db.current_tid(), Tid::new(4));
        db.transaction(|txn| txn.put("x", "0")).expect("seed");

        let mut t1 = db.begin();
        let mut t2 = db.begin();
        assert_eq!(t1.snapshot_tid(), Tid::new(5));
        assert_eq!(t2.snapshot_tid(), Tid::new(5));

        assert_eq!(t1.get("x").unwrap(), Some(Value::from_static(b"0")));
        assert_eq!(t2.get("x").unwrap(), Some(Value::from_static(b"0")));
        t1.put("x", "t1").unwrap();
        t2.put("x", "t2").unwrap();

        assert_eq!(t1.commit().unwrap(), Tid::new(6));
        let reason = abort_reason(t2.commit());
        assert_eq!(reason, AbortReason::StaleRead { key: Key::from("x") });
        assert_eq!(t2.state(), TransactionState::Aborted);

        assert_eq!(db.get("x").unwrap(), Some(Value::from_static(b"t1")));
    }

    /// A scan of `["b", "d")` at snapshot 10 finds nothing; a concurrent
    /// insert of `"c"` commits at 11; the scanner must abort.
    pub fn test_phantom(db: &Database) {
        assert_eq!(db.current_tid(), Tid::new(9));
        db.transaction(|txn| {
            txn.put("a", "1")?;
            txn.put("e", "5")
        })
        .expect("seed");

        let mut scanner = db.begin();
        assert_eq!(scanner.snapshot_tid(), Tid::new(10));
        assert!(scanner.scan(KeyRange::new("b", "d")).unwrap().is_empty());
        scanner.put("report", "b..d empty").unwrap();

        let mut inserter = db.begin();
        inserter.put("c", "3").unwrap();
        assert_eq!(inserter.commit().unwrap(), Tid::new(11));

        let reason = abort_reason(scanner.commit());
        assert_eq!(reason, AbortReason::Phantom { key: Key::from("c") });
        assert!(db.get("report").unwrap().is_none());
    }

    /// Write skew: each transaction reads both keys and writes one.
    /// Serializability demands that one aborts.
    pub fn test_write_skew(db: &Database) {
        db.transaction(|txn| {
            txn.put("on_call:a", "yes")?;
            txn.put("on_call:b", "yes")
        })
        .expect("seed");

        let mut ta = db.begin();
        let mut tb = db.begin();
        for txn in [&mut ta, &mut tb] {
            txn.get("on_call:a").unwrap();
            txn.get("on_call:b").unwrap();
        }
        ta.put("on_call:a", "no").unwrap();
        tb.put("on_call:b", "no").unwrap();

        ta.commit().unwrap();
        assert!(tb.commit().unwrap_err().is_retryable());
    }

    /// A reader that started before a commit keeps seeing its snapshot.
    pub fn test_snapshot_isolation(db: &Database) {
        db.transaction(|txn| txn.put("k", "old")).expect("seed");

        let mut reader = db.begin();
        db.transaction(|txn| txn.put("k", "new")).expect("update");

        assert_eq!(reader.get("k").unwrap(), Some(Value::from_static(b"old")));
        assert_eq!(
            reader.scan(KeyRange::point(&Key::from("k"))).unwrap(),
            vec![(Key::from("k"), Value::from_static(b"old"))]
        );
        // Read-only transactions commit at their snapshot.
        let snapshot = reader.snapshot_tid();
        assert_eq!(reader.commit().unwrap(), snapshot);
    }

    /// Transaction abort: nothing becomes visible.
    pub fn test_transaction_abort(db: &Database) {
        let mut txn = db.begin();
        txn.put("aborted", "v").unwrap();
        txn.abort().unwrap();
        assert!(db.get("aborted").unwrap().is_none());
        assert!(txn.put("aborted", "again").is_err());
    }
}
