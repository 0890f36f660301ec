//! Stress tests for mvkv.
//!
//! These drivers run many threads against one database (or one record) and
//! check invariants that only hold if isolation holds.

use crate::fixtures::scenarios::{account_key, parse_balance};
use mvkv_core::{Database, Key, KeyRange, Tid, Value, VersionedRecord};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations to perform, across all threads.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Size of values in bytes.
    pub value_size: usize,
    /// Number of distinct keys.
    pub key_count: usize,
    /// Seed for the per-thread random generators.
    pub seed: u64,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 10_000,
            threads: 4,
            value_size: 64,
            key_count: 1_000,
            seed: 0x5eed,
        }
    }
}

fn stress_key(i: usize) -> Key {
    Key::from(format!("stress:{i:06}"))
}

/// Run a sequential write stress test.
pub fn stress_sequential_writes(db: &Database, config: &StressConfig) -> StressTestResult {
    let data = Value::from(vec![0xABu8; config.value_size]);

    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        let key = stress_key(i % config.key_count);
        match db.transaction(|tx| tx.put(key.clone(), data.clone())) {
            Ok(_) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Run concurrent point readers against one writer thread.
///
/// Values carry the key they belong to; a reader that sees another key's
/// bytes counts as a failure.
pub fn stress_concurrent_reads(db: Arc<Database>, config: &StressConfig) -> StressTestResult {
    for i in 0..config.key_count {
        let key = stress_key(i);
        let _ = db.transaction(|tx| tx.put(key.clone(), key.as_bytes().to_vec()));
    }

    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicBool::new(false));
    let ops_per_thread = config.operations / config.threads;

    let start = Instant::now();

    let writer = {
        let db = Arc::clone(&db);
        let done = Arc::clone(&done);
        let key_count = config.key_count;
        thread::spawn(move || {
            let mut i = 0;
            while !done.load(Ordering::Relaxed) {
                let key = stress_key(i % key_count);
                let _ = db.transaction(|tx| tx.put(key.clone(), key.as_bytes().to_vec()));
                i += 1;
            }
        })
    };

    let readers: Vec<_> = (0..config.threads)
        .map(|t| {
            let db = Arc::clone(&db);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let key_count = config.key_count;
            let mut rng = StdRng::seed_from_u64(config.seed + t as u64);

            thread::spawn(move || {
                for _ in 0..ops_per_thread {
                    let key = stress_key(rng.gen_range(0..key_count));
                    match db.get(key.clone()) {
                        Ok(Some(value)) if value.as_ref() == key.as_bytes() => {
                            successful.fetch_add(1, Ordering::Relaxed);
                        }
                        _ => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            })
        })
        .collect();

    for handle in readers {
        handle.join().expect("Thread panicked");
    }
    done.store(true, Ordering::Relaxed);
    writer.join().expect("Thread panicked");

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Sums every account balance visible in one snapshot.
pub fn bank_total(db: &Database) -> u64 {
    db.scan(KeyRange::unbounded("acct:"))
        .expect("Failed to scan accounts")
        .iter()
        .map(|(_, v)| parse_balance(v))
        .sum()
}

/// Run concurrent random transfers between `accounts` accounts.
///
/// Alongside the transfer threads, one auditor repeatedly sums all balances
/// in a single snapshot; any sum other than `expected_total` is a failed
/// operation. Transfers that exhaust their retries also count as failed.
pub fn stress_bank_transfers(
    db: Arc<Database>,
    config: &StressConfig,
    accounts: usize,
    expected_total: u64,
) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicBool::new(false));
    let ops_per_thread = config.operations / config.threads;

    let start = Instant::now();

    let auditor = {
        let db = Arc::clone(&db);
        let failed = Arc::clone(&failed);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            while !done.load(Ordering::Relaxed) {
                if bank_total(&db) != expected_total {
                    failed.fetch_add(1, Ordering::Relaxed);
                }
            }
        })
    };

    let workers: Vec<_> = (0..config.threads)
        .map(|t| {
            let db = Arc::clone(&db);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let mut rng = StdRng::seed_from_u64(config.seed + t as u64);

            thread::spawn(move || {
                for _ in 0..ops_per_thread {
                    let from = rng.gen_range(0..accounts);
                    let to = (from + rng.gen_range(1..accounts)) % accounts;
                    let amount = rng.gen_range(1..=10u64);

                    let result = db.transaction(|tx| {
                        let from_balance = tx.get(account_key(from))?.map_or(0, |v| parse_balance(&v));
                        let to_balance = tx.get(account_key(to))?.map_or(0, |v| parse_balance(&v));
                        if from_balance < amount {
                            return Ok(());
                        }
                        tx.put(account_key(from), (from_balance - amount).to_string())?;
                        tx.put(account_key(to), (to_balance + amount).to_string())
                    });

                    match result {
                        Ok(()) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            })
        })
        .collect();

    for handle in workers {
        handle.join().expect("Thread panicked");
    }
    done.store(true, Ordering::Relaxed);
    auditor.join().expect("Thread panicked");

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Run concurrent read-modify-write increments of one counter.
///
/// Returns the result together with the final counter value, which must
/// equal the number of successful increments.
pub fn stress_counter_increments(
    db: Arc<Database>,
    config: &StressConfig,
) -> (StressTestResult, u64) {
    let counter = Key::from("counter");
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let ops_per_thread = config.operations / config.threads;

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|_| {
            let db = Arc::clone(&db);
            let counter = counter.clone();
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);

            thread::spawn(move || {
                for _ in 0..ops_per_thread {
                    let result = db.transaction(|tx| {
                        let n = tx.get(counter.clone())?.map_or(0, |v| parse_balance(&v));
                        tx.put(counter.clone(), (n + 1).to_string())
                    });
                    match result {
                        Ok(()) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    let result = StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    );
    let value = db
        .get(counter)
        .expect("Failed to read counter")
        .map_or(0, |v| parse_balance(&v));
    (result, value)
}

fn encode_tid(t: Tid) -> Value {
    Value::from(t.as_u64().to_be_bytes().to_vec())
}

/// Hammer a single record with one writer and `config.threads` optimistic
/// readers.
///
/// The writer installs `config.operations` versions whose value encodes the
/// tid. A reader that gets a version newer than it asked for, or a value
/// that does not match its tid, counts as a failure. Reads of evicted
/// versions are expected and count as successes.
pub fn stress_record_fuzz(config: &StressConfig) -> StressTestResult {
    let record = VersionedRecord::alloc();
    let done = Arc::new(AtomicBool::new(false));
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let writes = config.operations as u64;

    let start = Instant::now();

    let readers: Vec<_> = (0..config.threads)
        .map(|t| {
            let record = Arc::clone(&record);
            let done = Arc::clone(&done);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let mut rng = StdRng::seed_from_u64(config.seed + t as u64);

            thread::spawn(move || {
                while !done.load(Ordering::Acquire) {
                    let at = Tid::new(rng.gen_range(0..=writes));
                    let ok = match record.stable_read(at) {
                        Some(entry) if entry.tid == Tid::MIN => entry.value.is_none(),
                        Some(entry) => {
                            entry.tid <= at && entry.value == Some(encode_tid(entry.tid))
                        }
                        None => true,
                    };
                    let chain = record.chain();
                    let ordered = chain.windows(2).all(|w| w[0].tid < w[1].tid);

                    if ok && ordered {
                        successful.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for t in 1..=writes {
        let tid = Tid::new(t);
        record.lock().write_record_at(tid, Some(encode_tid(tid)));
    }
    done.store(true, Ordering::Release);

    for handle in readers {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}
