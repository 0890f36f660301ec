//! Database facade.

use crate::clock::GlobalClock;
use crate::config::Config;
use crate::error::CoreResult;
use crate::index::{BTreeRecordIndex, RecordIndex};
use crate::stats::DatabaseStats;
use crate::transaction::{Transaction, TransactionManager};
use crate::types::{Key, KeyRange, Tid, Value};
use std::sync::Arc;
use std::thread;

/// The main database handle.
///
/// `Database` bundles an index, a clock and a [`TransactionManager`]. It is
/// cheap to share across threads behind an `Arc`; every thread runs its own
/// transactions.
///
/// # Example
///
/// ```rust,ignore
/// use mvkv_core::{Database, Config};
///
/// let db = Database::open(Config::default());
///
/// db.transaction(|txn| {
///     let balance = txn.get("alice")?;
///     txn.put("alice", "100")?;
///     Ok(balance)
/// })?;
/// ```
///
/// # Isolated Databases
///
/// [`Database::open`] draws tids from the process-wide [`GlobalClock`]. Tests
/// that want deterministic tids use [`Database::open_in_memory`] or
/// [`Database::open_isolated`], which own a private clock.
pub struct Database {
    manager: Arc<TransactionManager>,
}

impl Database {
    /// Opens an empty database on the process-wide clock.
    pub fn open(config: Config) -> Self {
        Self::with_parts(
            Arc::new(BTreeRecordIndex::new()),
            GlobalClock::global(),
            config,
        )
    }

    /// Opens an empty database with a private clock at `config.initial_tid`.
    pub fn open_isolated(config: Config) -> Self {
        let clock = Arc::new(GlobalClock::new(config.initial_tid));
        Self::with_parts(Arc::new(BTreeRecordIndex::new()), clock, config)
    }

    /// Opens an empty database with a private clock and default settings.
    pub fn open_in_memory() -> Self {
        Self::open_isolated(Config::default())
    }

    /// Assembles a database from its parts.
    pub fn with_parts(index: Arc<dyn RecordIndex>, clock: Arc<GlobalClock>, config: Config) -> Self {
        Self {
            manager: Arc::new(TransactionManager::new(index, clock, config)),
        }
    }

    /// Begins a new transaction.
    pub fn begin(&self) -> Transaction {
        self.manager.begin()
    }

    /// Commits a transaction.
    pub fn commit(&self, txn: &mut Transaction) -> CoreResult<Tid> {
        self.manager.commit(txn)
    }

    /// Aborts a transaction.
    pub fn abort(&self, txn: &mut Transaction) -> CoreResult<()> {
        self.manager.abort(txn)
    }

    /// Executes a function within a transaction, retrying on conflicts.
    ///
    /// `f` may run several times: after a retryable abort the transaction is
    /// reset to a fresh snapshot and `f` is called again, up to
    /// `config.retry.max_attempts` attempts. Any other error aborts the
    /// transaction and is returned as is.
    pub fn transaction<F, T>(&self, mut f: F) -> CoreResult<T>
    where
        F: FnMut(&mut Transaction) -> CoreResult<T>,
    {
        let retry = &self.manager.config().retry;
        let mut txn = self.begin();
        let mut attempt = 0u32;
        loop {
            let result = f(&mut txn).and_then(|value| txn.commit().map(|_| value));
            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < retry.max_attempts => {
                    attempt += 1;
                    self.stats().record_retry();
                    tracing::trace!(attempt, error = %e, "retrying transaction");

                    let delay = retry.delay_for_attempt(attempt);
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    self.manager.recycle(&mut txn);
                }
                Err(e) => {
                    if txn.is_active() {
                        // Try to abort, but don't mask the original error
                        let _ = txn.abort();
                    }
                    if e.is_retryable() {
                        tracing::warn!(attempts = attempt + 1, error = %e, "transaction retries exhausted");
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Reads the latest committed value of `key`.
    ///
    /// Runs as a read-only [`transaction`](Self::transaction), so a read that
    /// raced past the retained versions is retried at a fresh snapshot.
    pub fn get(&self, key: impl Into<Key>) -> CoreResult<Option<Value>> {
        let key = key.into();
        self.transaction(|txn| txn.get(key.clone()))
    }

    /// Returns the latest committed `(key, value)` pairs inside `range`.
    pub fn scan(&self, range: KeyRange) -> CoreResult<Vec<(Key, Value)>> {
        self.transaction(|txn| txn.scan(range.clone()))
    }

    /// Returns the tid of the last commit.
    #[must_use]
    pub fn current_tid(&self) -> Tid {
        self.manager.clock().current()
    }

    /// Returns the statistics.
    pub fn stats(&self) -> &DatabaseStats {
        self.manager.stats()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Config {
        self.manager.config()
    }

    /// Returns the transaction manager.
    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("current_tid", &self.current_tid())
            .finish_non_exhaustive()
    }
}
