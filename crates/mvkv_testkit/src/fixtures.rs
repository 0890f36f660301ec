//! Test fixtures and database helpers.
//!
//! Every fixture owns a private clock, so tids are deterministic and tests
//! running in parallel do not observe each other's commits.

use mvkv_core::{Config, Database, Key, StatsSnapshot, Value};
use std::sync::Once;
use tracing_subscriber::EnvFilter;

static LOGGING: Once = Once::new();

/// Installs a `tracing` subscriber for tests, once per process.
///
/// The filter comes from `RUST_LOG` and defaults to `warn`. Output goes
/// through the test writer so it is captured per test.
pub fn init_logging() {
    LOGGING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// A test database with its own clock.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
}

impl TestDatabase {
    /// Creates a new isolated test database starting at tid 0.
    pub fn memory() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a new isolated test database with a custom configuration.
    pub fn with_config(config: Config) -> Self {
        init_logging();
        Self {
            db: Database::open_isolated(config),
        }
    }

    /// Commits `pairs` in one transaction.
    pub fn seed<K, V>(&self, pairs: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<Key>,
        V: Into<Value>,
    {
        let pairs: Vec<(Key, Value)> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.db
            .transaction(|txn| {
                for (k, v) in &pairs {
                    txn.put(k.clone(), v.clone())?;
                }
                Ok(())
            })
            .expect("Failed to seed database");
    }

    /// Renders the statistics as JSON.
    pub fn stats_json(&self) -> String {
        stats_json(&self.db.stats().snapshot())
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Renders a stats snapshot as pretty JSON.
pub fn stats_json(snapshot: &StatsSnapshot) -> String {
    serde_json::to_string_pretty(snapshot).expect("stats snapshot is always serializable")
}

/// Runs a test with a temporary isolated database.
///
/// # Example
///
/// ```rust,ignore
/// use mvkv_testkit::with_memory_db;
///
/// #[test]
/// fn my_test() {
///     with_memory_db(|db| {
///         db.transaction(|txn| txn.put("k", "v")).unwrap();
///     });
/// }
/// ```
pub fn with_memory_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::memory();
    f(&test_db.db)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Key of the `i`-th populated entry; zero padded so keys sort numerically.
    pub fn numbered_key(i: usize) -> Key {
        Key::from(format!("key:{i:06}"))
    }

    /// Creates a database holding `count` numbered keys.
    pub fn populated_database(count: usize) -> TestDatabase {
        let test_db = TestDatabase::memory();
        test_db.seed((0..count).map(|i| (numbered_key(i), format!(r#"{{"index":{i}}}"#))));
        test_db
    }

    /// Creates a database of `accounts` accounts holding `balance` each.
    pub fn bank(accounts: usize, balance: u64) -> TestDatabase {
        bank_with_config(accounts, balance, Config::default())
    }

    /// Like [`bank`], with a custom configuration.
    pub fn bank_with_config(accounts: usize, balance: u64, config: Config) -> TestDatabase {
        let test_db = TestDatabase::with_config(config);
        test_db.seed((0..accounts).map(|i| (account_key(i), balance.to_string())));
        test_db
    }

    /// Key of the `i`-th bank account.
    pub fn account_key(i: usize) -> Key {
        Key::from(format!("acct:{i:04}"))
    }

    /// Parses a balance written by [`bank`].
    pub fn parse_balance(value: &Value) -> u64 {
        std::str::from_utf8(value)
            .ok()
            .and_then(|s| s.parse().ok())
            .expect("balance must be a decimal string")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mvkv_core::{KeyRange, Tid};

    #[test]
    fn test_memory_database() {
        let test_db = TestDatabase::memory();
        assert_eq!(test_db.current_tid(), Tid::new(0));
    }

    #[test]
    fn test_with_memory_db() {
        with_memory_db(|db| {
            db.transaction(|txn| txn.put("k", "v")).unwrap();
            assert_eq!(db.get("k").unwrap(), Some(Value::from_static(b"v")));
        });
    }

    #[test]
    fn test_populated_scenario() {
        let test_db = scenarios::populated_database(10);
        assert_eq!(test_db.current_tid(), Tid::new(1));
        let rows = test_db.scan(KeyRange::all()).unwrap();
        assert_eq!(rows.len(), 10);
        assert_eq!(rows[3].0, scenarios::numbered_key(3));
    }

    #[test]
    fn test_bank_scenario() {
        let test_db = scenarios::bank(4, 100);
        let total: u64 = test_db
            .scan(KeyRange::unbounded("acct:"))
            .unwrap()
            .iter()
            .map(|(_, v)| scenarios::parse_balance(v))
            .sum();
        assert_eq!(total, 400);
    }

    #[test]
    fn test_stats_json() {
        let test_db = scenarios::populated_database(2);
        let json: serde_json::Value = serde_json::from_str(&test_db.stats_json()).unwrap();
        assert_eq!(json["transactions_committed"], 1);
    }
}
