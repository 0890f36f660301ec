//! # mvkv Core
//!
//! Transactional core of an in-memory multi-version key-value store.
//!
//! This crate provides:
//! - Versioned records with optimistic, seqlock-protected reads
//! - Transactions with serializable snapshot isolation and phantom protection
//! - A process-wide transaction clock
//! - An ordered in-memory record index
//!
//! ```rust,ignore
//! use mvkv_core::{Database, KeyRange};
//!
//! let db = Database::open_in_memory();
//! db.transaction(|txn| {
//!     txn.put("b", "1")?;
//!     txn.put("c", "2")?;
//!     Ok(())
//! })?;
//! let rows = db.scan(KeyRange::new("a", "z"))?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod config;
mod database;
mod error;
pub mod index;
pub mod record;
mod stats;
pub mod transaction;
mod types;

pub use clock::GlobalClock;
pub use config::{Config, RetryConfig};
pub use database::Database;
pub use error::{AbortReason, CoreError, CoreResult};
pub use index::{BTreeRecordIndex, RecordIndex};
pub use record::{HeaderWord, RecordGuard, VersionEntry, VersionedRecord, NUM_VERSIONS};
pub use stats::{DatabaseStats, StatsSnapshot};
pub use transaction::{
    AbsentRangeSet, PendingWrite, ReadRecord, Transaction, TransactionManager, TransactionState,
};
pub use types::{Key, KeyRange, Tid, Value};
